//! Event loop configuration types.
//!
//! These types hold the concrete values that drive loop construction. In most
//! cases you should use [`EventLoopBuilder`](super::builder::EventLoopBuilder)
//! rather than creating a [`LoopConfig`] directly.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `ring_entries` | 256 |
//! | `completion_batch` | 1024 |
//! | `driver` | [`DriverKind::IoUring`] |

use crate::error::{Error, ErrorKind};
use core::fmt;
use std::str::FromStr;

/// Default number of submission queue entries.
pub const DEFAULT_RING_ENTRIES: u32 = 256;
/// Largest submission queue the kernel accepts without clamping.
pub const MAX_RING_ENTRIES: u32 = 32_768;
/// Default capacity of the per-turn completion buffer.
pub const DEFAULT_COMPLETION_BATCH: usize = 1024;

/// Which completion backend a loop uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DriverKind {
    /// The kernel's io_uring interface.
    #[default]
    IoUring,
    /// Deterministic virtual-time driver.
    Lab,
    /// A caller-supplied driver instance. Never parsed from a name.
    Custom,
}

impl DriverKind {
    /// Canonical lowercase name, as accepted by [`FromStr`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IoUring => "io-uring",
            Self::Lab => "lab",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "io-uring" | "io_uring" | "iouring" | "uring" => Ok(Self::IoUring),
            "lab" | "virtual" => Ok(Self::Lab),
            other => Err(ConfigError::UnknownDriver(other.to_string())),
        }
    }
}

/// Errors produced while resolving a [`LoopConfig`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed.
    #[error("invalid value for {var}: expected {expected}, got {value:?}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Raw value found in the environment.
        value: String,
        /// Description of the accepted values.
        expected: &'static str,
    },

    /// The driver name is not recognized.
    #[error("unknown driver {0:?} (expected \"io-uring\" or \"lab\")")]
    UnknownDriver(String),

    /// A custom driver was selected but no instance was supplied.
    #[error("driver \"custom\" requires a driver instance")]
    MissingDriverInstance,

    /// The requested ring size exceeds what the kernel accepts.
    #[error("ring_entries {0} exceeds the maximum of {MAX_RING_ENTRIES}")]
    RingTooLarge(u32),
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::new(ErrorKind::Config)
            .with_message(err.to_string())
            .with_source(err)
    }
}

/// Event loop configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    /// Submission queue entries requested from the kernel (default: 256).
    pub ring_entries: u32,
    /// Initial capacity of the completion buffer reused across turns.
    pub completion_batch: usize,
    /// Completion backend.
    pub driver: DriverKind,
}

impl LoopConfig {
    /// Normalize configuration values to safe defaults.
    ///
    /// Ring sizes are rounded up to a power of two, as the kernel does.
    pub fn normalize(&mut self) {
        if self.ring_entries == 0 {
            self.ring_entries = 1;
        }
        self.ring_entries = self
            .ring_entries
            .checked_next_power_of_two()
            .unwrap_or(self.ring_entries);
        if self.completion_batch == 0 {
            self.completion_batch = 1;
        }
    }

    /// Checks values that cannot be normalized.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ring_entries > MAX_RING_ENTRIES {
            return Err(ConfigError::RingTooLarge(self.ring_entries));
        }
        Ok(())
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            ring_entries: DEFAULT_RING_ENTRIES,
            completion_batch: DEFAULT_COMPLETION_BATCH,
            driver: DriverKind::default(),
        }
    }
}
