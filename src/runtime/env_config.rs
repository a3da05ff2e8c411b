//! Environment variable support for [`EventLoopBuilder`](super::builder::EventLoopBuilder).
//!
//! # Configuration Precedence
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Programmatic**: values set via builder methods (`ring_entries(64)`)
//! 2. **Environment variables**: values from `COVENT_*` env vars
//! 3. **Defaults**: built-in defaults from [`LoopConfig::default()`]
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `COVENT_RING_ENTRIES` | `u32` | `ring_entries` |
//! | `COVENT_COMPLETION_BATCH` | `usize` | `completion_batch` |
//! | `COVENT_DRIVER` | `io-uring` \| `lab` | `driver` |

use crate::runtime::config::{ConfigError, DriverKind, LoopConfig};

/// Environment variable name for the submission queue size.
pub const ENV_RING_ENTRIES: &str = "COVENT_RING_ENTRIES";
/// Environment variable name for the completion buffer capacity.
pub const ENV_COMPLETION_BATCH: &str = "COVENT_COMPLETION_BATCH";
/// Environment variable name for the completion backend.
pub const ENV_DRIVER: &str = "COVENT_DRIVER";

/// Apply environment variable overrides to a [`LoopConfig`].
///
/// Only variables that are set in the environment are applied.
/// Returns an error if a variable is set but contains an unparseable value.
pub fn apply_env_overrides(config: &mut LoopConfig) -> Result<(), ConfigError> {
    if let Some(val) = read_env(ENV_RING_ENTRIES) {
        config.ring_entries = parse_u32(ENV_RING_ENTRIES, &val)?;
    }
    if let Some(val) = read_env(ENV_COMPLETION_BATCH) {
        config.completion_batch = parse_usize(ENV_COMPLETION_BATCH, &val)?;
    }
    if let Some(val) = read_env(ENV_DRIVER) {
        config.driver = val.parse::<DriverKind>()?;
    }
    Ok(())
}

/// Read an environment variable, returning `None` if unset.
fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_usize(var: &'static str, val: &str) -> Result<usize, ConfigError> {
    val.trim()
        .parse::<usize>()
        .map_err(|_| ConfigError::InvalidEnv {
            var,
            value: val.to_string(),
            expected: "unsigned integer",
        })
}

fn parse_u32(var: &'static str, val: &str) -> Result<u32, ConfigError> {
    val.trim().parse::<u32>().map_err(|_| ConfigError::InvalidEnv {
        var,
        value: val.to_string(),
        expected: "u32",
    })
}
