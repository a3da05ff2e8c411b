//! Event loop builder.

use crate::error::{Error, ResultExt};
use crate::runtime::config::{ConfigError, DriverKind, LoopConfig};
use crate::runtime::driver::{Driver, IoUringDriver, LabDriver};
use crate::runtime::env_config::apply_env_overrides;
use crate::runtime::event_loop::EventLoop;
use crate::tracing_compat::debug;
use core::fmt;

/// Builder for constructing an [`EventLoop`] with custom configuration.
///
/// Values set through builder methods take precedence over environment
/// variables, which take precedence over defaults.
///
/// ```ignore
/// let ev = EventLoop::builder()
///     .ring_entries(64)
///     .from_env()
///     .build()?;
/// ```
pub struct EventLoopBuilder {
    ring_entries: Option<u32>,
    completion_batch: Option<usize>,
    driver_kind: Option<DriverKind>,
    driver: Option<Box<dyn Driver>>,
    use_env: bool,
}

impl EventLoopBuilder {
    /// Create a new builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ring_entries: None,
            completion_batch: None,
            driver_kind: None,
            driver: None,
            use_env: false,
        }
    }

    /// Set the number of submission queue entries.
    #[must_use]
    pub fn ring_entries(mut self, entries: u32) -> Self {
        self.ring_entries = Some(entries);
        self
    }

    /// Set the initial capacity of the per-turn completion buffer.
    #[must_use]
    pub fn completion_batch(mut self, batch: usize) -> Self {
        self.completion_batch = Some(batch);
        self
    }

    /// Select the completion backend.
    #[must_use]
    pub fn driver(mut self, kind: DriverKind) -> Self {
        self.driver_kind = Some(kind);
        self
    }

    /// Use a specific lab driver, keeping a handle for the caller to inspect.
    #[must_use]
    pub fn lab(mut self, lab: LabDriver) -> Self {
        self.driver_kind = Some(DriverKind::Lab);
        self.driver = Some(Box::new(lab));
        self
    }

    /// Use a caller-supplied driver instead of constructing one.
    ///
    /// The resolved configuration reports [`DriverKind::Custom`].
    #[must_use]
    pub fn driver_instance<D: Driver + 'static>(mut self, driver: D) -> Self {
        self.driver_kind = Some(DriverKind::Custom);
        self.driver = Some(Box::new(driver));
        self
    }

    /// Apply `COVENT_*` environment overrides beneath builder values.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        self.use_env = true;
        self
    }

    /// Resolves the configuration this builder would use.
    pub fn config(&self) -> Result<LoopConfig, ConfigError> {
        let mut config = LoopConfig::default();
        if self.use_env {
            apply_env_overrides(&mut config)?;
        }
        if let Some(entries) = self.ring_entries {
            config.ring_entries = entries;
        }
        if let Some(batch) = self.completion_batch {
            config.completion_batch = batch;
        }
        if let Some(kind) = self.driver_kind {
            config.driver = kind;
        }
        config.validate()?;
        config.normalize();
        Ok(config)
    }

    /// Build an event loop from this configuration.
    pub fn build(mut self) -> Result<EventLoop, Error> {
        let config = self.config()?;
        let driver: Box<dyn Driver> = match self.driver.take() {
            Some(driver) => driver,
            None => match config.driver {
                DriverKind::IoUring => Box::new(
                    IoUringDriver::new(config.ring_entries)
                        .context("failed to create io_uring ring")?,
                ),
                DriverKind::Lab => Box::new(LabDriver::new()),
                DriverKind::Custom => {
                    return Err(ConfigError::MissingDriverInstance.into());
                }
            },
        };
        debug!(
            driver = driver.name(),
            ring_entries = config.ring_entries,
            completion_batch = config.completion_batch,
            "event loop built"
        );
        Ok(EventLoop::from_parts(config, driver))
    }
}

impl Default for EventLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventLoopBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoopBuilder")
            .field("ring_entries", &self.ring_entries)
            .field("completion_batch", &self.completion_batch)
            .field("driver_kind", &self.driver_kind)
            .field("driver", &self.driver.as_ref().map(|d| d.name()))
            .field("use_env", &self.use_env)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::runtime::env_config::{ENV_COMPLETION_BATCH, ENV_DRIVER, ENV_RING_ENTRIES};

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn builder_values_are_normalized() {
        init_test("builder_values_are_normalized");
        let config = EventLoopBuilder::new()
            .ring_entries(100)
            .completion_batch(0)
            .driver(DriverKind::Lab)
            .config()
            .unwrap();
        assert_eq!(config.ring_entries, 128);
        assert_eq!(config.completion_batch, 1);
        assert_eq!(config.driver, DriverKind::Lab);
        crate::test_complete!("builder_values_are_normalized");
    }

    #[test]
    fn builder_overrides_env_which_overrides_defaults() {
        init_test("builder_overrides_env_which_overrides_defaults");
        let config = {
            let _guard = crate::test_utils::env_lock();
            std::env::set_var(ENV_RING_ENTRIES, "32");
            std::env::set_var(ENV_COMPLETION_BATCH, "8");
            std::env::remove_var(ENV_DRIVER);
            let config = EventLoopBuilder::new()
                .ring_entries(512)
                .from_env()
                .config();
            std::env::remove_var(ENV_RING_ENTRIES);
            std::env::remove_var(ENV_COMPLETION_BATCH);
            config.unwrap()
        };
        assert_eq!(config.ring_entries, 512, "builder wins over env");
        assert_eq!(config.completion_batch, 8, "env wins over default");
        assert_eq!(config.driver, DriverKind::IoUring, "default kept");
        crate::test_complete!("builder_overrides_env_which_overrides_defaults");
    }

    #[test]
    fn oversized_ring_is_a_config_error() {
        init_test("oversized_ring_is_a_config_error");
        let err = EventLoopBuilder::new()
            .ring_entries(1 << 20)
            .driver(DriverKind::Lab)
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        crate::test_complete!("oversized_ring_is_a_config_error");
    }

    #[test]
    fn lab_builder_shares_driver_handle() {
        init_test("lab_builder_shares_driver_handle");
        let lab = LabDriver::new();
        let ev = EventLoopBuilder::new().lab(lab.clone()).build().unwrap();
        assert_eq!(ev.config().driver, DriverKind::Lab);
        assert_eq!(ev.driver_name(), "lab");
        assert_eq!(lab.submitted(), 0);
        crate::test_complete!("lab_builder_shares_driver_handle");
    }

    #[test]
    fn driver_instance_reports_custom_kind() {
        init_test("driver_instance_reports_custom_kind");
        let lab = LabDriver::new();
        let builder = EventLoopBuilder::new()
            .driver(DriverKind::IoUring)
            .driver_instance(lab.clone());
        assert_eq!(builder.config().unwrap().driver, DriverKind::Custom);

        let ev = builder.build().unwrap();
        assert_eq!(ev.config().driver, DriverKind::Custom);
        assert_eq!(ev.driver_name(), "lab");
        crate::test_complete!("driver_instance_reports_custom_kind");
    }

    #[test]
    fn custom_kind_without_instance_is_a_config_error() {
        init_test("custom_kind_without_instance_is_a_config_error");
        let err = EventLoopBuilder::new()
            .driver(DriverKind::Custom)
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.message().is_some_and(|m| m.contains("driver instance")));
        crate::test_complete!("custom_kind_without_instance_is_a_config_error");
    }
}
