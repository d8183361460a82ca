//! # Rotor Configuration
//!
//! Settings that shape a scheduling run: batch size, dwell timeout, cycling mode
//! and the knobs handed to the execution driver.
//!
//! Values are layered by [`ConfigLoader`]: built-in defaults, then an optional
//! file (TOML, YAML or JSON by extension), then `FLEET_ROTOR__*` environment
//! variables. Every load ends with [`RotorConfig::validate`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fleet_rotor::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new().with_file("rotor.toml").load()?;
//! println!("dwell per batch: {:?}", config.batch_timeout());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

/// Default number of workers per batch
pub const DEFAULT_BATCH_SIZE: usize = 5;
/// Default dwell time per batch (20 minutes)
pub const DEFAULT_BATCH_TIMEOUT_SECONDS: u64 = 20 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotorConfig {
    /// Workers launched together in one batch
    pub batch_size: usize,
    /// How long each batch is kept alive before teardown
    pub batch_timeout_seconds: u64,
    /// Restart from the first batch after the last one, until interrupted
    pub infinite_mode: bool,
    /// Delay between a start request and the running probe
    pub startup_grace_ms: u64,
    /// Spacing of dwell countdown notifications
    pub progress_interval_seconds: u64,
    /// Lines of output fetched from a worker that failed to start
    pub output_tail_lines: usize,
    /// Upper bound on the best-effort output fetch
    pub output_fetch_timeout_ms: u64,
    /// Remove environments after stopping them
    pub remove_on_stop: bool,
    /// Capacity of the status event broadcast channel
    pub event_channel_capacity: usize,
    pub driver: DriverConfig,
}

impl Default for RotorConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_timeout_seconds: DEFAULT_BATCH_TIMEOUT_SECONDS,
            infinite_mode: false,
            startup_grace_ms: 5000,
            progress_interval_seconds: 60,
            output_tail_lines: 20,
            output_fetch_timeout_ms: 3000,
            remove_on_stop: true,
            event_channel_capacity: 1000,
            driver: DriverConfig::default(),
        }
    }
}

impl RotorConfig {
    /// Defaults overridden by `FLEET_ROTOR__*` environment variables only
    pub fn from_env() -> ConfigResult<Self> {
        ConfigLoader::new().load()
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_seconds)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_seconds)
    }

    pub fn output_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.output_fetch_timeout_ms)
    }

    /// Check every value that would make a run meaningless
    pub fn validate(&self) -> ConfigResult<()> {
        if self.batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "batch_size",
                self.batch_size,
                "must be greater than zero",
            ));
        }
        if self.batch_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "batch_timeout_seconds",
                self.batch_timeout_seconds,
                "must be greater than zero",
            ));
        }
        if self.progress_interval_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "progress_interval_seconds",
                self.progress_interval_seconds,
                "must be greater than zero",
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "event_channel_capacity",
                self.event_channel_capacity,
                "must be greater than zero",
            ));
        }
        self.driver.validate()
    }
}

/// Settings for the container runtime driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Runtime CLI invoked for every operation (`docker`, `podman`, ...)
    pub runtime_binary: String,
    /// Image each worker environment is created from
    pub image: String,
    /// Environment names are `<name_prefix>-<identity>`
    pub name_prefix: String,
    /// Extra arguments inserted before the image in `run`
    pub extra_args: Vec<String>,
    /// Bound on any single runtime command
    pub command_timeout_seconds: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            runtime_binary: "docker".to_string(),
            image: "fleet-worker:latest".to_string(),
            name_prefix: "fleet-worker".to_string(),
            extra_args: Vec::new(),
            command_timeout_seconds: 60,
        }
    }
}

impl DriverConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_seconds)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.runtime_binary.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "driver.runtime_binary",
                &self.runtime_binary,
                "must not be empty",
            ));
        }
        if self.image.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "driver.image",
                &self.image,
                "must not be empty",
            ));
        }
        if self.command_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "driver.command_timeout_seconds",
                self.command_timeout_seconds,
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RotorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.batch_timeout(), Duration::from_secs(1200));
        assert!(!config.infinite_mode);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = RotorConfig {
            batch_size: 0,
            ..Default::default()
        };
        match config.validate() {
            Err(ConfigurationError::InvalidValue { field, .. }) => assert_eq!(field, "batch_size"),
            other => panic!("expected invalid batch_size, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = RotorConfig {
            batch_timeout_seconds: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_image_rejected() {
        let mut config = RotorConfig::default();
        config.driver.image = "  ".to_string();
        match config.validate() {
            Err(ConfigurationError::InvalidValue { field, .. }) => {
                assert_eq!(field, "driver.image")
            }
            other => panic!("expected invalid driver.image, got {other:?}"),
        }
    }
}
