//! Configuration Loader
//!
//! Layers built-in defaults, an optional settings file and environment
//! variables into a validated [`RotorConfig`].

use super::error::{ConfigResult, ConfigurationError};
use super::RotorConfig;
use config::{Config, Environment, File};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Prefix shared by every environment override, e.g. `FLEET_ROTOR__BATCH_SIZE`
pub const ENV_PREFIX: &str = "FLEET_ROTOR";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env_source: Option<HashMap<String, String>>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read settings from a file; the format follows the extension
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Use the given map instead of the process environment.
    /// Keys keep their `FLEET_ROTOR__` prefix.
    pub fn with_env_overrides(mut self, vars: HashMap<String, String>) -> Self {
        self.env_source = Some(vars);
        self
    }

    pub fn load(&self) -> ConfigResult<RotorConfig> {
        let mut builder = Config::builder();

        if let Some(path) = &self.file {
            if !path.exists() {
                return Err(ConfigurationError::ConfigFileNotFound { path: path.clone() });
            }
            debug!(file = %path.display(), "Loading rotor configuration file");
            builder = builder.add_source(File::from(path.as_path()).required(true));
        }

        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .source(self.env_source.clone());
        builder = builder.add_source(environment);

        let config: RotorConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        debug!(
            batch_size = config.batch_size,
            batch_timeout_seconds = config.batch_timeout_seconds,
            infinite_mode = config.infinite_mode,
            image = %config.driver.image,
            "Rotor configuration loaded"
        );

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn no_env() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn test_defaults_without_sources() {
        let config = ConfigLoader::new()
            .with_env_overrides(no_env())
            .load()
            .unwrap();
        assert_eq!(config, RotorConfig::default());
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "batch_size = 3\nbatch_timeout_seconds = 90\ninfinite_mode = true\n\n[driver]\nimage = \"worker:v2\""
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_file(file.path())
            .with_env_overrides(no_env())
            .load()
            .unwrap();

        assert_eq!(config.batch_size, 3);
        assert_eq!(config.batch_timeout_seconds, 90);
        assert!(config.infinite_mode);
        assert_eq!(config.driver.image, "worker:v2");
        assert_eq!(config.driver.runtime_binary, "docker");
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "batch_size = 3").unwrap();

        let env = HashMap::from([
            ("FLEET_ROTOR__BATCH_SIZE".to_string(), "8".to_string()),
            ("FLEET_ROTOR__DRIVER__NAME_PREFIX".to_string(), "rot".to_string()),
        ]);

        let config = ConfigLoader::new()
            .with_file(file.path())
            .with_env_overrides(env)
            .load()
            .unwrap();

        assert_eq!(config.batch_size, 8);
        assert_eq!(config.driver.name_prefix, "rot");
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let env = HashMap::from([("FLEET_ROTOR__BATCH_SIZE".to_string(), "0".to_string())]);
        let result = ConfigLoader::new().with_env_overrides(env).load();
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidValue { ref field, .. }) if field == "batch_size"
        ));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let result = ConfigLoader::new()
            .with_file("/definitely/not/here/rotor.toml")
            .with_env_overrides(no_env())
            .load();
        assert!(matches!(
            result,
            Err(ConfigurationError::ConfigFileNotFound { .. })
        ));
    }
}
