//! Configuration file loader.

use super::error::{ConfigError, ConfigResult};
use super::types::Config;
use super::validation::Validator;
use std::path::Path;
use tracing::{debug, warn};

/// Origin reported for configuration parsed from a string.
const INLINE_ORIGIN: &str = "<string>";

/// Reads, validates and writes transport configuration files.
///
/// Every registered validator runs on each load and save. Warnings are
/// logged; errors from all validators are reported together.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    validators: Vec<Box<dyn Validator>>,
}

impl ConfigLoader {
    /// Create a loader without validators.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a validator.
    #[must_use]
    pub fn with_validator<V: Validator + 'static>(mut self, validator: V) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] for a missing file,
    /// [`ConfigError::ReadError`] or [`ConfigError::ParseError`] for an
    /// unreadable file and [`ConfigError::ValidationError`] if any validator
    /// rejects it.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> ConfigResult<Config> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::NotFound(path.to_path_buf()),
            _ => ConfigError::ReadError {
                path: path.to_path_buf(),
                source: e,
            },
        })?;

        let config = self.parse(&content, &path.display().to_string())?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ParseError`] for malformed TOML and
    /// [`ConfigError::ValidationError`] if any validator rejects it.
    pub fn load_str(&self, content: &str) -> ConfigResult<Config> {
        self.parse(content, INLINE_ORIGIN)
    }

    /// Load configuration from `path`, falling back to the defaults when the
    /// file does not exist. The defaults are validated like a loaded file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be loaded.
    pub fn load_or_default<P: AsRef<Path>>(&self, path: P) -> ConfigResult<Config> {
        match self.load(&path) {
            Err(ConfigError::NotFound(missing)) => {
                debug!(path = %missing.display(), "No configuration file, using defaults");
                let config = Config::default();
                self.validate(&config)?;
                Ok(config)
            },
            result => result,
        }
    }

    /// Validate `config` and write it to `path` as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] without touching the file if
    /// the configuration is rejected, and [`ConfigError::SerializeError`] or
    /// [`ConfigError::WriteError`] if writing fails.
    pub fn save<P: AsRef<Path>>(&self, config: &Config, path: P) -> ConfigResult<()> {
        self.validate(config)?;
        let path = path.as_ref();
        let content = toml::to_string_pretty(config)?;
        std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn parse(&self, content: &str, origin: &str) -> ConfigResult<Config> {
        let config: Config = toml::from_str(content).map_err(|source| ConfigError::ParseError {
            origin: origin.to_string(),
            source,
        })?;
        self.validate(&config)?;
        Ok(config)
    }

    fn validate(&self, config: &Config) -> ConfigResult<()> {
        let mut errors = Vec::new();
        for result in self.validators.iter().map(|v| v.validate(config)) {
            for warning in result.warnings() {
                warn!(field = %warning.field, "{}", warning.message);
            }
            errors.extend(
                result
                    .errors_only()
                    .iter()
                    .map(|e| format!("{}: {}", e.field, e.message)),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationError(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BasicValidator, CloseStatusCheck};
    use std::time::Duration;
    use tempfile::tempdir;

    fn validating() -> ConfigLoader {
        ConfigLoader::new().with_validator(BasicValidator::new())
    }

    #[test]
    fn test_load_from_string() {
        let config = validating()
            .load_str(
                r#"
            [transport]
            receive_buffer_size = 512
        "#,
            )
            .unwrap();
        assert_eq!(config.transport.receive_buffer_size, 512);
        assert_eq!(config.transport.close_status_check, CloseStatusCheck::Strict);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("transport.toml");
        std::fs::write(
            &config_path,
            r#"
            [transport]
            close_status_check = "disabled"
        "#,
        )
        .unwrap();

        let config = validating().load(&config_path).unwrap();
        assert_eq!(
            config.transport.close_status_check,
            CloseStatusCheck::Disabled
        );
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("broken.toml");
        std::fs::write(&config_path, "[transport\n").unwrap();

        let err = validating().load(&config_path).unwrap_err();
        match err {
            ConfigError::ParseError { origin, .. } => assert!(origin.ends_with("broken.toml")),
            other => panic!("expected parse error, got {other:?}"),
        }
        assert!(matches!(
            validating().load_str("receive_buffer_size = ").unwrap_err(),
            ConfigError::ParseError { origin, .. } if origin == INLINE_ORIGIN
        ));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = validating().load("/nonexistent/path/transport.toml");
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_or_default() {
        let config = validating()
            .load_or_default("/nonexistent/path/transport.toml")
            .unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_all_validation_errors_reported() {
        let result = validating().load_str(
            r#"
            [transport]
            receive_buffer_size = 0
            wait_poll_interval = "0s"
        "#,
        );
        match result {
            Err(ConfigError::ValidationError(errors)) => {
                assert_eq!(errors.len(), 2);
                assert!(errors[0].starts_with("transport.receive_buffer_size"));
            },
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("saved.toml");

        let mut config = Config::default();
        config.transport.wait_poll_interval = Duration::from_millis(25);

        let loader = validating();
        loader.save(&config, &config_path).unwrap();
        let loaded = loader.load(&config_path).unwrap();
        assert_eq!(loaded.transport.wait_poll_interval, Duration::from_millis(25));
    }

    #[test]
    fn test_save_refuses_invalid_config() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("invalid.toml");

        let mut config = Config::default();
        config.transport.receive_buffer_size = 0;

        let err = validating().save(&config, &config_path).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
        assert!(!config_path.exists());
    }
}
