use anyhow::Result;

use crate::{Config, ConfigError, ValidationResult};

/// Application root: owns the loaded configuration and hands it out to the
/// components the binary wires together.
pub struct App {
    config: Config,
    validation: ValidationResult,
}

impl App {
    /// Build an application around an already-loaded configuration.
    ///
    /// Validation happens here, once; warnings are kept for the caller to
    /// log after the subscriber is installed.
    pub fn with_config(config: Config) -> Result<Self> {
        let validation = config.validate();
        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }
        Ok(Self { config, validation })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Warnings collected while validating the configuration.
    pub fn warnings(&self) -> &ValidationResult {
        &self.validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_config_rejects_invalid() {
        let mut config = Config::default();
        config.weather.request_timeout_secs = 0;
        let err = App::with_config(config).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_with_config_keeps_warnings() {
        let mut config = Config::default();
        config.weather.cache_ttl_secs = 0;
        let app = App::with_config(config).unwrap();
        assert_eq!(app.config().weather.cache_ttl_secs, 0);
        assert!(!app.warnings().warnings.is_empty());
    }

    #[test]
    fn test_loaded_file_is_validated_once_with_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[logging]\nlevel = \"chatty\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        let app = App::with_config(config).unwrap();
        assert_eq!(app.warnings().warnings.len(), 1);
        assert_eq!(app.warnings().warnings[0].field, "logging.level");
    }
}
