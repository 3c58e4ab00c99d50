use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub weather: WeatherConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which upstream service supplies forecasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WeatherProviderKind {
    #[default]
    OpenMeteo,
    OpenWeatherMap,
}

impl WeatherProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeatherProviderKind::OpenMeteo => "openmeteo",
            WeatherProviderKind::OpenWeatherMap => "openweathermap",
        }
    }
}

impl std::fmt::Display for WeatherProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OpenWeatherMap One Call API generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OwmApiVersion {
    #[default]
    #[serde(rename = "onecall_3_0")]
    OneCall3_0,
    #[serde(rename = "onecall_2_5")]
    OneCall2_5,
}

impl OwmApiVersion {
    /// Path segment used in `/data/{version}/onecall`.
    pub fn path_segment(&self) -> &'static str {
        match self {
            OwmApiVersion::OneCall2_5 => "2.5",
            OwmApiVersion::OneCall3_0 => "3.0",
        }
    }
}

/// Temperature unit preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Auto,
    Celsius,
    Fahrenheit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub provider: WeatherProviderKind,

    /// API key; required for OpenWeatherMap, optional for Open-Meteo
    pub api_key: Option<String>,

    /// Self-hosted instance or mock server URL
    pub base_url: Option<String>,

    pub owm_api_version: OwmApiVersion,

    /// Locale used for provider descriptions (e.g. "en", "pt_BR")
    pub language: String,

    /// How long an in-memory snapshot counts as fresh
    pub cache_ttl_secs: u64,

    pub max_attempts: u32,

    /// Fixed pause after each transient failure
    pub retry_delay_secs: u64,

    pub request_timeout_secs: u64,

    pub temperature_unit: TemperatureUnit,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            provider: WeatherProviderKind::OpenMeteo,
            api_key: None,
            base_url: None,
            owm_api_version: OwmApiVersion::default(),
            language: "en".to_string(),
            cache_ttl_secs: 60,
            max_attempts: 3,
            retry_delay_secs: 5,
            request_timeout_secs: 30,
            temperature_unit: TemperatureUnit::Auto,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding one JSON snapshot per location
    #[serde(default = "default_cache_directory")]
    pub directory: PathBuf,
}

fn default_cache_directory() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nimbus")
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: default_cache_directory(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path, writing defaults there when
    /// the file is missing.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if let Some(base_url) = &self.weather.base_url {
            self.validate_url(base_url, "weather.base_url", &mut result);
        }

        let has_key = self
            .weather
            .api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty());
        if self.weather.provider == WeatherProviderKind::OpenWeatherMap && !has_key {
            result.add_error(
                "weather.api_key",
                "OpenWeatherMap requires an API key",
            );
        }

        if self.weather.max_attempts == 0 {
            result.add_error("weather.max_attempts", "At least one attempt is required");
        } else if self.weather.max_attempts > 10 {
            result.add_warning(
                "weather.max_attempts",
                "More than 10 attempts may keep a fetch running for minutes",
            );
        }

        if self.weather.cache_ttl_secs == 0 {
            result.add_warning(
                "weather.cache_ttl_secs",
                "In-memory cache disabled (0 seconds)",
            );
        }

        if self.weather.request_timeout_secs == 0 {
            result.add_error(
                "weather.request_timeout_secs",
                "Request timeout must be greater than 0",
            );
        }

        if self.weather.language.trim().is_empty() {
            result.add_warning("weather.language", "Empty language, falling back to English");
        }

        if self.cache.directory.exists() && !self.cache.directory.is_dir() {
            result.add_error(
                "cache.directory",
                format!(
                    "Path is not a directory: {}",
                    self.cache.directory.display()
                ),
            );
        }

        if tracing_level_is_unknown(&self.logging.level) {
            result.add_warning(
                "logging.level",
                format!("Unrecognized log level: {}", self.logging.level),
            );
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }

                if let Some(port) = url.port() {
                    if port == 0 {
                        result.add_error(field_name, "Port cannot be 0");
                    }
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("nimbus");

        Ok(config_dir.join("config.toml"))
    }
}

fn tracing_level_is_unknown(level: &str) -> bool {
    // Only the bare level names are checked; directive strings pass through.
    if level.contains('=') || level.contains(',') {
        return false;
    }
    !matches!(
        level.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error" | "off"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_valid(), "Default config should be valid: {:?}", result.errors);
    }

    #[test]
    fn test_default_retry_policy() {
        let weather = WeatherConfig::default();
        assert_eq!(weather.cache_ttl_secs, 60);
        assert_eq!(weather.max_attempts, 3);
        assert_eq!(weather.retry_delay_secs, 5);
        assert_eq!(weather.provider, WeatherProviderKind::OpenMeteo);
    }

    #[test]
    fn test_invalid_url() {
        let mut config = Config::default();
        config.weather.base_url = Some("not-a-url".to_string());
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "weather.base_url"));
    }

    #[test]
    fn test_invalid_url_scheme() {
        let mut config = Config::default();
        config.weather.base_url = Some("ftp://localhost:8080".to_string());
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.message.contains("http or https")));
    }

    #[test]
    fn test_openweathermap_requires_key() {
        let mut config = Config::default();
        config.weather.provider = WeatherProviderKind::OpenWeatherMap;
        let result = config.validate();
        assert!(result.errors.iter().any(|e| e.field == "weather.api_key"));

        config.weather.api_key = Some("abc123".to_string());
        assert!(config.validate().is_valid());
    }

    #[test]
    fn test_zero_attempts_is_error() {
        let mut config = Config::default();
        config.weather.max_attempts = 0;
        let result = config.validate();
        assert!(!result.is_valid());
    }

    #[test]
    fn test_unknown_log_level_is_warning() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        let result = config.validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.field == "logging.level"));

        config.logging.level = "nimbus_weather=debug,info".to_string();
        assert!(config.validate().warnings.is_empty());
    }

    #[test]
    fn test_validation_result_error_summary() {
        let mut result = ValidationResult::default();
        result.add_error("field1", "error1");
        result.add_error("field2", "error2");
        let summary = result.error_summary();
        assert!(summary.contains("field1"));
        assert!(summary.contains("field2"));
    }

    #[test]
    fn test_load_from_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.weather.max_attempts, 3);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[weather]\nprovider = \"openweathermap\"\napi_key = \"k\"\nowm_api_version = \"onecall_2_5\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.weather.provider, WeatherProviderKind::OpenWeatherMap);
        assert_eq!(config.weather.owm_api_version, OwmApiVersion::OneCall2_5);
        assert_eq!(config.weather.cache_ttl_secs, 60);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[weather\nprovider = ").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::ParseError(_))
        ));
    }
}
