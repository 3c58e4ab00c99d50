//! Weather providers.
//!
//! Each adapter turns one upstream API into a normalized [`CurrentWeather`].
//! [`Provider`] is the closed set of adapters the data manager can build from
//! [`ProviderSettings`].

pub mod open_meteo;
pub mod open_weather_map;

use std::time::Duration;

use chrono::{DateTime, Utc};
use nimbus_core::{OwmApiVersion, WeatherConfig, WeatherProviderKind};
use serde::de::DeserializeOwned;

use crate::error::ProviderError;
use crate::types::CurrentWeather;

pub use open_meteo::OpenMeteo;
pub use open_weather_map::OpenWeatherMap;

pub(crate) const USER_AGENT: &str = concat!("nimbus/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Position used when probing a provider for reachability (Atlanta, GA).
pub(crate) const PROBE_LATITUDE: f64 = 33.749;
pub(crate) const PROBE_LONGITUDE: f64 = -84.388;

/// Provider selection and credentials, read from user preferences.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub kind: WeatherProviderKind,
    pub api_key: Option<String>,
    /// Self-hosted instance or test server; `None` uses the public API
    pub base_url: Option<String>,
    pub owm_api_version: OwmApiVersion,
    pub language: String,
    pub request_timeout: Duration,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: WeatherProviderKind::OpenMeteo,
            api_key: None,
            base_url: None,
            owm_api_version: OwmApiVersion::default(),
            language: "en".to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ProviderSettings {
    pub fn from_config(config: &WeatherConfig) -> Self {
        Self {
            kind: config.provider,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            owm_api_version: config.owm_api_version,
            language: config.language.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    /// API key, ignoring blank values.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// Base URL without a trailing slash.
    pub(crate) fn base_url_or(&self, default: &str) -> String {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }

    pub(crate) fn http_client(&self) -> Result<reqwest::Client, ProviderError> {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(ProviderError::Io)
    }
}

/// A source of normalized weather data.
#[allow(async_fn_in_trait)]
pub trait WeatherProvider {
    fn kind(&self) -> WeatherProviderKind;

    /// Fetch and normalize the weather at a position. `now` decides which
    /// hourly slot counts as the current hour.
    async fn fetch(
        &self,
        latitude: f64,
        longitude: f64,
        now: DateTime<Utc>,
    ) -> Result<CurrentWeather, ProviderError>;
}

/// The adapters available to the data manager.
#[derive(Debug, Clone)]
pub enum Provider {
    OpenMeteo(OpenMeteo),
    OpenWeatherMap(OpenWeatherMap),
}

impl Provider {
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        match settings.kind {
            WeatherProviderKind::OpenMeteo => Ok(Provider::OpenMeteo(OpenMeteo::new(settings)?)),
            WeatherProviderKind::OpenWeatherMap => {
                Ok(Provider::OpenWeatherMap(OpenWeatherMap::new(settings)?))
            }
        }
    }

    /// Check that the provider answers with the configured credentials.
    pub async fn test_connection(&self) -> Result<(), ProviderError> {
        match self {
            Provider::OpenMeteo(p) => p.test_connection().await,
            Provider::OpenWeatherMap(p) => p.test_connection().await,
        }
    }
}

impl WeatherProvider for Provider {
    fn kind(&self) -> WeatherProviderKind {
        match self {
            Provider::OpenMeteo(p) => p.kind(),
            Provider::OpenWeatherMap(p) => p.kind(),
        }
    }

    async fn fetch(
        &self,
        latitude: f64,
        longitude: f64,
        now: DateTime<Utc>,
    ) -> Result<CurrentWeather, ProviderError> {
        match self {
            Provider::OpenMeteo(p) => p.fetch(latitude, longitude, now).await,
            Provider::OpenWeatherMap(p) => p.fetch(latitude, longitude, now).await,
        }
    }
}

/// Build a request URL from a base, a path and query parameters.
pub(crate) fn build_url(
    base: &str,
    path: &str,
    params: &[(&str, String)],
) -> Result<url::Url, ProviderError> {
    let mut url = url::Url::parse(&format!("{}{}", base, path))
        .map_err(|e| ProviderError::Misconfigured(format!("Invalid base URL {}: {}", base, e)))?;
    url.query_pairs_mut()
        .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
    Ok(url)
}

/// GET a URL and decode the JSON body.
///
/// Non-success statuses become [`ProviderError::Http`] with the response
/// body as message; decode failures are split into malformed JSON and
/// unexpected shape.
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: url::Url,
) -> Result<T, ProviderError> {
    let response = client.get(url).send().await.map_err(ProviderError::Io)?;
    let status = response.status();

    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(ProviderError::Http {
            status: status.as_u16(),
            message: if text.is_empty() {
                status.to_string()
            } else {
                text
            },
        });
    }

    let body = response.bytes().await.map_err(ProviderError::Io)?;
    serde_json::from_slice(&body).map_err(ProviderError::from_json)
}

/// Index of the last slot at or before `now`, or 0 when every slot is in
/// the future.
pub(crate) fn current_slot(times: &[i64], now: DateTime<Utc>) -> usize {
    let now = now.timestamp();
    times
        .iter()
        .take_while(|&&t| t <= now)
        .count()
        .saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_api_key_ignores_blank() {
        let mut settings = ProviderSettings::default();
        assert_eq!(settings.api_key(), None);
        settings.api_key = Some("   ".into());
        assert_eq!(settings.api_key(), None);
        settings.api_key = Some(" abc ".into());
        assert_eq!(settings.api_key(), Some("abc"));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let mut settings = ProviderSettings::default();
        assert_eq!(
            settings.base_url_or("https://api.open-meteo.com"),
            "https://api.open-meteo.com"
        );
        settings.base_url = Some("http://localhost:8080/".into());
        assert_eq!(
            settings.base_url_or("https://api.open-meteo.com"),
            "http://localhost:8080"
        );
    }

    #[test]
    fn test_build_url_rejects_garbage_base() {
        let err = build_url("not a url", "/v1/forecast", &[]).unwrap_err();
        assert!(matches!(err, ProviderError::Misconfigured(_)));
    }

    #[test]
    fn test_build_url_encodes_params() {
        let url = build_url(
            "http://localhost:1234",
            "/v1/forecast",
            &[("latitude", "33.749".into()), ("hourly", "a,b".into())],
        )
        .unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("latitude".into(), "33.749".into()));
        assert_eq!(pairs[1], ("hourly".into(), "a,b".into()));
    }

    #[test]
    fn test_current_slot() {
        let now = Utc.timestamp_opt(10_000, 0).unwrap();
        assert_eq!(current_slot(&[6_400, 10_000, 13_600], now), 1);
        assert_eq!(current_slot(&[6_400, 9_999, 13_600], now), 1);
        assert_eq!(current_slot(&[20_000, 23_600], now), 0);
        assert_eq!(current_slot(&[], now), 0);
    }

    #[test]
    fn test_from_settings_requires_owm_key() {
        let settings = ProviderSettings {
            kind: WeatherProviderKind::OpenWeatherMap,
            ..Default::default()
        };
        assert!(matches!(
            Provider::from_settings(&settings),
            Err(ProviderError::Misconfigured(_))
        ));
    }
}
