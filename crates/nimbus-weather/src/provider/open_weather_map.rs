//! OpenWeatherMap One Call adapter (API 2.5 and 3.0).

use chrono::{DateTime, Utc};
use nimbus_core::{OwmApiVersion, WeatherProviderKind};
use serde::Deserialize;
use tracing::instrument;

use super::{
    build_url, get_json, ProviderSettings, WeatherProvider, PROBE_LATITUDE, PROBE_LONGITUDE,
};
use crate::describe::{long_description, title_case};
use crate::error::ProviderError;
use crate::types::{Alert, CurrentWeather, DailyAstro, DataPoint, PrecipType, WeatherCondition};
use crate::units;

const OWM_API_BASE: &str = "https://api.openweathermap.org";
const HOURLY_LIMIT: usize = 48;
const TRIHOURLY_STEP: usize = 3;

/// Map a locale such as `pt_BR` or `zh-TW` to an OpenWeatherMap `lang` value.
pub fn owm_language(locale: &str) -> String {
    let normalized = locale.trim().replace('-', "_");
    let mut parts = normalized.split('_');
    let language = parts.next().unwrap_or_default().to_lowercase();
    let country = parts.next().unwrap_or_default().to_uppercase();

    let lang = match (language.as_str(), country.as_str()) {
        ("", _) => "en",
        ("pt", "BR") => "pt_br",
        ("zh", "" | "CN") => "zh_cn",
        ("zh", "TW") => "zh_tw",
        (other, _) => other,
    };
    lang.to_string()
}

/// Icon for a condition id and icon code (`01d` .. `50n`).
///
/// Freezing rain and tornado ids override the generic icon code.
pub fn owm_icon(id: u16, icon: &str) -> &'static str {
    let is_day = !icon.ends_with('n');
    match (id, is_day) {
        (611..=613, true) => return "cloud_hail_sun",
        (611..=613, false) => return "cloud_hail_moon",
        (781, _) => return "tornado",
        _ => {}
    }

    match icon {
        "01d" => "sun",
        "01n" => "moon_25",
        "02d" | "03d" | "04d" => "cloud_sun",
        "02n" | "03n" | "04n" => "cloud_moon",
        "09d" => "cloud_drizzle_sun",
        "09n" => "cloud_drizzle_moon",
        "10d" => "cloud_rain_sun",
        "10n" => "cloud_rain_moon",
        "11d" => "cloud_rain_lightning_sun",
        "11n" => "cloud_rain_lightning_moon",
        "13d" => "cloud_snow_sun",
        "13n" => "cloud_snow_moon",
        "50d" => "cloud_fog_sun",
        "50n" => "cloud_fog_moon",
        _ => "thermometer",
    }
}

#[derive(Debug, Clone)]
pub struct OpenWeatherMap {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    version: OwmApiVersion,
    language: String,
}

impl OpenWeatherMap {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let api_key = settings.api_key().ok_or_else(|| {
            ProviderError::Misconfigured("OpenWeatherMap requires an API key".to_string())
        })?;

        Ok(Self {
            client: settings.http_client()?,
            base_url: settings.base_url_or(OWM_API_BASE),
            api_key: api_key.to_string(),
            version: settings.owm_api_version,
            language: owm_language(&settings.language),
        })
    }

    fn one_call_url(
        &self,
        version: OwmApiVersion,
        latitude: f64,
        longitude: f64,
    ) -> Result<url::Url, ProviderError> {
        build_url(
            &self.base_url,
            &format!("/data/{}/onecall", version.path_segment()),
            &[
                ("appid", self.api_key.clone()),
                ("lat", format!("{}", latitude)),
                ("lon", format!("{}", longitude)),
                ("lang", self.language.clone()),
                ("units", "imperial".to_string()),
            ],
        )
    }

    /// `Ok(true)` if the version answered, `Ok(false)` on an HTTP error
    /// status, `Err` if the server could not be reached.
    async fn probe(&self, version: OwmApiVersion) -> Result<bool, ProviderError> {
        let url = self.one_call_url(version, PROBE_LATITUDE, PROBE_LONGITUDE)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(ProviderError::Io)?;
        Ok(response.status().is_success())
    }

    /// Find which One Call generation the key is entitled to.
    ///
    /// Both versions are probed concurrently. A network failure on either
    /// probe is an error; otherwise the newest version that answered wins,
    /// and `None` means the key works for neither.
    #[instrument(skip(self), level = "info")]
    pub async fn determine_api_version(&self) -> Result<Option<OwmApiVersion>, ProviderError> {
        let (v3, v2) = tokio::join!(
            self.probe(OwmApiVersion::OneCall3_0),
            self.probe(OwmApiVersion::OneCall2_5),
        );
        let (v3, v2) = (v3?, v2?);

        let version = if v3 {
            Some(OwmApiVersion::OneCall3_0)
        } else if v2 {
            Some(OwmApiVersion::OneCall2_5)
        } else {
            None
        };
        tracing::info!("OpenWeatherMap API version: {:?}", version);
        Ok(version)
    }

    #[instrument(skip(self), level = "info")]
    pub async fn test_connection(&self) -> Result<(), ProviderError> {
        let url = self.one_call_url(self.version, PROBE_LATITUDE, PROBE_LONGITUDE)?;
        let _: OneCallResponse = get_json(&self.client, url).await?;
        Ok(())
    }
}

impl WeatherProvider for OpenWeatherMap {
    fn kind(&self) -> WeatherProviderKind {
        WeatherProviderKind::OpenWeatherMap
    }

    #[instrument(skip(self, now), level = "info")]
    async fn fetch(
        &self,
        latitude: f64,
        longitude: f64,
        now: DateTime<Utc>,
    ) -> Result<CurrentWeather, ProviderError> {
        let url = self.one_call_url(self.version, latitude, longitude)?;
        let response: OneCallResponse = get_json(&self.client, url).await?;
        Ok(normalize(response, now))
    }
}

#[derive(Debug, Deserialize)]
struct OneCallResponse {
    timezone: String,
    current: Conditions,
    #[serde(default)]
    hourly: Vec<Conditions>,
    #[serde(default)]
    daily: Vec<Daily>,
    #[serde(default)]
    alerts: Vec<OwmAlert>,
}

#[derive(Debug, Deserialize)]
struct Weather {
    id: u16,
    #[serde(default)]
    description: String,
    #[serde(default)]
    icon: String,
}

#[derive(Debug, Default, Deserialize)]
struct Volume {
    #[serde(rename = "1h", default)]
    one_hour: f64,
}

/// Shape shared by `current` and `hourly` entries.
#[derive(Debug, Deserialize)]
struct Conditions {
    dt: i64,
    temp: f64,
    #[serde(default)]
    feels_like: Option<f64>,
    #[serde(default)]
    visibility: Option<f64>,
    humidity: f64,
    wind_speed: f64,
    #[serde(default)]
    wind_deg: f64,
    pressure: f64,
    dew_point: f64,
    #[serde(default)]
    uvi: f64,
    #[serde(default)]
    pop: f64,
    #[serde(default)]
    weather: Vec<Weather>,
    #[serde(default)]
    rain: Option<Volume>,
    #[serde(default)]
    snow: Option<Volume>,
}

#[derive(Debug, Deserialize)]
struct DailyTemp {
    min: f64,
    max: f64,
}

#[derive(Debug, Deserialize)]
struct Daily {
    dt: i64,
    temp: DailyTemp,
    humidity: f64,
    pressure: f64,
    dew_point: f64,
    wind_speed: f64,
    #[serde(default)]
    wind_deg: f64,
    #[serde(default)]
    pop: f64,
    #[serde(default)]
    weather: Vec<Weather>,
    #[serde(default)]
    rain: f64,
    #[serde(default)]
    snow: f64,
    #[serde(default)]
    uvi: f64,
    #[serde(default)]
    sunrise: i64,
    #[serde(default)]
    sunset: i64,
    #[serde(default)]
    moonrise: i64,
    #[serde(default)]
    moonset: i64,
    #[serde(default)]
    moon_phase: f64,
}

#[derive(Debug, Deserialize)]
struct OwmAlert {
    #[serde(default)]
    sender_name: String,
    event: String,
    start: i64,
    end: i64,
    #[serde(default)]
    description: String,
}

/// Condition fields shared by every data point built from a `weather` list.
fn condition_point(weather: &[Weather]) -> DataPoint {
    match weather.first() {
        Some(primary) => {
            let is_day = !primary.icon.ends_with('n');
            let description = weather
                .iter()
                .map(|w| title_case(&w.description))
                .filter(|d| !d.is_empty())
                .collect::<Vec<_>>()
                .join(", ");
            DataPoint {
                condition_code: primary.id,
                condition: WeatherCondition::from_owm_id(primary.id),
                icon: owm_icon(primary.id, &primary.icon).to_string(),
                description,
                is_day,
                ..Default::default()
            }
        }
        None => DataPoint {
            icon: "thermometer".to_string(),
            description: "Unknown".to_string(),
            is_day: true,
            ..Default::default()
        },
    }
}

fn nonzero(epoch: i64) -> Option<i64> {
    (epoch != 0).then_some(epoch)
}

fn conditions_point(c: &Conditions, with_feels_like: bool) -> DataPoint {
    let rain = c.rain.as_ref().map_or(0.0, |v| v.one_hour);
    let snow = c.snow.as_ref().map_or(0.0, |v| v.one_hour);
    let mut point = DataPoint {
        dt: c.dt,
        temp: c.temp,
        feels_like: if with_feels_like { c.feels_like } else { None },
        visibility: c.visibility.map(units::cap_visibility),
        humidity: units::percent(c.humidity),
        wind_speed: c.wind_speed,
        wind_deg: units::bearing(c.wind_deg),
        pressure: c.pressure.max(0.0) as u32,
        dew_point: c.dew_point,
        uvi: c.uvi,
        pop: units::percent(c.pop * 100.0),
        precip_intensity: rain + snow,
        precip_type: PrecipType::from_amounts(rain, snow),
        ..condition_point(&c.weather)
    };
    point.long_description = long_description(&point);
    point
}

fn daily_point(d: &Daily) -> DataPoint {
    let mut point = DataPoint {
        dt: d.dt,
        temp: d.temp.max,
        min_temp: Some(d.temp.min),
        max_temp: Some(d.temp.max),
        humidity: units::percent(d.humidity),
        wind_speed: d.wind_speed,
        wind_deg: units::bearing(d.wind_deg),
        pressure: d.pressure.max(0.0) as u32,
        dew_point: d.dew_point,
        uvi: d.uvi,
        pop: units::percent(d.pop * 100.0),
        precip_intensity: d.rain + d.snow,
        precip_type: PrecipType::from_amounts(d.rain, d.snow),
        astro: Some(DailyAstro {
            sunrise: nonzero(d.sunrise),
            sunset: nonzero(d.sunset),
            moonrise: nonzero(d.moonrise),
            moonset: nonzero(d.moonset),
            moon_phase: d.moon_phase,
        }),
        ..condition_point(&d.weather)
    };
    point.long_description = long_description(&point);
    point
}

fn normalize(response: OneCallResponse, now: DateTime<Utc>) -> CurrentWeather {
    let now_secs = now.timestamp();

    let trihourly = response
        .hourly
        .iter()
        .step_by(TRIHOURLY_STEP)
        .filter(|h| h.dt > now_secs)
        .map(|h| conditions_point(h, false))
        .collect();

    CurrentWeather {
        timestamp: now,
        timezone: response.timezone,
        provider: WeatherProviderKind::OpenWeatherMap,
        current: conditions_point(&response.current, true),
        daily: response.daily.iter().map(daily_point).collect(),
        hourly: response
            .hourly
            .iter()
            .take(HOURLY_LIMIT)
            .map(|h| conditions_point(h, false))
            .collect(),
        trihourly,
        alerts: response
            .alerts
            .into_iter()
            .map(|a| Alert {
                sender_name: a.sender_name,
                event: a.event,
                start: a.start,
                end: a.end,
                description: a.description,
            })
            .collect(),
    }
}
