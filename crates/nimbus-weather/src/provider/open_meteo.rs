//! Open-Meteo adapter.
//!
//! Two requests run concurrently: a one-day "current" request for the
//! present conditions and a multi-day request for the daily, hourly and
//! tri-hourly series. Units are requested in °F, mph and inches.

use chrono::{DateTime, Utc};
use nimbus_core::WeatherProviderKind;
use serde::Deserialize;
use tracing::instrument;

use super::{
    build_url, current_slot, get_json, ProviderSettings, WeatherProvider, PROBE_LATITUDE,
    PROBE_LONGITUDE,
};
use crate::astro;
use crate::describe::long_description;
use crate::error::ProviderError;
use crate::types::{CurrentWeather, DailyAstro, DataPoint, PrecipType, WeatherCondition};
use crate::units;

const OPEN_METEO_API_BASE: &str = "https://api.open-meteo.com";
const FORECAST_PATH: &str = "/v1/forecast";

const CURRENT_HOURLY: &str = "relativehumidity_2m,dewpoint_2m,apparent_temperature,rain,showers,snowfall,surface_pressure,visibility,winddirection_10m,uv_index,is_day";
const FORECAST_HOURLY: &str = "weathercode,precipitation_probability,temperature_2m,rain,showers,snowfall,surface_pressure,dewpoint_2m,relativehumidity_2m,is_day,windspeed_10m,winddirection_10m,uv_index";
const FORECAST_DAILY: &str = "weathercode,temperature_2m_max,temperature_2m_min,uv_index_max,rain_sum,showers_sum,snowfall_sum,precipitation_probability_max,windspeed_10m_max,winddirection_10m_dominant,sunrise,sunset";

const HOURLY_LIMIT: usize = 48;
const HOURS_PER_DAY: usize = 24;
const TRIHOURLY_STEP: usize = 3;

#[derive(Debug, Clone)]
pub struct OpenMeteo {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenMeteo {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        Ok(Self {
            client: settings.http_client()?,
            base_url: settings.base_url_or(OPEN_METEO_API_BASE),
            api_key: settings.api_key().map(str::to_string),
        })
    }

    fn common_params(&self, latitude: f64, longitude: f64) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("latitude", format!("{}", latitude)),
            ("longitude", format!("{}", longitude)),
        ];
        params.extend(
            [
                ("temperature_unit", "fahrenheit"),
                ("windspeed_unit", "mph"),
                ("precipitation_unit", "inch"),
                ("timeformat", "unixtime"),
                ("timezone", "auto"),
            ]
            .map(|(k, v)| (k, v.to_string())),
        );
        params
    }

    fn with_key(&self, mut params: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        if let Some(key) = &self.api_key {
            params.push(("apikey", key.clone()));
        }
        params
    }

    fn current_url(&self, latitude: f64, longitude: f64) -> Result<url::Url, ProviderError> {
        let mut params = self.common_params(latitude, longitude);
        params.push(("hourly", CURRENT_HOURLY.to_string()));
        params.push(("current_weather", "true".to_string()));
        params.push(("forecast_days", "1".to_string()));
        build_url(&self.base_url, FORECAST_PATH, &self.with_key(params))
    }

    fn forecast_url(&self, latitude: f64, longitude: f64) -> Result<url::Url, ProviderError> {
        let mut params = self.common_params(latitude, longitude);
        params.push(("hourly", FORECAST_HOURLY.to_string()));
        params.push(("daily", FORECAST_DAILY.to_string()));
        build_url(&self.base_url, FORECAST_PATH, &self.with_key(params))
    }

    /// Fetch the current conditions for a fixed position to verify the
    /// instance and key.
    #[instrument(skip(self), level = "info")]
    pub async fn test_connection(&self) -> Result<(), ProviderError> {
        let url = self.current_url(PROBE_LATITUDE, PROBE_LONGITUDE)?;
        let _: CurrentResponse = get_json(&self.client, url).await?;
        Ok(())
    }
}

impl WeatherProvider for OpenMeteo {
    fn kind(&self) -> WeatherProviderKind {
        WeatherProviderKind::OpenMeteo
    }

    #[instrument(skip(self, now), level = "info")]
    async fn fetch(
        &self,
        latitude: f64,
        longitude: f64,
        now: DateTime<Utc>,
    ) -> Result<CurrentWeather, ProviderError> {
        let current_url = self.current_url(latitude, longitude)?;
        let forecast_url = self.forecast_url(latitude, longitude)?;

        // Both requests run to completion; the current request's error wins.
        let (current, forecast) = tokio::join!(
            get_json::<CurrentResponse>(&self.client, current_url),
            get_json::<ForecastResponse>(&self.client, forecast_url),
        );

        let (current, forecast) = match (current, forecast) {
            (Ok(c), Ok(f)) => (c, f),
            (Err(e), _) | (Ok(_), Err(e)) => return Err(e),
        };

        Ok(normalize(current, forecast, latitude, longitude, now))
    }
}

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    timezone: String,
    current_weather: CurrentBlock,
    hourly: CurrentHourly,
}

#[derive(Debug, Deserialize)]
struct CurrentBlock {
    temperature: f64,
    windspeed: f64,
    winddirection: f64,
    weathercode: i32,
}

/// Series are nullable per slot; missing series decode as empty.
#[derive(Debug, Deserialize)]
struct CurrentHourly {
    time: Vec<i64>,
    #[serde(default)]
    relativehumidity_2m: Vec<Option<f64>>,
    #[serde(default)]
    dewpoint_2m: Vec<Option<f64>>,
    #[serde(default)]
    apparent_temperature: Vec<Option<f64>>,
    #[serde(default)]
    rain: Vec<Option<f64>>,
    #[serde(default)]
    showers: Vec<Option<f64>>,
    #[serde(default)]
    snowfall: Vec<Option<f64>>,
    #[serde(default)]
    surface_pressure: Vec<Option<f64>>,
    #[serde(default)]
    visibility: Vec<Option<f64>>,
    #[serde(default)]
    uv_index: Vec<Option<f64>>,
    #[serde(default)]
    is_day: Vec<Option<u8>>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    hourly: ForecastHourly,
    daily: ForecastDaily,
}

#[derive(Debug, Deserialize)]
struct ForecastHourly {
    time: Vec<i64>,
    #[serde(default)]
    weathercode: Vec<Option<i32>>,
    #[serde(default)]
    precipitation_probability: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    rain: Vec<Option<f64>>,
    #[serde(default)]
    showers: Vec<Option<f64>>,
    #[serde(default)]
    snowfall: Vec<Option<f64>>,
    #[serde(default)]
    surface_pressure: Vec<Option<f64>>,
    #[serde(default)]
    dewpoint_2m: Vec<Option<f64>>,
    #[serde(default)]
    relativehumidity_2m: Vec<Option<f64>>,
    #[serde(default)]
    is_day: Vec<Option<u8>>,
    #[serde(default)]
    windspeed_10m: Vec<Option<f64>>,
    #[serde(default)]
    winddirection_10m: Vec<Option<f64>>,
    #[serde(default)]
    uv_index: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct ForecastDaily {
    time: Vec<i64>,
    #[serde(default)]
    weathercode: Vec<Option<i32>>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    uv_index_max: Vec<Option<f64>>,
    #[serde(default)]
    rain_sum: Vec<Option<f64>>,
    #[serde(default)]
    showers_sum: Vec<Option<f64>>,
    #[serde(default)]
    snowfall_sum: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_probability_max: Vec<Option<f64>>,
    #[serde(default)]
    windspeed_10m_max: Vec<Option<f64>>,
    #[serde(default)]
    winddirection_10m_dominant: Vec<Option<f64>>,
    #[serde(default)]
    sunrise: Vec<Option<i64>>,
    #[serde(default)]
    sunset: Vec<Option<i64>>,
}

fn at<T: Copy + Default>(series: &[Option<T>], i: usize) -> T {
    series.get(i).copied().flatten().unwrap_or_default()
}

/// Mean of the samples at `slots`, 0 when there are none.
fn day_mean(series: &[Option<f64>], slots: &[usize]) -> f64 {
    if slots.is_empty() {
        return 0.0;
    }
    slots.iter().map(|&i| at(series, i)).sum::<f64>() / slots.len() as f64
}

/// Rain (rain + showers) and snow, converted to millimetres.
fn precipitation(rain_in: f64, snow_in: f64) -> (f64, PrecipType) {
    let rain = units::inches_to_mm(rain_in.max(0.0));
    let snow = units::inches_to_mm(snow_in.max(0.0));
    (rain + snow, PrecipType::from_amounts(rain, snow))
}

/// Human-readable name of a WMO weather code.
pub fn wmo_description(code: i32) -> &'static str {
    match code {
        0 => "Clear Sky",
        1 => "Mainly Clear",
        2 => "Partly Cloudy",
        3 => "Overcast",
        45 => "Fog",
        48 => "Depositing Rime Fog",
        51 => "Light Drizzle",
        53 => "Moderate Drizzle",
        55 => "Dense Drizzle",
        56 => "Light Freezing Drizzle",
        57 => "Dense Freezing Drizzle",
        61 => "Light Rain",
        63 => "Moderate Rain",
        65 => "Heavy Rain",
        66 => "Light Freezing Rain",
        67 => "Heavy Freezing Rain",
        71 => "Light Snow",
        73 => "Moderate Snow",
        75 => "Heavy Snow",
        77 => "Snow Grains",
        80 => "Light Rain Showers",
        81 => "Moderate Rain Showers",
        82 => "Heavy Rain Showers",
        85 => "Light Snow Showers",
        86 => "Heavy Snow Showers",
        95 => "Thunderstorm",
        96 => "Thunderstorm With Light Hail",
        99 => "Thunderstorm With Heavy Hail",
        _ => "Unknown",
    }
}

/// Closest OpenWeatherMap condition id for a WMO weather code.
pub fn wmo_to_owm_id(code: i32) -> u16 {
    match code {
        0 => 800,
        1 => 801,
        2 => 802,
        3 => 804,
        45 => 741,
        48 => 741,
        51 => 300,
        53 => 301,
        55 => 302,
        56 | 57 => 511,
        61 => 500,
        63 => 501,
        65 => 502,
        66 | 67 => 511,
        71 => 600,
        73 => 601,
        75 => 602,
        77 => 600,
        80 => 520,
        81 => 521,
        82 => 522,
        85 => 620,
        86 => 622,
        95 => 211,
        96 => 201,
        99 => 202,
        _ => 0,
    }
}

/// Icon for a WMO code; mainly clear and overcast share the partly cloudy
/// artwork, freezing precipitation gets the hail icon.
pub fn wmo_icon(code: i32, is_day: bool) -> &'static str {
    let condition = match code {
        0 => WeatherCondition::Clear,
        1..=3 => WeatherCondition::PartlyCloudy,
        _ => WeatherCondition::from_wmo_code(code),
    };
    if wmo_description(code) == "Unknown" {
        return "thermometer";
    }
    condition.icon_name(is_day)
}

fn wmo_point(code: i32, is_day: bool) -> DataPoint {
    DataPoint {
        condition_code: wmo_to_owm_id(code),
        condition: WeatherCondition::from_wmo_code(code),
        icon: wmo_icon(code, is_day).to_string(),
        description: wmo_description(code).to_string(),
        is_day,
        ..Default::default()
    }
}

fn normalize(
    current: CurrentResponse,
    forecast: ForecastResponse,
    latitude: f64,
    longitude: f64,
    now: DateTime<Utc>,
) -> CurrentWeather {
    let timezone = current.timezone;

    let ch = &current.hourly;
    let slot = current_slot(&ch.time, now);
    let (intensity, precip_type) = precipitation(
        at(&ch.rain, slot) + at(&ch.showers, slot),
        at(&ch.snowfall, slot),
    );
    let mut now_point = DataPoint {
        dt: ch.time.get(slot).copied().unwrap_or_else(|| now.timestamp()),
        temp: current.current_weather.temperature,
        feels_like: Some(at(&ch.apparent_temperature, slot)),
        visibility: Some(units::cap_visibility(units::feet_to_meters(at(
            &ch.visibility,
            slot,
        )))),
        humidity: units::percent(at(&ch.relativehumidity_2m, slot)),
        wind_speed: current.current_weather.windspeed,
        wind_deg: units::bearing(current.current_weather.winddirection),
        pressure: at(&ch.surface_pressure, slot).max(0.0) as u32,
        dew_point: at(&ch.dewpoint_2m, slot),
        uvi: at(&ch.uv_index, slot),
        precip_intensity: intensity,
        precip_type,
        ..wmo_point(current.current_weather.weathercode, at(&ch.is_day, slot) == 1)
    };
    now_point.long_description = long_description(&now_point);

    let fh = &forecast.hourly;
    let fd = &forecast.daily;

    let daily = fd
        .time
        .iter()
        .enumerate()
        .map(|(i, &day_start)| {
            let day_end = fd.time.get(i + 1).copied();
            let in_day: Vec<usize> = fh
                .time
                .iter()
                .enumerate()
                .filter(|(_, &t)| t >= day_start && day_end.map_or(true, |end| t < end))
                .map(|(ii, _)| ii)
                .take(HOURS_PER_DAY)
                .collect();

            let (intensity, precip_type) = precipitation(
                at(&fd.rain_sum, i) + at(&fd.showers_sum, i),
                at(&fd.snowfall_sum, i),
            );
            let max_temp = at(&fd.temperature_2m_max, i);
            let min_temp = at(&fd.temperature_2m_min, i);

            let start = DateTime::from_timestamp(day_start, 0).unwrap_or(now);
            let moon = astro::moon_times(start, latitude, longitude);
            let noon = start + chrono::Duration::hours(12);

            let mut point = DataPoint {
                dt: day_start,
                temp: max_temp,
                min_temp: Some(min_temp),
                max_temp: Some(max_temp),
                humidity: units::percent(day_mean(&fh.relativehumidity_2m, &in_day)),
                wind_speed: at(&fd.windspeed_10m_max, i),
                wind_deg: units::bearing(at(&fd.winddirection_10m_dominant, i)),
                pressure: day_mean(&fh.surface_pressure, &in_day).max(0.0) as u32,
                dew_point: day_mean(&fh.dewpoint_2m, &in_day),
                uvi: at(&fd.uv_index_max, i),
                pop: units::percent(at(&fd.precipitation_probability_max, i)),
                precip_intensity: intensity,
                precip_type,
                astro: Some(DailyAstro {
                    sunrise: fd.sunrise.get(i).copied().flatten(),
                    sunset: fd.sunset.get(i).copied().flatten(),
                    moonrise: moon.rise,
                    moonset: moon.set,
                    moon_phase: astro::moon_phase(noon),
                }),
                ..wmo_point(at(&fd.weathercode, i), true)
            };
            point.long_description = long_description(&point);
            point
        })
        .collect();

    let hourly_point = |i: usize| {
        let (intensity, precip_type) = precipitation(
            at(&fh.rain, i) + at(&fh.showers, i),
            at(&fh.snowfall, i),
        );
        let mut point = DataPoint {
            dt: fh.time[i],
            temp: at(&fh.temperature_2m, i),
            humidity: units::percent(at(&fh.relativehumidity_2m, i)),
            wind_speed: at(&fh.windspeed_10m, i),
            wind_deg: units::bearing(at(&fh.winddirection_10m, i)),
            pressure: at(&fh.surface_pressure, i).max(0.0) as u32,
            dew_point: at(&fh.dewpoint_2m, i),
            uvi: at(&fh.uv_index, i),
            pop: units::percent(at(&fh.precipitation_probability, i)),
            precip_intensity: intensity,
            precip_type,
            ..wmo_point(at(&fh.weathercode, i), at(&fh.is_day, i) == 1)
        };
        point.long_description = long_description(&point);
        point
    };

    let this_hour = current_slot(&fh.time, now);
    let hourly = (this_hour..fh.time.len())
        .take(HOURLY_LIMIT)
        .map(hourly_point)
        .collect();

    let now_secs = now.timestamp();
    let trihourly = (0..fh.time.len())
        .step_by(TRIHOURLY_STEP)
        .filter(|&i| fh.time[i] > now_secs)
        .map(hourly_point)
        .collect();

    CurrentWeather {
        timestamp: now,
        timezone,
        provider: WeatherProviderKind::OpenMeteo,
        current: now_point,
        daily,
        hourly,
        trihourly,
        alerts: Vec::new(),
    }
}
