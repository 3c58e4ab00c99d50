use chrono::{DateTime, Utc};
use nimbus_core::WeatherProviderKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw geographic position as reported by a locator or a stored location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Cache key: a position rounded half away from zero to three decimals.
///
/// Stored as integer thousandths so equality and hashing never see float
/// noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationKey {
    lat_milli: i64,
    lon_milli: i64,
}

impl LocationKey {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            lat_milli: round_thousandths(latitude),
            lon_milli: round_thousandths(longitude),
        }
    }

    pub fn latitude(&self) -> f64 {
        self.lat_milli as f64 / 1000.0
    }

    pub fn longitude(&self) -> f64 {
        self.lon_milli as f64 / 1000.0
    }

    /// Name of the on-disk snapshot for this key.
    pub fn file_name(&self) -> String {
        format!(
            "weather_{:.3}_{:.3}.json",
            self.latitude(),
            self.longitude()
        )
    }

    /// Inverse of [`LocationKey::file_name`]; `None` for foreign files.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_prefix("weather_")?.strip_suffix(".json")?;
        let (lat, lon) = stem.split_once('_')?;
        let lat: f64 = lat.parse().ok()?;
        let lon: f64 = lon.parse().ok()?;
        Some(Self::new(lat, lon))
    }
}

/// Thousandths of `value`, rounded half away from zero on its shortest
/// decimal form, so `-131.0715` becomes `-131072` even though the nearest
/// f64 lies just below the half.
fn round_thousandths(value: f64) -> i64 {
    let text = value.abs().to_string();
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), ""));
    let Ok(whole) = whole.parse::<i64>() else {
        // NaN, infinities and magnitudes far outside any coordinate
        return (value * 1000.0).round() as i64;
    };

    let mut digits = fraction.bytes().map(|b| i64::from(b - b'0'));
    let mut milli = whole.saturating_mul(1000);
    for scale in [100, 10, 1] {
        milli += digits.next().unwrap_or(0) * scale;
    }
    if digits.next().is_some_and(|d| d >= 5) {
        milli += 1;
    }

    if value.is_sign_negative() {
        -milli
    } else {
        milli
    }
}

impl From<Coordinates> for LocationKey {
    fn from(c: Coordinates) -> Self {
        Self::new(c.latitude, c.longitude)
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3},{:.3}", self.latitude(), self.longitude())
    }
}

/// A location known to the host application. Consumed read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub name: String,
    /// Resolve through the device locator instead of the stored position
    pub is_current_location: bool,
    pub is_selected: bool,
    pub order: i32,
}

impl WeatherLocation {
    pub fn fixed(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            name: name.into(),
            is_current_location: false,
            is_selected: true,
            order: 0,
        }
    }

    pub fn current_location() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            name: "Current Location".to_string(),
            is_current_location: true,
            is_selected: true,
            order: 0,
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// Weather condition categories shared by every provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    #[default]
    Clear,
    PartlyCloudy,
    Cloudy,
    Fog,
    Drizzle,
    Rain,
    HeavyRain,
    Snow,
    Sleet,
    Thunderstorm,
    Tornado,
}

impl WeatherCondition {
    /// Convert WMO weather code to WeatherCondition
    /// See: https://open-meteo.com/en/docs#weathervariables
    pub fn from_wmo_code(code: i32) -> Self {
        match code {
            0 => Self::Clear,
            1..=2 => Self::PartlyCloudy,
            3 => Self::Cloudy,
            45 | 48 => Self::Fog,
            51 | 53 | 55 => Self::Drizzle,
            56 | 57 => Self::Sleet,
            61 | 63 | 80 => Self::Rain,
            65 | 81 | 82 => Self::HeavyRain,
            66 | 67 => Self::Sleet,
            71 | 73 | 75 | 77 | 85 | 86 => Self::Snow,
            95 | 96 | 99 => Self::Thunderstorm,
            _ => Self::Clear,
        }
    }

    /// Classify an OpenWeatherMap condition id by its group.
    /// See: https://openweathermap.org/weather-conditions
    pub fn from_owm_id(id: u16) -> Self {
        match id {
            200..=299 => Self::Thunderstorm,
            300..=399 => Self::Drizzle,
            511 => Self::Sleet,
            502..=504 | 522 | 531 => Self::HeavyRain,
            500..=599 => Self::Rain,
            611..=616 => Self::Sleet,
            600..=699 => Self::Snow,
            781 => Self::Tornado,
            700..=799 => Self::Fog,
            801 | 802 => Self::PartlyCloudy,
            803 | 804 => Self::Cloudy,
            _ => Self::Clear,
        }
    }

    /// Coarse icon name, used when a provider gives no finer hint.
    pub fn icon_name(&self, is_day: bool) -> &'static str {
        match (self, is_day) {
            (Self::Clear, true) => "sun",
            (Self::Clear, false) => "moon_25",
            (Self::PartlyCloudy | Self::Cloudy, true) => "cloud_sun",
            (Self::PartlyCloudy | Self::Cloudy, false) => "cloud_moon",
            (Self::Fog, true) => "cloud_fog_sun",
            (Self::Fog, false) => "cloud_fog_moon",
            (Self::Drizzle | Self::Rain | Self::HeavyRain, true) => "cloud_rain_sun",
            (Self::Drizzle | Self::Rain | Self::HeavyRain, false) => "cloud_rain_moon",
            (Self::Sleet, true) => "cloud_hail_sun",
            (Self::Sleet, false) => "cloud_hail_moon",
            (Self::Snow, true) => "cloud_snow_sun",
            (Self::Snow, false) => "cloud_snow_moon",
            (Self::Thunderstorm, true) => "cloud_rain_lightning_sun",
            (Self::Thunderstorm, false) => "cloud_rain_lightning_moon",
            (Self::Tornado, _) => "tornado",
        }
    }
}

/// Kind of precipitation reported for a data point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrecipType {
    #[default]
    Rain,
    Snow,
    Mix,
}

impl PrecipType {
    /// Classify from rain and snow amounts (any common unit).
    pub fn from_amounts(rain: f64, snow: f64) -> Self {
        if snow <= 0.0 {
            Self::Rain
        } else if rain <= 0.0 {
            Self::Snow
        } else {
            Self::Mix
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Rain => "Rain",
            Self::Snow => "Snow",
            Self::Mix => "Mix",
        }
    }
}

impl fmt::Display for PrecipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Sun and moon events for one forecast day, as epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DailyAstro {
    pub sunrise: Option<i64>,
    pub sunset: Option<i64>,
    pub moonrise: Option<i64>,
    pub moonset: Option<i64>,
    /// Lunation fraction: 0 new, 0.25 first quarter, 0.5 full, 0.75 last quarter
    pub moon_phase: f64,
}

/// One normalized weather record.
///
/// Units: °F, mph, hPa, mm of precipitation, metres of visibility (at most
/// 10000) and precipitation probability in percent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataPoint {
    /// Epoch seconds
    pub dt: i64,
    pub temp: f64,
    pub min_temp: Option<f64>,
    pub max_temp: Option<f64>,
    pub feels_like: Option<f64>,
    pub visibility: Option<u32>,
    pub humidity: u8,
    pub wind_speed: f64,
    pub wind_deg: u16,
    pub pressure: u32,
    pub dew_point: f64,
    pub uvi: f64,
    pub pop: u8,
    /// OpenWeatherMap-style condition id
    pub condition_code: u16,
    pub condition: WeatherCondition,
    pub icon: String,
    pub description: String,
    pub long_description: String,
    pub precip_intensity: f64,
    pub precip_type: PrecipType,
    pub is_day: bool,
    pub astro: Option<DailyAstro>,
}

/// Importance of an alert, derived from its event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertSeverity {
    Warning,
    Watch,
    Advisory,
}

impl AlertSeverity {
    pub fn sort_key(&self) -> &'static str {
        match self {
            Self::Warning => "0",
            Self::Watch => "1",
            Self::Advisory => "2",
        }
    }
}

/// A government weather alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub sender_name: String,
    pub event: String,
    pub start: i64,
    pub end: i64,
    pub description: String,
}

impl Alert {
    pub fn uri(&self) -> String {
        format!("{} {}", self.event, self.start)
    }

    /// Stable identifier (32-bit FNV-1a of [`Alert::uri`]).
    pub fn id(&self) -> u32 {
        self.uri().bytes().fold(0x811c_9dc5_u32, |hash, byte| {
            (hash ^ u32::from(byte)).wrapping_mul(0x0100_0193)
        })
    }

    pub fn severity(&self) -> AlertSeverity {
        let event = self.event.to_lowercase();
        if event.contains("warning") {
            AlertSeverity::Warning
        } else if event.contains("watch") {
            AlertSeverity::Watch
        } else {
            AlertSeverity::Advisory
        }
    }

    /// Description with wrapped lines joined, bullet/section breaks kept,
    /// markup removed and the sender appended.
    pub fn plain_description(&self) -> String {
        let mut joined = String::with_capacity(self.description.len());
        let mut chars = self.description.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\n' {
                match chars.peek() {
                    Some('*') | Some('.') => joined.push('\n'),
                    _ => joined.push(' '),
                }
            } else {
                joined.push(c);
            }
        }

        let mut plain = String::with_capacity(joined.len());
        let mut in_tag = false;
        for c in joined.chars() {
            match c {
                '<' => in_tag = true,
                '>' if in_tag => in_tag = false,
                _ if !in_tag => plain.push(c),
                _ => {}
            }
        }

        if !self.sender_name.is_empty() {
            plain.push_str("\nVia ");
            plain.push_str(&self.sender_name);
        }
        plain
    }
}

/// Normalized snapshot for one location. Replaced wholesale on refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    /// When the provider produced this snapshot
    pub timestamp: DateTime<Utc>,
    /// IANA zone of the forecast location
    pub timezone: String,
    pub provider: WeatherProviderKind,
    pub current: DataPoint,
    pub daily: Vec<DataPoint>,
    pub hourly: Vec<DataPoint>,
    pub trihourly: Vec<DataPoint>,
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

impl CurrentWeather {
    /// Forecast timezone, UTC when the provider sent an unknown name.
    pub fn tz(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or(chrono_tz::UTC)
    }

    /// Whether the snapshot is younger than `ttl` at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: std::time::Duration) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now.signed_duration_since(self.timestamp) < ttl,
            Err(_) => true,
        }
    }

    /// Alerts still in effect at `now`, most severe first.
    pub fn active_alerts(&self, now: DateTime<Utc>) -> Vec<&Alert> {
        let now = now.timestamp();
        let mut active: Vec<&Alert> = self.alerts.iter().filter(|a| a.end >= now).collect();
        active.sort_by(|a, b| {
            a.severity()
                .sort_key()
                .cmp(b.severity().sort_key())
                .then(a.start.cmp(&b.start))
        });
        active
    }
}
