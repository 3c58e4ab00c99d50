//! Weather payload in the Gadgetbridge generic weather format.
//!
//! Temperatures are whole Kelvin and wind speed is km/h, as the companion
//! app expects.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{CurrentWeather, DataPoint, WeatherLocation};
use crate::units::{fahrenheit_to_kelvin, mph_to_kmh};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GadgetbridgePayload {
    pub timestamp: i64,
    pub location: String,
    pub current_temp: i32,
    pub today_min_temp: i32,
    pub today_max_temp: i32,
    pub current_condition: String,
    pub current_condition_code: u16,
    pub current_humidity: u8,
    pub wind_speed: f64,
    pub wind_direction: u16,
    pub uv_index: f64,
    pub precip_probability: u8,
    pub dew_point: i32,
    pub pressure: u32,
    pub visibility: u32,
    pub sun_rise: Option<i64>,
    pub sun_set: Option<i64>,
    pub moon_rise: Option<i64>,
    pub moon_set: Option<i64>,
    /// Degrees, 0 new moon, 180 full moon
    pub moon_phase: u16,
    pub feels_like_temp: i32,
    pub forecasts: Vec<DailyForecast>,
    pub hourly: Vec<HourlyForecast>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyForecast {
    pub condition_code: u16,
    pub humidity: u8,
    pub max_temp: i32,
    pub min_temp: i32,
    pub uv_index: f64,
    pub precip_probability: u8,
    pub sun_rise: Option<i64>,
    pub sun_set: Option<i64>,
    pub moon_rise: Option<i64>,
    pub moon_set: Option<i64>,
    pub moon_phase: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyForecast {
    pub timestamp: i64,
    pub temp: i32,
    pub condition_code: u16,
    pub humidity: u8,
    pub wind_speed: f64,
    pub wind_direction: u16,
    pub uv_index: f64,
    pub precip_probability: u8,
}

fn moon_degrees(phase: f64) -> u16 {
    ((phase * 360.0).round() as i64).rem_euclid(360) as u16
}

fn daily_min_max(point: &DataPoint) -> (i32, i32) {
    (
        fahrenheit_to_kelvin(point.min_temp.unwrap_or(point.temp)),
        fahrenheit_to_kelvin(point.max_temp.unwrap_or(point.temp)),
    )
}

impl DailyForecast {
    fn from_point(point: &DataPoint) -> Self {
        let (min_temp, max_temp) = daily_min_max(point);
        let astro = point.astro.unwrap_or_default();
        Self {
            condition_code: point.condition_code,
            humidity: point.humidity,
            max_temp,
            min_temp,
            uv_index: point.uvi,
            precip_probability: point.pop,
            sun_rise: astro.sunrise,
            sun_set: astro.sunset,
            moon_rise: astro.moonrise,
            moon_set: astro.moonset,
            moon_phase: moon_degrees(astro.moon_phase),
        }
    }
}

impl HourlyForecast {
    fn from_point(point: &DataPoint) -> Self {
        Self {
            timestamp: point.dt,
            temp: fahrenheit_to_kelvin(point.temp),
            condition_code: point.condition_code,
            humidity: point.humidity,
            wind_speed: mph_to_kmh(point.wind_speed),
            wind_direction: point.wind_deg,
            uv_index: point.uvi,
            precip_probability: point.pop,
        }
    }
}

impl GadgetbridgePayload {
    pub fn from_weather(
        location: &WeatherLocation,
        weather: &CurrentWeather,
        now: DateTime<Utc>,
    ) -> Self {
        let current = &weather.current;
        let today = weather.daily.first();
        let (today_min_temp, today_max_temp) = today
            .map(daily_min_max)
            .unwrap_or_else(|| {
                let t = fahrenheit_to_kelvin(current.temp);
                (t, t)
            });
        let astro = today.and_then(|d| d.astro).unwrap_or_default();

        Self {
            timestamp: now.timestamp(),
            location: location.name.clone(),
            current_temp: fahrenheit_to_kelvin(current.temp),
            today_min_temp,
            today_max_temp,
            current_condition: current.long_description.clone(),
            current_condition_code: current.condition_code,
            current_humidity: current.humidity,
            wind_speed: mph_to_kmh(current.wind_speed),
            wind_direction: current.wind_deg,
            uv_index: current.uvi,
            precip_probability: today.map_or(current.pop, |d| d.pop),
            dew_point: fahrenheit_to_kelvin(current.dew_point),
            pressure: current.pressure,
            visibility: current.visibility.unwrap_or_default(),
            sun_rise: astro.sunrise,
            sun_set: astro.sunset,
            moon_rise: astro.moonrise,
            moon_set: astro.moonset,
            moon_phase: moon_degrees(astro.moon_phase),
            feels_like_temp: fahrenheit_to_kelvin(current.feels_like.unwrap_or(current.temp)),
            forecasts: weather
                .daily
                .iter()
                .skip(1)
                .map(DailyForecast::from_point)
                .collect(),
            hourly: weather.hourly.iter().map(HourlyForecast::from_point).collect(),
        }
    }
}
