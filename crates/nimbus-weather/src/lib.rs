//! Weather data for Nimbus
//!
//! Fetches forecasts from Open-Meteo or OpenWeatherMap, normalizes them into
//! one model and keeps them in a memory + disk cache keyed by rounded
//! coordinates.

pub mod astro;
pub mod cache;
pub mod describe;
pub mod error;
pub mod gadgetbridge;
pub mod location;
pub mod manager;
pub mod provider;
pub mod retry;
pub mod service;
pub mod types;
pub mod units;

pub use cache::{FileCache, MemoryCache};
pub use error::{FetchError, ProviderError};
pub use gadgetbridge::GadgetbridgePayload;
pub use location::{
    DeviceLocator, FixedLocator, InMemoryLocationStore, LocationError, LocationStore,
    UnavailableLocator,
};
pub use manager::{CacheLookup, FetchRequest, FetchStatus, WeatherDataManager, WeatherUpdate};
pub use provider::{OpenMeteo, OpenWeatherMap, Provider, ProviderSettings, WeatherProvider};
pub use retry::{RetryConfig, Retryable};
pub use service::{request_fetch, WeatherServiceMessage};
pub use types::*;
