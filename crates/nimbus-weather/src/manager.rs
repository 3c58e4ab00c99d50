//! Fetch orchestration: location resolution, cache tiers, provider calls.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nimbus_core::{Config, WeatherProviderKind};
use parking_lot::Mutex;
use tracing::instrument;

use crate::cache::{FileCache, MemoryCache};
use crate::error::FetchError;
use crate::location::DeviceLocator;
use crate::provider::{Provider, ProviderSettings, WeatherProvider};
use crate::retry::{with_retry, RetryConfig};
use crate::types::{Coordinates, CurrentWeather, LocationKey, WeatherLocation};

pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// One request for weather data.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub location: WeatherLocation,
    pub settings: ProviderSettings,
    /// Snapshot timestamp the caller is already showing
    pub last_displayed: Option<DateTime<Utc>>,
    /// Passed through to the device locator
    pub background: bool,
}

impl FetchRequest {
    pub fn new(location: WeatherLocation, settings: ProviderSettings) -> Self {
        Self {
            location,
            settings,
            last_displayed: None,
            background: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Success,
    /// The snapshot is the one the caller already displays
    NoNewData,
}

#[derive(Debug, Clone)]
pub struct WeatherUpdate {
    pub status: FetchStatus,
    pub weather: Arc<CurrentWeather>,
    pub location_key: LocationKey,
}

/// Result of looking at the cache tiers only.
#[derive(Debug, Clone)]
pub enum CacheLookup {
    /// Younger than the TTL; no network needed
    Fresh(WeatherUpdate),
    /// Usable as a placeholder until a refresh lands
    Stale(WeatherUpdate),
    Miss(LocationKey),
}

/// Owns both cache tiers and drives provider fetches.
///
/// Construct one per application and share it through an `Arc`.
#[derive(Debug)]
pub struct WeatherDataManager {
    memory: MemoryCache,
    files: FileCache,
    ttl: Duration,
    retry: RetryConfig,
    active_provider: Mutex<Option<WeatherProviderKind>>,
}

impl WeatherDataManager {
    pub fn new(cache_dir: impl Into<PathBuf>, ttl: Duration, retry: RetryConfig) -> Self {
        Self {
            memory: MemoryCache::new(),
            files: FileCache::new(cache_dir),
            ttl,
            retry,
            active_provider: Mutex::new(None),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.cache.directory.clone(),
            Duration::from_secs(config.weather.cache_ttl_secs),
            RetryConfig::from_config(&config.weather),
        )
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Full resolution: fresh cache, then network, then stale disk data if
    /// the network failed.
    #[instrument(skip_all, fields(location = %request.location.name))]
    pub async fn get_weather<L>(
        &self,
        request: &FetchRequest,
        locator: &L,
    ) -> Result<WeatherUpdate, FetchError>
    where
        L: DeviceLocator,
    {
        let coordinates = self.locate(request, locator).await?;

        match self.resolve_cached(request, coordinates) {
            CacheLookup::Fresh(update) => Ok(update),
            CacheLookup::Miss(_) => self.refresh(request, coordinates).await,
            CacheLookup::Stale(stale) => match self.refresh(request, coordinates).await {
                Ok(update) => Ok(update),
                Err(e) => {
                    tracing::warn!(
                        "Refresh failed, serving stale data for {}: {}",
                        stale.location_key,
                        e
                    );
                    Ok(stale)
                }
            },
        }
    }

    /// Coordinates for the requested location, asking the device for the
    /// current position when needed.
    pub async fn locate<L>(
        &self,
        request: &FetchRequest,
        locator: &L,
    ) -> Result<Coordinates, FetchError>
    where
        L: DeviceLocator,
    {
        if !request.location.is_current_location {
            return Ok(request.location.coordinates());
        }

        if let Some(position) = locator.last_known(request.background).await? {
            return Ok(position);
        }

        locator
            .obtain_current(request.background)
            .await?
            .ok_or(FetchError::LocationUnavailable)
    }

    /// Consult memory, then disk, without touching the network.
    ///
    /// A disk hit is promoted into memory. Disk snapshots from another
    /// provider are deleted.
    pub fn resolve_cached(&self, request: &FetchRequest, coordinates: Coordinates) -> CacheLookup {
        let kind = request.settings.kind;
        self.switch_provider(kind);
        let key = LocationKey::from(coordinates);
        let now = Utc::now();

        if let Some(weather) = self.memory.get(&key) {
            if weather.provider == kind && weather.is_fresh(now, self.ttl) {
                tracing::debug!("Memory cache hit for {}", key);
                return CacheLookup::Fresh(self.update(request, key, weather));
            }
        }

        let Some(weather) = self.files.read(&key) else {
            return CacheLookup::Miss(key);
        };

        if weather.provider != kind {
            tracing::debug!("Discarding {} snapshot for {}", weather.provider, key);
            self.files.remove(&key);
            return CacheLookup::Miss(key);
        }

        let weather = Arc::new(weather);
        self.memory.insert(key, Arc::clone(&weather));
        let fresh = weather.is_fresh(now, self.ttl);
        tracing::debug!("Disk cache hit for {} (fresh: {})", key, fresh);

        let update = self.update(request, key, weather);
        if fresh {
            CacheLookup::Fresh(update)
        } else {
            CacheLookup::Stale(update)
        }
    }

    /// Fetch from the provider and store the result in both tiers.
    #[instrument(skip(self, request), fields(provider = %request.settings.kind))]
    pub async fn refresh(
        &self,
        request: &FetchRequest,
        coordinates: Coordinates,
    ) -> Result<WeatherUpdate, FetchError> {
        self.switch_provider(request.settings.kind);
        let provider = Provider::from_settings(&request.settings)?;
        let key = LocationKey::from(coordinates);
        let now = Utc::now();

        let weather = with_retry(&self.retry, || {
            provider.fetch(coordinates.latitude, coordinates.longitude, now)
        })
        .await?;

        tracing::info!("Fetched weather for {} from {}", key, provider.kind());
        let weather = Arc::new(weather);
        self.memory.insert(key, Arc::clone(&weather));

        let files = self.files.clone();
        let snapshot = Arc::clone(&weather);
        tokio::task::spawn_blocking(move || files.write(&key, &snapshot));

        Ok(self.update(request, key, weather))
    }

    /// Drop both tiers.
    pub fn clear_cache(&self) {
        self.memory.clear();
        let removed = self.files.clear();
        tracing::info!("Weather cache cleared ({} files)", removed);
    }

    /// Delete disk snapshots for places that are no longer tracked.
    ///
    /// Current-location entries have no stored position, so whatever is in
    /// memory is kept as well.
    pub fn sweep_disk_cache(&self, tracked: &[WeatherLocation]) -> usize {
        let mut keep: HashSet<LocationKey> = tracked
            .iter()
            .filter(|l| !l.is_current_location)
            .map(|l| LocationKey::from(l.coordinates()))
            .collect();
        keep.extend(self.memory.keys());

        let removed = self.files.sweep(&keep);
        if removed > 0 {
            tracing::info!("Swept {} stale weather cache files", removed);
        }
        removed
    }

    pub fn memory_entries(&self) -> Vec<(LocationKey, Arc<CurrentWeather>)> {
        self.memory.entries()
    }

    pub fn file_cache(&self) -> &FileCache {
        &self.files
    }

    /// Record the provider in use; a change invalidates both tiers.
    fn switch_provider(&self, kind: WeatherProviderKind) {
        let mut active = self.active_provider.lock();
        match *active {
            Some(previous) if previous != kind => {
                tracing::info!("Weather provider changed from {} to {}", previous, kind);
                self.memory.clear();
                self.files.clear();
            }
            _ => {}
        }
        *active = Some(kind);
    }

    fn update(
        &self,
        request: &FetchRequest,
        key: LocationKey,
        weather: Arc<CurrentWeather>,
    ) -> WeatherUpdate {
        let status = match request.last_displayed {
            Some(shown) if shown >= weather.timestamp => FetchStatus::NoNewData,
            _ => FetchStatus::Success,
        };
        WeatherUpdate {
            status,
            weather,
            location_key: key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{FixedLocator, UnavailableLocator};
    use crate::types::DataPoint;
    use tempfile::tempdir;

    fn snapshot(provider: WeatherProviderKind, age_secs: i64) -> CurrentWeather {
        CurrentWeather {
            timestamp: Utc::now() - chrono::Duration::seconds(age_secs),
            timezone: "UTC".into(),
            provider,
            current: DataPoint::default(),
            daily: vec![],
            hourly: vec![],
            trihourly: vec![],
            alerts: vec![],
        }
    }

    fn request(kind: WeatherProviderKind) -> FetchRequest {
        FetchRequest::new(
            WeatherLocation::fixed("Atlanta", 33.749, -84.388),
            ProviderSettings {
                kind,
                ..Default::default()
            },
        )
    }

    fn atlanta() -> Coordinates {
        Coordinates::new(33.749, -84.388)
    }

    #[tokio::test]
    async fn test_locate_stored_location() {
        let dir = tempdir().unwrap();
        let manager = WeatherDataManager::new(dir.path(), DEFAULT_TTL, RetryConfig::default());
        let coords = manager
            .locate(&request(WeatherProviderKind::OpenMeteo), &UnavailableLocator)
            .await
            .unwrap();
        assert_eq!(coords, atlanta());
    }

    #[tokio::test]
    async fn test_locate_current_location() {
        let dir = tempdir().unwrap();
        let manager = WeatherDataManager::new(dir.path(), DEFAULT_TTL, RetryConfig::default());
        let mut req = request(WeatherProviderKind::OpenMeteo);
        req.location = WeatherLocation::current_location();

        let here = Coordinates::new(45.5, -122.6);
        assert_eq!(manager.locate(&req, &FixedLocator(here)).await.unwrap(), here);
        assert!(matches!(
            manager.locate(&req, &UnavailableLocator).await,
            Err(FetchError::LocationDisabled)
        ));
    }

    #[test]
    fn test_resolve_cached_fresh_and_stale_disk() {
        let dir = tempdir().unwrap();
        let manager = WeatherDataManager::new(dir.path(), DEFAULT_TTL, RetryConfig::default());
        let key = LocationKey::from(atlanta());
        let req = request(WeatherProviderKind::OpenMeteo);

        assert!(matches!(manager.resolve_cached(&req, atlanta()), CacheLookup::Miss(k) if k == key));

        manager
            .file_cache()
            .write(&key, &snapshot(WeatherProviderKind::OpenMeteo, 600));
        assert!(matches!(manager.resolve_cached(&req, atlanta()), CacheLookup::Stale(_)));
        // Promoted into memory even though it is stale.
        assert_eq!(manager.memory_entries().len(), 1);

        manager
            .file_cache()
            .write(&key, &snapshot(WeatherProviderKind::OpenMeteo, 0));
        manager.memory.clear();
        assert!(matches!(manager.resolve_cached(&req, atlanta()), CacheLookup::Fresh(_)));
    }

    #[test]
    fn test_disk_snapshot_from_other_provider_is_discarded() {
        let dir = tempdir().unwrap();
        let manager = WeatherDataManager::new(dir.path(), DEFAULT_TTL, RetryConfig::default());
        let key = LocationKey::from(atlanta());
        manager
            .file_cache()
            .write(&key, &snapshot(WeatherProviderKind::OpenWeatherMap, 0));

        let lookup = manager.resolve_cached(&request(WeatherProviderKind::OpenMeteo), atlanta());
        assert!(matches!(lookup, CacheLookup::Miss(_)));
        assert!(!manager.file_cache().path_for(&key).exists());
    }

    #[test]
    fn test_no_new_data_when_already_displayed() {
        let dir = tempdir().unwrap();
        let manager = WeatherDataManager::new(dir.path(), DEFAULT_TTL, RetryConfig::default());
        let key = LocationKey::from(atlanta());
        let weather = snapshot(WeatherProviderKind::OpenMeteo, 0);
        let shown = weather.timestamp;
        manager.memory.insert(key, Arc::new(weather));

        let mut req = request(WeatherProviderKind::OpenMeteo);
        req.last_displayed = Some(shown);
        match manager.resolve_cached(&req, atlanta()) {
            CacheLookup::Fresh(update) => assert_eq!(update.status, FetchStatus::NoNewData),
            other => panic!("expected fresh hit, got {:?}", other),
        }
    }

    #[test]
    fn test_provider_switch_clears_both_tiers() {
        let dir = tempdir().unwrap();
        let manager = WeatherDataManager::new(dir.path(), DEFAULT_TTL, RetryConfig::default());
        let key = LocationKey::from(atlanta());
        let weather = snapshot(WeatherProviderKind::OpenMeteo, 0);

        manager.resolve_cached(&request(WeatherProviderKind::OpenMeteo), atlanta());
        manager.memory.insert(key, Arc::new(weather.clone()));
        manager.file_cache().write(&key, &weather);

        let lookup = manager.resolve_cached(&request(WeatherProviderKind::OpenWeatherMap), atlanta());
        assert!(matches!(lookup, CacheLookup::Miss(_)));
        assert!(manager.memory_entries().is_empty());
        assert!(manager.file_cache().keys().is_empty());
    }

    #[test]
    fn test_sweep_keeps_tracked_and_memory_keys() {
        let dir = tempdir().unwrap();
        let manager = WeatherDataManager::new(dir.path(), DEFAULT_TTL, RetryConfig::default());
        let weather = snapshot(WeatherProviderKind::OpenMeteo, 0);

        let tracked = LocationKey::new(33.749, -84.388);
        let in_memory = LocationKey::new(45.5, -122.6);
        let orphan = LocationKey::new(51.5, -0.127);
        for key in [tracked, in_memory, orphan] {
            manager.file_cache().write(&key, &weather);
        }
        manager.memory.insert(in_memory, Arc::new(weather));

        let locations = vec![
            WeatherLocation::fixed("Atlanta", 33.749, -84.388),
            WeatherLocation::current_location(),
        ];
        assert_eq!(manager.sweep_disk_cache(&locations), 1);

        let mut left = manager.file_cache().keys();
        left.sort();
        let mut expected = vec![tracked, in_memory];
        expected.sort();
        assert_eq!(left, expected);
    }

    #[tokio::test]
    async fn test_misconfigured_provider_is_not_retried() {
        let dir = tempdir().unwrap();
        let manager = WeatherDataManager::new(dir.path(), DEFAULT_TTL, RetryConfig::default());
        let result = manager
            .get_weather(&request(WeatherProviderKind::OpenWeatherMap), &UnavailableLocator)
            .await;
        assert!(matches!(result, Err(FetchError::Misconfigured(_))));
    }
}
