//! Two cache tiers for normalized snapshots, both keyed by [`LocationKey`].

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::{CurrentWeather, LocationKey};

/// In-process tier. Readers never wait on the network.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<LocationKey, Arc<CurrentWeather>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &LocationKey) -> Option<Arc<CurrentWeather>> {
        self.entries.read().get(key).cloned()
    }

    pub fn insert(&self, key: LocationKey, weather: Arc<CurrentWeather>) {
        self.entries.write().insert(key, weather);
    }

    pub fn remove(&self, key: &LocationKey) -> Option<Arc<CurrentWeather>> {
        self.entries.write().remove(key)
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn keys(&self) -> Vec<LocationKey> {
        self.entries.read().keys().copied().collect()
    }

    /// Copy of every entry, sorted by key.
    pub fn entries(&self) -> Vec<(LocationKey, Arc<CurrentWeather>)> {
        let mut entries: Vec<_> = self
            .entries
            .read()
            .iter()
            .map(|(k, v)| (*k, Arc::clone(v)))
            .collect();
        entries.sort_by_key(|(k, _)| *k);
        entries
    }
}

/// On-disk tier: one JSON snapshot per key.
///
/// Nothing here returns an error. Unreadable snapshots are treated as
/// missing, and write failures are logged and dropped.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &LocationKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Load a snapshot. A file that does not parse is deleted.
    pub fn read(&self, key: &LocationKey) -> Option<CurrentWeather> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read cache file {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(weather) => Some(weather),
            Err(e) => {
                tracing::warn!("Discarding corrupt cache file {}: {}", path.display(), e);
                self.remove(key);
                None
            }
        }
    }

    /// Persist a snapshot via temp file and rename. Best-effort.
    pub fn write(&self, key: &LocationKey, weather: &CurrentWeather) {
        match self.try_write(key, weather) {
            Ok(()) => tracing::debug!("Cached weather for {} on disk", key),
            Err(e) => tracing::warn!("Failed to write weather cache for {}: {}", key, e),
        }
    }

    fn try_write(&self, key: &LocationKey, weather: &CurrentWeather) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let bytes = serde_json::to_vec(weather).map_err(io::Error::other)?;

        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{}.tmp", key.file_name()));
        fs::write(&tmp, bytes)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        Ok(())
    }

    pub fn remove(&self, key: &LocationKey) {
        let path = self.path_for(key);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!("Failed to delete cache file {}: {}", path.display(), e);
            }
        }
    }

    /// Delete every snapshot. Returns how many were removed.
    pub fn clear(&self) -> usize {
        self.remove_where(|_| true)
    }

    /// Delete snapshots whose key is not in `tracked`. Returns how many were
    /// removed.
    pub fn sweep(&self, tracked: &HashSet<LocationKey>) -> usize {
        self.remove_where(|key| !tracked.contains(key))
    }

    /// Keys of the snapshots currently on disk.
    pub fn keys(&self) -> Vec<LocationKey> {
        self.snapshot_files().into_iter().map(|(_, k)| k).collect()
    }

    fn remove_where(&self, mut doomed: impl FnMut(&LocationKey) -> bool) -> usize {
        let mut removed = 0;
        for (path, key) in self.snapshot_files() {
            if !doomed(&key) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!("Failed to delete cache file {}: {}", path.display(), e),
            }
        }
        removed
    }

    fn snapshot_files(&self) -> Vec<(PathBuf, LocationKey)> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let key = LocationKey::from_file_name(entry.file_name().to_str()?)?;
                Some((entry.path(), key))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataPoint;
    use chrono::{TimeZone, Utc};
    use nimbus_core::WeatherProviderKind;
    use tempfile::tempdir;

    fn snapshot(temp: f64) -> CurrentWeather {
        CurrentWeather {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
            timezone: "America/New_York".into(),
            provider: WeatherProviderKind::OpenMeteo,
            current: DataPoint {
                temp,
                ..Default::default()
            },
            daily: vec![],
            hourly: vec![],
            trihourly: vec![],
            alerts: vec![],
        }
    }

    #[test]
    fn test_memory_cache_roundtrip() {
        let cache = MemoryCache::new();
        let key = LocationKey::new(33.749, -84.388);
        assert!(cache.get(&key).is_none());

        cache.insert(key, Arc::new(snapshot(50.0)));
        assert_eq!(cache.get(&LocationKey::new(33.74901, -84.38799)).unwrap().current.temp, 50.0);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_file_cache_write_then_read() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path().join("nested"));
        let key = LocationKey::new(33.749, -84.388);

        cache.write(&key, &snapshot(61.5));
        assert!(cache.path_for(&key).exists());
        assert_eq!(cache.read(&key), Some(snapshot(61.5)));
        assert_eq!(cache.keys(), vec![key]);
    }

    #[test]
    fn test_corrupt_file_is_removed() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        let key = LocationKey::new(1.0, 2.0);
        fs::write(cache.path_for(&key), b"{\"timestamp\": ").unwrap();

        assert_eq!(cache.read(&key), None);
        assert!(!cache.path_for(&key).exists());
    }

    #[test]
    fn test_missing_file_reads_none() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        assert_eq!(cache.read(&LocationKey::new(0.0, 0.0)), None);
    }

    #[test]
    fn test_clear_and_sweep_only_touch_snapshots() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path());
        let keep = LocationKey::new(33.749, -84.388);
        let drop = LocationKey::new(45.5, -122.6);
        cache.write(&keep, &snapshot(1.0));
        cache.write(&drop, &snapshot(2.0));
        fs::write(dir.path().join("notes.txt"), b"unrelated").unwrap();

        let tracked: HashSet<_> = [keep].into_iter().collect();
        assert_eq!(cache.sweep(&tracked), 1);
        assert!(cache.path_for(&keep).exists());
        assert!(!cache.path_for(&drop).exists());

        assert_eq!(cache.clear(), 1);
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_unwritable_directory_is_swallowed() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"").unwrap();

        // The cache directory is a regular file, so create_dir_all fails.
        let cache = FileCache::new(&blocker);
        let key = LocationKey::new(1.0, 1.0);
        cache.write(&key, &snapshot(1.0));
        assert_eq!(cache.read(&key), None);
    }
}
