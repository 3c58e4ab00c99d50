//! Location collaborators: where the device is, and which places the user
//! keeps.

use std::future::Future;

use parking_lot::RwLock;
use thiserror::Error;

use crate::error::FetchError;
use crate::types::{Coordinates, WeatherLocation};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location services disabled")]
    Disabled,

    #[error("Location request timed out")]
    Timeout,

    #[error("Location error: {0}")]
    Other(String),
}

impl From<LocationError> for FetchError {
    fn from(err: LocationError) -> Self {
        match err {
            LocationError::PermissionDenied => FetchError::LocationPermissionDenied,
            LocationError::Disabled => FetchError::LocationDisabled,
            LocationError::Timeout | LocationError::Other(_) => FetchError::LocationUnavailable,
        }
    }
}

/// Source of the device position.
///
/// `background` is set when the request does not come from a visible
/// screen; platform locators may use a coarser or cheaper fix then.
pub trait DeviceLocator: Send + Sync {
    /// Last position the platform remembers, if any. Must not block on a fix.
    fn last_known(
        &self,
        background: bool,
    ) -> impl Future<Output = Result<Option<Coordinates>, LocationError>> + Send;

    /// Ask the platform for a fresh position.
    fn obtain_current(
        &self,
        background: bool,
    ) -> impl Future<Output = Result<Option<Coordinates>, LocationError>> + Send;
}

/// Locator for hosts without positioning support.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableLocator;

impl DeviceLocator for UnavailableLocator {
    async fn last_known(&self, _background: bool) -> Result<Option<Coordinates>, LocationError> {
        Err(LocationError::Disabled)
    }

    async fn obtain_current(
        &self,
        _background: bool,
    ) -> Result<Option<Coordinates>, LocationError> {
        Err(LocationError::Disabled)
    }
}

/// Locator that always reports the same position.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocator(pub Coordinates);

impl DeviceLocator for FixedLocator {
    async fn last_known(&self, _background: bool) -> Result<Option<Coordinates>, LocationError> {
        Ok(Some(self.0))
    }

    async fn obtain_current(
        &self,
        _background: bool,
    ) -> Result<Option<Coordinates>, LocationError> {
        Ok(Some(self.0))
    }
}

/// Read access to the user's saved locations.
pub trait LocationStore: Send + Sync {
    fn list(&self) -> Vec<WeatherLocation>;

    fn selected(&self) -> Option<WeatherLocation> {
        self.list().into_iter().find(|l| l.is_selected)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryLocationStore {
    locations: RwLock<Vec<WeatherLocation>>,
}

impl InMemoryLocationStore {
    pub fn new(locations: Vec<WeatherLocation>) -> Self {
        Self {
            locations: RwLock::new(locations),
        }
    }

    /// Add a location and make it the selected one.
    pub fn add_selected(&self, mut location: WeatherLocation) {
        let mut locations = self.locations.write();
        for existing in locations.iter_mut() {
            existing.is_selected = false;
        }
        location.is_selected = true;
        location.order = locations.iter().map(|l| l.order + 1).max().unwrap_or(0);
        locations.push(location);
    }
}

impl LocationStore for InMemoryLocationStore {
    /// Locations in display order.
    fn list(&self) -> Vec<WeatherLocation> {
        let mut locations = self.locations.read().clone();
        locations.sort_by_key(|l| l.order);
        locations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_errors_map_to_fetch_errors() {
        assert!(matches!(
            FetchError::from(LocationError::PermissionDenied),
            FetchError::LocationPermissionDenied
        ));
        assert!(matches!(
            FetchError::from(LocationError::Disabled),
            FetchError::LocationDisabled
        ));
        assert!(matches!(
            FetchError::from(LocationError::Timeout),
            FetchError::LocationUnavailable
        ));
    }

    #[tokio::test]
    async fn test_fixed_and_unavailable_locators() {
        let here = Coordinates::new(45.5, -122.6);
        assert_eq!(FixedLocator(here).last_known(false).await, Ok(Some(here)));
        assert_eq!(
            UnavailableLocator.obtain_current(true).await,
            Err(LocationError::Disabled)
        );
    }

    #[test]
    fn test_store_selection_and_order() {
        let store = InMemoryLocationStore::default();
        assert!(store.selected().is_none());

        store.add_selected(WeatherLocation::fixed("Atlanta", 33.749, -84.388));
        store.add_selected(WeatherLocation::fixed("Portland", 45.5, -122.6));

        let list = store.list();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name, "Atlanta");
        assert_eq!(list[1].order, 1);
        assert_eq!(store.selected().map(|l| l.name), Some("Portland".to_string()));
    }
}
