//! Background fetching with results delivered over a channel.
//!
//! Network work runs on the tokio runtime; the host drains the receiver on
//! whichever thread it renders from.

use std::sync::mpsc::Sender;
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::error::FetchError;
use crate::location::DeviceLocator;
use crate::manager::{CacheLookup, FetchRequest, WeatherDataManager, WeatherUpdate};

/// Messages sent from a fetch task back to the host
#[derive(Debug)]
pub enum WeatherServiceMessage {
    /// A fetch started
    Updating,
    /// Stale data to show while the refresh runs
    Cached(WeatherUpdate),
    FetchDone(Result<WeatherUpdate, FetchError>),
}

/// Resolve `request` in the background.
///
/// Sends `Updating`, then `Cached` if only a stale snapshot is available,
/// and always finishes with `FetchDone`.
pub fn request_fetch<L>(
    tx: &Sender<WeatherServiceMessage>,
    runtime: &Handle,
    manager: Arc<WeatherDataManager>,
    request: FetchRequest,
    locator: Arc<L>,
) where
    L: DeviceLocator + 'static,
{
    let tx = tx.clone();
    let _ = tx.send(WeatherServiceMessage::Updating);

    runtime.spawn(async move {
        let result = run_fetch(&tx, &manager, &request, locator.as_ref()).await;
        if let Err(e) = &result {
            tracing::warn!("Weather fetch for {} failed: {}", request.location.name, e);
        }
        let _ = tx.send(WeatherServiceMessage::FetchDone(result));
    });
}

async fn run_fetch<L>(
    tx: &Sender<WeatherServiceMessage>,
    manager: &WeatherDataManager,
    request: &FetchRequest,
    locator: &L,
) -> Result<WeatherUpdate, FetchError>
where
    L: DeviceLocator,
{
    let coordinates = manager.locate(request, locator).await?;

    match manager.resolve_cached(request, coordinates) {
        CacheLookup::Fresh(update) => Ok(update),
        CacheLookup::Stale(update) => {
            let _ = tx.send(WeatherServiceMessage::Cached(update));
            manager.refresh(request, coordinates).await
        }
        CacheLookup::Miss(_) => manager.refresh(request, coordinates).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::UnavailableLocator;
    use crate::provider::ProviderSettings;
    use crate::retry::RetryConfig;
    use crate::types::WeatherLocation;
    use std::sync::mpsc;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_location_failure_is_delivered() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(WeatherDataManager::new(
            dir.path(),
            Duration::from_secs(60),
            RetryConfig::default(),
        ));
        let request = FetchRequest::new(
            WeatherLocation::current_location(),
            ProviderSettings::default(),
        );

        let (tx, rx) = mpsc::channel();
        request_fetch(
            &tx,
            &Handle::current(),
            manager,
            request,
            Arc::new(UnavailableLocator),
        );

        let first = tokio::task::spawn_blocking(move || {
            let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            let second = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            (first, second)
        })
        .await
        .unwrap();

        assert!(matches!(first.0, WeatherServiceMessage::Updating));
        assert!(matches!(
            first.1,
            WeatherServiceMessage::FetchDone(Err(FetchError::LocationDisabled))
        ));
    }
}
