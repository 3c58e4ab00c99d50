//! Weather-specific error types.

use nimbus_core::{AppError, NetworkError, ReqwestErrorExt, WeatherError};
use thiserror::Error;

use crate::retry::Retryable;

/// Failure of a single provider request.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Connection, TLS or body-read failure
    #[error("Network error: {0}")]
    Io(#[source] reqwest::Error),

    #[error("Malformed JSON: {0}")]
    MalformedJson(#[source] serde_json::Error),

    /// Valid JSON that does not have the expected shape
    #[error("Unexpected response shape: {0}")]
    Deserialize(#[source] serde_json::Error),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Provider misconfigured: {0}")]
    Misconfigured(String),
}

impl ProviderError {
    /// Sort a serde_json failure into malformed text vs. wrong shape.
    pub fn from_json(err: serde_json::Error) -> Self {
        use serde_json::error::Category;
        match err.classify() {
            Category::Data => ProviderError::Deserialize(err),
            Category::Syntax | Category::Eof | Category::Io => ProviderError::MalformedJson(err),
        }
    }
}

impl Retryable for ProviderError {
    fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Http { .. })
    }
}

/// Outcome of a failed fetch, as seen by callers of the data manager.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Location permission denied")]
    LocationPermissionDenied,

    #[error("Location services disabled")]
    LocationDisabled,

    #[error("Location unavailable")]
    LocationUnavailable,

    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: ProviderError,
    },

    #[error("Malformed response: {message}")]
    MalformedResponse {
        message: String,
        #[source]
        source: ProviderError,
    },

    #[error("Misconfigured: {0}")]
    Misconfigured(String),
}

impl FetchError {
    /// User-friendly error message for display.
    pub fn user_message(&self) -> &'static str {
        WeatherError::from(self).user_message()
    }

    /// Whether the user can fix this from the location settings.
    pub fn needs_location_settings(&self) -> bool {
        matches!(
            self,
            FetchError::LocationPermissionDenied | FetchError::LocationDisabled
        )
    }
}

impl From<ProviderError> for FetchError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Misconfigured(msg) => FetchError::Misconfigured(msg),
            ProviderError::Io(_) | ProviderError::Http { .. } => FetchError::Transport {
                message: err.to_string(),
                source: err,
            },
            ProviderError::MalformedJson(_) | ProviderError::Deserialize(_) => {
                FetchError::MalformedResponse {
                    message: err.to_string(),
                    source: err,
                }
            }
        }
    }
}

impl From<&FetchError> for WeatherError {
    fn from(err: &FetchError) -> Self {
        match err {
            FetchError::LocationPermissionDenied => WeatherError::LocationPermissionDenied,
            FetchError::LocationDisabled => WeatherError::LocationDisabled,
            FetchError::LocationUnavailable => WeatherError::LocationUnavailable,
            FetchError::Transport { message, .. } => WeatherError::ApiError(message.clone()),
            FetchError::MalformedResponse { message, .. } => {
                WeatherError::MalformedResponse(message.clone())
            }
            FetchError::Misconfigured(msg) => WeatherError::Misconfigured(msg.clone()),
        }
    }
}

/// Transport failures keep their network detail; everything else is a
/// weather error.
impl From<FetchError> for AppError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Transport {
                source: ProviderError::Io(e),
                ..
            } => AppError::Network(e.into_network_error()),
            FetchError::Transport {
                source: ProviderError::Http { status, message },
                ..
            } => AppError::Network(NetworkError::ServerError { status, message }),
            other => AppError::Weather(WeatherError::from(&other)),
        }
    }
}
