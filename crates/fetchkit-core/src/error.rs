// ── Core error types ──
//
// Construction errors from fetchkit-api are translated into
// configuration-level variants; per-request failures pass through as
// `FetchError` so callers keep the status and raw response.

use fetchkit_api::{FetchError, Outcome};
use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("TLS setup failed: {message}")]
    Tls { message: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Request was cancelled")]
    Cancelled,
}

impl From<fetchkit_api::Error> for CoreError {
    fn from(err: fetchkit_api::Error) -> Self {
        match err {
            fetchkit_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid base URL: {e}"),
            },
            fetchkit_api::Error::InvalidHeader { name, reason } => CoreError::Config {
                message: format!("Invalid header '{name}': {reason}"),
            },
            fetchkit_api::Error::Tls(message) => CoreError::Tls { message },
            fetchkit_api::Error::Client(e) => CoreError::Tls {
                message: e.to_string(),
            },
        }
    }
}

/// Collapse an [`Outcome`] into a `Result`, treating cancellation as an error.
pub fn settle<T>(outcome: Outcome<T>) -> Result<T, CoreError> {
    match outcome {
        Outcome::Success(value) => Ok(value),
        Outcome::Failure(e) => Err(CoreError::Fetch(e)),
        Outcome::Cancelled => Err(CoreError::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settle_maps_each_outcome() {
        assert!(matches!(settle(Outcome::Success(1)), Ok(1)));
        assert!(matches!(
            settle::<()>(Outcome::Cancelled),
            Err(CoreError::Cancelled)
        ));
        let failure = Outcome::<()>::Failure(FetchError::Network {
            message: "down".into(),
        });
        let err = settle(failure).err();
        assert_eq!(
            err.map(|e| e.to_string()).as_deref(),
            Some("Network error: down")
        );
    }

    #[test]
    fn invalid_url_becomes_config_error() {
        let err: CoreError = fetchkit_api::Error::InvalidUrl(url::ParseError::EmptyHost).into();
        assert!(matches!(err, CoreError::Config { .. }));
    }
}
