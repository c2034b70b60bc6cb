use thiserror::Error;

use crate::transport::RawResponse;

/// Construction-time errors for the `fetchkit-api` crate.
///
/// Raised while assembling an [`Executor`](crate::Executor) or its
/// transport, never while a request is in flight. Per-request failures are
/// reported as [`FetchError`] inside an [`Outcome`](crate::Outcome).
#[derive(Debug, Error)]
pub enum Error {
    /// URL parsing error (usually the base origin).
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The underlying HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    /// A configured header name or value is not valid HTTP.
    #[error("Invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },
}

/// A terminal, reportable failure of one logical request.
///
/// Carries enough to tell a transport failure (no status) from an
/// HTTP-level failure (status outside 2xx). Cancellation is never an error;
/// it is [`Outcome::Cancelled`](crate::Outcome::Cancelled).
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    // ── Transport ───────────────────────────────────────────────────
    /// Connection refused, DNS failure, reset, etc. Never retried.
    #[error("Network error: {message}")]
    Network { message: String },

    /// The resolved URL could not be parsed.
    #[error("Invalid request URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    // ── HTTP ────────────────────────────────────────────────────────
    /// Response status outside the success range.
    #[error("HTTP error! Status: {status}")]
    Http { status: u16, response: RawResponse },

    // ── Data ────────────────────────────────────────────────────────
    /// Success status, but the body was not valid JSON for the target type.
    ///
    /// `status` is `None` when decoding a value that was already parsed
    /// (a cached payload, for instance).
    #[error("Deserialization error: {message}")]
    Deserialization {
        message: String,
        status: Option<u16>,
        body: String,
    },

    /// The payload could not be encoded into a request body.
    #[error("Request encoding failed: {message}")]
    Encoding { message: String },
}

impl FetchError {
    /// HTTP status, when the failure happened after a response arrived.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Deserialization { status, .. } => *status,
            Self::Network { .. } | Self::InvalidUrl { .. } | Self::Encoding { .. } => None,
        }
    }

    /// Decode failure for an already-parsed JSON value.
    pub fn decode(error: &serde_json::Error, value: &serde_json::Value) -> Self {
        Self::Deserialization {
            message: error.to_string(),
            status: None,
            body: value.to_string(),
        }
    }

    /// Human-readable message (same as `Display`).
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// The raw response for HTTP-level failures.
    pub fn raw_response(&self) -> Option<&RawResponse> {
        match self {
            Self::Http { response, .. } => Some(response),
            _ => None,
        }
    }

    /// Returns `true` for transport-level failures (no status).
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Returns `true` for 401/403 responses.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }

    /// Returns `true` for 404 responses.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}
