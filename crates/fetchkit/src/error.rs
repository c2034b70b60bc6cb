//! CLI error types with miette diagnostics.
//!
//! Maps config, core, and per-request failures into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use fetchkit_config::ConfigError;
use fetchkit_core::{CoreError, FetchError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const INTERRUPTED: i32 = 130;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach {url}")]
    #[diagnostic(
        code(fetchkit::connection_failed),
        help("Check that the server is running and the base URL is right.\n{reason}")
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("TLS setup failed: {message}")]
    #[diagnostic(
        code(fetchkit::tls_error),
        help("Use --insecure (-k) for self-signed servers, or set ca_cert in your profile.")
    )]
    Tls { message: String },

    // ── HTTP ─────────────────────────────────────────────────────────
    #[error("{url} answered {status}")]
    #[diagnostic(
        code(fetchkit::unauthorized),
        help(
            "The token was rejected{refresh_note}.\n\
             Store a fresh one with: fetchkit token set accessToken"
        )
    )]
    Unauthorized {
        url: String,
        status: u16,
        refresh_note: String,
    },

    #[error("{url} not found")]
    #[diagnostic(code(fetchkit::not_found))]
    NotFound { url: String },

    #[error("{url} answered {status}")]
    #[diagnostic(code(fetchkit::http_error), help("{body}"))]
    Http { url: String, status: u16, body: String },

    #[error("Response from {url} is not valid JSON: {message}")]
    #[diagnostic(code(fetchkit::decode))]
    Decode { url: String, message: String },

    #[error("Request was cancelled")]
    #[diagnostic(code(fetchkit::cancelled))]
    Cancelled,

    // ── Credentials ──────────────────────────────────────────────────
    #[error("No '{key}' token stored for profile '{profile}'")]
    #[diagnostic(
        code(fetchkit::token_missing),
        help("Store one with: fetchkit token set {key} --profile {profile}")
    )]
    TokenMissing { key: String, profile: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(fetchkit::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(fetchkit::profile_not_found),
        help("Available profiles: {available}\nOr pass --base-url to skip profiles entirely.")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No base URL configured")]
    #[diagnostic(
        code(fetchkit::no_config),
        help(
            "Pass --base-url, or add a profile to the config file.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(fetchkit::config))]
    Config(ConfigError),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(fetchkit::json), help("Check the --data value and try again."))]
    Json(#[from] serde_json::Error),

    #[error("Could not render output: {message}")]
    #[diagnostic(code(fetchkit::output))]
    Output { message: String },
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Tls { .. } => exit_code::CONNECTION,
            Self::Unauthorized { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::TokenMissing { .. } => exit_code::NOT_FOUND,
            Self::Http { status: 409, .. } => exit_code::CONFLICT,
            Self::Validation { .. } | Self::NoConfig { .. } | Self::ProfileNotFound { .. } => {
                exit_code::USAGE
            }
            Self::Cancelled => exit_code::INTERRUPTED,
            _ => exit_code::GENERAL,
        }
    }

    /// Translate a failed request against `url`.
    pub fn request(err: FetchError, url: &str, refreshable: bool) -> Self {
        let url = url.to_owned();
        match err {
            FetchError::Network { message } => Self::ConnectionFailed {
                url,
                reason: message,
            },
            FetchError::InvalidUrl { reason, .. } => Self::Validation {
                field: "path".into(),
                reason,
            },
            FetchError::Http { status, response } => match status {
                401 | 403 => Self::Unauthorized {
                    url,
                    status,
                    refresh_note: if refreshable {
                        " even after a refresh".into()
                    } else {
                        String::new()
                    },
                },
                404 => Self::NotFound { url },
                _ => Self::Http {
                    url,
                    status,
                    body: String::from_utf8_lossy(&response.body).into_owned(),
                },
            },
            FetchError::Deserialization { message, .. } => Self::Decode { url, message },
            FetchError::Encoding { message } => Self::Validation {
                field: "data".into(),
                reason: message,
            },
        }
    }
}

// ── ConfigError / CoreError → CliError mapping ──────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(other),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Tls { message } => CliError::Tls { message },
            CoreError::Fetch(e) => CliError::request(e, "(request)", false),
            CoreError::Cancelled => CliError::Cancelled,
        }
    }
}
