//! Shared configuration for fetchkit tools.
//!
//! TOML profiles, credential resolution (flag + env + keyring + plaintext),
//! and translation to `fetchkit_core::SessionConfig`.

mod store;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fetchkit_api::{CredentialStore, HeaderMap, HeaderName, HeaderValue, MemoryCredentialStore};
use fetchkit_core::{RefreshKeys, RefreshSettings, SessionConfig, TlsVerification};

pub use store::KeyringCredentialStore;

/// Keyring service name for stored tokens.
pub const KEYRING_SERVICE: &str = "fetchkit";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{profile}' not found")]
    UnknownProfile { profile: String },

    #[error("no profile selected and no default profile configured")]
    NoProfile,

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named API profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Look up a profile by name, falling back to `default_profile`.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .ok_or(ConfigError::NoProfile)?;
        let profile = self
            .profiles
            .get(&name)
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.clone(),
            })?;
        Ok((name, profile))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Defaults {
    /// Output format: "json", "json-compact", or "yaml".
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default)]
    pub insecure: bool,

    /// Request timeout in seconds. Unset means no timeout.
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            insecure: false,
            timeout: None,
        }
    }
}

fn default_output() -> String {
    "json".into()
}

/// A named API profile.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Profile {
    /// Base URL every path is joined onto (e.g., "http://localhost:3000").
    pub base_url: String,

    /// Headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Credential key the bearer token is read from.
    #[serde(default = "default_access_key")]
    pub access_token_key: String,

    /// Access token (plaintext; prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the access token.
    pub token_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override timeout (seconds).
    pub timeout: Option<u64>,

    /// Token refresh policy.
    pub refresh: Option<RefreshProfile>,
}

fn default_access_key() -> String {
    RefreshKeys::default().access_key
}

/// `[profiles.<name>.refresh]`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RefreshProfile {
    /// Refresh endpoint path, relative to the base URL.
    pub endpoint: String,

    /// Statuses that trigger a refresh.
    #[serde(default = "default_trigger_statuses")]
    pub on: Vec<u16>,

    /// Credential key the refresh token is read from.
    #[serde(default = "default_refresh_key")]
    pub refresh_token_key: String,

    /// Request body field carrying the refresh token.
    #[serde(default = "default_refresh_key")]
    pub body_field: String,

    /// Response field carrying the new access token.
    #[serde(default = "default_access_key")]
    pub token_field: String,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default)]
    pub retry_delay_ms: u64,
}

fn default_trigger_statuses() -> Vec<u16> {
    vec![401, 403]
}
fn default_refresh_key() -> String {
    RefreshKeys::default().refresh_key
}
fn default_max_retries() -> u32 {
    1
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "fetchkit", "fetchkit").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("fetchkit");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from a specific file + `FETCHKIT_`-prefixed environment variables.
///
/// Nested keys use `__`: `FETCHKIT_PROFILES__LOCAL__BASE_URL`.
/// A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("FETCHKIT_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Access token from outside the keyring: CLI flag, then the profile's
/// `token_env` variable, then plaintext `token`.
pub fn override_token(profile: &Profile, flag: Option<&str>) -> Option<SecretString> {
    if let Some(token) = flag {
        return Some(SecretString::from(token));
    }
    if let Some(ref env_name) = profile.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Some(SecretString::from(val));
        }
    }
    profile.token.as_deref().map(SecretString::from)
}

/// Credential store for a profile.
///
/// With an override token the store is in-memory: the token is placed under
/// the access key and the refresh token, if any, is copied from the
/// keyring. Refreshed tokens then live only for this process. Without one,
/// the keyring is used directly and refreshed tokens persist.
pub fn credential_store(
    profile: &Profile,
    profile_name: &str,
    flag_token: Option<&str>,
) -> Arc<dyn CredentialStore> {
    let keyring = KeyringCredentialStore::for_profile(profile_name);

    let Some(token) = override_token(profile, flag_token) else {
        return Arc::new(keyring);
    };

    let memory = MemoryCredentialStore::new();
    memory.write(&profile.access_token_key, token);
    if let Some(refresh) = &profile.refresh {
        if let Some(secret) = keyring.read(&refresh.refresh_token_key) {
            memory.write(&refresh.refresh_token_key, secret);
        }
    }
    Arc::new(memory)
}

// ── Translation ─────────────────────────────────────────────────────

/// Build a `SessionConfig` from a profile and global defaults.
pub fn profile_to_session_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<SessionConfig, ConfigError> {
    let url: url::Url = profile
        .base_url
        .parse()
        .map_err(|_| ConfigError::Validation {
            field: "base_url".into(),
            reason: format!("invalid URL: {}", profile.base_url),
        })?;

    let mut config = SessionConfig::new(url);
    config.headers = parse_headers(&profile.headers)?;
    config.access_token_key = Some(profile.access_token_key.clone());

    config.tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    config.timeout = profile
        .timeout
        .or(defaults.timeout)
        .map(Duration::from_secs);

    config.refresh = profile
        .refresh
        .as_ref()
        .map(|r| refresh_settings(r, &profile.access_token_key))
        .transpose()?;

    Ok(config)
}

fn refresh_settings(refresh: &RefreshProfile, access_key: &str) -> Result<RefreshSettings, ConfigError> {
    if refresh.endpoint.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "refresh.endpoint".into(),
            reason: "must not be empty".into(),
        });
    }
    if let Some(bad) = refresh.on.iter().find(|s| !(100..=599).contains(*s)) {
        return Err(ConfigError::Validation {
            field: "refresh.on".into(),
            reason: format!("{bad} is not an HTTP status"),
        });
    }

    let mut settings = RefreshSettings::new(refresh.endpoint.clone());
    settings.on = refresh.on.iter().copied().collect();
    settings.keys = RefreshKeys {
        access_key: access_key.to_owned(),
        refresh_key: refresh.refresh_token_key.clone(),
        body_field: refresh.body_field.clone(),
        token_field: refresh.token_field.clone(),
    };
    settings.max_retries = refresh.max_retries;
    settings.retry_delay = Duration::from_millis(refresh.retry_delay_ms);
    Ok(settings)
}

/// Parse `name: value` pairs into a header map.
pub fn parse_headers(pairs: &BTreeMap<String, String>) -> Result<HeaderMap, ConfigError> {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| ConfigError::Validation {
                field: format!("headers.{name}"),
                reason: e.to_string(),
            })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| ConfigError::Validation {
            field: format!("headers.{name}"),
            reason: e.to_string(),
        })?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}
