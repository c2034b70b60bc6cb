// ── Runtime session configuration ──
//
// These types describe where requests go and how credentials are handled.
// They never touch disk; the CLI (or any embedder) builds a `SessionConfig`
// and hands it in.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fetchkit_api::{
    CredentialStore, ExecutorBuilder, HeaderMap, RefreshKeys, RefreshPolicy, TlsMode,
    TransportConfig,
};
use url::Url;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed development servers).
    DangerAcceptInvalid,
}

impl From<&TlsVerification> for TlsMode {
    fn from(tls: &TlsVerification) -> Self {
        match tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        }
    }
}

/// Declarative refresh policy, resolved against a credential store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSettings {
    /// Path of the refresh endpoint, relative to the base URL.
    pub endpoint: String,
    /// Statuses that trigger a refresh.
    pub on: BTreeSet<u16>,
    /// Store keys and JSON field names.
    pub keys: RefreshKeys,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl RefreshSettings {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            on: BTreeSet::from([401, 403]),
            keys: RefreshKeys::default(),
            max_retries: 1,
            retry_delay: Duration::ZERO,
        }
    }

    /// Build the policy. The access key is taken from `access_key` so the
    /// refreshed token lands where the executor reads it.
    pub fn policy(&self, store: Arc<dyn CredentialStore>, access_key: &str) -> RefreshPolicy {
        let keys = RefreshKeys {
            access_key: access_key.to_owned(),
            ..self.keys.clone()
        };
        RefreshPolicy::from_store(store, self.endpoint.clone(), keys)
            .on(self.on.iter().copied())
            .max_retries(self.max_retries)
            .retry_delay(self.retry_delay)
    }
}

/// Configuration for one session against one API.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base URL every path is joined onto.
    pub base_url: Url,
    /// Headers sent with every request.
    pub headers: HeaderMap,
    pub tls: TlsVerification,
    /// Transport timeout. `None` means calls end only on completion or
    /// cancellation.
    pub timeout: Option<Duration>,
    /// Credential key holding the bearer token. `None` sends no bearer.
    pub access_token_key: Option<String>,
    pub refresh: Option<RefreshSettings>,
    /// Share one in-flight refresh among concurrent callers.
    pub dedupe_refresh: bool,
}

impl SessionConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            headers: HeaderMap::new(),
            tls: TlsVerification::default(),
            timeout: None,
            access_token_key: Some(RefreshKeys::default().access_key),
            refresh: None,
            dedupe_refresh: true,
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            tls: TlsMode::from(&self.tls),
            timeout: self.timeout,
            ..TransportConfig::default()
        }
    }

    /// Executor builder preloaded with this config. Add an observer or a
    /// custom transport before building.
    pub fn executor_builder(&self, store: Arc<dyn CredentialStore>) -> ExecutorBuilder {
        let builder = ExecutorBuilder::new(self.base_url.as_str())
            .transport_config(self.transport_config())
            .headers(self.headers.clone())
            .dedupe_refresh(self.dedupe_refresh);
        match &self.access_token_key {
            Some(key) => builder.credentials(store, key.clone()),
            None => builder,
        }
    }

    /// The refresh policy described by `refresh`, if any.
    pub fn refresh_policy(&self, store: Arc<dyn CredentialStore>) -> Option<RefreshPolicy> {
        let access_key = self
            .access_token_key
            .clone()
            .unwrap_or_else(|| RefreshKeys::default().access_key);
        self.refresh
            .as_ref()
            .map(|settings| settings.policy(store, &access_key))
    }
}
