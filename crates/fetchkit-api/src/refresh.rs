// Token refresh policy and in-flight refresh coordination.
//
// A policy says which statuses mean "credentials are stale", where to get
// new ones, and what to do with the response. The coordinator makes sure
// concurrent calls that all hit a stale token share one refresh request
// instead of stampeding the refresh endpoint.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};

use crate::credentials::CredentialStore;

type BodySource = Arc<dyn Fn() -> Value + Send + Sync>;
type ApplyCredential = Arc<dyn Fn(&Value) + Send + Sync>;

/// Statuses that trigger a refresh when a policy doesn't say otherwise.
pub const DEFAULT_TRIGGER_STATUSES: [u16; 2] = [401, 403];

/// When and how to refresh credentials before retrying a call.
///
/// A call made with a policy gets up to `max_retries + 1` attempts. Each
/// attempt that fails with a trigger status, except the last, waits
/// `retry_delay`, posts `body()` to `endpoint`, hands the decoded response
/// to the credential callback, and retries.
#[derive(Clone)]
pub struct RefreshPolicy {
    trigger_statuses: BTreeSet<u16>,
    endpoint: String,
    body: BodySource,
    apply_credential: ApplyCredential,
    max_retries: u32,
    retry_delay: Duration,
}

impl RefreshPolicy {
    /// Policy with a fixed refresh body.
    pub fn new(
        endpoint: impl Into<String>,
        body: Value,
        apply_credential: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Self {
        Self {
            trigger_statuses: DEFAULT_TRIGGER_STATUSES.into_iter().collect(),
            endpoint: endpoint.into(),
            body: Arc::new(move || body.clone()),
            apply_credential: Arc::new(apply_credential),
            max_retries: 1,
            retry_delay: Duration::ZERO,
        }
    }

    /// Policy that reads the refresh token from `store` at refresh time and
    /// writes the new access token back to it.
    pub fn from_store(
        store: Arc<dyn CredentialStore>,
        endpoint: impl Into<String>,
        keys: RefreshKeys,
    ) -> Self {
        let RefreshKeys {
            access_key,
            refresh_key,
            body_field,
            token_field,
        } = keys;

        let reader = Arc::clone(&store);
        let body = move || {
            let token = reader
                .read(&refresh_key)
                .map_or(Value::Null, |t| Value::String(t.expose_secret().to_owned()));
            let mut map = Map::new();
            map.insert(body_field.clone(), token);
            Value::Object(map)
        };

        let apply = move |response: &Value| match response.get(&token_field).and_then(Value::as_str) {
            Some(token) => store.write(&access_key, SecretString::from(token)),
            None => {
                tracing::warn!(field = %token_field, "refresh response has no access token");
            }
        };

        Self::new(endpoint, Value::Null, apply).with_body_source(body)
    }

    /// Replace the trigger statuses.
    pub fn on(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.trigger_statuses = statuses.into_iter().collect();
        self
    }

    /// Compute the refresh body lazily, at the moment each refresh is sent.
    pub fn with_body_source(mut self, body: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.body = Arc::new(body);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn triggers_on(&self, status: u16) -> bool {
        self.trigger_statuses.contains(&status)
    }

    /// Total attempts a call may make under this policy.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn delay(&self) -> Duration {
        self.retry_delay
    }

    pub fn trigger_statuses(&self) -> &BTreeSet<u16> {
        &self.trigger_statuses
    }

    pub(crate) fn body(&self) -> Value {
        (self.body)()
    }

    pub(crate) fn apply(&self, response: &Value) {
        (self.apply_credential)(response);
    }

    /// Identity of a refresh of this policy against `url`. Clones of one
    /// policy share it; a policy with its own body or sink does not.
    pub(crate) fn coordination_key(&self, url: String) -> RefreshKey {
        RefreshKey {
            url,
            body: Arc::clone(&self.body),
            apply_credential: Arc::clone(&self.apply_credential),
        }
    }
}

impl fmt::Debug for RefreshPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshPolicy")
            .field("trigger_statuses", &self.trigger_statuses)
            .field("endpoint", &self.endpoint)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}

/// Store keys and JSON field names used by [`RefreshPolicy::from_store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshKeys {
    /// Store key the new access token is written to.
    pub access_key: String,
    /// Store key the refresh token is read from.
    pub refresh_key: String,
    /// Field of the refresh request body carrying the refresh token.
    pub body_field: String,
    /// Field of the refresh response carrying the new access token.
    pub token_field: String,
}

impl Default for RefreshKeys {
    fn default() -> Self {
        Self {
            access_key: "accessToken".into(),
            refresh_key: "refreshToken".into(),
            body_field: "refreshToken".into(),
            token_field: "accessToken".into(),
        }
    }
}

// ── Coordination ─────────────────────────────────────────────────────

/// A refresh URL plus the body source and credential sink that go with it.
#[derive(Clone)]
pub(crate) struct RefreshKey {
    url: String,
    body: BodySource,
    apply_credential: ApplyCredential,
}

impl PartialEq for RefreshKey {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
            && Arc::ptr_eq(&self.body, &other.body)
            && Arc::ptr_eq(&self.apply_credential, &other.apply_credential)
    }
}

impl Eq for RefreshKey {}

impl Hash for RefreshKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}

impl fmt::Debug for RefreshKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshKey")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

type SharedRefresh = Shared<BoxFuture<'static, ()>>;
type InFlight = Arc<Mutex<HashMap<RefreshKey, (u64, SharedRefresh)>>>;

/// Runs refreshes, optionally sharing one in-flight refresh per URL and
/// policy. Callers whose policies differ never join each other, so every
/// credential sink sees its own refresh response.
///
/// With deduplication on, the refresh runs on its own task: a caller that
/// is cancelled while waiting stops waiting, but the refresh completes for
/// everyone else.
pub(crate) struct RefreshCoordinator {
    dedupe: bool,
    in_flight: InFlight,
    generation: AtomicU64,
}

impl RefreshCoordinator {
    pub(crate) fn new(dedupe: bool) -> Self {
        Self {
            dedupe,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Run `perform` for `key`, or join a refresh already running for it.
    pub(crate) async fn refresh(&self, key: RefreshKey, perform: BoxFuture<'static, ()>) {
        if !self.dedupe {
            perform.await;
            return;
        }

        let shared = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some((_, existing)) = in_flight.get(&key) {
                tracing::debug!(url = %key.url, "joining in-flight refresh");
                existing.clone()
            } else {
                let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                let registry = Arc::clone(&self.in_flight);
                let entry = key.clone();
                let task = tokio::spawn(async move {
                    perform.await;
                    let mut in_flight = registry.lock().unwrap_or_else(PoisonError::into_inner);
                    if in_flight.get(&entry).is_some_and(|(g, _)| *g == generation) {
                        in_flight.remove(&entry);
                    }
                });
                let shared = async move {
                    if let Err(e) = task.await {
                        tracing::warn!(error = %e, "refresh task failed");
                    }
                }
                .boxed()
                .shared();
                in_flight.insert(key, (generation, shared.clone()));
                shared
            }
        };

        shared.await;
    }

    #[cfg(test)]
    fn in_flight_count(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
