// Verb execution with refresh-and-retry.
//
// One logical call = up to `max_retries + 1` attempts. Only HTTP statuses
// in the policy's trigger set are retried; network failures end the call
// on the spot. Every awaited step (send, retry delay, refresh) races the
// caller's cancellation token, and a cancelled call reports nothing.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::FutureExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::credentials::CredentialStore;
use crate::error::{Error, FetchError};
use crate::headers::{merge_headers, set_bearer, set_json_content_type};
use crate::multipart::{FormOptions, Payload, to_form_entries};
use crate::refresh::{RefreshCoordinator, RefreshPolicy};
use crate::request::{RequestDescriptor, Verb, WriteOptions};
use crate::transport::{
    HttpRequest, RawResponse, RequestBody, ReqwestTransport, Transport, TransportConfig,
};
use crate::url_path::{endpoint_of, join_url};

/// Terminal result of one logical call.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Success(T),
    Failure(FetchError),
    /// The caller cancelled before settlement. Nothing was reported.
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) | Self::Cancelled => None,
        }
    }

    pub fn error(&self) -> Option<&FetchError> {
        match self {
            Self::Failure(e) => Some(e),
            Self::Success(_) | Self::Cancelled => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Success(value) => Outcome::Success(f(value)),
            Self::Failure(e) => Outcome::Failure(e),
            Self::Cancelled => Outcome::Cancelled,
        }
    }

    /// `None` when cancelled, otherwise the settled result.
    pub fn into_result(self) -> Option<Result<T, FetchError>> {
        match self {
            Self::Success(value) => Some(Ok(value)),
            Self::Failure(e) => Some(Err(e)),
            Self::Cancelled => None,
        }
    }
}

/// Reported once per settled (non-cancelled) call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// Fully resolved URL, query included.
    pub url: String,
    /// Path-only form: origin removed, query stripped.
    pub endpoint: String,
    /// Final HTTP status, or `None` if no response arrived.
    pub status: Option<u16>,
}

/// Session-wide settlement callback.
pub type SettlementObserver = Arc<dyn Fn(&Settlement) + Send + Sync>;

// ── Executor ─────────────────────────────────────────────────────────

/// Issues read/create/replace/remove calls against a base URL.
///
/// Cheap to clone; clones share the transport, credential store, and
/// refresh coordination.
#[derive(Clone)]
pub struct Executor {
    inner: Arc<ExecutorInner>,
}

struct ExecutorInner {
    transport: Arc<dyn Transport>,
    base_url: String,
    default_headers: HeaderMap,
    credentials: Option<(Arc<dyn CredentialStore>, String)>,
    observer: Option<SettlementObserver>,
    refresher: RefreshCoordinator,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("base_url", &self.inner.base_url)
            .field("default_headers", &self.inner.default_headers)
            .field(
                "access_key",
                &self.inner.credentials.as_ref().map(|(_, key)| key),
            )
            .finish_non_exhaustive()
    }
}

/// Outcome of a single send.
enum Sent {
    Response(RawResponse),
    Failed(FetchError),
    Cancelled,
}

impl Executor {
    /// Executor with default transport and no credentials.
    pub fn new(base_url: impl Into<String>) -> Result<Self, Error> {
        ExecutorBuilder::new(base_url).build()
    }

    pub fn builder(base_url: impl Into<String>) -> ExecutorBuilder {
        ExecutorBuilder::new(base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn default_headers(&self) -> &HeaderMap {
        &self.inner.default_headers
    }

    /// Normalized absolute URL a descriptor resolves to. This is the
    /// request identity used for caching.
    pub fn resolve_url(&self, request: &RequestDescriptor) -> String {
        join_url(self.origin_for(request), &request.path)
    }

    // ── Verbs ────────────────────────────────────────────────────────

    pub async fn read(
        &self,
        request: &RequestDescriptor,
        policy: Option<&RefreshPolicy>,
    ) -> Outcome<Value> {
        self.read_as(request, policy).await
    }

    /// Read and decode the body into `T`.
    pub async fn read_as<T: DeserializeOwned>(
        &self,
        request: &RequestDescriptor,
        policy: Option<&RefreshPolicy>,
    ) -> Outcome<T> {
        self.execute(Verb::Read, request, None, policy).await
    }

    pub async fn create(
        &self,
        request: &RequestDescriptor,
        payload: &Payload,
        options: &WriteOptions,
        policy: Option<&RefreshPolicy>,
    ) -> Outcome<Value> {
        self.dispatch(Verb::Create, request, Some(payload), options, policy)
            .await
    }

    pub async fn replace(
        &self,
        request: &RequestDescriptor,
        payload: &Payload,
        options: &WriteOptions,
        policy: Option<&RefreshPolicy>,
    ) -> Outcome<Value> {
        self.dispatch(Verb::Replace, request, Some(payload), options, policy)
            .await
    }

    pub async fn remove(
        &self,
        request: &RequestDescriptor,
        policy: Option<&RefreshPolicy>,
    ) -> Outcome<Value> {
        self.execute(Verb::Remove, request, None, policy).await
    }

    /// Run any verb. The payload is ignored for verbs without a body; a
    /// missing payload sends no body.
    pub async fn dispatch(
        &self,
        verb: Verb,
        request: &RequestDescriptor,
        payload: Option<&Payload>,
        options: &WriteOptions,
        policy: Option<&RefreshPolicy>,
    ) -> Outcome<Value> {
        let body = match payload.filter(|_| verb.has_body()) {
            None => None,
            Some(payload) => match encode_payload(payload, options) {
                Ok(body) => Some(body),
                Err(e) => return self.fail_before_send(request, e),
            },
        };
        self.execute(verb, request, body, policy).await
    }

    // ── Internals ────────────────────────────────────────────────────

    fn origin_for<'a>(&'a self, request: &'a RequestDescriptor) -> &'a str {
        request.origin.as_deref().unwrap_or(&self.inner.base_url)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        verb: Verb,
        request: &RequestDescriptor,
        body: Option<RequestBody>,
        policy: Option<&RefreshPolicy>,
    ) -> Outcome<T> {
        let url = self.resolve_url(request);
        let cancel = request.cancel.clone().unwrap_or_default();

        let outcome = match Url::parse(&url) {
            Ok(target) => {
                self.run(verb, target, request, body, policy, &cancel)
                    .await
            }
            Err(e) => Sent::Failed(FetchError::InvalidUrl {
                url: url.clone(),
                reason: e.to_string(),
            }),
        };

        let (outcome, status) = match outcome {
            Sent::Cancelled => return Outcome::Cancelled,
            Sent::Failed(e) => {
                let status = e.status();
                (Outcome::Failure(e), status)
            }
            Sent::Response(response) => match decode(&response) {
                Ok(value) => (Outcome::Success(value), Some(response.status)),
                Err(e) => (Outcome::Failure(e), Some(response.status)),
            },
        };

        if cancel.is_cancelled() {
            return Outcome::Cancelled;
        }
        self.settle(&url, self.origin_for(request), status);
        outcome
    }

    /// The attempt loop. Returns a 2xx response, a terminal failure, or
    /// cancellation.
    async fn run(
        &self,
        verb: Verb,
        target: Url,
        descriptor: &RequestDescriptor,
        body: Option<RequestBody>,
        policy: Option<&RefreshPolicy>,
        cancel: &CancellationToken,
    ) -> Sent {
        let max_attempts = policy.map_or(1, RefreshPolicy::max_attempts);
        let mut attempt = 1;

        loop {
            let request = self.prepare(
                verb,
                target.clone(),
                &descriptor.headers,
                body.clone(),
                Bearer::Stored,
            );
            debug!(method = %verb, url = %target, attempt, "sending request");

            let response = match self.send(request, cancel).await {
                Sent::Response(response) => response,
                other => return other,
            };
            if response.is_success() {
                return Sent::Response(response);
            }

            let status = response.status;
            let retry = policy.filter(|p| p.triggers_on(status) && attempt < max_attempts);
            let Some(policy) = retry else {
                return Sent::Failed(FetchError::Http { status, response });
            };

            debug!(status, attempt, max_attempts, "refreshing credentials before retry");
            if !wait(policy.delay(), cancel).await {
                return Sent::Cancelled;
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Sent::Cancelled,
                () = self.refresh(policy, self.origin_for(descriptor)) => {}
            }
            attempt += 1;
        }
    }

    async fn send(&self, request: HttpRequest, cancel: &CancellationToken) -> Sent {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Sent::Cancelled,
            result = self.inner.transport.send(request) => match result {
                Ok(response) => Sent::Response(response),
                Err(e) => Sent::Failed(FetchError::Network { message: e.message }),
            },
        }
    }

    fn prepare(
        &self,
        verb: Verb,
        url: Url,
        caller: &HeaderMap,
        body: Option<RequestBody>,
        bearer: Bearer,
    ) -> HttpRequest {
        HttpRequest {
            method: verb.method(),
            url,
            headers: self.headers_for(caller, body.as_ref(), bearer),
            body,
        }
    }

    /// Defaults, then caller headers, then content type, then the stored
    /// bearer credential. Later layers win.
    fn headers_for(
        &self,
        caller: &HeaderMap,
        body: Option<&RequestBody>,
        bearer: Bearer,
    ) -> HeaderMap {
        let mut headers = merge_headers(&self.inner.default_headers, caller);
        if matches!(body, Some(RequestBody::Json(_))) {
            set_json_content_type(&mut headers);
        }
        if bearer == Bearer::Stored {
            if let Some((store, key)) = &self.inner.credentials {
                if let Some(token) = store.read(key) {
                    set_bearer(&mut headers, &token);
                }
            }
        }
        headers
    }

    /// Refresh against the origin the failing request went to.
    async fn refresh(&self, policy: &RefreshPolicy, origin: &str) {
        let url = join_url(origin, policy.endpoint());
        let key = policy.coordination_key(url.clone());
        let perform = self.clone().perform_refresh(policy.clone(), url);
        self.inner.refresher.refresh(key, perform.boxed()).await;
    }

    /// POST the refresh body and hand the decoded response to the policy.
    /// Failures are logged and otherwise ignored; the caller retries anyway.
    async fn perform_refresh(self, policy: RefreshPolicy, url: String) {
        let target = match Url::parse(&url) {
            Ok(target) => target,
            Err(e) => {
                warn!(url, error = %e, "invalid refresh URL");
                return;
            }
        };
        let body = match encode_payload(&Payload::from(policy.body()), &WriteOptions::default()) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "could not encode refresh body");
                return;
            }
        };

        debug!(url, "refreshing credentials");
        let request = self.prepare(
            Verb::Create,
            target,
            &HeaderMap::new(),
            Some(body),
            Bearer::Omitted,
        );

        match self.inner.transport.send(request).await {
            Ok(response) if response.is_success() => match decode::<Value>(&response) {
                Ok(value) => policy.apply(&value),
                Err(e) => warn!(url, error = %e, "refresh response was not JSON"),
            },
            Ok(response) => warn!(url, status = response.status, "refresh request failed"),
            Err(e) => warn!(url, error = %e, "refresh request failed"),
        }
    }

    fn settle(&self, url: &str, origin: &str, status: Option<u16>) {
        let settlement = Settlement {
            url: url.to_owned(),
            endpoint: endpoint_of(url, origin),
            status,
        };
        debug!(url, endpoint = %settlement.endpoint, ?status, "request settled");
        if let Some(observer) = &self.inner.observer {
            observer(&settlement);
        }
    }

    fn fail_before_send<T>(&self, request: &RequestDescriptor, error: FetchError) -> Outcome<T> {
        if request.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Outcome::Cancelled;
        }
        let url = self.resolve_url(request);
        self.settle(&url, self.origin_for(request), None);
        Outcome::Failure(error)
    }
}

/// Whether an outgoing request carries the stored bearer credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bearer {
    Stored,
    /// Refresh calls: the stored credential is the one being replaced.
    Omitted,
}

/// Sleep for `delay` unless cancelled first. Returns `false` on cancel.
async fn wait(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}

fn encode_payload(payload: &Payload, options: &WriteOptions) -> Result<RequestBody, FetchError> {
    if options.convert_to_form_data {
        let form = FormOptions {
            remove_nulls: options.remove_if_null,
            repeated_fields: options.repeated_fields.clone(),
        };
        return to_form_entries(payload, &form).map(RequestBody::Multipart);
    }

    let json = if options.remove_if_null {
        payload.clone().without_nulls().to_json()
    } else {
        payload.to_json()
    };
    serde_json::to_vec(&json)
        .map(|bytes| RequestBody::Json(Bytes::from(bytes)))
        .map_err(|e| FetchError::Encoding {
            message: e.to_string(),
        })
}

/// Decode a 2xx body. Blank bodies decode as JSON `null`.
fn decode<T: DeserializeOwned>(response: &RawResponse) -> Result<T, FetchError> {
    let bytes: &[u8] = if response.body.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        &response.body
    };
    serde_json::from_slice(bytes).map_err(|e| FetchError::Deserialization {
        message: e.to_string(),
        status: Some(response.status),
        body: response.text(),
    })
}

// ── Builder ──────────────────────────────────────────────────────────

/// Configures an [`Executor`].
pub struct ExecutorBuilder {
    base_url: String,
    transport: Option<Arc<dyn Transport>>,
    transport_config: TransportConfig,
    headers: HeaderMap,
    credentials: Option<(Arc<dyn CredentialStore>, String)>,
    observer: Option<SettlementObserver>,
    dedupe_refresh: bool,
}

impl ExecutorBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            transport: None,
            transport_config: TransportConfig::default(),
            headers: HeaderMap::new(),
            credentials: None,
            observer: None,
            dedupe_refresh: true,
        }
    }

    /// Use a custom transport instead of the default reqwest client.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Settings for the default reqwest transport.
    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.transport_config = config;
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Default headers, layered under every call's own headers.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = merge_headers(&self.headers, &headers);
        self
    }

    /// Read the bearer token from `store` under `access_key` before every
    /// attempt.
    pub fn credentials(mut self, store: Arc<dyn CredentialStore>, access_key: impl Into<String>) -> Self {
        self.credentials = Some((store, access_key.into()));
        self
    }

    pub fn on_settled(mut self, observer: impl Fn(&Settlement) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Share one in-flight refresh among concurrent callers (default on).
    pub fn dedupe_refresh(mut self, dedupe: bool) -> Self {
        self.dedupe_refresh = dedupe;
        self
    }

    pub fn build(self) -> Result<Executor, Error> {
        Url::parse(&self.base_url)?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&self.transport_config)?),
        };

        Ok(Executor {
            inner: Arc::new(ExecutorInner {
                transport,
                base_url: self.base_url,
                default_headers: self.headers,
                credentials: self.credentials,
                observer: self.observer,
                refresher: RefreshCoordinator::new(self.dedupe_refresh),
            }),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::future::BoxFuture;
    use pretty_assertions::assert_eq;
    use reqwest::header::AUTHORIZATION;
    use serde_json::json;

    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use crate::transport::TransportError;

    // ── Helpers ──────────────────────────────────────────────────────

    /// Replays scripted responses in order and records what was sent.
    #[derive(Default)]
    struct Scripted {
        replies: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
        sent: Mutex<Vec<HttpRequest>>,
    }

    impl Scripted {
        fn reply(self, status: u16, body: &'static str) -> Self {
            self.replies.lock().unwrap().push_back(Ok(RawResponse {
                status,
                headers: HeaderMap::new(),
                body: Bytes::from_static(body.as_bytes()),
            }));
            self
        }

        fn fail(self, message: &str) -> Self {
            self.replies
                .lock()
                .unwrap()
                .push_back(Err(TransportError::new(message)));
            self
        }

        fn sent(&self) -> Vec<HttpRequest> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Transport for Scripted {
        fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<RawResponse, TransportError>> {
            self.sent.lock().unwrap().push(request);
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::new("no scripted reply")));
            Box::pin(async move { reply })
        }
    }

    fn executor(transport: &Arc<Scripted>) -> Executor {
        Executor::builder("http://api.test")
            .transport(transport.clone())
            .build()
            .unwrap()
    }

    fn paths(sent: &[HttpRequest]) -> Vec<String> {
        sent.iter().map(|r| format!("{} {}", r.method, r.url.path())).collect()
    }

    // ── Tests ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn read_decodes_json_and_blank_bodies() {
        let transport = Arc::new(Scripted::default().reply(200, r#"{"id":1}"#).reply(204, ""));
        let exec = executor(&transport);

        let first = exec.read(&RequestDescriptor::new("/items/1"), None).await;
        assert_eq!(first.ok(), Some(json!({ "id": 1 })));

        let second = exec.remove(&RequestDescriptor::new("/items/1"), None).await;
        assert_eq!(second.ok(), Some(Value::Null));
    }

    #[tokio::test]
    async fn invalid_json_is_a_deserialization_failure() {
        let transport = Arc::new(Scripted::default().reply(200, "<html>"));
        let exec = executor(&transport);

        let outcome = exec.read(&RequestDescriptor::new("/page"), None).await;
        let err = outcome.error().cloned().unwrap();
        assert!(matches!(err, FetchError::Deserialization { status: Some(200), .. }));
    }

    #[tokio::test]
    async fn network_errors_are_not_retried() {
        let transport = Arc::new(Scripted::default().fail("connection refused"));
        let exec = executor(&transport);
        let policy = RefreshPolicy::new("/refresh", json!({}), |_| {}).max_retries(3);

        let outcome = exec.read(&RequestDescriptor::new("/x"), Some(&policy)).await;
        let err = outcome.error().cloned().unwrap();
        assert!(err.is_network());
        assert_eq!(err.status(), None);
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn trigger_status_refreshes_then_retries() {
        let transport = Arc::new(
            Scripted::default()
                .reply(401, "")
                .reply(200, r#"{"accessToken":"fresh"}"#)
                .reply(200, r#"{"ok":true}"#),
        );
        let store = Arc::new(MemoryCredentialStore::new().with("accessToken", "stale"));
        let exec = Executor::builder("http://api.test")
            .transport(transport.clone())
            .credentials(store.clone(), "accessToken")
            .build()
            .unwrap();
        let policy = RefreshPolicy::from_store(store, "/auth/refresh", crate::RefreshKeys::default());

        let outcome = exec.read(&RequestDescriptor::new("/me"), Some(&policy)).await;
        assert_eq!(outcome.ok(), Some(json!({ "ok": true })));

        let sent = transport.sent();
        assert_eq!(paths(&sent), vec!["GET /me", "POST /auth/refresh", "GET /me"]);
        let bearer = |r: &HttpRequest| {
            r.headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        assert_eq!(bearer(&sent[0]).as_deref(), Some("Bearer stale"));
        assert_eq!(bearer(&sent[1]), None);
        assert_eq!(bearer(&sent[2]).as_deref(), Some("Bearer fresh"));
    }

    #[tokio::test]
    async fn exhausted_retries_report_the_last_status() {
        let transport = Arc::new(
            Scripted::default()
                .reply(403, "")
                .reply(500, "")
                .reply(403, "")
                .reply(500, "")
                .reply(403, r#"{"final":true}"#),
        );
        let refreshes = Arc::new(AtomicUsize::new(0));
        let counter = refreshes.clone();
        let exec = executor(&transport);
        let policy = RefreshPolicy::new("/refresh", json!({}), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .max_retries(2);

        let outcome = exec.read(&RequestDescriptor::new("/x"), Some(&policy)).await;
        let err = outcome.error().cloned().unwrap();
        assert_eq!(err.status(), Some(403));
        assert_eq!(
            err.raw_response().map(RawResponse::text).as_deref(),
            Some(r#"{"final":true}"#)
        );
        // Refresh calls failed with 500, so the callback never ran.
        assert_eq!(refreshes.load(Ordering::SeqCst), 0);
        assert_eq!(
            paths(&transport.sent()),
            vec!["GET /x", "POST /refresh", "GET /x", "POST /refresh", "GET /x"]
        );
    }

    #[tokio::test]
    async fn non_trigger_status_fails_immediately() {
        let transport = Arc::new(Scripted::default().reply(404, ""));
        let exec = executor(&transport);
        let policy = RefreshPolicy::new("/refresh", json!({}), |_| {});

        let outcome = exec.read(&RequestDescriptor::new("/missing"), Some(&policy)).await;
        assert!(outcome.error().is_some_and(FetchError::is_not_found));
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn stored_bearer_wins_over_caller_authorization() {
        let transport = Arc::new(Scripted::default().reply(200, "{}"));
        let store = Arc::new(MemoryCredentialStore::new().with("token", "stored"));
        let exec = Executor::builder("http://api.test")
            .transport(transport.clone())
            .credentials(store, "token")
            .header(HeaderName::from_static("x-app"), HeaderValue::from_static("default"))
            .build()
            .unwrap();

        let request = RequestDescriptor::new("/x")
            .with_header(AUTHORIZATION, HeaderValue::from_static("Bearer caller"))
            .with_header(HeaderName::from_static("x-app"), HeaderValue::from_static("caller"));
        exec.read(&request, None).await;

        let sent = transport.sent();
        let headers = &sent[0].headers;
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer stored");
        assert_eq!(headers.get("x-app").unwrap(), "caller");
    }

    #[tokio::test]
    async fn create_sends_json_and_filters_nulls() {
        let transport = Arc::new(Scripted::default().reply(201, r#"{"id":9}"#));
        let exec = executor(&transport);
        let payload = Payload::from(json!({ "name": "Shoe", "color": null }));

        let outcome = exec
            .create(
                &RequestDescriptor::new("/products"),
                &payload,
                &WriteOptions::default().remove_nulls(),
                None,
            )
            .await;
        assert_eq!(outcome.ok(), Some(json!({ "id": 9 })));

        let sent = transport.sent();
        assert_eq!(sent[0].method, reqwest::Method::POST);
        assert_eq!(sent[0].headers.get("content-type").unwrap(), "application/json");
        let Some(RequestBody::Json(bytes)) = &sent[0].body else {
            panic!("expected JSON body");
        };
        let body: Value = serde_json::from_slice(bytes).unwrap();
        assert_eq!(body, json!({ "name": "Shoe" }));
    }

    #[tokio::test]
    async fn form_payload_has_no_json_content_type() {
        let transport = Arc::new(Scripted::default().reply(200, "{}"));
        let exec = executor(&transport);
        let payload = Payload::map().with("name", "Shoe");

        exec.replace(
            &RequestDescriptor::new("/products/1"),
            &payload,
            &WriteOptions::form_data(),
            None,
        )
        .await;

        let sent = transport.sent();
        assert!(sent[0].headers.get("content-type").is_none());
        assert!(matches!(sent[0].body, Some(RequestBody::Multipart(ref entries)) if entries.len() == 1));
    }

    #[tokio::test]
    async fn settlement_reports_url_endpoint_and_status() {
        let transport = Arc::new(
            Scripted::default()
                .reply(500, "")
                .fail("reset")
                .reply(200, "{}"),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let exec = Executor::builder("http://api.test/")
            .transport(transport.clone())
            .on_settled(move |s| sink.lock().unwrap().push(s.clone()))
            .build()
            .unwrap();

        exec.read(&RequestDescriptor::new("/products?query=shoe"), None).await;
        exec.read(&RequestDescriptor::new("/a"), None).await;
        exec.remove(&RequestDescriptor::new("//products/5"), None).await;

        let seen = seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                Settlement {
                    url: "http://api.test/products?query=shoe".into(),
                    endpoint: "/products".into(),
                    status: Some(500),
                },
                Settlement {
                    url: "http://api.test/a".into(),
                    endpoint: "/a".into(),
                    status: None,
                },
                Settlement {
                    url: "http://api.test/products/5".into(),
                    endpoint: "/products/5".into(),
                    status: Some(200),
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_retry_delay_reports_nothing() {
        let transport = Arc::new(Scripted::default().reply(401, ""));
        let settled = Arc::new(AtomicUsize::new(0));
        let counter = settled.clone();
        let exec = Executor::builder("http://api.test")
            .transport(transport.clone())
            .on_settled(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();
        let policy = RefreshPolicy::new("/refresh", json!({}), |_| {})
            .retry_delay(Duration::from_secs(5));

        let token = CancellationToken::new();
        let request = RequestDescriptor::new("/x").with_cancel(token.clone());
        let call = tokio::spawn({
            let exec = exec.clone();
            async move { exec.read(&request, Some(&policy)).await }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();

        let outcome = call.await.unwrap();
        assert!(outcome.is_cancelled());
        assert_eq!(settled.load(Ordering::SeqCst), 0);
        assert_eq!(paths(&transport.sent()), vec!["GET /x"]);
    }

    #[tokio::test]
    async fn encoding_failure_settles_without_status() {
        let transport = Arc::new(Scripted::default());
        let settled = Arc::new(Mutex::new(Vec::new()));
        let sink = settled.clone();
        let exec = Executor::builder("http://api.test")
            .transport(transport.clone())
            .on_settled(move |s| sink.lock().unwrap().push(s.status))
            .build()
            .unwrap();

        let outcome = exec
            .create(
                &RequestDescriptor::new("/upload"),
                &Payload::from("not a map"),
                &WriteOptions::form_data(),
                None,
            )
            .await;
        assert!(matches!(outcome, Outcome::Failure(FetchError::Encoding { .. })));
        assert_eq!(*settled.lock().unwrap(), vec![None]);
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn builder_rejects_invalid_base_url() {
        let err = Executor::builder("not a url")
            .transport(Arc::new(Scripted::default()))
            .build();
        assert!(matches!(err, Err(Error::InvalidUrl(_))));
    }
}
