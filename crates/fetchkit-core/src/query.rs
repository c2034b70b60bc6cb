// ── Reactive read subscription ──
//
// A `Query` keeps one resource loaded while its inputs change. Every input
// change (path, debounce, headers, explicit reload) bumps a sequence number;
// a background driver debounces, surfaces any cached value, runs the read,
// and publishes the result only if its sequence is still current. Inputs
// that change mid-flight cancel the running attempt.
//
//   Idle ──▶ Scheduled ──debounce──▶ InFlight ──▶ Succeeded | Failed
//              ▲                        │
//              └────── input change ◀───┘        (drop/close ▶ Cancelled)

use std::sync::Arc;
use std::time::Duration;

use fetchkit_api::url_path::has_unresolved_placeholder;
use fetchkit_api::{Executor, FetchError, HeaderMap, Outcome, RefreshPolicy, RequestDescriptor};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::ResponseCache;

/// Where a query is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPhase {
    /// Nothing to fetch: empty path, or an unresolved placeholder was
    /// skipped.
    Idle,
    /// Waiting out the debounce delay.
    Scheduled,
    InFlight,
    Succeeded,
    Failed,
    /// The query was closed before settling.
    Cancelled,
}

impl QueryPhase {
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Idle | Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// Snapshot of a query's visible state.
#[derive(Debug, Clone)]
pub struct QueryState<T> {
    /// Latest data: fresh, or a cached value while revalidating.
    pub data: Option<T>,
    /// Latest failure. Cleared by the next success.
    pub error: Option<FetchError>,
    pub loading: bool,
    pub phase: QueryPhase,
    /// Resolved URL of the current inputs.
    pub url: String,
    /// Number of explicit reloads so far.
    pub trigger: u64,
}

/// Options for [`Session::query`](crate::Session::query).
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Quiet period after the last input change before fetching.
    pub debounce: Duration,
    /// Per-query headers, layered over the session defaults.
    pub headers: HeaderMap,
    /// Overrides the session's refresh policy when set.
    pub refresh: Option<RefreshPolicy>,
    /// Don't fetch while the URL still contains `undefined` or `null`.
    pub skip_unresolved: bool,
}

/// Inputs the driver reacts to.
#[derive(Debug, Clone)]
struct Params {
    path: String,
    debounce: Duration,
    headers: HeaderMap,
    trigger: u64,
    seq: u64,
}

/// Fixed collaborators shared by the handle and its driver.
struct QueryContext {
    executor: Executor,
    cache: Arc<dyn ResponseCache>,
    refresh: Option<RefreshPolicy>,
    skip_unresolved: bool,
}

impl QueryContext {
    fn resolve(&self, path: &str) -> String {
        self.executor.resolve_url(&RequestDescriptor::new(path))
    }

    fn skips(&self, path: &str, url: &str) -> bool {
        path.is_empty() || (self.skip_unresolved && has_unresolved_placeholder(url))
    }

    fn cached<T: DeserializeOwned>(&self, url: &str) -> Option<T> {
        self.cache
            .get(url)
            .and_then(|value| serde_json::from_value(value).ok())
    }
}

/// A live read subscription. Dropping it cancels any in-flight request.
pub struct Query<T> {
    ctx: Arc<QueryContext>,
    params: watch::Sender<Params>,
    state: Arc<watch::Sender<QueryState<T>>>,
    shutdown: CancellationToken,
}

impl<T> Query<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Start a query. Must be called inside a tokio runtime.
    pub(crate) fn spawn(
        executor: Executor,
        cache: Arc<dyn ResponseCache>,
        path: String,
        options: QueryOptions,
    ) -> Self {
        let ctx = Arc::new(QueryContext {
            executor,
            cache,
            refresh: options.refresh,
            skip_unresolved: options.skip_unresolved,
        });

        let params = Params {
            path,
            debounce: options.debounce,
            headers: options.headers,
            trigger: 0,
            seq: 0,
        };

        let url = ctx.resolve(&params.path);
        let skipped = ctx.skips(&params.path, &url);
        let initial = QueryState {
            data: if skipped { None } else { ctx.cached(&url) },
            error: None,
            loading: !skipped,
            phase: if skipped {
                QueryPhase::Idle
            } else {
                QueryPhase::Scheduled
            },
            url,
            trigger: 0,
        };

        let (params_tx, params_rx) = watch::channel(params);
        let state = Arc::new(watch::Sender::new(initial));
        let shutdown = CancellationToken::new();

        tokio::spawn(drive(
            Arc::clone(&ctx),
            params_rx,
            Arc::clone(&state),
            shutdown.clone(),
        ));

        Self {
            ctx,
            params: params_tx,
            state,
            shutdown,
        }
    }

    // ── Inputs ──────────────────────────────────────────────────────

    /// Point the query at a new path. No-op if unchanged.
    pub fn set_path(&self, path: impl Into<String>) {
        let path = path.into();
        self.schedule(|p| {
            if p.path == path {
                return false;
            }
            p.path = path;
            true
        });
    }

    pub fn set_debounce(&self, debounce: Duration) {
        self.schedule(|p| {
            if p.debounce == debounce {
                return false;
            }
            p.debounce = debounce;
            true
        });
    }

    pub fn set_headers(&self, headers: HeaderMap) {
        self.schedule(|p| {
            if p.headers == headers {
                return false;
            }
            p.headers = headers;
            true
        });
    }

    /// Fetch again with the same inputs. Still debounced.
    pub fn reload(&self) {
        self.schedule(|p| {
            p.trigger += 1;
            true
        });
    }

    /// Stop the query. In-flight work is cancelled and the state settles
    /// as [`QueryPhase::Cancelled`].
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    // ── State ───────────────────────────────────────────────────────

    pub fn state(&self) -> QueryState<T> {
        self.state.borrow().clone()
    }

    pub fn data(&self) -> Option<T> {
        self.state.borrow().data.clone()
    }

    pub fn error(&self) -> Option<FetchError> {
        self.state.borrow().error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    pub fn url(&self) -> String {
        self.state.borrow().url.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<QueryState<T>> {
        self.state.subscribe()
    }

    /// Every state change as a stream, starting with the current state.
    pub fn stream(&self) -> WatchStream<QueryState<T>> {
        WatchStream::new(self.state.subscribe())
    }

    /// Wait until the state satisfies `predicate`.
    pub async fn wait_for(&self, predicate: impl FnMut(&QueryState<T>) -> bool) -> QueryState<T> {
        let mut rx = self.state.subscribe();
        match rx.wait_for(predicate).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }

    /// Wait until the current inputs have settled.
    pub async fn settled(&self) -> QueryState<T> {
        self.wait_for(|s| !s.loading && s.phase.is_settled()).await
    }

    /// Bump the input sequence and publish the synchronous part of the
    /// transition: `Scheduled` with loading on, or `Idle` when skipped.
    fn schedule(&self, update: impl FnOnce(&mut Params) -> bool) {
        let mut next = None;
        self.params.send_if_modified(|p| {
            if !update(p) {
                return false;
            }
            p.seq += 1;
            next = Some((p.path.clone(), p.trigger, p.seq));
            true
        });
        let Some((path, trigger, seq)) = next else {
            return;
        };

        let url = self.ctx.resolve(&path);
        let skipped = self.ctx.skips(&path, &url);
        debug!(url, seq, skipped, "query scheduled");
        self.state.send_modify(|s| {
            s.url = url;
            s.trigger = trigger;
            if skipped {
                s.phase = QueryPhase::Idle;
                s.loading = false;
            } else {
                s.phase = QueryPhase::Scheduled;
                s.loading = true;
            }
        });
    }
}

impl<T> Drop for Query<T> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// ── Driver ───────────────────────────────────────────────────────────

/// Apply `f` only while `seq` is still the latest input sequence.
fn publish<T>(
    state: &watch::Sender<QueryState<T>>,
    params: &watch::Receiver<Params>,
    seq: u64,
    f: impl FnOnce(&mut QueryState<T>),
) -> bool {
    state.send_if_modified(|s| {
        if params.borrow().seq != seq {
            return false;
        }
        f(s);
        true
    })
}

fn mark_cancelled<T>(state: &watch::Sender<QueryState<T>>) {
    state.send_if_modified(|s| {
        if s.phase.is_settled() && !s.loading {
            return false;
        }
        s.phase = QueryPhase::Cancelled;
        s.loading = false;
        true
    });
}

async fn drive<T>(
    ctx: Arc<QueryContext>,
    mut params: watch::Receiver<Params>,
    state: Arc<watch::Sender<QueryState<T>>>,
    shutdown: CancellationToken,
) where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    loop {
        let current = params.borrow_and_update().clone();
        let seq = current.seq;
        let url = ctx.resolve(&current.path);

        if !ctx.skips(&current.path, &url) {
            // Scheduled: wait out the debounce, restarting on any change.
            if !current.debounce.is_zero() {
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => {
                        mark_cancelled(&state);
                        return;
                    }
                    changed = params.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        continue;
                    }
                    () = tokio::time::sleep(current.debounce) => {}
                }
            }

            // InFlight: surface the cached value, keep loading on.
            let cached: Option<T> = ctx.cached(&url);
            publish(&state, &params, seq, |s| {
                s.phase = QueryPhase::InFlight;
                s.loading = true;
                if cached.is_some() {
                    s.data = cached;
                }
            });
            debug!(url, seq, "query in flight");

            let attempt = shutdown.child_token();
            let request = RequestDescriptor::new(current.path.clone())
                .with_headers(current.headers.clone())
                .with_cancel(attempt.clone());
            let call = ctx.executor.read(&request, ctx.refresh.as_ref());
            tokio::pin!(call);

            let outcome = tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    attempt.cancel();
                    mark_cancelled(&state);
                    return;
                }
                changed = params.changed() => {
                    attempt.cancel();
                    debug!(url, seq, "query superseded");
                    if changed.is_err() {
                        return;
                    }
                    continue;
                }
                outcome = &mut call => outcome,
            };

            settle(&ctx, &state, &params, seq, &url, outcome);
        }

        // Settled or idle: wait for the next input change.
        tokio::select! {
            () = shutdown.cancelled() => {
                mark_cancelled(&state);
                return;
            }
            changed = params.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}

fn settle<T>(
    ctx: &QueryContext,
    state: &watch::Sender<QueryState<T>>,
    params: &watch::Receiver<Params>,
    seq: u64,
    url: &str,
    outcome: Outcome<Value>,
) where
    T: DeserializeOwned,
{
    let result = match outcome {
        Outcome::Success(value) => match serde_json::from_value::<T>(value.clone()) {
            Ok(data) => {
                ctx.cache.set(url, value);
                Ok(data)
            }
            Err(e) => Err(FetchError::decode(&e, &value)),
        },
        Outcome::Failure(e) => Err(e),
        Outcome::Cancelled => {
            publish(state, params, seq, |s| {
                s.phase = QueryPhase::Cancelled;
                s.loading = false;
            });
            return;
        }
    };

    let applied = match result {
        Ok(data) => publish(state, params, seq, |s| {
            s.data = Some(data);
            s.error = None;
            s.loading = false;
            s.phase = QueryPhase::Succeeded;
        }),
        Err(e) => publish(state, params, seq, |s| {
            s.data = None;
            s.error = Some(e);
            s.loading = false;
            s.phase = QueryPhase::Failed;
        }),
    };
    debug!(url, seq, applied, "query settled");
}
