// ── Mutation handles ──
//
// Thin reactive wrappers around one create/replace/remove call. There is no
// debouncing or cancellation: overlapping invocations race, and whichever
// settles last determines the visible state.

use std::fmt;
use std::sync::Arc;

use fetchkit_api::url_path::with_segment;
use fetchkit_api::{
    Executor, FetchError, HeaderMap, Outcome, Payload, RefreshPolicy, RequestDescriptor, Verb,
    WriteOptions,
};
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

/// Which write verb a [`Mutation`] issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Create,
    Replace,
    Remove,
}

impl MutationKind {
    pub fn verb(self) -> Verb {
        match self {
            Self::Create => Verb::Create,
            Self::Replace => Verb::Replace,
            Self::Remove => Verb::Remove,
        }
    }
}

/// Visible state of a mutation.
#[derive(Debug, Clone, Default)]
pub struct MutationState {
    pub loading: bool,
    pub error: Option<FetchError>,
}

/// Options for [`Session::mutation`](crate::Session::mutation).
#[derive(Debug, Clone, Default)]
pub struct MutationOptions {
    /// Per-mutation headers, layered over the session defaults.
    pub headers: HeaderMap,
    /// Body encoding.
    pub write: WriteOptions,
    /// Overrides the session's refresh policy when set.
    pub refresh: Option<RefreshPolicy>,
}

/// A reusable write operation bound to a path.
#[derive(Clone)]
pub struct Mutation {
    kind: MutationKind,
    path: String,
    executor: Executor,
    options: MutationOptions,
    state: Arc<watch::Sender<MutationState>>,
}

impl fmt::Debug for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutation")
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl Mutation {
    pub(crate) fn new(
        kind: MutationKind,
        path: String,
        executor: Executor,
        options: MutationOptions,
    ) -> Self {
        Self {
            kind,
            path,
            executor,
            options,
            state: Arc::new(watch::Sender::new(MutationState::default())),
        }
    }

    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    /// Issue the call. `id` is appended as a trailing path segment.
    ///
    /// `payload` is ignored for [`MutationKind::Remove`].
    pub async fn invoke(&self, payload: Option<&Payload>, id: Option<&str>) -> Outcome<Value> {
        let path = with_segment(&self.path, id);
        let request = RequestDescriptor::new(path).with_headers(self.options.headers.clone());

        let pending = Pending::start(&self.state);
        debug!(kind = ?self.kind, url = %self.executor.resolve_url(&request), "mutation started");

        let outcome = self
            .executor
            .dispatch(
                self.kind.verb(),
                &request,
                payload,
                &self.options.write,
                self.options.refresh.as_ref(),
            )
            .await;

        pending.settle(&outcome);
        outcome
    }

    pub fn state(&self) -> MutationState {
        self.state.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    pub fn error(&self) -> Option<FetchError> {
        self.state.borrow().error.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MutationState> {
        self.state.subscribe()
    }
}

/// Holds `loading` on for one invocation. Dropping it unsettled, as when
/// the invoking future is dropped mid-call, still clears `loading`.
struct Pending<'a> {
    state: &'a watch::Sender<MutationState>,
    settled: bool,
}

impl<'a> Pending<'a> {
    fn start(state: &'a watch::Sender<MutationState>) -> Self {
        state.send_modify(|s| s.loading = true);
        Self {
            state,
            settled: false,
        }
    }

    fn settle(mut self, outcome: &Outcome<Value>) {
        self.settled = true;
        self.state.send_modify(|s| {
            s.loading = false;
            match outcome {
                Outcome::Success(_) => s.error = None,
                Outcome::Failure(e) => s.error = Some(e.clone()),
                Outcome::Cancelled => {}
            }
        });
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.state.send_modify(|s| s.loading = false);
        }
    }
}
