// ── Session ──
//
// Binds one executor, one response cache, and a default refresh policy.
// Queries and mutations handed out by the same session share all three.

use std::sync::Arc;

use fetchkit_api::{CredentialStore, Executor, RefreshPolicy};
use serde::de::DeserializeOwned;

use crate::cache::{MemoryCache, ResponseCache};
use crate::config::SessionConfig;
use crate::error::CoreError;
use crate::mutation::{Mutation, MutationKind, MutationOptions};
use crate::query::{Query, QueryOptions};

/// Factory for queries and mutations against one API.
#[derive(Clone)]
pub struct Session {
    executor: Executor,
    cache: Arc<dyn ResponseCache>,
    refresh: Option<RefreshPolicy>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("executor", &self.executor)
            .field("refresh", &self.refresh)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Build a session from runtime config. The bearer token and refresh
    /// credential are read from `store`.
    pub fn new(config: &SessionConfig, store: Arc<dyn CredentialStore>) -> Result<Self, CoreError> {
        let executor = config.executor_builder(Arc::clone(&store)).build()?;
        Ok(Self::from_executor(executor).with_refresh_policy(config.refresh_policy(store)))
    }

    /// Session over an existing executor, with a fresh in-memory cache and
    /// no refresh policy.
    pub fn from_executor(executor: Executor) -> Self {
        Self {
            executor,
            cache: Arc::new(MemoryCache::new()),
            refresh: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Default refresh policy for queries and mutations that don't set
    /// their own.
    pub fn with_refresh_policy(mut self, policy: Option<RefreshPolicy>) -> Self {
        self.refresh = policy;
        self
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn cache(&self) -> &Arc<dyn ResponseCache> {
        &self.cache
    }

    pub fn refresh_policy(&self) -> Option<&RefreshPolicy> {
        self.refresh.as_ref()
    }

    /// Start a live read of `path`. Must be called inside a tokio runtime.
    pub fn query<T>(&self, path: impl Into<String>, mut options: QueryOptions) -> Query<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        if options.refresh.is_none() {
            options.refresh.clone_from(&self.refresh);
        }
        Query::spawn(
            self.executor.clone(),
            Arc::clone(&self.cache),
            path.into(),
            options,
        )
    }

    pub fn mutation(
        &self,
        kind: MutationKind,
        path: impl Into<String>,
        mut options: MutationOptions,
    ) -> Mutation {
        if options.refresh.is_none() {
            options.refresh.clone_from(&self.refresh);
        }
        Mutation::new(kind, path.into(), self.executor.clone(), options)
    }

    pub fn create(&self, path: impl Into<String>, options: MutationOptions) -> Mutation {
        self.mutation(MutationKind::Create, path, options)
    }

    pub fn replace(&self, path: impl Into<String>, options: MutationOptions) -> Mutation {
        self.mutation(MutationKind::Replace, path, options)
    }

    pub fn remove(&self, path: impl Into<String>, options: MutationOptions) -> Mutation {
        self.mutation(MutationKind::Remove, path, options)
    }
}
