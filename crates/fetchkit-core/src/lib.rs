// fetchkit-core: reactive queries and mutations over fetchkit-api.

pub mod cache;
pub mod config;
pub mod error;
pub mod mutation;
pub mod query;
pub mod session;

// ── Primary re-exports ──────────────────────────────────────────────
pub use cache::{MemoryCache, ResponseCache};
pub use config::{RefreshSettings, SessionConfig, TlsVerification};
pub use error::{CoreError, settle};
pub use mutation::{Mutation, MutationKind, MutationOptions, MutationState};
pub use query::{Query, QueryOptions, QueryPhase, QueryState};
pub use session::Session;

// API types that appear in this crate's public surface.
pub use fetchkit_api::{
    Binary, CredentialStore, Executor, FetchError, HeaderMap, MemoryCredentialStore, Outcome,
    Payload, RefreshKeys, RefreshPolicy, Settlement, WriteOptions,
};
