// fetchkit-api: verb-based HTTP execution with bearer credentials and refresh-and-retry

pub mod credentials;
pub mod error;
pub mod executor;
pub mod headers;
pub mod multipart;
pub mod refresh;
pub mod request;
pub mod transport;
pub mod url_path;

pub use credentials::{CredentialStore, MemoryCredentialStore};
pub use error::{Error, FetchError};
pub use executor::{Executor, ExecutorBuilder, Outcome, Settlement, SettlementObserver};
pub use multipart::{Binary, FormEntry, FormField, FormOptions, Payload};
pub use refresh::{RefreshKeys, RefreshPolicy};
pub use request::{RequestDescriptor, Verb, WriteOptions};
pub use transport::{
    HttpRequest, RawResponse, RequestBody, ReqwestTransport, TlsMode, Transport, TransportConfig,
    TransportError,
};

// Types that appear in the public API.
pub use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
pub use reqwest::Method;
pub use tokio_util::sync::CancellationToken;
