use std::collections::BTreeSet;
use std::fmt;

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio_util::sync::CancellationToken;

/// The four operations the executor exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Read,
    Create,
    Replace,
    Remove,
}

impl Verb {
    pub fn method(self) -> Method {
        match self {
            Self::Read => Method::GET,
            Self::Create => Method::POST,
            Self::Replace => Method::PUT,
            Self::Remove => Method::DELETE,
        }
    }

    /// Whether the verb carries a body.
    pub fn has_body(self) -> bool {
        matches!(self, Self::Create | Self::Replace)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method().as_str())
    }
}

/// Where a call goes and how it can be stopped.
///
/// The path is joined onto `origin` when set, otherwise onto the executor's
/// base URL. Caller headers are layered over the executor defaults.
#[derive(Debug, Clone, Default)]
pub struct RequestDescriptor {
    pub path: String,
    pub origin: Option<String>,
    pub headers: HeaderMap,
    pub cancel: Option<CancellationToken>,
}

impl RequestDescriptor {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Attach a cancellation token. Cancelling it ends the call with
    /// [`Outcome::Cancelled`](crate::Outcome::Cancelled), including any
    /// pending retry delay or refresh.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Body encoding knobs for create/replace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Send the payload as `multipart/form-data` instead of JSON.
    pub convert_to_form_data: bool,
    /// Drop null fields before sending.
    pub remove_if_null: bool,
    /// Form fields whose list items repeat the bare field name.
    pub repeated_fields: BTreeSet<String>,
}

impl WriteOptions {
    pub fn form_data() -> Self {
        Self {
            convert_to_form_data: true,
            ..Self::default()
        }
    }

    pub fn remove_nulls(mut self) -> Self {
        self.remove_if_null = true;
        self
    }

    pub fn repeated(mut self, field: impl Into<String>) -> Self {
        self.repeated_fields.insert(field.into());
        self
    }
}
