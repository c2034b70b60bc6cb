// Network transport boundary.
//
// The executor talks to the network through one primitive: send a request,
// get back a status and raw body, or a network-level error. Cancellation is
// by dropping the returned future. `ReqwestTransport` is the production
// implementation; tests substitute their own.

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use reqwest::Method;
use reqwest::header::HeaderMap;
use thiserror::Error;
use url::Url;

use crate::error::Error;
use crate::multipart::{FormEntry, FormField};

/// TLS verification mode.
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// Use the system certificate store.
    #[default]
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (self-signed development servers).
    DangerAcceptInvalid,
}

/// Shared transport configuration for building HTTP clients.
///
/// There is no request timeout by default: a call ends when the transport
/// completes or the caller cancels.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Option<Duration>,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: None,
            user_agent: concat!("fetchkit/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder().user_agent(&self.user_agent);

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}

// ── Wire types ───────────────────────────────────────────────────────

/// Encoded request body.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Serialized JSON document.
    Json(Bytes),
    /// Multipart form entries, in order.
    Multipart(Vec<FormEntry>),
}

/// A fully-resolved request handed to the transport.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
}

/// Status, headers, and undecoded body of a response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawResponse {
    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text (lossy UTF-8).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A network-level failure: the request produced no response.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The single network primitive the executor depends on.
///
/// Implementations must not interpret status codes; every response that
/// arrives is `Ok`. Dropping the returned future cancels the request.
pub trait Transport: Send + Sync {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<RawResponse, TransportError>>;
}

// ── reqwest implementation ───────────────────────────────────────────

/// [`Transport`] backed by a `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    /// Build from a [`TransportConfig`].
    pub fn new(config: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: config.build_client()?,
        })
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn from_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn multipart_form(entries: Vec<FormEntry>) -> Result<reqwest::multipart::Form, TransportError> {
        let mut form = reqwest::multipart::Form::new();
        for entry in entries {
            form = match entry.field {
                FormField::Text(text) => form.text(entry.name, text),
                FormField::Binary(binary) => {
                    let mut part = reqwest::multipart::Part::bytes(binary.bytes.to_vec())
                        .file_name(binary.file_name.unwrap_or_else(|| "blob".to_owned()));
                    if let Some(mime) = binary.content_type {
                        part = part
                            .mime_str(&mime)
                            .map_err(|e| TransportError::new(format!("invalid part type: {e}")))?;
                    }
                    form.part(entry.name, part)
                }
            };
        }
        Ok(form)
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<RawResponse, TransportError>> {
        Box::pin(async move {
            let mut builder = self
                .http
                .request(request.method, request.url)
                .headers(request.headers);

            builder = match request.body {
                None => builder,
                Some(RequestBody::Json(bytes)) => builder.body(bytes),
                Some(RequestBody::Multipart(entries)) => {
                    builder.multipart(Self::multipart_form(entries)?)
                }
            };

            let resp = builder
                .send()
                .await
                .map_err(|e| TransportError::new(e.to_string()))?;

            let status = resp.status().as_u16();
            let headers = resp.headers().clone();
            let body = resp
                .bytes()
                .await
                .map_err(|e| TransportError::new(e.to_string()))?;

            Ok(RawResponse {
                status,
                headers,
                body,
            })
        })
    }
}
