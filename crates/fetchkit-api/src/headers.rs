// Header layering.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};

/// Merge `additional` over `base`. Later layers win per header name.
///
/// A name present in `additional` replaces every value `base` had for it;
/// multi-valued headers within one layer are kept together.
pub fn merge_headers(base: &HeaderMap, additional: &HeaderMap) -> HeaderMap {
    let mut merged = base.clone();
    for name in additional.keys() {
        merged.remove(name);
        for value in additional.get_all(name) {
            merged.append(name.clone(), value.clone());
        }
    }
    merged
}

/// Set `Content-Type: application/json`.
pub(crate) fn set_json_content_type(headers: &mut HeaderMap) {
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
}

/// Set `Authorization: Bearer <token>`, replacing any caller-supplied value.
///
/// The value is marked sensitive so it never shows up in debug output.
pub(crate) fn set_bearer(headers: &mut HeaderMap, token: &SecretString) {
    match HeaderValue::from_str(&format!("Bearer {}", token.expose_secret())) {
        Ok(mut value) => {
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        Err(_) => {
            tracing::warn!("stored access token is not a valid header value, sending without it");
        }
    }
}
