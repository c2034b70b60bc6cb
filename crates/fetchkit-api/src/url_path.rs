// URL joining and slash normalization.
//
// Request identity is the joined `{origin}/{path}` string with duplicate
// separators collapsed. The `//` following a scheme (`http://`) survives,
// and one trailing separator is stripped.

/// Textual placeholders that mark a path built from a missing value.
pub const UNRESOLVED_PLACEHOLDERS: [&str; 2] = ["undefined", "null"];

/// Collapse runs of `/` into one, keeping up to two after a `scheme:`.
///
/// Idempotent: normalizing an already-normalized string is a no-op.
///
/// ```
/// use fetchkit_api::url_path::remove_multiple_slashes;
///
/// assert_eq!(
///     remove_multiple_slashes("http://example.com//api///data/"),
///     "http://example.com/api/data"
/// );
/// ```
pub fn remove_multiple_slashes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if ch != '/' {
            out.push(ch);
            continue;
        }

        let mut run = 1usize;
        while chars.next_if(|&(_, c)| c == '/').is_some() {
            run += 1;
        }

        let keep = if follows_scheme(&input[..idx]) {
            run.min(2)
        } else {
            1
        };
        out.extend(std::iter::repeat_n('/', keep));
    }

    let body = out.trim_end_matches('/');
    if body.len() < out.len() && !follows_scheme(body) {
        out.pop();
    }
    out
}

/// Join an origin and a path, then normalize.
pub fn join_url(origin: &str, path: &str) -> String {
    remove_multiple_slashes(&format!("{origin}/{path}"))
}

/// Path-only form of a resolved URL: origin removed, query stripped.
///
/// Reported in settlement notifications so observers can group by endpoint
/// without caring about the host or query parameters.
pub fn endpoint_of(url: &str, origin: &str) -> String {
    let origin = remove_multiple_slashes(origin);
    let rest = url.strip_prefix(origin.as_str()).unwrap_or(url);
    let normalized = remove_multiple_slashes(&format!("/{rest}"));
    let path = normalized.split('?').next().unwrap_or_default();
    if path.is_empty() {
        "/".to_owned()
    } else {
        path.to_owned()
    }
}

/// Append an optional trailing segment (e.g. a resource id) to a path.
///
/// A missing segment leaves a trailing separator that normalization strips,
/// so `with_segment("/products", None)` resolves to the collection itself.
pub fn with_segment(path: &str, segment: Option<&str>) -> String {
    format!("{path}/{}", segment.unwrap_or_default())
}

/// Returns `true` if the URL still contains a textual placeholder.
pub fn has_unresolved_placeholder(url: &str) -> bool {
    UNRESOLVED_PLACEHOLDERS.iter().any(|p| url.contains(p))
}

/// Whether `prefix` ends in `scheme:` (RFC 3986 scheme characters).
fn follows_scheme(prefix: &str) -> bool {
    let Some(head) = prefix.strip_suffix(':') else {
        return false;
    };
    let start = head
        .char_indices()
        .rev()
        .find(|&(_, c)| !(c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')))
        .map_or(0, |(i, c)| i + c.len_utf8());
    head[start..]
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
}
