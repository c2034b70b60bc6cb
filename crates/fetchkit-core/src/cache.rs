// Session-scoped response cache.
//
// Keys are normalized absolute URLs; values are the last successfully
// decoded payload for that URL. No TTL, no eviction: an entry lives as long
// as the session and is only ever overwritten by a newer success.

use dashmap::DashMap;
use serde_json::Value;

/// Key-value store of last successful payloads.
///
/// Queries read through this trait only, so a bounded or expiring cache can
/// replace [`MemoryCache`] without touching them.
pub trait ResponseCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value);
    fn has(&self, key: &str) -> bool;
}

/// Unbounded in-memory [`ResponseCache`].
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Value>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ResponseCache for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn set(&self, key: &str, value: Value) {
        self.entries.insert(key.to_owned(), value);
    }

    fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}
