// Credential storage seam.
//
// The executor reads the access token from a key-value store before every
// attempt, so a refresh that writes a new token is picked up by the retry
// without any extra plumbing.

use dashmap::DashMap;
use secrecy::SecretString;

/// A synchronous key-value store for secrets (access and refresh tokens).
///
/// Reads are expected to be cheap; they happen once per attempt.
pub trait CredentialStore: Send + Sync {
    /// Current value under `key`, if any.
    fn read(&self, key: &str) -> Option<SecretString>;

    /// Store `value` under `key`, replacing any previous value.
    fn write(&self, key: &str, value: SecretString);

    /// Forget the value under `key`. Missing keys are not an error.
    fn remove(&self, key: &str);
}

/// In-process [`CredentialStore`] backed by a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: DashMap<String, SecretString>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value at construction time.
    pub fn with(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries
            .insert(key.into(), SecretString::from(value.into()));
        self
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn read(&self, key: &str) -> Option<SecretString> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn write(&self, key: &str, value: SecretString) {
        self.entries.insert(key.to_owned(), value);
    }

    fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}
