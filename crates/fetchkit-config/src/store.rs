// System keyring credential store.

use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

use fetchkit_api::CredentialStore;

use crate::{ConfigError, KEYRING_SERVICE};

/// [`CredentialStore`] backed by the OS keyring.
///
/// Entries live under service `fetchkit`, user `<profile>/<key>`, so
/// profiles never see each other's tokens.
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service: String,
    profile: String,
}

impl KeyringCredentialStore {
    pub fn for_profile(profile: &str) -> Self {
        Self {
            service: KEYRING_SERVICE.to_owned(),
            profile: profile.to_owned(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry, ConfigError> {
        Ok(keyring::Entry::new(
            &self.service,
            &format!("{}/{key}", self.profile),
        )?)
    }

    pub fn get(&self, key: &str) -> Result<Option<SecretString>, ConfigError> {
        match self.entry(key)?.get_password() {
            Ok(secret) => Ok(Some(SecretString::from(secret))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set(&self, key: &str, value: &SecretString) -> Result<(), ConfigError> {
        self.entry(key)?.set_password(value.expose_secret())?;
        Ok(())
    }

    /// Returns `false` if there was nothing to delete.
    pub fn delete(&self, key: &str) -> Result<bool, ConfigError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn read(&self, key: &str) -> Option<SecretString> {
        self.get(key).unwrap_or_else(|e| {
            warn!(key, error = %e, "keyring read failed");
            None
        })
    }

    fn write(&self, key: &str, value: SecretString) {
        if let Err(e) = self.set(key, &value) {
            warn!(key, error = %e, "keyring write failed");
        }
    }

    fn remove(&self, key: &str) {
        if let Err(e) = self.delete(key) {
            warn!(key, error = %e, "keyring delete failed");
        }
    }
}
