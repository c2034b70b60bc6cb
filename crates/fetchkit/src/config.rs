//! Session resolution: config file + profile + CLI flags → `Session`.
//!
//! This is the single boundary where CLI flags meet the shared config
//! crate. Core only ever sees the resulting `SessionConfig`.

use std::collections::BTreeMap;
use std::sync::Arc;

use fetchkit_config::{self as config, Config, ConfigError, Profile};
use fetchkit_core::{CredentialStore, MemoryCredentialStore, Session};
use secrecy::SecretString;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Name used for a session built from `--base-url` alone.
const ADHOC_PROFILE: &str = "adhoc";

/// Everything a request command needs.
pub struct Resolved {
    pub session: Session,
    pub profile_name: String,
    pub refreshable: bool,
}

/// Load the config file, surfacing parse errors but tolerating absence.
pub fn load() -> Result<Config, CliError> {
    Ok(config::load_config()?)
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, cfg: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| cfg.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build a session from the active profile with CLI overrides applied.
///
/// With `--base-url` and no matching profile, an ad-hoc profile is used and
/// credentials come only from `--token`; the keyring is not consulted.
pub fn resolve_session(global: &GlobalOpts, cfg: &Config) -> Result<Resolved, CliError> {
    let name = active_profile_name(global, cfg);

    let (profile_name, mut profile, store) = match cfg.profile(Some(&name)) {
        Ok((name, profile)) => {
            let store = config::credential_store(profile, &name, global.token.as_deref());
            (name, profile.clone(), store)
        }
        Err(ConfigError::UnknownProfile { .. }) if global.base_url.is_some() => {
            let profile = adhoc_profile();
            let memory = MemoryCredentialStore::new();
            if let Some(token) = &global.token {
                memory.write(&profile.access_token_key, SecretString::from(token.as_str()));
            }
            let store: Arc<dyn CredentialStore> = Arc::new(memory);
            (ADHOC_PROFILE.to_owned(), profile, store)
        }
        Err(ConfigError::UnknownProfile { profile }) if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name: profile,
                available: available_profiles(cfg),
            });
        }
        Err(ConfigError::UnknownProfile { .. } | ConfigError::NoProfile) => {
            return Err(CliError::NoConfig {
                path: config::config_path().display().to_string(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    apply_overrides(&mut profile, global)?;
    let session_config = config::profile_to_session_config(&profile, &cfg.defaults)?;
    tracing::debug!(
        profile = %profile_name,
        base_url = %session_config.base_url,
        refresh = session_config.refresh.is_some(),
        "resolved session"
    );

    Ok(Resolved {
        refreshable: session_config.refresh.is_some(),
        session: Session::new(&session_config, store)?,
        profile_name,
    })
}

fn adhoc_profile() -> Profile {
    Profile {
        base_url: String::new(),
        headers: BTreeMap::new(),
        access_token_key: "accessToken".into(),
        token: None,
        token_env: None,
        ca_cert: None,
        insecure: None,
        timeout: None,
        refresh: None,
    }
}

/// Flags win over the profile: base URL, extra headers, TLS, timeout.
fn apply_overrides(profile: &mut Profile, global: &GlobalOpts) -> Result<(), CliError> {
    if let Some(url) = &global.base_url {
        profile.base_url.clone_from(url);
    }
    for raw in &global.headers {
        let (name, value) = parse_header_flag(raw)?;
        profile.headers.insert(name, value);
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if global.timeout.is_some() {
        profile.timeout = global.timeout;
    }
    Ok(())
}

/// Split a `-H "name: value"` flag.
pub fn parse_header_flag(raw: &str) -> Result<(String, String), CliError> {
    let (name, value) = raw.split_once(':').ok_or_else(|| CliError::Validation {
        field: "header".into(),
        reason: format!("expected NAME:VALUE, got '{raw}'"),
    })?;
    let name = name.trim();
    if name.is_empty() {
        return Err(CliError::Validation {
            field: "header".into(),
            reason: format!("missing header name in '{raw}'"),
        });
    }
    Ok((name.to_owned(), value.trim().to_owned()))
}

fn available_profiles(cfg: &Config) -> String {
    if cfg.profiles.is_empty() {
        "(none)".into()
    } else {
        cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}
