// Config loading and profile translation tests.
#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::ExposeSecret;

use fetchkit_config::{
    Config, ConfigError, Defaults, Profile, RefreshProfile, load_config_from, override_token,
    profile_to_session_config, save_config_to,
};
use fetchkit_core::TlsVerification;

// ── Helpers ─────────────────────────────────────────────────────────

fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, contents).unwrap();
    (dir, path)
}

fn profile(base_url: &str) -> Profile {
    Profile {
        base_url: base_url.into(),
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

// ── Loading ─────────────────────────────────────────────────────────

#[test]
fn test_load_profiles_with_refresh_table() {
    let (_dir, path) = write_config(
        r#"
default_profile = "local"

[defaults]
timeout = 15

[profiles.local]
base_url = "http://localhost:3000"
headers = { "x-client" = "fetchkit" }

[profiles.local.refresh]
endpoint = "/refresh"
on = [403]
max_retries = 2
retry_delay_ms = 250

[profiles.prod]
base_url = "https://api.example.com"
access_token_key = "prodToken"
"#,
    );

    let config = load_config_from(&path).unwrap();
    assert_eq!(config.default_profile.as_deref(), Some("local"));
    assert_eq!(config.defaults.timeout, Some(15));
    assert_eq!(config.defaults.output, "json");

    let (name, local) = config.profile(None).unwrap();
    assert_eq!(name, "local");
    let refresh = local.refresh.as_ref().unwrap();
    assert_eq!(refresh.on, vec![403]);
    assert_eq!(refresh.refresh_token_key, "refreshToken");
    assert_eq!(refresh.body_field, "refreshToken");
    assert_eq!(refresh.token_field, "accessToken");
    assert_eq!(refresh.max_retries, 2);

    let (_, prod) = config.profile(Some("prod")).unwrap();
    assert_eq!(prod.access_token_key, "prodToken");
    assert!(prod.refresh.is_none());
}

#[test]
fn test_missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.default_profile.as_deref(), Some("default"));
    assert!(config.profiles.is_empty());
}

#[test]
fn test_unknown_profile() {
    let config = Config::default();
    let err = config.profile(Some("nope")).err().unwrap();
    assert!(matches!(err, ConfigError::UnknownProfile { ref profile } if profile == "nope"));
}

#[test]
fn test_save_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = Config::default();
    let mut p = profile("http://localhost:3000");
    p.refresh = Some(RefreshProfile {
        endpoint: "/auth/refresh".into(),
        on: vec![401],
        refresh_token_key: "rt".into(),
        body_field: "token".into(),
        token_field: "jwt".into(),
        max_retries: 1,
        retry_delay_ms: 0,
    });
    config.profiles.insert("default".into(), p);

    save_config_to(&config, &path).unwrap();
    let loaded = load_config_from(&path).unwrap();
    assert_eq!(loaded.profiles, config.profiles);
}

// ── Translation ─────────────────────────────────────────────────────

#[test]
fn test_profile_to_session_config() {
    let mut p = profile("http://localhost:3000");
    p.headers.insert("x-client".into(), "fetchkit".into());
    p.refresh = Some(RefreshProfile {
        endpoint: "/refresh".into(),
        on: vec![401, 403],
        refresh_token_key: "refreshToken".into(),
        body_field: "refreshToken".into(),
        token_field: "accessToken".into(),
        max_retries: 3,
        retry_delay_ms: 100,
    });
    let defaults = Defaults {
        timeout: Some(20),
        ..Defaults::default()
    };

    let config = profile_to_session_config(&p, &defaults).unwrap();
    assert_eq!(config.base_url.as_str(), "http://localhost:3000/");
    assert_eq!(config.headers.get("x-client").unwrap(), "fetchkit");
    assert_eq!(config.tls, TlsVerification::SystemDefaults);
    assert_eq!(config.timeout, Some(Duration::from_secs(20)));

    let refresh = config.refresh.unwrap();
    assert_eq!(refresh.max_retries, 3);
    assert_eq!(refresh.retry_delay, Duration::from_millis(100));
    assert!(refresh.on.contains(&403));
}

#[test]
fn test_no_timeout_by_default() {
    let config = profile_to_session_config(&profile("http://h"), &Defaults::default()).unwrap();
    assert!(config.timeout.is_none());
}

#[test]
fn test_tls_selection() {
    let mut p = profile("https://h");
    p.ca_cert = Some("/etc/ca.pem".into());
    let config = profile_to_session_config(&p, &Defaults::default()).unwrap();
    assert_eq!(config.tls, TlsVerification::CustomCa("/etc/ca.pem".into()));

    p.insecure = Some(true);
    let config = profile_to_session_config(&p, &Defaults::default()).unwrap();
    assert_eq!(config.tls, TlsVerification::DangerAcceptInvalid);
}

#[test]
fn test_validation_errors() {
    let err = profile_to_session_config(&profile("not a url"), &Defaults::default())
        .err()
        .unwrap();
    assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "base_url"));

    let mut p = profile("http://h");
    p.headers.insert("bad header".into(), "x".into());
    let err = profile_to_session_config(&p, &Defaults::default()).err().unwrap();
    assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "headers.bad header"));

    let mut p = profile("http://h");
    p.refresh = Some(RefreshProfile {
        endpoint: "/refresh".into(),
        on: vec![42],
        refresh_token_key: "r".into(),
        body_field: "r".into(),
        token_field: "a".into(),
        max_retries: 1,
        retry_delay_ms: 0,
    });
    let err = profile_to_session_config(&p, &Defaults::default()).err().unwrap();
    assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "refresh.on"));
}

// ── Credentials ─────────────────────────────────────────────────────

#[test]
fn test_flag_token_wins_over_plaintext() {
    let mut p = profile("http://h");
    p.token = Some("plain".into());

    let flag = override_token(&p, Some("flag")).unwrap();
    assert_eq!(flag.expose_secret(), "flag");

    let plain = override_token(&p, None).unwrap();
    assert_eq!(plain.expose_secret(), "plain");

    assert!(override_token(&profile("http://h"), None).is_none());
}
