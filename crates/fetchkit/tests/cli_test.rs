//! Integration tests for the `fetchkit` CLI binary.
//!
//! Argument parsing and error handling run without a server; request
//! commands run against a wiremock server with config isolated to a
//! temporary directory.
#![allow(clippy::unwrap_used)]

use std::process::Output;

use assert_cmd::assert::OutputAssertExt;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `fetchkit` binary with env isolation.
///
/// Clears all `FETCHKIT_*` env vars and points config directories at `home`
/// so tests never touch the user's real configuration.
fn fetchkit_cmd(home: &std::path::Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("fetchkit");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("FETCHKIT_PROFILE")
        .env_remove("FETCHKIT_BASE_URL")
        .env_remove("FETCHKIT_TOKEN")
        .env_remove("FETCHKIT_OUTPUT")
        .env_remove("RUST_LOG");
    cmd
}

/// Run off the async runtime so the mock server keeps serving.
async fn run(mut cmd: assert_cmd::Command) -> Output {
    tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap()
}

fn combined_output(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let home = tempfile::tempdir().unwrap();
    let output = fetchkit_cmd(home.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn test_help_lists_commands() {
    let home = tempfile::tempdir().unwrap();
    fetchkit_cmd(home.path()).arg("--help").assert().success().stdout(
        predicate::str::contains("get")
            .and(predicate::str::contains("post"))
            .and(predicate::str::contains("token"))
            .and(predicate::str::contains("--base-url")),
    );
}

#[test]
fn test_completions_zsh() {
    let home = tempfile::tempdir().unwrap();
    fetchkit_cmd(home.path())
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_get_without_base_url_is_usage_error() {
    let home = tempfile::tempdir().unwrap();
    let output = fetchkit_cmd(home.path()).args(["get", "/x"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("No base URL configured"));
}

#[test]
fn test_malformed_header_flag() {
    let home = tempfile::tempdir().unwrap();
    fetchkit_cmd(home.path())
        .args(["--base-url", "http://127.0.0.1:9", "-H", "nocolon", "get", "/x"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("NAME:VALUE"));
}

#[test]
fn test_connection_refused_exit_code() {
    let home = tempfile::tempdir().unwrap();
    fetchkit_cmd(home.path())
        .args(["--base-url", "http://127.0.0.1:9", "get", "/x"])
        .assert()
        .code(7)
        .stderr(predicate::str::contains("Could not reach"));
}

#[test]
fn test_watch_interval_requires_watch() {
    let home = tempfile::tempdir().unwrap();
    fetchkit_cmd(home.path())
        .args(["--base-url", "http://h", "get", "/x", "--interval", "5s"])
        .assert()
        .code(2);
}

// ── Requests against a mock server ──────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_get_prints_json_with_flags_applied() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products"))
        .and(query_param("query", "shoe"))
        .and(header("authorization", "Bearer t-1"))
        .and(header("x-client", "cli"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1 }])))
        .expect(1)
        .mount(&server)
        .await;

    let home = tempfile::tempdir().unwrap();
    let mut cmd = fetchkit_cmd(home.path());
    cmd.args(["--base-url", &server.uri(), "--token", "t-1", "-H", "x-client: cli"])
        .args(["get", "/products?query=shoe"]);
    let output = run(cmd).await;

    output.clone().assert().success();
    assert_eq!(stdout_json(&output), json!([{ "id": 1 }]));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_get_not_found_exit_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let home = tempfile::tempdir().unwrap();
    let mut cmd = fetchkit_cmd(home.path());
    cmd.args(["--base-url", &server.uri(), "get", "/missing"]);
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(4));
    assert!(combined_output(&output).contains("not found"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unauthorized_exit_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let home = tempfile::tempdir().unwrap();
    let mut cmd = fetchkit_cmd(home.path());
    cmd.args(["--base-url", &server.uri(), "get", "/me"]);
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(3));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_post_drops_nulls_and_prints_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/products"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({ "name": "Shoe" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 9, "name": "Shoe" })))
        .expect(1)
        .mount(&server)
        .await;

    let home = tempfile::tempdir().unwrap();
    let mut cmd = fetchkit_cmd(home.path());
    cmd.args(["--base-url", &server.uri(), "-o", "json-compact"])
        .args(["post", "/products", "--data", r#"{"name":"Shoe","color":null}"#, "--drop-nulls"]);
    let output = run(cmd).await;

    output.clone().assert().success();
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        r#"{"id":9,"name":"Shoe"}"#
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_put_form_with_attachment() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/users/7"))
        .and(body_string_contains("name=\"avatar\"; filename=\"me.txt\""))
        .and(body_string_contains("hello avatar"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let home = tempfile::tempdir().unwrap();
    let file = home.path().join("me.txt");
    std::fs::write(&file, "hello avatar").unwrap();

    let mut cmd = fetchkit_cmd(home.path());
    cmd.args(["--base-url", &server.uri()]).args([
        "put",
        "/users",
        "--id",
        "7",
        "--data",
        r#"{"name":"Ada"}"#,
        "--attach",
        &format!("avatar={}", file.display()),
    ]);
    let output = run(cmd).await;

    output.clone().assert().success();
    assert_eq!(stdout_json(&output), json!({ "ok": true }));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_delete_with_empty_body() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/products/5"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let home = tempfile::tempdir().unwrap();
    let mut cmd = fetchkit_cmd(home.path());
    cmd.args(["--base-url", &server.uri(), "delete", "/products", "--id", "5"]);
    let output = run(cmd).await;

    output.clone().assert().success();
    assert!(output.stdout.is_empty());
}

// ── Profiles ────────────────────────────────────────────────────────

#[cfg(target_os = "linux")]
fn write_config(home: &std::path::Path, contents: &str) {
    let dir = home.join(".config").join("fetchkit");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), contents).unwrap();
}

#[cfg(target_os = "linux")]
#[tokio::test(flavor = "multi_thread")]
async fn test_profile_from_config_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", "Bearer plain-token"))
        .and(header("x-tenant", "acme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "ada" })))
        .expect(1)
        .mount(&server)
        .await;

    let home = tempfile::tempdir().unwrap();
    write_config(
        home.path(),
        &format!(
            r#"
default_profile = "dev"

[defaults]
output = "yaml"

[profiles.dev]
base_url = "{}"
token = "plain-token"
headers = {{ "x-tenant" = "acme" }}
"#,
            server.uri()
        ),
    );

    let mut cmd = fetchkit_cmd(home.path());
    cmd.args(["get", "/me"]);
    let output = run(cmd).await;

    output.clone().assert().success();
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "name: ada");
}

#[cfg(target_os = "linux")]
#[test]
fn test_config_path_and_show() {
    let home = tempfile::tempdir().unwrap();
    write_config(
        home.path(),
        r#"
[profiles.default]
base_url = "http://localhost:3000"
token = "s3cret"
"#,
    );

    fetchkit_cmd(home.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(".config/fetchkit/config.toml"));

    fetchkit_cmd(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("http://localhost:3000")
                .and(predicate::str::contains("****"))
                .and(predicate::str::contains("s3cret").not()),
        );

    fetchkit_cmd(home.path())
        .args(["--profile", "prod", "config", "show"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Profile 'prod' not found"));
}
