//! get / post / put / delete handlers.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::time::{Instant, Interval};
use tokio_stream::StreamExt;

use fetchkit_api::url_path::with_segment;
use fetchkit_core::{
    Binary, MutationKind, MutationOptions, Outcome, Payload, QueryOptions, QueryPhase, QueryState,
    WriteOptions,
};

use crate::cli::{DeleteArgs, GetArgs, OutputFormat, WriteArgs};
use crate::config::Resolved;
use crate::error::CliError;
use crate::output;

// ── Reads ───────────────────────────────────────────────────────────

pub async fn get(resolved: &Resolved, args: &GetArgs, format: OutputFormat) -> Result<(), CliError> {
    let options = QueryOptions {
        debounce: args.debounce,
        skip_unresolved: args.skip_unresolved,
        ..QueryOptions::default()
    };
    let query = resolved.session.query::<Value>(&args.path, options);
    tracing::debug!(profile = %resolved.profile_name, url = %query.url(), watch = args.watch, "get");

    if args.watch {
        return watch(resolved, &query, args.interval, format).await;
    }

    let state = tokio::select! {
        state = query.settled() => state,
        _ = tokio::signal::ctrl_c() => {
            query.close();
            return Err(CliError::Cancelled);
        }
    };

    match state.phase {
        QueryPhase::Succeeded => {
            let data = state.data.unwrap_or(Value::Null);
            output::print_output(&output::render(format, &data)?);
            Ok(())
        }
        QueryPhase::Idle => Err(CliError::Validation {
            field: "path".into(),
            reason: format!("'{}' has nothing to fetch", args.path),
        }),
        QueryPhase::Failed => match state.error {
            Some(e) => Err(CliError::request(e, &state.url, resolved.refreshable)),
            None => Ok(()),
        },
        QueryPhase::Cancelled | QueryPhase::Scheduled | QueryPhase::InFlight => {
            Err(CliError::Cancelled)
        }
    }
}

/// One line of `get --watch` output.
#[derive(Debug, Serialize)]
struct WatchEvent<'a> {
    phase: &'static str,
    loading: bool,
    url: &'a str,
    trigger: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
}

impl<'a> From<&'a QueryState<Value>> for WatchEvent<'a> {
    fn from(state: &'a QueryState<Value>) -> Self {
        Self {
            phase: phase_name(state.phase),
            loading: state.loading,
            url: &state.url,
            trigger: state.trigger,
            data: state.data.as_ref(),
            error: state.error.as_ref().map(ToString::to_string),
            status: state.error.as_ref().and_then(fetchkit_core::FetchError::status),
        }
    }
}

fn phase_name(phase: QueryPhase) -> &'static str {
    match phase {
        QueryPhase::Idle => "idle",
        QueryPhase::Scheduled => "scheduled",
        QueryPhase::InFlight => "in-flight",
        QueryPhase::Succeeded => "succeeded",
        QueryPhase::Failed => "failed",
        QueryPhase::Cancelled => "cancelled",
    }
}

async fn watch(
    resolved: &Resolved,
    query: &fetchkit_core::Query<Value>,
    interval: Option<Duration>,
    format: OutputFormat,
) -> Result<(), CliError> {
    // Watch output is one record per state, so pretty JSON collapses.
    let format = match format {
        OutputFormat::Json => OutputFormat::JsonCompact,
        other => other,
    };
    let mut states = query.stream();
    let mut ticker = interval.map(|period| tokio::time::interval_at(Instant::now() + period, period));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            biased;
            _ = &mut ctrl_c => break,
            next = states.next() => match next {
                Some(state) => {
                    output::print_output(&output::render(format, &WatchEvent::from(&state))?);
                }
                None => break,
            },
            () = tick(ticker.as_mut()) => {
                tracing::debug!(url = %query.url(), "interval reload");
                query.reload();
            }
        }
    }

    query.close();
    tracing::debug!(profile = %resolved.profile_name, "watch stopped");
    Ok(())
}

async fn tick(ticker: Option<&mut Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

// ── Writes ──────────────────────────────────────────────────────────

pub async fn write(
    resolved: &Resolved,
    kind: MutationKind,
    args: WriteArgs,
    format: OutputFormat,
) -> Result<(), CliError> {
    let attachments = parse_attachments(&args.attach)?;
    let mut payload = match &args.data {
        Some(raw) => Some(read_payload(raw).await?),
        None if !attachments.is_empty() => Some(Payload::map()),
        None => None,
    };

    if !attachments.is_empty() {
        if !matches!(payload, Some(Payload::Map(_))) {
            return Err(CliError::Validation {
                field: "attach".into(),
                reason: "files can only be attached to a JSON object body".into(),
            });
        }
        for (field, path) in attachments {
            let binary = read_binary(&path).await?;
            payload = payload.map(|p| p.with(field, binary));
        }
    }

    let mut write = if args.form || !args.attach.is_empty() {
        WriteOptions::form_data()
    } else {
        WriteOptions::default()
    };
    if args.drop_nulls {
        write = write.remove_nulls();
    }
    for field in args.repeat {
        write = write.repeated(field);
    }

    let options = MutationOptions {
        write,
        ..MutationOptions::default()
    };
    let mutation = resolved.session.mutation(kind, &args.path, options);
    let outcome = mutation.invoke(payload.as_ref(), args.id.as_deref()).await;
    finish(resolved, outcome, &with_segment(&args.path, args.id.as_deref()), format)
}

pub async fn delete(resolved: &Resolved, args: &DeleteArgs, format: OutputFormat) -> Result<(), CliError> {
    let mutation = resolved
        .session
        .remove(&args.path, MutationOptions::default());
    let outcome = mutation.invoke(None, args.id.as_deref()).await;
    finish(resolved, outcome, &with_segment(&args.path, args.id.as_deref()), format)
}

fn finish(
    resolved: &Resolved,
    outcome: Outcome<Value>,
    path: &str,
    format: OutputFormat,
) -> Result<(), CliError> {
    match outcome {
        Outcome::Success(Value::Null) => Ok(()),
        Outcome::Success(value) => {
            output::print_output(&output::render(format, &value)?);
            Ok(())
        }
        Outcome::Failure(e) => {
            let url = resolved
                .session
                .executor()
                .resolve_url(&fetchkit_api::RequestDescriptor::new(path));
            Err(CliError::request(e, &url, resolved.refreshable))
        }
        Outcome::Cancelled => Err(CliError::Cancelled),
    }
}

// ── Payload helpers ─────────────────────────────────────────────────

/// `--data` is inline JSON, or `@path` to a JSON file.
async fn read_payload(raw: &str) -> Result<Payload, CliError> {
    let text = match raw.strip_prefix('@') {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => raw.to_owned(),
    };
    let value: Value = serde_json::from_str(&text)?;
    Ok(Payload::from(value))
}

fn parse_attachments(flags: &[String]) -> Result<Vec<(String, PathBuf)>, CliError> {
    flags
        .iter()
        .map(|flag| {
            let (field, path) = flag
                .split_once('=')
                .filter(|(field, path)| !field.trim().is_empty() && !path.trim().is_empty())
                .ok_or_else(|| CliError::Validation {
                    field: "attach".into(),
                    reason: format!("expected FIELD=PATH, got '{flag}'"),
                })?;
            Ok((field.trim().to_owned(), PathBuf::from(path.trim())))
        })
        .collect()
}

async fn read_binary(path: &Path) -> Result<Binary, CliError> {
    let bytes = tokio::fs::read(path).await?;
    let binary = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => Binary::file(name, bytes),
        None => Binary::new(bytes),
    };
    Ok(binary)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attachments() {
        let parsed = parse_attachments(&["avatar = ./me.png".to_owned()]).unwrap();
        assert_eq!(parsed, vec![("avatar".to_owned(), PathBuf::from("./me.png"))]);

        assert!(parse_attachments(&["avatar".to_owned()]).is_err());
        assert!(parse_attachments(&["=x".to_owned()]).is_err());
    }

    #[tokio::test]
    async fn test_read_payload_inline_and_file() {
        let inline = read_payload(r#"{"name":"Shoe","color":null}"#).await.unwrap();
        assert_eq!(
            inline.to_json(),
            serde_json::json!({ "name": "Shoe", "color": null })
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("body.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        let from_file = read_payload(&format!("@{}", path.display())).await.unwrap();
        assert_eq!(from_file.to_json(), serde_json::json!([1, 2]));

        assert!(matches!(read_payload("{nope").await, Err(CliError::Json(_))));
    }
}
