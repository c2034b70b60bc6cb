//! Config subcommand handlers.

use serde_json::{Value, json};

use fetchkit_config::{Config, ConfigError, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config;
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "****";

// ── Helpers ─────────────────────────────────────────────────────────

/// Profile as JSON with the plaintext token masked.
fn redacted(profile: &Profile) -> Result<Value, CliError> {
    let mut value = serde_json::to_value(profile)?;
    if profile.token.is_some() {
        value["token"] = json!(REDACTED);
    }
    Ok(value)
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(
    args: &ConfigArgs,
    global: &GlobalOpts,
    cfg: &Config,
    format: OutputFormat,
) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&fetchkit_config::config_path().display().to_string());
            Ok(())
        }

        ConfigCommand::Show => {
            let name = config::active_profile_name(global, cfg);
            let (name, profile) = cfg.profile(Some(&name)).map_err(|e| match e {
                ConfigError::UnknownProfile { profile } => CliError::ProfileNotFound {
                    name: profile,
                    available: cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", "),
                },
                other => other.into(),
            })?;

            let shown = json!({
                "profile": name,
                "path": fetchkit_config::config_path().display().to_string(),
                "defaults": cfg.defaults,
                "settings": redacted(profile)?,
            });
            output::print_output(&output::render(format, &shown)?);
            Ok(())
        }
    }
}
