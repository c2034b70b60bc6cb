//! Token subcommand handlers: keyring storage per profile.

use std::io::{self, BufRead};

use secrecy::{ExposeSecret, SecretString};

use fetchkit_config::{Config, KeyringCredentialStore};

use crate::cli::{GlobalOpts, TokenArgs, TokenCommand};
use crate::config;
use crate::error::CliError;
use crate::output;

pub fn handle(args: TokenArgs, global: &GlobalOpts, cfg: &Config) -> Result<(), CliError> {
    let profile = config::active_profile_name(global, cfg);
    let store = KeyringCredentialStore::for_profile(&profile);

    match args.command {
        TokenCommand::Set { key, value } => {
            let value = match value {
                Some(value) => value,
                None => read_stdin_line()?,
            };
            if value.is_empty() {
                return Err(CliError::Validation {
                    field: "value".into(),
                    reason: "token cannot be empty".into(),
                });
            }
            store.set(&key, &SecretString::from(value))?;
            eprintln!("✓ {key} stored for profile '{profile}'");
            Ok(())
        }

        TokenCommand::Get { key, reveal } => {
            let secret = store.get(&key)?.ok_or_else(|| CliError::TokenMissing {
                key: key.clone(),
                profile: profile.clone(),
            })?;
            if reveal {
                output::print_output(secret.expose_secret());
            } else {
                output::print_output(&format!("{key}: set"));
            }
            Ok(())
        }

        TokenCommand::Clear { key } => {
            if store.delete(&key)? {
                eprintln!("✓ {key} removed from profile '{profile}'");
            } else {
                eprintln!("{key} was not stored for profile '{profile}'");
            }
            Ok(())
        }
    }
}

fn read_stdin_line() -> Result<String, CliError> {
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_owned())
}
