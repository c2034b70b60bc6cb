//! Command dispatch: bridges CLI args -> session calls -> output formatting.

pub mod config_cmd;
pub mod request;
pub mod token;

use fetchkit_core::MutationKind;

use crate::cli::{Command, OutputFormat};
use crate::config::Resolved;
use crate::error::CliError;

/// Dispatch a request-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    resolved: &Resolved,
    format: OutputFormat,
) -> Result<(), CliError> {
    match cmd {
        Command::Get(args) => request::get(resolved, &args, format).await,
        Command::Post(args) => request::write(resolved, MutationKind::Create, args, format).await,
        Command::Put(args) => request::write(resolved, MutationKind::Replace, args, format).await,
        Command::Delete(args) => request::delete(resolved, &args, format).await,
        // Token, Config, and Completions are handled before dispatch
        Command::Token(_) | Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
