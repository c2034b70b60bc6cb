mod cli;
mod commands;
mod config;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Shell completions need no config at all
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "fetchkit", &mut std::io::stdout());
            Ok(())
        }

        Command::Config(args) => {
            let cfg = config::load()?;
            let format = output::resolve_format(&cli.global, &cfg.defaults.output);
            commands::config_cmd::handle(&args, &cli.global, &cfg, format)
        }

        Command::Token(args) => {
            let cfg = config::load()?;
            commands::token::handle(args, &cli.global, &cfg)
        }

        // Everything else talks to the API
        cmd => {
            let cfg = config::load()?;
            let format = output::resolve_format(&cli.global, &cfg.defaults.output);
            let resolved = config::resolve_session(&cli.global, &cfg)?;

            tracing::debug!(command = ?cmd, "dispatching command");
            commands::dispatch(cmd, &resolved, format).await
        }
    }
}
