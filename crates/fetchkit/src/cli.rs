//! Clap derive structures for the `fetchkit` CLI.

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// fetchkit -- talk to JSON APIs with stored tokens and automatic refresh
#[derive(Debug, Parser)]
#[command(
    name = "fetchkit",
    version,
    about = "Query and mutate JSON APIs from the command line",
    long_about = "Reads and writes JSON resources against a configured base URL.\n\n\
        Bearer tokens come from the system keyring (or --token), and an\n\
        expired token is refreshed and the request retried automatically\n\
        when the profile has a refresh policy.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Profile to use
    #[arg(long, short = 'p', env = "FETCHKIT_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Base URL (overrides the profile; works without a config file)
    #[arg(long, short = 'u', env = "FETCHKIT_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Extra header, `name: value` (repeatable)
    #[arg(long = "header", short = 'H', value_name = "NAME:VALUE", global = true)]
    pub headers: Vec<String>,

    /// Access token (bypasses the keyring)
    #[arg(long, env = "FETCHKIT_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format [default: from config, else json]
    #[arg(long, short = 'o', env = "FETCHKIT_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Accept invalid TLS certificates
    #[arg(long, short = 'k', global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

// ── Output ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Read a resource (GET)
    Get(GetArgs),

    /// Create a resource (POST)
    Post(WriteArgs),

    /// Replace a resource (PUT)
    Put(WriteArgs),

    /// Remove a resource (DELETE)
    #[command(alias = "rm")]
    Delete(DeleteArgs),

    /// Manage stored tokens
    Token(TokenArgs),

    /// Inspect CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Requests ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GetArgs {
    /// Path relative to the base URL, query string included
    pub path: String,

    /// Keep the query live and print every state change until Ctrl-C
    #[arg(long, short = 'w')]
    pub watch: bool,

    /// Quiet period before each watched fetch (e.g. 300ms)
    #[arg(long, value_parser = humantime::parse_duration, default_value = "0s")]
    pub debounce: Duration,

    /// Re-fetch on this interval while watching (e.g. 10s)
    #[arg(long, value_parser = humantime::parse_duration, requires = "watch")]
    pub interval: Option<Duration>,

    /// Don't fetch while the path contains `undefined` or `null`
    #[arg(long)]
    pub skip_unresolved: bool,
}

#[derive(Debug, Args)]
pub struct WriteArgs {
    /// Path relative to the base URL
    pub path: String,

    /// JSON body, or @FILE to read it from a file
    #[arg(long, short = 'd')]
    pub data: Option<String>,

    /// Resource id appended as the last path segment
    #[arg(long)]
    pub id: Option<String>,

    /// Send as multipart/form-data instead of JSON
    #[arg(long)]
    pub form: bool,

    /// Attach a file as a form field, FIELD=PATH (implies --form)
    #[arg(long, value_name = "FIELD=PATH")]
    pub attach: Vec<String>,

    /// Form fields sent as repeated `name` entries instead of `name[i]`
    #[arg(long, value_name = "FIELD")]
    pub repeat: Vec<String>,

    /// Leave null-valued fields out of the body
    #[arg(long)]
    pub drop_nulls: bool,
}

#[derive(Debug, Args)]
pub struct DeleteArgs {
    /// Path relative to the base URL
    pub path: String,

    /// Resource id appended as the last path segment
    #[arg(long)]
    pub id: Option<String>,
}

// ── Tokens ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct TokenArgs {
    #[command(subcommand)]
    pub command: TokenCommand,
}

#[derive(Debug, Subcommand)]
pub enum TokenCommand {
    /// Store a token in the keyring (reads stdin when --value is absent)
    Set {
        /// Credential key, e.g. accessToken
        key: String,

        #[arg(long)]
        value: Option<String>,
    },

    /// Show whether a token is stored
    Get {
        key: String,

        /// Print the token itself
        #[arg(long)]
        reveal: bool,
    },

    /// Remove a token from the keyring
    Clear { key: String },
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Show the resolved profile (secrets redacted)
    Show,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
