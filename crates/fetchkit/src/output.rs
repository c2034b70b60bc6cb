//! Output formatting: JSON, compact JSON, YAML.

use std::io::{self, Write};

use serde::Serialize;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;

/// Format from `--output`, else the config file's `defaults.output`, else JSON.
pub fn resolve_format(global: &GlobalOpts, configured: &str) -> OutputFormat {
    use clap::ValueEnum;

    global.output.unwrap_or_else(|| {
        OutputFormat::from_str(configured, true).unwrap_or(OutputFormat::Json)
    })
}

pub fn render<T: Serialize + ?Sized>(format: OutputFormat, data: &T) -> Result<String, CliError> {
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(data)?,
        OutputFormat::JsonCompact => serde_json::to_string(data)?,
        OutputFormat::Yaml => serde_yaml::to_string(data).map_err(|e| CliError::Output {
            message: e.to_string(),
        })?,
    };
    Ok(rendered.trim_end().to_owned())
}

/// Print the rendered output to stdout.
pub fn print_output(output: &str) {
    if output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}
