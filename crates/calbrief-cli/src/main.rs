//! calbrief CLI entry point.

mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;
use tracing::Level;

use calbrief_auth::{AuthResult, AuthSettings};
use calbrief_core::{TracingConfig, TracingOutputFormat, init_tracing};

use crate::cli::{Cli, Command, LogFormat};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let format = match cli.log_format {
        LogFormat::Pretty => TracingOutputFormat::Pretty,
        LogFormat::Compact => TracingOutputFormat::Compact,
        LogFormat::Json => TracingOutputFormat::Json,
    };
    let base = if format == TracingOutputFormat::Json {
        TracingConfig::serverless()
    } else {
        TracingConfig::interactive()
    };
    let level = match (cli.debug, format) {
        (true, _) => Level::DEBUG,
        (false, TracingOutputFormat::Json) => Level::INFO,
        (false, _) => Level::WARN,
    };
    if let Err(e) = init_tracing(base.with_format(format).with_level(level)) {
        eprintln!("warning: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            if e.is_retryable() {
                eprintln!("This failure is transient; try again.");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> AuthResult<()> {
    let settings = match &cli.config {
        Some(path) => AuthSettings::load_from(path)?,
        None => AuthSettings::load_default()?,
    }
    .apply_env();

    match cli.command {
        Command::Login { no_browser } => {
            let settings = AuthSettings {
                open_browser: settings.open_browser && !no_browser,
                ..settings
            };
            commands::login(&settings).await
        }
        Command::Status => commands::status(&settings).await,
        Command::Check => commands::check(&settings).await,
    }
}
