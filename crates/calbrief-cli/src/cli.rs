//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// calbrief - calendar briefings from your Google Calendar
#[derive(Debug, Parser)]
#[command(name = "calbrief")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "CALBRIEF_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Compact, env = "CALBRIEF_LOG_FORMAT")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Authorize calbrief in the browser if no usable token is stored
    Login {
        /// Print the consent URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Show the state of the stored token without contacting Google
    Status,

    /// Acquire a token without user interaction (refreshing if needed)
    Check,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_login_with_flags() {
        let cli = Cli::try_parse_from(["calbrief", "-v", "login", "--no-browser"]).unwrap();
        assert!(cli.debug);
        assert!(matches!(cli.command, Command::Login { no_browser: true }));
    }

    #[test]
    fn parses_json_logging_for_check() {
        let cli =
            Cli::try_parse_from(["calbrief", "--log-format", "json", "check"]).unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(matches!(cli.command, Command::Check));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["calbrief"]).is_err());
    }
}
