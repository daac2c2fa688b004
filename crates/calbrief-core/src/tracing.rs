//! Tracing setup for calbrief.
//!
//! Two presets cover the deployment contexts:
//!
//! ```ignore
//! use calbrief_core::tracing::{init_tracing, TracingConfig};
//!
//! // Local runs, where the consent step may open a browser.
//! init_tracing(TracingConfig::interactive())?;
//!
//! // Serverless invocations, where a log collector reads JSON lines.
//! init_tracing(TracingConfig::serverless())?;
//! ```
//!
//! Logs go to stderr so that a host printing its report on stdout is not
//! interleaved with diagnostics.

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

/// Errors that can occur during tracing initialization
#[derive(Debug, Error)]
pub enum TracingError {
    /// Failed to set global subscriber
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    /// Failed to parse env filter directive
    #[error("failed to parse env filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// Output format for tracing logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    /// Multi-line human-readable format
    Pretty,
    /// Single-line format (default)
    #[default]
    Compact,
    /// One JSON object per line
    Json,
}

/// Configuration for tracing initialization
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level applied to the `calbrief` targets when RUST_LOG is not set
    pub default_level: Level,
    pub output_format: TracingOutputFormat,
    /// Whether to include file/line information
    pub include_location: bool,
    pub include_target: bool,
    pub include_timestamp: bool,
    /// Whether to emit span open/close events
    pub include_span_events: bool,
    /// Whether to emit ANSI color codes
    pub ansi: bool,
    /// Custom env filter directive (overrides default_level if set)
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            output_format: TracingOutputFormat::Compact,
            include_location: false,
            include_target: true,
            include_timestamp: true,
            include_span_events: false,
            ansi: true,
            env_filter: None,
        }
    }
}

impl TracingConfig {
    /// Config for a local terminal session.
    #[must_use]
    pub fn interactive() -> Self {
        Self {
            include_timestamp: false,
            ..Self::default()
        }
    }

    /// Config for a short-lived serverless invocation.
    ///
    /// The platform timestamps every line itself and does not render colors.
    #[must_use]
    pub fn serverless() -> Self {
        Self {
            default_level: Level::INFO,
            output_format: TracingOutputFormat::Json,
            include_location: true,
            include_target: true,
            include_timestamp: false,
            include_span_events: true,
            ansi: false,
            env_filter: None,
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Set a custom env filter directive
    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Builds the filter: explicit directive, then `RUST_LOG`, then the default level.
    fn build_filter(&self) -> Result<EnvFilter, TracingError> {
        if let Some(ref filter) = self.env_filter {
            return Ok(EnvFilter::try_new(filter)?);
        }
        Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("calbrief={}", self.default_level))))
    }
}

/// Initialize the global tracing subscriber.
///
/// Call once per process. A warm serverless container reuses the process, so
/// the handler should guard this with a `std::sync::Once` or ignore the
/// [`TracingError::SetGlobalSubscriber`] returned on the second call.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let env_filter = config.build_filter()?;

    let span_events = if config.include_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let base = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.ansi)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_target(config.include_target)
        .with_span_events(span_events);

    let layer = match (config.output_format, config.include_timestamp) {
        (TracingOutputFormat::Pretty, true) => base.pretty().boxed(),
        (TracingOutputFormat::Pretty, false) => base.pretty().without_time().boxed(),
        (TracingOutputFormat::Compact, true) => base.compact().boxed(),
        (TracingOutputFormat::Compact, false) => base.compact().without_time().boxed(),
        (TracingOutputFormat::Json, true) => base.json().boxed(),
        (TracingOutputFormat::Json, false) => base.json().without_time().boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(env_filter).with(layer);
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}
