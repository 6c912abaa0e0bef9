//! # Observability
//!
//! Logging and metrics shared by every sorter crate.
//!
//! ## Features
//!
//! - One `tracing` subscriber for the process, filtered by `RUST_LOG` or a
//!   level derived from the CLI verbosity flags
//! - JSON output for log shippers, pretty/compact output for a terminal
//! - Optional Prometheus scrape endpoint (`sortbin_*` series, see [`metrics`])
//! - Running statistics and the end-of-run [`RunSummary`]
//!
//! ## Usage
//!
//! ```ignore
//! let config = ObservabilityConfig::for_verbosity(cli.verbose, cli.quiet)
//!     .with_format(LogFormat::Compact);
//! observability::init_with_config(config)?;
//!
//! metrics::record_inference_latency(latency_ms);
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use crate::metrics::{RunSummary, RunningStats, StatsSummary};

/// Dependencies that are chatty at debug level
const QUIET_TARGETS: &[&str] = &["hyper=warn", "metrics_exporter_prometheus=warn"];

/// Logging and metrics setup
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// Prometheus port (None = no endpoint)
    pub metrics_port: Option<u16>,
    /// Level used when `RUST_LOG` is unset
    pub default_log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            metrics_port: None,
            default_log_level: "info".to_string(),
        }
    }
}

impl ObservabilityConfig {
    /// Map `-q` / `-v` / `-vv` onto a default level
    ///
    /// `quiet` wins over any verbosity.
    pub fn for_verbosity(verbose: u8, quiet: bool) -> Self {
        let level = match (quiet, verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        };
        Self {
            default_log_level: level.to_string(),
            ..Self::default()
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    pub fn with_metrics_port(mut self, port: u16) -> Self {
        self.metrics_port = Some(port);
        self
    }

    /// Filter used when `RUST_LOG` is not set
    fn fallback_filter(&self) -> EnvFilter {
        let directives = std::iter::once(self.default_log_level.as_str())
            .chain(QUIET_TARGETS.iter().copied())
            .collect::<Vec<_>>()
            .join(",");
        EnvFilter::new(directives)
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event, with file/line and thread name
    #[default]
    Json,
    Pretty,
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => anyhow::bail!("unknown log format '{other}'"),
        }
    }
}

/// Install the global subscriber and, if configured, the Prometheus endpoint
///
/// # Errors
/// - A global subscriber is already installed
/// - The metrics port cannot be bound or a recorder is already installed
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| config.fallback_filter());

    // Exactly one of the optional layers is Some
    let (json, pretty, compact) = match config.log_format {
        LogFormat::Json => (
            Some(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_file(true)
                    .with_line_number(true),
            ),
            None,
            None,
        ),
        LogFormat::Pretty => (None, Some(fmt::layer().pretty()), None),
        LogFormat::Compact => (None, None, Some(fmt::layer().compact())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .with(compact)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        install_prometheus(port)?;
    }

    tracing::debug!(
        log_format = ?config.log_format,
        level = %config.default_log_level,
        metrics_port = ?config.metrics_port,
        "logging ready"
    );
    Ok(())
}

/// Start the Prometheus endpoint when logging was set up separately
///
/// The pipeline calls this after the CLI has installed logging, once it
/// knows whether `--metrics-port` was given.
///
/// # Errors
/// Binding the port or installing the recorder failed.
pub fn init_metrics_only(port: u16) -> Result<()> {
    install_prometheus(port)
}

fn install_prometheus(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .with_context(|| format!("Failed to serve Prometheus metrics on port {port}"))?;

    tracing::info!(port, "serving Prometheus metrics on /metrics");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(ObservabilityConfig::for_verbosity(0, false).default_log_level, "info");
        assert_eq!(ObservabilityConfig::for_verbosity(1, false).default_log_level, "debug");
        assert_eq!(ObservabilityConfig::for_verbosity(3, false).default_log_level, "trace");
        assert_eq!(ObservabilityConfig::for_verbosity(2, true).default_log_level, "warn");
    }

    #[test]
    fn test_builder_keeps_level() {
        let config = ObservabilityConfig::for_verbosity(1, false)
            .with_format(LogFormat::Compact)
            .with_metrics_port(9100);
        assert_eq!(config.log_format, LogFormat::Compact);
        assert_eq!(config.metrics_port, Some(9100));
        assert_eq!(config.default_log_level, "debug");
    }

    #[test]
    fn test_fallback_filter_quiets_dependencies() {
        let filter = ObservabilityConfig::for_verbosity(2, false).fallback_filter().to_string();
        assert!(filter.contains("trace"), "got: {filter}");
        assert!(filter.contains("hyper=warn"), "got: {filter}");
    }

    #[test]
    fn test_log_format_from_str() {
        assert!(matches!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json)));
        assert!(matches!("compact".parse::<LogFormat>(), Ok(LogFormat::Compact)));
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
