//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// sortbin - camera-driven waste sorting controller
#[derive(Parser, Debug)]
#[command(
    name = "sortbin",
    author,
    version,
    about = "Camera-driven waste sorting controller",
    long_about = "Classifies items seen by the camera, rotates the stepper-driven chute to the \n\
                  matching compartment, monitors compartment fill levels and serves the \n\
                  current state to dashboards over TCP."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "SORTBIN_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "SORTBIN_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the sorter on simulated hardware
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),

    /// Write a configuration file populated with defaults
    Init(InitArgs),

    /// Fetch the current state from a running sorter
    Query(QueryArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON); built-in defaults when omitted
    #[arg(short, long, env = "SORTBIN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the state bridge bind address (host:port)
    #[arg(long, env = "SORTBIN_BRIDGE_ADDR")]
    pub bridge_addr: Option<String>,

    /// Stop after this many seconds (0 = run until interrupted)
    #[arg(long, default_value = "0", env = "SORTBIN_TIMEOUT")]
    pub timeout: u64,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "SORTBIN_METRICS_PORT")]
    pub metrics_port: u16,

    /// Simulated hardware behaviour
    #[arg(long, value_enum, default_value = "steady", env = "SORTBIN_SIM_SCENARIO")]
    pub sim_scenario: SimScenario,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "sortbin.json")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "sortbin.json")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `init` command
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Destination file; the extension follows `--format` when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// File format
    #[arg(long, value_enum, default_value = "json")]
    pub format: ConfigFileFormat,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `query` command
#[derive(Parser, Debug)]
pub struct QueryArgs {
    /// State bridge address (host:port)
    #[arg(long, default_value = "127.0.0.1:5001", env = "SORTBIN_BRIDGE_ADDR")]
    pub addr: String,

    /// Raw command to send instead of GET_DATA
    #[arg(long)]
    pub command: Option<String>,

    /// Connect/read timeout in seconds
    #[arg(long, default_value = "5")]
    pub timeout: u64,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

/// Configuration file format written by `init`
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigFileFormat {
    Json,
    Toml,
}

impl ConfigFileFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Toml => "toml",
        }
    }
}

impl From<ConfigFileFormat> for config_loader::ConfigFormat {
    fn from(format: ConfigFileFormat) -> Self {
        match format {
            ConfigFileFormat::Json => Self::Json,
            ConfigFileFormat::Toml => Self::Toml,
        }
    }
}

/// Simulated hardware behaviour for `run`
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SimScenario {
    /// Healthy camera and sensors
    #[default]
    Steady,
    /// Camera unplugs after a few seconds; SIGHUP restarts it
    CameraFault,
    /// One compartment sensor stops answering after the first poll
    SensorFault,
}
