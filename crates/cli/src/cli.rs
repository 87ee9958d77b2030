//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// sinkctl - validate, inspect and exercise reactive sink configurations
#[derive(Parser, Debug)]
#[command(
    name = "sinkctl",
    author,
    version,
    about = "Reactive sink configuration tool",
    long_about = "Loads declarative sink configurations (TOML or JSON), validates them,\n\
                  describes the flavor and retention policy of each sink, and drives\n\
                  the configured sinks from concurrent producer threads."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "SINKCTL_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "compact",
        global = true,
        env = "SINKCTL_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default log level derived from -v / -q
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the configured sinks and drive them from producer threads
    Run(RunArgs),

    /// Validate configuration file without building sinks
    Validate(ValidateArgs),

    /// Describe flavor and policy of each configured sink
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "sinks.toml", env = "SINKCTL_CONFIG")]
    pub config: PathBuf,

    /// Concurrent producer threads per sink
    #[arg(long, default_value = "4", env = "SINKCTL_PRODUCERS")]
    pub producers: usize,

    /// Values emitted by each producer
    #[arg(long, default_value = "1000", env = "SINKCTL_VALUES")]
    pub values: u64,

    /// Unbounded subscribers attached to each sink before emitting
    #[arg(long, default_value = "1", env = "SINKCTL_SUBSCRIBERS")]
    pub subscribers: usize,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "SINKCTL_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "sinks.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "sinks.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    #[default]
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}
