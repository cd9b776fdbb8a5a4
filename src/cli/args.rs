//! CLI argument definitions.
//!
//! All Clap derive structs for `lurebox` command-line parsing.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

// ============================================================================
// Root CLI
// ============================================================================

/// Attack-session and defense-throttling engine for training labs.
#[derive(Parser, Debug)]
#[command(name = "lurebox", author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-error output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output control.
    #[arg(long, default_value = "auto", global = true, env = "LUREBOX_COLOR")]
    pub color: ColorChoice,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the engine: control API plus on-demand attack sessions.
    Serve(ServeArgs),

    /// Validate a configuration file without starting the engine.
    Validate(ValidateArgs),

    /// Display version information.
    Version(VersionArgs),
}

/// Arguments for `serve`.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to YAML configuration file; defaults apply when omitted.
    #[arg(short, long, env = "LUREBOX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the control API bind address from the config file.
    #[arg(long, env = "LUREBOX_BIND")]
    pub bind: Option<String>,

    /// Expose Prometheus metrics on `127.0.0.1:<port>`.
    #[arg(long, env = "LUREBOX_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Write the JSONL event stream to a file instead of stderr.
    #[arg(long, env = "LUREBOX_EVENTS_FILE")]
    pub events_file: Option<PathBuf>,

    /// Log output format.
    #[arg(long, default_value = "human")]
    pub log_format: OutputFormat,
}

/// Arguments for `validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the YAML configuration file to check.
    #[arg(short, long)]
    pub config: PathBuf,
}

/// Arguments for `version`.
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// CLI-Local Enums
// ============================================================================

/// Color output choice.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorChoice {
    /// Auto-detect terminal support.
    #[default]
    Auto,
    /// Always use color.
    Always,
    /// Never use color.
    Never,
}

/// Human or machine-readable output.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Plain text for terminals.
    #[default]
    Human,
    /// JSON for scripts.
    Json,
}
