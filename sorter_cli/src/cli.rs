//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "sorter", version, about = "Camera-driven waste sorter")]
pub struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE", default_value = "etc/sorter.toml")]
    pub config: PathBuf,

    /// Log and report as JSON lines instead of pretty text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); RUST_LOG takes precedence
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the sorter until Ctrl-C
    Run {
        /// Stop on its own after this many milliseconds
        #[arg(long, value_name = "MS")]
        duration_ms: Option<u64>,
        /// Stream every state snapshot to stdout as one JSON object per line
        #[arg(long, action = ArgAction::SetTrue)]
        snapshots: bool,
    },
    /// Claim every device once, grab a frame and read the sensors
    SelfCheck,
    /// Move the carriage to an absolute step position, then back home
    Jog {
        /// Target position in steps
        #[arg(long, allow_negative_numbers = true)]
        to: i64,
    },
    /// Take one fill-level reading of every bin
    Measure,
}
