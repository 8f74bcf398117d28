//! CLI command definitions for the `parley` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod check;
pub mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Chat widget backend: FAQ answers, Claude fallback, per-session history.
#[derive(Parser)]
#[command(name = "parley", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, env = "PARLEY_CONFIG", default_value = "parley.toml")]
    pub config: PathBuf,

    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server.
    Serve {
        /// Address to bind (overrides `server.host`).
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides `server.port` and PARLEY_PORT).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check configuration and credentials before starting the server.
    Check {
        /// Also contact the model provider and SMTP server.
        #[arg(long)]
        ping: bool,
    },
}
