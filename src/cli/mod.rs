//! CLI interface for oracle-relay
//!
//! Provides subcommands for:
//! - `run`: Relay push and polled events to the webhook
//! - `config`: Show the effective configuration
//! - `sign`: Compute or check a webhook signature for a body file

mod run;
mod sign;

pub use run::RunArgs;
pub use sign::SignArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "oracle-relay")]
#[command(about = "Relay oracle price events to a signed webhook")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start relaying
    Run(RunArgs),
    /// Show the effective configuration
    Config,
    /// Compute or verify the x-signature header for a body
    Sign(SignArgs),
}
