//! Command-line interface.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::config::ConfigArgs;
use commands::replay::ReplayArgs;

/// Reconcile a remote work-queue subscription into a local stream of work items
#[derive(Parser, Debug)]
#[command(name = "taskfeed", version, about)]
pub struct Cli {
    /// Emit machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Load configuration from this file instead of .taskfeed/
    #[arg(long, global = true, env = "TASKFEED_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the effective configuration
    Config(ConfigArgs),
    /// Replay a script of snapshots through the engine
    Replay(ReplayArgs),
}

/// Print an error in the requested mode and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let chain: Vec<String> = err.chain().map(ToString::to_string).collect();
        println!(
            "{}",
            serde_json::json!({ "error": err.to_string(), "causes": chain })
        );
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1);
}
