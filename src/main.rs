//! Taskfeed CLI entry point.

use anyhow::Result;
use clap::Parser;

use taskfeed::cli::{Cli, Commands};
use taskfeed::infrastructure::config::ConfigLoader;
use taskfeed::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(err) = run(cli).await {
        taskfeed::cli::handle_error(err, json);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match cli.config {
        Some(ref path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    let _logger = LoggerImpl::init(&LogConfig::from_settings(&config.logging)?)?;

    match cli.command {
        Commands::Config(args) => taskfeed::cli::commands::config::execute(args, config, cli.json),
        Commands::Replay(args) => {
            taskfeed::cli::commands::replay::execute(args, config, cli.json).await
        }
    }
}
