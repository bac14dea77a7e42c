use anyhow::Result;
use clap::Parser;

// Core modules
mod cli;
mod commands;
mod config;

mod domain;
mod error;
mod infrastructure;
mod services;
mod ui;

use cli::{Cli, Commands};
use commands::{deploy, destroy, info};
use config::ToolConfig;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging with LOGGING env var support
    // LOGGING=debug,info,warn,error or just LOGGING=debug
    let log_level = std::env::var("LOGGING")
        .or_else(|_| std::env::var("LOG_LEVEL"))
        .unwrap_or_else(|_| {
            if cli.verbose {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(false) // Disable ANSI escape codes for cleaner output
        .init();

    if let Err(e) = run(cli).await {
        ui::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let tool = ToolConfig::load(cli.config.as_deref(), cli.state_dir)?;

    match cli.command {
        Commands::Deploy(args) => deploy::execute(&tool, args, VERSION).await?,
        Commands::Destroy(target) => destroy::execute(&tool, target, VERSION).await?,
        Commands::Info { target, json, env } => {
            info::execute(&tool, target, info::OutputFormat::from_flags(json, env), VERSION).await?
        }
    }

    Ok(())
}
