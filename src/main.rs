mod cli;
mod handlers;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::process;
use tvlinker::ConfigManager;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Validate CLI arguments first
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    // Initialize logging based on verbosity
    if args.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    let mut config_manager = match &args.config {
        Some(path) => ConfigManager::with_file(path.clone())?,
        None => ConfigManager::new()?,
    };

    if !args.skips_config_validation() {
        if let Err(e) = config_manager.validate() {
            eprintln!("Configuration validation failed: {}", e);
            eprintln!("Run 'tvlinker config path' to locate the file, or 'tvlinker config reset'");
            process::exit(1);
        }
    }

    if args.requires_realdebrid() && !config_manager.config().has_realdebrid_token() {
        eprintln!("No Real-Debrid API token configured");
        eprintln!(
            "Set realdebrid.api_token in {}",
            config_manager.config_file().display()
        );
        process::exit(1);
    }

    // Every task gets its own copy of the settings it needs
    let config = config_manager.config().clone();

    match args.command {
        Commands::Scrape { pages, filter } => {
            handlers::handle_scrape(&config, pages, filter).await?;
        }
        Commands::Hosters { url } => {
            handlers::handle_hosters(&config, url).await?;
        }
        Commands::Unrestrict { link } => {
            handlers::handle_unrestrict(&config, link).await?;
        }
        Commands::Hosts => {
            handlers::handle_hosts(&config).await?;
        }
        Commands::HostStatus { host } => {
            handlers::handle_host_status(&config, host).await?;
        }
        Commands::Aria2 { url, unrestrict } => {
            handlers::handle_aria2(&config, url, unrestrict).await?;
        }
        Commands::Download {
            url,
            output,
            unrestrict,
        } => {
            handlers::handle_download(&config, url, output, unrestrict).await?;
        }
        Commands::Config { action } => {
            handlers::handle_config(&mut config_manager, action).await?;
        }
    }

    Ok(())
}
