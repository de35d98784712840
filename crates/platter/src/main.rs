//! Platter CLI - safe remote image re-hosting.
//!
//! Platter takes image URLs found in model output, fetches them without
//! exposing the network it runs in, validates the bytes, and stores them under
//! a content-derived key.
//!
//! # Usage
//!
//! ```bash
//! # Run the /image endpoint
//! platter serve --bind 127.0.0.1:8787
//!
//! # Re-host a single image and print the report
//! platter fetch https://cdn.example.com/dish.jpg
//!
//! # Re-host every URL in a file
//! platter ingest urls.txt --parallel 8 --output reports.jsonl --format jsonl
//!
//! # View configuration
//! platter config show
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// Platter - safe remote image re-hosting.
#[derive(Parser, Debug)]
#[command(name = "platter")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true, env = "PLATTER_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the image endpoint over HTTP
    Serve(cli::serve::ServeArgs),

    /// Re-host one image URL and print its report
    Fetch(cli::fetch::FetchArgs),

    /// Re-host a list of image URLs
    Ingest(cli::ingest::IngestArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so use eprintln for config warnings.
    let loaded = match &cli.config {
        Some(path) => platter_core::Config::load_from(path),
        None => platter_core::Config::load(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `platter config path`."
            );
            platter_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Platter v{}", platter_core::VERSION);

    match cli.command {
        Commands::Serve(args) => cli::serve::execute(args, config).await,
        Commands::Fetch(args) => cli::fetch::execute(args, config).await,
        Commands::Ingest(args) => cli::ingest::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args, cli.config).await,
    }
}
