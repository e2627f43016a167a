//! Geostamp CLI - stamp location and time captions onto geotagged photos.
//!
//! Photos are pushed through the annotation pipeline, which looks up the
//! street address for each photo's position and rewrites the photo in place
//! with coordinate, time and address captions.
//!
//! # Usage
//!
//! ```bash
//! # Annotate a directory of photos using their EXIF GPS data
//! geostamp annotate ./drive/
//!
//! # Annotate one photo at an explicit position
//! geostamp annotate frame.jpg --lat 37.7749 --lon -122.4194
//!
//! # Stream photos from a capture process as JSON lines
//! capture-tool | geostamp feed
//!
//! # View configuration
//! geostamp config show
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;
mod logging;

/// Geostamp - stamp location and time captions onto geotagged photos.
#[derive(Parser, Debug)]
#[command(name = "geostamp")]
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
    #[arg(long, global = true, env = "GEOSTAMP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Annotate photos on disk, reading positions from EXIF or the command line
    Annotate(cli::annotate::AnnotateArgs),

    /// Annotate photos streamed as JSON lines (path and position per line)
    Feed(cli::feed::FeedArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so config problems go to stderr directly.
    let config = cli::load_config(cli.config.as_deref())?;
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Geostamp v{}", geostamp_core::VERSION);

    match cli.command {
        Commands::Annotate(args) => cli::annotate::execute(args, config).await,
        Commands::Feed(args) => cli::feed::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args, config, cli.config).await,
    }
}
