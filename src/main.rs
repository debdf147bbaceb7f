use clap::Parser;
use std::error::Error;
use std::path::PathBuf;
use tokio::io::BufReader;
use tracing::info;

use studiod::backends::ToolProvider;
use studiod::config_loader::Settings;
use studiod::{logging, server, Dispatcher};

/// Local generative-media inference over line-delimited JSON on stdio
#[derive(Parser)]
#[command(name = "studiod")]
#[command(version)]
#[command(about = "Local image, speech and music inference daemon", long_about = None)]
struct Cli {
    /// Extra configuration file, layered over the defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Debug-level logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let settings = Settings::load(cli.config.as_deref())?;
    info!(version = studiod::dispatcher::VERSION, "studiod ready, reading requests from stdin");

    let dispatcher = Dispatcher::new(ToolProvider::new(settings));
    let stats = server::serve(
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        dispatcher,
    )
    .await?;

    info!(requests = stats.requests, errors = stats.errors, "exiting");
    Ok(())
}
