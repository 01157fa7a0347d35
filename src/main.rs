use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

use cli::Cli;
use config::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::load()?;
    if let Some(database_url) = &cli.database_url {
        settings.database_url = database_url.clone();
    }

    cli.run(settings).await
}
