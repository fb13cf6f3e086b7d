//! Bitvavo streamer - Entry Point

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Stream Bitvavo market data and account events to the log
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via BITVAVO_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // TLS crypto provider must be installed before any WS connection
    bitvavo_ws::init_crypto();

    let args = Args::parse();

    bitvavo_telemetry::init_logging()?;

    info!("Starting bitvavo-stream v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > BITVAVO_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("BITVAVO_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");

    let config = bitvavo_stream::AppConfig::from_file(&config_path)?;
    info!(
        ws_url = %config.ws.url,
        streams = config.streams.len(),
        "Configuration loaded"
    );

    let app = bitvavo_stream::Application::new(config)?;
    app.run().await?;

    Ok(())
}
