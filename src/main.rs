//! Prism Mock - CLI Entry Point

use anyhow::Result;
use clap::Parser;
use prism_mock::{MockServer, MockServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "prism-mock",
    about = "Fixture-replay HTTP mock server - replays recorded responses with simulated latency",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "prism-mock.yaml")]
    config: PathBuf,

    /// Listen address, overrides the configuration file
    #[arg(long, value_name = "ADDR")]
    listen: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Print default config if requested
    if args.print_config {
        let default_config = include_str!("../demos/default-config.yaml");
        println!("{}", default_config);
        return Ok(());
    }

    // Load configuration
    let mut config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        MockServerConfig::from_file(&args.config)?
    } else if args.validate {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration (no routes)");
        MockServerConfig::default()
    };

    // Validate and exit if requested
    if args.validate {
        config.validate()?;
        println!(
            "Configuration is valid ({} routes defined)",
            config.routes.len()
        );
        return Ok(());
    }

    if let Some(listen) = args.listen {
        config.listen = listen;
    }

    let server = Arc::new(MockServer::new(&config)?);
    let listener = TcpListener::bind(config.listen).await?;

    tokio::select! {
        result = Arc::clone(&server).run(listener) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested, flushing pending fixture writes");
        }
    }

    let dispatcher = server.dispatcher();
    dispatcher.flush().await;
    info!(
        requests = dispatcher.total_requests(),
        mocked = dispatcher.total_mocked(),
        missed = dispatcher.total_missed(),
        failed = dispatcher.total_failed(),
        "Mock server stopped"
    );

    Ok(())
}
