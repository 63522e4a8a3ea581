//! Promptguard server - HTTP surface for the secure prompt orchestration core.

use anyhow::Result;
use clap::Parser;
use promptguard_server::{config::Config, logging, routes, state::AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use logging::{LogConfig, LogFormat};

/// Promptguard server - encrypted prompt storage and chat orchestration.
#[derive(Parser, Debug)]
#[command(name = "promptguard-server")]
#[command(about = "HTTP server for the secure prompt and response orchestration core")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override port from config
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging (INFO level for most targets)
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace logging (TRACE level for everything)
    #[arg(long)]
    trace: bool,

    /// Quiet mode (WARN and ERROR only)
    #[arg(short, long)]
    quiet: bool,

    /// Set log level for specific targets (e.g., "cache=debug").
    /// Can be specified multiple times. Targets are prefixed with
    /// "promptguard::" automatically.
    #[arg(long = "log", value_name = "TARGET=LEVEL")]
    log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_cli(
        cli.verbose,
        cli.debug,
        cli.trace,
        cli.quiet,
        cli.log_overrides,
        cli.log_format,
    );
    logging::init(&log_config);

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(port) = cli.port {
        config.port = port;
    }

    // The master key is a hard startup requirement. Booting without one
    // (or with a generated one) would strand every encrypted prompt.
    let master_key = config.resolve_master_key()?;

    let mut config_summary = serde_json::to_value(&config)?;
    promptguard_core::redact_sensitive(&mut config_summary);
    tracing::info!(target: "promptguard::startup", "Loaded configuration: {}", config_summary);

    let state = Arc::new(AppState::new(config.clone(), &master_key)?);
    state.spawn_background_tasks();
    tracing::info!(target: "promptguard::startup", "Initialized application state");

    let app = routes::api_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!(target: "promptguard::startup", "Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
