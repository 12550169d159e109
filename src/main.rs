//! watchserv server
//!
//! Run with: cargo run -- --config watchserv.toml
//!
//! # Configuration
//!
//! Without `--config` the default locations are tried (see
//! [`Config::load_default`]). Environment variables override the file:
//! - `WATCHSERV_HOST`, `WATCHSERV_PORT`: listen address
//! - `WATCHSERV_DOCUMENT_ROOT`: directory for static and streamed files
//! - `WATCHSERV_LOG_LEVEL`, `WATCHSERV_LOG_FORMAT`: logging
//! - `RUST_LOG`: full filter, takes precedence over the configured level

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use watchserv::config::{generate_default_config, Config, ConfigError, LoggingConfig};
use watchserv::hub::SubscriptionHub;
use watchserv::server::{serve, AppState, GeneratorRegistry, RouteTable};
use watchserv::watchable::{Agent, Kind, Value, WatchRegistry};

#[derive(Parser)]
#[command(name = "watchserv")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Serve observable variables over HTTP with live updates")]
struct Cli {
    /// Config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory static and streamed files are served from
    #[arg(short, long)]
    document_root: Option<PathBuf>,

    /// Register demo watchables that change on their own
    #[arg(long)]
    demo: bool,

    /// Print an example config file and exit
    #[arg(long)]
    print_config: bool,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("watchserv={},tower_http=info", logging.level).into());

    if logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn register_watchables(registry: &WatchRegistry, config: &Config) -> Result<(), ConfigError> {
    for def in &config.watchables {
        registry
            .register(&def.path, def.kind.clone(), def.value.clone())
            .map_err(|e| ConfigError::Definition {
                what: "watchable",
                path: def.path.clone(),
                reason: e.to_string(),
            })?;
    }
    Ok(())
}

/// Watchables that change by themselves, for trying out live pages
fn spawn_demo(registry: &WatchRegistry) -> anyhow::Result<()> {
    let ticks = registry.register("/demo/ticks", Kind::int(), Some(Value::Int(0)))?;
    let phase = registry.register(
        "/demo/phase",
        Kind::choice(["morning", "noon", "evening", "night"]),
        None,
    )?;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            match ticks.increment(Agent::App, 1) {
                Ok(Value::Int(n)) if n % 10 == 0 => {
                    if let Err(e) = phase.increment(Agent::App, 1) {
                        tracing::warn!(error = %e, "Demo phase update failed");
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Demo tick failed"),
            }
        }
    });
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.print_config {
        print!("{}", generate_default_config());
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::load_default(),
    };
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(root) = cli.document_root {
        config.server.document_root = root;
    }
    config.validate()?;

    init_tracing(&config.logging);
    tracing::info!("Starting watchserv v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Document root: {:?}", config.server.document_root);

    let hub = SubscriptionHub::new(config.hub.to_hub_config());
    let registry = Arc::new(WatchRegistry::new(hub));
    register_watchables(&registry, &config)?;
    if cli.demo {
        spawn_demo(&registry)?;
        tracing::info!("Demo watchables registered under /demo");
    }
    tracing::info!("{} watchables registered", registry.len());

    let generators = GeneratorRegistry::with_builtins();
    let routes = RouteTable::build(&config.routes(), &config.server.document_root, &generators)?;
    tracing::info!("{} routes configured", routes.len());

    let state = AppState::new(registry, routes, config.server);
    serve(state).await?;

    Ok(())
}
