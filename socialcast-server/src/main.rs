//! socialcast-server - serve the social connect and publishing endpoints

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use libsocialcast::platforms::PlatformRegistry;
use libsocialcast::state_token::StateSigner;
use libsocialcast::{AccountStore, Config, OAuthOrchestrator, PublishGateway};
use socialcast_server::routes::{build_router, AppState};
use socialcast_server::session::SessionResolver;

#[derive(Parser, Debug)]
#[command(name = "socialcast-server")]
#[command(about = "Social credential and publishing gateway", long_about = None)]
struct Cli {
    /// Config file path (defaults to the XDG location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the configured port
    #[arg(long)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        libsocialcast::logging::init(libsocialcast::logging::LogFormat::Text, "debug");
    } else {
        libsocialcast::logging::init_default();
    }

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    let store = AccountStore::new(&config.database.path).await?;
    let registry = Arc::new(PlatformRegistry::from_config(&config)?);
    info!(platforms = ?registry.platforms(), "platform adapters ready");

    let state = AppState {
        orchestrator: Arc::new(OAuthOrchestrator::new(
            store.clone(),
            registry.clone(),
            StateSigner::new(config.auth.state_secret.as_str()),
        )),
        gateway: Arc::new(PublishGateway::new(store, registry)),
        sessions: SessionResolver::new(config.auth.session_secret.as_str()),
        frontend_base_url: config.server.frontend_base_url.clone(),
    };

    let app = build_router(state);

    let bind = cli.bind.unwrap_or_else(|| config.server.bind.clone());
    let port = cli.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "socialcast gateway listening");

    axum::serve(listener, app).await?;
    Ok(())
}
