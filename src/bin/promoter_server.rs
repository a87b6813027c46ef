//! # Promoter Server
//!
//! Runs the promotion orchestrator: loads configuration, assembles the engine with its
//! stores and collaborators, starts the resume dispatcher and expiry sweeper, and serves
//! the approval webhook and execution API until interrupted.

use anyhow::Context;
use clap::Parser;
use promoter_core::config::ConfigManager;
use promoter_core::logging::init_structured_logging;
use promoter_core::orchestration::{simulated_collaborators, PromoterSystem, Stores};
use promoter_core::utils::{Clock, SystemClock};
use promoter_core::web::create_router;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "promoter-server")]
#[command(about = "Run the model promotion orchestrator")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration directory holding promoter.yaml (default: ./config when present)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Environment overlay to apply (development, test, production)
    #[arg(short, long)]
    environment: Option<String>,

    /// Override web.bind_address
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_structured_logging();

    let environment = cli
        .environment
        .unwrap_or_else(ConfigManager::detect_environment);
    let config_dir = cli.config_dir.or_else(|| {
        Some(PathBuf::from("config")).filter(|dir| dir.join("promoter.yaml").is_file())
    });
    let manager = ConfigManager::load_from_directory_with_env(config_dir, &environment)
        .context("failed to load configuration")?;

    let mut config = manager.config().clone();
    if let Some(bind) = cli.bind {
        config.web.bind_address = bind;
    }
    let bind_address = config.web.bind_address.clone();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let stores = Stores::from_config(&config.database)
        .await
        .context("failed to initialize stores")?;
    let collaborators = simulated_collaborators(&config, Arc::clone(&clock));
    let mut system = PromoterSystem::build(config, stores, collaborators, clock)
        .context("failed to assemble promoter")?;
    system.start_background();

    let app = create_router(system.app_state());
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    info!(
        bind_address = %bind_address,
        environment = %environment,
        "🌐 Promoter server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    system.shutdown();
    info!("Promoter server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
