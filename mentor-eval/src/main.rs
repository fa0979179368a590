//! mentor-eval - teaching session evaluation service
//!
//! Serves the session trigger/observation API and runs evaluation pipelines
//! in background tasks.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use mentor_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig};
use mentor_common::events::EventBus;
use mentor_eval::collaborators::Collaborators;
use mentor_eval::services::{PipelineSettings, ResultCache, StageOrchestrator};
use mentor_eval::AppState;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for mentor-eval
#[derive(Parser, Debug)]
#[command(name = "mentor-eval")]
#[command(about = "Multimodal teaching session evaluation service")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides config file)
    #[arg(short, long, env = "MENTOR_PORT")]
    port: Option<u16>,

    /// Root folder holding the database and uploads
    #[arg(short, long, env = "MENTOR_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Config file path
    #[arg(short, long, env = "MENTOR_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = TomlConfig::load_or_default(args.config.as_deref());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("mentor_eval={0},mentor_common={0},tower_http=info", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting mentor-eval v{}", env!("CARGO_PKG_VERSION"));

    let root_folder = RootFolderResolver::new("mentor-eval")
        .with_cli_arg(args.root_folder)
        .with_toml_value(config.root_folder.clone())
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .map_err(|e| anyhow::anyhow!("Failed to initialize root folder: {}", e))?;
    info!("Root folder: {}", initializer.root_folder().display());

    let db_path = initializer.database_path();
    let db_pool = mentor_eval::db::init_database_pool(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    info!("Database: {}", db_path.display());

    let scratch_dir = initializer.root_folder().join("scratch");
    let collaborators = Collaborators::from_config(&config, initializer.uploads_dir(), scratch_dir)
        .context("Failed to initialize collaborators")?;

    let settings = PipelineSettings::from_config(&config.pipeline).context("Invalid pipeline configuration")?;
    if let Some(subject) = settings.subject {
        info!(subject = %subject, "Default rubric subject");
    }

    let event_bus = EventBus::new(100);
    let cache = ResultCache::from_config(&config.cache);
    if !cache.is_enabled() {
        warn!("Result cache disabled");
    }

    let orchestrator = StageOrchestrator::new(
        db_pool.clone(),
        event_bus.clone(),
        cache.clone(),
        collaborators.clone(),
        settings,
    );
    let state = AppState::new(db_pool.clone(), event_bus, cache, orchestrator);
    let app = mentor_eval::build_router(state);

    let port = args.port.unwrap_or(config.port);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    collaborators.shutdown().await;
    db_pool.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
