//! Skill execution server.
//!
//! Run with: cargo run -p skillflow-server
//!
//! Configuration is read from the YAML file named by `SKILLFLOW_CONFIG`;
//! `SKILLFLOW_BIND` and `SKILLFLOW_PROJECT_DIR` override it.

use std::sync::Arc;

use anyhow::Context as _;
use skillflow_core::Settings;
use skillflow_executor::{ClaudeCli, FileAgentRegistry, FsSkillDocuments};
use skillflow_session::{FileStorage, Orchestrator, OrchestratorConfig, SessionStore};
use skillflow_transport::{AppState, create_router};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let settings = Settings::from_env().context("failed to load configuration")?;

    let sessions_dir = settings.sessions_dir();
    tracing::info!("Session records in {}", sessions_dir.display());
    let sessions = SessionStore::open(
        Arc::new(FileStorage::new(sessions_dir)),
        settings.sessions.inactivity_timeout(),
    )
    .await;

    let orchestrator = Orchestrator::new(
        Arc::new(ClaudeCli::from_settings(&settings.runtime)),
        Arc::new(FileAgentRegistry::new(
            settings.agents.orchestration_file.clone(),
            settings.agents.plugin_dir.clone(),
        )),
        Arc::new(FsSkillDocuments),
        sessions,
        OrchestratorConfig::from(&settings),
    );

    let cors = if settings.server.permissive_cors {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };
    let app = create_router(AppState::new(orchestrator, settings.project_dir.clone())).layer(cors);

    let listener = tokio::net::TcpListener::bind(settings.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", settings.server.bind))?;
    tracing::info!("Server listening on http://{}", settings.server.bind);
    tracing::info!("Project directory: {}", settings.project_dir.display());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
