mod cli;

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use prdispatch_core::db::{
    DbPool, create_pool, run_migrations,
    sessions::{OAuthStateRepo, SessionRepo},
};
use prdispatch_server::{AppState, Integration, IntegrationConfig, ServerConfig, build_router};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};

/// How often expired sessions and OAuth states are purged.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prdispatch_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = ServerConfig::from_env().map_err(anyhow::Error::msg)?;
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }

    let db = create_pool(&config.database_url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_url))?;
    run_migrations(&db).await.context("Failed to run migrations")?;

    if cli.command.unwrap_or_default() == Commands::Migrate {
        return Ok(());
    }

    let integration_config = IntegrationConfig::from_env().map_err(anyhow::Error::msg)?;
    if !integration_config.is_enabled() {
        tracing::warn!(
            "GitHub integration disabled, missing: {}",
            integration_config.missing().join(", ")
        );
    }
    let integration =
        Integration::from_config(&integration_config, &db).map_err(anyhow::Error::msg)?;

    tokio::spawn(purge_expired(db.clone()));

    let bind = config.bind.clone();
    let base_url = config.base_url.clone();
    let app = build_router(AppState::new(db, config, integration));

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    tracing::info!("prdispatch listening on http://{} (public URL {})", bind, base_url);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("prdispatch stopped");
    Ok(())
}

async fn purge_expired(db: DbPool) {
    let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
    loop {
        interval.tick().await;

        match SessionRepo::delete_expired(&db).await {
            Ok(0) => {}
            Ok(n) => tracing::debug!("Purged {} expired session(s)", n),
            Err(e) => tracing::warn!("Failed to purge expired sessions: {}", e),
        }
        if let Err(e) = OAuthStateRepo::delete_expired(&db).await {
            tracing::warn!("Failed to purge expired OAuth states: {}", e);
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
