use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{str::FromStr, sync::Arc, time::Duration};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use fruitreel_server::{create_router, settings::Settings, AppState};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

fn spawn_session_cleanup(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = state.cleanup_expired_sessions().await {
                error!(error = %e, "session cleanup failed");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env()?;
    let options = SqliteConnectOptions::from_str(&settings.database_url)
        .with_context(|| format!("bad DATABASE_URL {}", settings.database_url))?
        .create_if_missing(true);
    let db = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    let bind = settings.bind.clone();
    let state = AppState::initialize(db, settings).await?;
    spawn_session_cleanup(state.clone());

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("listening on {bind}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
