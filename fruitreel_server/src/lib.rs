pub mod auth;
pub mod db;
pub mod routes;
pub mod settings;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use fruitreel_core::{ConfigStore, SlotConfig, SlotError};
use fruitreel_shared::ApiError;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

use crate::auth::TokenSigner;
use crate::settings::Settings;

pub struct AppState {
    pub db: SqlitePool,
    pub settings: Settings,
    pub config: ConfigStore,
    pub tokens: TokenSigner,
    /// Held across persist-then-install so admin updates apply one at a time.
    pub update_lock: Mutex<()>,
}

impl AppState {
    /// Run migrations and load the stored configuration, seeding the default
    /// fruit machine on first start. `NUM_REELS` always decides the reel count.
    pub async fn initialize(db: SqlitePool, settings: Settings) -> anyhow::Result<Arc<Self>> {
        db::migrate(&db).await?;
        let config = match db::load_config(&db).await? {
            Some(stored) => stored,
            None => {
                info!("no stored configuration, seeding the default machine");
                SlotConfig::default_fruit()
            }
        };
        let config = if config.reel_count() != settings.num_reels {
            config.with_reel_count(settings.num_reels)?
        } else {
            config
        };
        let config = tokio::task::spawn_blocking(move || ConfigStore::new(config)).await??;
        let active = config.snapshot();
        db::save_config(&db, &active).await?;
        info!(
            symbols = active.symbols().len(),
            reels = active.reel_count(),
            "slot configuration loaded"
        );
        let tokens = TokenSigner::new(&settings.token_secret, settings.token_expiration_hours);
        Ok(Arc::new(AppState {
            db,
            config,
            tokens,
            settings,
            update_lock: Mutex::new(()),
        }))
    }

    /// Delete sessions idle longer than the configured timeout.
    pub async fn cleanup_expired_sessions(&self) -> sqlx::Result<u64> {
        let cutoff = Utc::now() - Duration::hours(self.settings.session_timeout_hours);
        let removed = db::cleanup_expired_sessions(&self.db, cutoff).await?;
        if removed > 0 {
            info!(removed, "expired sessions cleaned up");
        }
        Ok(removed)
    }
}

/// HTTP face of [`ApiError`].
#[derive(Debug)]
pub struct AppError(pub ApiError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ApiError::Invalid(_) | ApiError::InsufficientCredits { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self.0.to_response())).into_response()
    }
}

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        AppError(err)
    }
}

impl From<SlotError> for AppError {
    fn from(err: SlotError) -> Self {
        AppError(err.into())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        error!(error = %err, "database error");
        AppError(ApiError::Internal)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        error!(error = %err, "internal error");
        AppError(ApiError::Internal)
    }
}

pub type AppResult<T> = Result<T, AppError>;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/session", post(routes::create_session))
        .route("/session/:id", get(routes::get_session))
        .route("/spin/:id", post(routes::spin))
        .route("/probability", get(routes::probability))
        .route("/simulate", post(routes::simulate))
        .route("/sessions/stats", get(routes::session_stats))
        .route("/admin/login", post(routes::admin_login))
        .route("/admin/me", get(routes::admin_me))
        .route("/admin/config", get(routes::admin_config))
        .route("/admin/probability/update", post(routes::admin_update_probability))
        .route("/admin/sessions", get(routes::admin_sessions))
        .route("/admin/sessions/analytics", get(routes::admin_analytics))
        .route("/admin/sessions/:id", delete(routes::admin_delete_session));

    Router::new()
        .route("/health", get(routes::health))
        .nest("/api/v1", api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
