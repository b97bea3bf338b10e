use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::request::Parts,
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::{Duration, Utc};
use fruitreel_core::{score, simulate_parallel, spin_once, ConfigurationSummary, RngSource};
use fruitreel_shared::{
    AdminInfo, AdminLoginRequest, AdminLoginResponse, AdminProbabilityUpdate, AdminUpdateResponse,
    AnalyticsResponse, ApiError, ComparisonData, ProbabilityResponse, SessionData,
    SessionResponse, SessionStats, SimulationRequest, SimulationResponse, SpinRequest,
    SpinResponse,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::{verify_credentials, Claims, ADMIN_PERMISSIONS};
use crate::{db, AppError, AppResult, AppState};

const MIN_SIMULATION_SPINS: u64 = 100;
const ANALYTICS_WINDOW_HOURS: i64 = 24;

/// Verified admin token claims; rejects the request with 401 otherwise.
pub struct AdminClaims(pub Claims);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AdminClaims {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::Unauthorized("missing bearer token".into()))?;
        match state.tokens.verify(bearer.token(), Utc::now()) {
            Ok(claims) => Ok(AdminClaims(claims)),
            Err(e) => {
                warn!(error = %e, "admin token rejected");
                Err(ApiError::Unauthorized(e.to_string()).into())
            }
        }
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now(),
    }))
}

pub async fn create_session(State(state): State<Arc<AppState>>) -> AppResult<Json<SessionResponse>> {
    let id = Uuid::new_v4().to_string();
    let row = db::insert_session(&state.db, &id, state.settings.initial_credits, Utc::now()).await?;
    info!(session = %id, credits = row.credits, "session created");
    Ok(Json(row.to_response()?))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<SessionResponse>> {
    let row = db::fetch_session(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("session {id}")))?;
    Ok(Json(row.to_response()?))
}

fn check_bet(state: &AppState, bet: i64) -> Result<(), ApiError> {
    let (min, max) = (state.settings.min_bet, state.settings.max_bet);
    if !(min..=max).contains(&bet) {
        return Err(ApiError::Invalid(format!(
            "bet amount must be between {min} and {max}, got {bet}"
        )));
    }
    Ok(())
}

pub async fn spin(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SpinRequest>,
) -> AppResult<Json<SpinResponse>> {
    check_bet(&state, req.bet_amount)?;
    let session = db::fetch_session(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("session {id}")))?;
    if session.credits < req.bet_amount {
        return Err(ApiError::InsufficientCredits {
            credits: session.credits,
            bet: req.bet_amount,
        }
        .into());
    }

    let config = state.config.snapshot();
    let result = spin_once(&config, req.bet_amount, &mut RngSource::from_entropy())?;
    let winning_symbol = score(&result.outcome, config.payouts())?.map(|win| win.symbol);
    let payout = i64::try_from(result.payout)
        .map_err(|_| ApiError::Invalid("payout out of range".into()))?;

    let row = db::apply_spin(
        &state.db,
        &id,
        req.bet_amount,
        payout,
        result.outcome.symbols(),
        Utc::now(),
    )
    .await?;
    // lost a race with a concurrent spin or delete
    let Some(row) = row else {
        let credits = match db::fetch_session(&state.db, &id).await? {
            Some(s) => s.credits,
            None => return Err(ApiError::NotFound(format!("session {id}")).into()),
        };
        return Err(ApiError::InsufficientCredits {
            credits,
            bet: req.bet_amount,
        }
        .into());
    };

    debug!(
        session = %id,
        bet = req.bet_amount,
        payout,
        symbols = ?result.outcome.symbols(),
        "spin settled"
    );
    Ok(Json(SpinResponse {
        symbols: result.outcome.into_inner(),
        payout: result.payout,
        credits_remaining: row.credits,
        is_winner: result.is_winner,
        winning_symbol,
        session_data: SessionData {
            total_spins: row.total_spins,
            total_winnings: row.total_winnings,
            rtp: row.rtp(),
        },
    }))
}

pub async fn probability(State(state): State<Arc<AppState>>) -> AppResult<Json<ProbabilityResponse>> {
    Ok(Json(ProbabilityResponse::from(&*state.config.summary())))
}

pub async fn simulate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SimulationRequest>,
) -> AppResult<Json<SimulationResponse>> {
    let max = state.settings.max_simulation_spins;
    if !(MIN_SIMULATION_SPINS..=max).contains(&req.num_simulations) {
        return Err(ApiError::Invalid(format!(
            "num_simulations must be between {MIN_SIMULATION_SPINS} and {max}"
        ))
        .into());
    }
    check_bet(&state, req.bet_amount)?;

    let config = state.config.snapshot();
    let seed: u64 = rand::random();
    info!(spins = req.num_simulations, bet = req.bet_amount, seed, "simulation requested");
    let stats = tokio::task::spawn_blocking(move || {
        simulate_parallel(&config, req.num_simulations, req.bet_amount, seed, None)
    })
    .await
    .map_err(|e| anyhow::anyhow!("simulation task failed: {e}"))??;

    let comparison_data = ComparisonData::from(&stats);
    Ok(Json(SimulationResponse {
        simulation_stats: stats,
        comparison_data,
    }))
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub hours: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn session_stats(
    State(state): State<Arc<AppState>>,
    Query(q): Query<StatsQuery>,
) -> AppResult<Json<Vec<SessionStats>>> {
    let hours = q.hours.unwrap_or(24);
    let limit = q.limit.unwrap_or(100);
    if !(1..=24 * 30).contains(&hours) || !(1..=1000).contains(&limit) {
        return Err(ApiError::Invalid("hours must be in 1..=720 and limit in 1..=1000".into()).into());
    }
    let rows = db::recent_sessions(&state.db, Utc::now() - Duration::hours(hours), limit).await?;
    let stats = rows
        .iter()
        .map(|r| r.to_stats())
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Json(stats))
}

pub async fn admin_login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AdminLoginRequest>,
) -> AppResult<Json<AdminLoginResponse>> {
    let settings = &state.settings;
    if !verify_credentials(
        &settings.admin_username,
        &settings.admin_password_hash,
        &req.username,
        &req.password,
    ) {
        warn!(username = %req.username, "failed admin login");
        return Err(ApiError::Unauthorized("invalid username or password".into()).into());
    }
    let (token, claims) = state.tokens.issue(&req.username, Utc::now());
    info!(username = %req.username, "admin logged in");
    Ok(Json(AdminLoginResponse {
        access_token: token,
        token_type: "bearer".into(),
        expires_in: state.tokens.ttl().num_seconds(),
        expires_at: claims.expires_at(),
    }))
}

pub async fn admin_me(AdminClaims(claims): AdminClaims) -> Json<AdminInfo> {
    Json(AdminInfo {
        token_issued_at: claims.issued_at(),
        token_expires_at: claims.expires_at(),
        username: claims.username,
        role: claims.role,
        permissions: ADMIN_PERMISSIONS.iter().map(|p| p.to_string()).collect(),
    })
}

pub async fn admin_config(
    State(state): State<Arc<AppState>>,
    _admin: AdminClaims,
) -> AppResult<Json<ConfigurationSummary>> {
    Ok(Json(ConfigurationSummary::clone(&state.config.summary())))
}

pub async fn admin_update_probability(
    State(state): State<Arc<AppState>>,
    AdminClaims(admin): AdminClaims,
    Json(req): Json<AdminProbabilityUpdate>,
) -> AppResult<Json<AdminUpdateResponse>> {
    if let Err(e) = req.validate() {
        warn!(admin = %admin.username, error = %e, "probability update rejected");
        return Err(e.into());
    }
    // persist before install, one update at a time
    let _serial = state.update_lock.lock().await;
    let prepared = {
        let state = state.clone();
        tokio::task::spawn_blocking(move || {
            state
                .config
                .prepare_update(req.symbol_weights, req.payout_multipliers)
        })
        .await
        .map_err(|e| anyhow::anyhow!("configuration analysis failed: {e}"))??
    };
    db::save_config(&state.db, prepared.config()).await?;
    let new_configuration = ProbabilityResponse::from(&**prepared.summary());
    let next = state.config.install(prepared);
    info!(admin = %admin.username, symbols = next.symbols().len(), "probability settings updated");
    Ok(Json(AdminUpdateResponse {
        message: "probability settings updated".into(),
        new_configuration,
        updated_at: Utc::now(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

pub async fn admin_sessions(
    State(state): State<Arc<AppState>>,
    _admin: AdminClaims,
    Query(q): Query<ListQuery>,
) -> AppResult<Json<Vec<SessionResponse>>> {
    let limit = q.limit.unwrap_or(100).clamp(1, 1000);
    let rows = db::list_sessions(&state.db, limit).await?;
    let sessions = rows
        .iter()
        .map(|r| r.to_response())
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Json(sessions))
}

pub async fn admin_delete_session(
    State(state): State<Arc<AppState>>,
    AdminClaims(admin): AdminClaims,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    if !db::delete_session(&state.db, &id).await? {
        return Err(ApiError::NotFound(format!("session {id}")).into());
    }
    info!(admin = %admin.username, session = %id, "session deleted");
    Ok(Json(json!({ "message": format!("session {id} deleted") })))
}

pub async fn admin_analytics(
    State(state): State<Arc<AppState>>,
    _admin: AdminClaims,
) -> AppResult<Json<AnalyticsResponse>> {
    let now = Utc::now();
    let agg = db::aggregate_since(&state.db, now - Duration::hours(ANALYTICS_WINDOW_HOURS)).await?;
    Ok(Json(AnalyticsResponse {
        period_hours: ANALYTICS_WINDOW_HOURS,
        total_sessions: agg.total_sessions,
        active_sessions: agg.active_sessions,
        total_spins: agg.total_spins,
        total_wagered: agg.total_wagered,
        total_winnings: agg.total_winnings,
        house_edge_percent: agg.house_edge_percent(),
        average_spins_per_session: agg.average_spins_per_session(),
        current_probability_config: ProbabilityResponse::from(&*state.config.summary()),
        generated_at: now,
    }))
}
