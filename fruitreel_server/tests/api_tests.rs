//! HTTP API tests, driven through the router with `oneshot` on an in-memory database.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;

use fruitreel_server::settings::{Settings, DEFAULT_ADMIN_PASSWORD};
use fruitreel_server::{create_router, AppState};

async fn setup_with(settings: Settings) -> (Router, Arc<AppState>) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let state = AppState::initialize(pool, settings).await.unwrap();
    (create_router(state.clone()), state)
}

async fn setup() -> (Router, Arc<AppState>) {
    setup_with(Settings::default()).await
}

async fn body_json(body: Body) -> Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    (status, body_json(resp.into_body()).await)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn with_token(mut req: Request<Body>, token: &str) -> Request<Body> {
    req.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {token}").parse().unwrap(),
    );
    req
}

async fn new_session(app: &Router) -> String {
    let (status, json) = send(app, post_json("/api/v1/session", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    json["session_id"].as_str().unwrap().to_string()
}

async fn login(app: &Router) -> String {
    let (status, json) = send(
        app,
        post_json(
            "/api/v1/admin/login",
            json!({"username": "admin", "password": DEFAULT_ADMIN_PASSWORD}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["token_type"], "bearer");
    json["access_token"].as_str().unwrap().to_string()
}

// ── health / sessions ───────────────────────────────────────────────

#[tokio::test]
async fn health_returns_200() {
    let (app, _) = setup().await;
    let (status, json) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn session_create_and_fetch() {
    let (app, _) = setup().await;
    let id = new_session(&app).await;
    let (status, json) = send(&app, get(&format!("/api/v1/session/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["credits"], 1000);
    assert_eq!(json["total_spins"], 0);
    assert_eq!(json["is_active"], true);
}

#[tokio::test]
async fn unknown_session_is_404() {
    let (app, _) = setup().await;
    let (status, json) = send(&app, get("/api/v1/session/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "NotFound");

    let (status, _) = send(&app, post_json("/api/v1/spin/nope", json!({"bet_amount": 10}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── spin ────────────────────────────────────────────────────────────

#[tokio::test]
async fn spin_settles_credits_and_logs() {
    let (app, state) = setup().await;
    let id = new_session(&app).await;

    let (status, json) =
        send(&app, post_json(&format!("/api/v1/spin/{id}"), json!({"bet_amount": 10}))).await;
    assert_eq!(status, StatusCode::OK);
    let payout = json["payout"].as_i64().unwrap();
    assert_eq!(json["credits_remaining"].as_i64().unwrap(), 1000 - 10 + payout);
    assert_eq!(json["symbols"].as_array().unwrap().len(), 3);
    assert_eq!(json["is_winner"].as_bool().unwrap(), payout > 0);
    assert_eq!(json["winning_symbol"].is_null(), payout == 0);
    assert_eq!(json["session_data"]["total_spins"], 1);
    let rtp = json["session_data"]["rtp"].as_f64().unwrap();
    assert!((rtp - payout as f64 / 10.0 * 100.0).abs() < 1e-9);

    let (logged,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM spins WHERE session_id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await
        .unwrap();
    assert_eq!(logged, 1);
}

#[tokio::test]
async fn spin_rejects_insufficient_credits() {
    let settings = Settings {
        initial_credits: 5,
        ..Settings::default()
    };
    let (app, _) = setup_with(settings).await;
    let id = new_session(&app).await;
    let (status, json) =
        send(&app, post_json(&format!("/api/v1/spin/{id}"), json!({"bet_amount": 10}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "InsufficientCredits");

    let (_, session) = send(&app, get(&format!("/api/v1/session/{id}"))).await;
    assert_eq!(session["credits"], 5);
    assert_eq!(session["total_spins"], 0);
}

#[tokio::test]
async fn spin_rejects_bet_outside_range() {
    let (app, _) = setup().await;
    let id = new_session(&app).await;
    for bet in [0, -5, 101] {
        let (status, json) =
            send(&app, post_json(&format!("/api/v1/spin/{id}"), json!({"bet_amount": bet}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "bet {bet}");
        assert_eq!(json["error"], "ValidationError");
    }
}

// ── probability / simulation ────────────────────────────────────────

#[tokio::test]
async fn probability_reports_default_machine() {
    let (app, _) = setup().await;
    let (status, json) = send(&app, get("/api/v1/probability")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["symbols"].as_array().unwrap().len(), 7);
    assert_eq!(json["weights"]["🍒"], 30);
    assert_eq!(json["payout_multipliers"]["💎"], 50);
    let rtp = json["theoretical_rtp"].as_f64().unwrap();
    assert!((rtp - 195.706).abs() < 1e-9);
    let p_sum: f64 = json["symbol_probabilities"]
        .as_object()
        .unwrap()
        .values()
        .map(|v| v.as_f64().unwrap())
        .sum();
    assert!((p_sum - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn simulation_runs_and_compares() {
    let (app, _) = setup().await;
    let (status, json) = send(
        &app,
        post_json("/api/v1/simulate", json!({"num_simulations": 1000, "bet_amount": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let stats = &json["simulation_stats"];
    assert_eq!(stats["total_spins"], 1000);
    assert_eq!(stats["completed_spins"], 1000);
    assert_eq!(stats["total_bet"], 1000);
    assert_eq!(json["comparison_data"]["sample_size_sufficient"], false);
    assert_eq!(
        json["comparison_data"]["theoretical_rtp"],
        stats["theoretical_rtp"]
    );
}

#[tokio::test]
async fn simulation_bounds_enforced() {
    let (app, _) = setup().await;
    let (status, _) = send(
        &app,
        post_json("/api/v1/simulate", json!({"num_simulations": 10, "bet_amount": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(
        &app,
        post_json("/api/v1/simulate", json!({"num_simulations": 2_000_000, "bet_amount": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn session_stats_lists_recent_sessions() {
    let (app, _) = setup().await;
    new_session(&app).await;
    new_session(&app).await;
    let (status, json) = send(&app, get("/api/v1/sessions/stats?hours=1&limit=10")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 2);
    let (status, _) = send(&app, get("/api/v1/sessions/stats?limit=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ── admin ───────────────────────────────────────────────────────────

#[tokio::test]
async fn admin_routes_require_token() {
    let (app, _) = setup().await;
    let (status, json) = send(&app, get("/api/v1/admin/config")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "Unauthorized");

    let (status, _) = send(&app, with_token(get("/api/v1/admin/me"), "deadbeef.cafe")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_login_rejects_bad_password() {
    let (app, _) = setup().await;
    let (status, _) = send(
        &app,
        post_json("/api/v1/admin/login", json!({"username": "admin", "password": "guess"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_me_and_config() {
    let (app, _) = setup().await;
    let token = login(&app).await;

    let (status, me) = send(&app, with_token(get("/api/v1/admin/me"), &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "admin");
    assert_eq!(me["role"], "admin");
    assert_eq!(me["permissions"].as_array().unwrap().len(), 5);

    let (status, config) = send(&app, with_token(get("/api/v1/admin/config"), &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(config["symbol_analysis"].as_array().unwrap().len(), 7);
    assert_eq!(config["reel_count"], 3);
}

#[tokio::test]
async fn admin_update_changes_probability() {
    let (app, state) = setup().await;
    let token = login(&app).await;
    let update = json!({
        "symbol_weights": {"🍒": 60, "💎": 40},
        "payout_multipliers": {"🍒": 2, "💎": 10},
    });
    let (status, json) = send(
        &app,
        with_token(post_json("/api/v1/admin/probability/update", update), &token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["new_configuration"]["symbols"], json!(["🍒", "💎"]));

    let (_, prob) = send(&app, get("/api/v1/probability")).await;
    assert_eq!(prob["weights"], json!({"🍒": 60, "💎": 40}));
    assert!((prob["symbol_probabilities"]["💎"].as_f64().unwrap() - 0.4).abs() < 1e-12);

    // persisted for the next start
    let stored = fruitreel_server::db::load_config(&state.db).await.unwrap().unwrap();
    assert_eq!(stored.symbols().len(), 2);
}

#[tokio::test]
async fn admin_update_too_large_to_analyse() {
    let (app, state) = setup().await;
    let token = login(&app).await;
    // 70 symbols of weight 2 pass the weight policy but give C(72, 3) outcome classes
    let weights: serde_json::Map<String, Value> =
        (0..70).map(|i| (format!("s{i}"), json!(2))).collect();
    let multipliers: serde_json::Map<String, Value> =
        (0..70).map(|i| (format!("s{i}"), json!(2))).collect();
    let update = json!({"symbol_weights": weights, "payout_multipliers": multipliers});
    let (status, json) = send(
        &app,
        with_token(post_json("/api/v1/admin/probability/update", update), &token),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "ValidationError");

    let (_, prob) = send(&app, get("/api/v1/probability")).await;
    assert_eq!(prob["symbols"].as_array().unwrap().len(), 7);
    let stored = fruitreel_server::db::load_config(&state.db).await.unwrap().unwrap();
    assert_eq!(stored.symbols().len(), 7);
}

#[tokio::test]
async fn admin_update_not_applied_when_save_fails() {
    let (app, state) = setup().await;
    let token = login(&app).await;
    state.db.close().await;
    let update = json!({
        "symbol_weights": {"🍒": 60, "💎": 40},
        "payout_multipliers": {"🍒": 2, "💎": 10},
    });
    let (status, json) = send(
        &app,
        with_token(post_json("/api/v1/admin/probability/update", update), &token),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "InternalError");

    // the live machine is still the one on disk
    let (status, prob) = send(&app, get("/api/v1/probability")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(prob["symbols"].as_array().unwrap().len(), 7);
    assert_eq!(state.config.snapshot().symbols().len(), 7);
}

#[tokio::test]
async fn admin_update_policy_violations_keep_config() {
    let (app, _) = setup().await;
    let token = login(&app).await;
    let bad = [
        json!({"symbol_weights": {"🍒": 10, "💎": 5}, "payout_multipliers": {"🍒": 2, "💎": 10}}),
        json!({"symbol_weights": {"🍒": 60, "💎": 40}, "payout_multipliers": {"🍒": 2, "💎": 500}}),
        json!({"symbol_weights": {"🍒": 60, "💎": 0}, "payout_multipliers": {"🍒": 2, "💎": 10}}),
        json!({"symbol_weights": {"🍒": 60, "💎": 40}, "payout_multipliers": {"🍒": 2}}),
    ];
    for body in bad {
        let (status, json) = send(
            &app,
            with_token(post_json("/api/v1/admin/probability/update", body.clone()), &token),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(json["error"], "ValidationError");
    }
    let (_, prob) = send(&app, get("/api/v1/probability")).await;
    assert_eq!(prob["symbols"].as_array().unwrap().len(), 7);
}

#[tokio::test]
async fn admin_session_listing_delete_and_analytics() {
    let (app, _) = setup().await;
    let token = login(&app).await;
    let id = new_session(&app).await;
    send(&app, post_json(&format!("/api/v1/spin/{id}"), json!({"bet_amount": 10}))).await;

    let (status, list) = send(&app, with_token(get("/api/v1/admin/sessions"), &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, analytics) =
        send(&app, with_token(get("/api/v1/admin/sessions/analytics"), &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(analytics["total_sessions"], 1);
    assert_eq!(analytics["total_spins"], 1);
    assert_eq!(analytics["total_wagered"], 10);
    assert_eq!(analytics["period_hours"], 24);

    let delete = |uri: String| {
        with_token(
            Request::delete(uri).body(Body::empty()).unwrap(),
            &token,
        )
    };
    let (status, _) = send(&app, delete(format!("/api/v1/admin/sessions/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, delete(format!("/api/v1/admin/sessions/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cleanup_keeps_active_sessions() {
    let (app, state) = setup().await;
    new_session(&app).await;
    assert_eq!(state.cleanup_expired_sessions().await.unwrap(), 0);
}
