pub mod agents;
pub mod balance;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use common::db::AsyncDb;
use common::dexscreener::DexScreenerClient;
use common::solana::SolanaRpcClient;
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared application state available to all handlers.
pub struct AppState {
    pub db: AsyncDb,
    pub ledger: Arc<SolanaRpcClient>,
    pub market: Arc<DexScreenerClient>,
    pub max_concurrent_lookups: usize,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub api_key: Option<String>,
}

/// JSON error body shared by all handlers.
#[derive(Serialize)]
pub(crate) struct MessageResponse {
    pub message: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    // Health endpoint is always public (no auth)
    let public = Router::new().route("/api/health", get(health));

    // Protected routes require bearer token (if api_key is configured)
    let protected = Router::new()
        .route("/api/agents", post(agents::create_agent))
        .route(
            "/api/agents/{user_id}",
            get(agents::get_agent).put(agents::update_agent),
        )
        .route(
            "/api/agents/{user_id}/balance",
            get(balance::get_wallet_balance),
        )
        .route("/api/leaderboard", get(agents::leaderboard))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    public
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bearer token auth middleware. Skipped when no api_key is configured.
async fn auth_middleware(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let Some(api_key) = &state.api_key else {
        return next.run(req).await; // No key configured = dev mode
    };

    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok());

    match auth_header {
        Some(header) if header.starts_with("Bearer ") => {
            let token = &header[7..];
            if constant_time_eq(token.as_bytes(), api_key.as_bytes()) {
                next.run(req).await
            } else {
                unauthorized()
            }
        }
        _ => unauthorized(),
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(MessageResponse {
            message: "unauthorized".to_string(),
        }),
    )
        .into_response()
}

/// Constant-time comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = chrono::Utc::now()
        .signed_duration_since(state.started_at)
        .num_seconds();

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: uptime,
    })
}
