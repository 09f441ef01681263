use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};

use crate::AppState;

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let database = match keygate_db::db::ping(&state.pool).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Health check: {:#}", e);
            false
        }
    };
    let redis = match state.gate.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Health check: {:#}", e);
            false
        }
    };

    let healthy = database && redis;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if healthy { "ok" } else { "degraded" },
            "version": env!("CARGO_PKG_VERSION"),
            "database": database,
            "redis": redis,
        })),
    )
}
