use axum::{
    Json,
    extract::{Path, Query, State},
};
use keygate_db::models::security_event::SecurityEvent;
use keygate_db::repositories::security_event_repo::SecurityEventRepository;
use serde::Deserialize;
use serde_json::{Value, json};
use std::net::IpAddr;

use crate::AppState;
use crate::error::{ApiError, ApiResult};

const SEVERITIES: [&str; 4] = ["low", "medium", "high", "critical"];

#[derive(Debug, Deserialize)]
pub struct EventQuery {
    pub severity: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventQuery>,
) -> ApiResult<Json<Vec<SecurityEvent>>> {
    let severity = query.severity.map(|s| s.trim().to_lowercase());
    if let Some(s) = &severity {
        if !SEVERITIES.contains(&s.as_str()) {
            return Err(ApiError::BadRequest(format!("Unknown severity: {}", s)));
        }
    }

    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    let events = SecurityEventRepository::new(state.pool.clone())
        .list(severity.as_deref(), limit)
        .await?;
    Ok(Json(events))
}

pub async fn unblock_ip(
    Path(ip): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<Value>> {
    let ip: IpAddr = ip
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid IP address: {}", ip)))?;

    if !state.gate.unblock(&ip.to_string()).await? {
        return Err(ApiError::NotFound(format!("{} is not blocked", ip)));
    }
    tracing::info!(%ip, "IP manually unblocked");
    Ok(Json(json!({ "ip": ip.to_string(), "unblocked": true })))
}
