use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use keygate_db::models::activation::ActivationLog;
use keygate_db::models::license::{LICENSE_STATUSES, License, LicenseFilter};
use keygate_db::repositories::activation_repo::ActivationRepository;
use serde::Deserialize;

use crate::AppState;
use crate::error::{ApiError, ApiResult};
use crate::services::license_service::{DeviceBinding, ExtendLicense, IssueLicense, StatusAction};

pub async fn list_licenses(
    State(state): State<AppState>,
    Query(filter): Query<LicenseFilter>,
) -> ApiResult<Json<Vec<License>>> {
    if let Some(status) = &filter.status {
        if !LICENSE_STATUSES.contains(&status.as_str()) {
            return Err(ApiError::BadRequest(format!("Unknown status filter: {}", status)));
        }
    }
    Ok(Json(state.licenses.list(&filter).await?))
}

pub async fn issue_license(
    State(state): State<AppState>,
    Json(req): Json<IssueLicense>,
) -> ApiResult<(StatusCode, Json<License>)> {
    let license = state.licenses.issue(&req).await?;
    Ok((StatusCode::CREATED, Json(license)))
}

pub async fn get_license(
    Path(key): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<License>> {
    Ok(Json(state.licenses.get(&key).await?))
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub action: StatusAction,
}

pub async fn change_status(
    Path(key): Path<String>,
    State(state): State<AppState>,
    Json(change): Json<StatusChange>,
) -> ApiResult<Json<License>> {
    Ok(Json(state.licenses.change_status(&key, change.action).await?))
}

pub async fn extend_license(
    Path(key): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<ExtendLicense>,
) -> ApiResult<Json<License>> {
    Ok(Json(state.licenses.extend(&key, &req).await?))
}

pub async fn rebind_license(
    Path(key): Path<String>,
    State(state): State<AppState>,
    Json(device): Json<DeviceBinding>,
) -> ApiResult<Json<License>> {
    Ok(Json(state.licenses.rebind(&key, &device).await?))
}

#[derive(Debug, Deserialize)]
pub struct ActivationQuery {
    pub limit: Option<i64>,
}

pub async fn list_activations(
    Path(key): Path<String>,
    State(state): State<AppState>,
    Query(query): Query<ActivationQuery>,
) -> ApiResult<Json<Vec<ActivationLog>>> {
    // 404 for unknown keys rather than an empty list
    state.licenses.get(&key).await?;

    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    let logs = ActivationRepository::new(state.pool.clone())
        .list_for_license(&key, limit)
        .await?;
    Ok(Json(logs))
}
