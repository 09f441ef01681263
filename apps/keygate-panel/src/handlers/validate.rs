use axum::{
    Json,
    extract::{ConnectInfo, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
};
use keygate_shared::{ValidationRequest, ValidationResponse};
use std::net::SocketAddr;

use crate::AppState;
use crate::utils::client_ip;

/// POST /api/v1/licenses/validate
pub async fn validate_license(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Result<Json<ValidationRequest>, JsonRejection>,
) -> (StatusCode, Json<ValidationResponse>) {
    let caller_ip = client_ip(&headers, peer, &state.trusted_proxies);

    let reply = match payload {
        Ok(Json(req)) => state.validator.validate(req, caller_ip).await,
        Err(rejection) => {
            state
                .validator
                .reject_unreadable(caller_ip, &rejection.body_text())
                .await
        }
    };

    (reply.status, Json(reply.body))
}
