use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::AppState;
use crate::error::ApiError;

pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminClaims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

/// HS256 signer for admin bearer tokens.
#[derive(Clone)]
pub struct TokenSigner {
    encoding: Arc<EncodingKey>,
    decoding: Arc<DecodingKey>,
}

impl TokenSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: Arc::new(EncodingKey::from_secret(secret.as_bytes())),
            decoding: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
        }
    }

    pub fn issue(&self, subject: &str, ttl: Duration) -> anyhow::Result<String> {
        let exp = Utc::now()
            .checked_add_signed(ttl)
            .ok_or_else(|| anyhow::anyhow!("token lifetime out of range"))?
            .timestamp() as usize;

        let claims = AdminClaims {
            sub: subject.to_string(),
            role: ADMIN_ROLE.to_string(),
            exp,
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    pub fn verify(&self, token: &str) -> Option<AdminClaims> {
        let data = decode::<AdminClaims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .ok()?;
        (data.claims.role == ADMIN_ROLE).then_some(data.claims)
    }
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = extract_bearer_token(req.headers())
        .and_then(|token| state.signer.verify(token))
        .ok_or(ApiError::Unauthorized)?;

    tracing::debug!(admin = %claims.sub, path = %req.uri().path(), "Admin request");
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret-0123456789";

    #[test]
    fn issued_tokens_verify() {
        let signer = TokenSigner::new(SECRET);
        let token = signer.issue("ops", Duration::hours(1)).unwrap();
        let claims = signer.verify(&token).unwrap();
        assert_eq!(claims.sub, "ops");
        assert_eq!(claims.role, ADMIN_ROLE);
    }

    #[test]
    fn foreign_and_expired_tokens_fail() {
        let signer = TokenSigner::new(SECRET);
        let other = TokenSigner::new("another-secret-abcdefgh");
        let token = other.issue("ops", Duration::hours(1)).unwrap();
        assert!(signer.verify(&token).is_none());

        let expired = signer.issue("ops", Duration::hours(-2)).unwrap();
        assert!(signer.verify(&expired).is_none());
        assert!(signer.verify("garbage").is_none());
    }

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer_token(&headers), Some("abc.def"));
    }
}
