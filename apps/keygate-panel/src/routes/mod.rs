use axum::{
    Router,
    http::{HeaderValue, header},
    routing::{get, post},
};
use tower_http::{
    compression::CompressionLayer, limit::RequestBodyLimitLayer,
    set_header::SetResponseHeaderLayer, trace::TraceLayer,
};

use crate::AppState;
use crate::handlers::{self, health, validate};

const MAX_BODY_BYTES: usize = 64 * 1024;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/licenses/validate", post(validate::validate_license))
        .nest("/api/admin", handlers::admin::routes(state.clone()))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenSigner;
    use crate::services::license_service::LicenseService;
    use crate::services::testing::{FixedGeo, MemoryGate, MemoryStore};
    use crate::services::validation_service::ValidationService;
    use crate::settings::ValidationSettings;
    use crate::validation::fixtures::{KEY, MAC, fingerprint, license, rule};
    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{Value, json};
    use sqlx::postgres::PgPoolOptions;
    use std::net::{IpAddr, SocketAddr};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    const SECRET: &str = "router-test-secret-0123";

    struct TestApp {
        router: Router,
        store: Arc<MemoryStore>,
        gate: Arc<MemoryGate>,
    }

    fn test_app() -> TestApp {
        test_app_behind(&[])
    }

    fn test_app_behind(trusted_proxies: &[IpAddr]) -> TestApp {
        // Nothing listens on port 1, so any database access fails fast.
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(500))
            .connect_lazy("postgres://keygate@127.0.0.1:1/keygate")
            .unwrap();

        let store = Arc::new(MemoryStore::default());
        store.put_license(license());
        let gate = Arc::new(MemoryGate::new(100, 10));
        let validator = ValidationService::new(
            store.clone(),
            gate.clone(),
            Arc::new(FixedGeo::new([])),
            ValidationSettings::default(),
        );

        let state = AppState {
            licenses: LicenseService::new(pool.clone()),
            pool,
            validator,
            gate: gate.clone(),
            signer: TokenSigner::new(SECRET),
            trusted_proxies: trusted_proxies.into(),
        };
        let router = app(state).layer(MockConnectInfo(SocketAddr::from(([203, 0, 113, 7], 40000))));
        TestApp {
            router,
            store,
            gate,
        }
    }

    fn admin_token() -> String {
        TokenSigner::new(SECRET)
            .issue("ops", chrono::Duration::hours(1))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn validate_request(body: String) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/api/v1/licenses/validate")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn validate_endpoint_accepts_a_bound_device() {
        let t = test_app();
        let body = json!({
            "license_key": KEY,
            "hardware_fingerprint": fingerprint('a'),
            "hardware_hash": "hw-hash",
            "mac_addresses": [MAC],
            "computer_name": "OFFICE-DESK-7",
            "os_version": "Windows 11 Pro",
        });

        let response = t
            .router
            .oneshot(validate_request(body.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::X_CONTENT_TYPE_OPTIONS).unwrap(),
            "nosniff"
        );

        let json = body_json(response).await;
        assert_eq!(json["valid"], true);
        assert_eq!(json["status"], "active");
        assert!(json["session_id"].is_string());
        assert_eq!(t.store.logs()[0].ip_address.as_deref(), Some("203.0.113.7"));
    }

    #[tokio::test]
    async fn unreadable_body_is_a_logged_400() {
        let t = test_app();
        let response = t
            .router
            .oneshot(validate_request("{\"license_key\": 5".to_string()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["valid"], false);
        assert_eq!(json["status"], "invalid");
        assert_eq!(t.store.logs().len(), 1);
        assert_eq!(t.store.reads(), 0);
    }

    #[tokio::test]
    async fn forwarded_for_header_sets_caller_ip_behind_trusted_proxy() {
        let t = test_app_behind(&["203.0.113.7".parse::<IpAddr>().unwrap()]);
        let mut request = validate_request(
            json!({ "license_key": "bad", "hardware_fingerprint": "bad" }).to_string(),
        );
        request
            .headers_mut()
            .insert("x-forwarded-for", HeaderValue::from_static("198.51.100.4"));

        let response = t.router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(t.gate.failures("198.51.100.4"), 1);
    }

    #[tokio::test]
    async fn spoofed_forwarding_headers_from_direct_callers_are_ignored() {
        let t = test_app();
        let mut r = rule();
        r.allowed_countries = vec!["US".into()];
        t.store.put_rule(r);

        let body = json!({
            "license_key": KEY,
            "hardware_fingerprint": fingerprint('a'),
            "hardware_hash": "hw-hash",
            "mac_addresses": [MAC],
            "computer_name": "OFFICE-DESK-7",
            "os_version": "Windows 11 Pro",
        });
        let mut request = validate_request(body.to_string());
        request
            .headers_mut()
            .insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1"));
        request
            .headers_mut()
            .insert("x-real-ip", HeaderValue::from_static("192.168.1.1"));

        let response = t.router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let json = body_json(response).await;
        assert_eq!(json["status"], "geographic_restriction");
        assert_eq!(t.store.logs()[0].ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(t.gate.failures("203.0.113.7"), 1);
        assert_eq!(t.gate.failures("10.0.0.1"), 0);
    }

    #[tokio::test]
    async fn admin_api_requires_a_token() {
        let t = test_app();
        let response = t
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/admin/customers")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "Unauthorized");

        let forged = TokenSigner::new("some-other-secret-xyz")
            .issue("ops", chrono::Duration::hours(1))
            .unwrap();
        let response = t
            .router
            .oneshot(
                Request::builder()
                    .uri("/api/admin/customers")
                    .header(header::AUTHORIZATION, format!("Bearer {}", forged))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_can_lift_ip_blocks() {
        let t = test_app();
        t.gate.block("203.0.113.9");

        let unblock = |ip: &str| {
            Request::builder()
                .method(Method::DELETE)
                .uri(format!("/api/admin/blocked-ips/{}", ip))
                .header(header::AUTHORIZATION, format!("Bearer {}", admin_token()))
                .body(Body::empty())
                .unwrap()
        };

        let response = t.router.clone().oneshot(unblock("203.0.113.9")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!t.gate.is_blocked("203.0.113.9"));

        let response = t.router.clone().oneshot(unblock("203.0.113.9")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = t.router.oneshot(unblock("not-an-ip")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_reports_unreachable_database() {
        let t = test_app();
        let response = t
            .router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(response).await;
        assert_eq!(json["database"], false);
        assert_eq!(json["redis"], true);
        assert_eq!(json["status"], "degraded");
    }
}
