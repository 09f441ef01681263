//! JSON admin API, mounted under `/api/admin` behind the bearer-token guard.

pub mod customers;
pub mod licenses;
pub mod products;
pub mod security;

use axum::{
    Router, middleware,
    routing::{delete, get, post},
};

use crate::AppState;
use crate::auth::admin_auth_middleware;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/customers", get(customers::list_customers).post(customers::create_customer))
        .route("/customers/{id}", get(customers::get_customer).put(customers::update_customer))
        .route("/customers/{id}/toggle", post(customers::toggle_customer))
        .route("/products", get(products::list_products).post(products::create_product))
        .route("/products/{id}", get(products::get_product).put(products::update_product))
        .route("/products/{id}/toggle", post(products::toggle_product))
        .route(
            "/products/{id}/rules",
            get(products::get_rules)
                .put(products::put_rules)
                .delete(products::delete_rules),
        )
        .route("/licenses", get(licenses::list_licenses).post(licenses::issue_license))
        .route("/licenses/{key}", get(licenses::get_license))
        .route("/licenses/{key}/status", post(licenses::change_status))
        .route("/licenses/{key}/extend", post(licenses::extend_license))
        .route("/licenses/{key}/rebind", post(licenses::rebind_license))
        .route("/licenses/{key}/activations", get(licenses::list_activations))
        .route("/security-events", get(security::list_events))
        .route("/blocked-ips/{ip}", delete(security::unblock_ip))
        .layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
