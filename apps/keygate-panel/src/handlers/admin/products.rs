use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use keygate_db::models::product::{Product, ProductInput};
use keygate_db::models::rule::{LicenseRule, LicenseRuleInput};
use keygate_db::repositories::product_repo::ProductRepository;
use keygate_db::repositories::rule_repo::RuleRepository;
use serde_json::{Value, json};

use crate::AppState;
use crate::error::{ApiError, ApiResult};

const MINUTES_PER_DAY: i32 = 24 * 60;

fn normalize(mut input: ProductInput) -> ApiResult<ProductInput> {
    input.code = input.code.trim().to_uppercase();
    input.name = input.name.trim().to_string();
    input.latest_version = input
        .latest_version
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    input.update_url = input
        .update_url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty());

    if input.code.is_empty()
        || !input
            .code
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(ApiError::BadRequest(
            "code must be letters, digits, '-' or '_'".into(),
        ));
    }
    if input.name.is_empty() {
        return Err(ApiError::BadRequest("name is required".into()));
    }
    if let Some(url) = &input.update_url {
        if !url.starts_with("https://") && !url.starts_with("http://") {
            return Err(ApiError::BadRequest("update_url must be an http(s) URL".into()));
        }
    }
    Ok(input)
}

pub fn check_rule(input: &LicenseRuleInput) -> ApiResult<()> {
    let bad = |msg: &str| Err(ApiError::BadRequest(msg.to_string()));

    if input.max_concurrent_sessions < 0
        || input.max_devices < 0
        || input.max_days < 0
        || input.grace_period_days < 0
    {
        return bad("limits must not be negative (0 disables a limit)");
    }
    if input.allow_offline_days < -1 {
        return bad("allow_offline_days must be -1 (disabled) or at least 0");
    }
    if !(-720..=840).contains(&input.utc_offset_minutes) {
        return bad("utc_offset_minutes must be between -720 and 840");
    }
    if input
        .allowed_countries
        .iter()
        .any(|c| c.trim().len() != 2 || !c.trim().bytes().all(|b| b.is_ascii_alphabetic()))
    {
        return bad("allowed_countries must be ISO-3166 alpha-2 codes");
    }
    if input.allowed_weekdays.iter().any(|d| !(0..=6).contains(d)) {
        return bad("allowed_weekdays must be 0 (Sunday) to 6 (Saturday)");
    }
    for minute in [input.business_start_minute, input.business_end_minute]
        .into_iter()
        .flatten()
    {
        if !(0..MINUTES_PER_DAY).contains(&minute) {
            return bad("business hours must be minutes of the day (0-1439)");
        }
    }
    Ok(())
}

async fn require_product(state: &AppState, id: i64) -> ApiResult<Product> {
    ProductRepository::new(state.pool.clone())
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product"))
}

pub async fn list_products(State(state): State<AppState>) -> ApiResult<Json<Vec<Product>>> {
    let repo = ProductRepository::new(state.pool.clone());
    Ok(Json(repo.get_all().await?))
}

pub async fn get_product(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> ApiResult<Json<Product>> {
    Ok(Json(require_product(&state, id).await?))
}

pub async fn create_product(
    State(state): State<AppState>,
    Json(input): Json<ProductInput>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    let input = normalize(input)?;
    let repo = ProductRepository::new(state.pool.clone());
    if repo.code_exists(&input.code).await? {
        return Err(ApiError::Conflict(format!("Product code {} is taken", input.code)));
    }

    let product = repo.create(&input).await?;
    tracing::info!(product_id = product.id, code = %product.code, "Product created");
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Json(input): Json<ProductInput>,
) -> ApiResult<Json<Product>> {
    let input = normalize(input)?;
    let current = require_product(&state, id).await?;
    let repo = ProductRepository::new(state.pool.clone());
    if current.code != input.code && repo.code_exists(&input.code).await? {
        return Err(ApiError::Conflict(format!("Product code {} is taken", input.code)));
    }

    repo.update(id, &input)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Product"))
}

pub async fn toggle_product(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> ApiResult<Json<Product>> {
    let product = ProductRepository::new(state.pool.clone())
        .toggle_active(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product"))?;
    tracing::info!(product_id = id, active = product.is_active, "Product toggled");
    Ok(Json(product))
}

pub async fn get_rules(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> ApiResult<Json<LicenseRule>> {
    require_product(&state, id).await?;
    RuleRepository::new(state.pool.clone())
        .get_by_product(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Rule set"))
}

pub async fn put_rules(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Json(input): Json<LicenseRuleInput>,
) -> ApiResult<Json<LicenseRule>> {
    check_rule(&input)?;
    require_product(&state, id).await?;

    let rule = RuleRepository::new(state.pool.clone()).upsert(id, &input).await?;
    tracing::info!(product_id = id, "License rules saved");
    Ok(Json(rule))
}

pub async fn delete_rules(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> ApiResult<Json<Value>> {
    let deleted = RuleRepository::new(state.pool.clone()).delete(id).await?;
    if !deleted {
        return Err(ApiError::not_found("Rule set"));
    }
    tracing::info!(product_id = id, "License rules removed");
    Ok(Json(json!({ "deleted": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule() -> LicenseRuleInput {
        serde_json::from_str("{}").unwrap()
    }

    #[test]
    fn empty_rule_body_uses_permissive_defaults() {
        let input = rule();
        assert_eq!(input.allow_offline_days, -1);
        assert!(input.allow_vm);
        assert!(check_rule(&input).is_ok());
    }

    #[test]
    fn rejects_out_of_range_rules() {
        let mut input = rule();
        input.max_devices = -1;
        assert!(check_rule(&input).is_err());

        let mut input = rule();
        input.allow_offline_days = -2;
        assert!(check_rule(&input).is_err());

        let mut input = rule();
        input.allowed_countries = vec!["USA".into()];
        assert!(check_rule(&input).is_err());

        let mut input = rule();
        input.allowed_weekdays = vec![7];
        assert!(check_rule(&input).is_err());

        let mut input = rule();
        input.business_end_minute = Some(1440);
        assert!(check_rule(&input).is_err());

        let mut input = rule();
        input.utc_offset_minutes = 900;
        assert!(check_rule(&input).is_err());
    }

    #[test]
    fn overnight_window_is_accepted() {
        let mut input = rule();
        input.business_start_minute = Some(22 * 60);
        input.business_end_minute = Some(6 * 60);
        input.allowed_countries = vec!["us".into(), "CA".into()];
        assert!(check_rule(&input).is_ok());
    }

    #[test]
    fn product_codes_are_uppercased() {
        let input = normalize(ProductInput {
            code: " desk-pro ".into(),
            name: "Desk Pro".into(),
            latest_version: Some("".into()),
            update_url: None,
        })
        .unwrap();
        assert_eq!(input.code, "DESK-PRO");
        assert_eq!(input.latest_version, None);

        assert!(
            normalize(ProductInput {
                code: "desk pro".into(),
                name: "Desk Pro".into(),
                latest_version: None,
                update_url: None,
            })
            .is_err()
        );
    }
}
