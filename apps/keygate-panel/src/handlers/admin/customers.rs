use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use keygate_db::models::customer::{Customer, CustomerInput};
use keygate_db::repositories::customer_repo::CustomerRepository;

use crate::AppState;
use crate::error::{ApiError, ApiResult};

fn normalize(mut input: CustomerInput) -> ApiResult<CustomerInput> {
    input.name = input.name.trim().to_string();
    input.email = input.email.trim().to_lowercase();
    input.company = input
        .company
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    if input.name.is_empty() {
        return Err(ApiError::BadRequest("name is required".into()));
    }
    let valid_email = input
        .email
        .split_once('@')
        .is_some_and(|(user, domain)| !user.is_empty() && domain.contains('.'));
    if !valid_email {
        return Err(ApiError::BadRequest("email is invalid".into()));
    }
    Ok(input)
}

pub async fn list_customers(State(state): State<AppState>) -> ApiResult<Json<Vec<Customer>>> {
    let repo = CustomerRepository::new(state.pool.clone());
    Ok(Json(repo.get_all().await?))
}

pub async fn get_customer(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> ApiResult<Json<Customer>> {
    let repo = CustomerRepository::new(state.pool.clone());
    repo.get_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Customer"))
}

pub async fn create_customer(
    State(state): State<AppState>,
    Json(input): Json<CustomerInput>,
) -> ApiResult<(StatusCode, Json<Customer>)> {
    let input = normalize(input)?;
    let repo = CustomerRepository::new(state.pool.clone());
    if repo.email_exists(&input.email).await? {
        return Err(ApiError::Conflict("A customer with this email already exists".into()));
    }

    let customer = repo.create(&input).await?;
    tracing::info!(customer_id = customer.id, "Customer created");
    Ok((StatusCode::CREATED, Json(customer)))
}

pub async fn update_customer(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Json(input): Json<CustomerInput>,
) -> ApiResult<Json<Customer>> {
    let input = normalize(input)?;
    let repo = CustomerRepository::new(state.pool.clone());
    let current = repo
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Customer"))?;
    if current.email != input.email && repo.email_exists(&input.email).await? {
        return Err(ApiError::Conflict("A customer with this email already exists".into()));
    }

    repo.update(id, &input)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Customer"))
}

/// Disabling a customer blocks validation of all their licenses.
pub async fn toggle_customer(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> ApiResult<Json<Customer>> {
    let repo = CustomerRepository::new(state.pool.clone());
    let customer = repo
        .toggle_active(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Customer"))?;
    tracing::info!(customer_id = id, active = customer.is_active, "Customer toggled");
    Ok(Json(customer))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str, email: &str) -> CustomerInput {
        CustomerInput {
            name: name.into(),
            email: email.into(),
            company: Some("  ".into()),
        }
    }

    #[test]
    fn normalizes_and_validates() {
        let ok = normalize(input(" Acme Ops ", " Ops@Acme.COM ")).unwrap();
        assert_eq!(ok.name, "Acme Ops");
        assert_eq!(ok.email, "ops@acme.com");
        assert_eq!(ok.company, None);

        assert!(normalize(input("", "ops@acme.com")).is_err());
        assert!(normalize(input("Acme", "ops-at-acme")).is_err());
        assert!(normalize(input("Acme", "@acme.com")).is_err());
    }
}
