pub mod activation_repo;
pub mod customer_repo;
pub mod license_repo;
pub mod product_repo;
pub mod rule_repo;
pub mod security_event_repo;
