pub mod activation;
pub mod customer;
pub mod license;
pub mod product;
pub mod rule;
pub mod security_event;
