pub mod geo_service;
pub mod license_service;
pub mod rate_limit_service;
pub mod validation_service;
pub mod validation_store;

#[cfg(test)]
pub(crate) mod testing;
