pub mod auth;

pub use auth::{require_service_key, ServiceKey};
