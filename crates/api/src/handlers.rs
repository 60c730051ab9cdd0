pub mod auth;
pub mod health;
pub mod sessions;

// Re-export common types
pub use auth::ErrorResponse;
