// Community Store - users, posts, comments, likes and follows over SQLite

// Configuration and errors
pub mod config;
pub mod error;

// Documents, join records and request payloads
pub mod models;

// Persistence - database interface and SQLite implementation
pub mod infrastructure;

// Relationship store and counter reconciliation
pub mod services;

// HTTP surface
pub mod app_state;
pub mod http_interface;

// Demo data
pub mod data_seeder;

// Re-exports for convenience
pub use error::{AppError, AppResult};
pub use services::{CounterReconciler, RelationshipStore};
