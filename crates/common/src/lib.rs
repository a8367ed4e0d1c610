//! Foodgram Common Library
//!
//! Shared code for the Foodgram services including:
//! - Database models and repository patterns
//! - Shopping list aggregation
//! - Error types and handling
//! - Configuration management
//! - Authentication utilities
//! - Metrics

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod shopping_list;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use errors::{AppError, Result};
pub use shopping_list::{ShoppingCartSource, ShoppingList};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Minimum cooking time in minutes
pub const MIN_COOKING_TIME: i32 = 1;

/// Ingredient amounts are stored as NUMERIC(12, 3): at most three
/// fractional digits and strictly less than `MAX_AMOUNT`.
pub const MAX_AMOUNT_SCALE: u32 = 3;
pub const MAX_AMOUNT: i64 = 1_000_000_000;
