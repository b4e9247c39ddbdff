//! Data models
//!
//! Shared between pronto-cloud and its clients (via API).
//! DB row types use `#[cfg_attr(feature = "db", derive(sqlx::FromRow))]`.
//! All IDs are `i64` snowflakes (Postgres BIGINT), timestamps are epoch millis.

pub mod business;
pub mod order;
pub mod product;
pub mod push_subscription;

// Re-exports
pub use business::*;
pub use order::*;
pub use product::*;
pub use push_subscription::*;
