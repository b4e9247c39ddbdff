//! Shared types for Pronto
//!
//! Domain types used by pronto-cloud and any Rust client of its API:
//! error codes and response envelopes, models, the order status lifecycle,
//! money arithmetic, and the dashboard live protocol.

pub mod dashboard;
pub mod error;
pub mod models;
pub mod order;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};
