//! Owner dashboard live protocol
//!
//! - ws: wire messages between pronto-cloud and an open dashboard session
//! - view: client-side order board that applies those messages idempotently

pub mod view;
pub mod ws;

pub use view::DashboardView;
pub use ws::*;
