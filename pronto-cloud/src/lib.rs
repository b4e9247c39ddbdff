//! pronto-cloud: ordering backend for small sellers
//!
//! - Customers browse a business's public menu and place orders
//! - Owners manage the menu and move orders through
//!   `pending → preparing → ready → fulfilled` (or `cancelled`)
//! - Open dashboards receive every committed order change live
//! - New orders are pushed to the owner's registered devices (Web Push)

pub mod account;
pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod live;
pub mod orders;
pub mod push;
pub mod state;
pub mod store;
pub mod util;

pub use config::Config;
pub use state::AppState;
