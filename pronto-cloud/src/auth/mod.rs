//! Owner authentication and abuse protection

pub mod owner_auth;
pub mod rate_limit;

pub use owner_auth::OwnerContext;
