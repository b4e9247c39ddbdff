//! Owner management API endpoints, split into sub-modules by domain

pub mod account;
pub mod order;
pub mod product;
pub mod push;
