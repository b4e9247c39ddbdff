//! Product Model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Category label used when none is given
pub const DEFAULT_CATEGORY: &str = "General";

/// Product entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Product {
    pub id: i64,
    pub business_id: i64,
    pub name: String,
    pub description: Option<String>,
    /// Price in currency unit, 2 decimals
    pub price: Decimal,
    pub image_url: Option<String>,
    pub category: String,
    /// Unavailable products are hidden from the public menu
    pub is_available: bool,
    pub sort_order: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Create product payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductCreate {
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub is_available: Option<bool>,
    pub sort_order: Option<i32>,
}

/// Update product payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub is_available: Option<bool>,
    pub sort_order: Option<i32>,
}
