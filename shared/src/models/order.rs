//! Order Model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::order::OrderStatus;

/// Order entity (one customer transaction against one business)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: i64,
    pub business_id: i64,
    pub customer_name: String,
    pub customer_note: Option<String>,
    pub status: OrderStatus,
    /// Σ(price × quantity) at creation, never recomputed
    pub total: Decimal,
    pub created_at: i64,
    /// Set only on the transition into `fulfilled`
    pub fulfilled_at: Option<i64>,
}

/// Order line item: a snapshot of one product at order time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    /// Null once the product has been deleted
    pub product_id: Option<i64>,
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
}

/// Order with its line items
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

impl OrderDetail {
    pub fn id(&self) -> i64 {
        self.order.id
    }

    pub fn business_id(&self) -> i64 {
        self.order.business_id
    }
}

/// One cart entry submitted by a customer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CartLine {
    pub product_id: i64,
    pub quantity: i32,
}

/// Customer order placement payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    pub customer_name: String,
    #[serde(default, alias = "note")]
    pub customer_note: Option<String>,
    pub items: Vec<CartLine>,
}

/// Confirmation returned to the customer (customers never read orders back)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaceOrderResponse {
    pub order_id: i64,
    pub status: OrderStatus,
    pub total: Decimal,
}

impl From<&OrderDetail> for PlaceOrderResponse {
    fn from(detail: &OrderDetail) -> Self {
        Self {
            order_id: detail.order.id,
            status: detail.order.status,
            total: detail.order.total,
        }
    }
}

/// Owner status-change payload
///
/// `expected_status` is the status the owner's screen showed; it guards the
/// update so a double-tap cannot skip a state. The server rejects a change
/// without it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusChangeRequest {
    #[serde(default)]
    pub expected_status: Option<OrderStatus>,
}
