//! Orders: intake from customers, status changes by owners, owner reads

pub mod intake;
pub mod lifecycle;

pub use intake::{place_order, place_order_by_slug};
pub use lifecycle::{advance, cancel};

use shared::error::{AppError, ErrorCode};
use shared::models::OrderDetail;
use shared::order::OrderStatus;

use crate::auth::OwnerContext;
use crate::error::ServiceResult;
use crate::store::Store;

pub const DEFAULT_LIST_LIMIT: i64 = 100;
pub const MAX_LIST_LIMIT: i64 = 500;

/// Newest-first orders of the owner's business
pub async fn list_orders(
    store: &dyn Store,
    owner: &OwnerContext,
    status: Option<OrderStatus>,
    limit: Option<i64>,
) -> ServiceResult<Vec<OrderDetail>> {
    let limit = limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    Ok(store.list_orders(owner.business_id, status, limit).await?)
}

/// One order of the owner's business
pub async fn get_order(
    store: &dyn Store,
    owner: &OwnerContext,
    order_id: i64,
) -> ServiceResult<OrderDetail> {
    store
        .get_order(owner.business_id, order_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::OrderNotFound).into())
}
