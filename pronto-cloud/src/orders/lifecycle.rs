//! Status Transition Engine
//!
//! Owner-initiated moves along `pending → preparing → ready → fulfilled`,
//! or to `cancelled` from any non-terminal status. The caller names the
//! status its screen showed and every write is a compare-and-set on that
//! status, so two taps from the same view produce exactly one change.

use shared::error::{AppError, ErrorCode};
use shared::models::OrderDetail;
use shared::order::{OrderStatus, StatusAction};
use shared::util::now_millis;

use crate::auth::OwnerContext;
use crate::error::ServiceResult;
use crate::store::Store;

/// Move the order one step forward
pub async fn advance(
    store: &dyn Store,
    owner: &OwnerContext,
    order_id: i64,
    expected: OrderStatus,
) -> ServiceResult<OrderDetail> {
    change_status(store, owner, order_id, StatusAction::Advance, expected).await
}

/// Cancel the order
pub async fn cancel(
    store: &dyn Store,
    owner: &OwnerContext,
    order_id: i64,
    expected: OrderStatus,
) -> ServiceResult<OrderDetail> {
    change_status(store, owner, order_id, StatusAction::Cancel, expected).await
}

/// Error for an order found in `actual` when the caller assumed `expected`
fn stale_view(actual: OrderStatus, expected: OrderStatus, action: StatusAction) -> AppError {
    if actual.is_terminal() {
        AppError::invalid_transition(actual.as_str(), action.as_str())
    } else {
        AppError::status_conflict(expected.as_str(), actual.as_str())
    }
}

async fn change_status(
    store: &dyn Store,
    owner: &OwnerContext,
    order_id: i64,
    action: StatusAction,
    expected: OrderStatus,
) -> ServiceResult<OrderDetail> {
    let current = store
        .get_order(owner.business_id, order_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::OrderNotFound))?;
    let from = current.order.status;

    if expected != from {
        return Err(stale_view(from, expected, action).into());
    }

    let transition = expected
        .transition(action)
        .map_err(|e| AppError::invalid_transition(e.from.as_str(), e.action.as_str()))?;
    let fulfilled_at = transition.stamps_fulfillment().then(now_millis);

    match store
        .compare_and_set_status(owner.business_id, order_id, transition, fulfilled_at)
        .await?
    {
        Some(updated) => {
            tracing::info!(
                order_id,
                business_id = owner.business_id,
                owner_id = owner.owner_id,
                from = %transition.from,
                to = %transition.to,
                "Order status changed"
            );
            Ok(updated)
        }
        None => {
            // Someone else moved the order between our read and write
            let now = store
                .get_order(owner.business_id, order_id)
                .await?
                .ok_or_else(|| AppError::new(ErrorCode::OrderNotFound))?;
            tracing::debug!(
                order_id,
                expected = %expected,
                now = %now.order.status,
                "Lost status compare-and-set"
            );
            Err(stale_view(now.order.status, expected, action).into())
        }
    }
}
