//! Order endpoints: list, detail, advance, cancel

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use shared::error::{AppError, ErrorCode};
use shared::models::{OrderDetail, StatusChangeRequest};
use shared::order::OrderStatus;

use crate::api::ApiResult;
use crate::auth::OwnerContext;
use crate::orders;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct OrdersQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

/// GET /api/owner/orders?status=&limit=
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerContext>,
    Query(query): Query<OrdersQuery>,
) -> ApiResult<Vec<OrderDetail>> {
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(s) => Some(OrderStatus::from_db(s).ok_or_else(|| {
            AppError::validation(format!("Unknown order status: {s}")).with_detail("field", "status")
        })?),
        None => None,
    };
    let orders = orders::list_orders(state.store.as_ref(), &owner, status, query.limit).await?;
    Ok(Json(orders))
}

/// GET /api/owner/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerContext>,
    Path(order_id): Path<i64>,
) -> ApiResult<OrderDetail> {
    Ok(Json(
        orders::get_order(state.store.as_ref(), &owner, order_id).await?,
    ))
}

/// The status the owner's screen showed; status changes are refused without it
fn expected_status(body: Option<Json<StatusChangeRequest>>) -> Result<OrderStatus, AppError> {
    body.and_then(|Json(req)| req.expected_status).ok_or_else(|| {
        AppError::new(ErrorCode::RequiredField).with_detail("field", "expected_status")
    })
}

/// POST /api/owner/orders/{id}/advance
pub async fn advance_order(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerContext>,
    Path(order_id): Path<i64>,
    body: Option<Json<StatusChangeRequest>>,
) -> ApiResult<OrderDetail> {
    let expected = expected_status(body)?;
    Ok(Json(
        orders::advance(state.store.as_ref(), &owner, order_id, expected).await?,
    ))
}

/// POST /api/owner/orders/{id}/cancel
pub async fn cancel_order(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerContext>,
    Path(order_id): Path<i64>,
    body: Option<Json<StatusChangeRequest>>,
) -> ApiResult<OrderDetail> {
    let expected = expected_status(body)?;
    Ok(Json(
        orders::cancel(state.store.as_ref(), &owner, order_id, expected).await?,
    ))
}
