//! Customer-facing endpoints: menu and order placement

use axum::{
    Json,
    extract::{Path, State},
};
use shared::models::{Menu, PlaceOrderRequest, PlaceOrderResponse};

use crate::api::ApiResult;
use crate::catalog;
use crate::orders;
use crate::state::AppState;

/// GET /api/public/{slug}
pub async fn menu(State(state): State<AppState>, Path(slug): Path<String>) -> ApiResult<Menu> {
    Ok(Json(catalog::menu(state.store.as_ref(), &slug).await?))
}

/// POST /api/public/{slug}/orders
pub async fn place_order(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(req): Json<PlaceOrderRequest>,
) -> ApiResult<PlaceOrderResponse> {
    let detail =
        orders::place_order_by_slug(state.store.as_ref(), &state.push, &slug, req).await?;
    Ok(Json(PlaceOrderResponse::from(&detail)))
}
