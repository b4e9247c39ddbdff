//! Menu management endpoints

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use shared::models::{Product, ProductCreate, ProductUpdate};

use crate::api::ApiResult;
use crate::auth::OwnerContext;
use crate::catalog;
use crate::state::AppState;

/// GET /api/owner/products
pub async fn list_products(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerContext>,
) -> ApiResult<Vec<Product>> {
    Ok(Json(
        catalog::list_products(state.store.as_ref(), &owner).await?,
    ))
}

/// POST /api/owner/products
pub async fn create_product(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerContext>,
    Json(data): Json<ProductCreate>,
) -> ApiResult<Product> {
    Ok(Json(
        catalog::create_product(state.store.as_ref(), &owner, data).await?,
    ))
}

/// PUT /api/owner/products/{id}
pub async fn update_product(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerContext>,
    Path(product_id): Path<i64>,
    Json(data): Json<ProductUpdate>,
) -> ApiResult<Product> {
    Ok(Json(
        catalog::update_product(state.store.as_ref(), &owner, product_id, data).await?,
    ))
}

/// DELETE /api/owner/products/{id}
pub async fn delete_product(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerContext>,
    Path(product_id): Path<i64>,
) -> ApiResult<serde_json::Value> {
    catalog::delete_product(state.store.as_ref(), &owner, product_id).await?;
    Ok(Json(serde_json::json!({ "deleted": product_id })))
}
