//! Push subscription endpoints

use axum::{Extension, Json, extract::State};
use shared::error::{AppError, ErrorCode};
use shared::models::{PushSubscription, RegisterPushSubscription};

use crate::api::ApiResult;
use crate::auth::OwnerContext;
use crate::push::registry;
use crate::state::AppState;

/// GET /api/owner/push/vapid-key
pub async fn vapid_key(State(state): State<AppState>) -> ApiResult<serde_json::Value> {
    let key = state
        .vapid_public_key
        .as_deref()
        .ok_or_else(|| AppError::new(ErrorCode::PushUnavailable))?;
    Ok(Json(serde_json::json!({ "public_key": key })))
}

/// GET /api/owner/push/subscriptions
pub async fn list_subscriptions(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerContext>,
) -> ApiResult<Vec<PushSubscription>> {
    Ok(Json(
        registry::list(state.store.as_ref(), owner.business_id).await?,
    ))
}

/// POST /api/owner/push/subscriptions
pub async fn register_subscription(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerContext>,
    Json(req): Json<RegisterPushSubscription>,
) -> ApiResult<PushSubscription> {
    Ok(Json(
        registry::register(state.store.as_ref(), owner.business_id, req).await?,
    ))
}
