//! Account endpoints: signup, login, business profile

use axum::{Extension, Json, extract::State};
use shared::models::{Business, BusinessUpdate};

use crate::account::{self, AuthResponse, LoginRequest, SignupRequest};
use crate::api::ApiResult;
use crate::auth::OwnerContext;
use crate::state::AppState;

/// POST /api/owner/signup
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> ApiResult<AuthResponse> {
    let created = account::signup(state.store.as_ref(), &state.jwt_secret, req).await?;
    Ok(Json(created))
}

/// POST /api/owner/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<AuthResponse> {
    let session = account::login(state.store.as_ref(), &state.jwt_secret, req).await?;
    Ok(Json(session))
}

/// GET /api/owner/business
pub async fn get_business(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerContext>,
) -> ApiResult<Business> {
    Ok(Json(account::get_business(state.store.as_ref(), &owner).await?))
}

/// PUT /api/owner/business
pub async fn update_business(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerContext>,
    Json(update): Json<BusinessUpdate>,
) -> ApiResult<Business> {
    Ok(Json(
        account::update_business(state.store.as_ref(), &owner, update).await?,
    ))
}
