//! Owner JWT authentication for the management API

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};

use crate::state::AppState;

/// JWT claims for owner authentication
#[derive(Debug, Serialize, Deserialize)]
pub struct OwnerClaims {
    /// Owner ID
    pub sub: i64,
    /// Owner email
    pub email: String,
    /// Expiration (Unix timestamp seconds)
    pub exp: usize,
    /// Issued at (Unix timestamp seconds)
    pub iat: usize,
}

/// Authenticated owner, resolved to the business they operate.
///
/// Inserted into request extensions by [`owner_auth_middleware`] and passed
/// explicitly into every owner-side operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerContext {
    pub owner_id: i64,
    pub business_id: i64,
}

const JWT_EXPIRY_HOURS: i64 = 24;

/// Create a JWT token for an owner
pub fn create_token(
    owner_id: i64,
    email: &str,
    secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now();
    let claims = OwnerClaims {
        sub: owner_id,
        email: email.to_string(),
        exp: (now + chrono::Duration::hours(JWT_EXPIRY_HOURS)).timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Verify a token and return its claims
pub fn verify_token(
    token: &str,
    secret: &str,
) -> Result<OwnerClaims, jsonwebtoken::errors::Error> {
    jsonwebtoken::decode::<OwnerClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

/// Map a token verification failure onto the client-facing error
pub fn token_error(e: &jsonwebtoken::errors::Error) -> AppError {
    match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::new(ErrorCode::TokenExpired),
        _ => AppError::new(ErrorCode::TokenInvalid),
    }
}

/// Resolve a bearer token to an [`OwnerContext`]
pub async fn resolve_owner(state: &AppState, token: &str) -> Result<OwnerContext, AppError> {
    let claims = verify_token(token, &state.jwt_secret).map_err(|e| {
        tracing::debug!("JWT validation failed: {e}");
        token_error(&e)
    })?;

    let business = state
        .store
        .business_by_owner(claims.sub)
        .await
        .map_err(|e| {
            tracing::error!(owner_id = claims.sub, error = %e, "Business lookup failed");
            AppError::new(ErrorCode::DatabaseError)
        })?
        .ok_or_else(|| AppError::new(ErrorCode::BusinessNotFound))?;

    Ok(OwnerContext {
        owner_id: claims.sub,
        business_id: business.id,
    })
}

/// Middleware that verifies the owner JWT from the Authorization header
pub async fn owner_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::not_authenticated().into_response())?;

    let owner = resolve_owner(&state, token)
        .await
        .map_err(IntoResponse::into_response)?;

    request.extensions_mut().insert(owner);

    Ok(next.run(request).await)
}
