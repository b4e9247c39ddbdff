//! Subscription Registry: which devices belong to which business

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use shared::error::{AppError, ErrorCode};
use shared::models::{PushSubscription, RegisterPushSubscription};
use shared::util::{now_millis, snowflake_id};

use crate::error::ServiceResult;
use crate::store::Store;

const P256DH_LEN: usize = 65;
const AUTH_LEN: usize = 16;
const MAX_ENDPOINT_LEN: usize = 2048;

/// Decode base64url, tolerating `=` padding
pub(crate) fn decode_b64url(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(value.trim().trim_end_matches('='))
}

fn validate_endpoint(endpoint: &str) -> Result<String, AppError> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() || endpoint.len() > MAX_ENDPOINT_LEN {
        return Err(AppError::new(ErrorCode::PushEndpointInvalid).with_detail("field", "endpoint"));
    }
    let url = reqwest::Url::parse(endpoint).map_err(|e| {
        AppError::with_message(
            ErrorCode::PushEndpointInvalid,
            format!("Push endpoint is not a URL: {e}"),
        )
    })?;
    if !matches!(url.scheme(), "https" | "http") || url.host_str().is_none() {
        return Err(AppError::with_message(
            ErrorCode::PushEndpointInvalid,
            "Push endpoint must be an http(s) URL",
        ));
    }
    Ok(endpoint.to_string())
}

fn validate_key(field: &'static str, value: &str, expected_len: usize) -> Result<String, AppError> {
    let invalid = || {
        AppError::with_message(
            ErrorCode::PushKeysInvalid,
            format!("{field} must be {expected_len} bytes of base64url"),
        )
        .with_detail("field", field)
    };
    let bytes = decode_b64url(value).map_err(|_| invalid())?;
    if bytes.len() != expected_len {
        return Err(invalid());
    }
    // Store in canonical unpadded form
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Register a device for `business_id`.
///
/// Keyed by endpoint: a known endpoint is moved to this business and its keys
/// replaced, so the same device never produces two records.
pub async fn register(
    store: &dyn Store,
    business_id: i64,
    request: RegisterPushSubscription,
) -> ServiceResult<PushSubscription> {
    let endpoint = validate_endpoint(&request.endpoint)?;
    let p256dh = validate_key("p256dh", &request.keys.p256dh, P256DH_LEN)?;
    let auth = validate_key("auth", &request.keys.auth, AUTH_LEN)?;

    let now = now_millis();
    let stored = store
        .upsert_push_subscription(&PushSubscription {
            id: snowflake_id(),
            business_id,
            endpoint,
            p256dh,
            auth,
            created_at: now,
            updated_at: now,
        })
        .await?;

    tracing::info!(
        business_id,
        subscription_id = stored.id,
        "Push subscription registered"
    );
    Ok(stored)
}

/// All current subscriptions of `business_id`
pub async fn list(store: &dyn Store, business_id: i64) -> ServiceResult<Vec<PushSubscription>> {
    Ok(store.list_push_subscriptions(business_id).await?)
}
