//! Push Subscription Model

use serde::{Deserialize, Serialize};

/// A device endpoint registered to receive new-order notifications
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct PushSubscription {
    pub id: i64,
    pub business_id: i64,
    /// Push service URL, globally unique
    pub endpoint: String,
    /// Client P-256 public key (base64url, uncompressed point)
    pub p256dh: String,
    /// Client auth secret (base64url, 16 bytes)
    pub auth: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Key pair as delivered by the browser's `PushSubscription.toJSON()`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushSubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// Register (upsert) payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterPushSubscription {
    pub endpoint: String,
    pub keys: PushSubscriptionKeys,
}
