//! Push transport abstraction
//!
//! ```text
//!        ┌──────────────────────┐
//!        │ PushTransport trait  │  ◄── PushDispatcher
//!        └──────────┬───────────┘
//!           ┌───────┴────────┐
//!           ▼                ▼
//!   WebPushTransport    NoopTransport
//!  (RFC 8291 + VAPID)   (push disabled)
//! ```

use async_trait::async_trait;
use shared::models::PushSubscription;
use thiserror::Error;

/// Failed delivery to one endpoint
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Worth retrying later (rate limited, push service down, network)
    #[error("transient delivery failure: {0}")]
    Transient(String),

    /// The endpoint will never accept this message (expired, unsubscribed, bad keys)
    #[error("permanent delivery failure: {0}")]
    Permanent(String),
}

impl DeliveryError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }
}

/// Delivers one encrypted push message to one device
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(&self, subscription: &PushSubscription, payload: &[u8])
    -> Result<(), DeliveryError>;
}

/// Transport used when no VAPID identity is configured: accepts and drops
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTransport;

#[async_trait]
impl PushTransport for NoopTransport {
    async fn send(
        &self,
        subscription: &PushSubscription,
        _payload: &[u8],
    ) -> Result<(), DeliveryError> {
        tracing::debug!(
            subscription_id = subscription.id,
            "Push delivery disabled, dropping message"
        );
        Ok(())
    }
}
