//! Push Dispatcher: new-order notifications to owners' devices
//!
//! ```text
//! Order Intake ──try_enqueue──► PushQueue (bounded mpsc)
//!                                    │
//!                                    ▼
//!                            dispatcher worker
//!                 list subscriptions(business) ─► send to each (concurrently)
//!                                    │
//!                 Permanent failure ─┴─► delete that registration (unless re-registered)
//! ```
//!
//! Intake never waits on delivery: a full queue drops the notice, and
//! delivery failures are logged here and never reach the order flow.

pub mod registry;
pub mod transport;
pub mod web_push;

pub use transport::{DeliveryError, NoopTransport, PushTransport};
pub use web_push::{VapidKeys, WebPushTransport};

use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use shared::models::{OrderDetail, PushSubscription};
use shared::order::format_money;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::store::Store;

/// Minimal summary of a freshly committed order
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderNotice {
    pub business_id: i64,
    pub order_id: i64,
    pub customer_name: String,
    pub total: Decimal,
}

impl From<&OrderDetail> for NewOrderNotice {
    fn from(detail: &OrderDetail) -> Self {
        Self {
            business_id: detail.order.business_id,
            order_id: detail.order.id,
            customer_name: detail.order.customer_name.clone(),
            total: detail.order.total,
        }
    }
}

/// JSON shown by the dashboard's service worker
#[derive(Debug, Serialize)]
struct PushPayload<'a> {
    title: &'a str,
    body: String,
    order_id: i64,
    business_id: i64,
    url: &'a str,
}

impl NewOrderNotice {
    pub fn payload(&self) -> Vec<u8> {
        let payload = PushPayload {
            title: "New order",
            body: format!("{} · {}", self.customer_name, format_money(self.total)),
            order_id: self.order_id,
            business_id: self.business_id,
            url: "/dashboard",
        };
        serde_json::to_vec(&payload).unwrap_or_default()
    }
}

/// Producer side of the dispatch queue
#[derive(Clone)]
pub struct PushQueue {
    tx: mpsc::Sender<NewOrderNotice>,
}

impl PushQueue {
    /// Hand a notice to the dispatcher without waiting. Returns `false` if it was dropped.
    pub fn try_enqueue(&self, notice: NewOrderNotice) -> bool {
        match self.tx.try_send(notice) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(notice)) => {
                tracing::warn!(
                    order_id = notice.order_id,
                    business_id = notice.business_id,
                    "Push queue full, dropping new-order notification"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(notice)) => {
                tracing::error!(
                    order_id = notice.order_id,
                    "Push dispatcher stopped, dropping new-order notification"
                );
                false
            }
        }
    }
}

/// Outcome of one notice fan-out
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub transient_failures: usize,
    pub removed: usize,
}

pub struct PushDispatcher {
    store: Arc<dyn Store>,
    transport: Arc<dyn PushTransport>,
}

impl PushDispatcher {
    pub fn new(store: Arc<dyn Store>, transport: Arc<dyn PushTransport>) -> Self {
        Self { store, transport }
    }

    /// Start the worker; it runs until every `PushQueue` clone is dropped
    pub fn spawn(self, capacity: usize) -> (PushQueue, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(self.run(rx));
        (PushQueue { tx }, handle)
    }

    async fn run(self, mut rx: mpsc::Receiver<NewOrderNotice>) {
        while let Some(notice) = rx.recv().await {
            let report = self.deliver(&notice).await;
            tracing::debug!(
                order_id = notice.order_id,
                business_id = notice.business_id,
                delivered = report.delivered,
                transient_failures = report.transient_failures,
                removed = report.removed,
                "New-order notification dispatched"
            );
        }
        tracing::info!("Push dispatcher stopped");
    }

    /// Send `notice` to every device of its business, independently per device
    pub async fn deliver(&self, notice: &NewOrderNotice) -> DeliveryReport {
        let subscriptions = match self.store.list_push_subscriptions(notice.business_id).await {
            Ok(subs) => subs,
            Err(e) => {
                tracing::error!(
                    business_id = notice.business_id,
                    error = %e,
                    "Failed to load push subscriptions"
                );
                return DeliveryReport::default();
            }
        };
        if subscriptions.is_empty() {
            return DeliveryReport::default();
        }

        let payload = notice.payload();
        let results = join_all(
            subscriptions
                .iter()
                .map(|sub| self.transport.send(sub, &payload)),
        )
        .await;

        let mut report = DeliveryReport::default();
        for (sub, result) in subscriptions.iter().zip(results) {
            match result {
                Ok(()) => report.delivered += 1,
                Err(DeliveryError::Transient(reason)) => {
                    report.transient_failures += 1;
                    tracing::warn!(
                        subscription_id = sub.id,
                        business_id = sub.business_id,
                        reason = %reason,
                        "Push delivery failed, will not retry"
                    );
                }
                Err(DeliveryError::Permanent(reason)) => {
                    if self.remove_stale(sub, &reason).await {
                        report.removed += 1;
                    }
                }
            }
        }
        report
    }

    async fn remove_stale(&self, sub: &PushSubscription, reason: &str) -> bool {
        match self.store.delete_push_subscription(sub).await {
            Ok(true) => {
                tracing::info!(
                    subscription_id = sub.id,
                    business_id = sub.business_id,
                    reason = %reason,
                    "Removed stale push subscription"
                );
                true
            }
            Ok(false) => {
                tracing::debug!(
                    subscription_id = sub.id,
                    reason = %reason,
                    "Push subscription changed since delivery, keeping it"
                );
                false
            }
            Err(e) => {
                tracing::error!(subscription_id = sub.id, error = %e, "Failed to remove stale push subscription");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Owner};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use shared::models::Business;

    /// Fails by endpoint suffix, records everything else
    #[derive(Default)]
    struct ScriptedTransport {
        sent: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl PushTransport for ScriptedTransport {
        async fn send(
            &self,
            subscription: &PushSubscription,
            payload: &[u8],
        ) -> Result<(), DeliveryError> {
            if subscription.endpoint.ends_with("gone") {
                return Err(DeliveryError::Permanent("410 Gone".into()));
            }
            if subscription.endpoint.ends_with("busy") {
                return Err(DeliveryError::Transient("503".into()));
            }
            self.sent
                .lock()
                .push((subscription.endpoint.clone(), payload.to_vec()));
            Ok(())
        }
    }

    async fn store_with_subscriptions(endpoints: &[&str]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .create_owner(
                &Owner {
                    id: 10,
                    email: "owner@example.com".into(),
                    hashed_password: "x".into(),
                    created_at: 0,
                },
                &Business {
                    id: 1,
                    owner_id: 10,
                    name: "Cafe".into(),
                    description: None,
                    logo_url: None,
                    slug: "cafe".into(),
                    accent_color: "#f97316".into(),
                    created_at: 0,
                },
            )
            .await
            .unwrap();
        for (i, endpoint) in endpoints.iter().enumerate() {
            store
                .upsert_push_subscription(&PushSubscription {
                    id: i as i64 + 1,
                    business_id: 1,
                    endpoint: endpoint.to_string(),
                    p256dh: "k".into(),
                    auth: "a".into(),
                    created_at: 0,
                    updated_at: 0,
                })
                .await
                .unwrap();
        }
        store
    }

    fn notice() -> NewOrderNotice {
        NewOrderNotice {
            business_id: 1,
            order_id: 99,
            customer_name: "Jamie".into(),
            total: Decimal::new(1200, 2),
        }
    }

    #[tokio::test]
    async fn one_failing_endpoint_does_not_block_others() {
        let store = store_with_subscriptions(&[
            "https://push.example.net/a",
            "https://push.example.net/gone",
            "https://push.example.net/busy",
            "https://push.example.net/b",
        ])
        .await;
        let transport = Arc::new(ScriptedTransport::default());
        let dispatcher = PushDispatcher::new(store.clone(), transport.clone());

        let report = dispatcher.deliver(&notice()).await;
        assert_eq!(
            report,
            DeliveryReport {
                delivered: 2,
                transient_failures: 1,
                removed: 1,
            }
        );

        // Stale endpoint removed, transient one kept
        let remaining: Vec<String> = store
            .list_push_subscriptions(1)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.endpoint)
            .collect();
        assert_eq!(remaining.len(), 3);
        assert!(!remaining.iter().any(|e| e.ends_with("gone")));
    }

    /// Re-registers the device with new keys while its old registration is in flight
    struct ReRegisteringTransport {
        store: Arc<MemoryStore>,
    }

    #[async_trait]
    impl PushTransport for ReRegisteringTransport {
        async fn send(
            &self,
            subscription: &PushSubscription,
            _payload: &[u8],
        ) -> Result<(), DeliveryError> {
            self.store
                .upsert_push_subscription(&PushSubscription {
                    p256dh: "rotated".into(),
                    updated_at: 1,
                    ..subscription.clone()
                })
                .await
                .unwrap();
            Err(DeliveryError::Permanent("410 Gone".into()))
        }
    }

    #[tokio::test]
    async fn stale_failure_keeps_a_fresh_registration() {
        let store = store_with_subscriptions(&["https://push.example.net/phone"]).await;
        let transport = Arc::new(ReRegisteringTransport {
            store: store.clone(),
        });
        let report = PushDispatcher::new(store.clone(), transport)
            .deliver(&notice())
            .await;
        assert_eq!(report.removed, 0);

        let subs = store.list_push_subscriptions(1).await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].p256dh, "rotated");
    }

    #[tokio::test]
    async fn payload_carries_order_summary() {
        let store = store_with_subscriptions(&["https://push.example.net/a"]).await;
        let transport = Arc::new(ScriptedTransport::default());
        PushDispatcher::new(store, transport.clone())
            .deliver(&notice())
            .await;

        let sent = transport.sent.lock();
        let json: serde_json::Value = serde_json::from_slice(&sent[0].1).unwrap();
        assert_eq!(json["title"], "New order");
        assert_eq!(json["body"], "Jamie · 12.00");
        assert_eq!(json["order_id"], 99);
        assert_eq!(json["business_id"], 1);
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let (tx, _rx) = mpsc::channel(1);
        let queue = PushQueue { tx };
        assert!(queue.try_enqueue(notice()));
        assert!(!queue.try_enqueue(notice()));
    }

    #[tokio::test]
    async fn worker_drains_queue() {
        let store = store_with_subscriptions(&["https://push.example.net/a"]).await;
        let transport = Arc::new(ScriptedTransport::default());
        let (queue, handle) = PushDispatcher::new(store, transport.clone()).spawn(8);

        assert!(queue.try_enqueue(notice()));
        drop(queue);
        handle.await.unwrap();

        assert_eq!(transport.sent.lock().len(), 1);
    }
}
