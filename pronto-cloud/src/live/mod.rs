//! LiveOrderHub: order change fan-out to open dashboards
//!
//! All data is strictly isolated per business.
//!
//! ```text
//! Store::changes() (commit order)
//!       │ StoreChange
//!       ▼
//! change pump ──► LiveOrderHub
//!                   └── businesses: business_id → broadcast::Sender<OrderEvent>
//!                             │
//!                             ▼
//!                   Dashboard WS handlers (one receiver each)
//! ```
//!
//! When the pump cannot vouch for the stream (it lagged behind the store
//! feed, or the feed reported a gap) it drops every business channel.
//! Each session then sees its receiver close and reloads the full list.

use dashmap::DashMap;
use shared::dashboard::OrderEvent;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::store::{Store, StoreChange};

/// Per-business broadcast capacity, enough to absorb a connect-time burst
const BROADCAST_CAPACITY: usize = 256;

/// Process-wide hub, one channel per business
#[derive(Clone, Default)]
pub struct LiveOrderHub {
    businesses: Arc<DashMap<i64, broadcast::Sender<OrderEvent>>>,
}

impl LiveOrderHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one business's events
    pub fn subscribe(&self, business_id: i64) -> broadcast::Receiver<OrderEvent> {
        self.businesses
            .entry(business_id)
            .or_insert_with(|| broadcast::channel(BROADCAST_CAPACITY).0)
            .subscribe()
    }

    /// Route an event to the channel of the business that owns the order.
    /// Returns the number of sessions it reached.
    pub fn publish(&self, event: OrderEvent) -> usize {
        let business_id = event.business_id();
        let Some(tx) = self.businesses.get(&business_id) else {
            return 0;
        };
        match tx.send(event) {
            Ok(n) => n,
            Err(_) => {
                // Last dashboard of this business went away
                drop(tx);
                self.businesses
                    .remove_if(&business_id, |_, tx| tx.receiver_count() == 0);
                0
            }
        }
    }

    /// Close every business channel so all open sessions reload
    pub fn resync_all(&self) {
        self.businesses.clear();
    }

    /// Open dashboard sessions for a business
    pub fn subscriber_count(&self, business_id: i64) -> usize {
        self.businesses
            .get(&business_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

/// Forward every committed order change from the store into the hub
pub fn spawn_change_pump(store: &dyn Store, hub: LiveOrderHub) -> JoinHandle<()> {
    tokio::spawn(pump_changes(store.changes(), hub))
}

async fn pump_changes(mut changes: broadcast::Receiver<StoreChange>, hub: LiveOrderHub) {
    loop {
        match changes.recv().await {
            Ok(StoreChange::Order(event)) => {
                let reached = hub.publish(event);
                tracing::trace!(reached, "Order change published");
            }
            Ok(StoreChange::Gap) => {
                tracing::warn!("Store change feed reported a gap, resyncing dashboards");
                hub.resync_all();
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "Change pump lagged behind the store feed, resyncing dashboards");
                hub.resync_all();
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::info!("Store change feed closed, change pump stopping");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use shared::models::{Order, OrderDetail};
    use shared::order::OrderStatus;

    fn event(business_id: i64, order_id: i64) -> OrderEvent {
        OrderEvent::inserted(OrderDetail {
            order: Order {
                id: order_id,
                business_id,
                customer_name: "Jamie".into(),
                customer_note: None,
                status: OrderStatus::Pending,
                total: Decimal::ZERO,
                created_at: 0,
                fulfilled_at: None,
            },
            items: vec![],
        })
    }

    #[tokio::test]
    async fn business_isolation() {
        let hub = LiveOrderHub::new();
        let mut a = hub.subscribe(1);
        let mut b = hub.subscribe(2);

        assert_eq!(hub.publish(event(1, 100)), 1);
        assert_eq!(hub.publish(event(2, 200)), 1);

        assert_eq!(a.recv().await.unwrap().order.id(), 100);
        assert_eq!(b.recv().await.unwrap().order.id(), 200);
        assert!(a.try_recv().is_err());
        assert!(b.try_recv().is_err());
    }

    #[tokio::test]
    async fn fan_out_to_every_session_of_a_business() {
        let hub = LiveOrderHub::new();
        let mut first = hub.subscribe(1);
        let mut second = hub.subscribe(1);
        assert_eq!(hub.subscriber_count(1), 2);

        assert_eq!(hub.publish(event(1, 7)), 2);
        assert_eq!(first.recv().await.unwrap().order.id(), 7);
        assert_eq!(second.recv().await.unwrap().order.id(), 7);
    }

    #[test]
    fn publish_without_sessions_is_dropped() {
        let hub = LiveOrderHub::new();
        assert_eq!(hub.publish(event(3, 1)), 0);
        assert_eq!(hub.subscriber_count(3), 0);
    }

    #[test]
    fn channel_removed_after_last_session_leaves() {
        let hub = LiveOrderHub::new();
        let rx = hub.subscribe(4);
        drop(rx);
        assert_eq!(hub.publish(event(4, 1)), 0);
        assert!(hub.businesses.get(&4).is_none());
    }

    #[tokio::test]
    async fn events_for_one_order_keep_publish_order() {
        let hub = LiveOrderHub::new();
        let mut rx = hub.subscribe(1);
        let mut updated = event(1, 9);
        hub.publish(updated.clone());
        updated.order.order.status = OrderStatus::Preparing;
        hub.publish(OrderEvent::updated(updated.order.clone()));

        assert_eq!(rx.recv().await.unwrap().order.order.status, OrderStatus::Pending);
        assert_eq!(
            rx.recv().await.unwrap().order.order.status,
            OrderStatus::Preparing
        );
    }

    #[tokio::test]
    async fn resync_closes_every_session() {
        let hub = LiveOrderHub::new();
        let mut a = hub.subscribe(1);
        let mut b = hub.subscribe(2);
        hub.resync_all();

        assert!(matches!(a.recv().await, Err(broadcast::error::RecvError::Closed)));
        assert!(matches!(b.recv().await, Err(broadcast::error::RecvError::Closed)));

        // A fresh subscription works as before
        let mut again = hub.subscribe(1);
        assert_eq!(hub.publish(event(1, 5)), 1);
        assert_eq!(again.recv().await.unwrap().order.id(), 5);
    }

    #[tokio::test]
    async fn feed_gap_forces_resync() {
        let (tx, rx) = broadcast::channel(8);
        let hub = LiveOrderHub::new();
        let mut session = hub.subscribe(1);
        let pump = tokio::spawn(pump_changes(rx, hub.clone()));

        tx.send(StoreChange::Order(event(1, 1))).unwrap();
        tx.send(StoreChange::Gap).unwrap();
        drop(tx);
        pump.await.unwrap();

        assert_eq!(session.recv().await.unwrap().order.id(), 1);
        assert!(matches!(session.recv().await, Err(broadcast::error::RecvError::Closed)));
    }

    #[tokio::test]
    async fn pump_lag_forces_resync() {
        let (tx, rx) = broadcast::channel(4);
        let hub = LiveOrderHub::new();
        let mut session = hub.subscribe(1);

        // Overflow the feed before the pump gets to run
        for id in 0..10 {
            tx.send(StoreChange::Order(event(1, id))).unwrap();
        }
        drop(tx);
        pump_changes(rx, hub.clone()).await;

        // Nothing reached the old channel; it was closed instead
        assert!(matches!(session.recv().await, Err(broadcast::error::RecvError::Closed)));
        assert_eq!(hub.subscriber_count(1), 0);
    }
}
