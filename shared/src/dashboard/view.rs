//! Client-side order board
//!
//! A dashboard fetches the full list, then attaches to the live feed, so an
//! event can arrive twice or arrive older than the fetched row. Every
//! incoming order is therefore applied as an upsert keyed by order id, and
//! an event whose status ranks below the held one is dropped.

use std::collections::HashMap;

use super::ws::DashboardMessage;
use crate::models::OrderDetail;
use crate::order::OrderStatus;

#[derive(Debug, Clone, Default)]
pub struct DashboardView {
    orders: HashMap<i64, OrderDetail>,
}

impl DashboardView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one server message
    pub fn apply(&mut self, message: DashboardMessage) {
        match message {
            DashboardMessage::Ready { orders } => self.replace_all(orders),
            DashboardMessage::OrderUpserted { order, .. } => {
                self.upsert(*order);
            }
        }
    }

    /// Replace the whole board (initial fetch or resync)
    pub fn replace_all(&mut self, orders: Vec<OrderDetail>) {
        self.orders = orders.into_iter().map(|o| (o.id(), o)).collect();
    }

    /// Insert or replace one order. Returns `false` when the incoming row is
    /// older than the held one and was ignored.
    pub fn upsert(&mut self, order: OrderDetail) -> bool {
        if let Some(held) = self.orders.get(&order.id())
            && held.order.status.rank() > order.order.status.rank()
        {
            return false;
        }
        self.orders.insert(order.id(), order);
        true
    }

    pub fn get(&self, order_id: i64) -> Option<&OrderDetail> {
        self.orders.get(&order_id)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Orders in `status`, oldest first (kitchen queue order)
    pub fn with_status(&self, status: OrderStatus) -> Vec<&OrderDetail> {
        let mut list: Vec<_> = self
            .orders
            .values()
            .filter(|o| o.order.status == status)
            .collect();
        list.sort_by_key(|o| (o.order.created_at, o.id()));
        list
    }

    /// Non-terminal orders, oldest first
    pub fn open_orders(&self) -> Vec<&OrderDetail> {
        let mut list: Vec<_> = self
            .orders
            .values()
            .filter(|o| !o.order.status.is_terminal())
            .collect();
        list.sort_by_key(|o| (o.order.created_at, o.id()));
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::OrderChangeKind;
    use crate::models::Order;
    use rust_decimal::Decimal;

    fn order(id: i64, status: OrderStatus, created_at: i64) -> OrderDetail {
        OrderDetail {
            order: Order {
                id,
                business_id: 1,
                customer_name: format!("customer-{id}"),
                customer_note: None,
                status,
                total: Decimal::new(500, 2),
                created_at,
                fulfilled_at: (status == OrderStatus::Fulfilled).then_some(created_at + 1),
            },
            items: vec![],
        }
    }

    fn upserted(o: OrderDetail) -> DashboardMessage {
        DashboardMessage::OrderUpserted {
            kind: OrderChangeKind::Updated,
            order: Box::new(o),
        }
    }

    #[test]
    fn duplicate_event_is_idempotent() {
        let mut view = DashboardView::new();
        view.apply(DashboardMessage::Ready {
            orders: vec![order(1, OrderStatus::Pending, 10)],
        });
        // The insert event raced the initial fetch and arrives again
        view.apply(upserted(order(1, OrderStatus::Pending, 10)));
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn stale_event_does_not_regress_status() {
        let mut view = DashboardView::new();
        view.apply(DashboardMessage::Ready {
            orders: vec![order(1, OrderStatus::Ready, 10)],
        });
        assert!(!view.upsert(order(1, OrderStatus::Preparing, 10)));
        assert_eq!(view.get(1).unwrap().order.status, OrderStatus::Ready);

        assert!(view.upsert(order(1, OrderStatus::Fulfilled, 10)));
        assert_eq!(view.get(1).unwrap().order.status, OrderStatus::Fulfilled);
    }

    #[test]
    fn ready_replaces_everything() {
        let mut view = DashboardView::new();
        view.upsert(order(1, OrderStatus::Pending, 10));
        view.upsert(order(2, OrderStatus::Pending, 11));
        view.apply(DashboardMessage::Ready {
            orders: vec![order(3, OrderStatus::Preparing, 12)],
        });
        assert_eq!(view.len(), 1);
        assert!(view.get(3).is_some());
    }

    #[test]
    fn open_orders_are_oldest_first() {
        let mut view = DashboardView::new();
        view.upsert(order(5, OrderStatus::Preparing, 30));
        view.upsert(order(6, OrderStatus::Pending, 10));
        view.upsert(order(7, OrderStatus::Cancelled, 5));
        view.upsert(order(8, OrderStatus::Ready, 20));

        let ids: Vec<i64> = view.open_orders().iter().map(|o| o.id()).collect();
        assert_eq!(ids, vec![6, 8, 5]);

        let pending: Vec<i64> = view
            .with_status(OrderStatus::Pending)
            .iter()
            .map(|o| o.id())
            .collect();
        assert_eq!(pending, vec![6]);
    }
}
