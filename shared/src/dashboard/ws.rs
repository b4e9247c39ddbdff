//! Dashboard WebSocket protocol
//!
//! Cloud → Dashboard: DashboardMessage
//! Dashboard → Cloud: DashboardCommand

use serde::{Deserialize, Serialize};

use crate::models::OrderDetail;

/// What happened to the order carried by an [`OrderEvent`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderChangeKind {
    Inserted,
    Updated,
}

/// One committed order write, carrying the full current row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderEvent {
    pub kind: OrderChangeKind,
    pub order: OrderDetail,
}

impl OrderEvent {
    pub fn inserted(order: OrderDetail) -> Self {
        Self {
            kind: OrderChangeKind::Inserted,
            order,
        }
    }

    pub fn updated(order: OrderDetail) -> Self {
        Self {
            kind: OrderChangeKind::Updated,
            order,
        }
    }

    pub fn business_id(&self) -> i64 {
        self.order.order.business_id
    }
}

/// Cloud → Dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DashboardMessage {
    /// Full current order list; replaces whatever the dashboard holds
    Ready { orders: Vec<OrderDetail> },

    /// One order created or changed
    OrderUpserted {
        kind: OrderChangeKind,
        order: Box<OrderDetail>,
    },
}

impl From<OrderEvent> for DashboardMessage {
    fn from(event: OrderEvent) -> Self {
        Self::OrderUpserted {
            kind: event.kind,
            order: Box::new(event.order),
        }
    }
}

/// Dashboard → Cloud
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DashboardCommand {
    /// Ask for a fresh `Ready` (e.g. after the tab was backgrounded)
    Refresh,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_wire_format() {
        let cmd: DashboardCommand = serde_json::from_str(r#"{"type":"Refresh"}"#).unwrap();
        assert!(matches!(cmd, DashboardCommand::Refresh));
    }

    #[test]
    fn ready_wire_format() {
        let json = serde_json::to_value(DashboardMessage::Ready { orders: vec![] }).unwrap();
        assert_eq!(json["type"], "Ready");
        assert!(json["orders"].as_array().unwrap().is_empty());
    }
}
