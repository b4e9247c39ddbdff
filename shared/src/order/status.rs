//! Order status state machine
//!
//! ```text
//! pending ──► preparing ──► ready ──► fulfilled
//!    │            │           │
//!    └────────────┴───────────┴──► cancelled
//! ```
//!
//! Forward moves are strictly single-step; `fulfilled` and `cancelled` are
//! terminal. Entering `fulfilled` stamps the fulfillment time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Order status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Preparing,
    Ready,
    Fulfilled,
    Cancelled,
}

/// Owner-initiated status actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAction {
    /// Move to the next state in the forward chain
    Advance,
    /// Move to `cancelled`
    Cancel,
}

impl StatusAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Advance => "advance",
            Self::Cancel => "cancel",
        }
    }
}

/// A permitted single-step status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

impl Transition {
    /// Whether applying this transition must set `fulfilled_at`
    pub fn stamps_fulfillment(&self) -> bool {
        self.to == OrderStatus::Fulfilled
    }
}

/// Rejected status change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {verb} an order that is {from}", verb = .action.as_str())]
pub struct TransitionError {
    pub from: OrderStatus,
    pub action: StatusAction,
}

impl OrderStatus {
    /// Every status, in lifecycle order
    pub const ALL: [OrderStatus; 5] = [
        Self::Pending,
        Self::Preparing,
        Self::Ready,
        Self::Fulfilled,
        Self::Cancelled,
    ];

    /// Database / wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Preparing => "preparing",
            Self::Ready => "ready",
            Self::Fulfilled => "fulfilled",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the database representation
    pub fn from_db(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Fulfilled | Self::Cancelled)
    }

    /// Unique forward successor, `None` for terminal states
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Preparing),
            Self::Preparing => Some(Self::Ready),
            Self::Ready => Some(Self::Fulfilled),
            Self::Fulfilled | Self::Cancelled => None,
        }
    }

    /// Position in the lifecycle; terminal states share the highest rank.
    ///
    /// Used by observers to discard events older than what they already hold.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Preparing => 1,
            Self::Ready => 2,
            Self::Fulfilled | Self::Cancelled => 3,
        }
    }

    /// Resolve `action` against this status
    pub fn transition(self, action: StatusAction) -> Result<Transition, TransitionError> {
        let to = match action {
            StatusAction::Advance => self.next(),
            StatusAction::Cancel => (!self.is_terminal()).then_some(Self::Cancelled),
        };
        to.map(|to| Transition { from: self, to })
            .ok_or(TransitionError { from: self, action })
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db(s).ok_or_else(|| format!("unknown order status: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_walks_the_forward_chain() {
        let mut status = OrderStatus::Pending;
        let mut seen = vec![status];
        while let Ok(t) = status.transition(StatusAction::Advance) {
            assert_eq!(t.from, status);
            status = t.to;
            seen.push(status);
        }
        assert_eq!(
            seen,
            vec![
                OrderStatus::Pending,
                OrderStatus::Preparing,
                OrderStatus::Ready,
                OrderStatus::Fulfilled
            ]
        );
    }

    #[test]
    fn terminal_states_reject_every_action() {
        for status in [OrderStatus::Fulfilled, OrderStatus::Cancelled] {
            for action in [StatusAction::Advance, StatusAction::Cancel] {
                let err = status.transition(action).unwrap_err();
                assert_eq!(err.from, status);
                assert_eq!(err.action, action);
            }
        }
    }

    #[test]
    fn cancel_reachable_from_every_open_state() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Preparing,
            OrderStatus::Ready,
        ] {
            let t = status.transition(StatusAction::Cancel).unwrap();
            assert_eq!(t.to, OrderStatus::Cancelled);
            assert!(!t.stamps_fulfillment());
        }
    }

    #[test]
    fn only_ready_to_fulfilled_stamps_fulfillment() {
        for status in OrderStatus::ALL {
            if let Ok(t) = status.transition(StatusAction::Advance) {
                assert_eq!(t.stamps_fulfillment(), status == OrderStatus::Ready);
            }
        }
    }

    #[test]
    fn db_representation_matches_serde() {
        for status in OrderStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(OrderStatus::from_db(status.as_str()), Some(status));
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
        assert_eq!(OrderStatus::from_db("PENDING"), None);
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn transition_error_message() {
        let err = OrderStatus::Fulfilled
            .transition(StatusAction::Advance)
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot advance an order that is fulfilled");
    }

    #[test]
    fn rank_is_monotonic_along_the_chain() {
        let mut status = OrderStatus::Pending;
        while let Some(next) = status.next() {
            assert!(next.rank() > status.rank());
            status = next;
        }
        assert_eq!(OrderStatus::Cancelled.rank(), OrderStatus::Fulfilled.rank());
    }
}
