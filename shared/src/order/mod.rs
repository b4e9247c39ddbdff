//! Order lifecycle module
//!
//! Pure, storage-independent rules for orders:
//! - status: the `pending → preparing → ready → fulfilled` state machine
//!   (plus `cancelled`) and its transition table
//! - money: 2-decimal line and order totals

pub mod money;
pub mod status;

// Re-exports
pub use money::{
    MAX_LINE_QUANTITY, MAX_PRICE, PriceError, format_money, line_total, order_total, round_money,
    validate_price,
};
pub use status::{OrderStatus, StatusAction, Transition, TransitionError};
