//! Order Store access contract
//!
//! ```text
//!              ┌──────────────┐
//!              │ Store trait  │  ◄── intake / lifecycle / registry / api
//!              └──────┬───────┘
//!           ┌─────────┴─────────┐
//!           ▼                   ▼
//!       PgStore             MemoryStore
//!   (sqlx + LISTEN)     (tests, local dev)
//! ```
//!
//! Every order read and write is scoped by `business_id`; callers never
//! reach an order without naming the business that owns it.
//! [`Store::changes`] is the live feed of committed order writes, with a
//! [`StoreChange::Gap`] marker wherever the feed itself may have lost some.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use rust_decimal::Decimal;
use shared::dashboard::OrderEvent;
use shared::models::{Business, BusinessUpdate, Order, OrderDetail, Product, PushSubscription};
use shared::order::{OrderStatus, Transition};
use thiserror::Error;
use tokio::sync::broadcast;

/// Change feed buffer; a receiver further behind than this observes `Lagged`
pub const CHANGE_FEED_CAPACITY: usize = 1024;

/// Store error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt row: {0}")]
    Serialization(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Unique constraint hit; carries the field name (`email`, `slug`, ...)
    #[error("Duplicate: {0}")]
    Duplicate(String),

    /// Foreign key or check constraint rejected the write
    #[error("Constraint violated: {0}")]
    Constraint(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Business owner account (server-side only, never serialized to clients)
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Owner {
    pub id: i64,
    pub email: String,
    pub hashed_password: String,
    pub created_at: i64,
}

/// One item on the store's change feed
#[derive(Debug, Clone, PartialEq)]
pub enum StoreChange {
    /// A committed order write
    Order(OrderEvent),
    /// The feed may have skipped writes (its connection was re-established);
    /// observers must reload current state
    Gap,
}

/// Line item as snapshotted at intake; the store assigns its id on insert
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderItem {
    pub product_id: Option<i64>,
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
}

#[async_trait]
pub trait Store: Send + Sync {
    // ── owners & businesses ─────────────────────────────────────────

    /// Create an owner and its business in one unit.
    /// Fails with `Duplicate("email")` or `Duplicate("slug")`.
    async fn create_owner(&self, owner: &Owner, business: &Business) -> StoreResult<()>;

    async fn owner_by_email(&self, email: &str) -> StoreResult<Option<Owner>>;

    async fn business_by_id(&self, business_id: i64) -> StoreResult<Option<Business>>;

    async fn business_by_owner(&self, owner_id: i64) -> StoreResult<Option<Business>>;

    async fn business_by_slug(&self, slug: &str) -> StoreResult<Option<Business>>;

    /// Apply a partial update; `None` when the business does not exist
    async fn update_business(
        &self,
        business_id: i64,
        update: &BusinessUpdate,
    ) -> StoreResult<Option<Business>>;

    // ── products ────────────────────────────────────────────────────

    /// Products ordered by (sort_order, name)
    async fn list_products(
        &self,
        business_id: i64,
        available_only: bool,
    ) -> StoreResult<Vec<Product>>;

    async fn get_product(&self, business_id: i64, product_id: i64)
    -> StoreResult<Option<Product>>;

    /// Products of `business_id` among `product_ids`; foreign ids are simply absent
    async fn products_by_ids(
        &self,
        business_id: i64,
        product_ids: &[i64],
    ) -> StoreResult<Vec<Product>>;

    async fn insert_product(&self, product: &Product) -> StoreResult<()>;

    /// Overwrite the editable columns; `false` when no such product
    async fn update_product(&self, product: &Product) -> StoreResult<bool>;

    /// Delete; line items that referenced it keep their snapshot with a null product
    async fn delete_product(&self, business_id: i64, product_id: i64) -> StoreResult<bool>;

    // ── orders ──────────────────────────────────────────────────────

    /// Insert an order and all its line items atomically.
    /// Either everything becomes visible (and one `Inserted` change is emitted) or nothing.
    /// Returns the stored order, its items in cart order with store-assigned ids.
    async fn insert_order(
        &self,
        order: &Order,
        items: &[NewOrderItem],
    ) -> StoreResult<OrderDetail>;

    async fn get_order(&self, business_id: i64, order_id: i64)
    -> StoreResult<Option<OrderDetail>>;

    /// Newest first
    async fn list_orders(
        &self,
        business_id: i64,
        status: Option<OrderStatus>,
        limit: i64,
    ) -> StoreResult<Vec<OrderDetail>>;

    /// Apply `transition` only if the order still has status `transition.from`.
    ///
    /// `fulfilled_at` is written only when the stored value is null. Returns the
    /// updated order, or `None` when the guard did not match (the order moved on
    /// or does not belong to `business_id`).
    async fn compare_and_set_status(
        &self,
        business_id: i64,
        order_id: i64,
        transition: Transition,
        fulfilled_at: Option<i64>,
    ) -> StoreResult<Option<OrderDetail>>;

    // ── push subscriptions ──────────────────────────────────────────

    /// Insert or, when the endpoint is already known, move it to this
    /// business with the latest keys. Returns the stored record.
    async fn upsert_push_subscription(
        &self,
        subscription: &PushSubscription,
    ) -> StoreResult<PushSubscription>;

    async fn list_push_subscriptions(&self, business_id: i64)
    -> StoreResult<Vec<PushSubscription>>;

    /// Delete the record only while it still matches `subscription`'s endpoint,
    /// business and keys; a device that re-registered meanwhile is kept.
    async fn delete_push_subscription(&self, subscription: &PushSubscription)
    -> StoreResult<bool>;

    // ── change feed ─────────────────────────────────────────────────

    /// Committed order inserts/updates across all businesses, in commit order
    fn changes(&self) -> broadcast::Receiver<StoreChange>;
}
