//! In-process store for tests and local development
//!
//! One mutex guards all tables so each operation is a single atomic unit.
//! Changes are emitted while the lock is held, which keeps the feed in
//! commit order.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared::dashboard::OrderEvent;
use shared::models::{
    Business, BusinessUpdate, Order, OrderDetail, OrderItem, Product, PushSubscription,
};
use shared::order::{OrderStatus, Transition};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

use super::{
    CHANGE_FEED_CAPACITY, NewOrderItem, Owner, Store, StoreChange, StoreError, StoreResult,
};

#[derive(Default)]
struct Tables {
    owners: HashMap<i64, Owner>,
    businesses: HashMap<i64, Business>,
    products: HashMap<i64, Product>,
    orders: HashMap<i64, Order>,
    /// order_id → line items in insertion order
    order_items: HashMap<i64, Vec<OrderItem>>,
    /// Last line item id handed out (identity column)
    last_order_item_id: i64,
    /// endpoint → subscription
    push_subscriptions: HashMap<String, PushSubscription>,
}

impl Tables {
    fn order_detail(&self, order_id: i64) -> Option<OrderDetail> {
        let order = self.orders.get(&order_id)?.clone();
        let items = self.order_items.get(&order_id).cloned().unwrap_or_default();
        Some(OrderDetail { order, items })
    }
}

pub struct MemoryStore {
    tables: Mutex<Tables>,
    changes: broadcast::Sender<StoreChange>,
    unavailable: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            tables: Mutex::new(Tables::default()),
            changes,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make every write fail with `Unavailable` (simulates a lost database)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored orders across all businesses
    pub fn order_count(&self) -> usize {
        self.tables.lock().orders.len()
    }

    /// Number of stored line items across all orders
    pub fn order_item_count(&self) -> usize {
        self.tables.lock().order_items.values().map(Vec::len).sum()
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        Ok(())
    }

    fn emit(&self, event: OrderEvent) {
        // No receivers is fine
        let _ = self.changes.send(StoreChange::Order(event));
    }
}

fn sort_products(products: &mut [Product]) {
    products.sort_by(|a, b| {
        a.sort_order
            .cmp(&b.sort_order)
            .then_with(|| a.name.cmp(&b.name))
    });
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_owner(&self, owner: &Owner, business: &Business) -> StoreResult<()> {
        self.check_writable()?;
        let mut t = self.tables.lock();
        if t.owners.values().any(|o| o.email == owner.email) {
            return Err(StoreError::Duplicate("email".into()));
        }
        if t.businesses.values().any(|b| b.slug == business.slug) {
            return Err(StoreError::Duplicate("slug".into()));
        }
        t.owners.insert(owner.id, owner.clone());
        t.businesses.insert(business.id, business.clone());
        Ok(())
    }

    async fn owner_by_email(&self, email: &str) -> StoreResult<Option<Owner>> {
        let t = self.tables.lock();
        Ok(t.owners.values().find(|o| o.email == email).cloned())
    }

    async fn business_by_id(&self, business_id: i64) -> StoreResult<Option<Business>> {
        Ok(self.tables.lock().businesses.get(&business_id).cloned())
    }

    async fn business_by_owner(&self, owner_id: i64) -> StoreResult<Option<Business>> {
        let t = self.tables.lock();
        Ok(t.businesses
            .values()
            .find(|b| b.owner_id == owner_id)
            .cloned())
    }

    async fn business_by_slug(&self, slug: &str) -> StoreResult<Option<Business>> {
        let t = self.tables.lock();
        Ok(t.businesses.values().find(|b| b.slug == slug).cloned())
    }

    async fn update_business(
        &self,
        business_id: i64,
        update: &BusinessUpdate,
    ) -> StoreResult<Option<Business>> {
        self.check_writable()?;
        let mut t = self.tables.lock();
        let Some(business) = t.businesses.get_mut(&business_id) else {
            return Ok(None);
        };
        if let Some(name) = &update.name {
            business.name = name.clone();
        }
        if let Some(description) = &update.description {
            business.description = Some(description.clone());
        }
        if let Some(logo_url) = &update.logo_url {
            business.logo_url = Some(logo_url.clone());
        }
        if let Some(accent_color) = &update.accent_color {
            business.accent_color = accent_color.clone();
        }
        Ok(Some(business.clone()))
    }

    async fn list_products(
        &self,
        business_id: i64,
        available_only: bool,
    ) -> StoreResult<Vec<Product>> {
        let t = self.tables.lock();
        let mut products: Vec<Product> = t
            .products
            .values()
            .filter(|p| p.business_id == business_id && (!available_only || p.is_available))
            .cloned()
            .collect();
        sort_products(&mut products);
        Ok(products)
    }

    async fn get_product(
        &self,
        business_id: i64,
        product_id: i64,
    ) -> StoreResult<Option<Product>> {
        let t = self.tables.lock();
        Ok(t.products
            .get(&product_id)
            .filter(|p| p.business_id == business_id)
            .cloned())
    }

    async fn products_by_ids(
        &self,
        business_id: i64,
        product_ids: &[i64],
    ) -> StoreResult<Vec<Product>> {
        let t = self.tables.lock();
        Ok(product_ids
            .iter()
            .filter_map(|id| t.products.get(id))
            .filter(|p| p.business_id == business_id)
            .cloned()
            .collect())
    }

    async fn insert_product(&self, product: &Product) -> StoreResult<()> {
        self.check_writable()?;
        let mut t = self.tables.lock();
        if !t.businesses.contains_key(&product.business_id) {
            return Err(StoreError::Constraint("products_business_id_fkey".into()));
        }
        t.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn update_product(&self, product: &Product) -> StoreResult<bool> {
        self.check_writable()?;
        let mut t = self.tables.lock();
        match t.products.get_mut(&product.id) {
            Some(existing) if existing.business_id == product.business_id => {
                let created_at = existing.created_at;
                *existing = Product {
                    created_at,
                    ..product.clone()
                };
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_product(&self, business_id: i64, product_id: i64) -> StoreResult<bool> {
        self.check_writable()?;
        let mut t = self.tables.lock();
        let owned = t
            .products
            .get(&product_id)
            .is_some_and(|p| p.business_id == business_id);
        if !owned {
            return Ok(false);
        }
        t.products.remove(&product_id);
        // ON DELETE SET NULL
        for items in t.order_items.values_mut() {
            for item in items.iter_mut() {
                if item.product_id == Some(product_id) {
                    item.product_id = None;
                }
            }
        }
        Ok(true)
    }

    async fn insert_order(
        &self,
        order: &Order,
        items: &[NewOrderItem],
    ) -> StoreResult<OrderDetail> {
        self.check_writable()?;
        let mut t = self.tables.lock();
        if !t.businesses.contains_key(&order.business_id) {
            return Err(StoreError::Constraint("orders_business_id_fkey".into()));
        }
        if t.orders.contains_key(&order.id) {
            return Err(StoreError::Duplicate("id".into()));
        }
        if items.iter().any(|i| i.quantity < 1) {
            return Err(StoreError::Constraint("order_items_quantity_check".into()));
        }

        let mut stored = Vec::with_capacity(items.len());
        for item in items {
            t.last_order_item_id += 1;
            stored.push(OrderItem {
                id: t.last_order_item_id,
                order_id: order.id,
                product_id: item.product_id,
                name: item.name.clone(),
                price: item.price,
                quantity: item.quantity,
            });
        }
        t.orders.insert(order.id, order.clone());
        t.order_items.insert(order.id, stored.clone());

        let detail = OrderDetail {
            order: order.clone(),
            items: stored,
        };
        self.emit(OrderEvent::inserted(detail.clone()));
        Ok(detail)
    }

    async fn get_order(
        &self,
        business_id: i64,
        order_id: i64,
    ) -> StoreResult<Option<OrderDetail>> {
        let t = self.tables.lock();
        Ok(t.order_detail(order_id)
            .filter(|d| d.business_id() == business_id))
    }

    async fn list_orders(
        &self,
        business_id: i64,
        status: Option<OrderStatus>,
        limit: i64,
    ) -> StoreResult<Vec<OrderDetail>> {
        let t = self.tables.lock();
        let mut orders: Vec<&Order> = t
            .orders
            .values()
            .filter(|o| o.business_id == business_id)
            .filter(|o| status.is_none_or(|s| o.status == s))
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .filter_map(|o| t.order_detail(o.id))
            .collect())
    }

    async fn compare_and_set_status(
        &self,
        business_id: i64,
        order_id: i64,
        transition: Transition,
        fulfilled_at: Option<i64>,
    ) -> StoreResult<Option<OrderDetail>> {
        self.check_writable()?;
        let mut t = self.tables.lock();
        let Some(order) = t.orders.get_mut(&order_id) else {
            return Ok(None);
        };
        if order.business_id != business_id || order.status != transition.from {
            return Ok(None);
        }
        order.status = transition.to;
        if order.fulfilled_at.is_none() {
            order.fulfilled_at = fulfilled_at;
        }
        let Some(detail) = t.order_detail(order_id) else {
            return Ok(None);
        };
        self.emit(OrderEvent::updated(detail.clone()));
        Ok(Some(detail))
    }

    async fn upsert_push_subscription(
        &self,
        subscription: &PushSubscription,
    ) -> StoreResult<PushSubscription> {
        self.check_writable()?;
        let mut t = self.tables.lock();
        if !t.businesses.contains_key(&subscription.business_id) {
            return Err(StoreError::Constraint(
                "push_subscriptions_business_id_fkey".into(),
            ));
        }
        let stored = t
            .push_subscriptions
            .entry(subscription.endpoint.clone())
            .and_modify(|existing| {
                existing.business_id = subscription.business_id;
                existing.p256dh = subscription.p256dh.clone();
                existing.auth = subscription.auth.clone();
                existing.updated_at = subscription.updated_at;
            })
            .or_insert_with(|| subscription.clone());
        Ok(stored.clone())
    }

    async fn list_push_subscriptions(
        &self,
        business_id: i64,
    ) -> StoreResult<Vec<PushSubscription>> {
        let t = self.tables.lock();
        let mut subs: Vec<PushSubscription> = t
            .push_subscriptions
            .values()
            .filter(|s| s.business_id == business_id)
            .cloned()
            .collect();
        subs.sort_by_key(|s| s.id);
        Ok(subs)
    }

    async fn delete_push_subscription(
        &self,
        subscription: &PushSubscription,
    ) -> StoreResult<bool> {
        self.check_writable()?;
        let mut t = self.tables.lock();
        let matches = t
            .push_subscriptions
            .get(&subscription.endpoint)
            .is_some_and(|stored| {
                stored.business_id == subscription.business_id
                    && stored.p256dh == subscription.p256dh
            });
        if matches {
            t.push_subscriptions.remove(&subscription.endpoint);
        }
        Ok(matches)
    }

    fn changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
