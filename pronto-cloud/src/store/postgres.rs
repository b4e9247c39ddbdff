//! PostgreSQL store
//!
//! The change feed rides on `LISTEN order_changes`: a trigger on `orders`
//! notifies `{op, order_id, business_id}` at commit, and the listener task
//! re-reads the committed row with its items before broadcasting it.
//! Notifications sent while the listener is disconnected are lost, so every
//! reconnect is announced on the feed as a [`StoreChange::Gap`].

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::dashboard::OrderEvent;
use shared::models::{
    Business, BusinessUpdate, Order, OrderDetail, OrderItem, Product, PushSubscription,
};
use shared::order::{OrderStatus, Transition};
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tokio::time::Duration;

use super::{
    CHANGE_FEED_CAPACITY, NewOrderItem, Owner, Store, StoreChange, StoreError, StoreResult,
};

const ORDER_CHANGES_CHANNEL: &str = "order_changes";

/// Wait before re-establishing a dropped LISTEN connection
const LISTEN_RETRY_DELAY: Duration = Duration::from_secs(2);

const ORDER_COLUMNS: &str =
    "id, business_id, customer_name, customer_note, status, total, created_at, fulfilled_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    business_id: i64,
    customer_name: String,
    customer_note: Option<String>,
    status: String,
    total: Decimal,
    created_at: i64,
    fulfilled_at: Option<i64>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = OrderStatus::from_db(&row.status).ok_or_else(|| {
            StoreError::Serialization(format!("order {} has status {:?}", row.id, row.status))
        })?;
        Ok(Order {
            id: row.id,
            business_id: row.business_id,
            customer_name: row.customer_name,
            customer_note: row.customer_note,
            status,
            total: row.total,
            created_at: row.created_at,
            fulfilled_at: row.fulfilled_at,
        })
    }
}

/// Payload written by the `notify_order_change` trigger
#[derive(Debug, Deserialize)]
struct ChangeNotice {
    op: String,
    order_id: i64,
    business_id: i64,
}

/// Map constraint violations onto store errors; everything else stays a database error
fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        let constraint = db.constraint().unwrap_or_default().to_string();
        if db.is_unique_violation() {
            let field = match constraint.as_str() {
                "owners_email_key" => "email",
                "businesses_slug_key" => "slug",
                "push_subscriptions_endpoint_key" => "endpoint",
                _ => "id",
            };
            return StoreError::Duplicate(field.to_string());
        }
        if db.is_foreign_key_violation() || db.is_check_violation() {
            return StoreError::Constraint(constraint);
        }
    }
    StoreError::Database(err)
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    changes: broadcast::Sender<StoreChange>,
}

impl PgStore {
    /// Connect, run migrations, and start the change listener
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPool::connect(database_url).await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("migration failed: {e}")))?;
        Ok(Self::with_pool(pool))
    }

    /// Wrap an existing pool and start the change listener
    pub fn with_pool(pool: PgPool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        let store = Self { pool, changes };
        tokio::spawn(store.clone().run_change_listener());
        store
    }

    async fn run_change_listener(self) {
        let mut reconnecting = false;
        loop {
            if let Err(e) = self.listen(reconnecting).await {
                tracing::error!(error = %e, "Order change listener failed, reconnecting");
                tokio::time::sleep(LISTEN_RETRY_DELAY).await;
            }
            reconnecting = true;
        }
    }

    async fn listen(&self, reconnecting: bool) -> StoreResult<()> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(ORDER_CHANGES_CHANNEL).await?;
        if reconnecting {
            tracing::warn!(channel = ORDER_CHANGES_CHANNEL, "Order change listener reconnected, dashboards will reload");
            let _ = self.changes.send(StoreChange::Gap);
        } else {
            tracing::info!(channel = ORDER_CHANGES_CHANNEL, "Order change listener ready");
        }

        loop {
            // `None`: the connection dropped
            let Some(notification) = listener.try_recv().await? else {
                return Err(StoreError::Unavailable(
                    "order change listener lost its connection".into(),
                ));
            };
            let notice: ChangeNotice = match serde_json::from_str(notification.payload()) {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(payload = notification.payload(), error = %e, "Malformed order change notice");
                    continue;
                }
            };

            match self.get_order(notice.business_id, notice.order_id).await {
                Ok(Some(order)) => {
                    let event = if notice.op == "insert" {
                        OrderEvent::inserted(order)
                    } else {
                        OrderEvent::updated(order)
                    };
                    let _ = self.changes.send(StoreChange::Order(event));
                }
                Ok(None) => {
                    tracing::debug!(order_id = notice.order_id, "Changed order vanished before fetch");
                }
                Err(e) => {
                    tracing::error!(order_id = notice.order_id, error = %e, "Failed to load changed order");
                }
            }
        }
    }

    /// Attach line items to order rows, preserving row order
    async fn with_items(&self, rows: Vec<OrderRow>) -> StoreResult<Vec<OrderDetail>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let items: Vec<OrderItem> = sqlx::query_as(
            "SELECT id, order_id, product_id, name, price, quantity
             FROM order_items WHERE order_id = ANY($1) ORDER BY id",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_order: HashMap<i64, Vec<OrderItem>> = HashMap::new();
        for item in items {
            by_order.entry(item.order_id).or_default().push(item);
        }

        rows.into_iter()
            .map(|row| {
                let items = by_order.remove(&row.id).unwrap_or_default();
                Ok(OrderDetail {
                    order: Order::try_from(row)?,
                    items,
                })
            })
            .collect()
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_owner(&self, owner: &Owner, business: &Business) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO owners (id, email, hashed_password, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(owner.id)
        .bind(&owner.email)
        .bind(&owner.hashed_password)
        .bind(owner.created_at)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        sqlx::query(
            "INSERT INTO businesses (id, owner_id, name, description, logo_url, slug, accent_color, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(business.id)
        .bind(business.owner_id)
        .bind(&business.name)
        .bind(&business.description)
        .bind(&business.logo_url)
        .bind(&business.slug)
        .bind(&business.accent_color)
        .bind(business.created_at)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        tx.commit().await?;
        Ok(())
    }

    async fn owner_by_email(&self, email: &str) -> StoreResult<Option<Owner>> {
        Ok(sqlx::query_as(
            "SELECT id, email, hashed_password, created_at FROM owners WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn business_by_id(&self, business_id: i64) -> StoreResult<Option<Business>> {
        Ok(sqlx::query_as("SELECT * FROM businesses WHERE id = $1")
            .bind(business_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn business_by_owner(&self, owner_id: i64) -> StoreResult<Option<Business>> {
        Ok(
            sqlx::query_as("SELECT * FROM businesses WHERE owner_id = $1 ORDER BY id LIMIT 1")
                .bind(owner_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn business_by_slug(&self, slug: &str) -> StoreResult<Option<Business>> {
        Ok(sqlx::query_as("SELECT * FROM businesses WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_business(
        &self,
        business_id: i64,
        update: &BusinessUpdate,
    ) -> StoreResult<Option<Business>> {
        Ok(sqlx::query_as(
            "UPDATE businesses SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                logo_url = COALESCE($4, logo_url),
                accent_color = COALESCE($5, accent_color)
             WHERE id = $1
             RETURNING *",
        )
        .bind(business_id)
        .bind(&update.name)
        .bind(&update.description)
        .bind(&update.logo_url)
        .bind(&update.accent_color)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_products(
        &self,
        business_id: i64,
        available_only: bool,
    ) -> StoreResult<Vec<Product>> {
        Ok(sqlx::query_as(
            "SELECT * FROM products
             WHERE business_id = $1 AND (is_available OR NOT $2)
             ORDER BY sort_order, name",
        )
        .bind(business_id)
        .bind(available_only)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_product(
        &self,
        business_id: i64,
        product_id: i64,
    ) -> StoreResult<Option<Product>> {
        Ok(
            sqlx::query_as("SELECT * FROM products WHERE id = $1 AND business_id = $2")
                .bind(product_id)
                .bind(business_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn products_by_ids(
        &self,
        business_id: i64,
        product_ids: &[i64],
    ) -> StoreResult<Vec<Product>> {
        Ok(
            sqlx::query_as("SELECT * FROM products WHERE business_id = $1 AND id = ANY($2)")
                .bind(business_id)
                .bind(product_ids)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn insert_product(&self, product: &Product) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO products (
                id, business_id, name, description, price, image_url,
                category, is_available, sort_order, created_at, updated_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(product.id)
        .bind(product.business_id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(&product.image_url)
        .bind(&product.category)
        .bind(product.is_available)
        .bind(product.sort_order)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }

    async fn update_product(&self, product: &Product) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE products SET
                name = $3, description = $4, price = $5, image_url = $6,
                category = $7, is_available = $8, sort_order = $9, updated_at = $10
             WHERE id = $1 AND business_id = $2",
        )
        .bind(product.id)
        .bind(product.business_id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(&product.image_url)
        .bind(&product.category)
        .bind(product.is_available)
        .bind(product.sort_order)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_product(&self, business_id: i64, product_id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1 AND business_id = $2")
            .bind(product_id)
            .bind(business_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_order(
        &self,
        order: &Order,
        items: &[NewOrderItem],
    ) -> StoreResult<OrderDetail> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO orders (
                id, business_id, customer_name, customer_note, status, total, created_at, fulfilled_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(order.id)
        .bind(order.business_id)
        .bind(&order.customer_name)
        .bind(&order.customer_note)
        .bind(order.status.as_str())
        .bind(order.total)
        .bind(order.created_at)
        .bind(order.fulfilled_at)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        let product_ids: Vec<Option<i64>> = items.iter().map(|i| i.product_id).collect();
        let names: Vec<String> = items.iter().map(|i| i.name.clone()).collect();
        let prices: Vec<Decimal> = items.iter().map(|i| i.price).collect();
        let quantities: Vec<i32> = items.iter().map(|i| i.quantity).collect();
        // Identity ids follow cart order
        let mut stored: Vec<OrderItem> = sqlx::query_as(
            r#"
            INSERT INTO order_items (order_id, product_id, name, price, quantity)
            SELECT $1, t.product_id, t.name, t.price, t.quantity
            FROM UNNEST($2::bigint[], $3::text[], $4::numeric[], $5::integer[])
                 WITH ORDINALITY AS t(product_id, name, price, quantity, line)
            ORDER BY t.line
            RETURNING id, order_id, product_id, name, price, quantity
            "#,
        )
        .bind(order.id)
        .bind(&product_ids)
        .bind(&names)
        .bind(&prices)
        .bind(&quantities)
        .fetch_all(&mut *tx)
        .await
        .map_err(classify)?;
        stored.sort_by_key(|i| i.id);

        tx.commit().await?;
        Ok(OrderDetail {
            order: order.clone(),
            items: stored,
        })
    }

    async fn get_order(
        &self,
        business_id: i64,
        order_id: i64,
    ) -> StoreResult<Option<OrderDetail>> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND business_id = $2"
        ))
        .bind(order_id)
        .bind(business_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(self.with_items(vec![row]).await?.pop())
    }

    async fn list_orders(
        &self,
        business_id: i64,
        status: Option<OrderStatus>,
        limit: i64,
    ) -> StoreResult<Vec<OrderDetail>> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders
             WHERE business_id = $1 AND ($2::text IS NULL OR status = $2)
             ORDER BY created_at DESC, id DESC
             LIMIT $3"
        ))
        .bind(business_id)
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        self.with_items(rows).await
    }

    async fn compare_and_set_status(
        &self,
        business_id: i64,
        order_id: i64,
        transition: Transition,
        fulfilled_at: Option<i64>,
    ) -> StoreResult<Option<OrderDetail>> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "UPDATE orders
             SET status = $4, fulfilled_at = COALESCE(fulfilled_at, $5)
             WHERE id = $1 AND business_id = $2 AND status = $3
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order_id)
        .bind(business_id)
        .bind(transition.from.as_str())
        .bind(transition.to.as_str())
        .bind(fulfilled_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(self.with_items(vec![row]).await?.pop())
    }

    async fn upsert_push_subscription(
        &self,
        subscription: &PushSubscription,
    ) -> StoreResult<PushSubscription> {
        Ok(sqlx::query_as(
            r#"
            INSERT INTO push_subscriptions (id, business_id, endpoint, p256dh, auth, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (endpoint)
            DO UPDATE SET
                business_id = EXCLUDED.business_id,
                p256dh = EXCLUDED.p256dh,
                auth = EXCLUDED.auth,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(subscription.id)
        .bind(subscription.business_id)
        .bind(&subscription.endpoint)
        .bind(&subscription.p256dh)
        .bind(&subscription.auth)
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?)
    }

    async fn list_push_subscriptions(
        &self,
        business_id: i64,
    ) -> StoreResult<Vec<PushSubscription>> {
        Ok(
            sqlx::query_as("SELECT * FROM push_subscriptions WHERE business_id = $1 ORDER BY id")
                .bind(business_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn delete_push_subscription(
        &self,
        subscription: &PushSubscription,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "DELETE FROM push_subscriptions
             WHERE endpoint = $1 AND business_id = $2 AND p256dh = $3",
        )
        .bind(&subscription.endpoint)
        .bind(subscription.business_id)
        .bind(&subscription.p256dh)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    fn changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
