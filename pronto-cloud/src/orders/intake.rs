//! Order Intake: validate a customer cart and commit it as one order

use rust_decimal::Decimal;
use shared::error::{AppError, ErrorCode};
use shared::models::{CartLine, Order, OrderDetail, PlaceOrderRequest, Product};
use shared::order::{MAX_LINE_QUANTITY, OrderStatus, order_total};
use shared::util::{now_millis, snowflake_id};
use std::collections::HashMap;

use crate::error::ServiceResult;
use crate::push::{NewOrderNotice, PushQueue};
use crate::store::{NewOrderItem, Store};

pub const MAX_CUSTOMER_NAME_LEN: usize = 80;
pub const MAX_NOTE_LEN: usize = 500;
pub const MAX_CART_LINES: usize = 50;

/// Largest total a NUMERIC(10,2) column holds
const MAX_ORDER_TOTAL: Decimal = Decimal::from_parts(1_410_065_407, 2, 0, false, 2);

/// Input after trimming and shape checks
#[derive(Debug)]
struct ValidCart {
    customer_name: String,
    customer_note: Option<String>,
    lines: Vec<CartLine>,
}

fn validate(request: PlaceOrderRequest) -> Result<ValidCart, AppError> {
    let customer_name = request.customer_name.trim().to_string();
    if customer_name.is_empty() {
        return Err(AppError::new(ErrorCode::CustomerNameRequired)
            .with_detail("field", "customer_name"));
    }
    if customer_name.chars().count() > MAX_CUSTOMER_NAME_LEN {
        return Err(AppError::validation(format!(
            "Customer name must be at most {MAX_CUSTOMER_NAME_LEN} characters"
        ))
        .with_detail("field", "customer_name"));
    }

    let customer_note = request
        .customer_note
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    if let Some(note) = &customer_note
        && note.chars().count() > MAX_NOTE_LEN
    {
        return Err(AppError::validation(format!(
            "Note must be at most {MAX_NOTE_LEN} characters"
        ))
        .with_detail("field", "customer_note"));
    }

    if request.items.is_empty() {
        return Err(AppError::new(ErrorCode::OrderEmpty).with_detail("field", "items"));
    }
    if request.items.len() > MAX_CART_LINES {
        return Err(AppError::validation(format!(
            "An order may have at most {MAX_CART_LINES} lines"
        ))
        .with_detail("field", "items"));
    }
    if let Some(line) = request
        .items
        .iter()
        .find(|l| !(1..=MAX_LINE_QUANTITY).contains(&l.quantity))
    {
        return Err(AppError::with_message(
            ErrorCode::InvalidQuantity,
            format!("Quantity must be between 1 and {MAX_LINE_QUANTITY}"),
        )
        .with_detail("product_id", line.product_id)
        .with_detail("quantity", line.quantity));
    }

    Ok(ValidCart {
        customer_name,
        customer_note,
        lines: request.items,
    })
}

/// Snapshot each cart line against the business's current catalog
fn snapshot_lines(
    lines: &[CartLine],
    catalog: &HashMap<i64, Product>,
) -> Result<Vec<NewOrderItem>, AppError> {
    lines
        .iter()
        .map(|line| {
            let product = catalog.get(&line.product_id).ok_or_else(|| {
                AppError::new(ErrorCode::ProductNotFound).with_detail("product_id", line.product_id)
            })?;
            if !product.is_available {
                return Err(AppError::with_message(
                    ErrorCode::ProductUnavailable,
                    format!("{} is not available right now", product.name),
                )
                .with_detail("product_id", product.id));
            }
            Ok(NewOrderItem {
                product_id: Some(product.id),
                name: product.name.clone(),
                price: product.price,
                quantity: line.quantity,
            })
        })
        .collect()
}

/// Place an order for `business_id`.
///
/// The order and all its line items are committed as one unit with status
/// `pending`; only after the commit is the new-order notification queued.
/// Any persistence failure is returned to the caller, never swallowed.
pub async fn place_order(
    store: &dyn Store,
    push: &PushQueue,
    business_id: i64,
    request: PlaceOrderRequest,
) -> ServiceResult<OrderDetail> {
    let cart = validate(request)?;

    store
        .business_by_id(business_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::BusinessNotFound))?;

    let mut product_ids: Vec<i64> = cart.lines.iter().map(|l| l.product_id).collect();
    product_ids.sort_unstable();
    product_ids.dedup();
    let catalog: HashMap<i64, Product> = store
        .products_by_ids(business_id, &product_ids)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let items = snapshot_lines(&cart.lines, &catalog)?;
    let total = order_total(items.iter().map(|i| (i.price, i.quantity)));
    if total > MAX_ORDER_TOTAL {
        return Err(AppError::with_message(
            ErrorCode::ValueOutOfRange,
            "Order total is too large",
        )
        .into());
    }

    let order_id = snowflake_id();
    let order = Order {
        id: order_id,
        business_id,
        customer_name: cart.customer_name,
        customer_note: cart.customer_note,
        status: OrderStatus::Pending,
        total,
        created_at: now_millis(),
        fulfilled_at: None,
    };
    let detail = store.insert_order(&order, &items).await?;

    tracing::info!(
        order_id,
        business_id,
        lines = detail.items.len(),
        total = %detail.order.total,
        "Order placed"
    );

    push.try_enqueue(NewOrderNotice::from(&detail));

    Ok(detail)
}

/// Place an order through a business's public slug
pub async fn place_order_by_slug(
    store: &dyn Store,
    push: &PushQueue,
    slug: &str,
    request: PlaceOrderRequest,
) -> ServiceResult<OrderDetail> {
    let business = store
        .business_by_slug(slug)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::BusinessNotFound))?;
    place_order(store, push, business.id, request).await
}
