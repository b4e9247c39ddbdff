//! Product management and the public menu

use rust_decimal::Decimal;
use shared::error::{AppError, ErrorCode};
use shared::models::{
    BusinessProfile, DEFAULT_CATEGORY, Menu, Product, ProductCreate, ProductUpdate,
};
use shared::order::validate_price;
use shared::util::{now_millis, snowflake_id};

use crate::auth::OwnerContext;
use crate::error::ServiceResult;
use crate::store::Store;
use crate::util::non_blank;

pub const MAX_PRODUCT_NAME_LEN: usize = 120;

fn price(value: Decimal) -> Result<Decimal, AppError> {
    validate_price(value).map_err(|e| {
        AppError::with_message(ErrorCode::InvalidPrice, e.to_string()).with_detail("field", "price")
    })
}

fn product_name(value: &str) -> Result<String, AppError> {
    let name = value.trim();
    if name.is_empty() {
        return Err(AppError::validation("Product name is required").with_detail("field", "name"));
    }
    if name.chars().count() > MAX_PRODUCT_NAME_LEN {
        return Err(AppError::validation(format!(
            "Product name must be at most {MAX_PRODUCT_NAME_LEN} characters"
        ))
        .with_detail("field", "name"));
    }
    Ok(name.to_string())
}

fn category(value: Option<String>) -> String {
    non_blank(value).unwrap_or_else(|| DEFAULT_CATEGORY.to_string())
}

/// Every product of the owner's business, available or not
pub async fn list_products(store: &dyn Store, owner: &OwnerContext) -> ServiceResult<Vec<Product>> {
    Ok(store.list_products(owner.business_id, false).await?)
}

pub async fn create_product(
    store: &dyn Store,
    owner: &OwnerContext,
    data: ProductCreate,
) -> ServiceResult<Product> {
    let name = product_name(&data.name)?;
    let price = price(data.price)?;

    let sort_order = match data.sort_order {
        Some(n) => n,
        None => store
            .list_products(owner.business_id, false)
            .await?
            .iter()
            .map(|p| p.sort_order)
            .max()
            .map_or(0, |max| max.saturating_add(1)),
    };

    let now = now_millis();
    let product = Product {
        id: snowflake_id(),
        business_id: owner.business_id,
        name,
        description: non_blank(data.description),
        price,
        image_url: non_blank(data.image_url),
        category: category(data.category),
        is_available: data.is_available.unwrap_or(true),
        sort_order,
        created_at: now,
        updated_at: now,
    };
    store.insert_product(&product).await?;

    tracing::info!(
        product_id = product.id,
        business_id = owner.business_id,
        "Product created"
    );
    Ok(product)
}

pub async fn update_product(
    store: &dyn Store,
    owner: &OwnerContext,
    product_id: i64,
    data: ProductUpdate,
) -> ServiceResult<Product> {
    let mut product = store
        .get_product(owner.business_id, product_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::ProductNotFound))?;

    if let Some(name) = &data.name {
        product.name = product_name(name)?;
    }
    if let Some(value) = data.price {
        product.price = price(value)?;
    }
    if data.description.is_some() {
        product.description = non_blank(data.description);
    }
    if data.image_url.is_some() {
        product.image_url = non_blank(data.image_url);
    }
    if data.category.is_some() {
        product.category = category(data.category);
    }
    if let Some(available) = data.is_available {
        product.is_available = available;
    }
    if let Some(sort_order) = data.sort_order {
        product.sort_order = sort_order;
    }
    product.updated_at = now_millis();

    if !store.update_product(&product).await? {
        // Deleted between read and write
        return Err(AppError::new(ErrorCode::ProductNotFound).into());
    }
    Ok(product)
}

/// Delete a product; existing order lines keep their snapshot
pub async fn delete_product(
    store: &dyn Store,
    owner: &OwnerContext,
    product_id: i64,
) -> ServiceResult<()> {
    if !store.delete_product(owner.business_id, product_id).await? {
        return Err(AppError::new(ErrorCode::ProductNotFound).into());
    }
    tracing::info!(product_id, business_id = owner.business_id, "Product deleted");
    Ok(())
}

/// Public menu by slug: profile plus available products in menu order
pub async fn menu(store: &dyn Store, slug: &str) -> ServiceResult<Menu> {
    let business = store
        .business_by_slug(slug)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::BusinessNotFound))?;
    let products = store.list_products(business.id, true).await?;
    Ok(Menu {
        business: BusinessProfile::from(business),
        products,
    })
}
