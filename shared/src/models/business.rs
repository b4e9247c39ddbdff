//! Business Model

use serde::{Deserialize, Serialize};

use super::product::Product;

/// Accent color used when the owner does not pick one
pub const DEFAULT_ACCENT_COLOR: &str = "#f97316";

/// Business entity (one seller, one menu, one order stream)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Business {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    /// Public ordering page path segment, immutable after creation
    pub slug: String,
    pub accent_color: String,
    pub created_at: i64,
}

/// Customer-facing view of a business (no owner identity)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusinessProfile {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub slug: String,
    pub accent_color: String,
}

impl From<Business> for BusinessProfile {
    fn from(b: Business) -> Self {
        Self {
            id: b.id,
            name: b.name,
            description: b.description,
            logo_url: b.logo_url,
            slug: b.slug,
            accent_color: b.accent_color,
        }
    }
}

/// Update business payload (the slug is immutable)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusinessUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub accent_color: Option<String>,
}

/// Public menu: business profile plus its available products
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Menu {
    pub business: BusinessProfile,
    pub products: Vec<Product>,
}

/// Maximum slug length
pub const MAX_SLUG_LEN: usize = 48;
/// Minimum slug length
pub const MIN_SLUG_LEN: usize = 3;

/// Derive a URL slug from a display name: lowercase ascii alnum, runs of
/// anything else collapse to a single `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug.truncate(MAX_SLUG_LEN);
    slug.trim_end_matches('-').to_string()
}

/// Check slug format: `[a-z0-9-]`, 3..=48 chars, no leading/trailing `-`
pub fn is_valid_slug(slug: &str) -> bool {
    (MIN_SLUG_LEN..=MAX_SLUG_LEN).contains(&slug.len())
        && slug
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        && !slug.starts_with('-')
        && !slug.ends_with('-')
}

/// Check `#rrggbb` accent color format
pub fn is_valid_accent_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].bytes().all(|b| b.is_ascii_hexdigit())
}
