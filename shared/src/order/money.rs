//! Money calculation utilities using rust_decimal for precision
//!
//! Prices and totals are fixed-point currency with 2 decimal places.
//! Rounding is half-up (away from zero), applied once to the final sum.

use rust_decimal::prelude::*;
use thiserror::Error;

/// Rounding strategy for monetary values (2 decimal places, half-up)
const DECIMAL_PLACES: u32 = 2;

/// Maximum allowed price per item (1,000,000.00)
pub const MAX_PRICE: Decimal = Decimal::from_parts(100_000_000, 0, 0, false, 2);

/// Maximum allowed quantity per line
pub const MAX_LINE_QUANTITY: i32 = 99;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PriceError {
    #[error("price must be non-negative")]
    Negative,
    #[error("price may have at most 2 decimal places")]
    TooPrecise,
    #[error("price exceeds maximum allowed (1000000.00)")]
    TooLarge,
}

/// Round to 2 decimal places and normalize the scale to exactly 2
pub fn round_money(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(DECIMAL_PLACES);
    rounded
}

/// price × quantity, rounded
pub fn line_total(price: Decimal, quantity: i32) -> Decimal {
    round_money(price * Decimal::from(quantity))
}

/// Σ(price × quantity) over `(price, quantity)` lines, rounded once at the end
pub fn order_total<I>(lines: I) -> Decimal
where
    I: IntoIterator<Item = (Decimal, i32)>,
{
    let sum = lines
        .into_iter()
        .fold(Decimal::ZERO, |acc, (price, qty)| acc + price * Decimal::from(qty));
    round_money(sum)
}

/// Validate a catalog price and normalize its scale to 2
pub fn validate_price(price: Decimal) -> Result<Decimal, PriceError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(PriceError::Negative);
    }
    if price.normalize().scale() > DECIMAL_PLACES {
        return Err(PriceError::TooPrecise);
    }
    if price > MAX_PRICE {
        return Err(PriceError::TooLarge);
    }
    Ok(round_money(price))
}

/// Render as `12.00`
pub fn format_money(value: Decimal) -> String {
    round_money(value).to_string()
}
