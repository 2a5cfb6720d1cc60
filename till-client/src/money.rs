//! Money calculation utilities using rust_decimal for precision
//!
//! All arithmetic runs on `Decimal`; results are converted back to `f64`
//! for the models. Line totals are always derived from quantity x unit
//! price, and order totals from summing line totals, never from deltas.

use rust_decimal::prelude::*;
use shared::models::OrderItem;

use crate::{ClientError, ClientResult};

/// Monetary values carry 2 decimal places
const DECIMAL_PLACES: u32 = 2;

/// Quantities carry 3 decimal places (whole grams for weighed lines)
const QUANTITY_PLACES: u32 = 3;

/// Tolerance for monetary comparisons (0.01)
pub const MONEY_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

const GRAMS_PER_KG: Decimal = Decimal::from_parts(1000, 0, 0, false, 0);

/// Maximum allowed unit price
const MAX_PRICE: f64 = 1_000_000.0;
/// Maximum allowed quantity per line
const MAX_QUANTITY: f64 = 9999.0;
/// Maximum allowed single payment
const MAX_PAYMENT_AMOUNT: f64 = 1_000_000.0;

/// Validate that a f64 value is finite (not NaN, not Infinity)
#[inline]
pub fn require_finite(value: f64, field_name: &str) -> ClientResult<()> {
    if !value.is_finite() {
        return Err(ClientError::Validation(format!(
            "{} must be a finite number, got {}",
            field_name, value
        )));
    }
    Ok(())
}

/// Price must be finite, positive and within bounds
pub fn validate_price(price: f64, field_name: &str) -> ClientResult<()> {
    require_finite(price, field_name)?;
    if price <= 0.0 {
        return Err(ClientError::Validation(format!(
            "{} must be positive, got {}",
            field_name, price
        )));
    }
    if price > MAX_PRICE {
        return Err(ClientError::Validation(format!(
            "{} exceeds maximum allowed ({}), got {}",
            field_name, MAX_PRICE, price
        )));
    }
    Ok(())
}

/// Quantity must be finite, positive and within bounds
pub fn validate_quantity(quantity: f64) -> ClientResult<()> {
    require_finite(quantity, "quantity")?;
    if quantity <= 0.0 {
        return Err(ClientError::Validation(format!(
            "quantity must be positive, got {}",
            quantity
        )));
    }
    if quantity > MAX_QUANTITY {
        return Err(ClientError::Validation(format!(
            "quantity exceeds maximum allowed ({}), got {}",
            MAX_QUANTITY, quantity
        )));
    }
    Ok(())
}

/// Payment amount must be finite, positive and within bounds
pub fn validate_payment_amount(amount: f64) -> ClientResult<()> {
    require_finite(amount, "payment amount")?;
    if amount <= 0.0 {
        return Err(ClientError::Validation(format!(
            "payment amount must be positive, got {}",
            amount
        )));
    }
    if amount > MAX_PAYMENT_AMOUNT {
        return Err(ClientError::Validation(format!(
            "payment amount exceeds maximum allowed ({}), got {}",
            MAX_PAYMENT_AMOUNT, amount
        )));
    }
    Ok(())
}

/// Convert f64 to Decimal for calculation
#[inline]
pub fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

/// Convert Decimal back to f64 for storage, rounded to 2 decimal places
#[inline]
pub fn to_f64(value: Decimal) -> f64 {
    value
        .round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or_default()
}

/// Round a quantity to 3 decimal places
#[inline]
pub fn round_quantity(quantity: f64) -> f64 {
    to_decimal(quantity)
        .round_dp_with_strategy(QUANTITY_PLACES, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or_default()
}

/// Scale reading in grams to the canonical kilogram quantity
pub fn grams_to_kg(grams: f64) -> f64 {
    round_quantity(
        (to_decimal(grams) / GRAMS_PER_KG)
            .to_f64()
            .unwrap_or_default(),
    )
}

/// quantity x unit price
pub fn line_total(quantity: f64, unit_price: f64) -> f64 {
    to_f64(to_decimal(quantity) * to_decimal(unit_price))
}

/// Sum of line totals, each re-derived from its quantity and unit price
pub fn items_total(items: &[OrderItem]) -> f64 {
    let sum: Decimal = items
        .iter()
        .map(|item| to_decimal(line_total(item.quantity, item.unit_price)))
        .sum();
    to_f64(sum)
}

/// Sum of arbitrary amounts
pub fn sum_amounts(amounts: impl IntoIterator<Item = f64>) -> f64 {
    let sum: Decimal = amounts.into_iter().map(to_decimal).sum();
    to_f64(sum)
}

/// Balance left to collect, never negative
pub fn remaining(total: f64, collected: f64) -> f64 {
    to_f64((to_decimal(total) - to_decimal(collected)).max(Decimal::ZERO))
}

/// Collected covers the total within [`MONEY_TOLERANCE`]
pub fn is_fully_paid(total: f64, collected: f64) -> bool {
    to_decimal(collected) >= to_decimal(total) - MONEY_TOLERANCE
}

/// Two amounts differ by less than [`MONEY_TOLERANCE`]
pub fn amounts_match(a: f64, b: f64) -> bool {
    (to_decimal(a) - to_decimal(b)).abs() < MONEY_TOLERANCE
}
