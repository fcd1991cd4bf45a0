//! Money helpers
//!
//! Amounts are `Decimal` values carrying at most [`MONEY_SCALE`] fractional
//! digits. Proportional splits drop to integer minor units so that no
//! rounding residue can appear or vanish.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Number of minor-unit digits (cents)
pub const MONEY_SCALE: u32 = 2;

/// Minor units per major unit
const MINOR_PER_MAJOR: i64 = 100;

/// True when `value` needs no more than [`MONEY_SCALE`] fractional digits
pub fn is_money(value: Decimal) -> bool {
    value.normalize().scale() <= MONEY_SCALE
}

/// True when `value` is a positive, representable money amount
pub fn is_positive_money(value: Decimal) -> bool {
    value > Decimal::ZERO && is_money(value)
}

/// Convert to integer minor units
///
/// Returns `None` for amounts with sub-cent precision or that overflow.
pub fn to_minor_units(value: Decimal) -> Option<i128> {
    if !is_money(value) {
        return None;
    }
    value
        .checked_mul(Decimal::from(MINOR_PER_MAJOR))?
        .trunc()
        .to_i128()
}

/// Convert integer minor units back to a money amount
pub fn from_minor_units(units: i128) -> Option<Decimal> {
    let units = i64::try_from(units).ok()?;
    Some(Decimal::new(units, MONEY_SCALE))
}

/// Truncate toward zero at cent precision
pub fn truncate_to_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::ToZero)
}
