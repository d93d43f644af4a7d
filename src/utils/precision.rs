// src/utils/precision.rs
use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds a reported price to `scale` fractional digits, half away from zero.
/// Пример: price=109.9000004, scale=6 -> 109.900000
pub fn normalize_price(price: Decimal, scale: u32) -> Decimal {
    price.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

/// Same rounding rule for percentages, usually with `scale = 2`.
pub fn normalize_percent(pct: Decimal, scale: u32) -> Decimal {
    pct.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

/// `(exit - reference) / reference * 100`, unrounded.
/// Returns `None` for a non-positive reference instead of dividing by zero.
pub fn pnl_percent(reference: Decimal, exit: Decimal) -> Option<Decimal> {
    if reference <= Decimal::ZERO {
        return None;
    }
    let ratio = (exit - reference).checked_div(reference)?;
    ratio.checked_mul(Decimal::ONE_HUNDRED)
}

/// Trailing-stop trigger level: `peak * (1 - drop_fraction)`.
pub fn trailing_level(peak: Decimal, drop_fraction: Decimal) -> Decimal {
    peak * (Decimal::ONE - drop_fraction)
}
