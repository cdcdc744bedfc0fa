use bigdecimal::{BigDecimal, ToPrimitive};
use std::str::FromStr;

/// Shift a raw smallest-unit amount into whole token units (e.g. 1_000_000 → 1.0 at 6 decimals).
/// The result is exact; no float rounding happens here.
pub fn normalize_amount(raw: u128, decimals: u32) -> BigDecimal {
    let scaled = format!("{}e-{}", raw, decimals);
    // A formatted u128 with an exponent always parses
    BigDecimal::from_str(&scaled).unwrap_or_else(|_| BigDecimal::from(0))
}

/// Reverse of [`normalize_amount`]. Returns `None` if the amount has a fractional
/// smallest-unit part or does not fit in a `u128`.
pub fn denormalize_amount(amount: &BigDecimal, decimals: u32) -> Option<u128> {
    let multiplier = BigDecimal::from_str(&format!("1e{}", decimals)).ok()?;
    let raw = amount * multiplier;
    let whole = raw.with_scale(0);
    if whole != raw {
        return None;
    }
    let (digits, _) = whole.into_bigint_and_exponent();
    digits.to_string().parse().ok()
}

/// Lossy conversion used when an amount enters the model.
pub fn to_f64(amount: &BigDecimal) -> f64 {
    amount.to_f64().unwrap_or(f64::MAX)
}
