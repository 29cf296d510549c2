use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

/// Best-effort conversion of infobox number text to a non-negative decimal.
///
/// Total by construction: thousands separators are stripped, anything that
/// still fails to parse (empty, non-numeric residue, non-finite, negative)
/// comes back as `0`. Callers treat `0` as "unknown", not as a measured zero.
pub fn coerce(raw: &str) -> Decimal {
    let cleaned = raw.replace(',', "");
    let Ok(value) = cleaned.trim().parse::<f64>() else {
        return Decimal::ZERO;
    };
    if !value.is_finite() || value < 0.0 {
        return Decimal::ZERO;
    }
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

pub fn coerce_opt(raw: Option<&str>) -> Decimal {
    raw.map(coerce).unwrap_or(Decimal::ZERO)
}
