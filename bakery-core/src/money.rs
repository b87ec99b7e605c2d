//! Monetary helpers shared by every ledger computation.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Number of decimal places kept on stored amounts.
pub const MONEY_DP: u32 = 2;

/// Round an amount to cents, halves away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Read a loosely typed JSON value as an amount.
///
/// Numbers and numeric strings are accepted. Anything else, including `null`,
/// empty strings, and non-finite values, reads as zero.
pub fn decimal_from_json(value: &Value) -> Decimal {
    lenient_decimal(value).unwrap_or(Decimal::ZERO)
}

/// Like [`decimal_from_json`] but distinguishes an absent or unusable value.
pub fn lenient_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(number) => {
            let text = number.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                None
            } else {
                Decimal::from_str(trimmed).ok()
            }
        }
        _ => None,
    }
}

/// Serde adapter that coerces malformed amounts to zero instead of failing.
pub fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map(decimal_from_json).unwrap_or(Decimal::ZERO))
}
