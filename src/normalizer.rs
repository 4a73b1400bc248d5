// src/normalizer.rs
//
// The vendor's price block is loosely shaped: `price`, `old_price` and
// `marketing_price` may each be a number, a numeric string, null or absent.
// Nothing past this module sees that ambiguity.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedPrice {
    pub buyer_price: i64,
    pub old_price: i64,
    pub discount_percent: i64,
}

/// Parses one price field to a whole integer, rounding to nearest.
/// Absence, null or an unparseable value all coerce to 0.
fn parse_amount(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse::<f64>().map(|f| f.round() as i64).unwrap_or(0),
        _ => 0,
    }
}

/// Extracts the canonical buyer price from a raw vendor price block.
///
/// The marketing (discounted) price wins when it is a positive amount,
/// otherwise the regular price is used. A zero buyer price means "unknown",
/// not a free item; callers exclude such records from change detection.
pub fn normalize_price(raw: &Value) -> NormalizedPrice {
    let regular = parse_amount(raw.get("price"));
    let old_price = parse_amount(raw.get("old_price"));
    let marketing = parse_amount(raw.get("marketing_price"));

    let buyer_price = if marketing > 0 { marketing } else { regular };

    let discount = if old_price > 0 && buyer_price > 0 {
        (old_price - buyer_price).max(0)
    } else {
        0
    };
    let discount_percent = if old_price > 0 {
        ((discount as f64) * 100.0 / (old_price as f64)).round() as i64
    } else {
        0
    };

    NormalizedPrice {
        buyer_price,
        old_price,
        discount_percent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_marketing_price_preferred() {
        let raw = json!({"price": 100, "old_price": 150, "marketing_price": 90});
        let n = normalize_price(&raw);
        assert_eq!(n.buyer_price, 90);
        assert_eq!(n.old_price, 150);
        assert_eq!(n.discount_percent, 40);
    }

    #[test]
    fn test_fallback_to_regular_price() {
        let raw = json!({"price": 100, "marketing_price": 0});
        assert_eq!(normalize_price(&raw).buyer_price, 100);

        let raw = json!({"price": 100});
        assert_eq!(normalize_price(&raw).buyer_price, 100);
    }

    #[test]
    fn test_numeric_strings_are_parsed_and_rounded() {
        let raw = json!({"price": "1099.90", "old_price": "1500", "marketing_price": ""});
        let n = normalize_price(&raw);
        assert_eq!(n.buyer_price, 1100);
        assert_eq!(n.old_price, 1500);
    }

    #[test]
    fn test_all_zero_input() {
        let raw = json!({});
        assert_eq!(
            normalize_price(&raw),
            NormalizedPrice {
                buyer_price: 0,
                old_price: 0,
                discount_percent: 0
            }
        );
    }

    #[test]
    fn test_garbage_fields_coerce_to_zero() {
        let raw = json!({"price": "n/a", "old_price": null, "marketing_price": {"amount": 5}});
        let n = normalize_price(&raw);
        assert_eq!(n.buyer_price, 0);
        assert_eq!(n.old_price, 0);
        assert_eq!(n.discount_percent, 0);
    }

    #[test]
    fn test_discount_percent_bounds() {
        // old_price below buyer price clamps the discount at zero
        let raw = json!({"price": 200, "old_price": 150});
        let n = normalize_price(&raw);
        assert_eq!(n.discount_percent, 0);

        // full discount caps at 100
        let raw = json!({"price": 1, "old_price": 1000});
        let n = normalize_price(&raw);
        assert!(n.discount_percent <= 100);
        assert_eq!(n.discount_percent, 100);
    }

    #[test]
    fn test_no_discount_without_old_price() {
        let raw = json!({"price": 100, "old_price": 0, "marketing_price": 80});
        assert_eq!(normalize_price(&raw).discount_percent, 0);
    }
}
