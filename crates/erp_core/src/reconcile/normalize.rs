//! Decimal normalizer.
//!
//! Storage returns fixed-point columns as strings while clients usually send
//! JSON numbers. Both sides are coerced to one canonical number before any
//! comparison.

use crate::model::schema::EntityKind;
use crate::model::Record;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};

static DECIMAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?$").expect("valid decimal regex")
});

/// Returns a copy of `record` with every declared decimal path canonicalized.
///
/// Paths are dot-separated; an array met along a path applies the rest of the
/// path to each element.
///
/// Rules per value:
/// - `null` stays `null`.
/// - finite numeric strings become numbers.
/// - numbers are re-encoded in canonical float form (`5`, `5.0`, `"5"` agree).
/// - anything else is left untouched.
pub fn normalize(record: &Record, decimal_paths: &[&str]) -> Record {
    let mut normalized = record.clone();
    for path in decimal_paths {
        let segments: Vec<&str> = path.split('.').collect();
        normalize_in_record(&mut normalized, &segments);
    }
    normalized
}

/// Canonicalizes the decimal and integer columns of one entity row.
///
/// Integer columns accept integral floats (`10.0`) on write; they are
/// re-encoded as plain integers so they compare equal to stored values.
pub fn normalize_for(kind: EntityKind, record: &Record) -> Record {
    let schema = kind.schema();
    let mut normalized = normalize(record, &schema.decimal_fields());
    for field in schema.integer_fields() {
        if let Some(value) = normalized.get_mut(field) {
            if let Some(integral) = canonical_integer(value) {
                *value = integral;
            }
        }
    }
    normalized
}

/// Reads a decimal-like value as `f64`, accepting numbers and numeric strings.
pub fn decimal_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64().filter(|parsed| parsed.is_finite()),
        Value::String(text) => {
            let trimmed = text.trim();
            if !DECIMAL_RE.is_match(trimmed) {
                return None;
            }
            trimmed
                .parse::<f64>()
                .ok()
                .filter(|parsed| parsed.is_finite())
        }
        _ => None,
    }
}

fn normalize_in_record(record: &mut Record, segments: &[&str]) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if let Some(value) = record.get_mut(*head) {
        normalize_in_value(value, rest);
    }
}

fn normalize_in_value(value: &mut Value, rest: &[&str]) {
    if let Value::Array(items) = value {
        for item in items {
            normalize_in_value(item, rest);
        }
        return;
    }

    if rest.is_empty() {
        if let Some(canonical) = canonical_decimal(value) {
            *value = canonical;
        }
        return;
    }

    if let Value::Object(map) = value {
        normalize_in_record(map, rest);
    }
}

fn canonical_decimal(value: &Value) -> Option<Value> {
    decimal_value(value)
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn canonical_integer(value: &Value) -> Option<Value> {
    let Value::Number(number) = value else {
        return None;
    };
    if number.is_i64() || number.is_u64() {
        return None;
    }
    number
        .as_f64()
        .filter(|parsed| parsed.is_finite() && parsed.fract() == 0.0)
        .filter(|parsed| parsed.abs() < 9.0e15)
        .map(|parsed| Value::from(parsed as i64))
}

#[cfg(test)]
mod tests {
    use super::{decimal_value, normalize, normalize_for};
    use crate::model::schema::EntityKind;
    use crate::model::Record;
    use serde_json::{json, Value};

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn string_and_number_decimals_normalize_to_the_same_value() {
        let stored = normalize(&record(json!({ "sale_price": "19.99" })), &["sale_price"]);
        let sent = normalize(&record(json!({ "sale_price": 19.99 })), &["sale_price"]);
        assert_eq!(stored, sent);

        let integral = normalize(&record(json!({ "qty": 5 })), &["qty"]);
        let textual = normalize(&record(json!({ "qty": "5.000" })), &["qty"]);
        assert_eq!(integral, textual);
    }

    #[test]
    fn null_and_non_numeric_values_are_left_untouched() {
        let source = record(json!({
            "min_stock": null,
            "sale_price": "n/a",
            "cost_price": true,
            "weird": "inf"
        }));
        let normalized = normalize(&source, &["min_stock", "sale_price", "cost_price", "weird"]);
        assert_eq!(normalized, source);
    }

    #[test]
    fn undeclared_fields_keep_their_representation() {
        let source = record(json!({ "sku": "0042", "price": "1.50" }));
        let normalized = normalize(&source, &["price"]);
        assert_eq!(normalized["sku"], json!("0042"));
        assert_eq!(normalized["price"], json!(1.5));
    }

    #[test]
    fn nested_paths_walk_objects_and_arrays() {
        let source = record(json!({
            "lines": [{ "amount": "2.5" }, { "amount": 3 }, { "amount": null }],
            "totals": { "net": "10" }
        }));
        let normalized = normalize(&source, &["lines.amount", "totals.net", "missing.path"]);
        assert_eq!(
            normalized["lines"],
            json!([{ "amount": 2.5 }, { "amount": 3.0 }, { "amount": null }])
        );
        assert_eq!(normalized["totals"], json!({ "net": 10.0 }));
    }

    #[test]
    fn normalization_is_a_fixed_point() {
        let source = record(json!({
            "sale_price": " 7.10 ",
            "cost_price": 3,
            "min_stock": null,
            "name": "Desk"
        }));
        let paths = ["sale_price", "cost_price", "min_stock"];
        let once = normalize(&source, &paths);
        let twice = normalize(&once, &paths);
        assert_eq!(once, twice);
    }

    #[test]
    fn integral_floats_in_integer_columns_become_integers() {
        let source = record(json!({
            "min_quantity": 10.0,
            "max_quantity": 12.5,
            "unit_price": "4.00"
        }));
        let normalized = normalize_for(EntityKind::DiscountRange, &source);
        assert_eq!(normalized["min_quantity"], json!(10));
        assert_eq!(normalized["max_quantity"], json!(12.5));
        assert_eq!(normalized["unit_price"], json!(4.0));
    }

    #[test]
    fn decimal_value_rejects_non_finite_and_garbage() {
        assert_eq!(decimal_value(&json!("12.5")), Some(12.5));
        assert_eq!(decimal_value(&json!("-0.25")), Some(-0.25));
        assert_eq!(decimal_value(&json!("NaN")), None);
        assert_eq!(decimal_value(&json!("1,5")), None);
        assert_eq!(decimal_value(&json!("1e999")), None);
        assert_eq!(decimal_value(&json!(null)), None);
    }
}
