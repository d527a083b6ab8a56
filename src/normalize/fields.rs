//! Field extraction helpers tolerant of named and positional encodings

use num_bigint::BigUint;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

/// Look up an argument by name first, then by position.
pub fn arg<'a>(args: &'a Value, name: &str, index: usize) -> Option<&'a Value> {
    args.get(name)
        .or_else(|| args.get(index))
        .filter(|v| !v.is_null())
}

/// First non-null field among `names`
pub fn first_of<'a>(obj: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| obj.get(*name).filter(|v| !v.is_null()))
}

/// Whether `s` is a plain decimal literal (`-?\d+(\.\d+)?`)
pub fn is_decimal_literal(s: &str) -> bool {
    let unsigned = s.strip_prefix('-').unwrap_or(s);
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };
    let digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
    digits(int_part) && frac_part.map_or(true, digits)
}

/// Render a hex string (`0x`-prefixed) as an unsigned decimal string
pub fn hex_to_decimal(hex: &str) -> Option<String> {
    let digits = hex.strip_prefix("0x").or_else(|| hex.strip_prefix("0X"))?;
    if digits.is_empty() {
        return None;
    }
    BigUint::parse_bytes(digits.as_bytes(), 16).map(|n| n.to_string())
}

/// Extract a numeric field as a decimal string without going through floats.
///
/// Accepts decimal strings (kept verbatim), `0x` hex strings and JSON
/// numbers. Anything else yields `None`.
pub fn decimal_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if s.starts_with("0x") || s.starts_with("0X") {
                hex_to_decimal(s)
            } else if is_decimal_literal(s) {
                Some(s.to_string())
            } else {
                None
            }
        }
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else {
                let repr = n.to_string();
                Decimal::from_str(&repr)
                    .or_else(|_| Decimal::from_scientific(&repr))
                    .ok()
                    .map(|d| d.normalize().to_string())
            }
        }
        _ => None,
    }
}

/// Extract a Unix timestamp in seconds
pub fn unix_seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite())
                .map(|f| f.floor() as i64)
        }),
        Value::String(s) => {
            let s = s.trim();
            if let Some(digits) = s.strip_prefix("0x") {
                i64::from_str_radix(digits, 16).ok()
            } else {
                s.parse::<i64>().ok()
            }
        }
        _ => None,
    }
}

/// Extract a non-negative integer quantity (hex string or JSON integer)
pub fn quantity(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => match s.strip_prefix("0x") {
            Some(digits) => u64::from_str_radix(digits, 16).ok(),
            None => s.parse().ok(),
        },
        _ => None,
    }
}

/// Render an identifier-like field (string or number) as a string
pub fn identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Split ABI-encoded log data into 32-byte words rendered as decimal strings
pub fn decode_words(data: &str) -> Value {
    let digits = data.strip_prefix("0x").unwrap_or(data);
    let words = digits
        .as_bytes()
        .chunks(64)
        .filter(|chunk| chunk.len() == 64)
        .map(|chunk| {
            BigUint::parse_bytes(chunk, 16)
                .map(|n| Value::String(n.to_string()))
                .unwrap_or(Value::Null)
        })
        .collect();
    Value::Array(words)
}
