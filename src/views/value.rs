//! Loose value semantics for template evaluation
//!
//! Template data is plain `serde_json::Value`. These helpers give it the
//! conversions templates expect: `true` prints as `1`, `null` and `false` print
//! as nothing, numeric strings compare as numbers, integer arithmetic stays
//! integral until it overflows.

use crate::error::{Error, Result};
use crate::views::ast::BinaryOperator;
use serde_json::{Map, Number as JsonNumber, Value};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Number::Int(i) => Value::from(i),
            Number::Float(f) => JsonNumber::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        }
    }
}

/// String form used for output and concatenation
pub fn to_display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.to_string(),
            None => match n.as_u64() {
                Some(u) => u.to_string(),
                None => format_float(n.as_f64().unwrap_or(0.0)),
            },
        },
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => "Array".to_string(),
    }
}

/// Floats print with 14 significant digits and without a trailing `.0`
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "NAN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "INF" } else { "-INF" }.to_string();
    }
    if f.fract() == 0.0 && f.abs() < 1e15 {
        return format!("{}", f as i64);
    }
    let rounded: f64 = format!("{:.13e}", f).parse().unwrap_or(f);
    rounded.to_string()
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !(s.is_empty() || s == "0"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Parse a string that is entirely numeric (surrounding whitespace allowed)
pub fn numeric_string(s: &str) -> Option<Number> {
    let trimmed = s.trim();
    if trimmed.is_empty()
        || !trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        return None;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(Number::Int(i));
    }
    trimmed.parse::<f64>().ok().map(Number::Float)
}

/// Leading numeric prefix of a string, as arithmetic on strings uses it
fn leading_number(s: &str) -> Number {
    let trimmed = s.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in trimmed.char_indices() {
        let accepted = c.is_ascii_digit()
            || (i == 0 && (c == '-' || c == '+'))
            || (c == '.' && !seen_dot);
        if !accepted {
            break;
        }
        seen_dot |= c == '.';
        end = i + c.len_utf8();
    }
    numeric_string(&trimmed[..end]).unwrap_or(Number::Int(0))
}

pub fn to_number(value: &Value) -> Result<Number> {
    match value {
        Value::Null => Ok(Number::Int(0)),
        Value::Bool(b) => Ok(Number::Int(i64::from(*b))),
        Value::Number(n) => Ok(match n.as_i64() {
            Some(i) => Number::Int(i),
            None => Number::Float(n.as_f64().unwrap_or(0.0)),
        }),
        Value::String(s) => Ok(numeric_string(s).unwrap_or_else(|| leading_number(s))),
        Value::Array(_) | Value::Object(_) => {
            Err(Error::template("Unsupported operand types: array"))
        }
    }
}

pub fn to_i64(value: &Value) -> i64 {
    match to_number(value) {
        Ok(Number::Int(i)) => i,
        Ok(Number::Float(f)) => f as i64,
        Err(_) => 0,
    }
}

pub fn to_f64(value: &Value) -> f64 {
    to_number(value).map(Number::as_f64).unwrap_or(0.0)
}

/// Number of elements: arrays and objects by length, null as zero, scalars as one
pub fn count(value: &Value) -> usize {
    match value {
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        Value::Null => 0,
        _ => 1,
    }
}

/// Evaluate an arithmetic operator
pub fn arithmetic(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value> {
    if op == BinaryOperator::Add {
        if let Some(union) = array_union(left, right) {
            return Ok(union);
        }
    }

    let l = to_number(left)?;
    let r = to_number(right)?;

    let result = match (op, l, r) {
        (BinaryOperator::Add, Number::Int(a), Number::Int(b)) => a
            .checked_add(b)
            .map(Number::Int)
            .unwrap_or(Number::Float(a as f64 + b as f64)),
        (BinaryOperator::Subtract, Number::Int(a), Number::Int(b)) => a
            .checked_sub(b)
            .map(Number::Int)
            .unwrap_or(Number::Float(a as f64 - b as f64)),
        (BinaryOperator::Multiply, Number::Int(a), Number::Int(b)) => a
            .checked_mul(b)
            .map(Number::Int)
            .unwrap_or(Number::Float(a as f64 * b as f64)),
        (BinaryOperator::Add, a, b) => Number::Float(a.as_f64() + b.as_f64()),
        (BinaryOperator::Subtract, a, b) => Number::Float(a.as_f64() - b.as_f64()),
        (BinaryOperator::Multiply, a, b) => Number::Float(a.as_f64() * b.as_f64()),
        (BinaryOperator::Divide, a, b) => {
            if b.as_f64() == 0.0 {
                return Err(Error::template("Division by zero"));
            }
            match (a, b) {
                (Number::Int(x), Number::Int(y)) if x.checked_rem(y) == Some(0) => {
                    x.checked_div(y).map(Number::Int).unwrap_or(Number::Float(x as f64 / y as f64))
                }
                _ => Number::Float(a.as_f64() / b.as_f64()),
            }
        }
        (BinaryOperator::Modulo, a, b) => {
            let divisor = match b {
                Number::Int(y) => y,
                Number::Float(y) => y as i64,
            };
            if divisor == 0 {
                return Err(Error::template("Modulo by zero"));
            }
            let dividend = match a {
                Number::Int(x) => x,
                Number::Float(x) => x as i64,
            };
            Number::Int(dividend.wrapping_rem(divisor))
        }
        (other, _, _) => {
            return Err(Error::internal(format!(
                "{:?} is not an arithmetic operator",
                other
            )))
        }
    };

    Ok(result.into_value())
}

/// `array + array` keeps the left entries and adds missing keys from the right
fn array_union(left: &Value, right: &Value) -> Option<Value> {
    match (left, right) {
        (Value::Array(a), Value::Array(b)) => {
            let mut merged = a.clone();
            merged.extend(b.iter().skip(a.len()).cloned());
            Some(Value::Array(merged))
        }
        (Value::Object(a), Value::Object(b)) => {
            let mut merged = a.clone();
            for (key, value) in b {
                if !merged.contains_key(key) {
                    merged.insert(key.clone(), value.clone());
                }
            }
            Some(Value::Object(merged))
        }
        _ => None,
    }
}

/// `==` comparison
pub fn loose_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Bool(_), _) | (_, Value::Bool(_)) => is_truthy(left) == is_truthy(right),
        (Value::Null, Value::Null) => true,
        (Value::Null, Value::String(s)) | (Value::String(s), Value::Null) => s.is_empty(),
        (Value::Null, other) | (other, Value::Null) => !is_truthy(other),
        (Value::Number(_), Value::Number(_)) => to_f64(left) == to_f64(right),
        (Value::Number(_), Value::String(s)) | (Value::String(s), Value::Number(_)) => {
            let number = if matches!(left, Value::Number(_)) { left } else { right };
            match numeric_string(s) {
                Some(n) => n.as_f64() == to_f64(number),
                None => to_display(number) == *s,
            }
        }
        (Value::String(a), Value::String(b)) => match (numeric_string(a), numeric_string(b)) {
            (Some(x), Some(y)) => x.as_f64() == y.as_f64(),
            _ => a == b,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| loose_equals(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(k, v)| b.get(k).map_or(false, |other| loose_equals(v, other)))
        }
        _ => false,
    }
}

/// Ordering used by `<`, `<=`, `>` and `>=`
pub fn compare(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::String(a), Value::String(b)) => match (numeric_string(a), numeric_string(b)) {
            (Some(x), Some(y)) => x.as_f64().partial_cmp(&y.as_f64()).unwrap_or(Ordering::Equal),
            _ => a.cmp(b),
        },
        (Value::Bool(_), _) | (_, Value::Bool(_)) | (Value::Null, _) | (_, Value::Null) => {
            is_truthy(left).cmp(&is_truthy(right))
        }
        (Value::Array(_), _) | (Value::Object(_), _) | (_, Value::Array(_)) | (_, Value::Object(_)) => {
            count(left).cmp(&count(right))
        }
        _ => to_f64(left)
            .partial_cmp(&to_f64(right))
            .unwrap_or(Ordering::Equal),
    }
}

/// Read `key` from an array or object; anything missing is null
pub fn lookup(container: &Value, key: &Value) -> Value {
    match container {
        Value::Object(map) => map.get(&to_display(key)).cloned().unwrap_or(Value::Null),
        Value::Array(items) => index_of(key)
            .and_then(|i| items.get(i))
            .cloned()
            .unwrap_or(Value::Null),
        Value::String(s) => index_of(key)
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Array position for a key, if the key is a non-negative integer
pub fn index_of(key: &Value) -> Option<usize> {
    match key {
        Value::Number(n) => n.as_u64().map(|u| u as usize),
        Value::String(s) => s.parse::<usize>().ok(),
        Value::Bool(b) => Some(usize::from(*b)),
        _ => None,
    }
}

/// Build a value from `[key => value]` pairs
///
/// Entries without keys get the next integer index. A literal made only of
/// sequential integer keys stays a JSON array, anything else becomes an object.
pub fn build_array(entries: Vec<(Option<Value>, Value)>) -> Value {
    let sequential = entries
        .iter()
        .enumerate()
        .all(|(i, (key, _))| key.as_ref().map_or(true, |k| index_of(k) == Some(i)));

    if sequential {
        return Value::Array(entries.into_iter().map(|(_, v)| v).collect());
    }

    let mut map = Map::new();
    let mut next_index: i64 = 0;
    for (key, value) in entries {
        let key = match key {
            Some(k) => {
                let text = to_display(&k);
                if let Ok(i) = text.parse::<i64>() {
                    next_index = next_index.max(i + 1);
                }
                text
            }
            None => {
                let text = next_index.to_string();
                next_index += 1;
                text
            }
        };
        map.insert(key, value);
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display() {
        assert_eq!(to_display(&json!(true)), "1");
        assert_eq!(to_display(&json!(false)), "");
        assert_eq!(to_display(&Value::Null), "");
        assert_eq!(to_display(&json!(3.0)), "3");
        assert_eq!(to_display(&json!(0.1 + 0.2)), "0.3");
        assert_eq!(to_display(&json!([1])), "Array");
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!("0")));
        assert!(!is_truthy(&json!([])));
        assert!(is_truthy(&json!("0.0")));
        assert!(is_truthy(&json!({"a": 1})));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(arithmetic(BinaryOperator::Add, &json!(1), &json!("2")).unwrap(), json!(3));
        assert_eq!(arithmetic(BinaryOperator::Divide, &json!(6), &json!(3)).unwrap(), json!(2));
        assert_eq!(arithmetic(BinaryOperator::Divide, &json!(7), &json!(2)).unwrap(), json!(3.5));
        assert_eq!(arithmetic(BinaryOperator::Modulo, &json!(7), &json!(3)).unwrap(), json!(1));
        assert!(arithmetic(BinaryOperator::Divide, &json!(1), &json!(0)).is_err());
        assert_eq!(
            arithmetic(BinaryOperator::Add, &json!([1, 2]), &json!([9, 9, 3])).unwrap(),
            json!([1, 2, 3])
        );
    }

    #[test]
    fn test_loose_equality() {
        assert!(loose_equals(&json!(1), &json!("1")));
        assert!(loose_equals(&json!("1e1"), &json!("10")));
        assert!(loose_equals(&Value::Null, &json!("")));
        assert!(loose_equals(&Value::Null, &json!(0)));
        assert!(!loose_equals(&json!("abc"), &json!(0)));
        assert!(loose_equals(&json!(true), &json!("yes")));
    }

    #[test]
    fn test_compare() {
        assert_eq!(compare(&json!("10"), &json!("9")), Ordering::Greater);
        assert_eq!(compare(&json!("apple"), &json!("banana")), Ordering::Less);
        assert_eq!(compare(&json!(2), &json!(2.5)), Ordering::Less);
    }

    #[test]
    fn test_build_array() {
        let list = build_array(vec![(None, json!("a")), (None, json!("b"))]);
        assert_eq!(list, json!(["a", "b"]));

        let map = build_array(vec![(Some(json!("k")), json!(1)), (None, json!(2))]);
        assert_eq!(map, json!({"k": 1, "0": 2}));
    }

    #[test]
    fn test_lookup() {
        let data = json!({"user": {"name": "Ada"}, "list": [10, 20]});
        assert_eq!(lookup(&data["list"], &json!(1)), json!(20));
        assert_eq!(lookup(&data["user"], &json!("missing")), Value::Null);
        assert_eq!(lookup(&json!(5), &json!("x")), Value::Null);
    }
}
