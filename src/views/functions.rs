//! Functions callable from template expressions
//!
//! Every function takes evaluated arguments and returns a value. Applications
//! can add their own through [`FunctionRegistry::register`].

use crate::error::{Error, Result};
use crate::security::HtmlEscaper;
use crate::views::datetime;
use crate::views::value::{self, Number};
use chrono::TimeZone;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::Arc;

pub type TemplateFunction = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// Named template functions, shared by every render of one engine
pub struct FunctionRegistry {
    functions: DashMap<String, TemplateFunction>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistry {
    /// Registry with the built-in function set
    pub fn new() -> Self {
        let registry = Self {
            functions: DashMap::new(),
        };
        registry.register_builtins();
        registry
    }

    /// Add or replace a function
    pub fn register<F>(&self, name: &str, function: F)
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Arc::new(function));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        let function = self
            .functions
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::template(format!("Call to undefined function {}()", name)))?;
        function(args)
    }

    fn register_builtins(&self) {
        self.register("isset", |args| {
            Ok(Value::Bool(!args.is_empty() && args.iter().all(|v| !v.is_null())))
        });
        self.register("empty", |args| Ok(Value::Bool(!value::is_truthy(arg(args, 0)))));
        self.register("count", |args| Ok(json!(value::count(arg(args, 0)))));

        self.register("strtoupper", |args| Ok(json!(string_arg(args, 0).to_uppercase())));
        self.register("strtolower", |args| Ok(json!(string_arg(args, 0).to_lowercase())));
        self.register("ucfirst", |args| {
            let s = string_arg(args, 0);
            let mut chars = s.chars();
            Ok(json!(match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }))
        });
        self.register("trim", |args| {
            let s = string_arg(args, 0);
            Ok(json!(match args.get(1) {
                Some(chars) => {
                    let set: Vec<char> = value::to_display(chars).chars().collect();
                    s.trim_matches(|c| set.contains(&c)).to_string()
                }
                None => s.trim().to_string(),
            }))
        });
        self.register("strlen", |args| Ok(json!(string_arg(args, 0).len())));

        self.register("implode", |args| {
            let (glue, pieces) = match (args.first(), args.get(1)) {
                (Some(items @ (Value::Array(_) | Value::Object(_))), None) => (String::new(), items),
                (Some(glue), Some(items)) => (value::to_display(glue), items),
                _ => return Err(Error::template("implode() expects an array")),
            };
            let parts: Vec<String> = match pieces {
                Value::Array(items) => items.iter().map(value::to_display).collect(),
                Value::Object(map) => map.values().map(value::to_display).collect(),
                _ => return Err(Error::template("implode() expects an array")),
            };
            Ok(json!(parts.join(&glue)))
        });
        self.register("explode", |args| {
            let delimiter = string_arg(args, 0);
            if delimiter.is_empty() {
                return Err(Error::template("explode() separator cannot be empty"));
            }
            let subject = string_arg(args, 1);
            let parts: Vec<Value> = match args.get(2).map(value::to_i64) {
                Some(limit) if limit > 0 => subject
                    .splitn(limit as usize, delimiter.as_str())
                    .map(|p| json!(p))
                    .collect(),
                _ => subject.split(delimiter.as_str()).map(|p| json!(p)).collect(),
            };
            Ok(Value::Array(parts))
        });

        self.register("json_encode", |args| Ok(json!(serde_json::to_string(arg(args, 0))?)));
        self.register("number_format", |args| {
            let decimals = args.get(1).map(value::to_i64).unwrap_or(0).max(0) as usize;
            let point = args.get(2).map(value::to_display).unwrap_or_else(|| ".".into());
            let thousands = args.get(3).map(value::to_display).unwrap_or_else(|| ",".into());
            Ok(json!(number_format(
                value::to_f64(arg(args, 0)),
                decimals,
                &point,
                &thousands
            )))
        });
        self.register("date", |args| {
            let pattern = string_arg(args, 0);
            let now = datetime::now();
            let time = match args.get(1) {
                Some(ts) if !ts.is_null() => now
                    .offset()
                    .timestamp_opt(value::to_i64(ts), 0)
                    .single()
                    .ok_or_else(|| Error::template("date() received an invalid timestamp"))?,
                _ => now,
            };
            Ok(json!(datetime::format(&time, &pattern)))
        });

        self.register("in_array", |args| {
            let needle = arg(args, 0);
            let strict = args.get(2).map_or(false, value::is_truthy);
            let matches = |candidate: &Value| {
                if strict {
                    candidate == needle
                } else {
                    value::loose_equals(candidate, needle)
                }
            };
            Ok(Value::Bool(match arg(args, 1) {
                Value::Array(items) => items.iter().any(matches),
                Value::Object(map) => map.values().any(matches),
                _ => false,
            }))
        });
        self.register("array_keys", |args| {
            Ok(match arg(args, 0) {
                Value::Array(items) => Value::Array((0..items.len()).map(|i| json!(i)).collect()),
                Value::Object(map) => Value::Array(map.keys().map(|k| json!(k)).collect()),
                _ => Value::Array(Vec::new()),
            })
        });

        self.register("htmlspecialchars", |args| {
            Ok(json!(HtmlEscaper::escape(&string_arg(args, 0))))
        });
        self.register("nl2br", |args| Ok(json!(HtmlEscaper::nl2br(&string_arg(args, 0)))));
        self.register("str_replace", |args| {
            let search = string_arg(args, 0);
            let replace = string_arg(args, 1);
            let subject = string_arg(args, 2);
            if search.is_empty() {
                return Ok(json!(subject));
            }
            Ok(json!(subject.replace(&search, &replace)))
        });
        self.register("substr", |args| {
            let chars: Vec<char> = string_arg(args, 0).chars().collect();
            let len = chars.len() as i64;
            let mut start = args.get(1).map(value::to_i64).unwrap_or(0);
            if start < 0 {
                start = (len + start).max(0);
            }
            let start = start.min(len);
            let end = match args.get(2) {
                Some(l) if !l.is_null() => {
                    let l = value::to_i64(l);
                    if l < 0 {
                        (len + l).max(start)
                    } else {
                        (start + l).min(len)
                    }
                }
                _ => len,
            };
            Ok(json!(chars[start as usize..end as usize].iter().collect::<String>()))
        });
        self.register("round", |args| {
            let precision = args.get(1).map(value::to_i64).unwrap_or(0);
            let factor = 10f64.powi(precision as i32);
            let rounded = (value::to_f64(arg(args, 0)) * factor).round() / factor;
            Ok(Number::Float(rounded).into_value())
        });
        self.register("max", |args| extreme(args, std::cmp::Ordering::Greater));
        self.register("min", |args| extreme(args, std::cmp::Ordering::Less));

        self.register("maskEmail", |args| Ok(json!(mask_email(&string_arg(args, 0)))));
        self.register("maskPhoneNumber", |args| {
            Ok(json!(mask_phone_number(&string_arg(args, 0))))
        });
        self.register("slugify", |args| Ok(json!(slugify(&string_arg(args, 0)))));
        self.register("priceFormatter", |args| {
            let currency = args.get(1).map(value::to_display).unwrap_or_default();
            let before = args.get(2).map_or(true, value::is_truthy);
            let decimals = args.get(3).map(value::to_i64).unwrap_or(2).max(0) as usize;
            Ok(json!(price_formatter(
                value::to_f64(arg(args, 0)),
                &currency,
                before,
                decimals
            )))
        });
    }
}

static NULL: Value = Value::Null;

fn arg(args: &[Value], index: usize) -> &Value {
    args.get(index).unwrap_or(&NULL)
}

fn string_arg(args: &[Value], index: usize) -> String {
    value::to_display(arg(args, index))
}

/// `max(a, b, ...)` or `max([a, b, ...])`
fn extreme(args: &[Value], wanted: std::cmp::Ordering) -> Result<Value> {
    let candidates: Vec<&Value> = match args {
        [Value::Array(items)] => items.iter().collect(),
        [Value::Object(map)] => map.values().collect(),
        _ => args.iter().collect(),
    };
    let mut iter = candidates.into_iter();
    let first = iter
        .next()
        .ok_or_else(|| Error::template("max()/min() expects at least one value"))?;
    Ok(iter
        .fold(first, |best, candidate| {
            if value::compare(candidate, best) == wanted {
                candidate
            } else {
                best
            }
        })
        .clone())
}

/// Format a number with grouped thousands
pub fn number_format(amount: f64, decimals: usize, point: &str, thousands: &str) -> String {
    let factor = 10f64.powi(decimals as i32);
    let rounded = (amount.abs() * factor).round() / factor;
    let formatted = format!("{:.*}", decimals, rounded);
    let (integer, fraction) = match formatted.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (formatted, None),
    };

    let digits: Vec<char> = integer.chars().collect();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push_str(thousands);
        }
        grouped.push(*digit);
    }

    let is_zero = formatted_is_zero(&grouped, fraction.as_deref());
    let mut result = String::new();
    if amount < 0.0 && !is_zero {
        result.push('-');
    }
    result.push_str(&grouped);
    if let Some(fraction) = fraction {
        result.push_str(point);
        result.push_str(&fraction);
    }
    result
}

fn formatted_is_zero(integer: &str, fraction: Option<&str>) -> bool {
    integer.chars().all(|c| !c.is_ascii_digit() || c == '0')
        && fraction.map_or(true, |f| f.chars().all(|c| c == '0'))
}

/// Keep the first two characters of the local part, star out the rest
pub fn mask_email(email: &str) -> String {
    let (name, domain) = email.split_once('@').unwrap_or((email, ""));
    let visible: String = name.chars().take(2).collect();
    let hidden = name.chars().count().saturating_sub(2);
    format!("{}{}@{}", visible, "*".repeat(hidden), domain)
}

/// Star out all but the last two characters
pub fn mask_phone_number(phone: &str) -> String {
    let chars: Vec<char> = phone.chars().collect();
    if chars.len() <= 2 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 2), tail)
}

/// Lowercase, dash-separated ASCII slug; `n-a` when nothing is left
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if c.is_ascii() {
                if pending_dash && !slug.is_empty() {
                    slug.push('-');
                }
                pending_dash = false;
                slug.push(c.to_ascii_lowercase());
            }
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        "n-a".to_string()
    } else {
        slug
    }
}

/// `number_format` plus an optional currency before or after the amount
pub fn price_formatter(amount: f64, currency: &str, symbol_before: bool, decimals: usize) -> String {
    let formatted = number_format(amount, decimals, ".", ",");
    if currency.is_empty() {
        formatted
    } else if symbol_before {
        format!("{}{}", currency, formatted)
    } else {
        format!("{} {}", formatted, currency)
    }
}

/// Build a URL path from segments, trimming slashes around each one
pub fn url_path(base: &str, segments: &[Value]) -> String {
    let path = segments
        .iter()
        .map(|s| value::to_display(s).trim_matches('/').to_string())
        .collect::<Vec<_>>()
        .join("/");
    let url = format!("{}/{}", base.trim_end_matches('/'), path);
    let trimmed = url.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}
