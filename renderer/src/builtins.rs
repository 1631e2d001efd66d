//! Built-in functions callable from directive arguments.

use crate::error::RuntimeError;
use crate::runtime_value::{Value, format_number};

pub const NAMES: [&str; 12] = [
    "len", "upper", "lower", "trim", "escape", "join", "keys", "values", "json", "str", "num",
    "range",
];

/// Longest array `range` will build.
const MAX_RANGE: usize = 1_000_000;

pub fn is_builtin(name: &str) -> bool {
    NAMES.contains(&name)
}

pub fn call(name: &str, arguments: Vec<Value>) -> Result<Value, RuntimeError> {
    match name {
        "len" => {
            let [value] = exact::<1>(name, arguments)?;
            match value {
                Value::String(s) => Ok(Value::Number(s.chars().count() as f64)),
                Value::Array(items) => Ok(Value::Number(items.len() as f64)),
                Value::Object(object) => Ok(Value::Number(object.len() as f64)),
                other => Err(RuntimeError::bad_arguments(
                    name,
                    format!("expected a string, array or object, got {}", other.type_name()),
                )),
            }
        }
        "upper" => text(name, arguments, |s| s.to_uppercase()),
        "lower" => text(name, arguments, |s| s.to_lowercase()),
        "trim" => text(name, arguments, |s| s.trim().to_string()),
        "escape" => text(name, arguments, escape_html),
        "str" => text(name, arguments, str::to_string),
        "num" => {
            let [value] = exact::<1>(name, arguments)?;
            Ok(Value::Number(value.to_number()))
        }
        "json" => {
            let [value] = exact::<1>(name, arguments)?;
            Ok(Value::String(value.to_json().to_string()))
        }
        "join" => {
            let mut arguments = arguments.into_iter();
            let (Some(list), separator, None) = (arguments.next(), arguments.next(), arguments.next())
            else {
                return Err(RuntimeError::bad_arguments(name, "expected 1 or 2 arguments"));
            };
            let items = match list {
                Value::Array(items) => items,
                other => {
                    return Err(RuntimeError::bad_arguments(
                        name,
                        format!("expected an array, got {}", other.type_name()),
                    ));
                }
            };
            let separator = separator.map(|s| s.to_string()).unwrap_or_else(|| ",".to_string());
            let joined: Vec<String> = items
                .iter()
                .map(|item| if item.is_nullish() { String::new() } else { item.to_string() })
                .collect();
            Ok(Value::String(joined.join(&separator)))
        }
        "keys" => {
            let [value] = exact::<1>(name, arguments)?;
            let keys = entries(&value)
                .map_err(|_| RuntimeError::bad_arguments(name, format!("cannot list keys of {}", value.type_name())))?
                .into_iter()
                .map(|(key, _)| key)
                .collect();
            Ok(Value::Array(keys))
        }
        "values" => {
            let [value] = exact::<1>(name, arguments)?;
            let values = entries(&value)
                .map_err(|_| RuntimeError::bad_arguments(name, format!("cannot list values of {}", value.type_name())))?
                .into_iter()
                .map(|(_, item)| item)
                .collect();
            Ok(Value::Array(values))
        }
        "range" => {
            let (start, end) = match arguments.as_slice() {
                [end] => (0.0, end.to_number()),
                [start, end] => (start.to_number(), end.to_number()),
                _ => return Err(RuntimeError::bad_arguments(name, "expected 1 or 2 arguments")),
            };
            if !start.is_finite() || !end.is_finite() {
                return Err(RuntimeError::bad_arguments(name, "bounds must be finite numbers"));
            }
            let length = (end - start).ceil().max(0.0) as usize;
            if length > MAX_RANGE {
                return Err(RuntimeError::bad_arguments(
                    name,
                    format!("range of {} items exceeds {}", length, MAX_RANGE),
                ));
            }
            Ok(Value::Array(
                (0..length).map(|i| Value::Number(start + i as f64)).collect(),
            ))
        }
        other => Err(RuntimeError::UnknownFunction(other.to_string())),
    }
}

/// Key/value pairs in iteration order: array indices, object properties in
/// insertion order, or string characters. Keys of arrays and strings are
/// numbers. Scalars other than `null`/`undefined` have no entries.
pub fn entries(value: &Value) -> Result<Vec<(Value, Value)>, RuntimeError> {
    match value {
        Value::Undefined | Value::Null => Err(RuntimeError::NotIterable(value.type_name())),
        Value::Array(items) => Ok(items
            .iter()
            .enumerate()
            .map(|(i, item)| (Value::Number(i as f64), item.clone()))
            .collect()),
        Value::Object(object) => Ok(object
            .iter()
            .map(|(key, item)| (Value::from(key), item.clone()))
            .collect()),
        Value::String(s) => Ok(s
            .chars()
            .enumerate()
            .map(|(i, c)| (Value::Number(i as f64), Value::String(c.to_string())))
            .collect()),
        Value::Boolean(_) | Value::Number(_) => Ok(Vec::new()),
    }
}

/// Property key text of a value used in `obj[key]`.
pub fn property_key(value: &Value) -> String {
    match value {
        Value::Number(n) => format_number(*n),
        other => other.to_string(),
    }
}

fn exact<const N: usize>(name: &str, arguments: Vec<Value>) -> Result<[Value; N], RuntimeError> {
    let count = arguments.len();
    arguments.try_into().map_err(|_| {
        RuntimeError::bad_arguments(
            name,
            format!("expected {} argument{}, got {}", N, if N == 1 { "" } else { "s" }, count),
        )
    })
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn text(name: &str, arguments: Vec<Value>, f: impl Fn(&str) -> String) -> Result<Value, RuntimeError> {
    let [value] = exact::<1>(name, arguments)?;
    Ok(Value::String(f(&value.to_string())))
}
