//! Host intrinsics seeded into the interpreter scope before dispatch, plus
//! the method surface of arrays and strings.
//!
//! The seeded name set is exactly [`crate::collector::PROTECTED_INTRINSICS`];
//! the collector protects what this module provides.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use super::error::RuntimeError;
use super::scope::Scope;
use super::value::{NativeValue, Value};
use crate::collector::PROTECTED_INTRINSICS;

fn native(name: &'static str, f: impl Fn(&[Value]) -> Result<Value, RuntimeError> + 'static) -> Value {
    Value::Native(NativeValue { name, f: Rc::new(f) })
}

fn arg(args: &[Value], idx: usize) -> Value {
    args.get(idx).cloned().unwrap_or(Value::Undefined)
}

/// Copy every host intrinsic into the given scope.
pub fn install(scope: &Scope) {
    scope.define("NaN", Value::Number(f64::NAN));
    scope.define("Infinity", Value::Number(f64::INFINITY));
    scope.define("globalThis", Value::object());

    scope.define(
        "parseInt",
        native("parseInt", |args| {
            let text = arg(args, 0).to_display();
            let radix = match arg(args, 1) {
                Value::Undefined => 0,
                other => other.to_number() as u32,
            };
            Ok(Value::Number(parse_int(&text, radix)))
        }),
    );
    scope.define(
        "parseFloat",
        native("parseFloat", |args| {
            Ok(Value::Number(parse_float(&arg(args, 0).to_display())))
        }),
    );
    scope.define(
        "isNaN",
        native("isNaN", |args| {
            Ok(Value::Bool(arg(args, 0).to_number().is_nan()))
        }),
    );
    scope.define(
        "isFinite",
        native("isFinite", |args| {
            Ok(Value::Bool(arg(args, 0).to_number().is_finite()))
        }),
    );

    scope.define(
        "Number",
        native("Number", |args| Ok(Value::Number(arg(args, 0).to_number()))),
    );
    scope.define(
        "String",
        native("String", |args| {
            Ok(Value::Str(match args.first() {
                Some(v) => v.to_display(),
                None => String::new(),
            }))
        }),
    );
    scope.define(
        "Boolean",
        native("Boolean", |args| Ok(Value::Bool(arg(args, 0).truthy()))),
    );
    scope.define(
        "Array",
        native("Array", |args| Ok(Value::array(args.to_vec()))),
    );
    scope.define("Object", native("Object", |_| Ok(Value::object())));

    scope.define("Math", math_object());
    scope.define("JSON", json_object());
    scope.define("Date", date_object());
    scope.define("console", console_object());

    debug_assert!(
        PROTECTED_INTRINSICS.iter().all(|name| scope.has(name)),
        "intrinsic seeding drifted from the protected set"
    );
}

fn object_with(props: Vec<(&str, Value)>) -> Value {
    let obj = Value::object();
    if let Value::Object(data) = &obj {
        let mut data = data.borrow_mut();
        for (key, value) in props {
            data.set(key, value);
        }
    }
    obj
}

fn math_object() -> Value {
    fn unary_math(name: &'static str, f: fn(f64) -> f64) -> Value {
        native(name, move |args| Ok(Value::Number(f(arg(args, 0).to_number()))))
    }
    object_with(vec![
        ("PI", Value::Number(std::f64::consts::PI)),
        ("E", Value::Number(std::f64::consts::E)),
        ("abs", unary_math("abs", f64::abs)),
        ("floor", unary_math("floor", f64::floor)),
        ("ceil", unary_math("ceil", f64::ceil)),
        ("round", unary_math("round", f64::round)),
        ("sqrt", unary_math("sqrt", f64::sqrt)),
        (
            "pow",
            native("pow", |args| {
                Ok(Value::Number(
                    arg(args, 0).to_number().powf(arg(args, 1).to_number()),
                ))
            }),
        ),
        (
            "max",
            native("max", |args| {
                Ok(Value::Number(
                    args.iter()
                        .map(Value::to_number)
                        .fold(f64::NEG_INFINITY, f64::max),
                ))
            }),
        ),
        (
            "min",
            native("min", |args| {
                Ok(Value::Number(
                    args.iter()
                        .map(Value::to_number)
                        .fold(f64::INFINITY, f64::min),
                ))
            }),
        ),
        (
            "random",
            native("random", |_| Ok(Value::Number(rand::random::<f64>()))),
        ),
    ])
}

fn json_object() -> Value {
    object_with(vec![
        (
            "stringify",
            native("stringify", |args| {
                let json = to_json(&arg(args, 0));
                serde_json::to_string(&json)
                    .map(Value::Str)
                    .map_err(|e| RuntimeError::TypeMismatch(e.to_string()))
            }),
        ),
        (
            "parse",
            native("parse", |args| {
                let text = arg(args, 0).to_display();
                serde_json::from_str::<serde_json::Value>(&text)
                    .map(|json| from_json(&json))
                    .map_err(|e| RuntimeError::TypeMismatch(format!("invalid JSON: {e}")))
            }),
        ),
    ])
}

fn date_object() -> Value {
    object_with(vec![(
        "now",
        native("now", |_| {
            let millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as f64)
                .unwrap_or(0.0);
            Ok(Value::Number(millis))
        }),
    )])
}

fn console_object() -> Value {
    fn sink(name: &'static str, level: tracing::Level) -> Value {
        native(name, move |args| {
            let line = args
                .iter()
                .map(Value::to_display)
                .collect::<Vec<_>>()
                .join(" ");
            match level {
                tracing::Level::WARN => tracing::warn!(target: "script", "{line}"),
                tracing::Level::ERROR => tracing::error!(target: "script", "{line}"),
                _ => tracing::info!(target: "script", "{line}"),
            }
            Ok(Value::Undefined)
        })
    }
    object_with(vec![
        ("log", sink("log", tracing::Level::INFO)),
        ("warn", sink("warn", tracing::Level::WARN)),
        ("error", sink("error", tracing::Level::ERROR)),
    ])
}

// ---------------------------------------------------------------------
// Array and string method surface
// ---------------------------------------------------------------------

fn norm_index(i: f64, len: usize) -> usize {
    if i.is_nan() {
        return 0;
    }
    if i < 0.0 {
        let back = (-i) as usize;
        len.saturating_sub(back)
    } else {
        (i as usize).min(len)
    }
}

/// Member lookup on an array value. Methods come back bound to the
/// receiver, so plain `CALL_FUNCTION` invokes them correctly.
pub fn array_member(recv: &Rc<RefCell<Vec<Value>>>, name: &str) -> Option<Value> {
    match name {
        "length" => Some(Value::Number(recv.borrow().len() as f64)),
        "push" => {
            let recv = recv.clone();
            Some(native("push", move |args| {
                let mut elems = recv.borrow_mut();
                elems.extend(args.iter().cloned());
                Ok(Value::Number(elems.len() as f64))
            }))
        }
        "pop" => {
            let recv = recv.clone();
            Some(native("pop", move |_| {
                Ok(recv.borrow_mut().pop().unwrap_or(Value::Undefined))
            }))
        }
        "join" => {
            let recv = recv.clone();
            Some(native("join", move |args| {
                let sep = match args.first() {
                    None | Some(Value::Undefined) => ",".to_string(),
                    Some(v) => v.to_display(),
                };
                Ok(Value::Str(
                    recv.borrow()
                        .iter()
                        .map(|v| match v {
                            Value::Undefined | Value::Null => String::new(),
                            other => other.to_display(),
                        })
                        .collect::<Vec<_>>()
                        .join(&sep),
                ))
            }))
        }
        "indexOf" => {
            let recv = recv.clone();
            Some(native("indexOf", move |args| {
                let needle = arg(args, 0);
                let found = recv
                    .borrow()
                    .iter()
                    .position(|v| super::ops::strict_eq(v, &needle));
                Ok(Value::Number(found.map_or(-1.0, |i| i as f64)))
            }))
        }
        "slice" => {
            let recv = recv.clone();
            Some(native("slice", move |args| {
                let elems = recv.borrow();
                let len = elems.len();
                let start = match args.first() {
                    None | Some(Value::Undefined) => 0,
                    Some(v) => norm_index(v.to_number(), len),
                };
                let end = match args.get(1) {
                    None | Some(Value::Undefined) => len,
                    Some(v) => norm_index(v.to_number(), len),
                };
                Ok(Value::array(elems[start..end.max(start)].to_vec()))
            }))
        }
        _ => None,
    }
}

/// Member lookup on a string value.
pub fn string_member(recv: &str, name: &str) -> Option<Value> {
    let chars: Vec<char> = recv.chars().collect();
    match name {
        "length" => Some(Value::Number(chars.len() as f64)),
        "charAt" => {
            let chars = chars.clone();
            Some(native("charAt", move |args| {
                let idx = arg(args, 0).to_number();
                let out = if idx >= 0.0 && (idx as usize) < chars.len() {
                    chars[idx as usize].to_string()
                } else {
                    String::new()
                };
                Ok(Value::Str(out))
            }))
        }
        "indexOf" => {
            let owned = recv.to_string();
            Some(native("indexOf", move |args| {
                let needle = arg(args, 0).to_display();
                let found = owned.find(&needle).map(|byte| {
                    owned[..byte].chars().count() as f64
                });
                Ok(Value::Number(found.unwrap_or(-1.0)))
            }))
        }
        "slice" => {
            let chars = chars.clone();
            Some(native("slice", move |args| {
                let len = chars.len();
                let start = match args.first() {
                    None | Some(Value::Undefined) => 0,
                    Some(v) => norm_index(v.to_number(), len),
                };
                let end = match args.get(1) {
                    None | Some(Value::Undefined) => len,
                    Some(v) => norm_index(v.to_number(), len),
                };
                Ok(Value::Str(chars[start..end.max(start)].iter().collect()))
            }))
        }
        "toUpperCase" => {
            let owned = recv.to_string();
            Some(native("toUpperCase", move |_| {
                Ok(Value::Str(owned.to_uppercase()))
            }))
        }
        "toLowerCase" => {
            let owned = recv.to_string();
            Some(native("toLowerCase", move |_| {
                Ok(Value::Str(owned.to_lowercase()))
            }))
        }
        "split" => {
            let owned = recv.to_string();
            Some(native("split", move |args| {
                let parts: Vec<Value> = match args.first() {
                    None | Some(Value::Undefined) => vec![Value::Str(owned.clone())],
                    Some(sep) => {
                        let sep = sep.to_display();
                        if sep.is_empty() {
                            owned.chars().map(|c| Value::Str(c.to_string())).collect()
                        } else {
                            owned
                                .split(&sep)
                                .map(|p| Value::Str(p.to_string()))
                                .collect()
                        }
                    }
                };
                Ok(Value::array(parts))
            }))
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------
// Serialization bridge
// ---------------------------------------------------------------------

fn to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;
    match value {
        Value::Undefined | Value::Null | Value::Function(_) | Value::Native(_) => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Number(n) => {
            if n.fract() == 0.0 && n.is_finite() && n.abs() < 9e15 {
                Json::Number(serde_json::Number::from(*n as i64))
            } else {
                serde_json::Number::from_f64(*n)
                    .map(Json::Number)
                    .unwrap_or(Json::Null)
            }
        }
        Value::Str(s) => Json::String(s.clone()),
        Value::Array(elems) => Json::Array(elems.borrow().iter().map(to_json).collect()),
        Value::Object(data) => {
            let mut map = serde_json::Map::new();
            for (key, value) in data.borrow().entries() {
                map.insert(key.clone(), to_json(value));
            }
            Json::Object(map)
        }
    }
}

fn from_json(json: &serde_json::Value) -> Value {
    use serde_json::Value as Json;
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        Json::String(s) => Value::Str(s.clone()),
        Json::Array(items) => Value::array(items.iter().map(from_json).collect()),
        Json::Object(map) => {
            let obj = Value::object();
            if let Value::Object(data) = &obj {
                let mut data = data.borrow_mut();
                for (key, value) in map {
                    data.set(key, from_json(value));
                }
            }
            obj
        }
    }
}

fn parse_int(text: &str, radix: u32) -> f64 {
    let trimmed = text.trim();
    let (negative, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let (radix, rest) = if (radix == 0 || radix == 16)
        && (rest.starts_with("0x") || rest.starts_with("0X"))
    {
        (16, &rest[2..])
    } else {
        (if radix == 0 { 10 } else { radix }, rest)
    };
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let digits: String = rest.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let mut out = 0.0f64;
    for ch in digits.chars() {
        out = out * radix as f64 + ch.to_digit(radix).unwrap() as f64;
    }
    if negative {
        -out
    } else {
        out
    }
}

fn parse_float(text: &str) -> f64 {
    let trimmed = text.trim();
    let mut end = 0;
    let bytes = trimmed.as_bytes();
    let mut seen_dot = false;
    let mut seen_exp = false;
    while end < bytes.len() {
        let c = bytes[end] as char;
        let ok = c.is_ascii_digit()
            || (c == '-' || c == '+')
                && (end == 0 || bytes[end - 1] == b'e' || bytes[end - 1] == b'E')
            || (c == '.' && !seen_dot && !seen_exp)
            || ((c == 'e' || c == 'E') && !seen_exp && end > 0);
        if !ok {
            break;
        }
        if c == '.' {
            seen_dot = true;
        }
        if c == 'e' || c == 'E' {
            seen_exp = true;
        }
        end += 1;
    }
    trimmed[..end].parse().unwrap_or(f64::NAN)
}
