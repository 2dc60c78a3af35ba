//! Operator semantics.
//!
//! Handlers dispatch on the operator spelling drawn from the constant pool.
//! Coercions follow the input language: `+` concatenates when a string is
//! involved, bitwise operators work on 32-bit integers, loose equality
//! bridges numbers, strings, booleans, and the nullish pair.

use std::rc::Rc;

use super::error::RuntimeError;
use super::value::Value;

fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    (n.trunc() as i64 as u64 & 0xFFFF_FFFF) as u32 as i32
}

fn to_uint32(n: f64) -> u32 {
    to_int32(n) as u32
}

fn shift_count(v: &Value) -> u32 {
    to_uint32(v.to_number()) & 31
}

/// Apply a binary operator.
pub fn binary(op: &str, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let value = match op {
        "+" => {
            if matches!(a, Value::Str(_)) || matches!(b, Value::Str(_)) {
                Value::Str(format!("{}{}", a.to_display(), b.to_display()))
            } else {
                Value::Number(a.to_number() + b.to_number())
            }
        }
        "-" => Value::Number(a.to_number() - b.to_number()),
        "*" => Value::Number(a.to_number() * b.to_number()),
        "/" => Value::Number(a.to_number() / b.to_number()),
        "%" => Value::Number(a.to_number() % b.to_number()),
        "<<" => Value::Number((to_int32(a.to_number()) << shift_count(b)) as f64),
        ">>" => Value::Number((to_int32(a.to_number()) >> shift_count(b)) as f64),
        ">>>" => Value::Number((to_uint32(a.to_number()) >> shift_count(b)) as f64),
        "&" => Value::Number((to_int32(a.to_number()) & to_int32(b.to_number())) as f64),
        "|" => Value::Number((to_int32(a.to_number()) | to_int32(b.to_number())) as f64),
        "^" => Value::Number((to_int32(a.to_number()) ^ to_int32(b.to_number())) as f64),
        "==" => Value::Bool(loose_eq(a, b)),
        "!=" => Value::Bool(!loose_eq(a, b)),
        "===" => Value::Bool(strict_eq(a, b)),
        "!==" => Value::Bool(!strict_eq(a, b)),
        "<" | "<=" | ">" | ">=" => Value::Bool(relational(op, a, b)),
        "in" => Value::Bool(has_member(a, b)?),
        "instanceof" => Value::Bool(instance_of(a, b)?),
        _ => return Err(RuntimeError::BadOperator(op.to_string())),
    };
    Ok(value)
}

/// Apply a unary operator.
pub fn unary(op: &str, a: &Value) -> Result<Value, RuntimeError> {
    let value = match op {
        "+" => Value::Number(a.to_number()),
        "-" => Value::Number(-a.to_number()),
        "!" => Value::Bool(!a.truthy()),
        "~" => Value::Number(!to_int32(a.to_number()) as f64),
        "typeof" => Value::Str(a.type_name().to_string()),
        "void" => Value::Undefined,
        // The operand is already evaluated here, so there is no reference
        // left to remove; the host language answers true in that case too.
        "delete" => Value::Bool(true),
        _ => return Err(RuntimeError::BadOperator(op.to_string())),
    };
    Ok(value)
}

/// Apply a logical operator to two already-evaluated operands.
pub fn logical(op: &str, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let value = match op {
        "&&" => {
            if a.truthy() {
                b.clone()
            } else {
                a.clone()
            }
        }
        "||" => {
            if a.truthy() {
                a.clone()
            } else {
                b.clone()
            }
        }
        "??" => {
            if a.is_nullish() {
                b.clone()
            } else {
                a.clone()
            }
        }
        _ => return Err(RuntimeError::BadOperator(op.to_string())),
    };
    Ok(value)
}

pub fn strict_eq(a: &Value, b: &Value) -> bool {
    a == b
}

pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        (Value::Number(_), Value::Number(_))
        | (Value::Str(_), Value::Str(_))
        | (Value::Bool(_), Value::Bool(_)) => strict_eq(a, b),
        (Value::Number(_) | Value::Str(_) | Value::Bool(_), Value::Number(_) | Value::Str(_) | Value::Bool(_)) => {
            let x = a.to_number();
            let y = b.to_number();
            x == y
        }
        _ => strict_eq(a, b),
    }
}

fn relational(op: &str, a: &Value, b: &Value) -> bool {
    if let (Value::Str(x), Value::Str(y)) = (a, b) {
        return match op {
            "<" => x < y,
            "<=" => x <= y,
            ">" => x > y,
            ">=" => x >= y,
            _ => unreachable!(),
        };
    }
    let x = a.to_number();
    let y = b.to_number();
    if x.is_nan() || y.is_nan() {
        return false;
    }
    match op {
        "<" => x < y,
        "<=" => x <= y,
        ">" => x > y,
        ">=" => x >= y,
        _ => unreachable!(),
    }
}

/// `key in container`.
fn has_member(key: &Value, container: &Value) -> Result<bool, RuntimeError> {
    let key = key.to_display();
    match container {
        Value::Object(data) => Ok(data.borrow().has(&key)),
        Value::Array(elems) => {
            if key == "length" {
                return Ok(true);
            }
            Ok(key
                .parse::<usize>()
                .map(|i| i < elems.borrow().len())
                .unwrap_or(false))
        }
        other => Err(RuntimeError::TypeMismatch(format!(
            "cannot use `in` on a {}",
            other.type_name()
        ))),
    }
}

fn instance_of(value: &Value, ctor: &Value) -> Result<bool, RuntimeError> {
    match ctor {
        Value::Function(f) => Ok(match value {
            Value::Object(data) => data
                .borrow()
                .ctor
                .as_ref()
                .is_some_and(|c| Rc::ptr_eq(c, f)),
            _ => false,
        }),
        Value::Native(n) => Ok(match (value, n.name) {
            (Value::Array(_), "Array") => true,
            (Value::Object(_), "Object") => true,
            _ => false,
        }),
        other => Err(RuntimeError::TypeMismatch(format!(
            "right operand of instanceof is not callable ({})",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    fn s(text: &str) -> Value {
        Value::Str(text.to_string())
    }

    #[test]
    fn addition_concatenates_with_a_string_operand() {
        assert_eq!(binary("+", &num(1.0), &num(2.0)).unwrap(), num(3.0));
        assert_eq!(binary("+", &s("a"), &num(2.0)).unwrap(), s("a2"));
        assert_eq!(binary("+", &num(1.0), &s("b")).unwrap(), s("1b"));
    }

    #[test]
    fn bitwise_operators_work_on_int32() {
        assert_eq!(binary("<<", &num(1.0), &num(3.0)).unwrap(), num(8.0));
        assert_eq!(binary(">>", &num(-8.0), &num(1.0)).unwrap(), num(-4.0));
        assert_eq!(
            binary(">>>", &num(-1.0), &num(0.0)).unwrap(),
            num(4294967295.0)
        );
        assert_eq!(binary("&", &num(6.0), &num(3.0)).unwrap(), num(2.0));
        assert_eq!(unary("~", &num(0.0)).unwrap(), num(-1.0));
    }

    #[test]
    fn equality_tiers() {
        assert!(loose_eq(&Value::Null, &Value::Undefined));
        assert!(!strict_eq(&Value::Null, &Value::Undefined));
        assert!(loose_eq(&num(1.0), &s("1")));
        assert!(!strict_eq(&num(1.0), &s("1")));
        assert!(strict_eq(&s("x"), &s("x")));
    }

    #[test]
    fn nan_never_compares() {
        let nan = num(f64::NAN);
        assert!(!relational("<", &nan, &num(1.0)));
        assert!(!relational(">=", &num(1.0), &nan));
        assert!(!loose_eq(&nan, &nan));
    }

    #[test]
    fn unknown_operators_are_rejected() {
        assert!(matches!(
            binary("**", &num(2.0), &num(3.0)),
            Err(RuntimeError::BadOperator(_))
        ));
        assert!(matches!(
            unary("--", &num(2.0)),
            Err(RuntimeError::BadOperator(_))
        ));
        assert!(matches!(
            logical("&", &num(1.0), &num(2.0)),
            Err(RuntimeError::BadOperator(_))
        ));
    }

    #[test]
    fn logical_operators_pick_an_operand() {
        assert_eq!(logical("&&", &num(0.0), &num(5.0)).unwrap(), num(0.0));
        assert_eq!(logical("&&", &num(1.0), &num(5.0)).unwrap(), num(5.0));
        assert_eq!(logical("||", &num(0.0), &num(5.0)).unwrap(), num(5.0));
        assert_eq!(logical("??", &Value::Null, &num(5.0)).unwrap(), num(5.0));
        assert_eq!(logical("??", &num(0.0), &num(5.0)).unwrap(), num(0.0));
    }

    #[test]
    fn typeof_answers() {
        assert_eq!(unary("typeof", &Value::Undefined).unwrap(), s("undefined"));
        assert_eq!(unary("typeof", &Value::Null).unwrap(), s("object"));
        assert_eq!(unary("typeof", &num(1.0)).unwrap(), s("number"));
        assert_eq!(unary("typeof", &Value::array(vec![])).unwrap(), s("object"));
    }
}
