//! Arithmetic, comparison and indexing over JSON values.
//!
//! Semantics follow the usual dynamic-language conventions: `/` is true
//! division, `//` and `%` floor toward negative infinity, integers are checked
//! for overflow, and mixing an int with a float promotes to float.

use std::cmp::Ordering;

use serde_json::{Number, Value};

use super::parser::BinOp;
use crate::interpreter::Failure;

/// Longest string or list a single operation may build.
pub const MAX_SEQUENCE_LEN: usize = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    pub fn from_value(value: &Value) -> Option<Self> {
        let Value::Number(n) = value else {
            return None;
        };
        n.as_i64()
            .map(Num::Int)
            .or_else(|| n.as_f64().map(Num::Float))
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    pub fn into_value(self) -> Result<Value, Failure> {
        match self {
            Num::Int(i) => Ok(Value::from(i)),
            Num::Float(f) => float_value(f),
        }
    }
}

pub fn float_value(f: f64) -> Result<Value, Failure> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| Failure::new("ValueError", format!("float result {f} is not representable")))
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn overflow() -> Failure {
    Failure::new("OverflowError", "integer result out of range")
}

fn unsupported(op: BinOp, lhs: &Value, rhs: &Value) -> Failure {
    Failure::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        type_name(lhs),
        type_name(rhs)
    ))
}

pub fn binary(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value, Failure> {
    match op {
        BinOp::Eq => Ok(Value::Bool(equal(lhs, rhs))),
        BinOp::Ne => Ok(Value::Bool(!equal(lhs, rhs))),
        BinOp::Lt => compare(op, lhs, rhs).map(|o| Value::Bool(o == Ordering::Less)),
        BinOp::Le => compare(op, lhs, rhs).map(|o| Value::Bool(o != Ordering::Greater)),
        BinOp::Gt => compare(op, lhs, rhs).map(|o| Value::Bool(o == Ordering::Greater)),
        BinOp::Ge => compare(op, lhs, rhs).map(|o| Value::Bool(o != Ordering::Less)),
        BinOp::Add => add(lhs, rhs),
        BinOp::Mul => mul(lhs, rhs),
        BinOp::Sub | BinOp::Div | BinOp::FloorDiv | BinOp::Mod => {
            let (Some(a), Some(b)) = (Num::from_value(lhs), Num::from_value(rhs)) else {
                return Err(unsupported(op, lhs, rhs));
            };
            arith(op, a, b)?.into_value()
        }
    }
}

pub fn add(lhs: &Value, rhs: &Value) -> Result<Value, Failure> {
    match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => {
            check_len(a.len() + b.len())?;
            Ok(Value::String(format!("{a}{b}")))
        }
        (Value::Array(a), Value::Array(b)) => {
            check_len(a.len() + b.len())?;
            Ok(Value::Array(a.iter().chain(b).cloned().collect()))
        }
        _ => match (Num::from_value(lhs), Num::from_value(rhs)) {
            (Some(a), Some(b)) => arith(BinOp::Add, a, b)?.into_value(),
            _ => Err(unsupported(BinOp::Add, lhs, rhs)),
        },
    }
}

fn mul(lhs: &Value, rhs: &Value) -> Result<Value, Failure> {
    let repeat = |n: i64| usize::try_from(n.max(0)).unwrap_or(0);
    match (lhs, rhs, Num::from_value(lhs), Num::from_value(rhs)) {
        (_, _, Some(a), Some(b)) => arith(BinOp::Mul, a, b)?.into_value(),
        (Value::String(s), _, _, Some(Num::Int(n))) | (_, Value::String(s), Some(Num::Int(n)), _) => {
            check_len(s.len().saturating_mul(repeat(n)))?;
            Ok(Value::String(s.repeat(repeat(n))))
        }
        (Value::Array(a), _, _, Some(Num::Int(n))) | (_, Value::Array(a), Some(Num::Int(n)), _) => {
            check_len(a.len().saturating_mul(repeat(n)))?;
            Ok(Value::Array(
                std::iter::repeat_n(a, repeat(n)).flatten().cloned().collect(),
            ))
        }
        _ => Err(unsupported(BinOp::Mul, lhs, rhs)),
    }
}

fn check_len(len: usize) -> Result<(), Failure> {
    if len > MAX_SEQUENCE_LEN {
        return Err(Failure::new(
            "MemoryError",
            format!("result of {len} elements exceeds the {MAX_SEQUENCE_LEN} element limit"),
        ));
    }
    Ok(())
}

pub fn arith(op: BinOp, a: Num, b: Num) -> Result<Num, Failure> {
    if let (Num::Int(x), Num::Int(y)) = (a, b) {
        return int_arith(op, x, y);
    }

    let (x, y) = (a.as_f64(), b.as_f64());
    let zero_div = || Failure::new("ZeroDivisionError", "float division by zero");
    let r = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div if y == 0.0 => return Err(zero_div()),
        BinOp::Div => x / y,
        BinOp::FloorDiv if y == 0.0 => return Err(zero_div()),
        BinOp::FloorDiv => (x / y).floor(),
        BinOp::Mod if y == 0.0 => return Err(Failure::new("ZeroDivisionError", "float modulo")),
        BinOp::Mod => {
            let r = x % y;
            if r != 0.0 && (r < 0.0) != (y < 0.0) { r + y } else { r }
        }
        _ => return Err(Failure::type_error(format!("'{}' is not arithmetic", op.symbol()))),
    };
    Ok(Num::Float(r))
}

fn int_arith(op: BinOp, x: i64, y: i64) -> Result<Num, Failure> {
    let int_zero_div = || Failure::new("ZeroDivisionError", "integer division or modulo by zero");
    match op {
        BinOp::Add => x.checked_add(y).map(Num::Int).ok_or_else(overflow),
        BinOp::Sub => x.checked_sub(y).map(Num::Int).ok_or_else(overflow),
        BinOp::Mul => x.checked_mul(y).map(Num::Int).ok_or_else(overflow),
        BinOp::Div if y == 0 => Err(Failure::new("ZeroDivisionError", "division by zero")),
        BinOp::Div => Ok(Num::Float(x as f64 / y as f64)),
        BinOp::FloorDiv if y == 0 => Err(int_zero_div()),
        BinOp::FloorDiv => {
            let q = x.checked_div(y).ok_or_else(overflow)?;
            Ok(Num::Int(if (x % y != 0) && ((x < 0) != (y < 0)) { q - 1 } else { q }))
        }
        BinOp::Mod if y == 0 => Err(int_zero_div()),
        BinOp::Mod => {
            let r = x.checked_rem(y).ok_or_else(overflow)?;
            Ok(Num::Int(if r != 0 && ((r < 0) != (y < 0)) { r + y } else { r }))
        }
        _ => Err(Failure::type_error(format!("'{}' is not arithmetic", op.symbol()))),
    }
}

pub fn negate(value: &Value) -> Result<Value, Failure> {
    match Num::from_value(value) {
        Some(Num::Int(i)) => i.checked_neg().map(Value::from).ok_or_else(overflow),
        Some(Num::Float(f)) => float_value(-f),
        None => Err(Failure::type_error(format!(
            "bad operand type for unary -: '{}'",
            type_name(value)
        ))),
    }
}

/// Equality where `1 == 1.0`.
pub fn equal(lhs: &Value, rhs: &Value) -> bool {
    match (Num::from_value(lhs), Num::from_value(rhs)) {
        (Some(Num::Int(a)), Some(Num::Int(b))) => a == b,
        (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
        _ => match (lhs, rhs) {
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| equal(x, y))
            }
            (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| equal(v, w)))
            }
            _ => lhs == rhs,
        },
    }
}

/// Ordering for numbers, strings and lists (lexicographic).
pub fn compare(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Ordering, Failure> {
    let not_supported = || {
        Failure::type_error(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            op.symbol(),
            type_name(lhs),
            type_name(rhs)
        ))
    };

    if let (Some(a), Some(b)) = (Num::from_value(lhs), Num::from_value(rhs)) {
        return match (a, b) {
            (Num::Int(x), Num::Int(y)) => Ok(x.cmp(&y)),
            _ => a.as_f64().partial_cmp(&b.as_f64()).ok_or_else(not_supported),
        };
    }

    match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        (Value::Array(a), Value::Array(b)) => {
            for (x, y) in a.iter().zip(b) {
                match compare(op, x, y)? {
                    Ordering::Equal => continue,
                    other => return Ok(other),
                }
            }
            Ok(a.len().cmp(&b.len()))
        }
        _ => Err(not_supported()),
    }
}

/// `container[index]`.
pub fn index(container: &Value, index: &Value) -> Result<Value, Failure> {
    match container {
        Value::Array(items) => {
            let i = seq_index(index, items.len(), "list")?;
            Ok(items[i].clone())
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = seq_index(index, chars.len(), "string")?;
            Ok(Value::String(chars[i].to_string()))
        }
        Value::Object(map) => match index {
            Value::String(key) => map
                .get(key)
                .cloned()
                .ok_or_else(|| Failure::key_error(key)),
            other => Err(Failure::new("KeyError", other.to_string())),
        },
        other => Err(Failure::type_error(format!(
            "'{}' object is not subscriptable",
            type_name(other)
        ))),
    }
}

fn seq_index(index: &Value, len: usize, what: &str) -> Result<usize, Failure> {
    let Some(Num::Int(i)) = Num::from_value(index) else {
        return Err(Failure::type_error(format!(
            "{what} indices must be integers, not '{}'",
            type_name(index)
        )));
    };
    let len = i64::try_from(len).map_err(|_| overflow())?;
    let resolved = if i < 0 { i + len } else { i };
    if (0..len).contains(&resolved) {
        usize::try_from(resolved).map_err(|_| overflow())
    } else {
        Err(Failure::new("IndexError", format!("{what} index out of range")))
    }
}

/// `value.attr`: key lookup on objects.
pub fn attribute(value: &Value, attr: &str) -> Result<Value, Failure> {
    match value {
        Value::Object(map) => map.get(attr).cloned().ok_or_else(|| {
            Failure::new("AttributeError", format!("'dict' object has no attribute '{attr}'"))
        }),
        other => Err(Failure::new(
            "AttributeError",
            format!("'{}' object has no attribute '{attr}'", type_name(other)),
        )),
    }
}
