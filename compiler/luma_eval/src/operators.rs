//! Binary operator implementations for the interpreter.
//!
//! Direct enum-based dispatch on [`BinOp`]. Arithmetic follows Lua 5.4:
//! integers wrap around, `/` and `^` always produce floats, `//` and `%`
//! round towards negative infinity, and strings are coerced to numbers.
//! Comparisons between integers and floats are exact.

use luma_exec::value::float_to_integer;
use luma_exec::{LuaError, Value};
use luma_ir::BinOp;

use crate::errors;

/// A Lua number, after optional string coercion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    /// Numbers only.
    pub(crate) fn of(value: &Value) -> Option<Number> {
        match value {
            Value::Integer(i) => Some(Number::Int(*i)),
            Value::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }

    /// Numbers and numeric strings.
    pub(crate) fn coerce(value: &Value) -> Option<Number> {
        match value {
            Value::String(s) => str_to_number(s),
            other => Number::of(other),
        }
    }

    #[expect(clippy::cast_precision_loss, reason = "Lua integer to float conversion")]
    pub(crate) fn to_float(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    pub(crate) fn into_value(self) -> Value {
        match self {
            Number::Int(i) => Value::Integer(i),
            Number::Float(f) => Value::Float(f),
        }
    }
}

/// Convert a numeric string (`"10"`, `" 0x1F "`, `"1e3"`). Decimal
/// integers that overflow become floats; hexadecimal ones wrap around.
pub(crate) fn str_to_number(s: &str) -> Option<Number> {
    let t = s.trim();
    let (negative, body) = match t.as_bytes().first()? {
        b'-' => (true, &t[1..]),
        b'+' => (false, &t[1..]),
        _ => (false, t),
    };
    if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        if hex.is_empty() {
            return None;
        }
        let mut n: i64 = 0;
        for c in hex.chars() {
            n = n.wrapping_mul(16).wrapping_add(i64::from(c.to_digit(16)?));
        }
        return Some(Number::Int(if negative { n.wrapping_neg() } else { n }));
    }
    if body.is_empty() {
        return None;
    }
    if body.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(i) = t.parse::<i64>() {
            return Some(Number::Int(i));
        }
    }
    // Rust accepts "inf" and "nan"; Lua does not.
    if body.bytes().any(|b| b.is_ascii_alphabetic() && b != b'e' && b != b'E') {
        return None;
    }
    t.parse::<f64>().ok().map(Number::Float)
}

/// Integer view for bitwise operators.
pub(crate) fn to_integer(value: &Value) -> Result<i64, LuaError> {
    match Number::coerce(value) {
        Some(Number::Int(i)) => Ok(i),
        Some(Number::Float(f)) => float_to_integer(f).ok_or_else(errors::no_integer_representation),
        None => Err(errors::bitwise_on(value)),
    }
}

// ── Dispatch ────────────────────────────────────────────────────────

/// Evaluate `left op right`.
pub fn evaluate_binary(op: BinOp, left: &Value, right: &Value) -> Result<Value, LuaError> {
    match op {
        BinOp::Add => arith(Arith::Add, left, right),
        BinOp::Sub => arith(Arith::Sub, left, right),
        BinOp::Mul => arith(Arith::Mul, left, right),
        BinOp::Div => arith(Arith::Div, left, right),
        BinOp::IDiv => arith(Arith::IDiv, left, right),
        BinOp::Mod => arith(Arith::Mod, left, right),
        BinOp::Pow => arith(Arith::Pow, left, right),
        BinOp::BAnd => bitwise(left, right, |a, b| a & b),
        BinOp::BOr => bitwise(left, right, |a, b| a | b),
        BinOp::BXor => bitwise(left, right, |a, b| a ^ b),
        BinOp::Shl => bitwise(left, right, shift_left),
        BinOp::Shr => bitwise(left, right, |a, b| shift_left(a, b.wrapping_neg())),
        BinOp::Concat => concat(left, right),
        BinOp::Eq => Ok(Value::Boolean(left.raw_eq(right))),
        BinOp::Neq => Ok(Value::Boolean(!left.raw_eq(right))),
        BinOp::Lt => less_than(left, right).map(Value::Boolean),
        BinOp::Le => less_equal(left, right).map(Value::Boolean),
    }
}

// ── Arithmetic ──────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug)]
enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
}

fn arith(op: Arith, left: &Value, right: &Value) -> Result<Value, LuaError> {
    let Some(a) = Number::coerce(left) else {
        return Err(errors::arith_on(left));
    };
    let Some(b) = Number::coerce(right) else {
        return Err(errors::arith_on(right));
    };
    if let (Number::Int(x), Number::Int(y)) = (a, b) {
        if let Some(result) = int_arith(op, x, y) {
            return result.map(Value::Integer);
        }
    }
    Ok(Value::Float(float_arith(op, a.to_float(), b.to_float())))
}

/// Integer result of `x op y`, or `None` when the operator always
/// produces a float.
fn int_arith(op: Arith, x: i64, y: i64) -> Option<Result<i64, LuaError>> {
    match op {
        Arith::Add => Some(Ok(x.wrapping_add(y))),
        Arith::Sub => Some(Ok(x.wrapping_sub(y))),
        Arith::Mul => Some(Ok(x.wrapping_mul(y))),
        Arith::IDiv => Some(floor_div(x, y)),
        Arith::Mod => Some(floor_mod(x, y)),
        Arith::Div | Arith::Pow => None,
    }
}

fn float_arith(op: Arith, a: f64, b: f64) -> f64 {
    match op {
        Arith::Add => a + b,
        Arith::Sub => a - b,
        Arith::Mul => a * b,
        Arith::Div => a / b,
        Arith::Pow => a.powf(b),
        Arith::IDiv => (a / b).floor(),
        Arith::Mod => {
            let m = a % b;
            let adjust = if m > 0.0 { b < 0.0 } else { m < 0.0 && b != m };
            if adjust {
                m + b
            } else {
                m
            }
        }
    }
}

/// Integer floor division.
pub(crate) fn floor_div(x: i64, y: i64) -> Result<i64, LuaError> {
    if y == 0 {
        return Err(errors::integer_division_by_zero());
    }
    let q = x.wrapping_div(y);
    if x.wrapping_rem(y) != 0 && (x ^ y) < 0 {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

/// Integer modulo with the sign of the divisor.
pub(crate) fn floor_mod(x: i64, y: i64) -> Result<i64, LuaError> {
    if y == 0 {
        return Err(errors::integer_modulo_by_zero());
    }
    let r = x.wrapping_rem(y);
    if r != 0 && (r ^ y) < 0 {
        Ok(r + y)
    } else {
        Ok(r)
    }
}

// ── Bitwise ─────────────────────────────────────────────────────────

fn bitwise(left: &Value, right: &Value, op: fn(i64, i64) -> i64) -> Result<Value, LuaError> {
    let a = to_integer(left)?;
    let b = to_integer(right)?;
    Ok(Value::Integer(op(a, b)))
}

/// Logical shift; negative amounts shift right.
#[expect(
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_possible_truncation,
    reason = "shifts operate on the raw 64-bit pattern"
)]
fn shift_left(x: i64, n: i64) -> i64 {
    if n <= -64 || n >= 64 {
        0
    } else if n >= 0 {
        ((x as u64) << n as u32) as i64
    } else {
        ((x as u64) >> (-n) as u32) as i64
    }
}

// ── Concatenation ───────────────────────────────────────────────────

fn concat(left: &Value, right: &Value) -> Result<Value, LuaError> {
    fn piece(value: &Value) -> bool {
        matches!(
            value,
            Value::String(_) | Value::Integer(_) | Value::Float(_)
        )
    }
    if !piece(left) {
        return Err(errors::concat_on(left));
    }
    if !piece(right) {
        return Err(errors::concat_on(right));
    }
    Ok(Value::string(format!("{left}{right}")))
}

// ── Comparison ──────────────────────────────────────────────────────

/// 2^63, the first float above `i64::MAX`.
const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

/// Whether `f` rounds to a value inside the `i64` range.
fn in_i64_range(f: f64) -> bool {
    (-TWO_POW_63..TWO_POW_63).contains(&f)
}

#[expect(clippy::cast_possible_truncation, reason = "range is checked before the cast")]
fn int_lt_float(i: i64, f: f64) -> bool {
    if in_i64_range(f) {
        i < f.ceil() as i64
    } else {
        f > 0.0
    }
}

#[expect(clippy::cast_possible_truncation, reason = "range is checked before the cast")]
fn int_le_float(i: i64, f: f64) -> bool {
    if in_i64_range(f) {
        i <= f.floor() as i64
    } else {
        f > 0.0
    }
}

#[expect(clippy::cast_possible_truncation, reason = "range is checked before the cast")]
fn float_lt_int(f: f64, i: i64) -> bool {
    if in_i64_range(f) {
        (f.floor() as i64) < i
    } else {
        f < 0.0
    }
}

#[expect(clippy::cast_possible_truncation, reason = "range is checked before the cast")]
fn float_le_int(f: f64, i: i64) -> bool {
    if in_i64_range(f) {
        (f.ceil() as i64) <= i
    } else {
        f < 0.0
    }
}

pub(crate) fn num_lt(a: Number, b: Number) -> bool {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => x < y,
        (Number::Float(x), Number::Float(y)) => x < y,
        (Number::Int(i), Number::Float(f)) => int_lt_float(i, f),
        (Number::Float(f), Number::Int(i)) => float_lt_int(f, i),
    }
}

pub(crate) fn num_le(a: Number, b: Number) -> bool {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => x <= y,
        (Number::Float(x), Number::Float(y)) => x <= y,
        (Number::Int(i), Number::Float(f)) => int_le_float(i, f),
        (Number::Float(f), Number::Int(i)) => float_le_int(f, i),
    }
}

fn less_than(left: &Value, right: &Value) -> Result<bool, LuaError> {
    if let (Some(a), Some(b)) = (Number::of(left), Number::of(right)) {
        return Ok(num_lt(a, b));
    }
    match (left, right) {
        (Value::String(a), Value::String(b)) => Ok(a < b),
        _ => Err(errors::compare(left, right)),
    }
}

fn less_equal(left: &Value, right: &Value) -> Result<bool, LuaError> {
    if let (Some(a), Some(b)) = (Number::of(left), Number::of(right)) {
        return Ok(num_le(a, b));
    }
    match (left, right) {
        (Value::String(a), Value::String(b)) => Ok(a <= b),
        _ => Err(errors::compare(left, right)),
    }
}

/// Whether a numeric `for` loop has run past its limit.
pub fn loop_ended(var: &Value, limit: &Value, step: &Value) -> Result<bool, LuaError> {
    let var = Number::of(var).ok_or_else(|| errors::for_value_not_number("initial value"))?;
    let limit = Number::of(limit).ok_or_else(|| errors::for_value_not_number("limit"))?;
    let step = Number::of(step).ok_or_else(|| errors::for_value_not_number("step"))?;
    if num_lt(Number::Int(0), step) {
        Ok(num_lt(limit, var))
    } else {
        Ok(num_lt(var, limit))
    }
}

/// `tonumber` without a base: numbers pass through, numeric strings are
/// converted.
pub fn to_number(value: &Value) -> Option<Value> {
    Number::coerce(value).map(Number::into_value)
}
