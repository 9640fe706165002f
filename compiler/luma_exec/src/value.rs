//! Runtime values.
//!
//! Scalars are stored inline; strings, tables, functions and coroutines
//! are shared handles, so cloning a [`Value`] is always cheap. Equality
//! (`PartialEq`) is Lua raw equality: numbers compare by mathematical
//! value, strings by content, everything else by identity.

use std::fmt;
use std::sync::Arc;

use crate::coroutine::Coroutine;
use crate::table::TableRef;
use crate::unit::LuaFunction;

/// Shared handle to a callable unit.
pub type FunctionRef = Arc<dyn LuaFunction>;

/// A Lua value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(Arc<str>),
    Table(TableRef),
    Function(FunctionRef),
    Coroutine(Coroutine),
}

impl Value {
    pub fn string(s: impl Into<Arc<str>>) -> Value {
        Value::String(s.into())
    }

    pub fn function(f: impl LuaFunction + 'static) -> Value {
        Value::Function(Arc::new(f))
    }

    /// Everything except `nil` and `false` is true.
    #[inline]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Lua type name, as returned by `type()`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) | Value::Float(_) => "number",
            Value::String(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
            Value::Coroutine(_) => "thread",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionRef> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_coroutine(&self) -> Option<&Coroutine> {
        match self {
            Value::Coroutine(c) => Some(c),
            _ => None,
        }
    }

    /// Float view of a number, without string coercion.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            #[expect(clippy::cast_precision_loss, reason = "Lua integer to float conversion")]
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Raw equality (no `__eq`).
    pub fn raw_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Integer(i), Value::Float(f)) | (Value::Float(f), Value::Integer(i)) => {
                float_to_integer(*f) == Some(*i)
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => same_function(a, b),
            (Value::Coroutine(a), Value::Coroutine(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

/// Identity comparison on the data pointer only.
pub(crate) fn same_function(a: &FunctionRef, b: &FunctionRef) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

pub(crate) fn function_address(f: &FunctionRef) -> usize {
    Arc::as_ptr(f).cast::<()>() as usize
}

/// The integer a float represents exactly, if any.
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    reason = "range is checked before the cast"
)]
pub fn float_to_integer(f: f64) -> Option<i64> {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < -(i64::MIN as f64) {
        Some(f as i64)
    } else {
        None
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.raw_eq(other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<TableRef> for Value {
    fn from(t: TableRef) -> Self {
        Value::Table(t)
    }
}

impl From<Coroutine> for Value {
    fn from(c: Coroutine) -> Self {
        Value::Coroutine(c)
    }
}

/// Format a float the way Lua's `%.14g` does for common values.
pub(crate) fn format_float(f: f64, out: &mut impl fmt::Write) -> fmt::Result {
    if f.is_nan() {
        out.write_str(if f.is_sign_negative() { "-nan" } else { "nan" })
    } else if f.is_infinite() {
        out.write_str(if f > 0.0 { "inf" } else { "-inf" })
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        write!(out, "{f:.1}")
    } else {
        write!(out, "{f}")
    }
}

/// `tostring` rendering.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => format_float(*x, f),
            Value::String(s) => f.write_str(s),
            Value::Table(t) => write!(f, "table: {:#x}", t.address()),
            Value::Function(func) => write!(f, "function: {:#x}", function_address(func)),
            Value::Coroutine(c) => write!(f, "thread: {:#x}", c.address()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s:?}"),
            Value::Function(func) => write!(f, "function({})", func.name()),
            _ => fmt::Display::fmt(self, f),
        }
    }
}
