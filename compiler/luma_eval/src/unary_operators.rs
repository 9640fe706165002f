//! Unary operator implementations for the interpreter.

use luma_exec::{LuaError, Value};
use luma_ir::UnOp;

use crate::errors;
use crate::operators::{to_integer, Number};

/// Evaluate `op operand`.
pub fn evaluate_unary(op: UnOp, operand: &Value) -> Result<Value, LuaError> {
    match op {
        UnOp::Unm => match Number::coerce(operand) {
            Some(Number::Int(i)) => Ok(Value::Integer(i.wrapping_neg())),
            Some(Number::Float(f)) => Ok(Value::Float(-f)),
            None => Err(errors::arith_on(operand)),
        },
        UnOp::Not => Ok(Value::Boolean(!operand.is_truthy())),
        UnOp::Len => match operand {
            Value::String(s) => Ok(Value::Integer(i64::try_from(s.len()).unwrap_or(i64::MAX))),
            Value::Table(t) => Ok(Value::Integer(t.border())),
            other => Err(errors::length_of(other)),
        },
        UnOp::BNot => to_integer(operand).map(|i| Value::Integer(!i)),
    }
}
