//! Raw Lua tables.
//!
//! A table has an array part for keys `1..=n` and a hash part for
//! everything else. Float keys with an exact integer value are normalized
//! to integers, so `t[1]` and `t[1.0]` name the same slot. Metatables are
//! not modeled.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::errors::{self, LuaError};
use crate::value::{float_to_integer, function_address, Value};

/// A normalized, hashable table key. Never `nil` or NaN.
#[derive(Clone, Debug)]
struct TableKey(Value);

impl TableKey {
    fn new(key: &Value) -> Result<TableKey, LuaError> {
        match key {
            Value::Nil => Err(errors::table_index_is_nil()),
            Value::Float(f) if f.is_nan() => Err(errors::table_index_is_nan()),
            Value::Float(f) => Ok(TableKey(
                float_to_integer(*f).map_or(Value::Float(*f), Value::Integer),
            )),
            other => Ok(TableKey(other.clone())),
        }
    }
}

impl PartialEq for TableKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.raw_eq(&other.0)
    }
}

impl Eq for TableKey {}

impl Hash for TableKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(&self.0).hash(state);
        match &self.0 {
            Value::Nil => {}
            Value::Boolean(b) => b.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::Table(t) => t.address().hash(state),
            Value::Function(f) => function_address(f).hash(state),
            Value::Coroutine(c) => c.address().hash(state),
        }
    }
}

/// Table storage.
#[derive(Debug, Default)]
pub struct Table {
    array: Vec<Value>,
    hash: FxHashMap<TableKey, Value>,
}

impl Table {
    pub fn with_capacity(array_size: usize, hash_size: usize) -> Self {
        Self {
            array: Vec::with_capacity(array_size),
            hash: FxHashMap::with_capacity_and_hasher(hash_size, Default::default()),
        }
    }

    fn array_index(&self, key: &Value) -> Option<usize> {
        let i = match key {
            Value::Integer(i) => *i,
            Value::Float(f) => float_to_integer(*f)?,
            _ => return None,
        };
        let idx = usize::try_from(i).ok()?.checked_sub(1)?;
        (idx <= self.array.len()).then_some(idx)
    }

    pub fn get(&self, key: &Value) -> Value {
        if let Some(idx) = self.array_index(key) {
            return self.array.get(idx).cloned().unwrap_or_default();
        }
        match TableKey::new(key) {
            Ok(k) => self.hash.get(&k).cloned().unwrap_or_default(),
            Err(_) => Value::Nil,
        }
    }

    pub fn set(&mut self, key: &Value, value: Value) -> Result<(), LuaError> {
        if let Some(idx) = self.array_index(key) {
            if idx == self.array.len() {
                if value.is_nil() {
                    return Ok(());
                }
                self.array.push(value);
                self.migrate_from_hash();
            } else {
                self.array[idx] = value;
                while self.array.last().is_some_and(Value::is_nil) {
                    self.array.pop();
                }
            }
            return Ok(());
        }
        let key = TableKey::new(key)?;
        if value.is_nil() {
            self.hash.remove(&key);
        } else {
            self.hash.insert(key, value);
        }
        Ok(())
    }

    /// Move `n+1, n+2, ...` from the hash part once the array part reaches
    /// them.
    fn migrate_from_hash(&mut self) {
        loop {
            let next = i64::try_from(self.array.len() + 1).unwrap_or(i64::MAX);
            match self.hash.remove(&TableKey(Value::Integer(next))) {
                Some(v) => self.array.push(v),
                None => break,
            }
        }
    }

    /// A border: `t[n] ~= nil and t[n+1] == nil`.
    pub fn border(&self) -> i64 {
        i64::try_from(self.array.len()).unwrap_or(i64::MAX)
    }
}

/// Shared, lockable handle to a [`Table`]. Identity is the allocation.
#[derive(Clone, Debug, Default)]
pub struct TableRef(Arc<Mutex<Table>>);

impl TableRef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(array_size: usize, hash_size: usize) -> Self {
        TableRef(Arc::new(Mutex::new(Table::with_capacity(
            array_size, hash_size,
        ))))
    }

    pub fn get(&self, key: &Value) -> Value {
        self.0.lock().get(key)
    }

    pub fn set(&self, key: &Value, value: Value) -> Result<(), LuaError> {
        self.0.lock().set(key, value)
    }

    /// Convenience for string-keyed fields.
    pub fn get_field(&self, name: &str) -> Value {
        self.get(&Value::string(name))
    }

    pub fn set_field(&self, name: &str, value: Value) {
        // String keys are never nil or NaN.
        let _ = self.set(&Value::string(name), value);
    }

    pub fn border(&self) -> i64 {
        self.0.lock().border()
    }

    pub fn ptr_eq(&self, other: &TableRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn address(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}
