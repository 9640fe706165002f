//! Static type lattice used by type inference.
//!
//! The lattice is flat except for the numeric tower:
//!
//! ```text
//!                         Any
//!     /      |       |     |      |       \        \
//!   Nil  Boolean  Number  String  Table  Function
//!                 /    \
//!            Integer   Float
//! ```
//!
//! The absence of a fact (an entity not yet reached by the analysis) acts
//! as bottom, so there is no explicit bottom element.

use std::fmt;

/// Inferred static type of a single value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Type {
    Nil,
    Boolean,
    Integer,
    Float,
    /// Integer or float, not known which.
    Number,
    String,
    Table,
    Function,
    /// Top: any value, including ones with metatables.
    Any,
}

impl Type {
    /// Least upper bound of two types.
    #[must_use]
    pub fn join(self, other: Type) -> Type {
        use Type::{Any, Float, Integer, Number};
        if self == other {
            return self;
        }
        match (self, other) {
            (Integer | Float | Number, Integer | Float | Number) => Number,
            _ => Any,
        }
    }

    /// Partial order of the lattice: `self ⊑ other`.
    pub fn is_subtype_of(self, other: Type) -> bool {
        self.join(other) == other
    }

    /// Whether values of this type are definitely numbers.
    #[inline]
    pub fn is_numeric(self) -> bool {
        matches!(self, Type::Integer | Type::Float | Type::Number)
    }

    /// Lua-facing name, as printed in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Type::Nil => "nil",
            Type::Boolean => "boolean",
            Type::Integer => "integer",
            Type::Float => "float",
            Type::Number => "number",
            Type::String => "string",
            Type::Table => "table",
            Type::Function => "function",
            Type::Any => "any",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Inferred static type of a multi-value group.
///
/// A fixed prefix of element types, optionally followed by an unbounded
/// tail of `Any` values (`Any*`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct TypeSeq {
    fixed: Vec<Type>,
    variadic: bool,
}

impl TypeSeq {
    /// An exactly-sized sequence.
    pub fn fixed(types: Vec<Type>) -> Self {
        Self {
            fixed: types,
            variadic: false,
        }
    }

    /// The sequence of any length and any types (`Any*`).
    pub fn vararg() -> Self {
        Self {
            fixed: Vec::new(),
            variadic: true,
        }
    }

    pub fn prefix(&self) -> &[Type] {
        &self.fixed
    }

    pub fn is_variadic(&self) -> bool {
        self.variadic
    }

    /// Type of the element at `idx`.
    ///
    /// Positions past a fixed sequence read as `nil`; positions past a
    /// variadic prefix can be anything.
    pub fn get(&self, idx: usize) -> Type {
        match self.fixed.get(idx) {
            Some(&ty) => ty,
            None if self.variadic => Type::Any,
            None => Type::Nil,
        }
    }

    /// Position-wise least upper bound.
    #[must_use]
    pub fn join(&self, other: &TypeSeq) -> TypeSeq {
        let len = self.fixed.len().max(other.fixed.len());
        let fixed = (0..len).map(|i| self.get(i).join(other.get(i))).collect();
        TypeSeq {
            fixed,
            variadic: self.variadic || other.variadic,
        }
    }
}

impl fmt::Display for TypeSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, ty) in self.fixed.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{ty}")?;
        }
        if self.variadic {
            if !self.fixed.is_empty() {
                f.write_str(", ")?;
            }
            f.write_str("any*")?;
        }
        f.write_str(")")
    }
}
