//! Identity newtypes for IR entities.
//!
//! Every entity of a function body (temporaries, phi values, multi-value
//! groups, locals, upvalues, block labels) is named by a dense `u32` index
//! allocated by the [`FunctionBuilder`](crate::FunctionBuilder). Indices are
//! only meaningful within the function that allocated them.

use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Create an ID from a raw index.
            #[inline]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// Get the raw `u32` value.
            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }

            /// Get the index as `usize` (for indexing into `Vec`s).
            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(
    /// SSA temporary: defined exactly once along any execution path.
    Val,
    "$"
);

define_id!(
    /// Merge-point value. Defined by a `PhiStore` on every incoming edge
    /// and read by `PhiLoad` in the merge block; one storage location.
    PhiVal,
    "^"
);

define_id!(
    /// Variable-length value group (call results, varargs).
    ///
    /// Never allocated a scalar slot.
    MultiVal,
    "*"
);

define_id!(
    /// Mutable local variable.
    Var,
    "%"
);

define_id!(
    /// Reference to a variable owned by an enclosing function.
    ///
    /// The index is the position in the closure's capture list.
    UpVar,
    "@"
);

define_id!(
    /// Opaque basic block identity.
    Label,
    "L"
);

define_id!(
    /// Identity of a function within an [`IrModule`](crate::IrModule).
    FunctionId,
    "fn"
);

/// A value that occupies a scalar slot: an SSA temporary or a phi value.
///
/// Liveness and slot allocation track both kinds in one lattice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueId {
    Val(Val),
    Phi(PhiVal),
}

impl From<Val> for ValueId {
    fn from(v: Val) -> Self {
        ValueId::Val(v)
    }
}

impl From<PhiVal> for ValueId {
    fn from(p: PhiVal) -> Self {
        ValueId::Phi(p)
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueId::Val(v) => v.fmt(f),
            ValueId::Phi(p) => p.fmt(f),
        }
    }
}

/// A variable reference captured by closure creation: either a local of
/// the current function or one of its own upvalues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Capture {
    Var(Var),
    UpVar(UpVar),
}

impl fmt::Display for Capture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capture::Var(v) => v.fmt(f),
            Capture::UpVar(u) => u.fmt(f),
        }
    }
}

/// Position of a node inside a [`Code`](crate::Code).
///
/// `index` addresses the block body; `index == body.len()` designates the
/// block's terminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId {
    pub label: Label,
    pub index: u32,
}

impl NodeId {
    #[inline]
    pub const fn new(label: Label, index: u32) -> Self {
        Self { label, index }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.label, self.index)
    }
}
