//! Function-level IR containers and the builder front ends use to emit
//! them.

use rustc_hash::FxHashMap;

use crate::code::{CfgError, Code, CodeBuilder};
use crate::ids::{FunctionId, Label, MultiVal, PhiVal, Val, Var};
use crate::node::{BranchCondition, Node, Terminator};

/// A single compiled Lua function body.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct IrFunction {
    pub id: FunctionId,
    /// Debug name (`"main chunk"`, `"f"`, ...).
    pub name: String,
    /// Parameter variables in declaration order.
    pub params: Vec<Var>,
    /// Whether the function accepts `...`.
    pub is_vararg: bool,
    /// Number of upvalues the function expects at instantiation.
    pub upvalue_count: u32,
    pub code: Code,
}

/// Errors raised when assembling an [`IrModule`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ModuleError {
    #[error("function {0} is defined more than once")]
    DuplicateFunction(FunctionId),
    #[error("main function {0} is not defined")]
    MissingMain(FunctionId),
}

/// A compilation unit: every function of a chunk, keyed by id.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct IrModule {
    main: FunctionId,
    functions: FxHashMap<FunctionId, IrFunction>,
}

impl IrModule {
    pub fn new(main: FunctionId, functions: Vec<IrFunction>) -> Result<Self, ModuleError> {
        let mut map = FxHashMap::default();
        for f in functions {
            let id = f.id;
            if map.insert(id, f).is_some() {
                return Err(ModuleError::DuplicateFunction(id));
            }
        }
        if !map.contains_key(&main) {
            return Err(ModuleError::MissingMain(main));
        }
        Ok(Self {
            main,
            functions: map,
        })
    }

    pub fn main(&self) -> FunctionId {
        self.main
    }

    pub fn function(&self, id: FunctionId) -> Option<&IrFunction> {
        self.functions.get(&id)
    }

    pub fn functions(&self) -> impl Iterator<Item = &IrFunction> {
        self.functions.values()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Builder for one [`IrFunction`]: allocates fresh entities and wraps a
/// [`CodeBuilder`] positioned on the entry block.
#[derive(Debug)]
pub struct FunctionBuilder {
    id: FunctionId,
    name: String,
    params: Vec<Var>,
    is_vararg: bool,
    upvalue_count: u32,
    next_val: u32,
    next_phi: u32,
    next_multi: u32,
    next_var: u32,
    code: CodeBuilder,
}

impl FunctionBuilder {
    pub fn new(id: FunctionId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            params: Vec::new(),
            is_vararg: false,
            upvalue_count: 0,
            next_val: 0,
            next_phi: 0,
            next_multi: 0,
            next_var: 0,
            code: CodeBuilder::new(),
        }
    }

    /// Declare the next parameter.
    pub fn param(&mut self) -> Var {
        let var = self.var();
        self.params.push(var);
        var
    }

    pub fn set_vararg(&mut self, is_vararg: bool) -> &mut Self {
        self.is_vararg = is_vararg;
        self
    }

    pub fn set_upvalue_count(&mut self, count: u32) -> &mut Self {
        self.upvalue_count = count;
        self
    }

    pub fn val(&mut self) -> Val {
        let v = Val::new(self.next_val);
        self.next_val += 1;
        v
    }

    pub fn phi(&mut self) -> PhiVal {
        let p = PhiVal::new(self.next_phi);
        self.next_phi += 1;
        p
    }

    pub fn multi(&mut self) -> MultiVal {
        let m = MultiVal::new(self.next_multi);
        self.next_multi += 1;
        m
    }

    pub fn var(&mut self) -> Var {
        let v = Var::new(self.next_var);
        self.next_var += 1;
        v
    }

    pub fn label(&mut self) -> Label {
        self.code.new_label()
    }

    /// See [`CodeBuilder::add_label`].
    pub fn add_label(&mut self, label: Label) -> &mut Self {
        self.code.add_label(label);
        self
    }

    /// See [`CodeBuilder::add_node`].
    pub fn add(&mut self, node: Node) -> &mut Self {
        self.code.add_node(node);
        self
    }

    /// See [`CodeBuilder::add_terminator`].
    pub fn terminate(&mut self, terminator: Terminator) -> &mut Self {
        self.code.add_terminator(terminator);
        self
    }

    /// See [`CodeBuilder::add_branch`].
    pub fn branch(&mut self, condition: BranchCondition, target: Label) -> Label {
        self.code.add_branch(condition, target)
    }

    pub fn finish(self) -> Result<IrFunction, CfgError> {
        let code = self.code.build()?;
        Ok(IrFunction {
            id: self.id,
            name: self.name,
            params: self.params,
            is_vararg: self.is_vararg,
            upvalue_count: self.upvalue_count,
            code,
        })
    }
}
