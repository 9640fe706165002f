//! Loaded programs.
//!
//! Loading runs every analysis once per function and freezes the results
//! next to the IR; closures share the frozen prototypes.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use luma_analysis::{analyze_module, FunctionAnalysis};
use luma_exec::{Completion, DirectExecutor, FunctionRef, Value};
use luma_ir::{FunctionId, IrFunction, IrModule};

use crate::closure::{new_cell, LuaClosure};
use crate::config::EvalConfig;
use crate::env::default_env;
use crate::errors::{LoadError, RunError};

/// A function together with its analysis results.
#[derive(Debug)]
pub(crate) struct Prototype {
    pub(crate) function: IrFunction,
    pub(crate) analysis: FunctionAnalysis,
}

#[derive(Debug)]
pub(crate) struct ProgramShared {
    main: FunctionId,
    prototypes: FxHashMap<FunctionId, Arc<Prototype>>,
    pub(crate) config: EvalConfig,
}

impl ProgramShared {
    pub(crate) fn prototype(&self, id: FunctionId) -> Option<Arc<Prototype>> {
        self.prototypes.get(&id).map(Arc::clone)
    }
}

/// An analyzed module, ready to instantiate closures from.
#[derive(Clone, Debug)]
pub struct Program {
    shared: Arc<ProgramShared>,
}

impl Program {
    pub fn load(module: &IrModule) -> Result<Self, LoadError> {
        Self::load_with_config(module, EvalConfig::default())
    }

    pub fn load_with_config(module: &IrModule, config: EvalConfig) -> Result<Self, LoadError> {
        let analysis = analyze_module(module)?;
        let mut prototypes = FxHashMap::default();
        for function in module.functions() {
            let Some(facts) = analysis.function(function.id) else {
                return Err(LoadError::UnknownFunction(function.id));
            };
            let proto = Prototype {
                function: function.clone(),
                analysis: facts.clone(),
            };
            prototypes.insert(function.id, Arc::new(proto));
        }
        debug!(
            main = %module.main(),
            functions = prototypes.len(),
            "program loaded"
        );
        Ok(Program {
            shared: Arc::new(ProgramShared {
                main: module.main(),
                prototypes,
                config,
            }),
        })
    }

    pub fn main(&self) -> FunctionId {
        self.shared.main
    }

    pub fn config(&self) -> &EvalConfig {
        &self.shared.config
    }

    /// Instantiate function `id`; each upvalue gets a fresh cell.
    pub fn closure(&self, id: FunctionId, upvalues: Vec<Value>) -> Result<FunctionRef, LoadError> {
        let proto = self
            .shared
            .prototype(id)
            .ok_or(LoadError::UnknownFunction(id))?;
        let expected = proto.function.upvalue_count;
        if upvalues.len() != expected as usize {
            return Err(LoadError::UpvalueCount {
                function: id,
                expected,
                got: upvalues.len(),
            });
        }
        let cells = upvalues.into_iter().map(new_cell).collect();
        Ok(Arc::new(LuaClosure::new(Arc::clone(&self.shared), proto, cells)))
    }

    /// The main function closed over the default environment, which it
    /// sees as its single upvalue (`_ENV`). A main function without
    /// upvalues gets none.
    pub fn main_closure(&self) -> Result<FunctionRef, LoadError> {
        let main = self.shared.main;
        let wants_env = self
            .shared
            .prototype(main)
            .is_some_and(|proto| proto.function.upvalue_count > 0);
        let upvalues = if wants_env {
            vec![Value::Table(default_env())]
        } else {
            Vec::new()
        };
        self.closure(main, upvalues)
    }

    /// Run the main function to completion on `executor`.
    pub fn run(&self, executor: &DirectExecutor, args: Vec<Value>) -> Result<Completion, RunError> {
        let main = self.main_closure()?;
        Ok(executor.run(main, args)?)
    }
}
