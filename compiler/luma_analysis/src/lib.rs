//! Static analyses over Luma IR.
//!
//! This crate provides the passes a backend needs before it can execute or
//! compile a function:
//!
//! - **Liveness** ([`compute_liveness`]): per-node live variables and
//!   values, by backward dataflow.
//! - **Type inference** ([`infer_types`]): per-value types on the
//!   [`Type`](luma_ir::Type) lattice plus per-node [`Effects`].
//! - **Slot allocation** ([`allocate_slots`]): frame register indices,
//!   driven by liveness.
//! - **Dependencies** ([`collect_dependencies`]): nested functions
//!   instantiated by closure nodes.
//!
//! [`analyze_function`] runs all four and bundles the results;
//! [`analyze_module`] does so for every function of a module in parallel.
//!
//! # Crate Dependencies
//!
//! `luma_analysis` depends only on `luma_ir`. It has no notion of runtime
//! values; see `luma_exec` and `luma_eval` for execution.

pub mod deps;
pub mod liveness;
pub mod slots;
pub mod typing;

#[cfg(test)]
mod test_helpers;

use rayon::prelude::*;
use rustc_hash::FxHashMap;

use luma_ir::{FunctionId, IrFunction, IrModule};

pub use deps::{collect_dependencies, DependencyInfo};
pub use liveness::{compute_liveness, Entry, LiveSets, LivenessInfo};
pub use slots::{allocate_slots, Entity, SlotAllocError, SlotAllocInfo};
pub use typing::{binop_type, infer_types, unop_type, Effects, NumericPolicy, TypeInfo};

/// Errors from the analysis pipeline.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    #[error("slot allocation failed in {function}")]
    SlotAlloc {
        function: FunctionId,
        #[source]
        source: SlotAllocError,
    },
    #[error("{referrer} instantiates {missing}, which is not part of the module")]
    UnknownFunction {
        referrer: FunctionId,
        missing: FunctionId,
    },
    #[error("{referrer} captures {captured} values for {function}, which expects {expected}")]
    CaptureMismatch {
        referrer: FunctionId,
        function: FunctionId,
        captured: usize,
        expected: u32,
    },
}

/// Every analysis result for one function.
#[derive(Clone, Debug)]
pub struct FunctionAnalysis {
    pub liveness: LivenessInfo,
    pub types: TypeInfo,
    pub slots: SlotAllocInfo,
    pub dependencies: DependencyInfo,
}

/// Run every analysis on `function`.
///
/// Liveness and type inference are independent and run concurrently; slot
/// allocation needs liveness and runs after both.
pub fn analyze_function(function: &IrFunction) -> Result<FunctionAnalysis, AnalysisError> {
    let _span = tracing::debug_span!("analyze_function", function = %function.id).entered();

    let (liveness, types) = rayon::join(
        || compute_liveness(&function.code),
        || infer_types(function),
    );
    let slots = allocate_slots(function, &liveness).map_err(|source| {
        AnalysisError::SlotAlloc {
            function: function.id,
            source,
        }
    })?;
    let dependencies = collect_dependencies(function);

    Ok(FunctionAnalysis {
        liveness,
        types,
        slots,
        dependencies,
    })
}

/// Analysis results for a whole module.
#[derive(Clone, Debug)]
pub struct ModuleAnalysis {
    functions: FxHashMap<FunctionId, FunctionAnalysis>,
}

impl ModuleAnalysis {
    pub fn function(&self, id: FunctionId) -> Option<&FunctionAnalysis> {
        self.functions.get(&id)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Analyze every function of `module` in parallel and check that every
/// closure names a function of the module with a matching upvalue count.
///
/// When several functions fail, the error reported is the one of the
/// lowest function id.
pub fn analyze_module(module: &IrModule) -> Result<ModuleAnalysis, AnalysisError> {
    tracing::debug!(num_functions = module.len(), "analyzing module");

    let mut results: Vec<(FunctionId, Result<FunctionAnalysis, AnalysisError>)> = module
        .functions()
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|f| (f.id, analyze_function(f)))
        .collect();
    results.sort_unstable_by_key(|(id, _)| *id);

    let mut functions = FxHashMap::default();
    for (id, result) in results {
        functions.insert(id, result?);
    }

    let mut referrers: Vec<&FunctionId> = functions.keys().collect();
    referrers.sort_unstable();
    for &referrer in referrers {
        let deps = &functions[&referrer].dependencies;
        for nested in deps.functions() {
            let Some(target) = module.function(nested) else {
                return Err(AnalysisError::UnknownFunction {
                    referrer,
                    missing: nested,
                });
            };
            let expected = usize::try_from(target.upvalue_count).ok();
            let mismatch = deps
                .capture_counts(nested)
                .iter()
                .find(|&&count| Some(count) != expected);
            if let Some(&captured) = mismatch {
                return Err(AnalysisError::CaptureMismatch {
                    referrer,
                    function: nested,
                    captured,
                    expected: target.upvalue_count,
                });
            }
        }
    }

    Ok(ModuleAnalysis { functions })
}
