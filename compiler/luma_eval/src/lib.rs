//! Reference interpreter for Luma IR.
//!
//! [`Program::load`] analyzes a module; its closures execute nodes over a
//! register frame laid out by slot allocation and take part in the
//! resumable execution protocol of `luma_exec`: any interrupted closure
//! saves its frame into the passing signal and continues from the same
//! node when resumed.
//!
//! - [`operators`], [`unary_operators`]: Lua arithmetic, comparison and
//!   coercion rules.
//! - [`env`]: the default global environment.

mod closure;
mod config;
pub mod env;
mod errors;
pub mod operators;
mod program;
mod stack;
pub mod unary_operators;

#[cfg(test)]
mod test_helpers;

pub use closure::LuaClosure;
pub use config::EvalConfig;
pub use env::default_env;
pub use errors::{LoadError, RunError};
pub use operators::{evaluate_binary, loop_ended, to_number};
pub use program::Program;
pub use unary_operators::evaluate_unary;

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Safe to call multiple times. Enable with `RUST_LOG=luma_eval=debug`
/// (or `trace` to see calls and preemption points).
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
