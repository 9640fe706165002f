//! Interpreter configuration.

/// Limits applied to every closure of a [`Program`](crate::Program).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvalConfig {
    /// Maximum depth of nested direct calls before "stack overflow" is
    /// raised as a guest error.
    pub max_call_depth: usize,
}

impl EvalConfig {
    pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;

    #[must_use]
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            max_call_depth: Self::DEFAULT_MAX_CALL_DEPTH,
        }
    }
}
