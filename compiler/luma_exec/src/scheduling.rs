//! Cooperative scheduling.
//!
//! Backends report work at their cost-accounting points through
//! [`SchedulingContext::register_ticks`] and preempt when
//! [`SchedulingContext::should_yield`] says so. A fresh context is created
//! for every resume of a [`Continuation`](crate::Continuation).

/// Scheduling hooks consulted by running units.
pub trait SchedulingContext {
    /// Whether the running unit should preempt at its next opportunity.
    fn should_yield(&self) -> bool;

    /// Account for `ticks` units of work.
    fn register_ticks(&mut self, ticks: u64);
}

/// Never asks to yield.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unbounded;

impl SchedulingContext for Unbounded {
    fn should_yield(&self) -> bool {
        false
    }

    fn register_ticks(&mut self, _ticks: u64) {}
}

/// Asks to yield once a tick budget is used up.
#[derive(Clone, Copy, Debug)]
pub struct TickBudget {
    budget: u64,
    used: u64,
}

impl TickBudget {
    pub fn new(budget: u64) -> Self {
        Self { budget, used: 0 }
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn remaining(&self) -> u64 {
        self.budget.saturating_sub(self.used)
    }
}

impl SchedulingContext for TickBudget {
    fn should_yield(&self) -> bool {
        self.used >= self.budget
    }

    fn register_ticks(&mut self, ticks: u64) {
        self.used = self.used.saturating_add(ticks);
    }
}

/// How an executor schedules the calls it drives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SchedulingPolicy {
    /// Run every resume to completion or to its next signal.
    #[default]
    Unbounded,
    /// Preempt after this many ticks per resume.
    TickBudget(u64),
}

impl SchedulingPolicy {
    /// A fresh context for one resume.
    pub fn context(self) -> Box<dyn SchedulingContext + Send> {
        match self {
            SchedulingPolicy::Unbounded => Box::new(Unbounded),
            SchedulingPolicy::TickBudget(budget) => Box::new(TickBudget::new(budget)),
        }
    }
}
