//! Generic ordered step execution with checkpointing.
//!
//! The [`WorkflowRunner`] enforces the rules every migration step lives by:
//!
//! - every step must be idempotent, or nothing runs at all
//! - steps already marked completed are skipped
//! - mutating steps only run when mutations are allowed
//! - any `Block` finding halts the run and leaves the step unmarked
//!
//! Cancellation is observed at step boundaries only.

mod runner;
mod step;

pub use runner::{Outcome, StepRecord, WorkflowReport, WorkflowRunner};
pub use step::{FnStep, Step, StepContext};
