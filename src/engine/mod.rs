//! Test sequencing and expression engine
//!
//! Leaf to root: [`expression`] evaluates cell arithmetic, [`directive`]
//! classifies raw cells at load time, [`resolver`] turns them into writes and
//! generators, [`generator`] advances ramps and periodic values, [`waiter`]
//! runs a step's wait phase, [`assertion`] checks outputs and [`sequencer`]
//! drives the whole run.

pub mod assertion;
pub mod comparator;
pub mod context;
pub mod directive;
pub mod expression;
pub mod generator;
pub mod resolver;
pub mod sequencer;
pub mod step;
pub mod waiter;

pub use assertion::{AssertionEngine, AssertionFailure, AssertionOutcome};
pub use context::{RunContext, RunOptions};
pub use sequencer::{RunOutcome, RunReport, StepReport, TestRun};
pub use waiter::WaitOutcome;
