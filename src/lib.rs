//! ctrltest - scripted functional testing of building-control devices
//!
//! The core is the [`engine`]: it applies each step's inputs to a
//! [`device::Device`], waits for a wake condition or a deadline while driving
//! ramp and periodic generators, and asserts the captured outputs.

pub mod cli;
pub mod commands;
pub mod common;
pub mod device;
pub mod engine;
pub mod points;
pub mod script;
pub mod snapshot;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use engine::{RunOutcome, RunReport, TestRun};
pub use script::{load_script, parse_script, TestScript};
