//! YAML test scripts
//!
//! A script names its points by alias; a JSON point map (or an inline
//! `points:` section) ties every alias to a device point.

mod config;
mod loader;

pub use config::*;
pub use loader::{load_script, parse_script, TestScript};
