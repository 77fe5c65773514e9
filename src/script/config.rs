//! Test script file types
//!
//! Defines the data structures for deserializing YAML test scripts and JSON
//! point maps. Everything here is keyed by point alias; the loader converts
//! to device names.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::engine::directive::Cell;
use crate::points::Units;

/// A complete test script loaded from a YAML file
#[derive(Deserialize, Debug)]
pub struct ScriptFile {
    /// Name of the test, also the default run name
    pub name: String,
    /// Optional description of what the test verifies
    pub description: Option<String>,
    /// Path to a JSON point map, relative to the script
    pub point_map: Option<PathBuf>,
    /// Inline point map, merged over `point_map`
    #[serde(default)]
    pub points: BTreeMap<String, PointEntry>,
    /// Output aliases and their tolerance
    #[serde(default)]
    pub outputs: BTreeMap<String, f64>,
    /// The steps to execute, in order
    pub steps: Vec<StepFile>,
    /// Behaviour of the simulated device for `--simulate`
    #[serde(default)]
    pub simulation: SimulationFile,
}

/// One entry of a point map
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum PointEntry {
    /// Just the device point name
    Name(String),
    Detailed {
        device: String,
        #[serde(default)]
        units: Units,
        #[serde(rename = "type")]
        object_type: Option<String>,
        address: Option<u32>,
    },
}

/// One step of the script
#[derive(Deserialize, Debug)]
pub struct StepFile {
    pub name: Option<String>,
    /// Input alias to cell
    #[serde(default)]
    pub inputs: BTreeMap<String, Cell>,
    /// Wait budget: seconds or "HH:MM:SS"
    pub wait: WaitTime,
    /// Optional early exit
    pub wake: Option<WakeFile>,
    /// Output alias to expectation cell
    #[serde(default)]
    pub expect: BTreeMap<String, Cell>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum WaitTime {
    Seconds(u64),
    Clock(String),
}

/// Wake condition as written: a watched alias and a threshold cell
#[derive(Deserialize, Debug)]
pub struct WakeFile {
    pub variable: String,
    pub value: Cell,
}

/// Simulated device setup
#[derive(Deserialize, Debug, Default)]
pub struct SimulationFile {
    /// Initial alias values, points not listed start at 0
    #[serde(default)]
    pub initial: BTreeMap<String, Cell>,
    /// Writing the key alias also sets the value alias
    #[serde(default)]
    pub links: BTreeMap<String, String>,
}
