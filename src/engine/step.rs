//! Steps of a loaded test script and the per-run output history

use std::collections::BTreeMap;

use super::directive::{CellDirective, Expectation, WakeClause};
use crate::points::PointValue;

/// Tolerance per output point (device name)
pub type AcceptableBounds = BTreeMap<String, f64>;

/// Observed values per point (device name)
pub type PointValues = BTreeMap<String, PointValue>;

/// How long a step waits before its outputs are captured
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub wait_secs: u64,
    /// Stop waiting early once this holds
    pub wake: Option<WakeClause>,
}

/// One scripted row: inputs to apply, wait condition, expected outputs
///
/// Index 0 is the script header and never exists as a step, so the first
/// step has index 1. All maps are keyed by device point name.
#[derive(Debug, Clone)]
pub struct Step {
    pub index: usize,
    pub name: Option<String>,
    pub inputs: BTreeMap<String, CellDirective>,
    pub condition: Condition,
    pub expected: BTreeMap<String, Expectation>,
}

impl Step {
    /// Label for log lines and reports
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("{} ({})", self.index, name),
            None => self.index.to_string(),
        }
    }
}

/// Outputs captured at the end of every executed step
#[derive(Debug, Clone, Default)]
pub struct StepOutputHistory {
    steps: BTreeMap<usize, PointValues>,
}

impl StepOutputHistory {
    pub fn record(&mut self, step: usize, values: PointValues) {
        self.steps.insert(step, values);
    }

    /// Value `point` had at the end of `step`
    pub fn get(&self, step: usize, point: &str) -> Option<&PointValue> {
        self.steps.get(&step).and_then(|values| values.get(point))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_lookup() {
        let mut history = StepOutputHistory::default();
        history.record(1, PointValues::from([("AV-1".to_string(), PointValue::Number(5.0))]));

        assert_eq!(history.get(1, "AV-1"), Some(&PointValue::Number(5.0)));
        assert_eq!(history.get(1, "AV-2"), None);
        assert_eq!(history.get(0, "AV-1"), None);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_step_label() {
        let step = Step {
            index: 3,
            name: Some("economizer".to_string()),
            inputs: BTreeMap::new(),
            condition: Condition {
                wait_secs: 60,
                wake: None,
            },
            expected: BTreeMap::new(),
        };
        assert_eq!(step.label(), "3 (economizer)");
    }
}
