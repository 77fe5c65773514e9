//! Comparison of observed outputs against a step's expectations

use std::collections::BTreeMap;
use std::fmt;

use super::directive::Expectation;
use super::expression::Variables;
use super::step::{AcceptableBounds, PointValues, StepOutputHistory};
use crate::points::PointTable;

/// Why a step's outputs were rejected
#[derive(Debug, Clone, PartialEq)]
pub struct AssertionFailure {
    pub step: usize,
    /// Device point name
    pub point: String,
    pub alias: String,
    /// Expected value, or the expectation text when no value could be computed
    pub expected: String,
    /// Observed value as read from the device
    pub actual: String,
    pub tolerance: Option<f64>,
    pub reason: String,
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "step {}: {} ({}) expected {}, got {}",
            self.step, self.alias, self.point, self.expected, self.actual
        )?;
        if let Some(tolerance) = self.tolerance {
            write!(f, " (tolerance {})", tolerance)?;
        }
        write!(f, ": {}", self.reason)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssertionOutcome {
    Passed,
    Failed(AssertionFailure),
}

impl AssertionOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// Checks a step's captured outputs
pub struct AssertionEngine<'a> {
    points: &'a PointTable,
    bounds: &'a AcceptableBounds,
    history: &'a StepOutputHistory,
}

impl<'a> AssertionEngine<'a> {
    pub fn new(
        points: &'a PointTable,
        bounds: &'a AcceptableBounds,
        history: &'a StepOutputHistory,
    ) -> Self {
        Self {
            points,
            bounds,
            history,
        }
    }

    /// Compare `actual` against every expectation of `step`
    ///
    /// Stops at the first failing point. `variables` holds the values
    /// expression expectations are evaluated against, read after the wait.
    pub fn assert_outputs(
        &self,
        step: usize,
        expected: &BTreeMap<String, Expectation>,
        actual: &PointValues,
        variables: &dyn Variables,
    ) -> AssertionOutcome {
        for (point, expectation) in expected {
            if let Err(failure) = self.check(step, point, expectation, actual, variables) {
                tracing::warn!(
                    step,
                    point = %failure.point,
                    alias = %failure.alias,
                    expected = %failure.expected,
                    actual = %failure.actual,
                    reason = %failure.reason,
                    "Assertion failed"
                );
                return AssertionOutcome::Failed(failure);
            }
        }
        AssertionOutcome::Passed
    }

    fn check(
        &self,
        step: usize,
        point: &str,
        expectation: &Expectation,
        actual: &PointValues,
        variables: &dyn Variables,
    ) -> Result<(), AssertionFailure> {
        if *expectation == Expectation::Any {
            return Ok(());
        }

        let raw = actual.get(point);
        let fail = |expected: String, tolerance: Option<f64>, reason: String| AssertionFailure {
            step,
            point: point.to_string(),
            alias: self.points.alias_of(point).to_string(),
            expected,
            actual: raw.map_or_else(|| "<unread>".to_string(), |v| v.to_string()),
            tolerance,
            reason,
        };

        let Some(value) = raw.and_then(|v| v.as_number()) else {
            return Err(fail(
                expectation.to_string(),
                None,
                "observed value is not numeric".to_string(),
            ));
        };

        match expectation {
            Expectation::Any => Ok(()),
            Expectation::RelativeToLast(comparator) => {
                let previous = step.checked_sub(1).and_then(|s| self.history.get(s, point));
                let Some(reference) = previous.and_then(|v| v.as_number()) else {
                    return Err(fail(
                        expectation.to_string(),
                        None,
                        format!("no numeric value recorded for step {}", step.saturating_sub(1)),
                    ));
                };
                if comparator.holds(value, reference) {
                    Ok(())
                } else {
                    Err(fail(
                        format!("{} {}", comparator, reference),
                        None,
                        format!("{} {} {} does not hold", value, comparator, reference),
                    ))
                }
            }
            Expectation::Expression(expression) => {
                let tolerance = self.tolerance(point);
                let target = expression.evaluate(variables).map_err(|e| {
                    fail(expectation.to_string(), Some(tolerance), e.to_string())
                })?;
                within(target, value, tolerance).map_err(|reason| {
                    fail(target.to_string(), Some(tolerance), reason)
                })
            }
            Expectation::Value(target) => {
                let tolerance = self.tolerance(point);
                let value = self.points.units(point).scale(value);
                within(*target, value, tolerance).map_err(|reason| {
                    fail(target.to_string(), Some(tolerance), reason)
                })
            }
        }
    }

    fn tolerance(&self, point: &str) -> f64 {
        self.bounds.get(point).copied().unwrap_or(0.0)
    }
}

fn within(expected: f64, actual: f64, tolerance: f64) -> Result<(), String> {
    let diff = (expected - actual).abs();
    if diff <= tolerance {
        Ok(())
    } else {
        Err(format!("off by {:.3}", diff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::comparator::Comparator;
    use crate::engine::expression::Expression;
    use crate::points::{PointProperty, PointValue, Units};
    use std::collections::HashMap;

    fn points() -> PointTable {
        PointTable::new(vec![
            PointProperty {
                device_name: "AV-1".to_string(),
                alias: "ZoneTemp".to_string(),
                units: Units::Plain,
                object_type: None,
                address: None,
            },
            PointProperty {
                device_name: "AO-2".to_string(),
                alias: "Damper".to_string(),
                units: Units::Percent,
                object_type: None,
                address: None,
            },
            PointProperty {
                device_name: "BO-1".to_string(),
                alias: "Fan".to_string(),
                units: Units::Plain,
                object_type: None,
                address: None,
            },
        ])
    }

    fn bounds() -> AcceptableBounds {
        AcceptableBounds::from([
            ("AV-1".to_string(), 0.5),
            ("AO-2".to_string(), 0.05),
            ("BO-1".to_string(), 0.0),
        ])
    }

    fn check_one(
        point: &str,
        expectation: Expectation,
        actual: PointValue,
        history: &StepOutputHistory,
    ) -> AssertionOutcome {
        let points = points();
        let bounds = bounds();
        let engine = AssertionEngine::new(&points, &bounds, history);
        engine.assert_outputs(
            2,
            &BTreeMap::from([(point.to_string(), expectation)]),
            &PointValues::from([(point.to_string(), actual)]),
            &HashMap::<String, f64>::new(),
        )
    }

    #[test]
    fn test_tolerance_boundary() {
        let history = StepOutputHistory::default();
        assert!(check_one("AV-1", Expectation::Value(70.0), 70.4.into(), &history).is_passed());

        match check_one("AV-1", Expectation::Value(70.0), 70.6.into(), &history) {
            AssertionOutcome::Failed(failure) => {
                assert_eq!(failure.alias, "ZoneTemp");
                assert_eq!(failure.tolerance, Some(0.5));
                assert_eq!(failure.actual, "70.6");
            }
            AssertionOutcome::Passed => panic!("70.6 should be outside 70 +/- 0.5"),
        }
    }

    #[test]
    fn test_percent_points_compare_in_fractions() {
        let history = StepOutputHistory::default();
        assert!(check_one("AO-2", Expectation::Value(0.45), 47.0.into(), &history).is_passed());
        assert!(!check_one("AO-2", Expectation::Value(0.45), 60.0.into(), &history).is_passed());
    }

    #[test]
    fn test_binary_actuals_normalize() {
        let history = StepOutputHistory::default();
        assert!(check_one("BO-1", Expectation::Value(1.0), PointValue::active(), &history).is_passed());
        assert!(!check_one("BO-1", Expectation::Value(1.0), PointValue::inactive(), &history).is_passed());
    }

    #[test]
    fn test_relative_to_last() {
        let mut history = StepOutputHistory::default();
        history.record(1, PointValues::from([("AV-1".to_string(), PointValue::Number(5.0))]));

        let gt = Expectation::RelativeToLast(Comparator::Gt);
        assert!(check_one("AV-1", gt.clone(), 6.0.into(), &history).is_passed());
        match check_one("AV-1", gt, 5.0.into(), &history) {
            AssertionOutcome::Failed(failure) => {
                assert!(failure.expected.contains('5'));
                assert_eq!(failure.actual, "5");
            }
            AssertionOutcome::Passed => panic!("5 > 5 must fail"),
        }
    }

    #[test]
    fn test_relative_to_last_without_history_fails() {
        let history = StepOutputHistory::default();
        let outcome = check_one(
            "AV-1",
            Expectation::RelativeToLast(Comparator::Ge),
            5.0.into(),
            &history,
        );
        assert!(!outcome.is_passed());
    }

    #[test]
    fn test_any_passes_even_unread() {
        let points = points();
        let bounds = bounds();
        let history = StepOutputHistory::default();
        let engine = AssertionEngine::new(&points, &bounds, &history);
        let outcome = engine.assert_outputs(
            2,
            &BTreeMap::from([("AV-1".to_string(), Expectation::Any)]),
            &PointValues::new(),
            &HashMap::<String, f64>::new(),
        );
        assert!(outcome.is_passed());
    }

    #[test]
    fn test_expression_expectation_uses_variables() {
        let points = points();
        let bounds = bounds();
        let history = StepOutputHistory::default();
        let engine = AssertionEngine::new(&points, &bounds, &history);
        let variables = HashMap::from([("ZoneTemp".to_string(), 70.0)]);

        let expected = BTreeMap::from([(
            "AV-1".to_string(),
            Expectation::Expression(Expression::parse("ZoneTemp-2").unwrap()),
        )]);
        let pass = engine.assert_outputs(
            2,
            &expected,
            &PointValues::from([("AV-1".to_string(), PointValue::Number(68.3))]),
            &variables,
        );
        assert!(pass.is_passed());

        let fail = engine.assert_outputs(
            2,
            &expected,
            &PointValues::from([("AV-1".to_string(), PointValue::Number(69.0))]),
            &variables,
        );
        assert!(!fail.is_passed());
    }

    #[test]
    fn test_first_failure_short_circuits() {
        let points = points();
        let bounds = bounds();
        let history = StepOutputHistory::default();
        let engine = AssertionEngine::new(&points, &bounds, &history);

        // BTreeMap order: AO-2 is checked before AV-1
        let outcome = engine.assert_outputs(
            3,
            &BTreeMap::from([
                ("AO-2".to_string(), Expectation::Value(0.9)),
                ("AV-1".to_string(), Expectation::Value(0.0)),
            ]),
            &PointValues::from([
                ("AO-2".to_string(), PointValue::Number(10.0)),
                ("AV-1".to_string(), PointValue::Number(70.0)),
            ]),
            &HashMap::<String, f64>::new(),
        );
        match outcome {
            AssertionOutcome::Failed(failure) => {
                assert_eq!(failure.point, "AO-2");
                assert_eq!(failure.step, 3);
            }
            AssertionOutcome::Passed => panic!("Expected a failure"),
        }
    }
}
