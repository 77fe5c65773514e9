//! Turns classified input cells into device writes and generators

use super::context::RunContext;
use super::directive::{CellDirective, Operand};
use super::expression::{evaluate_live, Expression};
use super::generator::{Generator, PeriodicSpec, RampSpec};
use super::step::Step;
use crate::common::{Error, Result};
use crate::points::PointValue;

/// Outcome of resolving one input cell
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    /// Written as soon as the step starts
    pub value: PointValue,
    /// Drives the point during the wait phase
    pub generator: Option<Generator>,
}

impl Resolved {
    fn fixed(value: PointValue) -> Self {
        Self {
            value,
            generator: None,
        }
    }
}

async fn evaluate(expression: &Expression, ctx: &mut RunContext) -> Result<f64> {
    evaluate_live(expression, &ctx.points, ctx.device.as_mut()).await
}

async fn operand_value(operand: &Operand, ctx: &mut RunContext) -> Result<f64> {
    match operand {
        Operand::Number(n) => Ok(*n),
        Operand::Expression(expression) => evaluate(expression, ctx).await,
    }
}

async fn period_secs(period: Option<&Operand>, ctx: &mut RunContext) -> Result<u64> {
    let Some(period) = period else {
        return Ok(ctx.options.default_period_secs.max(1));
    };

    let secs = operand_value(period, ctx).await?.round();
    if !secs.is_finite() || secs < 1.0 {
        return Err(Error::Script(format!(
            "generator period must be at least one second, got {}",
            secs
        )));
    }
    Ok(secs as u64)
}

/// Compute the immediate value of a cell and its generator, if any
///
/// Expression operands are evaluated against the device right now, so a
/// `ramp(=OAT;=OAT+10;2)` starts from the temperature seen at step entry.
pub async fn resolve(directive: &CellDirective, ctx: &mut RunContext) -> Result<Resolved> {
    match directive {
        CellDirective::Literal(value) => Ok(Resolved::fixed(value.clone())),
        CellDirective::Binary(on) => Ok(Resolved::fixed(PointValue::binary(*on))),
        CellDirective::Expression(expression) => {
            let value = evaluate(expression, ctx).await?;
            Ok(Resolved::fixed(PointValue::Number(value)))
        }
        CellDirective::Ramp(args) => {
            let spec = RampSpec {
                start: operand_value(&args.start, ctx).await?,
                end: operand_value(&args.end, ctx).await?,
                rate_per_sec: operand_value(&args.rate_per_min, ctx).await? / 60.0,
                period_secs: period_secs(args.period.as_ref(), ctx).await?,
            };
            let value = PointValue::Number(spec.start);
            if spec.is_degenerate() {
                return Ok(Resolved::fixed(value));
            }
            Ok(Resolved {
                value,
                generator: Some(Generator::Ramp(spec)),
            })
        }
        CellDirective::Periodic(args) => {
            let value = evaluate(&args.expression, ctx).await?;
            let period_secs = period_secs(args.period.as_ref(), ctx).await?;
            Ok(Resolved {
                value: PointValue::Number(value),
                generator: Some(Generator::Periodic(PeriodicSpec {
                    expression: args.expression.clone(),
                    period_secs,
                })),
            })
        }
    }
}

/// Apply a step's inputs and arm its generators
///
/// The previous step's generators are dropped before anything is written.
pub async fn apply_inputs(step: &Step, ctx: &mut RunContext) -> Result<()> {
    ctx.current_step = step.index;
    ctx.driver.clear();

    let mut generators = Vec::new();
    for (point, directive) in &step.inputs {
        let resolved = resolve(directive, ctx)
            .await
            .map_err(|e| e.in_step(step.index, point))?;

        tracing::debug!(
            step = step.index,
            point = %point,
            alias = ctx.points.alias_of(point),
            value = %resolved.value,
            "Setting input"
        );
        ctx.write(point, &resolved.value)
            .await
            .map_err(|e| e.in_step(step.index, point))?;

        if let Some(generator) = resolved.generator {
            generators.push((point.clone(), generator));
        }
    }

    if !generators.is_empty() {
        tracing::info!(step = step.index, count = generators.len(), "Generators armed");
    }
    ctx.driver.replace(step.index, generators);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SimulatedDevice;
    use crate::engine::context::RunOptions;
    use crate::engine::directive::Cell;
    use crate::engine::step::Condition;
    use crate::points::{PointProperty, PointTable, Units};
    use crate::snapshot::MemorySink;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn context(device: SimulatedDevice) -> RunContext {
        let points = PointTable::new(vec![PointProperty {
            device_name: "AV-1".to_string(),
            alias: "OAT".to_string(),
            units: Units::Plain,
            object_type: None,
            address: None,
        }]);
        RunContext::new(
            Arc::new(points),
            Box::new(device),
            Box::new(MemorySink::new()),
            RunOptions::default(),
        )
    }

    fn directive(text: &str) -> CellDirective {
        CellDirective::classify(&Cell::Text(text.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_literal_resolves_idempotently_without_generator() {
        let mut ctx = context(SimulatedDevice::new());
        let literal = CellDirective::classify(&Cell::Number(72.0)).unwrap();

        let first = resolve(&literal, &mut ctx).await.unwrap();
        let second = resolve(&literal, &mut ctx).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.value, PointValue::Number(72.0));
        assert!(first.generator.is_none());
    }

    #[tokio::test]
    async fn test_binary_token_writes_active() {
        let mut ctx = context(SimulatedDevice::new());
        let resolved = resolve(&directive("Open"), &mut ctx).await.unwrap();
        assert_eq!(resolved.value, PointValue::active());
    }

    #[tokio::test]
    async fn test_ramp_operands_use_live_values() {
        let mut ctx = context(SimulatedDevice::new().with_point("AV-1", 50.0));
        let resolved = resolve(&directive("ramp(=OAT;=OAT+10;120)"), &mut ctx)
            .await
            .unwrap();

        assert_eq!(resolved.value, PointValue::Number(50.0));
        match resolved.generator {
            Some(Generator::Ramp(spec)) => {
                assert_eq!(spec.end, 60.0);
                assert_eq!(spec.rate_per_sec, 2.0);
                assert_eq!(spec.period_secs, 10);
            }
            other => panic!("Expected ramp generator, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_degenerate_ramp_sets_start_once() {
        let mut ctx = context(SimulatedDevice::new());
        let resolved = resolve(&directive("ramp(5;5;60)"), &mut ctx).await.unwrap();
        assert_eq!(resolved.value, PointValue::Number(5.0));
        assert!(resolved.generator.is_none());
    }

    #[tokio::test]
    async fn test_periodic_evaluates_once_now() {
        let mut ctx = context(SimulatedDevice::new().with_point("AV-1", 1.0));
        let resolved = resolve(&directive("periodic(=OAT+1;3)"), &mut ctx).await.unwrap();
        assert_eq!(resolved.value, PointValue::Number(2.0));
        assert!(matches!(
            resolved.generator,
            Some(Generator::Periodic(PeriodicSpec { period_secs: 3, .. }))
        ));
    }

    #[tokio::test]
    async fn test_zero_period_is_rejected() {
        let mut ctx = context(SimulatedDevice::new());
        assert!(resolve(&directive("ramp(0;10;60;0)"), &mut ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_apply_inputs_writes_and_replaces_generators() {
        let handle = SimulatedDevice::new()
            .with_point("AV-1", 0.0)
            .with_point("AV-2", 0.0)
            .with_point("BV-1", PointValue::inactive());
        let mut ctx = context(handle.clone());

        let step = Step {
            index: 1,
            name: None,
            inputs: BTreeMap::from([
                ("AV-2".to_string(), directive("ramp(0;10;60;5)")),
                ("BV-1".to_string(), directive("on")),
            ]),
            condition: Condition {
                wait_secs: 10,
                wake: None,
            },
            expected: BTreeMap::new(),
        };
        apply_inputs(&step, &mut ctx).await.unwrap();

        assert_eq!(ctx.current_step, 1);
        assert_eq!(ctx.driver.len(), 1);
        assert_eq!(handle.get("AV-2"), Some(PointValue::Number(0.0)));
        assert_eq!(handle.get("BV-1"), Some(PointValue::active()));

        let next = Step {
            index: 2,
            inputs: BTreeMap::from([("AV-1".to_string(), directive("12"))]),
            ..step
        };
        apply_inputs(&next, &mut ctx).await.unwrap();
        assert!(ctx.driver.is_empty());
    }

    #[tokio::test]
    async fn test_unresolvable_expression_names_step_and_point() {
        let mut ctx = context(SimulatedDevice::new().with_point("AV-2", 0.0));
        let step = Step {
            index: 4,
            name: None,
            inputs: BTreeMap::from([("AV-2".to_string(), directive("=Nope+1"))]),
            condition: Condition {
                wait_secs: 1,
                wake: None,
            },
            expected: BTreeMap::new(),
        };

        match apply_inputs(&step, &mut ctx).await.unwrap_err() {
            Error::StepFailed {
                step, variable, ..
            } => {
                assert_eq!(step, 4);
                assert_eq!(variable, "AV-2");
            }
            other => panic!("Expected StepFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_write_rejection_policy() {
        let handle = SimulatedDevice::new()
            .with_point("AV-2", 0.0)
            .with_read_only("AV-2");
        let step = Step {
            index: 1,
            name: None,
            inputs: BTreeMap::from([("AV-2".to_string(), directive("5"))]),
            condition: Condition {
                wait_secs: 1,
                wake: None,
            },
            expected: BTreeMap::new(),
        };

        let mut lenient = context(handle.clone());
        assert!(apply_inputs(&step, &mut lenient).await.is_ok());

        let mut strict = context(handle);
        strict.options.fatal_write_errors = true;
        assert!(apply_inputs(&step, &mut strict).await.unwrap_err().is_device_io());
    }
}
