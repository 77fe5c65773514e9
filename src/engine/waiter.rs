//! The wait phase of a step
//!
//! Polls until the step's wake clause holds or its time budget runs out,
//! advancing generators and taking periodic snapshots along the way.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::context::RunContext;
use super::step::Condition;
use crate::common::Result;

/// Smallest sleep between polls, so a zero interval cannot spin
const MIN_POLL: Duration = Duration::from_millis(1);

/// How a wait phase ended
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    /// The wake clause held; `value` is the reading that satisfied it
    WakeSatisfied { elapsed: Duration, value: f64 },
    /// The full budget was used
    TimedOut { elapsed: Duration },
}

impl WaitOutcome {
    pub fn elapsed(&self) -> Duration {
        match self {
            Self::WakeSatisfied { elapsed, .. } | Self::TimedOut { elapsed } => *elapsed,
        }
    }

    pub fn woke(&self) -> bool {
        matches!(self, Self::WakeSatisfied { .. })
    }
}

/// Run the wait phase of the current step
///
/// Device read failures are logged and polling continues. Only expression
/// errors from generators (and fatal writes, when configured) end the wait
/// with an error.
pub async fn wait(ctx: &mut RunContext, condition: &Condition) -> Result<WaitOutcome> {
    let start = Instant::now();
    let budget = Duration::from_secs(condition.wait_secs);
    let poll = ctx.options.poll_interval.max(MIN_POLL);
    let snapshot_interval = ctx.options.snapshot_interval_secs;
    let mut last_snapshot_window: Option<u64> = None;

    tracing::info!(
        step = ctx.current_step,
        wait_secs = condition.wait_secs,
        wake = ?condition.wake.as_ref().map(|w| format!("{} {} {}", w.variable, w.comparator, w.threshold)),
        "Waiting"
    );

    loop {
        let elapsed = start.elapsed();
        if elapsed > budget {
            tracing::debug!(step = ctx.current_step, ?elapsed, "Wait budget exhausted");
            return Ok(WaitOutcome::TimedOut { elapsed });
        }
        let seconds = elapsed.as_secs();

        let points = Arc::clone(&ctx.points);
        ctx.driver
            .tick(
                seconds,
                &points,
                ctx.device.as_mut(),
                ctx.options.fatal_write_errors,
            )
            .await?;

        if let Some(clause) = &condition.wake {
            match ctx.read_scaled(&clause.variable).await {
                Ok(value) if clause.is_satisfied(value) => {
                    tracing::info!(
                        step = ctx.current_step,
                        point = %clause.variable,
                        value,
                        ?elapsed,
                        "Wake condition satisfied"
                    );
                    return Ok(WaitOutcome::WakeSatisfied { elapsed, value });
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(point = %clause.variable, error = %e, "Wake read failed");
                }
            }
        }

        if snapshot_interval > 0 {
            let window = seconds / snapshot_interval;
            if last_snapshot_window != Some(window) {
                last_snapshot_window = Some(window);
                ctx.snapshot().await;
            }
        }

        tokio::time::sleep(poll).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SimulatedDevice;
    use crate::engine::context::RunOptions;
    use crate::engine::directive::{Cell, WakeClause};
    use crate::engine::generator::{Generator, RampSpec};
    use crate::points::{PointProperty, PointTable, PointValue, Units};
    use crate::snapshot::MemorySink;

    fn context(device: SimulatedDevice, sink: MemorySink) -> RunContext {
        let points = PointTable::new(vec![
            PointProperty {
                device_name: "AO-2".to_string(),
                alias: "Damper".to_string(),
                units: Units::Percent,
                object_type: None,
                address: None,
            },
            PointProperty {
                device_name: "AV-1".to_string(),
                alias: "SupplyTemp".to_string(),
                units: Units::Plain,
                object_type: None,
                address: None,
            },
        ]);
        let mut ctx = RunContext::new(
            Arc::new(points),
            Box::new(device),
            Box::new(sink),
            RunOptions::default(),
        );
        ctx.current_step = 1;
        ctx
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wake_clause_uses_full_budget() {
        let device = SimulatedDevice::new()
            .with_point("AO-2", 0.0)
            .with_point("AV-1", 55.0);
        let mut ctx = context(device, MemorySink::new());

        let outcome = wait(
            &mut ctx,
            &Condition {
                wait_secs: 5,
                wake: None,
            },
        )
        .await
        .unwrap();

        assert!(!outcome.woke());
        assert!(outcome.elapsed() > Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_percent_wake_clause_is_satisfied_immediately() {
        let device = SimulatedDevice::new()
            .with_point("AO-2", 40.0)
            .with_point("AV-1", 55.0);
        let mut ctx = context(device, MemorySink::new());
        let wake = WakeClause::parse("AO-2", &Cell::Text("<=45%".to_string())).unwrap();

        let outcome = wait(
            &mut ctx,
            &Condition {
                wait_secs: 600,
                wake: Some(wake),
            },
        )
        .await
        .unwrap();

        match outcome {
            WaitOutcome::WakeSatisfied { elapsed, value } => {
                assert_eq!(value, 0.40);
                assert!(elapsed < Duration::from_secs(1));
            }
            other => panic!("Expected WakeSatisfied, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ramp_drives_wake_condition() {
        let handle = SimulatedDevice::new()
            .with_point("AO-2", 0.0)
            .with_point("AV-1", 50.0);
        let mut ctx = context(handle.clone(), MemorySink::new());
        ctx.driver.replace(
            1,
            vec![(
                "AV-1".to_string(),
                Generator::Ramp(RampSpec {
                    start: 50.0,
                    end: 60.0,
                    rate_per_sec: 1.0,
                    period_secs: 1,
                }),
            )],
        );
        let wake = WakeClause::parse("AV-1", &Cell::Number(55.0)).unwrap();

        let outcome = wait(
            &mut ctx,
            &Condition {
                wait_secs: 60,
                wake: Some(wake),
            },
        )
        .await
        .unwrap();

        assert!(outcome.woke());
        assert!(outcome.elapsed() >= Duration::from_secs(5));
        assert!(outcome.elapsed() < Duration::from_secs(6));
        assert_eq!(handle.get("AV-1"), Some(PointValue::Number(55.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshots_once_per_interval_including_second_zero() {
        let device = SimulatedDevice::new()
            .with_point("AO-2", 0.0)
            .with_point("AV-1", 55.0);
        let sink = MemorySink::new();
        let mut ctx = context(device, sink.clone());

        wait(
            &mut ctx,
            &Condition {
                wait_secs: 125,
                wake: None,
            },
        )
        .await
        .unwrap();

        let snapshots = sink.snapshots();
        // seconds 0, 60 and 120
        assert_eq!(snapshots.len(), 3);
        assert_eq!(snapshots[0].step, 1);
        assert_eq!(snapshots[0].values["SupplyTemp"], PointValue::Number(55.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wake_read_failures_do_not_abort() {
        let device = SimulatedDevice::new().with_point("AV-1", 55.0);
        let mut ctx = context(device, MemorySink::new());
        // AO-2 does not exist on the device
        let wake = WakeClause::parse("AO-2", &Cell::Number(1.0)).unwrap();

        let outcome = wait(
            &mut ctx,
            &Condition {
                wait_secs: 3,
                wake: Some(wake),
            },
        )
        .await
        .unwrap();

        assert!(!outcome.woke());
    }

    #[tokio::test(start_paused = true)]
    async fn test_generator_write_policy_follows_run_options() {
        let handle = SimulatedDevice::new()
            .with_point("AO-2", 0.0)
            .with_point("AV-1", 50.0)
            .with_read_only("AV-1");
        let mut ctx = context(handle, MemorySink::new());
        ctx.options.fatal_write_errors = true;
        ctx.driver.replace(
            1,
            vec![(
                "AV-1".to_string(),
                Generator::Ramp(RampSpec {
                    start: 50.0,
                    end: 60.0,
                    rate_per_sec: 1.0,
                    period_secs: 1,
                }),
            )],
        );

        let err = wait(
            &mut ctx,
            &Condition {
                wait_secs: 10,
                wake: None,
            },
        )
        .await
        .unwrap_err();

        assert!(err.is_device_io());
        assert!(err.to_string().contains("AV-1"));
    }
}
