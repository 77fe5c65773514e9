//! Step-by-step execution of a test script

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;

use super::assertion::{AssertionEngine, AssertionFailure, AssertionOutcome};
use super::context::{RunContext, RunOptions};
use super::directive::Expectation;
use super::expression::read_variables;
use super::resolver::apply_inputs;
use super::step::{PointValues, Step, StepOutputHistory};
use super::waiter::{wait, WaitOutcome};
use crate::common::Result;
use crate::device::Device;
use crate::points::PointValue;
use crate::script::TestScript;
use crate::snapshot::SnapshotSink;

/// What happened in one executed step
#[derive(Debug, Clone)]
pub struct StepReport {
    pub index: usize,
    pub name: Option<String>,
    /// Wall clock from input application to the end of the assertion
    pub duration: Duration,
    /// The wake clause ended the wait early
    pub woke: bool,
    /// False for the baseline step
    pub asserted: bool,
    /// False when a fatal error ended the run inside this step
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Passed,
    Failed(AssertionFailure),
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub name: String,
    pub outcome: RunOutcome,
    pub elapsed: Duration,
    pub steps: Vec<StepReport>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.outcome == RunOutcome::Passed
    }
}

/// A loaded script bound to a device
pub struct TestRun {
    script: TestScript,
    ctx: RunContext,
    reports: Vec<StepReport>,
}

impl TestRun {
    pub fn load(
        script: TestScript,
        device: Box<dyn Device>,
        sink: Box<dyn SnapshotSink>,
        options: RunOptions,
    ) -> Self {
        let ctx = RunContext::new(script.points.clone(), device, sink, options);
        Self {
            script,
            ctx,
            reports: Vec::new(),
        }
    }

    pub fn script(&self) -> &TestScript {
        &self.script
    }

    /// Time since the run started
    pub fn elapsed(&self) -> Duration {
        self.ctx.elapsed()
    }

    pub fn history(&self) -> &StepOutputHistory {
        &self.ctx.history
    }

    /// Steps executed by the last `run_all`, including one cut short by an error
    pub fn step_reports(&self) -> &[StepReport] {
        &self.reports
    }

    /// Execute every step in order, stopping at the first failed assertion
    ///
    /// The first step only establishes the baseline for `last` comparisons
    /// and is never asserted. Errors abort the run and carry the step and
    /// point they occurred at.
    pub async fn run_all(&mut self) -> Result<RunReport> {
        self.ctx.started = Instant::now();
        self.reports.clear();
        let total = self.script.steps.len();

        tracing::info!(script = %self.script.name, steps = total, "Starting run");

        for (position, step) in self.script.steps.iter().enumerate() {
            let started = Instant::now();
            let asserted = position > 0;
            tracing::info!(step = step.index, of = total, name = ?step.name, "Starting step");

            let result = run_step(&mut self.ctx, &self.script, step, asserted).await;
            let duration = started.elapsed();

            let (waited, outcome) = match result {
                Ok(done) => done,
                Err(e) => {
                    tracing::error!(step = step.index, ?duration, error = %e, "Step aborted");
                    self.reports.push(StepReport {
                        index: step.index,
                        name: step.name.clone(),
                        duration,
                        woke: false,
                        asserted: false,
                        completed: false,
                    });
                    if let Err(flush) = self.ctx.sink.flush() {
                        tracing::warn!(error = %flush, "Failed to flush snapshots");
                    }
                    return Err(e);
                }
            };

            tracing::info!(
                step = step.index,
                ?duration,
                woke = waited.woke(),
                passed = outcome.is_passed(),
                "Step finished"
            );
            self.reports.push(StepReport {
                index: step.index,
                name: step.name.clone(),
                duration,
                woke: waited.woke(),
                asserted,
                completed: true,
            });

            if let AssertionOutcome::Failed(failure) = outcome {
                return Ok(self.finish(RunOutcome::Failed(failure)));
            }
        }

        Ok(self.finish(RunOutcome::Passed))
    }

    fn finish(&mut self, outcome: RunOutcome) -> RunReport {
        if let Err(e) = self.ctx.sink.flush() {
            tracing::warn!(error = %e, "Failed to flush snapshots");
        }
        let elapsed = self.ctx.elapsed();
        tracing::info!(script = %self.script.name, ?elapsed, passed = outcome == RunOutcome::Passed, "Run finished");
        RunReport {
            name: self.script.name.clone(),
            outcome,
            elapsed,
            steps: self.reports.clone(),
        }
    }

    /// Apply the inputs of a single step without waiting or asserting
    pub async fn apply_inputs_only(&mut self, step_index: usize) -> Result<()> {
        let step = self.script.step(step_index)?;
        tracing::info!(step = step.index, "Applying inputs only");
        apply_inputs(step, &mut self.ctx).await?;
        self.ctx.driver.clear();
        Ok(())
    }

    /// Current value of every mapped point, keyed by alias
    pub async fn read_points(&mut self) -> BTreeMap<String, PointValue> {
        self.ctx.read_all().await
    }

    /// Flush snapshots and release the device
    pub async fn close(mut self) -> Result<()> {
        self.ctx.sink.flush()?;
        self.ctx.device.close().await
    }
}

/// Apply, wait, capture and (past the baseline) assert one step
async fn run_step(
    ctx: &mut RunContext,
    script: &TestScript,
    step: &Step,
    asserted: bool,
) -> Result<(WaitOutcome, AssertionOutcome)> {
    apply_inputs(step, ctx).await?;
    let waited = wait(ctx, &step.condition).await?;

    let actual = capture_outputs(ctx, script, step).await?;
    ctx.history.record(step.index, actual.clone());

    let outcome = if asserted {
        assert_step(ctx, script, step, &actual).await?
    } else {
        AssertionOutcome::Passed
    };
    Ok((waited, outcome))
}

/// Read every output point and every point the step expects
async fn capture_outputs(
    ctx: &mut RunContext,
    script: &TestScript,
    step: &Step,
) -> Result<PointValues> {
    let mut names: Vec<&str> = script.output_points().collect();
    names.extend(step.expected.keys().map(String::as_str));
    names.sort_unstable();
    names.dedup();

    let mut values = PointValues::new();
    for name in names {
        let value = ctx
            .device
            .read(name)
            .await
            .map_err(|e| e.in_step(step.index, name))?;
        values.insert(name.to_string(), value);
    }
    Ok(values)
}

async fn assert_step(
    ctx: &mut RunContext,
    script: &TestScript,
    step: &Step,
    actual: &PointValues,
) -> Result<AssertionOutcome> {
    let mut variables: HashMap<String, f64> = HashMap::new();
    for (point, expectation) in &step.expected {
        if let Expectation::Expression(expression) = expectation {
            let values = read_variables(expression.operands(), &ctx.points, ctx.device.as_mut())
                .await
                .map_err(|e| e.in_step(step.index, point))?;
            variables.extend(values);
        }
    }

    let engine = AssertionEngine::new(&script.points, &script.bounds, &ctx.history);
    Ok(engine.assert_outputs(step.index, &step.expected, actual, &variables))
}
