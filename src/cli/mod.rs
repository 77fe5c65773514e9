//! CLI command handling
//!
//! Dispatches CLI commands to the engine and formats output.

use colored::Colorize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::logging::{self, LogGuard};
use crate::common::{paths, Error, Result};
use crate::device::{Device, GatewayDevice};
use crate::engine::{RunOptions, RunOutcome, RunReport, StepReport, TestRun};
use crate::points::PointValue;
use crate::script::{load_script, TestScript};
use crate::snapshot::{FanOutSink, JsonLinesSink, LogSink, SnapshotSink};

/// How a command ended, for the process exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    TestFailed,
}

impl Status {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::TestFailed => 2,
        }
    }
}

/// Install logging for `command`
///
/// Runs get a per-run log file when `output.log_to_file` is set.
pub fn init_logging(command: &Commands, config: &Config) -> Option<LogGuard> {
    match command {
        Commands::Run { script, name, .. } if config.output.log_to_file => {
            logging::init_run(&run_name(script, name.as_deref()))
        }
        _ => {
            logging::init_cli();
            None
        }
    }
}

fn run_name(script: &Path, name: Option<&str>) -> String {
    name.map(str::to_string).unwrap_or_else(|| {
        script
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "run".to_string())
    })
}

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, config: Config) -> Result<Status> {
    match command {
        Commands::Run {
            script,
            name,
            simulate,
            output,
        } => {
            let test = load_script(&script)?;
            let name = run_name(&script, name.as_deref());
            let snapshot_path = match output {
                Some(path) => path,
                None => default_snapshot_path(&config, &name)?,
            };
            let sink = FanOutSink::new()
                .with(LogSink)
                .with(JsonLinesSink::create(&snapshot_path)?);

            print_header(&test);
            println!("  Snapshots: {}", snapshot_path.display().to_string().dimmed());

            let device = open_device(&test, &config, simulate).await?;
            let mut run = TestRun::load(
                test,
                device,
                Box::new(sink) as Box<dyn SnapshotSink>,
                RunOptions::from(&config.run),
            );

            let result = run.run_all().await;
            let elapsed = run.elapsed();
            let run_steps = run.step_reports().to_vec();
            if let Err(e) = run.close().await {
                tracing::warn!(error = %e, "Failed to close device");
            }

            match result {
                Ok(report) => {
                    print_report(&report);
                    Ok(if report.passed() {
                        Status::Success
                    } else {
                        Status::TestFailed
                    })
                }
                Err(e) => {
                    print_steps(&run_steps, None);
                    println!(
                        "\n{} {} after {}",
                        "✗".red().bold(),
                        "Run aborted".red().bold(),
                        format_duration(elapsed)
                    );
                    Err(e)
                }
            }
        }

        Commands::Reset {
            script,
            step,
            simulate,
        } => {
            let test = load_script(&script)?;
            let device = open_device(&test, &config, simulate).await?;
            let mut run = TestRun::load(
                test,
                device,
                Box::new(LogSink),
                RunOptions::from(&config.run),
            );

            if let Err(e) = run.apply_inputs_only(step).await {
                run.close().await?;
                return Err(e);
            }

            println!("{} Applied inputs of step {}", "✓".green(), step);
            let values = run.read_points().await;
            print_points(run.script(), &values);
            run.close().await?;
            Ok(Status::Success)
        }

        Commands::Points { script, simulate } => {
            let test = load_script(&script)?;
            let device = open_device(&test, &config, simulate).await?;
            let mut run = TestRun::load(
                test,
                device,
                Box::new(LogSink),
                RunOptions::from(&config.run),
            );

            let values = run.read_points().await;
            print_points(run.script(), &values);
            run.close().await?;
            Ok(Status::Success)
        }

        Commands::Check { script } => {
            let test = load_script(&script)?;
            println!(
                "{} {}: {} steps, {} points, {} outputs",
                "✓".green(),
                test.name.white().bold(),
                test.steps.len(),
                test.points.len(),
                test.bounds.len()
            );
            for step in &test.steps {
                println!(
                    "  Step {}: {} inputs, wait {}s{}, {} expectations",
                    step.label(),
                    step.inputs.len(),
                    step.condition.wait_secs,
                    if step.condition.wake.is_some() {
                        " (wake)"
                    } else {
                        ""
                    },
                    step.expected.len()
                );
            }
            Ok(Status::Success)
        }
    }
}

fn default_snapshot_path(config: &Config, name: &str) -> Result<PathBuf> {
    let dir = config
        .output
        .snapshot_dir
        .clone()
        .or_else(paths::runs_dir)
        .ok_or_else(|| {
            Error::Config("no snapshot directory; set output.snapshot_dir or pass --output".into())
        })?;
    Ok(dir.join(format!("{}.jsonl", name)))
}

async fn open_device(script: &TestScript, config: &Config, simulate: bool) -> Result<Box<dyn Device>> {
    if simulate {
        tracing::info!("Using simulated device");
        return Ok(Box::new(script.simulated_device()));
    }
    let gateway = config.gateway_path()?;
    let device = GatewayDevice::connect(&gateway, &config.device).await?;
    Ok(Box::new(device))
}

fn print_points(script: &TestScript, values: &BTreeMap<String, PointValue>) {
    for point in script.points.iter() {
        let value = values
            .get(&point.alias)
            .map(|v| v.to_string())
            .unwrap_or_else(|| "<unreadable>".red().to_string());
        println!(
            "{:<24} {:<12} {}",
            point.alias,
            point.device_name.dimmed(),
            value
        );
    }
}

fn print_header(script: &TestScript) {
    println!(
        "\n{} {}",
        "Running Test:".blue().bold(),
        script.name.white().bold()
    );
    if let Some(desc) = &script.description {
        println!("  {}", desc.dimmed());
    }
}

fn print_report(report: &RunReport) {
    let failed_step = match &report.outcome {
        RunOutcome::Failed(failure) => Some(failure.step),
        RunOutcome::Passed => None,
    };
    print_steps(&report.steps, failed_step);

    match &report.outcome {
        RunOutcome::Passed => println!(
            "\n{} {} in {}\n",
            "✓".green().bold(),
            "Test Passed".green().bold(),
            format_duration(report.elapsed)
        ),
        RunOutcome::Failed(failure) => {
            println!("    {}", failure.to_string().red());
            println!(
                "\n{} {} after {}\n",
                "✗".red().bold(),
                "Test Failed".red().bold(),
                format_duration(report.elapsed)
            );
        }
    }
}

fn print_steps(steps: &[StepReport], failed_step: Option<usize>) {
    if steps.is_empty() {
        return;
    }
    println!("\n{}", "Steps:".cyan());

    for step in steps {
        let marker = if !step.completed || failed_step == Some(step.index) {
            "✗".red()
        } else {
            "✓".green()
        };
        let mut notes = Vec::new();
        if !step.completed {
            notes.push("aborted");
        } else if !step.asserted {
            notes.push("baseline");
        }
        if step.woke {
            notes.push("woke");
        }
        let name = step.name.as_deref().unwrap_or("");
        println!(
            "  {} Step {} {} {} {}",
            marker,
            step.index,
            name,
            format_duration(step.duration).dimmed(),
            notes.join(", ").dimmed()
        );
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h{:02}m{:02}s", secs / 3600, secs % 3600 / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_name_defaults_to_script_stem() {
        assert_eq!(run_name(Path::new("tests/ahu_economizer.yaml"), None), "ahu_economizer");
        assert_eq!(run_name(Path::new("x.yaml"), Some("night")), "night");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(5400)), "5.4s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m05s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h02m05s");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Status::Success.exit_code(), 0);
        assert_eq!(Status::TestFailed.exit_code(), 2);
    }

    #[test]
    fn test_snapshot_dir_from_config() {
        let mut config = Config::default();
        config.output.snapshot_dir = Some(PathBuf::from("/tmp/runs"));
        assert_eq!(
            default_snapshot_path(&config, "night").unwrap(),
            PathBuf::from("/tmp/runs/night.jsonl")
        );
    }
}
