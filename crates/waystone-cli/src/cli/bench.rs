//! Benchmark command handlers: run, progressive, resume.
//!
//! A live `indicatif` bar is driven from the engine's event bus, and Ctrl+C
//! is routed to `cancel_workflow` so an interrupted run leaves a
//! cancellation checkpoint it can later be resumed from.

use std::sync::Arc;

use anyhow::anyhow;
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use waystone_core::benchmark::harness::{BenchmarkError, BenchmarkHarness, MAX_DISC_COUNT};
use waystone_core::benchmark::workflow::workflow_id;
use waystone_core::repository::checkpoint::CheckpointStore;
use waystone_core::workflow::executor::{EngineError, WorkflowEngine, WorkflowExecutor};
use waystone_types::benchmark::{BenchmarkReport, ProgressiveReport};
use waystone_types::config::EngineConfig;
use waystone_types::event::EngineEvent;

use super::Output;

/// Handle `waystone bench run --discs N`.
pub async fn run<S: CheckpointStore + 'static>(
    engine: Arc<WorkflowEngine<S>>,
    config: EngineConfig,
    discs: u32,
    output: Output,
) -> anyhow::Result<()> {
    let harness = BenchmarkHarness::new(Arc::clone(&engine), config);
    let cancel = CancellationToken::new();
    let watch = RunWatch::start(&engine, vec![workflow_id(discs)], cancel.clone(), output);

    let outcome = harness.run(discs, cancel).await;
    watch.stop();

    let report = outcome.map_err(|e| into_cli_error(e, Some(discs)))?;
    render_report(&report, output)
}

/// Handle `waystone bench resume --discs N`.
pub async fn resume<S: CheckpointStore + 'static>(
    engine: Arc<WorkflowEngine<S>>,
    config: EngineConfig,
    discs: u32,
    output: Output,
) -> anyhow::Result<()> {
    let harness = BenchmarkHarness::new(Arc::clone(&engine), config);
    let cancel = CancellationToken::new();
    let watch = RunWatch::start(&engine, vec![workflow_id(discs)], cancel.clone(), output);

    let outcome = harness.resume(discs, cancel).await;
    watch.stop();

    let report = outcome.map_err(|e| into_cli_error(e, Some(discs)))?;
    render_report(&report, output)
}

/// Handle `waystone bench progressive --max-discs N`.
pub async fn progressive<S: CheckpointStore + 'static>(
    engine: Arc<WorkflowEngine<S>>,
    config: EngineConfig,
    max_discs: u32,
    output: Output,
) -> anyhow::Result<()> {
    let harness = BenchmarkHarness::new(Arc::clone(&engine), config);
    let cancel = CancellationToken::new();
    let ids = watched_ids(max_discs);
    let watch = RunWatch::start(&engine, ids, cancel.clone(), output);

    let outcome = harness.run_progressive(max_discs, cancel).await;
    watch.stop();

    let report = outcome.map_err(|e| into_cli_error(e, None))?;
    render_progressive(&report, output)
}

// ---------------------------------------------------------------------------
// Progress and signal handling
// ---------------------------------------------------------------------------

/// Background tasks attached to one benchmark command.
struct RunWatch {
    bar: ProgressBar,
    progress: JoinHandle<()>,
    signal: JoinHandle<()>,
}

impl RunWatch {
    fn start<S: CheckpointStore + 'static>(
        engine: &Arc<WorkflowEngine<S>>,
        workflow_ids: Vec<String>,
        cancel: CancellationToken,
        output: Output,
    ) -> Self {
        let bar = if output.shows_progress() {
            let bar = ProgressBar::new(0);
            if let Ok(bar_style) = ProgressStyle::default_bar()
                .template("{spinner:.cyan} {msg} [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}, eta {eta})")
            {
                bar.set_style(bar_style.progress_chars("=> "));
            }
            bar.enable_steady_tick(std::time::Duration::from_millis(120));
            bar
        } else {
            ProgressBar::hidden()
        };

        let events = engine.subscribe();
        let progress = tokio::spawn(follow_events(events, workflow_ids.clone(), bar.clone()));

        let engine = Arc::clone(engine);
        let signal = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, cancelling benchmark");
                for id in &workflow_ids {
                    engine.cancel_workflow(id);
                }
                cancel.cancel();
            }
        });

        Self { bar, progress, signal }
    }

    fn stop(self) {
        self.signal.abort();
        self.progress.abort();
        self.bar.finish_and_clear();
    }
}

async fn follow_events(
    mut events: broadcast::Receiver<EngineEvent>,
    workflow_ids: Vec<String>,
    bar: ProgressBar,
) {
    loop {
        match events.recv().await {
            Ok(event) if workflow_ids.iter().any(|id| id == event.workflow_id()) => {
                apply_event(&bar, &event)
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "progress listener lagged behind engine events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn apply_event(bar: &ProgressBar, event: &EngineEvent) {
    match event {
        EngineEvent::WorkflowStarted {
            workflow_id,
            total_steps,
            ..
        } => {
            bar.set_length(*total_steps as u64);
            bar.set_position(0);
            bar.reset_eta();
            bar.set_message(workflow_id.clone());
        }
        EngineEvent::WorkflowResumed {
            workflow_id,
            from_step,
            total_steps,
        } => {
            bar.set_length(*total_steps as u64);
            bar.set_position(u64::from(from_step.saturating_sub(1)));
            bar.reset_eta();
            bar.set_message(format!("{workflow_id} (resumed)"));
        }
        EngineEvent::StepCompleted { step_number, .. } => {
            bar.set_position(u64::from(*step_number));
        }
        EngineEvent::StepFailed {
            step_number,
            error,
            will_retry: true,
            ..
        } => {
            bar.println(format!(
                "  {} step {step_number} failed, retrying: {error}",
                style("!").yellow().bold()
            ));
        }
        _ => {}
    }
}

/// Benchmark ids a progressive run up to `max_discs` may touch.
fn watched_ids(max_discs: u32) -> Vec<String> {
    (1..=max_discs.min(MAX_DISC_COUNT)).map(workflow_id).collect()
}

fn into_cli_error(err: BenchmarkError, discs: Option<u32>) -> anyhow::Error {
    match err {
        BenchmarkError::Engine(EngineError::Cancelled {
            workflow_id,
            step_number,
        }) => match discs {
            Some(discs) => anyhow!(
                "{workflow_id} cancelled at step {step_number}; continue with `waystone bench resume --discs {discs}`"
            ),
            None => anyhow!("{workflow_id} cancelled at step {step_number}"),
        },
        other => anyhow::Error::new(other),
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render_report(report: &BenchmarkReport, output: Output) -> anyhow::Result<()> {
    if output.json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    if output.quiet {
        return Ok(());
    }

    let headline = if report.success {
        format!("{} {} completed", style("✓").green().bold(), style(&report.workflow_id).cyan())
    } else {
        format!("{} {} failed", style("✗").red().bold(), style(&report.workflow_id).cyan())
    };

    println!();
    println!("  {headline}");
    println!();
    println!("  {}  {}", style("Discs:").bold(), report.disc_count);
    println!(
        "  {}  {}/{}",
        style("Steps:").bold(),
        report.completed_steps,
        report.total_steps
    );
    println!("  {}  {}", style("Duration:").bold(), format_duration_ms(report.duration_ms));
    println!(
        "  {}  {:.1} steps/s",
        style("Throughput:").bold(),
        report.steps_per_second
    );
    println!("  {}  {:.2}", style("Score:").bold(), report.score);
    if let Some(error) = &report.error {
        println!("  {}  {}", style("Error:").bold(), style(error).red());
    }
    println!();

    Ok(())
}

fn render_progressive(report: &ProgressiveReport, output: Output) -> anyhow::Result<()> {
    if output.json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    if output.quiet {
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Discs").fg(Color::Cyan),
            Cell::new("Steps"),
            Cell::new("Result"),
            Cell::new("Duration"),
            Cell::new("Steps/s"),
            Cell::new("Score"),
        ]);

    for run in &report.runs {
        let result = if run.success {
            Cell::new("ok").fg(Color::Green)
        } else {
            Cell::new("failed").fg(Color::Red)
        };
        table.add_row(vec![
            Cell::new(run.disc_count),
            Cell::new(format!("{}/{}", run.completed_steps, run.total_steps)),
            result,
            Cell::new(format_duration_ms(run.duration_ms)),
            Cell::new(format!("{:.1}", run.steps_per_second)),
            Cell::new(format!("{:.2}", run.score)),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {}  {}",
        style("Max completed discs:").bold(),
        style(report.max_completed_discs).cyan()
    );
    println!("  {}  {:.2}", style("Total score:").bold(), report.total_score());
    println!();

    Ok(())
}

/// Human-readable duration: milliseconds below a second, else seconds.
fn format_duration_ms(ms: u64) -> String {
    if ms < 1_000 {
        format!("{ms} ms")
    } else if ms < 60_000 {
        format!("{:.2} s", ms as f64 / 1_000.0)
    } else {
        format!("{}m {:02}s", ms / 60_000, (ms % 60_000) / 1_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_ms() {
        assert_eq!(format_duration_ms(42), "42 ms");
        assert_eq!(format_duration_ms(1_500), "1.50 s");
        assert_eq!(format_duration_ms(125_000), "2m 05s");
    }

    #[test]
    fn watched_ids_are_bounded() {
        assert_eq!(watched_ids(2), vec!["maker-hanoi-1", "maker-hanoi-2"]);
        assert_eq!(watched_ids(u32::MAX).len(), MAX_DISC_COUNT as usize);
        assert!(watched_ids(0).is_empty());
    }

    #[test]
    fn cancelled_error_suggests_resume() {
        let err = BenchmarkError::Engine(EngineError::Cancelled {
            workflow_id: "maker-hanoi-5".to_string(),
            step_number: 9,
        });
        let msg = into_cli_error(err, Some(5)).to_string();
        assert!(msg.contains("step 9"));
        assert!(msg.contains("bench resume --discs 5"));
    }

    #[test]
    fn other_errors_pass_through() {
        let err = BenchmarkError::InvalidDiscCount { disc_count: 0, max: 30 };
        let msg = into_cli_error(err, Some(0)).to_string();
        assert!(msg.contains("out of range"));
    }

    #[test]
    fn events_drive_bar_position() {
        let bar = ProgressBar::hidden();
        apply_event(
            &bar,
            &EngineEvent::WorkflowStarted {
                workflow_id: "maker-hanoi-3".to_string(),
                workflow_name: "hanoi".to_string(),
                total_steps: 7,
            },
        );
        assert_eq!(bar.length(), Some(7));

        apply_event(
            &bar,
            &EngineEvent::StepCompleted {
                workflow_id: "maker-hanoi-3".to_string(),
                step_number: 4,
                step_name: "Move disc 3 A->C".to_string(),
                attempts: 1,
                duration_ms: 0,
            },
        );
        assert_eq!(bar.position(), 4);

        apply_event(
            &bar,
            &EngineEvent::WorkflowResumed {
                workflow_id: "maker-hanoi-3".to_string(),
                from_step: 3,
                total_steps: 7,
            },
        );
        assert_eq!(bar.position(), 2);
    }
}
