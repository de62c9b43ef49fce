//! `waystone checkpoints <workflow-id>`: tabulate a checkpoint trail.

use anyhow::Context;
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use waystone_core::workflow::executor::WorkflowExecutor;
use waystone_types::workflow::{CheckpointStatus, ExecutionCheckpoint};

/// Print the checkpoint trail of `workflow_id` in write order.
pub async fn list_checkpoints(
    engine: &impl WorkflowExecutor,
    workflow_id: &str,
    limit: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let trail = engine
        .checkpoints(workflow_id)
        .await
        .with_context(|| format!("failed to read checkpoints for '{workflow_id}'"))?;
    let shown = tail(&trail, limit);

    if json {
        println!("{}", serde_json::to_string_pretty(shown)?);
        return Ok(());
    }

    if shown.is_empty() {
        println!();
        println!("  No checkpoints for workflow '{workflow_id}'.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Name"),
            Cell::new("Status"),
            Cell::new("Attempts"),
            Cell::new("Duration"),
            Cell::new("Written"),
            Cell::new("Error"),
        ]);

    for cp in shown {
        let error = cp
            .error
            .as_ref()
            .map(|e| e.chars().take(40).collect::<String>())
            .unwrap_or_else(|| "-".to_string());

        table.add_row(vec![
            Cell::new(cp.step_number),
            Cell::new(&cp.step_name),
            status_cell(cp),
            Cell::new(cp.attempts),
            Cell::new(format!("{} ms", cp.duration_ms)),
            Cell::new(cp.created_at.format("%H:%M:%S%.3f").to_string()),
            Cell::new(error),
        ]);
    }

    println!();
    println!("{table}");
    if shown.len() < trail.len() {
        println!("  ({} of {} checkpoints shown)", shown.len(), trail.len());
    }
    println!();

    Ok(())
}

/// The last `limit` checkpoints, or all of them.
fn tail(trail: &[ExecutionCheckpoint], limit: Option<usize>) -> &[ExecutionCheckpoint] {
    match limit {
        Some(n) if n < trail.len() => &trail[trail.len() - n..],
        _ => trail,
    }
}

fn status_cell(cp: &ExecutionCheckpoint) -> Cell {
    if cp.is_cancellation() {
        return Cell::new("cancelled").fg(Color::Yellow);
    }
    match cp.status {
        CheckpointStatus::Completed => Cell::new(cp.status.as_str()).fg(Color::Green),
        CheckpointStatus::Failed => Cell::new(cp.status.as_str()).fg(Color::Red),
    }
}
