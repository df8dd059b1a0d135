//! Snapshot and re-index commands.

use anyhow::Result;
use console::style;

use mneme_core::memory::store::MetadataStore;
use mneme_types::snapshot::{LoadOutcome, RestoreMode};

use crate::state::AppState;

/// Write a bundle of the current state.
pub async fn push(state: &AppState, json: bool) -> Result<()> {
    let summary = state.snapshots.store(&state.cancel).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!(
        "  {} Snapshot written to {}",
        style("*").green().bold(),
        style(state.snapshots.location()).cyan()
    );
    println!(
        "  {} conversations, {} memories, {} partitions, {} bytes",
        style(summary.manifest.conversation_count).bold(),
        style(summary.manifest.memory_count).bold(),
        style(summary.manifest.partitions.len()).bold(),
        summary.bytes_written
    );
    Ok(())
}

/// Load the bundle explicitly, regardless of `restore_on_start`.
pub async fn pull(state: &AppState, index_only: bool, json: bool) -> Result<()> {
    let mode = if index_only {
        RestoreMode::IndexOnly
    } else {
        RestoreMode::Full
    };
    let outcome = state.snapshots.load(mode, &state.cancel).await?;
    if let LoadOutcome::Restored(report) = &outcome {
        state.engine().queue_from_report(report);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    let report = match outcome {
        LoadOutcome::NoSnapshot => {
            println!(
                "  {} No snapshot at {}",
                style("i").blue().bold(),
                style(state.snapshots.location()).cyan()
            );
            return Ok(());
        }
        LoadOutcome::Restored(report) => report,
    };

    println!(
        "  {} Restored ({:?}) from {}",
        style("*").green().bold(),
        report.mode,
        style(state.snapshots.location()).cyan()
    );
    for (conversation_id, partition) in &report.partitions {
        let mut line = format!("  {conversation_id}: {} vectors", partition.vectors);
        if !partition.orphan_vectors.is_empty() {
            line.push_str(&format!(", {} orphaned", partition.orphan_vectors.len()));
        }
        if !partition.unindexed_rows.is_empty() {
            line.push_str(&format!(", {} unindexed", partition.unindexed_rows.len()));
        }
        println!("{line}");
    }
    if !report.recency_only.is_empty() {
        println!(
            "  {} {} conversation(s) are recency-only until `mneme reindex`",
            style("!").yellow().bold(),
            report.recency_only.len()
        );
    }
    Ok(())
}

/// Queue every row missing from its partition, then re-embed the queue.
pub async fn reindex(state: &AppState, json: bool) -> Result<()> {
    let engine = state.engine();

    let mut queued = 0usize;
    for conversation_id in engine.metadata().conversations_with_memories().await? {
        queued += engine.scan_unindexed(conversation_id).await?;
    }
    let indexed = engine.reindex_pending(&state.cancel).await?;
    let remaining: usize = engine
        .pending_reindex()
        .iter()
        .map(|(_, ids)| ids.len())
        .sum();

    if json {
        println!(
            "{}",
            serde_json::json!({ "queued": queued, "indexed": indexed, "remaining": remaining })
        );
        return Ok(());
    }

    if indexed == 0 && remaining == 0 {
        println!("  {} Every memory is indexed.", style("*").green().bold());
        return Ok(());
    }
    println!(
        "  {} Re-indexed {} memor{}",
        style("*").green().bold(),
        style(indexed).bold(),
        if indexed == 1 { "y" } else { "ies" }
    );
    if remaining > 0 {
        println!(
            "  {} {} still pending (see logs with -v)",
            style("!").yellow().bold(),
            remaining
        );
    }
    Ok(())
}
