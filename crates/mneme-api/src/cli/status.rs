//! Status dashboard.

use anyhow::Result;
use console::style;

use mneme_core::memory::embedder::Embedder;
use mneme_core::memory::store::MetadataStore;

use crate::state::AppState;

pub async fn status(state: &AppState, json: bool) -> Result<()> {
    let engine = state.engine();
    let memories = engine.metadata().count().await?;
    let with_memories = engine.metadata().conversations_with_memories().await?;
    let partitions = engine.registry().partition_ids();
    let pending: usize = engine
        .pending_reindex()
        .iter()
        .map(|(_, ids)| ids.len())
        .sum();

    if json {
        let status = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "embedding_model": engine.embedder().model_name(),
            "memories": memories,
            "conversations_with_memories": with_memories.len(),
            "index_partitions": partitions.len(),
            "pending_reindex": pending,
            "snapshot": state.snapshots.location(),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    println!("  {} mneme v{}", style("◆").bold(), env!("CARGO_PKG_VERSION"));
    println!();
    println!("  {}", style("── Storage ──").dim());
    println!("  Data dir:   {}", style(state.data_dir.display()).cyan());
    println!("  Snapshot:   {}", style(state.snapshots.location()).cyan());
    println!("  Embedder:   {}", engine.embedder().model_name());
    println!();
    println!("  {}", style("── Memory ──").dim());
    println!("  Memories:       {}", style(memories).bold());
    println!("  Conversations:  {}", style(with_memories.len()).bold());
    println!("  Partitions:     {}", style(partitions.len()).bold());
    if pending > 0 {
        println!("  Pending index:  {}", style(pending).yellow());
    }
    println!();
    Ok(())
}
