//! Memory commands: store, retrieve, recent.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use mneme_types::memory::{Memory, RankedMemory};

use crate::state::AppState;

const PREVIEW_CHARS: usize = 60;

/// Store one turn.
///
/// ```bash
/// mneme store <conversation> "How do I reset my password?" "Use the forgot password link."
/// ```
pub async fn store(
    state: &AppState,
    conversation_id: &str,
    query: &str,
    response: &str,
    json: bool,
) -> Result<()> {
    let stored = state
        .memory_service
        .store(conversation_id, query, response, &state.cancel)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stored)?);
    } else {
        println!(
            "  {} Stored memory #{} ({})",
            style("*").green().bold(),
            style(stored.internal_id).bold(),
            style(stored.external_id).dim()
        );
    }
    Ok(())
}

/// Show the recency window and the nearest turns for a query.
pub async fn retrieve(
    state: &AppState,
    conversation_id: &str,
    query: &str,
    top_k: usize,
    json: bool,
) -> Result<()> {
    let recall = state
        .memory_service
        .retrieve(conversation_id, query, top_k, &state.cancel)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recall)?);
        return Ok(());
    }

    println!();
    println!("  {}", style("── Similar ──").dim());
    if !recall.similarity_available {
        println!(
            "  {} No index partition for this conversation yet. Run `mneme reindex` if it has memories.",
            style("i").blue().bold()
        );
    } else if recall.similar.is_empty() {
        println!("  {}", style("(none)").dim());
    } else {
        println!("{}", similar_table(&recall.similar));
    }

    println!();
    println!("  {}", style("── Recent ──").dim());
    if recall.recent.is_empty() {
        println!("  {}", style("(none)").dim());
    } else {
        println!("{}", recent_table(&recall.recent));
    }
    println!();
    Ok(())
}

pub async fn recent(
    state: &AppState,
    conversation_id: &str,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let memories = state.memory_service.recent(conversation_id, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&memories)?);
        return Ok(());
    }

    if memories.is_empty() {
        println!();
        println!(
            "  {} No memories stored for this conversation.",
            style("i").blue().bold()
        );
        println!();
        return Ok(());
    }

    println!();
    println!("{}", recent_table(&memories));
    println!();
    println!(
        "  {} memor{}",
        style(memories.len()).bold(),
        if memories.len() == 1 { "y" } else { "ies" }
    );
    println!();
    Ok(())
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(
        headers
            .iter()
            .map(|h| Cell::new(h).fg(Color::White))
            .collect::<Vec<_>>(),
    );
    table
}

fn similar_table(ranked: &[RankedMemory]) -> Table {
    let mut table = new_table(&["#", "Distance", "Query", "Response"]);
    for (rank, entry) in ranked.iter().enumerate() {
        table.add_row(vec![
            Cell::new(rank + 1).fg(Color::DarkGrey),
            Cell::new(format!("{:.4}", entry.distance)).fg(Color::Yellow),
            Cell::new(preview(&entry.memory.query)).fg(Color::Cyan),
            Cell::new(preview(&entry.memory.response)).fg(Color::White),
        ]);
    }
    table
}

fn recent_table(memories: &[Memory]) -> Table {
    let mut table = new_table(&["Id", "Query", "Response", "Date"]);
    for memory in memories {
        table.add_row(vec![
            Cell::new(memory.internal_id).fg(Color::DarkGrey),
            Cell::new(preview(&memory.query)).fg(Color::Cyan),
            Cell::new(preview(&memory.response)).fg(Color::White),
            Cell::new(memory.created_at.format("%Y-%m-%d %H:%M").to_string()).fg(Color::DarkGrey),
        ]);
    }
    table
}

/// Truncate on a char boundary.
fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let head: String = text.chars().take(PREVIEW_CHARS - 3).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}
