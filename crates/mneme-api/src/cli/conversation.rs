//! Conversation commands: register, show.

use anyhow::Result;
use console::style;

use mneme_types::conversation::{Conversation, RegisterConversationRequest};

use crate::state::AppState;

/// Register a conversation and print its id.
///
/// ```bash
/// mneme register --agent support-bot --user alice
/// ```
pub async fn register(state: &AppState, agent: String, user: String, json: bool) -> Result<()> {
    let conversation = state
        .memory_service
        .register_conversation(RegisterConversationRequest { agent, user })
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&conversation)?);
        return Ok(());
    }

    println!(
        "  {} Registered conversation {}",
        style("*").green().bold(),
        style(conversation.id).cyan().bold()
    );
    print_details(&conversation);
    Ok(())
}

pub async fn show(state: &AppState, conversation_id: &str, json: bool) -> Result<()> {
    let conversation = state.memory_service.conversation(conversation_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&conversation)?);
        return Ok(());
    }

    println!();
    println!("  Conversation {}", style(conversation.id).cyan().bold());
    print_details(&conversation);
    Ok(())
}

fn print_details(conversation: &Conversation) {
    println!("  {} {}", style("Agent:").dim(), conversation.agent);
    println!("  {} {}", style("User: ").dim(), conversation.user);
    println!(
        "  {} {}",
        style("Since:").dim(),
        conversation.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();
}
