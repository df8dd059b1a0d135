//! CLI command definitions for the `mneme` binary.

pub mod conversation;
pub mod memory;
pub mod snapshot;
pub mod status;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Semantic memory for conversational agents.
#[derive(Parser)]
#[command(name = "mneme", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Also export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true, env = "MNEME_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a new conversation between an agent and a user.
    Register {
        /// Agent name.
        #[arg(long)]
        agent: String,

        /// User name.
        #[arg(long)]
        user: String,
    },

    /// Show a registered conversation.
    Show {
        /// Conversation id.
        conversation: String,
    },

    /// Store one query/response turn.
    Store {
        /// Conversation id.
        conversation: String,

        /// The user's query.
        query: String,

        /// The agent's response.
        response: String,
    },

    /// Recall recent and semantically similar turns for a query.
    Retrieve {
        /// Conversation id.
        conversation: String,

        /// Text to search for.
        query: String,

        /// Number of similar turns (0 = configured default).
        #[arg(short = 'k', long, default_value = "0")]
        top_k: usize,
    },

    /// List the most recent turns of a conversation.
    Recent {
        /// Conversation id.
        conversation: String,

        /// Number of turns (defaults to the configured recency window).
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Re-embed and re-index turns missing from their index partition.
    Reindex,

    /// Snapshot bundle management (push, pull).
    Snapshot {
        #[command(subcommand)]
        action: SnapshotCommand,
    },

    /// Data directory, store counts and index partitions.
    Status,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum SnapshotCommand {
    /// Export metadata and every index partition to the blob store.
    Push,

    /// Rehydrate from the blob store.
    Pull {
        /// Replace only index partitions, keeping local metadata rows.
        #[arg(long)]
        index_only: bool,
    },
}

impl Commands {
    /// Whether the command changes state that the exit snapshot should capture.
    pub fn mutates(&self) -> bool {
        matches!(
            self,
            Commands::Register { .. } | Commands::Store { .. } | Commands::Reindex
        )
    }
}
