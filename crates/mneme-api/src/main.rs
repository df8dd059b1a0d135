//! mneme CLI entry point.
//!
//! Binary name: `mneme`
//!
//! Parses arguments, wires the stores, restores the index from the snapshot
//! bundle, dispatches the command, and writes a fresh bundle after commands
//! that changed state.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;
use tokio_util::sync::CancellationToken;

use cli::{Cli, Commands, SnapshotCommand};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,mneme_core=debug,mneme_infra=debug",
        _ => "trace",
    };
    if let Err(e) = mneme_observe::tracing_setup::init_tracing(filter, cli.otel) {
        eprintln!("Warning: tracing setup failed: {e}");
    }

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "mneme", &mut std::io::stdout());
        return Ok(());
    }

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let state = AppState::init(cancel).await?;

    // An explicit pull decides its own restore mode.
    if !matches!(
        cli.command,
        Commands::Snapshot {
            action: SnapshotCommand::Pull { .. }
        }
    ) {
        state.restore().await?;
    }

    let snapshot_after = cli.command.mutates() && state.config.snapshot.snapshot_on_exit;

    let result = run(&state, cli.command, cli.json).await;

    if snapshot_after && !state.cancel.is_cancelled() {
        match state.snapshots.store(&state.cancel).await {
            Ok(summary) => tracing::info!(
                memories = summary.manifest.memory_count,
                bytes = summary.bytes_written,
                "snapshot written on exit"
            ),
            Err(e) => tracing::warn!(error = %e, "snapshot on exit failed"),
        }
    }

    mneme_observe::tracing_setup::shutdown_tracing();
    result
}

async fn run(state: &AppState, command: Commands, json: bool) -> anyhow::Result<()> {
    match command {
        Commands::Register { agent, user } => {
            cli::conversation::register(state, agent, user, json).await?;
        }

        Commands::Show { conversation } => {
            cli::conversation::show(state, &conversation, json).await?;
        }

        Commands::Store {
            conversation,
            query,
            response,
        } => {
            cli::memory::store(state, &conversation, &query, &response, json).await?;
        }

        Commands::Retrieve {
            conversation,
            query,
            top_k,
        } => {
            cli::memory::retrieve(state, &conversation, &query, top_k, json).await?;
        }

        Commands::Recent {
            conversation,
            limit,
        } => {
            cli::memory::recent(state, &conversation, limit, json).await?;
        }

        Commands::Reindex => {
            cli::snapshot::reindex(state, json).await?;
        }

        Commands::Snapshot { action } => match action {
            SnapshotCommand::Push => cli::snapshot::push(state, json).await?,
            SnapshotCommand::Pull { index_only } => {
                cli::snapshot::pull(state, index_only, json).await?;
            }
        },

        Commands::Status => {
            cli::status::status(state, json).await?;
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}

/// Cancel in-flight work on Ctrl+C.
async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("interrupted; cancelling");
        cancel.cancel();
    }
}
