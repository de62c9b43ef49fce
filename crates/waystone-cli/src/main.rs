//! Waystone CLI entry point.
//!
//! Binary name: `waystone`
//!
//! Parses CLI arguments, initializes tracing, storage and the engine, then
//! dispatches to the benchmark or checkpoint inspection handlers.

mod cli;
mod state;

use std::sync::Arc;

use clap::Parser;
use waystone_core::repository::checkpoint::CheckpointStore;
use waystone_core::workflow::executor::WorkflowEngine;
use waystone_infra::memory::checkpoint::InMemoryCheckpointStore;
use waystone_observe::tracing_setup::{init_tracing, shutdown_tracing};

use cli::{BenchAction, Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,waystone=debug",
        _ => "trace",
    };
    init_tracing(filter, cli.otel).map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let outcome = run(cli).await;
    shutdown_tracing();
    outcome
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let state = AppState::init().await?;

    if cli.memory {
        let engine = WorkflowEngine::with_config(InMemoryCheckpointStore::new(), state.config.clone());
        return dispatch(&state, Arc::new(engine), cli.command, cli.json, cli.quiet).await;
    }

    let store = state.open_sqlite_store().await?;
    let engine = Arc::new(WorkflowEngine::with_config(store, state.config.clone()));
    let outcome = dispatch(&state, Arc::clone(&engine), cli.command, cli.json, cli.quiet).await;
    engine.checkpoint_manager().store().pool().close().await;
    outcome
}

async fn dispatch<S: CheckpointStore + 'static>(
    state: &AppState,
    engine: Arc<WorkflowEngine<S>>,
    command: Commands,
    json: bool,
    quiet: bool,
) -> anyhow::Result<()> {
    let output = cli::Output { json, quiet };
    match command {
        Commands::Bench { action } => match action {
            BenchAction::Run { discs } => {
                cli::bench::run(engine, state.config.clone(), discs, output).await?;
            }
            BenchAction::Progressive { max_discs } => {
                cli::bench::progressive(engine, state.config.clone(), max_discs, output).await?;
            }
            BenchAction::Resume { discs } => {
                cli::bench::resume(engine, state.config.clone(), discs, output).await?;
            }
        },

        Commands::Checkpoints { workflow_id, limit } => {
            cli::checkpoints::list_checkpoints(engine.as_ref(), &workflow_id, limit, json).await?;
        }

        Commands::Config => {
            cli::print_config(state, json)?;
        }
    }

    Ok(())
}
