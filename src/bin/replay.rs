// Workflow Engine - fixture replay
// Run with: cargo run --bin replay -- demos/replay.json

//! # Replay Binary
//!
//! Loads a JSON [`Fixture`] (configuration plus events), installs it into the
//! in-memory collaborators and runs every event through
//! `process_workflows`. Prints the triggered workflows per event, the tasks
//! that reached the queue, and whatever was deferred to the buffer.
//!
//! Engine settings come from `--config` (or `WORKFLOW_ENGINE_CONFIG`) and
//! `WORKFLOW_ENGINE__*` environment variables; a `.env` file is honoured.
//!
//! ```text
//! RUST_LOG=workflow_engine=debug cargo run --bin replay -- demos/replay.json --dry-run
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use dotenv::dotenv;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use workflow_engine::engine::buffer::DelayedWorkflowBuffer;
use workflow_engine::fixture::Fixture;
use workflow_engine::{
    ChannelTaskQueue, ConditionHandlerRegistry, EngineConfig, InMemoryBuffer, InMemoryFireHistory,
    InMemoryStorage, WorkflowProcessor,
};

#[derive(Parser)]
#[command(name = "replay")]
#[command(about = "Replay fixture events through the workflow engine")]
#[command(version)]
struct Cli {
    /// JSON fixture with detectors, environments, actions, workflows and events
    fixture: PathBuf,

    /// Engine config file (TOML, YAML or JSON)
    #[arg(long, env = "WORKFLOW_ENGINE_CONFIG")]
    config: Option<String>,

    /// Record fires without dispatching any action
    #[arg(long)]
    dry_run: bool,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    dotenv().ok();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = EngineConfig::load(cli.config.as_deref())?;
    if cli.dry_run {
        config.trigger_actions_enabled = false;
    }
    info!(?config, "Loaded engine config");

    let raw = std::fs::read_to_string(&cli.fixture)
        .with_context(|| format!("reading fixture {}", cli.fixture.display()))?;
    let fixture = Fixture::from_json(&raw)
        .with_context(|| format!("parsing fixture {}", cli.fixture.display()))?;

    let registry = Arc::new(ConditionHandlerRegistry::with_default_handlers());
    let storage = Arc::new(InMemoryStorage::new(Arc::clone(&registry)));
    let buffer = Arc::new(InMemoryBuffer::new());
    let history = Arc::new(InMemoryFireHistory::new());
    let (queue, mut receiver) = ChannelTaskQueue::new(1024);

    fixture.install(storage.as_ref()).await?;
    info!(
        workflows = fixture.workflows.len(),
        events = fixture.events.len(),
        "Installed fixture"
    );

    // Stand-in action executor: collect everything that reaches the queue
    let executor = tokio::spawn(async move {
        let mut tasks = Vec::new();
        while let Some(task) = receiver.recv().await {
            tasks.push(task);
        }
        tasks
    });

    let buffer_list_key = config.buffer_list_key.clone();
    let processor = WorkflowProcessor::new(
        registry,
        storage,
        buffer.clone(),
        history.clone(),
        Arc::new(queue),
        config,
    );

    for event in &fixture.events {
        match processor.process_workflows(event).await {
            Ok(triggered) => {
                let mut ids: Vec<i64> = triggered.iter().map(|w| w.id.get()).collect();
                ids.sort_unstable();
                println!(
                    "{} group={} triggered={:?}",
                    event.kind(),
                    event.group().id,
                    ids
                );
            }
            Err(e) => warn!(error = %e, group_id = %event.group().id, "Event failed"),
        }
    }

    // Dropping the processor closes the queue so the executor finishes
    let metrics = Arc::clone(processor.metrics());
    drop(processor);
    let tasks = executor.await.context("action executor panicked")?;

    println!("\nqueued tasks: {}", tasks.len());
    for task in &tasks {
        println!("  {}", serde_json::to_string(task)?);
    }

    println!("\nfire history:");
    for entry in history.all_entries() {
        println!(
            "  action={} workflow={} group={} dispatched={}",
            entry.action_id, entry.workflow_id, entry.group_id, entry.dispatched
        );
    }

    println!("\nbuffered work:");
    for (project_id, _) in buffer.get_sorted_set(&buffer_list_key, Utc::now()).await? {
        for (key, value) in buffer.get_hash(project_id).await? {
            println!("  project={project_id} {key} -> {value}");
        }
    }

    println!("\nmetrics:");
    for (name, value) in metrics.snapshot() {
        println!("  {name} = {value}");
    }

    Ok(())
}
