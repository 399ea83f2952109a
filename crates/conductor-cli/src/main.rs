//! CLI binary for running and validating Conductor pipelines.

mod doctor;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use conductor_pipeline::{
    apply_transforms, default_registry_with_interviewer, validate, AutoApproveInterviewer,
    ConsoleInterviewer, EventObserver, Interviewer, PipelineEvent, PipelineExecutor,
    PipelineGraph, RunStatus, SimulationBackend,
};
use conductor_types::Severity;

#[derive(Parser)]
#[command(name = "conductor", version, about = "Pipeline execution engine for agent workflows")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline from a JSON graph document (simulation backend)
    Run {
        /// Path to the pipeline JSON file
        pipeline: PathBuf,

        /// Answer interactive-mode review questions on the console instead
        /// of auto-approving
        #[arg(long)]
        interactive: bool,
    },

    /// Validate a pipeline JSON file and print its diagnostics
    Validate {
        /// Path to the pipeline JSON file
        pipeline: PathBuf,
    },

    /// Probe the storage backend and publish the type bundle
    Doctor {
        /// Base URL of the storage backend
        #[arg(long, default_value = "http://127.0.0.1:9009")]
        storage_url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run {
            pipeline,
            interactive,
        } => cmd_run(&pipeline, interactive).await?,
        Commands::Validate { pipeline } => cmd_validate(&pipeline)?,
        Commands::Doctor { storage_url } => {
            let client = doctor::HttpStorageClient::new(storage_url);
            let code = doctor::run_doctor(&client, &mut std::io::stdout()).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
    }

    Ok(())
}

fn load_pipeline(path: &Path) -> anyhow::Result<PipelineGraph> {
    let text = std::fs::read_to_string(path)?;
    let mut graph = PipelineGraph::from_json(&text)?;
    apply_transforms(&mut graph);
    Ok(graph)
}

fn cmd_validate(path: &Path) -> anyhow::Result<()> {
    let graph = load_pipeline(path)?;
    let collection = validate(&graph);

    if collection.is_empty() {
        println!("{}: no findings", graph.name);
        return Ok(());
    }

    for d in &collection.diagnostics {
        let severity = match d.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        println!("{severity}: [{}] {}", d.rule, d.message);
        if let Some(suggestion) = &d.suggestion {
            println!("  hint: {suggestion}");
        }
    }

    if collection.has_errors() {
        anyhow::bail!("validation failed with {} error(s)", collection.errors().len());
    }
    Ok(())
}

/// Prints traversal progress as events arrive.
struct ProgressObserver;

impl EventObserver for ProgressObserver {
    fn on_event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::NodeEntered { node_id, handler_type } => {
                println!("-> {node_id} ({handler_type})");
            }
            PipelineEvent::NodeCompleted { node_id, status } => {
                println!("   {node_id}: {}", status.as_condition_str());
            }
            PipelineEvent::AgentTurnCompleted { node_id, turn } => {
                println!("   {node_id}: turn {} completed", turn.turn_number);
            }
            _ => {}
        }
    }
}

async fn cmd_run(path: &Path, interactive: bool) -> anyhow::Result<()> {
    let graph = load_pipeline(path)?;

    let interviewer: Arc<dyn Interviewer> = if interactive {
        Arc::new(ConsoleInterviewer)
    } else {
        Arc::new(AutoApproveInterviewer)
    };
    let registry = default_registry_with_interviewer(
        Arc::new(SimulationBackend::new()),
        interviewer,
        None,
    );

    let executor = PipelineExecutor::new(registry);
    executor.events().add_observer(Arc::new(ProgressObserver));

    let result = executor.run(&graph).await?;

    println!(
        "\n{}: {} ({} nodes)",
        graph.name,
        result.status.as_str(),
        result.completed_nodes.len()
    );
    if result.status == RunStatus::Failed {
        if let Some(reason) = result
            .completed_nodes
            .last()
            .and_then(|id| result.node_outcomes.get(id))
            .and_then(|o| o.failure_reason.clone())
        {
            println!("failure: {reason}");
        }
        std::process::exit(1);
    }

    Ok(())
}
