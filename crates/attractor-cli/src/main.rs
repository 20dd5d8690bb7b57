//! CLI binary for running, validating, and inspecting Attractor pipelines.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "attractor", version, about = "DOT-based pipeline runner for AI workflows")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline from a .dot file
    Run {
        /// Path to the pipeline .dot file
        pipeline: PathBuf,

        /// Logs and checkpoint output directory
        #[arg(short, long, default_value = ".attractor/logs")]
        logs: PathBuf,

        /// Pipeline id used to namespace checkpoints and status files
        #[arg(long, default_value = "pipeline")]
        pipeline_id: String,

        /// Resume from a matching on-disk checkpoint if one exists
        #[arg(long)]
        resume: bool,
    },

    /// Validate a pipeline .dot file
    Validate {
        /// Path to the pipeline .dot file
        pipeline: PathBuf,
    },

    /// Show information about a pipeline
    Info {
        /// Path to the pipeline .dot file
        pipeline: PathBuf,
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
            logs,
            pipeline_id,
            resume,
        } => {
            cmd_run(&pipeline, &logs, &pipeline_id, resume).await?;
        }
        Commands::Validate { pipeline } => {
            cmd_validate(&pipeline)?;
        }
        Commands::Info { pipeline } => {
            cmd_info(&pipeline)?;
        }
    }

    Ok(())
}

fn load_pipeline(path: &std::path::Path) -> anyhow::Result<attractor_pipeline::PipelineGraph> {
    let source = std::fs::read_to_string(path)?;
    let dot = attractor_dot::parse(&source)?;
    let graph = attractor_pipeline::PipelineGraph::from_dot(dot)?;
    Ok(graph)
}

/// Parsing and graph construction are themselves most of the validation: a
/// pipeline that loads without error has a resolvable start node, typed
/// attributes, and a connected edge set. The one thing construction doesn't
/// check is whether every node's `type` resolves to a registered handler, so
/// that's checked here against the same registry `run` would use.
fn cmd_validate(path: &std::path::Path) -> anyhow::Result<()> {
    let graph = load_pipeline(path)?;
    let mut ok = true;

    if graph.start_node().is_none() {
        println!("[ERROR] no start node: no node has type=\"start\" and no node has zero incoming edges");
        ok = false;
    }
    if graph.exit_node().is_none() {
        println!("[WARN] no exit node: no node has type=\"exit\"; the pipeline will run until routing produces NoRouting");
    }

    let registry = attractor_pipeline::default_registry_with_interviewer(std::sync::Arc::new(
        attractor_pipeline::ConsoleInterviewer,
    ));
    let mut nodes: Vec<_> = graph.all_nodes().collect();
    nodes.sort_by(|a, b| a.id.cmp(&b.id));
    for node in nodes {
        let handler_type = registry.resolve_type(node);
        if registry.get(&handler_type).is_none() {
            println!("[ERROR] node '{}': no registered handler for type \"{handler_type}\"", node.id);
            ok = false;
        }
    }

    if !ok {
        std::process::exit(1);
    }
    println!("Pipeline is valid");
    Ok(())
}

fn cmd_info(path: &std::path::Path) -> anyhow::Result<()> {
    let graph = load_pipeline(path)?;

    println!("Pipeline: {}", graph.name);
    if let Some(goal) = graph.attributes.get("goal").and_then(|a| a.as_str()) {
        println!("Goal: {}", goal);
    }

    println!("Nodes: {}", graph.all_nodes().count());
    println!("Edges: {}", graph.all_edges().len());

    if let Some(start) = graph.start_node() {
        println!("Start: {} ({})", start.id, start.label());
    }
    if let Some(exit) = graph.exit_node() {
        println!("Exit: {} ({})", exit.id, exit.label());
    }

    println!("\nNodes:");
    let mut nodes: Vec<_> = graph.all_nodes().collect();
    nodes.sort_by(|a, b| a.id.cmp(&b.id));
    for node in nodes {
        println!("  {} [{}] type={}", node.id, node.label(), node.node_type());
    }

    Ok(())
}

async fn cmd_run(path: &std::path::Path, logs: &std::path::Path, pipeline_id: &str, resume: bool) -> anyhow::Result<()> {
    let graph = load_pipeline(path)?;

    println!("Running pipeline: {}", graph.name);
    if let Some(goal) = graph.attributes.get("goal").and_then(|a| a.as_str()) {
        println!("Goal: {}", goal);
    }

    let interviewer = std::sync::Arc::new(attractor_pipeline::ConsoleInterviewer);
    let registry = attractor_pipeline::default_registry_with_interviewer(interviewer);
    let executor = attractor_pipeline::PipelineExecutor::new(registry);

    let mut config = attractor_pipeline::PipelineConfig::new(logs);
    config.pipeline_id = pipeline_id.to_string();
    config.resume = resume;

    let result = executor.run(&graph, &config).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);

    if !matches!(result.outcome.status, attractor_types::StageStatus::Success) {
        std::process::exit(1);
    }

    Ok(())
}
