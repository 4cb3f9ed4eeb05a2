//! `pipeline` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate` — decode and compile a pipeline spec.
//! - `order`    — print the construction order of a pipeline's tasks.
//! - `run`      — run a pipeline against canned bridge/HTTP responses.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine::{PipelineRunner, RunnerConfig, TaskGraph};
use nodes::mock::StaticResponses;

#[derive(Parser)]
#[command(
    name = "pipeline",
    about = "Compile and run data-aggregation pipelines written in DOT",
    version
)]
struct Cli {
    /// Log filter, e.g. `info` or `engine=debug`.
    #[arg(long, global = true, env = "PIPELINE_LOG", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode, cycle-check and compile a pipeline spec.
    Validate {
        /// Path to the pipeline DOT file.
        path: PathBuf,
    },
    /// Print tasks in construction order (consumers before producers).
    Order {
        /// Path to the pipeline DOT file.
        path: PathBuf,
    },
    /// Run a pipeline against canned responses.
    Run {
        /// Path to the pipeline DOT file.
        path: PathBuf,
        /// JSON file of the form `{"bridges": {..}, "http": {..}}`.
        #[arg(long)]
        responses: PathBuf,
        /// Maximum number of tasks running at once.
        #[arg(long, env = "PIPELINE_MAX_IN_FLIGHT", default_value_t = RunnerConfig::default().max_in_flight)]
        max_in_flight: usize,
    },
}

fn load_graph(path: &Path) -> Result<TaskGraph> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read pipeline {}", path.display()))?;
    text.parse::<TaskGraph>()
        .with_context(|| format!("invalid pipeline {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Validate { path } => {
            let graph = load_graph(&path)?;
            if graph.has_cycles() {
                bail!("pipeline {} contains a cycle", path.display());
            }
            let tasks = graph.tasks_in_construction_order()?;
            println!(
                "pipeline is valid: {} tasks, {} edges",
                tasks.len(),
                graph.edge_count()
            );
        }
        Command::Order { path } => {
            let graph = load_graph(&path)?;
            for task in graph.tasks_in_construction_order()? {
                match task.consumer() {
                    Some(consumer) => println!("{} [{}] -> {}", task.name(), task.task_type(), consumer.name()),
                    None => println!("{} [{}]", task.name(), task.task_type()),
                }
            }
        }
        Command::Run { path, responses, max_in_flight } => {
            let graph = load_graph(&path)?;
            let fixture = std::fs::read_to_string(&responses)
                .with_context(|| format!("cannot read responses {}", responses.display()))?;
            let collaborators = Arc::new(
                StaticResponses::from_json(&fixture)
                    .with_context(|| format!("invalid responses {}", responses.display()))?,
            );

            let runner = PipelineRunner::new(
                collaborators.clone(),
                collaborators,
                RunnerConfig { max_in_flight },
            );
            let run = runner.run(&graph).await?;
            info!(run_id = %run.run_id, "run complete");

            let mut failed = false;
            for (name, result) in run.sink_results() {
                match result {
                    Ok(value) => println!("{name}: {}", value.to_json()),
                    Err(e) => {
                        failed = true;
                        println!("{name}: error: {e}");
                    }
                }
            }
            if failed {
                bail!("one or more pipeline outputs failed");
            }
        }
    }

    Ok(())
}
