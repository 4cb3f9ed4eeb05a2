//! Pipeline execution.
//!
//! `PipelineRunner` is a reference executor for compiled pipelines:
//! 1. Compiles the graph into wired tasks (consumers before producers).
//! 2. Starts every source task (no producers) concurrently.
//! 3. Hands each finished result to its consumer; a consumer is launched only
//!    once all of its producers have finished, with inputs ordered by
//!    producer ID.
//! 4. Collects every task's result, failed or not, into a [`PipelineRun`].
//!
//! Run-time failures are data: they flow to the consumer like any other
//! result. Only compile errors and aborted tasks fail the run itself.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use nodes::{BridgeResolver, HttpClient, RunContext, TaskResult};

use crate::models::NodeId;
use crate::task::Task;
use crate::{EngineError, TaskGraph};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Maximum number of tasks running at the same time.
    pub max_in_flight: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { max_in_flight: 8 }
    }
}

// ---------------------------------------------------------------------------
// Output of a completed run
// ---------------------------------------------------------------------------

/// Result and timing of one task within a run.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: NodeId,
    pub result: TaskResult,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Everything produced by one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub run_id: uuid::Uuid,
    /// Per-task records keyed by node name.
    pub tasks: BTreeMap<String, TaskRecord>,
    /// Names of tasks without a consumer, in ascending ID order.
    pub sinks: Vec<String>,
}

impl PipelineRun {
    pub fn result(&self, name: &str) -> Option<&TaskResult> {
        self.tasks.get(name).map(|r| &r.result)
    }

    /// `(name, result)` for each sink.
    pub fn sink_results(&self) -> impl Iterator<Item = (&str, &TaskResult)> {
        self.sinks
            .iter()
            .filter_map(|name| Some((name.as_str(), self.result(name)?)))
    }
}

// ---------------------------------------------------------------------------
// PipelineRunner
// ---------------------------------------------------------------------------

/// Runs compiled pipelines against a pair of network collaborators.
pub struct PipelineRunner {
    bridges: Arc<dyn BridgeResolver>,
    http: Arc<dyn HttpClient>,
    config: RunnerConfig,
}

type Finished = (NodeId, TaskResult, DateTime<Utc>, DateTime<Utc>);

impl PipelineRunner {
    pub fn new(
        bridges: Arc<dyn BridgeResolver>,
        http: Arc<dyn HttpClient>,
        config: RunnerConfig,
    ) -> Self {
        Self { bridges, http, config }
    }

    /// Compile and run `graph` once.
    ///
    /// # Errors
    /// Returns `EngineError` if the graph does not compile or a task could
    /// not be joined.
    #[instrument(skip_all, fields(nodes = graph.node_count()))]
    pub async fn run(&self, graph: &TaskGraph) -> Result<PipelineRun, EngineError> {
        // ------------------------------------------------------------------
        // Compile into wired tasks.
        // ------------------------------------------------------------------
        let tasks = graph.tasks_in_construction_order()?;
        let ctx = Arc::new(RunContext::new(Arc::clone(&self.bridges), Arc::clone(&self.http)));
        info!(run_id = %ctx.run_id, tasks = tasks.len(), "starting pipeline run");

        let by_id: HashMap<NodeId, Arc<Task>> = tasks.iter().map(|t| (t.id(), Arc::clone(t))).collect();
        let mut waiting_on: HashMap<NodeId, usize> = tasks
            .iter()
            .map(|t| (t.id(), graph.producers_of(t.id()).len()))
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let mut running: JoinSet<Finished> = JoinSet::new();

        // ------------------------------------------------------------------
        // Launch sources in ascending ID order.
        // ------------------------------------------------------------------
        let mut sources: Vec<NodeId> = waiting_on
            .iter()
            .filter(|&(_, &n)| n == 0)
            .map(|(&id, _)| id)
            .collect();
        sources.sort();
        for id in sources {
            spawn_task(&mut running, &by_id[&id], Vec::new(), &ctx, &semaphore);
        }

        // ------------------------------------------------------------------
        // Route results downstream as tasks finish.
        // ------------------------------------------------------------------
        let mut records: BTreeMap<NodeId, TaskRecord> = BTreeMap::new();

        while let Some(joined) = running.join_next().await {
            let (id, result, started_at, finished_at) =
                joined.map_err(|e| EngineError::Join(e.to_string()))?;

            let name = by_id[&id].name();
            match &result {
                Ok(_) => debug!(task = %name, "task succeeded"),
                Err(e) => warn!(task = %name, error = %e, "task failed"),
            }
            records.insert(id, TaskRecord { id, result, started_at, finished_at });

            let Some(consumer) = graph.consumer_of(id) else { continue };
            let Some(remaining) = waiting_on.get_mut(&consumer) else { continue };
            *remaining -= 1;
            if *remaining == 0 {
                let inputs: Vec<TaskResult> = graph
                    .producers_of(consumer)
                    .iter()
                    .filter_map(|p| records.get(p).map(|r| r.result.clone()))
                    .collect();
                spawn_task(&mut running, &by_id[&consumer], inputs, &ctx, &semaphore);
            }
        }

        // ------------------------------------------------------------------
        // Assemble the report.
        // ------------------------------------------------------------------
        let sinks = graph
            .sinks()
            .into_iter()
            .filter_map(|id| graph.node(id).map(|n| n.name.clone()))
            .collect();
        let tasks = records
            .into_values()
            .filter_map(|record| Some((graph.node(record.id)?.name.clone(), record)))
            .collect();

        info!(run_id = %ctx.run_id, "pipeline run finished");
        Ok(PipelineRun {
            run_id: ctx.run_id,
            tasks,
            sinks,
        })
    }
}

fn spawn_task(
    running: &mut JoinSet<Finished>,
    task: &Arc<Task>,
    inputs: Vec<TaskResult>,
    ctx: &Arc<RunContext>,
    semaphore: &Arc<Semaphore>,
) {
    let task = Arc::clone(task);
    let ctx = Arc::clone(ctx);
    let semaphore = Arc::clone(semaphore);

    running.spawn(async move {
        // The semaphore is never closed, so a permit is always granted.
        let _permit = semaphore.acquire_owned().await.ok();
        let started_at = Utc::now();
        let result = task.run(&ctx, &inputs).await;
        (task.id(), result, started_at, Utc::now())
    });
}
