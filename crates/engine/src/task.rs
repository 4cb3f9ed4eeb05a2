//! Compiled tasks: one node's semantics plus its link to the next task.

use std::fmt;
use std::sync::Arc;

use nodes::{
    BridgeTask, HttpTask, JsonParseTask, MedianTask, MultiplyTask, RunContext, RunTask, TaskResult,
};
use tracing::instrument;

use crate::factory::TaskType;
use crate::models::NodeId;

/// The closed set of task variants a node can decode into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    Bridge(BridgeTask),
    Http(HttpTask),
    JsonParse(JsonParseTask),
    Multiply(MultiplyTask),
    Median(MedianTask),
}

impl TaskKind {
    pub fn task_type(&self) -> TaskType {
        match self {
            TaskKind::Bridge(_) => TaskType::Bridge,
            TaskKind::Http(_) => TaskType::Http,
            TaskKind::JsonParse(_) => TaskType::JsonParse,
            TaskKind::Multiply(_) => TaskType::Multiply,
            TaskKind::Median(_) => TaskType::Median,
        }
    }

    fn as_runnable(&self) -> &dyn RunTask {
        match self {
            TaskKind::Bridge(t) => t,
            TaskKind::Http(t) => t,
            TaskKind::JsonParse(t) => t,
            TaskKind::Multiply(t) => t,
            TaskKind::Median(t) => t,
        }
    }
}

/// A decoded node wired to its downstream consumer.
///
/// Producers share their consumer through an `Arc`, so a consumer lives as
/// long as any task that feeds it. There is no link back to producers; the
/// [`TaskGraph`](crate::TaskGraph) answers that question.
pub struct Task {
    id: NodeId,
    name: String,
    consumer: Option<Arc<Task>>,
    kind: TaskKind,
}

impl Task {
    pub fn new(id: NodeId, name: impl Into<String>, consumer: Option<Arc<Task>>, kind: TaskKind) -> Self {
        Self {
            id,
            name: name.into(),
            consumer,
            kind,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The task this task's result is routed to, if any.
    pub fn consumer(&self) -> Option<&Arc<Task>> {
        self.consumer.as_ref()
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn task_type(&self) -> TaskType {
        self.kind.task_type()
    }

    /// Run this task over its producers' results (ascending producer ID).
    #[instrument(skip_all, fields(task = %self.name, task_type = %self.task_type()))]
    pub async fn run(&self, ctx: &RunContext, inputs: &[TaskResult]) -> TaskResult {
        self.kind.as_runnable().run(ctx, inputs).await
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("consumer", &self.consumer.as_ref().map(|c| c.name()))
            .field("kind", &self.kind)
            .finish()
    }
}
