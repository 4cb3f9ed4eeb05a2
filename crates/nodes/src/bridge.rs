//! Bridge task: fetch the raw response of a named external data source.

use async_trait::async_trait;
use tracing::debug;

use crate::value::no_inputs;
use crate::{RunContext, RunError, RunTask, TaskResult, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeTask {
    /// Name the bridge is registered under.
    pub name: String,
}

impl BridgeTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl RunTask for BridgeTask {
    async fn run(&self, ctx: &RunContext, inputs: &[TaskResult]) -> TaskResult {
        no_inputs("bridge", inputs)?;

        debug!(bridge = %self.name, "resolving bridge");
        let body = ctx
            .bridges
            .resolve(&self.name)
            .await
            .map_err(|message| RunError::Bridge {
                name: self.name.clone(),
                message,
            })?;

        Ok(Value::Bytes(body))
    }
}
