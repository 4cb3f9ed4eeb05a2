//! The `RunTask` trait and the external collaborators tasks call out to.

use std::sync::Arc;

use async_trait::async_trait;

use crate::http::HttpTask;
use crate::TaskResult;

/// Resolves a named external data source ("bridge") to its raw response.
#[async_trait]
pub trait BridgeResolver: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<Vec<u8>, String>;
}

/// Performs the request described by an HTTP task and returns the raw body.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn fetch(&self, request: &HttpTask) -> Result<Vec<u8>, String>;
}

/// Shared context passed to every task during a pipeline run.
///
/// Defined here (in the nodes crate) so both the engine and individual task
/// implementations can import it without a circular dependency.
#[derive(Clone)]
pub struct RunContext {
    /// ID of the current pipeline run.
    pub run_id: uuid::Uuid,
    pub bridges: Arc<dyn BridgeResolver>,
    pub http: Arc<dyn HttpClient>,
}

impl RunContext {
    /// Context for a fresh run with a newly generated run ID.
    pub fn new(bridges: Arc<dyn BridgeResolver>, http: Arc<dyn HttpClient>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4(),
            bridges,
            http,
        }
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

/// The core task trait.
///
/// `inputs` holds the results of this task's producers, ordered by producer
/// node ID ascending. Every variant returns exactly one result; failures are
/// reported inside it rather than through a separate channel.
#[async_trait]
pub trait RunTask: Send + Sync {
    async fn run(&self, ctx: &RunContext, inputs: &[TaskResult]) -> TaskResult;
}
