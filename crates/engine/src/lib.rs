//! `engine` crate — pipeline graph model, DOT decoding, task compilation and
//! a reference runner.
//!
//! Typical use:
//! ```ignore
//! let graph: TaskGraph = text.parse()?;
//! let tasks = graph.tasks_in_construction_order()?;
//! ```

pub mod dag;
pub mod dot;
pub mod error;
pub mod executor;
pub mod factory;
pub mod models;
pub mod task;

pub use dag::{GraphBuilder, TaskGraph};
pub use error::EngineError;
pub use executor::{PipelineRun, PipelineRunner, RunnerConfig};
pub use factory::{decode_task, TaskType};
pub use models::{GraphEdge, GraphNode, NodeId};
pub use task::{Task, TaskKind};
