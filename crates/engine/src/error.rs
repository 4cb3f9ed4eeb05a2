//! Engine-level error types.

use thiserror::Error;

/// Errors produced while decoding, validating or compiling a pipeline graph.
///
/// All of these are fatal to a compile: no partial graph or task list is ever
/// returned alongside one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    // ------ Graph decoding ------

    /// The pipeline text is not well-formed.
    #[error("syntax error on line {line}: {message}")]
    Decode { line: usize, message: String },

    /// Two node statements declare the same name.
    #[error("duplicate node name: '{0}'")]
    DuplicateNode(String),

    /// An edge references a node that was never declared.
    #[error("edge references undeclared node '{name}' ({side} side)")]
    UnknownNodeReference { name: String, side: &'static str },

    /// A node declares more than one downstream consumer.
    #[error("node '{node}' has more than one consumer ('{first}' and '{second}')")]
    MultipleConsumers {
        node: String,
        first: String,
        second: String,
    },

    // ------ Task decoding ------

    #[error("node '{node}': unknown task type '{task_type}'")]
    UnknownTaskType { node: String, task_type: String },

    #[error("node '{node}': missing required attribute '{attribute}'")]
    MissingAttribute { node: String, attribute: &'static str },

    #[error("node '{node}': invalid attribute '{attribute}': {reason}")]
    InvalidAttribute {
        node: String,
        attribute: &'static str,
        reason: String,
    },

    // ------ Ordering / execution ------

    /// The graph contains a directed cycle.
    #[error("pipeline graph contains a cycle")]
    Cycle,

    /// A spawned task could not be joined (it panicked or was aborted).
    #[error("task execution aborted: {0}")]
    Join(String),
}

impl EngineError {
    /// Whether this error came from decoding the pipeline text or a task's
    /// attributes, as opposed to ordering or execution.
    pub fn is_decode_error(&self) -> bool {
        !matches!(self, EngineError::Cycle | EngineError::Join(_))
    }
}
