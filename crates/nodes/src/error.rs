//! Run-time error type carried inside a [`TaskResult`](crate::TaskResult).

use thiserror::Error;

/// Errors produced by a task's `run` method.
///
/// These are data, not control flow: a failed task hands one of these to its
/// consumer exactly like a successful value, and the consumer decides whether
/// to propagate it or filter it out.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RunError {
    /// The task received a number of upstream results it cannot work with.
    #[error("{task} task expects {expected} input(s), got {actual}")]
    WrongInputCardinality {
        task: &'static str,
        expected: &'static str,
        actual: usize,
    },

    /// A JSON path could not be walked past a non-terminal segment.
    #[error("could not resolve path [\"{}\"]", .path.join("\",\""))]
    UnresolvablePath { path: Vec<String> },

    /// The task was handed a value of a shape it does not process.
    #[error("{task} task does not accept inputs of type {found}")]
    UnsupportedValueType {
        task: &'static str,
        found: &'static str,
    },

    /// The input text was not valid JSON.
    #[error("invalid JSON input: {0}")]
    InvalidJson(String),

    /// A path segment addressing an array was not an integer.
    #[error("invalid array index '{0}'")]
    InvalidIndex(String),

    /// A textual value could not be read as a decimal number.
    #[error("'{0}' is not a valid decimal number")]
    InvalidNumber(String),

    /// Every input of an aggregating task carried an error.
    #[error("all {count} inputs failed")]
    AllInputsFailed { count: usize },

    /// The bridge collaborator failed to resolve the named source.
    #[error("bridge '{name}' failed: {message}")]
    Bridge { name: String, message: String },

    /// The HTTP collaborator failed to fetch the resource.
    #[error("http request to {url} failed: {message}")]
    Http { url: String, message: String },
}
