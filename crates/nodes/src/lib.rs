//! `nodes` crate — the `RunTask` trait and the built-in task variants.
//!
//! Every variant implements [`RunTask`]: it takes the ordered results of its
//! producers and yields one [`TaskResult`]. Network-backed variants reach the
//! outside world only through the collaborators carried in [`RunContext`].

pub mod bridge;
pub mod error;
pub mod http;
pub mod json_parse;
pub mod median;
pub mod mock;
pub mod multiply;
pub mod traits;
pub mod value;

pub use bridge::BridgeTask;
pub use error::RunError;
pub use http::{HttpMethod, HttpRequestData, HttpTask};
pub use json_parse::{JsonParseTask, JsonPath};
pub use median::MedianTask;
pub use multiply::MultiplyTask;
pub use traits::{BridgeResolver, HttpClient, RunContext, RunTask};
pub use value::{parse_decimal, TaskResult, Value};

pub use bigdecimal::BigDecimal;
