//! JSON parse task: decode textual input and walk a path into it.
//!
//! Path resolution rules:
//! - objects are indexed by key; a missing key on the last segment yields
//!   `null`, anywhere else it is an unresolvable path.
//! - arrays are indexed by signed integer, negative indices count from the
//!   end; an out-of-range (or overflowing) index on the last segment yields
//!   `null`, anywhere else it is an unresolvable path.
//! - scalars cannot be walked into.

use std::fmt;
use std::num::IntErrorKind;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::value::single_input;
use crate::{RunContext, RunError, RunTask, TaskResult, Value};

/// Ordered segments addressing a location in a JSON document.
///
/// Written as a comma-separated list in pipeline specs (`"data,0,price"`) and
/// persisted as a JSON array of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonPath(pub Vec<String>);

impl JsonPath {
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for JsonPath {
    /// Split a comma-separated list; the empty string is the empty path.
    fn from(s: &str) -> Self {
        if s.is_empty() {
            return JsonPath::default();
        }
        JsonPath(s.split(',').map(str::to_owned).collect())
    }
}

impl FromStr for JsonPath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(JsonPath::from(s))
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(","))
    }
}

impl<S: Into<String>> FromIterator<S> for JsonPath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        JsonPath(iter.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonParseTask {
    pub path: JsonPath,
}

impl JsonParseTask {
    pub fn new(path: JsonPath) -> Self {
        Self { path }
    }

    /// Decode `input` and extract the value at this task's path.
    pub fn extract(&self, input: &Value) -> TaskResult {
        let bytes = match input {
            Value::Json(Json::String(s)) => s.as_bytes(),
            Value::Bytes(b) => b.as_slice(),
            other => {
                return Err(RunError::UnsupportedValueType {
                    task: "jsonparse",
                    found: other.type_name(),
                })
            }
        };

        let decoded: Json =
            serde_json::from_slice(bytes).map_err(|e| RunError::InvalidJson(e.to_string()))?;

        self.walk(decoded).map(Value::Json)
    }

    fn walk(&self, mut current: Json) -> Result<Json, RunError> {
        let segments = self.path.segments();
        let last = segments.len().saturating_sub(1);

        for (i, segment) in segments.iter().enumerate() {
            let next = match current {
                Json::Object(mut map) => map.remove(segment),
                Json::Array(mut items) => {
                    resolve_index(segment, items.len())?.map(|idx| items.swap_remove(idx))
                }
                _ => return Err(self.unresolvable()),
            };

            current = match next {
                Some(value) => value,
                None if i == last => return Ok(Json::Null),
                None => return Err(self.unresolvable()),
            };
        }

        Ok(current)
    }

    fn unresolvable(&self) -> RunError {
        RunError::UnresolvablePath {
            path: self.path.0.clone(),
        }
    }
}

/// Map a signed index segment onto `[0, len)`. `Ok(None)` means the index is
/// well-formed but does not address an element.
fn resolve_index(segment: &str, len: usize) -> Result<Option<usize>, RunError> {
    let index = match segment.parse::<i64>() {
        Ok(index) => index,
        Err(e) if matches!(e.kind(), IntErrorKind::PosOverflow | IntErrorKind::NegOverflow) => {
            return Ok(None)
        }
        Err(_) => return Err(RunError::InvalidIndex(segment.to_owned())),
    };

    let Ok(len) = i64::try_from(len) else {
        return Ok(None);
    };
    let resolved = if index < 0 { len + index } else { index };

    if (0..len).contains(&resolved) {
        Ok(usize::try_from(resolved).ok())
    } else {
        Ok(None)
    }
}

#[async_trait]
impl RunTask for JsonParseTask {
    async fn run(&self, _ctx: &RunContext, inputs: &[TaskResult]) -> TaskResult {
        let input = single_input("jsonparse", inputs)?;
        self.extract(input)
    }
}
