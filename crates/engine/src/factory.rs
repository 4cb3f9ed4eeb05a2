//! Task factory: turn a raw [`GraphNode`] into a typed [`Task`].
//!
//! The node's `type` attribute selects the variant; each variant then
//! validates its own attributes once, here, so nothing downstream has to
//! re-check them.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use nodes::{
    parse_decimal, BigDecimal, BridgeTask, HttpMethod, HttpRequestData, HttpTask, JsonParseTask,
    JsonPath, MedianTask, MultiplyTask,
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::models::GraphNode;
use crate::task::{Task, TaskKind};
use crate::EngineError;

/// The task variants a node's `type` attribute can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Bridge,
    Http,
    JsonParse,
    Multiply,
    Median,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Bridge => "bridge",
            TaskType::Http => "http",
            TaskType::JsonParse => "jsonparse",
            TaskType::Multiply => "multiply",
            TaskType::Median => "median",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bridge" => Ok(TaskType::Bridge),
            "http" => Ok(TaskType::Http),
            "jsonparse" => Ok(TaskType::JsonParse),
            "multiply" => Ok(TaskType::Multiply),
            "median" => Ok(TaskType::Median),
            _ => Err(()),
        }
    }
}

/// Decode `node` into a task wired to `consumer`.
///
/// # Errors
/// - [`EngineError::MissingAttribute`] if `type` or a required attribute is
///   absent.
/// - [`EngineError::UnknownTaskType`] if `type` names no known variant.
/// - [`EngineError::InvalidAttribute`] if an attribute does not parse.
pub fn decode_task(node: &GraphNode, consumer: Option<Arc<Task>>) -> Result<Task, EngineError> {
    let attrs = Attributes(node);

    let declared = attrs.required("type")?;
    let task_type: TaskType = declared.parse().map_err(|_| EngineError::UnknownTaskType {
        node: node.name.clone(),
        task_type: declared.to_owned(),
    })?;

    let kind = match task_type {
        TaskType::Bridge => {
            let name = attrs.required("name")?;
            if name.is_empty() {
                return Err(attrs.invalid("name", "must not be empty"));
            }
            TaskKind::Bridge(BridgeTask::new(name))
        }
        TaskType::Http => TaskKind::Http(decode_http(&attrs)?),
        TaskType::JsonParse => {
            let path = JsonPath::from(attrs.required("path")?);
            TaskKind::JsonParse(JsonParseTask::new(path))
        }
        TaskType::Multiply => {
            let times = match attrs.optional("times") {
                Some(times) => parse_decimal(times).map_err(|e| attrs.invalid("times", e.to_string()))?,
                None => BigDecimal::from(1),
            };
            TaskKind::Multiply(MultiplyTask::new(times))
        }
        TaskType::Median => TaskKind::Median(MedianTask),
    };

    Ok(Task::new(node.id, node.name.clone(), consumer, kind))
}

fn decode_http(attrs: &Attributes<'_>) -> Result<HttpTask, EngineError> {
    let url = attrs.required("url")?;
    let parsed = Url::parse(url).map_err(|e| attrs.invalid("url", e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(attrs.invalid("url", format!("unsupported scheme '{}'", parsed.scheme())));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(attrs.invalid("url", "missing host"));
    }

    let method = match attrs.optional("method") {
        Some(method) => method.parse::<HttpMethod>().map_err(|e| attrs.invalid("method", e))?,
        None => HttpMethod::default(),
    };

    let request_data = match attrs.optional("requestData") {
        Some(raw) => Some(
            serde_json::from_str::<HttpRequestData>(raw)
                .map_err(|e| attrs.invalid("requestData", e.to_string()))?,
        ),
        None => None,
    };

    Ok(HttpTask {
        url: url.to_owned(),
        method,
        request_data,
    })
}

struct Attributes<'a>(&'a GraphNode);

impl<'a> Attributes<'a> {
    fn required(&self, key: &'static str) -> Result<&'a str, EngineError> {
        self.0.attribute(key).ok_or_else(|| EngineError::MissingAttribute {
            node: self.0.name.clone(),
            attribute: key,
        })
    }

    fn optional(&self, key: &'static str) -> Option<&'a str> {
        self.0.attribute(key)
    }

    fn invalid(&self, key: &'static str, reason: impl Into<String>) -> EngineError {
        EngineError::InvalidAttribute {
            node: self.0.name.clone(),
            attribute: key,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeId;
    use std::collections::BTreeMap;

    fn node(pairs: &[(&str, &str)]) -> GraphNode {
        GraphNode {
            id: NodeId(3),
            name: "n".into(),
            attributes: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<BTreeMap<_, _>>(),
        }
    }

    fn decode(pairs: &[(&str, &str)]) -> Result<TaskKind, EngineError> {
        decode_task(&node(pairs), None).map(|t| t.kind().clone())
    }

    #[test]
    fn task_types_parse_case_insensitively() {
        assert_eq!("JSONParse".parse::<TaskType>(), Ok(TaskType::JsonParse));
        assert_eq!("median".parse::<TaskType>(), Ok(TaskType::Median));
        assert!("teleport".parse::<TaskType>().is_err());
        assert_eq!(TaskType::JsonParse.to_string(), "jsonparse");
    }

    #[test]
    fn decodes_bridge() {
        assert_eq!(
            decode(&[("type", "bridge"), ("name", "voter_turnout")]),
            Ok(TaskKind::Bridge(BridgeTask::new("voter_turnout")))
        );
        assert!(matches!(
            decode(&[("type", "bridge")]),
            Err(EngineError::MissingAttribute { attribute: "name", .. })
        ));
        assert!(matches!(
            decode(&[("type", "bridge"), ("name", "")]),
            Err(EngineError::InvalidAttribute { attribute: "name", .. })
        ));
    }

    #[test]
    fn decodes_http() {
        let kind = decode(&[
            ("type", "http"),
            ("url", "https://chain.link/voter_turnout/USA-2020"),
            ("method", "post"),
            ("requestData", r#"{"hi": "hello"}"#),
        ])
        .unwrap();

        let TaskKind::Http(http) = kind else { panic!("expected an http task") };
        assert_eq!(http.url, "https://chain.link/voter_turnout/USA-2020");
        assert_eq!(http.method, HttpMethod::Post);
        assert_eq!(http.request_data.unwrap()["hi"], "hello");
    }

    #[test]
    fn http_defaults_to_get_without_body() {
        let kind = decode(&[("type", "http"), ("url", "http://localhost:8080/price")]).unwrap();
        assert_eq!(kind, TaskKind::Http(HttpTask::get("http://localhost:8080/price")));
    }

    #[test]
    fn http_rejects_bad_attributes() {
        let cases: [(&[(&str, &str)], &str); 7] = [
            (&[("type", "http"), ("url", "ftp://x")], "url"),
            (&[("type", "http"), ("url", "https://")], "url"),
            (&[("type", "http"), ("url", "https://:::")], "url"),
            (&[("type", "http"), ("url", "http:// x")], "url"),
            (&[("type", "http"), ("url", "/relative/path")], "url"),
            (&[("type", "http"), ("url", "https://x"), ("method", "TRACE")], "method"),
            (&[("type", "http"), ("url", "https://x"), ("requestData", "[1]")], "requestData"),
        ];
        for (pairs, want) in cases {
            match decode(pairs) {
                Err(EngineError::InvalidAttribute { attribute, .. }) => assert_eq!(attribute, want),
                other => panic!("{pairs:?}: expected invalid {want}, got {other:?}"),
            }
        }
        assert!(matches!(
            decode(&[("type", "http")]),
            Err(EngineError::MissingAttribute { attribute: "url", .. })
        ));
    }

    #[test]
    fn decodes_jsonparse() {
        let kind = decode(&[("type", "jsonparse"), ("path", "data,-1")]).unwrap();
        assert_eq!(kind, TaskKind::JsonParse(JsonParseTask::new(["data", "-1"].into_iter().collect())));
        assert!(matches!(
            decode(&[("type", "jsonparse")]),
            Err(EngineError::MissingAttribute { attribute: "path", .. })
        ));
    }

    #[test]
    fn decodes_multiply() {
        let kind = decode(&[("type", "multiply"), ("times", "100")]).unwrap();
        assert_eq!(kind, TaskKind::Multiply(MultiplyTask::new(BigDecimal::from(100))));

        let kind = decode(&[("type", "multiply")]).unwrap();
        assert_eq!(kind, TaskKind::Multiply(MultiplyTask::default()));

        for times in ["lots", " 100", "1e-9223372036854775807"] {
            assert!(
                matches!(
                    decode(&[("type", "multiply"), ("times", times)]),
                    Err(EngineError::InvalidAttribute { attribute: "times", .. })
                ),
                "times={times:?}"
            );
        }
    }

    #[test]
    fn decodes_median() {
        assert_eq!(decode(&[("type", "median")]), Ok(TaskKind::Median(MedianTask)));
    }

    #[test]
    fn type_is_required_and_must_be_known() {
        assert!(matches!(decode(&[]), Err(EngineError::MissingAttribute { attribute: "type", .. })));
        assert!(matches!(
            decode(&[("type", "teleport")]),
            Err(EngineError::UnknownTaskType { task_type, .. }) if task_type == "teleport"
        ));
    }

    #[test]
    fn consumer_and_identity_are_carried_over() {
        let sink = Arc::new(decode_task(&node(&[("type", "median")]), None).unwrap());
        let task = decode_task(&node(&[("type", "multiply")]), Some(Arc::clone(&sink))).unwrap();

        assert_eq!(task.id(), NodeId(3));
        assert_eq!(task.name(), "n");
        assert!(Arc::ptr_eq(task.consumer().unwrap(), &sink));
    }
}
