//! HTTP task: fetch a URL and return the raw response body.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::value::no_inputs;
use crate::{RunContext, RunError, RunTask, TaskResult, Value};

/// JSON object sent as the request body.
pub type HttpRequestData = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(format!("unsupported HTTP method '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpTask {
    pub url: String,
    pub method: HttpMethod,
    pub request_data: Option<HttpRequestData>,
}

impl HttpTask {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            request_data: None,
        }
    }
}

#[async_trait]
impl RunTask for HttpTask {
    async fn run(&self, ctx: &RunContext, inputs: &[TaskResult]) -> TaskResult {
        no_inputs("http", inputs)?;

        debug!(method = %self.method, url = %self.url, "fetching");
        let body = ctx.http.fetch(self).await.map_err(|message| RunError::Http {
            url: self.url.clone(),
            message,
        })?;

        Ok(Value::Bytes(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::StaticResponses;

    const URL: &str = "https://chain.link/voter_turnout/USA-2020";

    #[test]
    fn methods_parse_case_insensitively() {
        assert_eq!("get".parse::<HttpMethod>(), Ok(HttpMethod::Get));
        assert_eq!("Post".parse::<HttpMethod>(), Ok(HttpMethod::Post));
        assert!("TRACE".parse::<HttpMethod>().is_err());
    }

    #[tokio::test]
    async fn returns_raw_body() {
        let responses = StaticResponses::default().with_http(URL, r#"{"three":{"four":7}}"#);
        let ctx = responses.clone().into_context();

        let result = HttpTask::get(URL).run(&ctx, &[]).await;

        assert_eq!(result, Ok(Value::Bytes(br#"{"three":{"four":7}}"#.to_vec())));
        assert_eq!(responses.calls(), vec![format!("http:GET {URL}")]);
    }

    #[tokio::test]
    async fn fetch_failure_is_an_error_result() {
        let ctx = StaticResponses::default().into_context();

        let result = HttpTask::get(URL).run(&ctx, &[]).await;

        assert!(matches!(result, Err(RunError::Http { url, .. }) if url == URL));
    }
}
