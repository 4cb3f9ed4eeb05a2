//! `StaticResponses` — an in-memory stand-in for the bridge and HTTP
//! collaborators.
//!
//! Serves canned bodies keyed by bridge name or URL and records every lookup,
//! so tests (and offline CLI runs) can drive a whole pipeline without a
//! network.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Deserialize;

use crate::http::HttpTask;
use crate::traits::{BridgeResolver, HttpClient, RunContext};

#[derive(Debug, Clone, Default)]
pub struct StaticResponses {
    bridges: HashMap<String, Vec<u8>>,
    http: HashMap<String, Vec<u8>>,
    /// Every lookup seen, as `bridge:<name>` or `http:<METHOD> <url>`.
    calls: Arc<Mutex<Vec<String>>>,
}

/// On-disk shape: `{"bridges": {name: body}, "http": {url: body}}`. String
/// bodies are served verbatim, anything else as its JSON encoding.
#[derive(Deserialize)]
struct Fixture {
    #[serde(default)]
    bridges: HashMap<String, serde_json::Value>,
    #[serde(default)]
    http: HashMap<String, serde_json::Value>,
}

fn body_bytes(body: serde_json::Value) -> Vec<u8> {
    match body {
        serde_json::Value::String(s) => s.into_bytes(),
        other => other.to_string().into_bytes(),
    }
}

impl StaticResponses {
    /// Load canned responses from their JSON fixture form.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let fixture: Fixture = serde_json::from_str(text)?;
        let into_map = |m: HashMap<String, serde_json::Value>| -> HashMap<String, Vec<u8>> {
            m.into_iter().map(|(k, v)| (k, body_bytes(v))).collect()
        };

        Ok(Self {
            bridges: into_map(fixture.bridges),
            http: into_map(fixture.http),
            calls: Arc::default(),
        })
    }

    pub fn with_bridge(mut self, name: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.bridges.insert(name.into(), body.into());
        self
    }

    pub fn with_http(mut self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.http.insert(url.into(), body.into());
        self
    }

    /// All lookups performed so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Wrap these responses into a run context serving both collaborators.
    pub fn into_context(self) -> RunContext {
        let shared = Arc::new(self);
        RunContext::new(shared.clone(), shared)
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl BridgeResolver for StaticResponses {
    async fn resolve(&self, name: &str) -> Result<Vec<u8>, String> {
        self.record(format!("bridge:{name}"));
        self.bridges
            .get(name)
            .cloned()
            .ok_or_else(|| format!("no bridge named '{name}'"))
    }
}

#[async_trait]
impl HttpClient for StaticResponses {
    async fn fetch(&self, request: &HttpTask) -> Result<Vec<u8>, String> {
        self.record(format!("http:{} {}", request.method, request.url));
        self.http
            .get(&request.url)
            .cloned()
            .ok_or_else(|| format!("no response registered for {}", request.url))
    }
}
