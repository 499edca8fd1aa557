//! Graph store access
//!
//! The context engine only needs "run a SELECT, get named bindings back".
//! [`GraphQueryClient`] is that seam; [`GraphDbClient`] speaks the GraphDB
//! SPARQL protocol over HTTP and [`MockGraphClient`] answers from memory.

mod client;
mod mock;

pub use client::GraphDbClient;
pub use mock::{MockGraphClient, MockReply};

use crate::config::GraphConfig;
use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Accept header for SPARQL JSON results
pub const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";

/// Content type of a SPARQL UPDATE body
pub const SPARQL_UPDATE: &str = "application/sparql-update";

/// One result row: variable name to string value.
///
/// Variables left unbound by the store are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution(HashMap<String, String>);

impl Solution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for tests and the mock client
    pub fn with(mut self, var: &str, value: impl Into<String>) -> Self {
        self.0.insert(var.to_string(), value.into());
        self
    }

    /// Bound value, if any
    pub fn get(&self, var: &str) -> Option<&str> {
        self.0.get(var).map(String::as_str)
    }

    /// Bound value or the empty string
    pub fn value(&self, var: &str) -> &str {
        self.get(var).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Bound variables and their values, in no particular order
    pub fn bindings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(var, value)| (var.as_str(), value.as_str()))
    }
}

impl FromIterator<(String, String)> for Solution {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Undecoded response for format-negotiated calls
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Query execution interface of a graph store
#[async_trait]
pub trait GraphQueryClient: Send + Sync {
    /// Run a SELECT query and return its solutions in store order
    async fn execute_select(&self, query: &str) -> Result<Vec<Solution>>;

    /// Run a query with a caller-chosen Accept header, body left undecoded
    async fn execute_raw(&self, query: &str, accept: &str) -> Result<RawResponse>;

    /// Run a SPARQL UPDATE against the repository's statements endpoint
    async fn execute_update(&self, update: &str) -> Result<()>;

    /// Timeout applied to one request; callers derive their own timeouts from it
    fn request_timeout(&self) -> Duration;

    /// Client name for logs
    fn name(&self) -> &str;
}

/// Create a graph client based on configuration
pub fn create_graph_client(config: &GraphConfig) -> Result<Arc<dyn GraphQueryClient>> {
    match config.provider.as_str() {
        "graphdb" => Ok(Arc::new(GraphDbClient::new(config)?)),
        "mock" => Ok(Arc::new(MockGraphClient::new())),
        other => {
            tracing::warn!(provider = other, "Unknown graph provider, using graphdb");
            Ok(Arc::new(GraphDbClient::new(config)?))
        }
    }
}
