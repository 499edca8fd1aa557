//! Query Executor - runs templates against the graph store
//!
//! Content templates never fail outward: a store error, a malformed
//! response or a timeout becomes an empty [`TemplateRun`] whose query text
//! is replaced by an `# ERROR:` marker.

use super::templates::{probe_query, TemplateKind, TemplateSet};
use crate::errors::{AppError, Result};
use crate::graph::{GraphQueryClient, RawResponse, Solution};
use crate::metrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// One flat result row of a content template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub kind: TemplateKind,
    /// Paper IRI
    pub paper: String,
    /// Paper title, possibly empty
    pub paper_label: String,
    /// Kind-specific label (section / abstract / content part / goal)
    pub label: String,
    pub text: String,
}

impl Row {
    pub fn from_solution(kind: TemplateKind, solution: &Solution) -> Self {
        Self {
            kind,
            paper: solution.value("paper").to_string(),
            paper_label: solution.value("paperLabel").to_string(),
            label: solution.value(kind.label_var()).to_string(),
            text: solution.value("text").to_string(),
        }
    }

    /// Grouping key: the paper title, else the paper IRI, else none
    pub fn document_key(&self) -> Option<&str> {
        [self.paper_label.as_str(), self.paper.as_str()]
            .into_iter()
            .find(|key| !key.is_empty())
    }
}

/// Outcome of one template for one term
#[derive(Debug, Clone)]
pub struct TemplateRun {
    pub kind: TemplateKind,
    pub rows: Vec<Row>,
    /// Literal query issued, an error marker, or empty when the kind is disabled
    pub query: String,
    pub error: Option<String>,
}

impl TemplateRun {
    /// Placeholder for a kind switched off by options
    pub fn disabled(kind: TemplateKind) -> Self {
        Self {
            kind,
            rows: Vec::new(),
            query: String::new(),
            error: None,
        }
    }

    /// Empty run tagged with an error marker
    pub fn failed(kind: TemplateKind, category: &str, message: &str) -> Self {
        Self {
            kind,
            rows: Vec::new(),
            query: error_marker(category, message),
            error: Some(message.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

const PING_QUERY: &str = "SELECT ?s WHERE { ?s ?p ?o } LIMIT 1";

/// `# ERROR: <category>: <message>`
pub fn error_marker(category: &str, message: &str) -> String {
    format!("# ERROR: {}: {}", category, message)
}

/// Issues templated queries through a [`GraphQueryClient`]
#[derive(Clone)]
pub struct QueryExecutor {
    client: Arc<dyn GraphQueryClient>,
    templates: Arc<TemplateSet>,
}

impl QueryExecutor {
    pub fn new(client: Arc<dyn GraphQueryClient>) -> Self {
        Self::with_templates(client, TemplateSet::default())
    }

    pub fn with_templates(client: Arc<dyn GraphQueryClient>, templates: TemplateSet) -> Self {
        Self {
            client,
            templates: Arc::new(templates),
        }
    }

    pub fn client(&self) -> &Arc<dyn GraphQueryClient> {
        &self.client
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    /// SELECT bounded by the client's request timeout
    async fn select(&self, operation: &str, query: &str) -> Result<Vec<Solution>> {
        let timeout = self.client.request_timeout();
        tokio::time::timeout(timeout, self.client.execute_select(query))
            .await
            .map_err(|_| AppError::Timeout {
                operation: operation.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })?
    }

    /// Run one template, propagating failures
    pub async fn try_run(&self, kind: TemplateKind, term: &str) -> Result<(Vec<Row>, String)> {
        let query = self.templates.render(kind, term);
        let solutions = self.select(&format!("{} query", kind), &query).await?;
        let rows = solutions
            .iter()
            .map(|solution| Row::from_solution(kind, solution))
            .collect();
        Ok((rows, query))
    }

    /// Run one template; failures degrade to an empty, error-tagged run
    pub async fn run(&self, kind: TemplateKind, term: &str) -> TemplateRun {
        let start = Instant::now();
        let result = self.try_run(kind, term).await;
        let elapsed = start.elapsed();

        match result {
            Ok((rows, query)) => {
                metrics::record_graph_query(kind.as_str(), elapsed.as_secs_f64(), rows.len(), true);
                debug!(
                    kind = %kind,
                    term = %term,
                    rows = rows.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Template query complete"
                );
                TemplateRun {
                    kind,
                    rows,
                    query,
                    error: None,
                }
            }
            Err(e) => {
                metrics::record_graph_query(kind.as_str(), elapsed.as_secs_f64(), 0, false);
                warn!(kind = %kind, term = %term, error = %e, "Template query failed, continuing without it");
                TemplateRun::failed(kind, e.category(), &e.to_string())
            }
        }
    }

    /// Pass-through for format-negotiated calls
    pub async fn run_raw(&self, query: &str, accept: &str) -> Result<RawResponse> {
        let timeout = self.client.request_timeout();
        tokio::time::timeout(timeout, self.client.execute_raw(query, accept))
            .await
            .map_err(|_| AppError::Timeout {
                operation: "raw query".to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })?
    }

    /// Does any paper title/label contain the term
    pub async fn check_term(&self, term: &str) -> Result<bool> {
        let solutions = self.select("term probe", &probe_query(term)).await?;
        Ok(!solutions.is_empty())
    }

    /// One-row query to check the store is reachable
    pub async fn ping(&self) -> Result<()> {
        self.select("readiness ping", PING_QUERY).await.map(|_| ())
    }
}
