//! In-memory graph client for testing and offline runs

use super::{GraphQueryClient, RawResponse, Solution, SPARQL_RESULTS_JSON};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Mutex;
use std::time::Duration;

/// What the mock does when a rule matches
#[derive(Debug, Clone)]
pub enum MockReply {
    Rows(Vec<Solution>),
    Fail(String),
    Delayed(Duration, Vec<Solution>),
}

impl MockReply {
    pub fn rows(rows: Vec<Solution>) -> Self {
        MockReply::Rows(rows)
    }

    pub fn fail(message: &str) -> Self {
        MockReply::Fail(message.to_string())
    }
}

struct Rule {
    needles: Vec<String>,
    reply: MockReply,
}

/// Answers a query with the first rule whose needles all occur in the
/// query text; unmatched queries return no rows.
pub struct MockGraphClient {
    rules: Vec<Rule>,
    fallback: MockReply,
    timeout: Duration,
    issued: Mutex<Vec<String>>,
}

impl MockGraphClient {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            fallback: MockReply::Rows(Vec::new()),
            timeout: Duration::from_secs(30),
            issued: Mutex::new(Vec::new()),
        }
    }

    /// Add a rule matched when every needle is a substring of the query
    pub fn on(mut self, needles: &[&str], reply: MockReply) -> Self {
        self.rules.push(Rule {
            needles: needles.iter().map(|n| n.to_string()).collect(),
            reply,
        });
        self
    }

    /// Reply used when no rule matches
    pub fn otherwise(mut self, reply: MockReply) -> Self {
        self.fallback = reply;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Every query received so far, in arrival order
    pub fn issued(&self) -> Vec<String> {
        self.issued.lock().map(|q| q.clone()).unwrap_or_default()
    }

    fn reply_for(&self, query: &str) -> MockReply {
        if let Ok(mut issued) = self.issued.lock() {
            issued.push(query.to_string());
        }
        self.rules
            .iter()
            .find(|rule| rule.needles.iter().all(|n| query.contains(n.as_str())))
            .map(|rule| rule.reply.clone())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl Default for MockGraphClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphQueryClient for MockGraphClient {
    async fn execute_select(&self, query: &str) -> Result<Vec<Solution>> {
        match self.reply_for(query) {
            MockReply::Rows(rows) => Ok(rows),
            MockReply::Fail(message) => Err(AppError::GraphQuery { message }),
            MockReply::Delayed(delay, rows) => {
                tokio::time::sleep(delay).await;
                Ok(rows)
            }
        }
    }

    async fn execute_raw(&self, query: &str, accept: &str) -> Result<RawResponse> {
        let rows = self.execute_select(query).await?;
        let bindings: Vec<serde_json::Value> = rows
            .iter()
            .map(|row| {
                row.bindings()
                    .map(|(var, value)| (var.to_string(), json!({ "type": "literal", "value": value })))
                    .collect::<serde_json::Map<_, _>>()
                    .into()
            })
            .collect();
        let body = json!({
            "head": { "vars": [] },
            "results": { "bindings": bindings }
        });
        Ok(RawResponse {
            status: 200,
            content_type: Some(if accept.is_empty() { SPARQL_RESULTS_JSON } else { accept }.to_string()),
            body: body.to_string(),
        })
    }

    async fn execute_update(&self, update: &str) -> Result<()> {
        self.execute_select(update).await.map(|_| ())
    }

    fn request_timeout(&self) -> Duration {
        self.timeout
    }

    fn name(&self) -> &str {
        "mock"
    }
}
