//! Graph context engine - the single entry point of context building
//!
//! Selects terms (extraction, optional probing), collects template runs and
//! renders them. Every graph failure degrades; a build always returns.

use super::aggregator::{render_context, ContextAggregator, ContextOptions, DebugRecord};
use super::executor::QueryExecutor;
use super::probe::probe_candidates;
use super::terms::{merge_terms, TermExtractor};
use crate::config::ContextConfig;
use crate::graph::GraphQueryClient;
use crate::metrics;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

/// Rendered context plus its diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct GraphContext {
    pub text: String,
    pub debug: DebugRecord,
}

impl GraphContext {
    /// No term could be extracted from the question
    pub fn has_terms(&self) -> bool {
        !self.debug.terms.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[derive(Clone)]
pub struct GraphContextEngine {
    extractor: Arc<TermExtractor>,
    aggregator: ContextAggregator,
    defaults: ContextOptions,
}

impl GraphContextEngine {
    pub fn new(client: Arc<dyn GraphQueryClient>, config: &ContextConfig) -> Self {
        Self::with_executor(QueryExecutor::new(client), config)
    }

    pub fn with_executor(executor: QueryExecutor, config: &ContextConfig) -> Self {
        Self {
            extractor: Arc::new(TermExtractor::default()),
            aggregator: ContextAggregator::new(executor, config.max_concurrent_terms),
            defaults: ContextOptions::from(config),
        }
    }

    /// Options from configuration, the base for per-request overrides
    pub fn defaults(&self) -> &ContextOptions {
        &self.defaults
    }

    pub fn executor(&self) -> &QueryExecutor {
        self.aggregator.executor()
    }

    /// Terms to query for a question.
    ///
    /// Without probing: the first `max_terms` of the extracted and extra terms.
    /// With probing: twice as many candidates, filtered by the graph.
    pub async fn select_terms(
        &self,
        question: &str,
        extra_terms: &[String],
        options: &ContextOptions,
        deadline: Option<Instant>,
    ) -> Vec<String> {
        let max_terms = options.max_terms;
        if !options.probe {
            let mut terms = merge_terms(self.extractor.extract(question, max_terms), extra_terms);
            terms.truncate(max_terms);
            return terms;
        }

        let mut candidates = merge_terms(
            self.extractor.extract(question, max_terms.saturating_mul(2)),
            extra_terms,
        );
        candidates.truncate(max_terms.saturating_mul(2));

        let probe = probe_candidates(self.executor(), &candidates, max_terms);
        let Some(deadline) = deadline else {
            return probe.await;
        };
        match tokio::time::timeout_at(deadline, probe).await {
            Ok(terms) => terms,
            Err(_) => {
                warn!("Request deadline exceeded while probing, using unfiltered terms");
                candidates.truncate(max_terms);
                candidates
            }
        }
    }

    /// Build the graph context for a question
    pub async fn build_context(&self, question: &str, options: &ContextOptions) -> GraphContext {
        self.build_context_with_terms(question, &[], options).await
    }

    /// Build the graph context, also considering externally supplied terms
    pub async fn build_context_with_terms(
        &self,
        question: &str,
        extra_terms: &[String],
        options: &ContextOptions,
    ) -> GraphContext {
        let start = Instant::now();
        let deadline = options.deadline.map(|budget| start + budget);

        let terms = self.select_terms(question, extra_terms, options, deadline).await;
        if terms.is_empty() {
            metrics::record_context_build("no_terms");
            info!("No terms extracted from question");
            return GraphContext {
                text: String::new(),
                debug: DebugRecord::new(Vec::new(), options.probe),
            };
        }

        let runs = self.aggregator.collect(&terms, options, deadline).await;
        let (text, record) = render_context(&runs, options.probe);

        metrics::record_context_build(if text.is_empty() { "empty" } else { "context" });
        info!(
            terms = ?record.terms,
            total_rows = record.total_rows,
            probe = record.probe_used,
            context_chars = text.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Graph context built"
        );

        GraphContext { text, debug: record }
    }
}
