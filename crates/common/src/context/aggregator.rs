//! Context Aggregator - runs the templates per term and renders the result
//!
//! Provides:
//! - Concurrent collection (terms buffered in order, kinds joined per term)
//! - Deadline cancellation that degrades like a template error
//! - Grouping of rows by source document
//! - Deterministic rendering with per-list deduplication
//! - A parallel debug record of queries and row counts

use super::executor::{QueryExecutor, Row, TemplateRun};
use super::templates::TemplateKind;
use crate::config::ContextConfig;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Rendered sublists per paper: kind, heading, row cap
const SECTIONS: [(TemplateKind, &str, usize); 4] = [
    (TemplateKind::AbstractPurpose, "Summary", 6),
    (TemplateKind::ContentPart, "Content", 6),
    (TemplateKind::GoalAchieved, "Solutions", 8),
    (TemplateKind::Problem, "Problems", 8),
];

/// Per-call options of a context build
#[derive(Debug, Clone, PartialEq)]
pub struct ContextOptions {
    /// Filter candidate terms through the graph probe first
    pub probe: bool,
    pub max_terms: usize,
    pub include_summaries: bool,
    pub include_content_parts: bool,
    pub include_goal_achieved: bool,
    /// Overall budget for the build; unfinished queries are cancelled
    pub deadline: Option<Duration>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self::from(&ContextConfig::default())
    }
}

impl From<&ContextConfig> for ContextOptions {
    fn from(config: &ContextConfig) -> Self {
        Self {
            probe: config.probe,
            max_terms: config.max_terms,
            include_summaries: config.include_summaries,
            include_content_parts: config.include_content_parts,
            include_goal_achieved: config.include_goal_achieved,
            deadline: config.deadline(),
        }
    }
}

impl ContextOptions {
    /// Whether a kind is queried at all; problems always are
    pub fn includes(&self, kind: TemplateKind) -> bool {
        match kind {
            TemplateKind::Problem => true,
            TemplateKind::AbstractPurpose => self.include_summaries,
            TemplateKind::ContentPart => self.include_content_parts,
            TemplateKind::GoalAchieved => self.include_goal_achieved,
        }
    }
}

/// Diagnostics parallel to the rendered context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugRecord {
    /// Terms actually queried, in order
    pub terms: Vec<String>,
    pub probe_used: bool,
    /// kind -> term -> literal query (or error marker, or "" when disabled)
    pub queries: BTreeMap<TemplateKind, BTreeMap<String, String>>,
    /// kind -> term -> row count
    pub row_counts: BTreeMap<TemplateKind, BTreeMap<String, usize>>,
    /// Problem rows across all terms
    pub total_rows: usize,
}

impl DebugRecord {
    pub fn new(terms: Vec<String>, probe_used: bool) -> Self {
        Self {
            terms,
            probe_used,
            ..Self::default()
        }
    }

    fn record(&mut self, term: &str, run: &TemplateRun) {
        self.queries
            .entry(run.kind)
            .or_default()
            .insert(term.to_string(), run.query.clone());
        self.row_counts
            .entry(run.kind)
            .or_default()
            .insert(term.to_string(), run.rows.len());
        if run.kind == TemplateKind::Problem {
            self.total_rows += run.rows.len();
        }
    }

    pub fn rows_for(&self, kind: TemplateKind, term: &str) -> Option<usize> {
        self.row_counts.get(&kind)?.get(term).copied()
    }

    pub fn query_for(&self, kind: TemplateKind, term: &str) -> Option<&str> {
        self.queries.get(&kind)?.get(term).map(String::as_str)
    }
}

/// All four template runs of one term
#[derive(Debug, Clone)]
pub struct TermRuns {
    pub term: String,
    pub problem: TemplateRun,
    pub summary: TemplateRun,
    pub content: TemplateRun,
    pub goal: TemplateRun,
}

impl TermRuns {
    pub fn run(&self, kind: TemplateKind) -> &TemplateRun {
        match kind {
            TemplateKind::Problem => &self.problem,
            TemplateKind::AbstractPurpose => &self.summary,
            TemplateKind::ContentPart => &self.content,
            TemplateKind::GoalAchieved => &self.goal,
        }
    }

    /// Problems and summaries are the primary signal. A term with neither is
    /// left out of the text even if it has content parts or goals.
    pub fn has_primary_rows(&self) -> bool {
        !self.problem.rows.is_empty() || !self.summary.rows.is_empty()
    }
}

/// Rows of one kind keyed by document, keys in lexicographic order.
/// Rows without a paper title or IRI are dropped.
pub fn group_by_document(rows: &[Row]) -> BTreeMap<&str, Vec<&Row>> {
    let mut groups: BTreeMap<&str, Vec<&Row>> = BTreeMap::new();
    for row in rows {
        if let Some(key) = row.document_key() {
            groups.entry(key).or_default().push(row);
        }
    }
    groups
}

/// Collapse whitespace runs and trim
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn render_list(lines: &mut Vec<String>, heading: &str, rows: &[&Row], cap: usize) {
    lines.push(format!("  {}:", heading));
    let mut seen = HashSet::new();
    for row in rows.iter().take(cap) {
        let text = normalize_text(&row.text);
        if text.is_empty() || !seen.insert(text.clone()) {
            continue;
        }
        if row.label.is_empty() {
            lines.push(format!("    • {}", text));
        } else {
            lines.push(format!("    • {}: {}", row.label, text));
        }
    }
}

fn render_term(lines: &mut Vec<String>, runs: &TermRuns) {
    let groups: Vec<(&str, usize, BTreeMap<&str, Vec<&Row>>)> = SECTIONS
        .iter()
        .map(|&(kind, heading, cap)| (heading, cap, group_by_document(&runs.run(kind).rows)))
        .collect();

    let papers: BTreeSet<&str> = groups
        .iter()
        .flat_map(|(_, _, group)| group.keys().copied())
        .collect();
    if papers.is_empty() {
        return;
    }

    lines.push(format!("Keyword: {}", runs.term));
    for paper in papers {
        lines.push(format!("- Paper: {}", paper));
        for (heading, cap, group) in &groups {
            if let Some(rows) = group.get(paper).filter(|rows| !rows.is_empty()) {
                render_list(lines, heading, rows, *cap);
            }
        }
    }
    lines.push(String::new());
}

/// Render collected runs into the context text and the debug record.
///
/// Output depends only on the runs and their order, never on the order in
/// which the underlying queries completed.
pub fn render_context(results: &[TermRuns], probe_used: bool) -> (String, DebugRecord) {
    let mut record = DebugRecord::new(results.iter().map(|r| r.term.clone()).collect(), probe_used);
    let mut lines = Vec::new();

    for runs in results {
        for kind in TemplateKind::ALL {
            record.record(&runs.term, runs.run(kind));
        }
        if runs.has_primary_rows() {
            render_term(&mut lines, runs);
        }
    }

    (lines.join("\n").trim().to_string(), record)
}

/// Collects template runs for a list of terms
#[derive(Clone)]
pub struct ContextAggregator {
    executor: QueryExecutor,
    max_concurrent_terms: usize,
}

impl ContextAggregator {
    pub fn new(executor: QueryExecutor, max_concurrent_terms: usize) -> Self {
        Self {
            executor,
            max_concurrent_terms: max_concurrent_terms.max(1),
        }
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    async fn run_kind(
        &self,
        kind: TemplateKind,
        term: &str,
        options: &ContextOptions,
        deadline: Option<Instant>,
    ) -> TemplateRun {
        if !options.includes(kind) {
            return TemplateRun::disabled(kind);
        }
        let Some(deadline) = deadline else {
            return self.executor.run(kind, term).await;
        };
        match tokio::time::timeout_at(deadline, self.executor.run(kind, term)).await {
            Ok(run) => run,
            Err(_) => {
                warn!(kind = %kind, term = %term, "Request deadline exceeded, query cancelled");
                TemplateRun::failed(kind, "Cancelled", "request deadline exceeded")
            }
        }
    }

    /// Run the enabled kinds of one term concurrently
    pub async fn collect_term(&self, term: &str, options: &ContextOptions, deadline: Option<Instant>) -> TermRuns {
        let (problem, summary, content, goal) = tokio::join!(
            self.run_kind(TemplateKind::Problem, term, options, deadline),
            self.run_kind(TemplateKind::AbstractPurpose, term, options, deadline),
            self.run_kind(TemplateKind::ContentPart, term, options, deadline),
            self.run_kind(TemplateKind::GoalAchieved, term, options, deadline),
        );
        TermRuns {
            term: term.to_string(),
            problem,
            summary,
            content,
            goal,
        }
    }

    /// Collect every term; results keep the order of `terms`
    pub async fn collect(&self, terms: &[String], options: &ContextOptions, deadline: Option<Instant>) -> Vec<TermRuns> {
        stream::iter(terms.iter().cloned())
            .map(|term| async move { self.collect_term(&term, options, deadline).await })
            .buffered(self.max_concurrent_terms)
            .collect()
            .await
    }
}
