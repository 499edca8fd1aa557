//! Graph Context Engine Components
//!
//! Builds the knowledge-graph context for a question:
//! - Term extraction and graph probing
//! - Query templates per context kind
//! - Fail-soft query execution
//! - Aggregation and deterministic rendering
//! - Prompt assembly

mod aggregator;
mod engine;
mod executor;
mod probe;
mod prompt;
mod templates;
mod terms;

pub use aggregator::{
    group_by_document, normalize_text, render_context, ContextAggregator, ContextOptions, DebugRecord, TermRuns,
};
pub use engine::{GraphContext, GraphContextEngine};
pub use executor::{error_marker, QueryExecutor, Row, TemplateRun};
pub use probe::{probe_candidates, probe_filter};
pub use prompt::{build_prompt, render_context_block, VectorHits, MAX_PROMPT_DOCUMENTS};
pub use templates::{escape_literal, probe_query, Hops, QueryTemplate, TemplateKind, TemplateSet};
pub use terms::{extract_terms, merge_terms, normalize, TermExtractor, DEFAULT_MAX_TERMS};
