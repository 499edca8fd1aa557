//! Metrics and observability utilities
//!
//! Provides Prometheus metrics for graph queries, term probing and context
//! builds with standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Knowledge Well metrics
pub const METRICS_PREFIX: &str = "kwell";

/// Histogram buckets for graph store round trips (in seconds)
pub const GRAPH_QUERY_BUCKETS: &[f64] = &[
    0.010, // 10ms
    0.025, // 25ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s - default graph timeout
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    describe_counter!(
        format!("{}_graph_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Graph store template queries by kind and status"
    );

    describe_histogram!(
        format!("{}_graph_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Graph store template query latency in seconds"
    );

    describe_counter!(
        format!("{}_graph_rows_total", METRICS_PREFIX),
        Unit::Count,
        "Rows returned by graph store template queries"
    );

    describe_counter!(
        format!("{}_probe_total", METRICS_PREFIX),
        Unit::Count,
        "Term existence probes by result"
    );

    describe_counter!(
        format!("{}_context_builds_total", METRICS_PREFIX),
        Unit::Count,
        "Graph context builds by outcome"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record one template query against the graph store
pub fn record_graph_query(kind: &str, duration_secs: f64, rows: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_graph_queries_total", METRICS_PREFIX),
        "kind" => kind.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_graph_query_duration_seconds", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .record(duration_secs);

    if success {
        counter!(
            format!("{}_graph_rows_total", METRICS_PREFIX),
            "kind" => kind.to_string()
        )
        .increment(rows as u64);
    }
}

/// Record a term probe: "hit", "miss" or "error" (fail-open)
pub fn record_probe(result: &str) {
    counter!(
        format!("{}_probe_total", METRICS_PREFIX),
        "result" => result.to_string()
    )
    .increment(1);
}

/// Record a finished context build: "context", "empty" or "no_terms"
pub fn record_context_build(outcome: &str) {
    counter!(
        format!("{}_context_builds_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_buckets_sorted() {
        let mut prev = 0.0;
        for &bucket in GRAPH_QUERY_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
        assert!(GRAPH_QUERY_BUCKETS.contains(&30.00));
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: every call is a no-op
        let metrics = RequestMetrics::start("POST", "/v1/graph/context");
        metrics.finish(200);
        record_graph_query("problem", 0.02, 3, true);
        record_graph_query("goal_achieved", 0.5, 0, false);
        record_probe("error");
        record_context_build("no_terms");
    }
}
