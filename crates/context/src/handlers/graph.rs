//! Graph context and prompt handlers

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use validator::Validate;

use crate::AppState;
use kwell_common::{
    context::{build_prompt, ContextOptions, DebugRecord, GraphContext, VectorHits},
    errors::{AppError, Result},
    metrics::RequestMetrics,
};

/// Returned instead of a context when the question yields no terms
pub const NO_TERMS_MESSAGE: &str = "No graph search terms found in the question. \
     Try including key phrases such as \"hybrid bonding\" or \"advanced packaging\".";

/// Graph context request
#[derive(Debug, Deserialize, Validate)]
pub struct ContextRequest {
    #[validate(length(min = 1, max = 2000))]
    pub question: String,

    /// Extra candidate terms, e.g. from a query rewriter
    #[serde(default)]
    #[validate(length(max = 16))]
    pub extra_terms: Vec<String>,

    #[serde(default)]
    #[validate(nested)]
    pub options: ContextOverrides,
}

/// Per-request overrides of the configured context options
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ContextOverrides {
    pub probe: Option<bool>,

    #[validate(range(min = 1, max = 16))]
    pub max_terms: Option<usize>,

    pub include_summaries: Option<bool>,
    pub include_content_parts: Option<bool>,
    pub include_goal_achieved: Option<bool>,

    /// Overall budget for the build in milliseconds
    #[validate(range(min = 1))]
    pub deadline_ms: Option<u64>,
}

impl ContextOverrides {
    pub fn apply(&self, defaults: &ContextOptions) -> ContextOptions {
        ContextOptions {
            probe: self.probe.unwrap_or(defaults.probe),
            max_terms: self.max_terms.unwrap_or(defaults.max_terms),
            include_summaries: self.include_summaries.unwrap_or(defaults.include_summaries),
            include_content_parts: self.include_content_parts.unwrap_or(defaults.include_content_parts),
            include_goal_achieved: self.include_goal_achieved.unwrap_or(defaults.include_goal_achieved),
            deadline: self.deadline_ms.map(Duration::from_millis).or(defaults.deadline),
        }
    }
}

/// Graph context response
#[derive(Serialize)]
pub struct ContextResponse {
    pub context: String,
    pub terms_used: Vec<String>,
    pub debug: DebugRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub graph_ms: u64,
}

/// Prompt request
#[derive(Debug, Deserialize, Validate)]
pub struct PromptRequest {
    #[validate(length(min = 1, max = 2000))]
    pub question: String,

    #[serde(default)]
    #[validate(length(max = 16))]
    pub extra_terms: Vec<String>,

    #[serde(default)]
    pub vector_hits: VectorHits,

    #[serde(default)]
    #[validate(nested)]
    pub options: ContextOverrides,
}

/// Prompt response
#[derive(Serialize)]
pub struct PromptResponse {
    pub prompt: String,
    pub terms_used: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn validate_question(question: &str) -> Result<()> {
    if question.trim().is_empty() {
        return Err(AppError::Validation {
            message: "Question must not be blank".to_string(),
            field: Some("question".to_string()),
        });
    }
    Ok(())
}

fn validation_error(e: validator::ValidationErrors) -> AppError {
    AppError::Validation {
        message: e.to_string(),
        field: None,
    }
}

fn no_terms_message(graph: &GraphContext) -> Option<String> {
    (!graph.has_terms()).then(|| NO_TERMS_MESSAGE.to_string())
}

/// Build the graph context for a question
pub async fn context(
    State(state): State<AppState>,
    Json(request): Json<ContextRequest>,
) -> Result<Json<ContextResponse>> {
    let request_metrics = RequestMetrics::start("POST", "/v1/graph/context");
    request.validate().map_err(validation_error)?;
    validate_question(&request.question)?;

    let options = request.options.apply(state.engine.defaults());
    let start = Instant::now();
    let graph = state
        .engine
        .build_context_with_terms(&request.question, &request.extra_terms, &options)
        .await;
    let graph_ms = start.elapsed().as_millis() as u64;

    let message = no_terms_message(&graph);
    let GraphContext { text, debug: record } = graph;
    let term_count = record.terms.len();
    let total_rows = record.total_rows;

    tracing::info!(
        terms = term_count,
        total_rows,
        graph_ms,
        "Graph context request completed"
    );
    request_metrics.finish(200);

    Ok(Json(ContextResponse {
        context: text,
        terms_used: record.terms.clone(),
        debug: record,
        message,
        graph_ms,
    }))
}

/// Build the answering prompt from vector hits and graph context
pub async fn prompt(
    State(state): State<AppState>,
    Json(request): Json<PromptRequest>,
) -> Result<Json<PromptResponse>> {
    let request_metrics = RequestMetrics::start("POST", "/v1/graph/prompt");
    request.validate().map_err(validation_error)?;
    validate_question(&request.question)?;

    let options = request.options.apply(state.engine.defaults());
    let graph = state
        .engine
        .build_context_with_terms(&request.question, &request.extra_terms, &options)
        .await;
    let prompt = build_prompt(&request.question, &request.vector_hits, &graph.text);
    let message = no_terms_message(&graph);

    request_metrics.finish(200);

    Ok(Json(PromptResponse {
        prompt,
        terms_used: graph.debug.terms,
        message,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use kwell_common::graph::{MockGraphClient, MockReply, Solution};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn warpage_store() -> MockGraphClient {
        MockGraphClient::new().on(
            &["?sectionLabel ?text", "LCASE(\"warpage\")"],
            MockReply::rows(vec![Solution::new()
                .with("paper", "urn:p1")
                .with("paperLabel", "P1")
                .with("sectionLabel", "Results")
                .with("text", "Warpage problem at 250C")]),
        )
    }

    #[tokio::test]
    async fn test_context_endpoint() {
        let app = crate::test_router(warpage_store());
        let (status, body) = post(
            app,
            "/v1/graph/context",
            json!({"question": "warpage", "options": {"probe": false}}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["terms_used"], json!(["warpage"]));
        assert_eq!(
            body["context"],
            "Keyword: warpage\n- Paper: P1\n  Problems:\n    • Results: Warpage problem at 250C"
        );
        assert_eq!(body["debug"]["total_rows"], 1);
        assert!(body.get("message").is_none());
    }

    #[tokio::test]
    async fn test_no_terms_returns_guidance() {
        let app = crate::test_router(MockGraphClient::new());
        let (status, body) = post(app, "/v1/graph/context", json!({"question": "Can you list the problems?"})).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["context"], "");
        assert_eq!(body["terms_used"], json!([]));
        assert_eq!(body["message"], NO_TERMS_MESSAGE);
    }

    #[tokio::test]
    async fn test_blank_question_rejected() {
        for question in ["", "   "] {
            let app = crate::test_router(MockGraphClient::new());
            let (status, body) = post(app, "/v1/graph/context", json!({ "question": question })).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        }
    }

    #[tokio::test]
    async fn test_invalid_override_rejected() {
        let app = crate::test_router(MockGraphClient::new());
        let (status, _) = post(
            app,
            "/v1/graph/context",
            json!({"question": "warpage", "options": {"max_terms": 0}}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_prompt_endpoint() {
        let app = crate::test_router(warpage_store());
        let (status, body) = post(
            app,
            "/v1/graph/prompt",
            json!({
                "question": "warpage",
                "vector_hits": {"documents": ["Cu pad recess"], "metadatas": [{"source": "a.pdf"}]},
                "options": {"probe": false}
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let prompt = body["prompt"].as_str().unwrap();
        assert!(prompt.contains("Question: warpage"));
        assert!(prompt.contains("[Doc 1] a.pdf\nCu pad recess\n\n[GraphDB]\nKeyword: warpage"));
        assert_eq!(body["terms_used"], json!(["warpage"]));
    }

    #[tokio::test]
    async fn test_context_endpoint_multiple_terms() {
        let store = warpage_store().on(
            &["?sectionLabel ?text", "LCASE(\"cte\")"],
            MockReply::Delayed(
                std::time::Duration::from_millis(20),
                vec![Solution::new()
                    .with("paper", "urn:p2")
                    .with("paperLabel", "P2")
                    .with("text", "CTE mismatch problem")],
            ),
        );
        let app = crate::test_router(store);
        let (status, body) = post(
            app,
            "/v1/graph/context",
            json!({"question": "warpage and cte mismatch", "options": {"probe": false}}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["terms_used"], json!(["warpage", "cte", "mismatch"]));
        let context = body["context"].as_str().unwrap();
        assert!(context.find("Keyword: warpage").unwrap() < context.find("Keyword: cte").unwrap());
        assert!(context.contains("- Paper: P2\n  Problems:\n    • CTE mismatch problem"));
        assert!(!context.contains("Keyword: mismatch"));
        assert_eq!(body["debug"]["total_rows"], 2);
    }

    #[tokio::test]
    async fn test_prompt_endpoint_extra_terms_and_guidance() {
        let app = crate::test_router(warpage_store());
        let (status, body) = post(
            app,
            "/v1/graph/prompt",
            json!({
                "question": "Can you list the problems?",
                "extra_terms": ["Warpage"],
                "options": {"probe": false}
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["terms_used"], json!(["warpage"]));
        assert!(body["prompt"].as_str().unwrap().contains("[GraphDB]\nKeyword: warpage"));
        assert!(body.get("message").is_none());

        let app = crate::test_router(MockGraphClient::new());
        let (status, body) = post(app, "/v1/graph/prompt", json!({"question": "Can you list the problems?"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["terms_used"], json!([]));
        assert_eq!(body["message"], NO_TERMS_MESSAGE);
        assert!(body["prompt"].as_str().unwrap().contains("Context:\n(no context retrieved)"));
    }

    #[test]
    fn test_overrides_fall_back_to_defaults() {
        let defaults = ContextOptions::default();
        let overrides = ContextOverrides {
            max_terms: Some(2),
            deadline_ms: Some(1500),
            ..ContextOverrides::default()
        };
        let options = overrides.apply(&defaults);
        assert_eq!(options.max_terms, 2);
        assert_eq!(options.probe, defaults.probe);
        assert_eq!(options.deadline, Some(Duration::from_millis(1500)));
    }
}
