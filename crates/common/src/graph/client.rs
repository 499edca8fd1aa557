//! GraphDB SPARQL client with BASIC or GDB token auth
//!
//! GDB login: POST {base}/rest/login/{username} with header X-GraphDB-Password;
//! the token comes back in the response `Authorization` header.

use super::{GraphQueryClient, RawResponse, Solution, SPARQL_RESULTS_JSON, SPARQL_UPDATE};
use crate::config::{GraphAuthMode, GraphConfig};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Tokens are refreshed this long before they expire
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_after: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() < self.refresh_after
    }
}

#[derive(Deserialize)]
struct SparqlResults {
    #[serde(default)]
    results: SparqlResultsBody,
}

#[derive(Deserialize, Default)]
struct SparqlResultsBody {
    #[serde(default)]
    bindings: Vec<HashMap<String, SparqlTerm>>,
}

#[derive(Deserialize)]
struct SparqlTerm {
    #[serde(default)]
    value: String,
}

/// HTTP client for one GraphDB repository
pub struct GraphDbClient {
    client: reqwest::Client,
    base_url: String,
    repository: String,
    auth_mode: GraphAuthMode,
    username: String,
    password: String,
    timeout: Duration,
    token_ttl: Duration,
    token: RwLock<Option<CachedToken>>,
}

impl GraphDbClient {
    /// Create a new client from configuration
    pub fn new(config: &GraphConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            // the login token is read from the first response, never a redirect target
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            repository: config.repository.clone(),
            auth_mode: config.auth_mode,
            username: config.username.clone(),
            password: config.password.clone(),
            timeout: config.timeout(),
            token_ttl: config.token_ttl(),
            token: RwLock::new(None),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/repositories/{}", self.base_url, self.repository)
    }

    fn has_credentials(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    /// Log in ahead of the first query when using GDB auth
    pub async fn login_if_needed(&self) -> Result<()> {
        if self.auth_mode == GraphAuthMode::Gdb {
            self.gdb_token().await?;
        }
        Ok(())
    }

    /// Cached GDB token, logging in when missing or about to expire
    async fn gdb_token(&self) -> Result<String> {
        if let Some(token) = self.token.read().await.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        let mut slot = self.token.write().await;
        // another caller may have refreshed while we waited for the lock
        if let Some(token) = slot.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        if !self.has_credentials() {
            return Err(AppError::GraphAuth {
                message: "username/password not set for GDB auth".to_string(),
            });
        }

        let url = format!("{}/rest/login/{}", self.base_url, self.username);
        let issued = Instant::now();
        let response = self
            .client
            .post(&url)
            .header("X-GraphDB-Password", &self.password)
            .send()
            .await
            .map_err(|e| self.transport_error("GraphDB login", e))?;

        if !response.status().is_success() {
            return Err(AppError::GraphAuth {
                message: format!("login returned {}", response.status()),
            });
        }

        let value = response
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AppError::GraphAuth {
                message: "login succeeded but no Authorization header returned".to_string(),
            })?;

        let lifetime = self.token_ttl.saturating_sub(TOKEN_REFRESH_MARGIN);
        *slot = Some(CachedToken {
            value: value.clone(),
            refresh_after: issued + lifetime,
        });
        info!(user = %self.username, ttl_secs = self.token_ttl.as_secs(), "GraphDB token refreshed");

        Ok(value)
    }

    async fn authorize(&self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        match self.auth_mode {
            GraphAuthMode::Basic if self.has_credentials() => {
                Ok(request.basic_auth(&self.username, Some(&self.password)))
            }
            GraphAuthMode::Basic => Ok(request),
            GraphAuthMode::Gdb => {
                let token = self.gdb_token().await?;
                Ok(request.header(AUTHORIZATION, token))
            }
        }
    }

    async fn post_query(&self, query: &str, accept: &str) -> Result<reqwest::Response> {
        let request = self
            .client
            .post(self.endpoint())
            .header(ACCEPT, accept)
            .form(&[("query", query)]);

        self.authorize(request)
            .await?
            .send()
            .await
            .map_err(|e| self.transport_error("graph query", e))
    }

    fn statements_endpoint(&self) -> String {
        format!("{}/statements", self.endpoint())
    }

    fn transport_error(&self, operation: &str, err: reqwest::Error) -> AppError {
        if err.is_timeout() {
            AppError::Timeout {
                operation: operation.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            AppError::HttpClient(err)
        }
    }
}

#[async_trait]
impl GraphQueryClient for GraphDbClient {
    async fn execute_select(&self, query: &str) -> Result<Vec<Solution>> {
        let response = self.post_query(query, SPARQL_RESULTS_JSON).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::GraphQuery {
                message: format!("repository {} returned {}: {}", self.repository, status, body),
            });
        }

        let results: SparqlResults = response.json().await.map_err(|e| AppError::GraphQuery {
            message: format!("invalid SPARQL JSON results: {}", e),
        })?;

        let solutions: Vec<Solution> = results
            .results
            .bindings
            .into_iter()
            .map(|row| row.into_iter().map(|(var, term)| (var, term.value)).collect())
            .collect();

        debug!(repository = %self.repository, rows = solutions.len(), "SPARQL select complete");
        Ok(solutions)
    }

    async fn execute_raw(&self, query: &str, accept: &str) -> Result<RawResponse> {
        let response = self.post_query(query, accept).await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(|e| self.transport_error("graph query", e))?;

        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }

    async fn execute_update(&self, update: &str) -> Result<()> {
        let request = self
            .client
            .post(self.statements_endpoint())
            .header(CONTENT_TYPE, SPARQL_UPDATE)
            .header(ACCEPT, "*/*")
            .body(update.to_string());

        let response = self
            .authorize(request)
            .await?
            .send()
            .await
            .map_err(|e| self.transport_error("graph update", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::GraphQuery {
                message: format!("update on {} returned {}: {}", self.repository, status, body),
            });
        }

        debug!(repository = %self.repository, "SPARQL update complete");
        Ok(())
    }

    fn request_timeout(&self) -> Duration {
        self.timeout
    }

    fn name(&self) -> &str {
        "graphdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::assert_ok;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer, auth_mode: GraphAuthMode, user: &str, pass: &str) -> GraphConfig {
        GraphConfig {
            base_url: format!("{}/", server.uri()),
            repository: "papers".to_string(),
            auth_mode,
            username: user.to_string(),
            password: pass.to_string(),
            timeout_secs: 5,
            ..GraphConfig::default()
        }
    }

    fn two_rows() -> serde_json::Value {
        json!({
            "head": { "vars": ["paper", "paperLabel", "text"] },
            "results": { "bindings": [
                {
                    "paper": { "type": "uri", "value": "urn:p1" },
                    "paperLabel": { "type": "literal", "value": "Warpage in FOPLP" },
                    "text": { "type": "literal", "value": "Warpage is a key problem" }
                },
                {
                    "paper": { "type": "uri", "value": "urn:p2" },
                    "text": { "type": "literal", "value": "CTE mismatch" }
                }
            ]}
        })
    }

    #[tokio::test]
    async fn test_select_decodes_bindings() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repositories/papers"))
            .and(header("accept", SPARQL_RESULTS_JSON))
            .and(body_string_contains("query="))
            .respond_with(ResponseTemplate::new(200).set_body_json(two_rows()))
            .expect(1)
            .mount(&server)
            .await;

        let client = GraphDbClient::new(&config_for(&server, GraphAuthMode::Basic, "", "")).unwrap();
        let rows = client.execute_select("SELECT ?paper WHERE { ?paper ?p ?o }").await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value("paperLabel"), "Warpage in FOPLP");
        assert_eq!(rows[1].value("paperLabel"), "");
        assert_eq!(rows[1].value("text"), "CTE mismatch");
    }

    #[tokio::test]
    async fn test_basic_auth_header_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repositories/papers"))
            .and(header("authorization", "Basic dXNlcjpwYXNz"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": {"bindings": []}})))
            .expect(1)
            .mount(&server)
            .await;

        let client = GraphDbClient::new(&config_for(&server, GraphAuthMode::Basic, "user", "pass")).unwrap();
        let rows = client.execute_select("SELECT * WHERE {}").await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_gdb_login_once_and_reuse_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/login/admin"))
            .and(header("x-graphdb-password", "secret"))
            .respond_with(ResponseTemplate::new(200).insert_header("Authorization", "GDB token-abc"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/repositories/papers"))
            .and(header("authorization", "GDB token-abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(two_rows()))
            .expect(3)
            .mount(&server)
            .await;

        let client = GraphDbClient::new(&config_for(&server, GraphAuthMode::Gdb, "admin", "secret")).unwrap();
        let (a, b, c) = tokio::join!(
            client.execute_select("SELECT 1"),
            client.execute_select("SELECT 2"),
            client.execute_select("SELECT 3"),
        );
        assert_ok!(a);
        assert_ok!(b);
        assert_ok!(c);
    }

    #[tokio::test]
    async fn test_gdb_token_refreshed_after_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/login/admin"))
            .respond_with(ResponseTemplate::new(200).insert_header("Authorization", "GDB token-short"))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/repositories/papers"))
            .and(header("authorization", "GDB token-short"))
            .respond_with(ResponseTemplate::new(200).set_body_json(two_rows()))
            .expect(2)
            .mount(&server)
            .await;

        let config = GraphConfig {
            token_ttl_secs: 0,
            ..config_for(&server, GraphAuthMode::Gdb, "admin", "secret")
        };
        let client = GraphDbClient::new(&config).unwrap();
        assert_ok!(client.execute_select("SELECT 1").await);
        assert_ok!(client.execute_select("SELECT 2").await);
    }

    #[tokio::test]
    async fn test_update_posts_to_statements() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repositories/papers/statements"))
            .and(header("content-type", SPARQL_UPDATE))
            .and(header("authorization", "Basic dXNlcjpwYXNz"))
            .and(body_string_contains("INSERT DATA"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = GraphDbClient::new(&config_for(&server, GraphAuthMode::Basic, "user", "pass")).unwrap();
        assert_ok!(client.execute_update("INSERT DATA { <urn:p1> <urn:title> \"Voids\" }").await);
    }

    #[tokio::test]
    async fn test_update_error_status_is_graph_query_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repositories/papers/statements"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad update"))
            .mount(&server)
            .await;

        let client = GraphDbClient::new(&config_for(&server, GraphAuthMode::Basic, "", "")).unwrap();
        let err = client.execute_update("DELETE").await.unwrap_err();
        assert!(matches!(err, AppError::GraphQuery { ref message } if message.contains("bad update")));
    }

    #[tokio::test]
    async fn test_gdb_without_credentials_is_auth_error() {
        let server = MockServer::start().await;
        let client = GraphDbClient::new(&config_for(&server, GraphAuthMode::Gdb, "", "")).unwrap();

        let err = client.execute_select("SELECT 1").await.unwrap_err();
        assert!(matches!(err, AppError::GraphAuth { .. }));
    }

    #[tokio::test]
    async fn test_gdb_login_without_header_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/login/admin"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = GraphDbClient::new(&config_for(&server, GraphAuthMode::Gdb, "admin", "secret")).unwrap();
        let err = client.login_if_needed().await.unwrap_err();
        assert!(matches!(err, AppError::GraphAuth { .. }));
    }

    #[tokio::test]
    async fn test_store_error_status_is_graph_query_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repositories/papers"))
            .respond_with(ResponseTemplate::new(400).set_body_string("MALFORMED QUERY"))
            .mount(&server)
            .await;

        let client = GraphDbClient::new(&config_for(&server, GraphAuthMode::Basic, "", "")).unwrap();
        let err = client.execute_select("SELECT").await.unwrap_err();
        match err {
            AppError::GraphQuery { message } => {
                assert!(message.contains("400"));
                assert!(message.contains("MALFORMED QUERY"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_results_yield_no_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"head": {"vars": []}})))
            .mount(&server)
            .await;

        let client = GraphDbClient::new(&config_for(&server, GraphAuthMode::Basic, "", "")).unwrap();
        assert!(client.execute_select("SELECT 1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_raw_passes_accept_and_keeps_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repositories/papers"))
            .and(header("accept", "text/csv"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("paper\r\nurn:p1\r\n", "text/csv"))
            .mount(&server)
            .await;

        let client = GraphDbClient::new(&config_for(&server, GraphAuthMode::Basic, "", "")).unwrap();
        let raw = client.execute_raw("SELECT ?paper WHERE {}", "text/csv").await.unwrap();

        assert!(raw.is_success());
        assert_eq!(raw.content_type.as_deref(), Some("text/csv"));
        assert!(raw.body.contains("urn:p1"));
    }
}
