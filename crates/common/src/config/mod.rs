//! Configuration management for Knowledge Well services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Graph store configuration
    #[serde(default)]
    pub graph: GraphConfig,

    /// Context engine defaults
    #[serde(default)]
    pub context: ContextConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// How the GraphDB client authenticates
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum GraphAuthMode {
    /// HTTP basic credentials on every request
    #[default]
    #[serde(alias = "basic")]
    Basic,
    /// GraphDB token obtained from /rest/login/{user}
    #[serde(alias = "gdb")]
    Gdb,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphConfig {
    /// Client implementation: graphdb, mock
    #[serde(default = "default_graph_provider")]
    pub provider: String,

    /// GraphDB base URL
    #[serde(default = "default_graph_base_url")]
    pub base_url: String,

    /// Repository id
    #[serde(default = "default_graph_repository")]
    pub repository: String,

    #[serde(default)]
    pub auth_mode: GraphAuthMode,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Verify TLS certificates
    #[serde(default = "default_enabled")]
    pub verify_tls: bool,

    /// Per-request timeout in seconds
    #[serde(default = "default_graph_timeout")]
    pub timeout_secs: u64,

    /// Lifetime of a GDB login token in seconds
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContextConfig {
    /// Probe candidate terms against the graph before querying
    #[serde(default = "default_enabled")]
    pub probe: bool,

    /// Maximum number of terms queried per question
    #[serde(default = "default_max_terms")]
    pub max_terms: usize,

    #[serde(default = "default_enabled")]
    pub include_summaries: bool,

    #[serde(default = "default_enabled")]
    pub include_content_parts: bool,

    #[serde(default = "default_enabled")]
    pub include_goal_achieved: bool,

    /// Terms whose queries may be in flight at the same time
    #[serde(default = "default_max_concurrent_terms")]
    pub max_concurrent_terms: usize,

    /// Overall deadline for one context build (unset = none)
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_enabled")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }
fn default_request_timeout() -> u64 { 120 }
fn default_graph_provider() -> String { "graphdb".to_string() }
fn default_graph_base_url() -> String { "http://localhost:7200".to_string() }
fn default_graph_repository() -> String { "repo".to_string() }
fn default_graph_timeout() -> u64 { 30 }
fn default_token_ttl() -> u64 { 36_000 }
fn default_max_terms() -> usize { 4 }
fn default_max_concurrent_terms() -> usize { 4 }
fn default_log_level() -> String { "info".to_string() }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "knowledge-well".to_string() }
fn default_enabled() -> bool { true }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            provider: default_graph_provider(),
            base_url: default_graph_base_url(),
            repository: default_graph_repository(),
            auth_mode: GraphAuthMode::default(),
            username: String::new(),
            password: String::new(),
            verify_tls: true,
            timeout_secs: default_graph_timeout(),
            token_ttl_secs: default_token_ttl(),
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            probe: true,
            max_terms: default_max_terms(),
            include_summaries: true,
            include_content_parts: true,
            include_goal_achieved: true,
            max_concurrent_terms: default_max_concurrent_terms(),
            deadline_secs: None,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: true,
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            graph: GraphConfig::default(),
            context: ContextConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl GraphConfig {
    /// Per-request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Token lifetime as Duration
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}

impl ContextConfig {
    /// Overall build deadline as Duration, if configured
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g. APP__GRAPH__BASE_URL=http://graphdb:7200
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}
