//! Knowledge Well Common Library
//!
//! Shared code for the Knowledge Well services including:
//! - Graph store client abstraction
//! - Graph context engine
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod context;
pub mod errors;
pub mod graph;
pub mod metrics;

// Re-export commonly used types
pub use config::AppConfig;
pub use context::{GraphContext, GraphContextEngine};
pub use errors::{AppError, Result};
pub use graph::GraphQueryClient;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
