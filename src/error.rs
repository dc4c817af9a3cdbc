//! Error types for toolhub
//!
//! Centralized error handling using thiserror. Tool execution failures are not
//! errors at this level; the dispatcher reports them as structured outcomes.

use std::sync::Arc;

use thiserror::Error;

/// All error types that can surface from the orchestration layer
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// No tool matched the request
    #[error("No matching tool for intent: {0}")]
    NoMatchingTool(String),

    /// Tool catalog could not be loaded or was invalid
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Oracle call failed
    #[error("Oracle error: {0}")]
    Oracle(String),

    /// A coalesced computation failed to settle normally
    #[error("Computation for {fingerprint} failed: {reason}")]
    Computation { fingerprint: String, reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for toolhub operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Error shared between every caller coalesced onto one computation
pub type SharedError = Arc<OrchestratorError>;
