//! External ranking and similarity oracles
//!
//! Oracles are best-effort collaborators, typically backed by a language model. They
//! return raw text, and everything they say is parsed defensively with a defined
//! fallback. Correctness never depends on an oracle answering.

mod parse;
mod scripted;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::tools::ToolSummary;

pub use parse::{parse_ranking, parse_similar};
pub use scripted::ScriptedOracle;

/// Errors an oracle call can end in
#[derive(Debug, Clone, thiserror::Error)]
pub enum OracleError {
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),

    #[error("Oracle timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Reorders candidate tools for an intent
#[async_trait]
pub trait RankingOracle: Send + Sync {
    /// Raw reply expected to name candidate ids or names, best first
    async fn rank(&self, intent: &str, candidates: &[ToolSummary]) -> Result<String, OracleError>;
}

/// Matches a new intent against intents seen before
#[async_trait]
pub trait SimilarityOracle: Send + Sync {
    /// Raw reply expected to name one of `known`, or "none"
    async fn most_similar(&self, intent: &str, known: &[String]) -> Result<String, OracleError>;
}

/// Bound an oracle call by a deadline
pub(crate) async fn with_deadline<F>(timeout: Duration, call: F) -> Result<String, OracleError>
where
    F: Future<Output = Result<String, OracleError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(OracleError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}
