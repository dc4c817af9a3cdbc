//! Oracle with canned replies, for tests and offline hosts

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{OracleError, RankingOracle, SimilarityOracle};
use crate::tools::ToolSummary;

/// Replays scripted replies in order, then repeats a fallback reply.
///
/// Implements both oracle traits so one instance can stand in for either.
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<Result<String, OracleError>>>,
    fallback: Result<String, OracleError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedOracle {
    /// Always answer with `reply`
    pub fn fixed(reply: impl Into<String>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Ok(reply.into()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always fail with `error`
    pub fn failing(error: OracleError) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Err(error),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer with each reply once, in order, then with "none"
    pub fn sequence<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            fallback: Ok("none".to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep before every reply
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of calls made so far, across both traits
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn reply(&self) -> Result<String, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = match self.replies.lock() {
            Ok(mut queue) => queue.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl RankingOracle for ScriptedOracle {
    async fn rank(&self, _intent: &str, _candidates: &[ToolSummary]) -> Result<String, OracleError> {
        self.reply().await
    }
}

#[async_trait]
impl SimilarityOracle for ScriptedOracle {
    async fn most_similar(&self, _intent: &str, _known: &[String]) -> Result<String, OracleError> {
        self.reply().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_repeats() {
        let oracle = ScriptedOracle::fixed("[\"a\"]");
        assert_eq!(oracle.rank("x", &[]).await.unwrap(), "[\"a\"]");
        assert_eq!(oracle.most_similar("x", &[]).await.unwrap(), "[\"a\"]");
        assert_eq!(oracle.calls(), 2);
    }

    #[tokio::test]
    async fn test_sequence_then_none() {
        let oracle = ScriptedOracle::sequence(["first", "second"]);
        assert_eq!(oracle.most_similar("x", &[]).await.unwrap(), "first");
        assert_eq!(oracle.most_similar("x", &[]).await.unwrap(), "second");
        assert_eq!(oracle.most_similar("x", &[]).await.unwrap(), "none");
    }

    #[tokio::test]
    async fn test_failing() {
        let oracle = ScriptedOracle::failing(OracleError::Unavailable("down".into()));
        assert!(matches!(oracle.rank("x", &[]).await, Err(OracleError::Unavailable(_))));
        assert_eq!(oracle.calls(), 1);
    }
}
