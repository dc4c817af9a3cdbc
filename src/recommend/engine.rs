//! Recommendation engine: learned scores with a semantic fallback

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::scores::IntentScoreTable;
use crate::config::RecommendationConfig;
use crate::oracle::{SimilarityOracle, parse_similar, with_deadline};
use crate::tools::{Tool, ToolId, ToolRegistry};

/// A live tool with the score that ranked it
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub tool: Tool,
    pub score: f64,
}

/// Turns execution feedback into ranked tool suggestions per intent
pub struct RecommendationEngine {
    registry: Arc<ToolRegistry>,
    table: RwLock<IntentScoreTable>,
    oracle: Option<Arc<dyn SimilarityOracle>>,
    semantic_discount: f64,
    oracle_timeout: Duration,
}

impl RecommendationEngine {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self::from_config(registry, &RecommendationConfig::default())
    }

    pub fn from_config(registry: Arc<ToolRegistry>, config: &RecommendationConfig) -> Self {
        Self {
            registry,
            table: RwLock::new(IntentScoreTable::new().with_max_intents(config.max_intents)),
            oracle: None,
            semantic_discount: config.semantic_discount,
            oracle_timeout: Duration::from_millis(config.oracle_timeout_ms),
        }
    }

    /// Consult `oracle` for intents never seen before
    pub fn with_oracle(mut self, oracle: Arc<dyn SimilarityOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Record the outcome of using `tool_id` for `intent`; returns the new score
    pub async fn record_feedback(&self, intent: &str, tool_id: &str, was_successful: bool) -> f64 {
        let score = self.table.write().await.record(intent, tool_id, was_successful);
        debug!(intent, tool = tool_id, success = was_successful, score, "Feedback recorded");
        score
    }

    /// Best tools for an intent, highest score first.
    ///
    /// Known intents use their own scores. Unknown intents borrow the scores of the
    /// most similar known intent, discounted, when a similarity oracle finds one.
    pub async fn recommend(&self, intent: &str, limit: usize) -> Vec<Recommendation> {
        let (ranked, known) = {
            let table = self.table.read().await;
            match table.ranked(intent) {
                Some(ranked) => (Some(ranked), Vec::new()),
                None => (None, table.known_intents()),
            }
        };

        if let Some(ranked) = ranked {
            return self.resolve(ranked, 1.0, limit).await;
        }

        if known.is_empty() {
            return Vec::new();
        }

        let Some(similar) = self.most_similar(intent, &known).await else {
            return Vec::new();
        };

        let ranked = self.table.read().await.ranked(&similar);
        match ranked {
            Some(ranked) => {
                debug!(intent, similar = %similar, "Using scores of similar intent");
                self.resolve(ranked, self.semantic_discount, limit).await
            }
            // Evicted while the oracle was thinking
            None => Vec::new(),
        }
    }

    async fn most_similar(&self, intent: &str, known: &[String]) -> Option<String> {
        let oracle = self.oracle.as_ref()?;
        match with_deadline(self.oracle_timeout, oracle.most_similar(intent, known)).await {
            Ok(reply) => {
                let matched = parse_similar(&reply, known);
                if matched.is_none() {
                    debug!(intent, reply = %reply, "Similarity oracle named no known intent");
                }
                matched
            }
            Err(e) => {
                warn!(intent, error = %e, "Similarity oracle failed");
                None
            }
        }
    }

    /// Map scored ids to live tools, dropping unregistered ones before they count
    /// toward `limit`
    async fn resolve(&self, ranked: Vec<(ToolId, f64)>, factor: f64, limit: usize) -> Vec<Recommendation> {
        let mut recommendations = Vec::with_capacity(ranked.len().min(limit));
        for (id, score) in ranked {
            if recommendations.len() >= limit {
                break;
            }
            if let Some(tool) = self.registry.get(&id).await {
                recommendations.push(Recommendation {
                    tool,
                    score: score * factor,
                });
            }
        }
        recommendations
    }

    pub async fn score(&self, intent: &str, tool_id: &str) -> Option<f64> {
        self.table.read().await.score(intent, tool_id)
    }

    pub async fn known_intents(&self) -> Vec<String> {
        self.table.read().await.known_intents()
    }

    pub async fn intent_count(&self) -> usize {
        self.table.read().await.len()
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::FnExecutor;
    use crate::oracle::{OracleError, ScriptedOracle};
    use crate::tools::ToolDescriptor;
    use serde_json::Value;

    async fn registry_with(names: &[&str]) -> (Arc<ToolRegistry>, Vec<ToolId>) {
        let registry = Arc::new(ToolRegistry::new());
        let mut ids = Vec::new();
        for name in names {
            let exec = FnExecutor::arc(|_params, _ctx| async { Ok::<_, eyre::Report>(Value::Null) });
            ids.push(registry.register(ToolDescriptor::new(*name, "test tool", "misc", exec)).await);
        }
        (registry, ids)
    }

    fn scored(recs: &[Recommendation]) -> Vec<(&str, f64)> {
        recs.iter().map(|r| (r.tool.name.as_str(), r.score)).collect()
    }

    #[tokio::test]
    async fn test_feedback_arithmetic() {
        let (registry, ids) = registry_with(&["send_email"]).await;
        let engine = RecommendationEngine::new(registry);

        for _ in 0..3 {
            engine.record_feedback("send an email", &ids[0], true).await;
        }
        assert_eq!(engine.score("send an email", &ids[0]).await, Some(3.0));

        engine.record_feedback("send an email", &ids[0], false).await;
        assert_eq!(engine.score("send an email", &ids[0]).await, Some(2.5));
    }

    #[tokio::test]
    async fn test_recommend_known_intent_sorted_and_limited() {
        let (registry, ids) = registry_with(&["a", "b", "c"]).await;
        let engine = RecommendationEngine::new(registry);

        engine.record_feedback("intent", &ids[0], true).await;
        for _ in 0..3 {
            engine.record_feedback("intent", &ids[1], true).await;
        }
        engine.record_feedback("intent", &ids[2], true).await;
        engine.record_feedback("intent", &ids[2], true).await;

        let recs = engine.recommend("intent", 10).await;
        assert_eq!(scored(&recs), vec![("b", 3.0), ("c", 2.0), ("a", 1.0)]);

        let recs = engine.recommend("intent", 2).await;
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].tool.name, "b");
    }

    #[tokio::test]
    async fn test_recommend_skips_zero_scores() {
        let (registry, ids) = registry_with(&["a", "b"]).await;
        let engine = RecommendationEngine::new(registry);

        engine.record_feedback("intent", &ids[0], true).await;
        engine.record_feedback("intent", &ids[1], false).await;

        let recs = engine.recommend("intent", 10).await;
        assert_eq!(scored(&recs), vec![("a", 1.0)]);
    }

    #[tokio::test]
    async fn test_recommend_drops_unregistered_tools() {
        let (registry, ids) = registry_with(&["a", "b"]).await;
        let engine = RecommendationEngine::new(registry.clone());

        engine.record_feedback("intent", &ids[0], true).await;
        engine.record_feedback("intent", &ids[1], true).await;
        engine.record_feedback("intent", &ids[1], true).await;
        registry.unregister(&ids[1]).await;

        let recs = engine.recommend("intent", 1).await;
        assert_eq!(scored(&recs), vec![("a", 1.0)]);
    }

    #[tokio::test]
    async fn test_recommend_backfills_past_unregistered_tools() {
        let (registry, ids) = registry_with(&["a", "b", "c"]).await;
        let engine = RecommendationEngine::new(registry.clone());

        for _ in 0..3 {
            engine.record_feedback("intent", &ids[1], true).await;
        }
        for _ in 0..2 {
            engine.record_feedback("intent", &ids[0], true).await;
        }
        engine.record_feedback("intent", &ids[2], true).await;
        registry.unregister(&ids[1]).await;

        let recs = engine.recommend("intent", 2).await;
        assert_eq!(scored(&recs), vec![("a", 2.0), ("c", 1.0)]);
    }

    #[tokio::test]
    async fn test_recommend_no_known_intents() {
        let (registry, _) = registry_with(&["a"]).await;
        let oracle = Arc::new(ScriptedOracle::fixed("anything"));
        let engine = RecommendationEngine::new(registry).with_oracle(oracle.clone());

        assert!(engine.recommend("anything", 5).await.is_empty());
        // The oracle is not consulted when there is nothing to compare against
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn test_recommend_semantic_match_discounted() {
        let (registry, ids) = registry_with(&["send_email"]).await;
        let oracle = Arc::new(ScriptedOracle::fixed("send an email"));
        let engine = RecommendationEngine::new(registry).with_oracle(oracle);

        for _ in 0..3 {
            engine.record_feedback("send an email", &ids[0], true).await;
        }
        engine.record_feedback("send an email", &ids[0], false).await;

        let recs = engine.recommend("email my boss", 5).await;
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].tool.name, "send_email");
        assert!((recs[0].score - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_recommend_unknown_without_oracle() {
        let (registry, ids) = registry_with(&["a"]).await;
        let engine = RecommendationEngine::new(registry);
        engine.record_feedback("known", &ids[0], true).await;

        assert!(engine.recommend("unknown", 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_recommend_oracle_failures_degrade_to_empty() {
        let (registry, ids) = registry_with(&["a"]).await;

        let failing = Arc::new(ScriptedOracle::failing(OracleError::Unavailable("down".into())));
        let engine = RecommendationEngine::new(registry.clone()).with_oracle(failing);
        engine.record_feedback("known", &ids[0], true).await;
        assert!(engine.recommend("unknown", 5).await.is_empty());

        let rambling = Arc::new(ScriptedOracle::fixed("I am not sure, maybe something about files"));
        let engine = RecommendationEngine::new(registry).with_oracle(rambling);
        engine.record_feedback("known", &ids[0], true).await;
        assert!(engine.recommend("unknown", 5).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recommend_oracle_timeout() {
        let (registry, ids) = registry_with(&["a"]).await;
        let slow = Arc::new(ScriptedOracle::fixed("known").with_delay(Duration::from_secs(60)));
        let config = RecommendationConfig {
            oracle_timeout_ms: 100,
            ..Default::default()
        };
        let engine = RecommendationEngine::from_config(registry, &config).with_oracle(slow);
        engine.record_feedback("known", &ids[0], true).await;

        assert!(engine.recommend("unknown", 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_known_intents_and_count() {
        let (registry, ids) = registry_with(&["a"]).await;
        let engine = RecommendationEngine::new(registry);
        engine.record_feedback("b intent", &ids[0], true).await;
        engine.record_feedback("a intent", &ids[0], false).await;

        assert_eq!(engine.known_intents().await, vec!["a intent", "b intent"]);
        assert_eq!(engine.intent_count().await, 2);
    }
}
