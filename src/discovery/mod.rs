//! Discovery facade
//!
//! Answers "which tools fit this request" by preferring learned recommendations and
//! falling back to registry filtering, optionally reordered by a ranking oracle.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::DiscoveryConfig;
use crate::oracle::{RankingOracle, parse_ranking, with_deadline};
use crate::recommend::RecommendationEngine;
use crate::tools::{Tool, ToolFilter, ToolRegistry, ToolSummary};

/// What the caller is looking for. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryQuery {
    pub intent: Option<String>,
    pub categories: Option<Vec<String>>,
    pub capabilities: Option<Vec<String>>,
    pub agent_id: Option<String>,
    pub limit: Option<usize>,
}

impl DiscoveryQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }

    pub fn categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = Some(categories.into_iter().map(Into::into).collect());
        self
    }

    pub fn capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = Some(capabilities.into_iter().map(Into::into).collect());
        self
    }

    pub fn agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn registry_filter(&self) -> ToolFilter {
        ToolFilter {
            categories: self.categories.clone(),
            capabilities: self.capabilities.clone(),
            agent_id: self.agent_id.clone(),
            limit: None,
        }
    }
}

pub struct DiscoveryFacade {
    registry: Arc<ToolRegistry>,
    engine: Arc<RecommendationEngine>,
    oracle: Option<Arc<dyn RankingOracle>>,
    ranking_threshold: usize,
    oracle_timeout: Duration,
}

impl DiscoveryFacade {
    pub fn new(registry: Arc<ToolRegistry>, engine: Arc<RecommendationEngine>) -> Self {
        Self::from_config(registry, engine, &DiscoveryConfig::default())
    }

    pub fn from_config(
        registry: Arc<ToolRegistry>,
        engine: Arc<RecommendationEngine>,
        config: &DiscoveryConfig,
    ) -> Self {
        Self {
            registry,
            engine,
            oracle: None,
            ranking_threshold: config.ranking_threshold,
            oracle_timeout: Duration::from_millis(config.oracle_timeout_ms),
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn RankingOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Candidate tools for a query, best first
    pub async fn discover(&self, query: &DiscoveryQuery) -> Vec<Tool> {
        let limit = query.limit.unwrap_or(usize::MAX);

        if let Some(intent) = &query.intent {
            let recommended = self.recommended(intent, query).await;
            if !recommended.is_empty() {
                debug!(intent = %intent, found = recommended.len(), "Discovery served by recommendations");
                return recommended.into_iter().take(limit).collect();
            }
        }

        let mut candidates = self.registry.discover_tools(&query.registry_filter()).await;

        if let Some(intent) = &query.intent
            && !candidates.is_empty()
            && candidates.len() <= self.ranking_threshold
        {
            candidates = self.rank(intent, candidates).await;
        }

        candidates.truncate(limit);
        candidates
    }

    /// Recommendations that satisfy every filter in the query
    async fn recommended(&self, intent: &str, query: &DiscoveryQuery) -> Vec<Tool> {
        let recommendations = self.engine.recommend(intent, usize::MAX).await;
        if recommendations.is_empty() {
            return Vec::new();
        }

        let agent_tools: Option<HashSet<String>> = match &query.agent_id {
            Some(agent) => Some(
                self.registry
                    .tools_for_agent(agent)
                    .await
                    .into_iter()
                    .map(|t| t.id)
                    .collect(),
            ),
            None => None,
        };

        let categories = query.categories.as_deref().filter(|c| !c.is_empty());
        let capabilities = query.capabilities.as_deref().unwrap_or_default();

        recommendations
            .into_iter()
            .map(|r| r.tool)
            .filter(|t| t.enabled)
            .filter(|t| t.has_all_capabilities(capabilities))
            .filter(|t| categories.is_none_or(|c| t.in_categories(c)))
            .filter(|t| agent_tools.as_ref().is_none_or(|ids| ids.contains(&t.id)))
            .collect()
    }

    /// Reorder candidates by the ranking oracle; original order on any failure
    async fn rank(&self, intent: &str, candidates: Vec<Tool>) -> Vec<Tool> {
        let Some(oracle) = &self.oracle else {
            return candidates;
        };

        let summaries: Vec<ToolSummary> = candidates.iter().map(Tool::summary).collect();
        let reply = match with_deadline(self.oracle_timeout, oracle.rank(intent, &summaries)).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(intent, error = %e, "Ranking oracle failed, keeping registry order");
                return candidates;
            }
        };

        let Some(order) = parse_ranking(&reply) else {
            debug!(intent, reply = %reply, "Unusable ranking reply, keeping registry order");
            return candidates;
        };

        apply_ranking(candidates, &order)
    }
}

/// Move named candidates to the front in the given order; the rest keep their order.
///
/// Identifiers may be ids or names. Unknown and repeated identifiers are ignored.
fn apply_ranking(candidates: Vec<Tool>, order: &[String]) -> Vec<Tool> {
    let mut remaining: Vec<Option<Tool>> = candidates.into_iter().map(Some).collect();
    let mut ranked = Vec::with_capacity(remaining.len());

    for identifier in order {
        let position = remaining
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|t| t.id == *identifier || t.name == *identifier));
        if let Some(tool) = position.and_then(|i| remaining[i].take()) {
            ranked.push(tool);
        }
    }

    if ranked.is_empty() {
        debug!("Ranking named no candidates, keeping registry order");
    }
    ranked.extend(remaining.into_iter().flatten());
    ranked
}
