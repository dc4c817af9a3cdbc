//! Orchestrator: processes one user request end to end
//!
//! fingerprint -> coalescer -> discovery -> dispatch -> feedback. The registry, score
//! table and cache are explicit shared objects; everything here is wiring.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{ResponseCache, fingerprint_value};
use crate::config::Config;
use crate::discovery::{DiscoveryFacade, DiscoveryQuery};
use crate::dispatch::{Dispatcher, ExecutionContext, ExecutionOutcome};
use crate::error::{OrchestratorError, Result, SharedError};
use crate::oracle::{RankingOracle, SimilarityOracle};
use crate::recommend::RecommendationEngine;
use crate::tools::{ToolId, ToolRegistry, ToolSummary};

/// A user request: what to achieve, and with which parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestrationRequest {
    pub intent: String,
    pub agent_id: Option<String>,
    pub categories: Option<Vec<String>>,
    pub capabilities: Option<Vec<String>>,
    #[serde(default)]
    pub parameters: Value,
    pub limit: Option<usize>,
}

impl OrchestrationRequest {
    pub fn new(intent: impl Into<String>, parameters: Value) -> Self {
        Self {
            intent: intent.into(),
            parameters,
            ..Default::default()
        }
    }

    pub fn agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
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

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Deterministic key over the fields that identify a request.
    ///
    /// Category and capability lists are order-insensitive.
    pub fn fingerprint(&self) -> String {
        let sorted = |list: &Option<Vec<String>>| {
            list.as_ref().map(|l| {
                let mut l = l.clone();
                l.sort();
                l.dedup();
                l
            })
        };
        fingerprint_value(&json!({
            "intent": self.intent,
            "agent_id": self.agent_id,
            "categories": sorted(&self.categories),
            "capabilities": sorted(&self.capabilities),
            "parameters": self.parameters,
            "limit": self.limit,
        }))
    }

    fn discovery_query(&self, default_limit: usize) -> DiscoveryQuery {
        DiscoveryQuery {
            intent: Some(self.intent.clone()).filter(|i| !i.trim().is_empty()),
            categories: self.categories.clone(),
            capabilities: self.capabilities.clone(),
            agent_id: self.agent_id.clone(),
            limit: Some(self.limit.unwrap_or(default_limit)),
        }
    }
}

/// Result of one orchestrated request. Shared verbatim by coalesced and cached callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationResponse {
    pub fingerprint: String,
    /// Tool that produced `outcome`
    pub selected: Option<ToolSummary>,
    /// Final outcome: the first success, or the last failure
    pub outcome: ExecutionOutcome,
    /// Every dispatch made, in order
    pub attempts: Vec<ExecutionOutcome>,
    /// Candidate ids in rank order
    pub candidates: Vec<ToolId>,
}

impl OrchestrationResponse {
    pub fn success(&self) -> bool {
        self.outcome.success
    }
}

/// The part of the orchestrator a spawned computation needs
struct Pipeline {
    discovery: Arc<DiscoveryFacade>,
    dispatcher: Arc<Dispatcher>,
    engine: Arc<RecommendationEngine>,
    max_attempts: usize,
    default_limit: usize,
}

impl Pipeline {
    async fn run(&self, fingerprint: String, request: OrchestrationRequest) -> Result<OrchestrationResponse> {
        let query = request.discovery_query(self.default_limit);
        let candidates = self.discovery.discover(&query).await;
        if candidates.is_empty() {
            info!(intent = %request.intent, "No candidate tools");
            return Err(OrchestratorError::NoMatchingTool(request.intent));
        }

        let mut ctx = ExecutionContext::new();
        if let Some(intent) = &query.intent {
            ctx = ctx.with_intent(intent);
        }
        if let Some(agent) = &request.agent_id {
            ctx = ctx.with_agent(agent);
        }

        let mut attempts: Vec<ExecutionOutcome> = Vec::new();
        let mut selected = None;
        for tool in candidates.iter().take(self.max_attempts.max(1)) {
            let outcome = self.dispatcher.execute(&tool.id, request.parameters.clone(), &ctx).await;
            if let Some(intent) = &query.intent {
                self.engine.record_feedback(intent, &tool.id, outcome.success).await;
            }
            let success = outcome.success;
            attempts.push(outcome);
            selected = Some(tool.summary());
            if success {
                break;
            }
            debug!(tool = %tool.name, "Attempt failed, trying next candidate");
        }

        let Some(outcome) = attempts.last().cloned() else {
            return Err(OrchestratorError::NoMatchingTool(request.intent));
        };

        info!(
            request_id = %ctx.request_id,
            intent = %request.intent,
            tool = outcome.tool_name.as_deref().unwrap_or_default(),
            success = outcome.success,
            attempts = attempts.len(),
            "Request orchestrated"
        );

        Ok(OrchestrationResponse {
            fingerprint,
            selected,
            outcome,
            attempts,
            candidates: candidates.into_iter().map(|t| t.id).collect(),
        })
    }
}

pub struct Orchestrator {
    registry: Arc<ToolRegistry>,
    cache: Arc<ResponseCache<OrchestrationResponse>>,
    pipeline: Arc<Pipeline>,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// Orchestrator with a fresh registry and no oracles
    pub fn from_config(config: &Config) -> Self {
        Self::builder().config(config.clone()).build()
    }

    /// Process one request, serving identical concurrent or recent requests from a
    /// single computation
    pub async fn handle(&self, request: OrchestrationRequest) -> std::result::Result<OrchestrationResponse, SharedError> {
        let fingerprint = request.fingerprint();
        let pipeline = Arc::clone(&self.pipeline);
        let key = fingerprint.clone();

        self.cache
            .process_with_caching(&fingerprint, move || async move { pipeline.run(key, request).await })
            .await
    }

    /// Start the periodic cache sweep; it stops once the orchestrator is dropped
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        self.cache.spawn_sweeper()
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.pipeline.dispatcher
    }

    pub fn engine(&self) -> &Arc<RecommendationEngine> {
        &self.pipeline.engine
    }

    pub fn discovery(&self) -> &Arc<DiscoveryFacade> {
        &self.pipeline.discovery
    }

    pub fn cache(&self) -> &Arc<ResponseCache<OrchestrationResponse>> {
        &self.cache
    }
}

/// Assembles an `Orchestrator` from configuration and optional collaborators
#[derive(Default)]
pub struct OrchestratorBuilder {
    config: Config,
    registry: Option<Arc<ToolRegistry>>,
    ranking_oracle: Option<Arc<dyn RankingOracle>>,
    similarity_oracle: Option<Arc<dyn SimilarityOracle>>,
}

impl OrchestratorBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Share an existing registry instead of creating one
    pub fn registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn ranking_oracle(mut self, oracle: Arc<dyn RankingOracle>) -> Self {
        self.ranking_oracle = Some(oracle);
        self
    }

    pub fn similarity_oracle(mut self, oracle: Arc<dyn SimilarityOracle>) -> Self {
        self.similarity_oracle = Some(oracle);
        self
    }

    pub fn build(self) -> Orchestrator {
        let config = self.config;
        let registry = self.registry.unwrap_or_else(|| Arc::new(ToolRegistry::new()));

        let mut engine = RecommendationEngine::from_config(registry.clone(), &config.recommendation);
        if let Some(oracle) = self.similarity_oracle {
            engine = engine.with_oracle(oracle);
        }
        let engine = Arc::new(engine);

        let mut discovery = DiscoveryFacade::from_config(registry.clone(), engine.clone(), &config.discovery);
        if let Some(oracle) = self.ranking_oracle {
            discovery = discovery.with_oracle(oracle);
        }

        let dispatcher = Dispatcher::from_config(registry.clone(), &config.dispatcher);

        Orchestrator {
            registry,
            cache: Arc::new(ResponseCache::new(&config.cache)),
            pipeline: Arc::new(Pipeline {
                discovery: Arc::new(discovery),
                dispatcher: Arc::new(dispatcher),
                engine,
                max_attempts: config.orchestrator.max_attempts,
                default_limit: config.orchestrator.default_limit,
            }),
        }
    }
}
