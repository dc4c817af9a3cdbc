//! Tool executor trait and execution context

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::generate_request_id;

/// The function behind a tool.
///
/// Implementations are external collaborators and are not trusted: errors, panics
/// and hangs are all contained by the dispatcher.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> eyre::Result<Value>;
}

/// Per-call context handed to executors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub request_id: String,
    pub agent_id: Option<String>,
    pub intent: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            request_id: generate_request_id(),
            agent_id: None,
            intent: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Adapts an async closure into a `ToolExecutor`
pub struct FnExecutor<F, Fut> {
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnExecutor<F, Fut>
where
    F: Fn(Value, ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = eyre::Result<Value>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f, _fut: PhantomData }
    }

    /// Wrap straight into the shared trait object the registry stores
    pub fn arc(f: F) -> Arc<dyn ToolExecutor> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> ToolExecutor for FnExecutor<F, Fut>
where
    F: Fn(Value, ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = eyre::Result<Value>> + Send + 'static,
{
    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> eyre::Result<Value> {
        (self.f)(params, ctx.clone()).await
    }
}
