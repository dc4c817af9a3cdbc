//! Execution dispatcher - validates, invokes and records tool executions

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;

use super::executor::ExecutionContext;
use crate::config::DispatcherConfig;
use crate::tools::{ToolId, ToolRegistry};

/// Failure classes a dispatch can end in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    ToolDisabled,
    ParameterValidation,
    ExecutionFailure,
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "NotFound",
            Self::ToolDisabled => "ToolDisabled",
            Self::ParameterValidation => "ParameterValidation",
            Self::ExecutionFailure => "ExecutionFailure",
            Self::Timeout => "Timeout",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub kind: ErrorKind,
    /// Offending field for validation failures, error message otherwise
    pub detail: String,
}

/// Structured result of one dispatch. Failures never surface as `Err`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub tool_id: Option<ToolId>,
    pub tool_name: Option<String>,
    pub output: Option<Value>,
    pub error: Option<ExecutionError>,
    pub elapsed_ms: u64,
}

impl ExecutionOutcome {
    fn succeeded(tool_id: ToolId, tool_name: String, output: Value, elapsed: Duration) -> Self {
        Self {
            success: true,
            tool_id: Some(tool_id),
            tool_name: Some(tool_name),
            output: Some(output),
            error: None,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    fn failed(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            success: false,
            tool_id: None,
            tool_name: None,
            output: None,
            error: Some(ExecutionError {
                kind,
                detail: detail.into(),
            }),
            elapsed_ms: 0,
        }
    }

    fn for_tool(mut self, tool_id: &str, tool_name: &str) -> Self {
        self.tool_id = Some(tool_id.to_string());
        self.tool_name = Some(tool_name.to_string());
        self
    }

    fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed_ms = elapsed.as_millis() as u64;
        self
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    pub fn detail(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.detail.as_str())
    }
}

/// One entry of a batch dispatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool id or name
    pub tool: String,
    #[serde(default)]
    pub parameters: Value,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, parameters: Value) -> Self {
        Self {
            tool: tool.into(),
            parameters,
        }
    }
}

/// Resolves, validates and runs tools, keeping their rolling statistics current
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    default_timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self::from_config(registry, &DispatcherConfig::default())
    }

    pub fn from_config(registry: Arc<ToolRegistry>, config: &DispatcherConfig) -> Self {
        Self {
            registry,
            default_timeout: Duration::from_millis(config.default_timeout_ms),
        }
    }

    /// Set the deadline used for tools without their own timeout
    pub fn with_default_timeout(mut self, timeout_ms: u64) -> Self {
        self.default_timeout = Duration::from_millis(timeout_ms);
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Execute a tool by id or name
    pub async fn execute(&self, identifier: &str, params: Value, ctx: &ExecutionContext) -> ExecutionOutcome {
        let Some((tool, executor)) = self.registry.resolve(identifier).await else {
            tracing::debug!(tool = identifier, "Dispatch target not found");
            return ExecutionOutcome::failed(ErrorKind::NotFound, format!("Unknown tool: {}", identifier));
        };

        if !tool.enabled {
            tracing::debug!(tool = %tool.name, "Dispatch target disabled");
            return ExecutionOutcome::failed(ErrorKind::ToolDisabled, format!("Tool is disabled: {}", tool.name))
                .for_tool(&tool.id, &tool.name);
        }

        if let Err(violation) = tool.parameters.validate(&params) {
            tracing::debug!(tool = %tool.name, %violation, "Parameter validation failed");
            return ExecutionOutcome::failed(ErrorKind::ParameterValidation, violation.field())
                .for_tool(&tool.id, &tool.name);
        }

        let timeout = tool
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout);

        let started = Instant::now();
        let call = AssertUnwindSafe(executor.execute(params, ctx)).catch_unwind();
        let result = tokio::time::timeout(timeout, call).await;
        let elapsed = started.elapsed();

        let outcome = match result {
            Ok(Ok(Ok(output))) => ExecutionOutcome::succeeded(tool.id.clone(), tool.name.clone(), output, elapsed),
            Ok(Ok(Err(e))) => ExecutionOutcome::failed(ErrorKind::ExecutionFailure, e.to_string())
                .for_tool(&tool.id, &tool.name)
                .with_elapsed(elapsed),
            Ok(Err(panic)) => ExecutionOutcome::failed(ErrorKind::ExecutionFailure, panic_message(panic.as_ref()))
                .for_tool(&tool.id, &tool.name)
                .with_elapsed(elapsed),
            Err(_) => ExecutionOutcome::failed(
                ErrorKind::Timeout,
                format!("Tool timed out after {}ms", timeout.as_millis()),
            )
            .for_tool(&tool.id, &tool.name)
            .with_elapsed(elapsed),
        };

        self.registry
            .record_execution(&tool.id, elapsed, outcome.success)
            .await;

        if outcome.success {
            tracing::info!(
                tool = %tool.name,
                request_id = %ctx.request_id,
                elapsed_ms = outcome.elapsed_ms,
                "Tool executed"
            );
        } else {
            tracing::warn!(
                tool = %tool.name,
                request_id = %ctx.request_id,
                error = ?outcome.error_kind(),
                detail = outcome.detail().unwrap_or_default(),
                "Tool execution failed"
            );
        }

        outcome
    }

    /// Execute several calls in order
    pub async fn execute_all(&self, calls: &[ToolCall], ctx: &ExecutionContext) -> Vec<ExecutionOutcome> {
        let mut outcomes = Vec::with_capacity(calls.len());
        for call in calls {
            outcomes.push(self.execute(&call.tool, call.parameters.clone(), ctx).await);
        }
        outcomes
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("Tool panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("Tool panicked: {}", s)
    } else {
        "Tool panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{FnExecutor, ToolExecutor};
    use crate::tools::{ParamSpec, ParamType, ToolDescriptor};
    use serde_json::json;

    fn echo() -> Arc<dyn ToolExecutor> {
        FnExecutor::arc(|params: Value, _ctx| async move { Ok::<_, eyre::Report>(json!({ "echo": params })) })
    }

    fn search_files() -> ToolDescriptor {
        ToolDescriptor::new("search_files", "Search files by query", "file", echo())
            .with_capability("file_access")
            .with_priority(70)
            .with_param("query", ParamSpec::required(ParamType::String))
            .with_param("max_results", ParamSpec::optional(ParamType::Number))
    }

    async fn setup() -> (Arc<ToolRegistry>, Dispatcher) {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(search_files()).await;
        let dispatcher = Dispatcher::new(registry.clone());
        (registry, dispatcher)
    }

    #[tokio::test]
    async fn test_execute_success_by_name() {
        let (registry, dispatcher) = setup().await;
        let outcome = dispatcher
            .execute("search_files", json!({"query": "budget"}), &ExecutionContext::new())
            .await;

        assert!(outcome.success);
        assert!(outcome.error.is_none());
        assert_eq!(outcome.output.unwrap()["echo"]["query"], "budget");
        assert_eq!(outcome.tool_name.as_deref(), Some("search_files"));

        let tool = registry.get_by_name("search_files").await.unwrap();
        assert_eq!(tool.stats.usage_count, 1);
        assert_eq!(tool.stats.success_rate, 1.0);
    }

    #[tokio::test]
    async fn test_execute_by_id() {
        let (registry, dispatcher) = setup().await;
        let id = registry.get_by_name("search_files").await.unwrap().id;
        let outcome = dispatcher
            .execute(&id, json!({"query": "q"}), &ExecutionContext::new())
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.tool_id, Some(id));
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let (_registry, dispatcher) = setup().await;
        let outcome = dispatcher
            .execute("nonexistent_tool", json!({}), &ExecutionContext::new())
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_execute_disabled_tool() {
        let (registry, dispatcher) = setup().await;
        let id = registry.get_by_name("search_files").await.unwrap().id;
        registry.set_enabled(&id, false).await;

        let outcome = dispatcher
            .execute("search_files", json!({"query": "q"}), &ExecutionContext::new())
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::ToolDisabled));
        assert_eq!(registry.get(&id).await.unwrap().stats.usage_count, 0);
    }

    #[tokio::test]
    async fn test_execute_missing_required_param() {
        let (registry, dispatcher) = setup().await;
        let outcome = dispatcher
            .execute("search_files", json!({}), &ExecutionContext::new())
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::ParameterValidation));
        assert_eq!(outcome.detail(), Some("query"));

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["error"]["kind"], "ParameterValidation");
        assert_eq!(json["error"]["detail"], "query");

        // Executor never ran, so statistics are untouched
        let tool = registry.get_by_name("search_files").await.unwrap();
        assert_eq!(tool.stats.usage_count, 0);
    }

    #[tokio::test]
    async fn test_execute_wrong_param_type() {
        let (_registry, dispatcher) = setup().await;
        let outcome = dispatcher
            .execute(
                "search_files",
                json!({"query": "q", "max_results": "ten"}),
                &ExecutionContext::new(),
            )
            .await;
        assert_eq!(outcome.error_kind(), Some(ErrorKind::ParameterValidation));
        assert_eq!(outcome.detail(), Some("max_results"));
    }

    #[tokio::test]
    async fn test_executor_error_is_contained() {
        let registry = Arc::new(ToolRegistry::new());
        let failing = FnExecutor::arc(|_params, _ctx| async { Err::<Value, _>(eyre::eyre!("calendar API unavailable")) });
        registry
            .register(ToolDescriptor::new("create_event", "Create event", "calendar", failing))
            .await;
        let dispatcher = Dispatcher::new(registry.clone());

        // One prior success so the failure shows up as a drop in success rate
        let id = registry.get_by_name("create_event").await.unwrap().id;
        registry.record_execution(&id, Duration::from_millis(10), true).await;

        let outcome = dispatcher
            .execute("create_event", json!({}), &ExecutionContext::new())
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::ExecutionFailure));
        assert_eq!(outcome.detail(), Some("calendar API unavailable"));

        let tool = registry.get(&id).await.unwrap();
        assert_eq!(tool.stats.usage_count, 2);
        assert_eq!(tool.stats.success_rate, 0.5);
    }

    #[tokio::test]
    async fn test_executor_panic_is_contained() {
        let registry = Arc::new(ToolRegistry::new());
        let panicking = FnExecutor::arc(|_params, _ctx| async {
            if true {
                panic!("bad payload");
            }
            Ok::<_, eyre::Report>(Value::Null)
        });
        registry
            .register(ToolDescriptor::new("flaky", "Panics", "misc", panicking))
            .await;
        let dispatcher = Dispatcher::new(registry.clone());

        let outcome = dispatcher.execute("flaky", json!({}), &ExecutionContext::new()).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::ExecutionFailure));
        assert!(outcome.detail().unwrap().contains("bad payload"));

        let tool = registry.get_by_name("flaky").await.unwrap();
        assert_eq!(tool.stats.usage_count, 1);
        assert_eq!(tool.stats.success_rate, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_executor_timeout() {
        let registry = Arc::new(ToolRegistry::new());
        let hanging = FnExecutor::arc(|_params, _ctx| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, eyre::Report>(Value::Null)
        });
        registry
            .register(ToolDescriptor::new("hang", "Never returns", "misc", hanging).with_timeout(50))
            .await;
        let dispatcher = Dispatcher::new(registry.clone());

        let outcome = dispatcher.execute("hang", json!({}), &ExecutionContext::new()).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Timeout));
        assert_eq!(outcome.elapsed_ms, 50);

        let tool = registry.get_by_name("hang").await.unwrap();
        assert_eq!(tool.stats.usage_count, 1);
        assert_eq!(tool.stats.average_execution_ms, 50.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_average_execution_time() {
        let registry = Arc::new(ToolRegistry::new());
        let slow = FnExecutor::arc(|params: Value, _ctx| async move {
            let ms = params["ms"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok::<_, eyre::Report>(Value::Null)
        });
        registry
            .register(ToolDescriptor::new("sleep", "Sleeps", "misc", slow))
            .await;
        let dispatcher = Dispatcher::new(registry.clone());

        dispatcher.execute("sleep", json!({"ms": 100}), &ExecutionContext::new()).await;
        dispatcher.execute("sleep", json!({"ms": 300}), &ExecutionContext::new()).await;

        let tool = registry.get_by_name("sleep").await.unwrap();
        assert_eq!(tool.stats.usage_count, 2);
        assert_eq!(tool.stats.average_execution_ms, 200.0);
    }

    #[tokio::test]
    async fn test_execute_all_preserves_order() {
        let (_registry, dispatcher) = setup().await;
        let calls = vec![
            ToolCall::new("search_files", json!({"query": "a"})),
            ToolCall::new("missing", json!({})),
            ToolCall::new("search_files", json!({})),
        ];

        let outcomes = dispatcher.execute_all(&calls, &ExecutionContext::new()).await;
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].success);
        assert_eq!(outcomes[1].error_kind(), Some(ErrorKind::NotFound));
        assert_eq!(outcomes[2].error_kind(), Some(ErrorKind::ParameterValidation));
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::NotFound.to_string(), "NotFound");
        assert_eq!(ErrorKind::ParameterValidation.to_string(), "ParameterValidation");
        assert_eq!(serde_json::to_string(&ErrorKind::Timeout).unwrap(), "\"Timeout\"");
    }
}
