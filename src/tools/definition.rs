//! Tool records and registration descriptors
//!
//! `Tool` is the serializable snapshot handed out by the registry; `ToolDescriptor`
//! is what callers register, carrying the executor alongside the descriptive fields.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::schema::{ParamSchema, ParamSpec};
use crate::dispatch::ToolExecutor;

/// Stable identifier minted at first registration
pub type ToolId = String;

/// Rolling execution statistics for a tool
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToolStats {
    pub usage_count: u64,
    /// Mean wall-clock execution time in milliseconds
    pub average_execution_ms: f64,
    /// Fraction of executions that succeeded, in [0, 1]
    pub success_rate: f64,
}

impl Default for ToolStats {
    fn default() -> Self {
        Self {
            usage_count: 0,
            average_execution_ms: 0.0,
            success_rate: 0.0,
        }
    }
}

impl ToolStats {
    /// Fold one execution into the running means.
    ///
    /// `avg' = (avg * (n - 1) + x) / n`, applied to both elapsed time and success (1/0).
    pub fn record(&mut self, elapsed_ms: f64, success: bool) {
        self.usage_count += 1;
        let n = self.usage_count as f64;
        let trial = if success { 1.0 } else { 0.0 };
        self.average_execution_ms = (self.average_execution_ms * (n - 1.0) + elapsed_ms) / n;
        self.success_rate = (self.success_rate * (n - 1.0) + trial) / n;
    }
}

/// A registered tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub id: ToolId,
    /// Unique registration name (e.g., "search_files")
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub category: String,
    pub capabilities: BTreeSet<String>,
    pub parameters: ParamSchema,
    /// Higher is preferred during discovery
    pub priority: i32,
    pub enabled: bool,
    /// Who registered the tool (agent, integration, catalog)
    pub registrant: String,
    /// Per-tool execution deadline; dispatcher default applies when unset
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    pub stats: ToolStats,
    /// Registration order, used as the discovery tie-breaker
    pub seq: u64,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tool {
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    /// True if the tool carries at least one of the given capabilities
    pub fn has_any_capability(&self, capabilities: &[String]) -> bool {
        capabilities.iter().any(|c| self.capabilities.contains(c))
    }

    /// True if the tool carries every one of the given capabilities
    pub fn has_all_capabilities(&self, capabilities: &[String]) -> bool {
        capabilities.iter().all(|c| self.capabilities.contains(c))
    }

    pub fn in_categories(&self, categories: &[String]) -> bool {
        categories.iter().any(|c| *c == self.category)
    }

    /// Compact view used in oracle prompts
    pub fn summary(&self) -> ToolSummary {
        ToolSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            capabilities: self.capabilities.iter().cloned().collect(),
        }
    }
}

/// What an oracle sees of a candidate tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSummary {
    pub id: ToolId,
    pub name: String,
    pub description: String,
    pub category: String,
    pub capabilities: Vec<String>,
}

/// Registration input: descriptive fields plus the executor
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub category: String,
    pub capabilities: BTreeSet<String>,
    pub parameters: ParamSchema,
    pub priority: i32,
    pub enabled: bool,
    pub registrant: String,
    pub timeout_ms: Option<u64>,
    pub executor: Arc<dyn ToolExecutor>,
}

impl ToolDescriptor {
    /// Create a descriptor with defaults: display name = name, priority 50, enabled
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
        executor: Arc<dyn ToolExecutor>,
    ) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            description: description.into(),
            category: category.into(),
            capabilities: BTreeSet::new(),
            parameters: ParamSchema::new(),
            priority: 50,
            enabled: true,
            registrant: "system".to_string(),
            timeout_ms: None,
            executor,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities.extend(capabilities.into_iter().map(Into::into));
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, spec: ParamSpec) -> Self {
        self.parameters = self.parameters.with_param(name, spec);
        self
    }

    pub fn with_parameters(mut self, parameters: ParamSchema) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_registrant(mut self, registrant: impl Into<String>) -> Self {
        self.registrant = registrant.into();
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("capabilities", &self.capabilities)
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .field("registrant", &self.registrant)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::FnExecutor;
    use crate::tools::schema::ParamType;

    fn noop() -> Arc<dyn ToolExecutor> {
        FnExecutor::arc(|_params, _ctx| async { Ok::<_, eyre::Report>(serde_json::Value::Null) })
    }

    #[test]
    fn test_stats_incremental_mean() {
        let mut stats = ToolStats::default();
        stats.record(100.0, true);
        assert_eq!(stats.usage_count, 1);
        assert_eq!(stats.average_execution_ms, 100.0);
        assert_eq!(stats.success_rate, 1.0);

        stats.record(200.0, false);
        assert_eq!(stats.usage_count, 2);
        assert_eq!(stats.average_execution_ms, 150.0);
        assert_eq!(stats.success_rate, 0.5);

        stats.record(0.0, true);
        assert_eq!(stats.average_execution_ms, 100.0);
        assert!((stats.success_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_descriptor_defaults() {
        let desc = ToolDescriptor::new("search_files", "Search files", "file", noop());
        assert_eq!(desc.display_name, "search_files");
        assert_eq!(desc.priority, 50);
        assert!(desc.enabled);
        assert!(desc.capabilities.is_empty());
        assert!(desc.timeout_ms.is_none());
    }

    #[test]
    fn test_descriptor_builder() {
        let desc = ToolDescriptor::new("send_email", "Send an email", "email", noop())
            .with_display_name("Send Email")
            .with_capabilities(["email_send", "notify"])
            .with_param("to", ParamSpec::required(ParamType::String))
            .with_priority(80)
            .with_enabled(false)
            .with_registrant("mail-agent")
            .with_timeout(5_000);

        assert_eq!(desc.display_name, "Send Email");
        assert!(desc.capabilities.contains("notify"));
        assert!(desc.parameters.get("to").unwrap().required);
        assert_eq!(desc.priority, 80);
        assert!(!desc.enabled);
        assert_eq!(desc.registrant, "mail-agent");
        assert_eq!(desc.timeout_ms, Some(5_000));

        let debug = format!("{:?}", desc);
        assert!(debug.contains("send_email"));
    }
}
