//! Tool catalog loading from TOML configuration
//!
//! A catalog declares tools without their executors. Registering a catalog binds each
//! entry to an executor supplied by the host, keyed by tool name.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use super::definition::{ToolDescriptor, ToolId};
use super::registry::ToolRegistry;
use super::schema::{ParamSchema, ParamSpec, ParamType};
use crate::dispatch::ToolExecutor;
use crate::error::{OrchestratorError, Result};

/// TOML representation of a tool parameter
#[derive(Debug, Deserialize)]
struct TomlParam {
    #[serde(rename = "type")]
    param_type: String,
    #[serde(default)]
    required: bool,
    description: Option<String>,
}

/// TOML representation of a tool definition
#[derive(Debug, Deserialize)]
struct TomlTool {
    name: String,
    display_name: Option<String>,
    description: String,
    category: String,
    #[serde(default)]
    capabilities: Vec<String>,
    priority: Option<i32>,
    enabled: Option<bool>,
    registrant: Option<String>,
    timeout_ms: Option<u64>,
    #[serde(default)]
    params: HashMap<String, TomlParam>,
}

/// TOML file structure
#[derive(Debug, Deserialize)]
struct TomlCatalog {
    #[serde(rename = "tool", default)]
    tools: Vec<TomlTool>,
}

/// A catalog tool declaration, waiting for an executor
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub category: String,
    pub capabilities: BTreeSet<String>,
    pub parameters: ParamSchema,
    pub priority: i32,
    pub enabled: bool,
    pub registrant: Option<String>,
    pub timeout_ms: Option<u64>,
}

impl CatalogEntry {
    /// Bind this declaration to an executor
    pub fn into_descriptor(self, executor: Arc<dyn ToolExecutor>, default_registrant: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name,
            display_name: self.display_name,
            description: self.description,
            category: self.category,
            capabilities: self.capabilities,
            parameters: self.parameters,
            priority: self.priority,
            enabled: self.enabled,
            registrant: self.registrant.unwrap_or_else(|| default_registrant.to_string()),
            timeout_ms: self.timeout_ms,
            executor,
        }
    }
}

/// Catalog of tool declarations loaded from TOML, in file order
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    entries: Vec<CatalogEntry>,
}

impl ToolCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Load catalog from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| OrchestratorError::Catalog(format!("Failed to read catalog file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Load catalog from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let catalog: TomlCatalog =
            toml::from_str(content).map_err(|e| OrchestratorError::Catalog(format!("Failed to parse TOML: {}", e)))?;

        let mut entries: Vec<CatalogEntry> = Vec::with_capacity(catalog.tools.len());
        for toml_tool in catalog.tools {
            let entry = Self::convert_toml_tool(toml_tool)?;
            if entries.iter().any(|e| e.name == entry.name) {
                return Err(OrchestratorError::Catalog(format!(
                    "Duplicate tool name '{}' in catalog",
                    entry.name
                )));
            }
            entries.push(entry);
        }

        Ok(Self { entries })
    }

    /// Convert TOML tool to a catalog entry
    fn convert_toml_tool(toml_tool: TomlTool) -> Result<CatalogEntry> {
        let mut parameters = ParamSchema::new();
        for (name, param) in toml_tool.params {
            let param_type = ParamType::parse(&param.param_type).ok_or_else(|| {
                OrchestratorError::Catalog(format!(
                    "Invalid type '{}' for parameter '{}' of tool '{}'",
                    param.param_type, name, toml_tool.name
                ))
            })?;
            let spec = ParamSpec {
                param_type,
                required: param.required,
                description: param.description,
            };
            parameters = parameters.with_param(name, spec);
        }

        Ok(CatalogEntry {
            display_name: toml_tool.display_name.unwrap_or_else(|| toml_tool.name.clone()),
            name: toml_tool.name,
            description: toml_tool.description,
            category: toml_tool.category,
            capabilities: toml_tool.capabilities.into_iter().collect(),
            parameters,
            priority: toml_tool.priority.unwrap_or(50),
            enabled: toml_tool.enabled.unwrap_or(true),
            registrant: toml_tool.registrant,
            timeout_ms: toml_tool.timeout_ms,
        })
    }

    /// Get an entry by name
    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// List all tool names in file order
    pub fn list(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn all(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Register every entry that has an executor.
    ///
    /// Entries without an executor are skipped with a warning. Returns the ids of
    /// the registered tools in catalog order.
    pub async fn register_all(
        &self,
        registry: &ToolRegistry,
        executors: &HashMap<String, Arc<dyn ToolExecutor>>,
        registrant: &str,
    ) -> Vec<ToolId> {
        let mut ids = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let Some(executor) = executors.get(&entry.name) else {
                tracing::warn!(tool = %entry.name, "No executor bound for catalog tool, skipping");
                continue;
            };
            let descriptor = entry.clone().into_descriptor(executor.clone(), registrant);
            ids.push(registry.register(descriptor).await);
        }
        tracing::info!(registered = ids.len(), declared = self.entries.len(), "Catalog registered");
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::FnExecutor;
    use serde_json::Value;

    const SAMPLE_TOML: &str = r#"
[[tool]]
name = "search_files"
display_name = "Search Files"
description = "Search files by keyword"
category = "file"
capabilities = ["file_access", "search"]
priority = 70

[tool.params.query]
type = "string"
required = true
description = "Search terms"

[tool.params.max_results]
type = "integer"

[[tool]]
name = "send_email"
description = "Send an email"
category = "email"
capabilities = ["email_send"]
registrant = "mail-agent"
timeout_ms = 15000

[tool.params.to]
type = "string"
required = true

[tool.params.attachments]
type = "array"

[[tool]]
name = "list_events"
description = "List calendar events"
category = "calendar"
enabled = false
"#;

    fn noop() -> Arc<dyn ToolExecutor> {
        FnExecutor::arc(|_params, _ctx| async { Ok::<_, eyre::Report>(Value::Null) })
    }

    #[test]
    fn test_catalog_new_empty() {
        let catalog = ToolCatalog::new();
        assert!(catalog.is_empty());
        assert_eq!(catalog.len(), 0);
    }

    #[test]
    fn test_catalog_from_toml() {
        let catalog = ToolCatalog::from_toml(SAMPLE_TOML).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.list(), vec!["search_files", "send_email", "list_events"]);
        assert!(catalog.contains("send_email"));
        assert!(!catalog.contains("nonexistent"));
    }

    #[test]
    fn test_catalog_entry_fields() {
        let catalog = ToolCatalog::from_toml(SAMPLE_TOML).unwrap();

        let search = catalog.get("search_files").unwrap();
        assert_eq!(search.display_name, "Search Files");
        assert_eq!(search.category, "file");
        assert!(search.capabilities.contains("search"));
        assert_eq!(search.priority, 70);
        assert!(search.enabled);
        assert!(search.parameters.get("query").unwrap().required);
        assert_eq!(
            search.parameters.get("max_results").unwrap().param_type,
            ParamType::Number
        );

        let email = catalog.get("send_email").unwrap();
        assert_eq!(email.display_name, "send_email");
        assert_eq!(email.priority, 50);
        assert_eq!(email.registrant.as_deref(), Some("mail-agent"));
        assert_eq!(email.timeout_ms, Some(15000));

        assert!(!catalog.get("list_events").unwrap().enabled);
    }

    #[test]
    fn test_catalog_invalid_toml() {
        assert!(ToolCatalog::from_toml("invalid { toml }").is_err());
    }

    #[test]
    fn test_catalog_invalid_param_type() {
        let toml = r#"
[[tool]]
name = "bad"
description = "Bad tool"
category = "misc"

[tool.params.when]
type = "datetime"
"#;
        let err = ToolCatalog::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("datetime"));
    }

    #[test]
    fn test_catalog_duplicate_name() {
        let toml = r#"
[[tool]]
name = "dup"
description = "first"
category = "misc"

[[tool]]
name = "dup"
description = "second"
category = "misc"
"#;
        assert!(ToolCatalog::from_toml(toml).is_err());
    }

    #[test]
    fn test_catalog_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.toml");
        std::fs::write(&path, SAMPLE_TOML).unwrap();

        let catalog = ToolCatalog::from_file(&path).unwrap();
        assert_eq!(catalog.len(), 3);

        assert!(ToolCatalog::from_file(dir.path().join("missing.toml")).is_err());
    }

    #[tokio::test]
    async fn test_register_all_binds_executors() {
        let catalog = ToolCatalog::from_toml(SAMPLE_TOML).unwrap();
        let registry = ToolRegistry::new();

        let mut executors: HashMap<String, Arc<dyn ToolExecutor>> = HashMap::new();
        executors.insert("search_files".into(), noop());
        executors.insert("send_email".into(), noop());

        let ids = catalog.register_all(&registry, &executors, "catalog").await;
        assert_eq!(ids.len(), 2);
        assert_eq!(registry.len().await, 2);
        assert!(registry.get_by_name("list_events").await.is_none());

        let search = registry.get_by_name("search_files").await.unwrap();
        assert_eq!(search.registrant, "catalog");
        let email = registry.get_by_name("send_email").await.unwrap();
        assert_eq!(email.registrant, "mail-agent");

        // Loading the same catalog again updates in place
        let again = catalog.register_all(&registry, &executors, "catalog").await;
        assert_eq!(again, ids);
        assert_eq!(registry.len().await, 2);
    }
}
