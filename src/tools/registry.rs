//! Tool registry with multi-key lookup
//!
//! Owns every registered tool and the indices derived from it:
//! - By id (authoritative) and by name
//! - By category, by capability and by registrant
//! - Per-agent tool sets
//!
//! All state sits behind one lock, so a tool record and its index entries always
//! change together.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::definition::{Tool, ToolDescriptor, ToolId, ToolStats};
use crate::dispatch::ToolExecutor;
use crate::id::generate_tool_id;

/// How `find_tool` locates a tool
#[derive(Debug, Clone, Copy)]
pub enum ToolLookup<'a> {
    ById(&'a str),
    ByName(&'a str),
    /// First tool in the category passing the filters; no ordering is implied
    ByCategory(&'a str),
}

/// Filters for `discover_tools`. Empty lists behave like absent ones.
#[derive(Debug, Clone, Default)]
pub struct ToolFilter {
    pub categories: Option<Vec<String>>,
    pub capabilities: Option<Vec<String>>,
    pub agent_id: Option<String>,
    pub limit: Option<usize>,
}

impl ToolFilter {
    pub fn new() -> Self {
        Self::default()
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
}

struct RegistryEntry {
    tool: Tool,
    executor: Arc<dyn ToolExecutor>,
}

#[derive(Default)]
struct RegistryState {
    tools: HashMap<ToolId, RegistryEntry>,
    by_name: HashMap<String, ToolId>,
    by_category: HashMap<String, HashSet<ToolId>>,
    by_capability: HashMap<String, HashSet<ToolId>>,
    by_registrant: HashMap<String, HashSet<ToolId>>,
    agent_tools: HashMap<String, HashSet<ToolId>>,
    next_seq: u64,
}

fn index_insert(index: &mut HashMap<String, HashSet<ToolId>>, key: &str, id: &ToolId) {
    index.entry(key.to_string()).or_default().insert(id.clone());
}

fn index_remove(index: &mut HashMap<String, HashSet<ToolId>>, key: &str, id: &ToolId) {
    if let Some(ids) = index.get_mut(key) {
        ids.remove(id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

fn non_empty(list: &Option<Vec<String>>) -> Option<&[String]> {
    list.as_deref().filter(|l| !l.is_empty())
}

impl RegistryState {
    fn mint_id(&self) -> ToolId {
        loop {
            let id = generate_tool_id();
            if !self.tools.contains_key(&id) && !self.by_name.values().any(|bound| bound == &id) {
                return id;
            }
        }
    }

    fn index(&mut self, tool: &Tool) {
        index_insert(&mut self.by_category, &tool.category, &tool.id);
        for capability in &tool.capabilities {
            index_insert(&mut self.by_capability, capability, &tool.id);
        }
        index_insert(&mut self.by_registrant, &tool.registrant, &tool.id);
    }

    fn unindex(&mut self, tool: &Tool) {
        index_remove(&mut self.by_category, &tool.category, &tool.id);
        for capability in &tool.capabilities {
            index_remove(&mut self.by_capability, capability, &tool.id);
        }
        index_remove(&mut self.by_registrant, &tool.registrant, &tool.id);
    }

    /// Insert a record under `id`, which is either freshly minted or the id the
    /// name was bound to before it was unregistered
    fn insert_new(&mut self, id: ToolId, descriptor: ToolDescriptor) -> ToolId {
        let now = Utc::now();
        let seq = self.next_seq;
        self.next_seq += 1;

        let tool = Tool {
            id: id.clone(),
            name: descriptor.name,
            display_name: descriptor.display_name,
            description: descriptor.description,
            category: descriptor.category,
            capabilities: descriptor.capabilities,
            parameters: descriptor.parameters,
            priority: descriptor.priority,
            enabled: descriptor.enabled,
            registrant: descriptor.registrant,
            timeout_ms: descriptor.timeout_ms,
            stats: ToolStats::default(),
            seq,
            registered_at: now,
            updated_at: now,
        };

        self.index(&tool);
        self.by_name.insert(tool.name.clone(), id.clone());
        self.tools.insert(
            id.clone(),
            RegistryEntry {
                tool,
                executor: descriptor.executor,
            },
        );
        id
    }

    /// Overwrite descriptive fields, keeping id, sequence and statistics
    fn update_in_place(&mut self, id: &ToolId, descriptor: ToolDescriptor) {
        let Some(mut entry) = self.tools.remove(id) else {
            return;
        };
        self.unindex(&entry.tool);

        let tool = &mut entry.tool;
        tool.display_name = descriptor.display_name;
        tool.description = descriptor.description;
        tool.category = descriptor.category;
        tool.capabilities = descriptor.capabilities;
        tool.parameters = descriptor.parameters;
        tool.priority = descriptor.priority;
        tool.enabled = descriptor.enabled;
        tool.registrant = descriptor.registrant;
        tool.timeout_ms = descriptor.timeout_ms;
        tool.updated_at = Utc::now();
        entry.executor = descriptor.executor;

        self.index(&entry.tool);
        self.tools.insert(id.clone(), entry);
    }

    fn is_visible(&self, tool: &Tool, enabled_only: bool, agent_id: Option<&str>) -> bool {
        if enabled_only && !tool.enabled {
            return false;
        }
        match agent_id {
            Some(agent) => self
                .agent_tools
                .get(agent)
                .is_some_and(|ids| ids.contains(&tool.id)),
            None => true,
        }
    }

    fn union_of<'a>(index: &'a HashMap<String, HashSet<ToolId>>, keys: &[String]) -> HashSet<&'a ToolId> {
        keys.iter()
            .filter_map(|k| index.get(k))
            .flat_map(|ids| ids.iter())
            .collect()
    }

    fn sorted_by_seq<'a>(&'a self, ids: impl Iterator<Item = &'a ToolId>) -> Vec<Tool> {
        let mut tools: Vec<&Tool> = ids.filter_map(|id| self.tools.get(id)).map(|e| &e.tool).collect();
        tools.sort_by_key(|t| t.seq);
        tools.into_iter().cloned().collect()
    }
}

/// Canonical set of tools and their lookup indices
pub struct ToolRegistry {
    state: RwLock<RegistryState>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Register a tool, or update it in place if the name is already known.
    ///
    /// Returns the tool's id, which never changes across re-registrations.
    pub async fn register(&self, descriptor: ToolDescriptor) -> ToolId {
        let mut state = self.state.write().await;

        let bound = state.by_name.get(&descriptor.name).cloned();
        if let Some(id) = &bound
            && state.tools.contains_key(id)
        {
            debug!(tool = %descriptor.name, id = %id, "Re-registration, updating in place");
            state.update_in_place(id, descriptor);
            return id.clone();
        }

        let name = descriptor.name.clone();
        let category = descriptor.category.clone();
        let revived = bound.is_some();
        let id = bound.unwrap_or_else(|| state.mint_id());
        let id = state.insert_new(id, descriptor);
        info!(tool = %name, id = %id, category = %category, revived, "Tool registered");
        id
    }

    /// Add tools to an agent's set. Unknown ids are skipped and returned.
    pub async fn register_agent_tools<I, S>(&self, agent_id: &str, tool_ids: I) -> Vec<ToolId>
    where
        I: IntoIterator<Item = S>,
        S: Into<ToolId>,
    {
        let mut state = self.state.write().await;
        let mut valid = Vec::new();
        let mut skipped = Vec::new();

        for id in tool_ids.into_iter().map(Into::into) {
            if state.tools.contains_key(&id) {
                valid.push(id);
            } else {
                warn!(agent = agent_id, id = %id, "Skipping unknown tool id in agent assignment");
                skipped.push(id);
            }
        }

        let assigned = valid.len();
        state
            .agent_tools
            .entry(agent_id.to_string())
            .or_default()
            .extend(valid);
        debug!(agent = agent_id, assigned, skipped = skipped.len(), "Agent tools registered");

        skipped
    }

    /// Single-tool lookup by id, name or category
    pub async fn find_tool(&self, lookup: ToolLookup<'_>, enabled_only: bool, agent_id: Option<&str>) -> Option<Tool> {
        let state = self.state.read().await;
        match lookup {
            ToolLookup::ById(id) => state
                .tools
                .get(id)
                .map(|e| &e.tool)
                .filter(|t| state.is_visible(t, enabled_only, agent_id))
                .cloned(),
            ToolLookup::ByName(name) => state
                .by_name
                .get(name)
                .and_then(|id| state.tools.get(id))
                .map(|e| &e.tool)
                .filter(|t| state.is_visible(t, enabled_only, agent_id))
                .cloned(),
            ToolLookup::ByCategory(category) => state
                .by_category
                .get(category)?
                .iter()
                .filter_map(|id| state.tools.get(id))
                .map(|e| &e.tool)
                .find(|t| state.is_visible(t, enabled_only, agent_id))
                .cloned(),
        }
    }

    /// Filtered, priority-ordered listing of enabled tools.
    ///
    /// Category filtering is exact membership; capability filtering matches tools
    /// carrying any of the requested capabilities. Ties in priority keep
    /// registration order.
    pub async fn discover_tools(&self, filter: &ToolFilter) -> Vec<Tool> {
        let state = self.state.read().await;

        let mut ids: HashSet<&ToolId> = match &filter.agent_id {
            Some(agent) => state
                .agent_tools
                .get(agent)
                .map(|ids| ids.iter().filter(|id| state.tools.contains_key(*id)).collect())
                .unwrap_or_default(),
            None => state.tools.keys().collect(),
        };

        if let Some(categories) = non_empty(&filter.categories) {
            let allowed = RegistryState::union_of(&state.by_category, categories);
            ids.retain(|id| allowed.contains(id));
        }

        if let Some(capabilities) = non_empty(&filter.capabilities) {
            let allowed = RegistryState::union_of(&state.by_capability, capabilities);
            ids.retain(|id| allowed.contains(id));
        }

        let mut tools: Vec<&Tool> = ids
            .into_iter()
            .filter_map(|id| state.tools.get(id))
            .map(|e| &e.tool)
            .filter(|t| t.enabled)
            .collect();

        tools.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));

        if let Some(limit) = filter.limit {
            tools.truncate(limit);
        }

        debug!(
            categories = ?filter.categories,
            capabilities = ?filter.capabilities,
            agent = ?filter.agent_id,
            found = tools.len(),
            "Registry discovery"
        );

        tools.into_iter().cloned().collect()
    }

    /// Resolve by id first, then by name, returning the executor alongside
    pub async fn resolve(&self, identifier: &str) -> Option<(Tool, Arc<dyn ToolExecutor>)> {
        let state = self.state.read().await;
        let entry = state.tools.get(identifier).or_else(|| {
            state
                .by_name
                .get(identifier)
                .and_then(|id| state.tools.get(id))
        })?;
        Some((entry.tool.clone(), entry.executor.clone()))
    }

    /// Fold one execution into a tool's rolling statistics
    pub async fn record_execution(&self, id: &str, elapsed: Duration, success: bool) -> Option<ToolStats> {
        let mut state = self.state.write().await;
        let entry = state.tools.get_mut(id)?;
        entry.tool.stats.record(elapsed.as_secs_f64() * 1000.0, success);
        Some(entry.tool.stats)
    }

    /// Enable or disable a tool. Returns false if the id is unknown.
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        let mut state = self.state.write().await;
        match state.tools.get_mut(id) {
            Some(entry) => {
                entry.tool.enabled = enabled;
                entry.tool.updated_at = Utc::now();
                info!(tool = %entry.tool.name, enabled, "Tool availability changed");
                true
            }
            None => false,
        }
    }

    /// Remove a tool and every index or agent-set entry pointing at it.
    ///
    /// The name stays bound to the id, so registering the name again revives
    /// the same id.
    pub async fn unregister(&self, id: &str) -> Option<Tool> {
        let mut state = self.state.write().await;
        let entry = state.tools.remove(id)?;
        state.unindex(&entry.tool);
        for ids in state.agent_tools.values_mut() {
            ids.remove(id);
        }
        info!(tool = %entry.tool.name, id, "Tool unregistered");
        Some(entry.tool)
    }

    pub async fn get(&self, id: &str) -> Option<Tool> {
        let state = self.state.read().await;
        state.tools.get(id).map(|e| e.tool.clone())
    }

    pub async fn get_by_name(&self, name: &str) -> Option<Tool> {
        let state = self.state.read().await;
        state
            .by_name
            .get(name)
            .and_then(|id| state.tools.get(id))
            .map(|e| e.tool.clone())
    }

    /// All tools in registration order
    pub async fn list(&self) -> Vec<Tool> {
        let state = self.state.read().await;
        state.sorted_by_seq(state.tools.keys())
    }

    /// Tools assigned to an agent, in registration order
    pub async fn tools_for_agent(&self, agent_id: &str) -> Vec<Tool> {
        let state = self.state.read().await;
        match state.agent_tools.get(agent_id) {
            Some(ids) => state.sorted_by_seq(ids.iter()),
            None => Vec::new(),
        }
    }

    /// Tools owned by a registrant, in registration order
    pub async fn tools_by_registrant(&self, registrant: &str) -> Vec<Tool> {
        let state = self.state.read().await;
        match state.by_registrant.get(registrant) {
            Some(ids) => state.sorted_by_seq(ids.iter()),
            None => Vec::new(),
        }
    }

    /// Tools carrying a capability, in registration order
    pub async fn tools_with_capability(&self, capability: &str) -> Vec<Tool> {
        let state = self.state.read().await;
        match state.by_capability.get(capability) {
            Some(ids) => state.sorted_by_seq(ids.iter()),
            None => Vec::new(),
        }
    }

    /// Categories currently held by at least one tool
    pub async fn categories(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut categories: Vec<String> = state.by_category.keys().cloned().collect();
        categories.sort();
        categories
    }

    /// Capabilities currently held by at least one tool
    pub async fn capabilities(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut capabilities: Vec<String> = state.by_capability.keys().cloned().collect();
        capabilities.sort();
        capabilities
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.state.read().await.tools.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.tools.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
