//! toolhub - a tool orchestration layer for agent platforms
//!
//! Registers and indexes tools, recommends and discovers candidates for an intent,
//! dispatches validated executions, and serves identical requests from one coalesced,
//! cached computation.

pub mod cache;
pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod id;
pub mod logging;
pub mod oracle;
pub mod orchestrator;
pub mod recommend;
pub mod tools;

pub use cache::{CacheStats, ResponseCache};
pub use config::Config;
pub use discovery::{DiscoveryFacade, DiscoveryQuery};
pub use dispatch::{Dispatcher, ErrorKind, ExecutionContext, ExecutionOutcome, FnExecutor, ToolExecutor};
pub use error::{OrchestratorError, Result, SharedError};
pub use oracle::{OracleError, RankingOracle, ScriptedOracle, SimilarityOracle};
pub use orchestrator::{OrchestrationRequest, OrchestrationResponse, Orchestrator, OrchestratorBuilder};
pub use recommend::{Recommendation, RecommendationEngine};
pub use tools::{ParamSpec, ParamType, Tool, ToolCatalog, ToolDescriptor, ToolFilter, ToolId, ToolLookup, ToolRegistry};
