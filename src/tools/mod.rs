//! Tool System - definitions, schemas, catalog loading and the registry

mod catalog;
mod definition;
mod registry;
mod schema;

pub use catalog::{CatalogEntry, ToolCatalog};
pub use definition::{Tool, ToolDescriptor, ToolId, ToolStats, ToolSummary};
pub use registry::{ToolFilter, ToolLookup, ToolRegistry};
pub use schema::{ParamSchema, ParamSpec, ParamType, SchemaViolation};
