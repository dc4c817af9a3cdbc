//! Execution dispatch - parameter validation, guarded invocation, statistics

mod dispatcher;
mod executor;

pub use dispatcher::{Dispatcher, ErrorKind, ExecutionError, ExecutionOutcome, ToolCall};
pub use executor::{ExecutionContext, FnExecutor, ToolExecutor};
