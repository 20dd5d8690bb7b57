//! Tool and execution-environment collaborator contract for Attractor handlers.
//!
//! Not part of the runner's core logic: a handler that shells out or touches
//! the filesystem may do so through a `Tool` registered in a `ToolRegistry`
//! and an `ExecutionEnvironment` implementation it supplies itself. No
//! backing environment is mandated here.

pub mod environment;
pub mod tool;

pub use environment::{DirEntry, ExecResult, ExecutionEnvironment, GrepOptions};
pub use tool::{Tool, ToolDefinition, ToolRegistry};
