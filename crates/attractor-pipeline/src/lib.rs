//! Pipeline execution engine, node handlers, routing, and the interview protocol.
//!
//! This crate implements the core Attractor pipeline runner: DOT graph
//! traversal, attribute-driven handler dispatch, condition-based routing,
//! the human-interview protocol, checkpoint/resume, and status-file
//! persistence.

pub mod checkpoint;
pub mod condition;
pub mod engine;
pub mod events;
pub mod graph;
pub mod handler;
pub mod handlers;
pub mod interviewer;
pub mod routing;
pub mod status_file;

pub use checkpoint::{clear_checkpoint, load_checkpoint, load_matching_checkpoint, save_checkpoint, PipelineCheckpoint};
pub use condition::{evaluate_condition, parse_condition, Clause, ConditionExpr, Operator};
pub use engine::{PipelineConfig, PipelineExecutor, PipelineResult};
pub use events::{EventEmitter, EventKind, PipelineEvent};
pub use graph::{Attribute, PipelineEdge, PipelineGraph, PipelineNode};
pub use handler::{
    default_registry, default_registry_with_interviewer, default_registry_with_provider, ConditionalHandler,
    DynHandler, ExitHandler, HandlerRegistry, NodeHandler, StartHandler,
};
pub use handlers::wait_human::WaitHumanHandler;
pub use handlers::{CodergenHandler, FanInHandler, ManagerLoopHandler, ParallelHandler, ToolHandler};
pub use interviewer::{
    Answer, AutoApproveInterviewer, ConsoleInterviewer, Interviewer, Question, QueueInterviewer,
    RecordingInterviewer, WebInterviewer,
};
pub use routing::{select_next, RoutingDecision};
pub use status_file::{read_status, write_status};
