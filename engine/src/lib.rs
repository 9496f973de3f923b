//! Agent flow execution engine: a dependency-graph interpreter that schedules node execution by
//! readiness rather than by a fixed topological order, so conditional branches and multi-source
//! fan-in are first-class instead of bolted on.
//!
//! [`scheduler::execute_agent_flow`] is the entry point. Everything else is a component it wires
//! together: [`graph`] for adjacency, [`dependency`] and [`combiner`] for fan-in, [`resolver`] for
//! variable substitution, [`executor`] for per-node dispatch, [`pruner`] for conditional branch
//! skipping, [`store`] for checkpoint persistence and resume, and [`events`] for streaming.

pub mod combiner;
pub mod dependency;
pub mod error;
pub mod events;
pub mod executor;
pub mod graph;
pub mod logging;
pub mod model;
pub mod pruner;
pub mod resolver;
pub mod scheduler;
pub mod store;

pub use error::EngineError;
pub use executor::{ApiOverride, ExecutorOutcome, FlowNodeImpl, NodeCallContext, NodeExecutor, NodeRegistry, RunParams};
pub use graph::FlowGraph;
pub use model::{
    ChatMessage, Checkpoint, CheckpointEntry, Condition, Execution, FlowEdge, FlowNode,
    FlowStatus, InputParam, NodeOutput,
};
pub use scheduler::{execute_agent_flow, ExecuteParams, FlowInput, FlowResult, HumanInput};
pub use store::{
    ChatMessageRecord, ChatMessageStore, ExecutionStore, MemoryChatMessageStore,
    MemoryExecutionStore, NullChatMessageStore,
};
