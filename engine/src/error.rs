//! Engine error kinds (§7). Kinds map 1:1 to the table in the specification; the scheduler
//! decides how each is surfaced (terminal status vs. thrown before scheduling).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("aborted")]
    Aborted,

    #[error("both question and form were supplied for node {node_id}")]
    BadInput { node_id: String },

    #[error("node {node_id} failed: {message}")]
    NodeExecution { node_id: String, message: String },

    #[error("failed to resolve reference `{reference}` in node {node_id}")]
    Resolve { node_id: String, reference: String },

    #[error("cannot resume execution {execution_id}: state is not STOPPED")]
    InvalidResume { execution_id: String },

    #[error("resume node {node_id} not present in checkpoint")]
    NodeNotInCheckpoint { node_id: String },

    #[error("scheduler exceeded MAX_ITERATIONS ({limit})")]
    IterationLimit { limit: u32 },

    #[error("no start node declares a startInputType")]
    StartInput,

    #[error("malformed flow graph: {0}")]
    Graph(String),
}

impl EngineError {
    /// True for kinds that must be rejected before any scheduling begins (§7: "thrown to caller
    /// before scheduling"), as opposed to kinds surfaced as a terminal checkpoint entry.
    pub fn is_pre_scheduling(&self) -> bool {
        matches!(
            self,
            EngineError::BadInput { .. }
                | EngineError::InvalidResume { .. }
                | EngineError::NodeNotInCheckpoint { .. }
                | EngineError::StartInput
                | EngineError::Graph(_)
        )
    }
}
