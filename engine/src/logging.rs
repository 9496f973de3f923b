//! Structured logging for scheduler execution events.

use crate::error::EngineError;
use crate::model::FlowStatus;

pub fn log_node_start(node_id: &str) {
    tracing::debug!(node_id = node_id, "starting node execution");
}

pub fn log_node_complete(node_id: &str, status: FlowStatus) {
    tracing::debug!(node_id = node_id, ?status, "node execution complete");
}

/// Logs the aggregated input a node is about to run with, so each node execution logs the state
/// it saw.
pub fn log_node_state(node_id: &str, data: &serde_json::Value) {
    tracing::debug!(node_id = node_id, data = ?data, "node execution: state");
}

pub fn log_state_update(node_id: &str) {
    tracing::debug!(node_id = node_id, "runtime state updated");
}

pub fn log_checkpoint_append(node_id: &str, len: usize) {
    tracing::debug!(node_id = node_id, checkpoint_len = len, "checkpoint entry appended");
}

pub fn log_waiting_ready(node_id: &str) {
    tracing::debug!(node_id = node_id, "waiting node became ready");
}

pub fn log_branch_pruned(decision_node_id: &str, skipped: usize) {
    tracing::debug!(
        decision_node_id = decision_node_id,
        skipped,
        "branch pruner skipped successors"
    );
}

pub fn log_loop_iteration(loop_node_id: &str, count: u32, max: u32) {
    tracing::debug!(loop_node_id = loop_node_id, count, max, "loop re-enqueue");
}

pub fn log_resume(execution_id: &str, start_node_id: &str) {
    tracing::info!(execution_id, start_node_id, "resuming stopped execution");
}

pub fn log_graph_start(agentflow_id: &str, session_id: &str) {
    tracing::info!(agentflow_id, session_id, "starting flow execution");
}

pub fn log_graph_complete(status: FlowStatus) {
    tracing::info!(?status, "flow execution complete");
}

pub fn log_graph_error(error: &EngineError) {
    tracing::error!(error = %error, "flow execution error");
}
