//! Event Streamer (§4.9): four kinds of fire-and-forget emissions keyed by `chatId`.
//!
//! Built on the shared `stream-event` wire protocol (`ProtocolEvent` + envelope injection) rather
//! than a hand-rolled format, so a host process can multiplex agent-flow events with the
//! LangGraph-style events emitted by other runners on the same connection.

use crate::model::{Checkpoint, FlowStatus};
use serde_json::Value;
use std::sync::Mutex;
use stream_event::{to_json, EnvelopeState, ProtocolEvent};
use tokio::sync::mpsc::UnboundedSender;

/// A thin sink. All emissions are fire-and-forget; a disconnected client is not an engine error.
pub trait EventStreamer: Send + Sync {
    fn next_agent_flow_event(
        &self,
        node_id: &str,
        node_label: &str,
        status: FlowStatus,
        error: Option<&str>,
    );
    fn agent_flow_executed_data_event(&self, checkpoint: &Checkpoint);
    fn agent_flow_event(&self, status: FlowStatus);
    fn action_event(&self, action: &Value);
}

fn status_str(status: FlowStatus) -> &'static str {
    match status {
        FlowStatus::InProgress => "INPROGRESS",
        FlowStatus::Finished => "FINISHED",
        FlowStatus::Stopped => "STOPPED",
        FlowStatus::Error => "ERROR",
        FlowStatus::Terminated => "TERMINATED",
    }
}

/// Recursively removes every occurrence of `key` from a JSON value, regardless of nesting depth.
/// Used to strip `FLOWISE_CREDENTIAL_ID` from every emitted payload (§6, §8 invariants).
pub fn strip_key_recursive(value: &mut Value, key: &str) {
    match value {
        Value::Object(map) => {
            map.remove(key);
            for v in map.values_mut() {
                strip_key_recursive(v, key);
            }
        }
        Value::Array(items) => {
            for v in items {
                strip_key_recursive(v, key);
            }
        }
        _ => {}
    }
}

const CREDENTIAL_KEY: &str = "FLOWISE_CREDENTIAL_ID";

/// Channel-backed event streamer. Sends are best-effort (`send` on an unbounded channel never
/// blocks the scheduler; a closed receiver is silently ignored).
pub struct ChannelEventStreamer {
    sender: UnboundedSender<Value>,
    envelope: Mutex<EnvelopeState>,
}

impl ChannelEventStreamer {
    pub fn new(session_id: String, sender: UnboundedSender<Value>) -> Self {
        Self {
            sender,
            envelope: Mutex::new(EnvelopeState::new(session_id)),
        }
    }

    fn emit(&self, event: ProtocolEvent) {
        let mut envelope = self.envelope.lock().expect("envelope mutex poisoned");
        let Ok(mut value) = to_json(&event, &mut envelope) else {
            return;
        };
        strip_key_recursive(&mut value, CREDENTIAL_KEY);
        let _ = self.sender.send(value);
    }
}

impl EventStreamer for ChannelEventStreamer {
    fn next_agent_flow_event(
        &self,
        node_id: &str,
        node_label: &str,
        status: FlowStatus,
        error: Option<&str>,
    ) {
        self.emit(ProtocolEvent::AgentFlowNext {
            node_id: node_id.to_string(),
            node_label: node_label.to_string(),
            status: status_str(status).to_string(),
            error: error.map(String::from),
        });
    }

    fn agent_flow_executed_data_event(&self, checkpoint: &Checkpoint) {
        let Ok(execution_data) = serde_json::to_value(checkpoint) else {
            return;
        };
        self.emit(ProtocolEvent::AgentFlowExecutedData { execution_data });
    }

    fn agent_flow_event(&self, status: FlowStatus) {
        self.emit(ProtocolEvent::AgentFlowStatus {
            status: status_str(status).to_string(),
        });
    }

    fn action_event(&self, action: &Value) {
        let id = action
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let mapping = action.get("mapping").cloned().unwrap_or(Value::Null);
        let elements = action.get("elements").cloned().unwrap_or(Value::Null);
        let data = action.get("data").cloned().unwrap_or(Value::Null);
        self.emit(ProtocolEvent::AgentFlowAction {
            id,
            mapping,
            elements,
            data,
        });
    }
}

/// No-op streamer for callers that don't want streaming (e.g. a pure batch run).
pub struct NullEventStreamer;

impl EventStreamer for NullEventStreamer {
    fn next_agent_flow_event(&self, _: &str, _: &str, _: FlowStatus, _: Option<&str>) {}
    fn agent_flow_executed_data_event(&self, _: &Checkpoint) {}
    fn agent_flow_event(&self, _: FlowStatus) {}
    fn action_event(&self, _: &Value) {}
}
