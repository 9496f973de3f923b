//! Core data model: nodes, edges, the flow graph, and per-execution runtime records.
//!
//! Mirrors the shapes a flow definition is parsed into and the bookkeeping the scheduler
//! carries while driving one execution.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Annotation nodes, never executed.
pub const STICKY_NOTE: &str = "stickyNoteAgentflow";
/// The node a fresh execution's ready queue is seeded from.
pub const START_NODE: &str = "startAgentflow";
/// A node whose output can name an earlier node id to re-enqueue.
pub const LOOP_NODE: &str = "loopAgentflow";
/// A decision-set node that pauses the flow for caller-supplied input.
pub const HUMAN_INPUT_NODE: &str = "humanInputAgentflow";
pub const CONDITION_NODE: &str = "conditionAgentflow";
pub const CONDITION_AGENT_NODE: &str = "conditionAgentAgentflow";

/// Logical names whose output can prune successor edges (§4.6). Kept in one place to permit
/// extension.
pub const DECISION_SET: [&str; 3] = [CONDITION_NODE, CONDITION_AGENT_NODE, HUMAN_INPUT_NODE];

pub fn is_decision_node(logical_name: &str) -> bool {
    DECISION_SET.contains(&logical_name)
}

/// A declared input parameter on a node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InputParam {
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    pub accept_variable: bool,
}

/// A node in the flow graph: identifier, logical name (discriminator for type), display label,
/// declared input parameters, concrete input values, and an opaque implementation reference.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: String,
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub inputs: Vec<InputParam>,
    #[serde(default)]
    pub input_values: HashMap<String, Value>,
    /// Set on a start node that declares what kind of input it accepts (e.g. `"chatInput"`,
    /// `"formInput"`). A fresh run is rejected with `StartInput` unless at least one indegree-0
    /// node declares one (§6).
    #[serde(default)]
    pub start_input_type: Option<String>,
}

impl FlowNode {
    pub fn is_sticky_note(&self) -> bool {
        self.name == STICKY_NOTE
    }

    pub fn declares_start_input(&self) -> bool {
        self.start_input_type.is_some()
    }

    pub fn is_decision(&self) -> bool {
        is_decision_node(&self.name)
    }

    pub fn is_loop(&self) -> bool {
        self.name == LOOP_NODE
    }

    pub fn is_human_input(&self) -> bool {
        self.name == HUMAN_INPUT_NODE
    }
}

/// A directed edge. `source_handle` has shape `"<nodeId>-output-<index>"`; the index routes
/// conditional branches.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlowEdge {
    pub source: String,
    pub source_handle: String,
    pub target: String,
    pub target_handle: String,
}

impl FlowEdge {
    /// First numeric token found after splitting the source handle on `-`; default 0.
    pub fn source_index(&self) -> u32 {
        self.source_handle
            .split('-')
            .find_map(|tok| tok.parse::<u32>().ok())
            .unwrap_or(0)
    }
}

/// Execution lifecycle / checkpoint entry status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowStatus {
    #[serde(rename = "INPROGRESS")]
    InProgress,
    #[serde(rename = "FINISHED")]
    Finished,
    #[serde(rename = "STOPPED")]
    Stopped,
    #[serde(rename = "ERROR")]
    Error,
    #[serde(rename = "TERMINATED")]
    Terminated,
}

impl FlowStatus {
    /// Precedence for computing the final status over all checkpoint entries:
    /// TERMINATED > ERROR > STOPPED > FINISHED.
    fn precedence(self) -> u8 {
        match self {
            FlowStatus::Terminated => 3,
            FlowStatus::Error => 2,
            FlowStatus::Stopped => 1,
            FlowStatus::Finished => 0,
            FlowStatus::InProgress => 0,
        }
    }
}

/// Reduces a set of checkpoint-entry statuses to the final flow status per the precedence rule.
pub fn final_status<'a>(statuses: impl IntoIterator<Item = &'a FlowStatus>) -> FlowStatus {
    statuses
        .into_iter()
        .copied()
        .max_by_key(|s| s.precedence())
        .unwrap_or(FlowStatus::Finished)
}

/// A node's full, free-form output. Recognized fields are read by the scheduler (§4.5); anything
/// else passes through untouched in `extra`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeOutput {
    #[serde(default)]
    pub state: Option<Value>,
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
    #[serde(default)]
    pub form: Option<Value>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub max_loop_count: Option<u32>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub human_input_action: Option<Value>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub is_fullfilled: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Per-unready-target-node bookkeeping used by the scheduler to decide dispatch readiness.
#[derive(Clone, Debug, Default)]
pub struct WaitingNodeRecord {
    pub node_id: String,
    pub received_inputs: HashMap<String, NodeOutput>,
    pub expected_inputs: std::collections::HashSet<String>,
    pub conditional_groups: HashMap<String, Vec<String>>,
}

impl WaitingNodeRecord {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            received_inputs: HashMap::new(),
            expected_inputs: Default::default(),
            conditional_groups: HashMap::new(),
        }
    }

    /// All unconditional predecessors delivered, AND for every conditional group at least one
    /// predecessor in that group delivered.
    pub fn is_ready(&self) -> bool {
        let expected_met = self
            .expected_inputs
            .iter()
            .all(|p| self.received_inputs.contains_key(p));
        let conditional_met = self.conditional_groups.values().all(|group| {
            group
                .iter()
                .any(|p| self.received_inputs.contains_key(p))
        });
        expected_met && conditional_met
    }
}

/// A pending dispatch: node id plus the aggregated input built from received predecessor outputs.
#[derive(Clone, Debug)]
pub struct ReadyQueueEntry {
    pub node_id: String,
    pub data: Value,
    pub inputs: HashMap<String, NodeOutput>,
}

/// Mutable per-execution scratch shared across node invocations.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RuntimeState {
    pub state: Value,
    #[serde(default)]
    pub form: Value,
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
}

impl RuntimeState {
    pub fn new() -> Self {
        Self {
            state: Value::Object(Default::default()),
            form: Value::Object(Default::default()),
            chat_history: Vec::new(),
        }
    }
}

/// One entry of the durable checkpoint record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub node_id: String,
    pub node_label: String,
    pub data: NodeOutput,
    pub previous_node_ids: Vec<String>,
    pub status: FlowStatus,
}

/// The ordered checkpoint: `AgentFlowExecutedData` in the spec's terms.
pub type Checkpoint = Vec<CheckpointEntry>;

/// Persisted row describing one flow execution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub agentflow_id: String,
    pub session_id: String,
    pub state: FlowStatus,
    pub execution_data: Checkpoint,
    pub created_date: String,
    pub stopped_date: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_index_parses_numeric_suffix() {
        let e = FlowEdge {
            source: "llm_0".into(),
            source_handle: "llm_0-output-3".into(),
            target: "llm_1".into(),
            target_handle: "llm_1-input-0".into(),
        };
        assert_eq!(e.source_index(), 3);
    }

    #[test]
    fn source_index_defaults_to_zero_without_numeric_token() {
        let e = FlowEdge {
            source: "llm_0".into(),
            source_handle: "llm_0-output".into(),
            target: "llm_1".into(),
            target_handle: "llm_1-input-0".into(),
        };
        assert_eq!(e.source_index(), 0);
    }

    #[test]
    fn decision_set_contains_expected_names() {
        assert!(is_decision_node("conditionAgentflow"));
        assert!(is_decision_node("conditionAgentAgentflow"));
        assert!(is_decision_node("humanInputAgentflow"));
        assert!(!is_decision_node("llmAgentflow"));
    }

    #[test]
    fn waiting_record_ready_requires_all_expected_and_one_per_conditional_group() {
        let mut w = WaitingNodeRecord::new("merge");
        w.expected_inputs.insert("a".into());
        w.conditional_groups
            .insert("cond".into(), vec!["b".into(), "c".into()]);
        assert!(!w.is_ready());

        w.received_inputs.insert("a".into(), NodeOutput::default());
        assert!(!w.is_ready());

        w.received_inputs.insert("b".into(), NodeOutput::default());
        assert!(w.is_ready());
    }

    #[test]
    fn final_status_follows_precedence() {
        use FlowStatus::*;
        assert_eq!(
            final_status(&[Finished, Stopped, Error, Terminated]),
            Terminated
        );
        assert_eq!(final_status(&[Finished, Stopped, Error]), Error);
        assert_eq!(final_status(&[Finished, Stopped]), Stopped);
        assert_eq!(final_status(&[Finished]), Finished);
        assert_eq!(final_status(Vec::<&FlowStatus>::new()), Finished);
    }
}
