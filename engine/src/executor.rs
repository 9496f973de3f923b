//! Node Executor (§4.5): dispatches to a node's implementation, marshals inputs, captures output.

use crate::error::EngineError;
use crate::model::{Checkpoint, ChatMessage, FlowNode, NodeOutput, HUMAN_INPUT_NODE};
use crate::resolver::{self, Namespaces};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Contract a node implementation fulfills. The engine does not otherwise introspect it (§6).
#[async_trait]
pub trait FlowNodeImpl: Send + Sync {
    async fn run(
        &self,
        resolved_node_data: Value,
        final_input: Value,
        run_params: &RunParams,
    ) -> Result<NodeOutput, EngineError>;
}

/// Resolves a node's logical name to its implementation. Implementations are owned by the
/// external node registry; the engine holds only weak references (§3 Ownership).
pub trait NodeRegistry: Send + Sync {
    fn resolve(&self, logical_name: &str) -> Option<Arc<dyn FlowNodeImpl>>;
}

/// Parameters made available to a node body on every invocation.
pub struct RunParams<'a> {
    pub chat_id: &'a str,
    pub session_id: &'a str,
    pub human_input: Option<&'a Value>,
    pub is_last_node: bool,
    pub cancellation: &'a CancellationToken,
}

/// Per-node-name allowlisted API override configuration.
#[derive(Default)]
pub struct ApiOverride {
    pub enabled: bool,
    pub allowlist: HashSet<String>,
    pub config: HashMap<String, HashMap<String, Value>>,
}

impl ApiOverride {
    /// Applies allowlisted field overrides for `node_name` onto `input_values`, in place.
    fn apply(&self, node_name: &str, input_values: &mut HashMap<String, Value>) {
        if !self.enabled || !self.allowlist.contains(node_name) {
            return;
        }
        if let Some(fields) = self.config.get(node_name) {
            for (field, value) in fields {
                input_values.insert(field.clone(), value.clone());
            }
        }
    }

    /// Flattens every node's override fields into one map, for exposure under `$flow` (§4.2:
    /// "plus override config fields"). Node names are visited in sorted order so the merge is
    /// deterministic; a field declared for more than one node has no defined winner beyond that
    /// order.
    pub fn flattened_fields(&self) -> serde_json::Map<String, Value> {
        let mut out = serde_json::Map::new();
        let mut node_names: Vec<&String> = self.config.keys().collect();
        node_names.sort();
        for node_name in node_names {
            if let Some(fields) = self.config.get(node_name) {
                for (field, value) in fields {
                    out.insert(field.clone(), value.clone());
                }
            }
        }
        out
    }
}

/// Everything the executor needs to resolve and dispatch one node call. Predecessor-aggregated
/// input (built by the Input Combiner) is `None` only for nodes with no predecessors, where the
/// entry-level question/form is used instead.
pub struct NodeCallContext<'a> {
    pub node: &'a FlowNode,
    pub has_successors: bool,
    pub combined_predecessor_input: Option<&'a Value>,
    pub question: &'a str,
    pub file_attachment: Option<&'a str>,
    pub form: Option<&'a Value>,
    pub chat_history: &'a [ChatMessage],
    pub vars: &'a Value,
    pub flow_config: &'a Value,
    pub checkpoint: &'a Checkpoint,
    pub override_config: &'a ApiOverride,
    pub human_input: Option<&'a Value>,
    pub is_resume_call_for_this_node: bool,
    pub chat_id: &'a str,
    pub session_id: &'a str,
}

/// Outcome of one executor call.
pub enum ExecutorOutcome {
    Ran(NodeOutput),
    /// The node is `humanInputAgentflow` and no `humanInput` was supplied on this call.
    AwaitingHumanInput(NodeOutput),
}

pub struct NodeExecutor {
    registry: Arc<dyn NodeRegistry>,
}

impl NodeExecutor {
    pub fn new(registry: Arc<dyn NodeRegistry>) -> Self {
        Self { registry }
    }

    /// Runs one node call per the responsibilities in §4.5.
    pub async fn execute(
        &self,
        ctx: NodeCallContext<'_>,
        cancellation: &CancellationToken,
    ) -> Result<ExecutorOutcome, EngineError> {
        if cancellation.is_cancelled() {
            return Err(EngineError::Aborted);
        }

        // Deep-copy declared input values, apply override configuration.
        let mut input_values = ctx.node.input_values.clone();
        ctx.override_config.apply(&ctx.node.name, &mut input_values);

        // Resolve variables for every parameter whose declared acceptVariable is true.
        let accept_variable: HashSet<&str> = ctx
            .node
            .inputs
            .iter()
            .filter(|p| p.accept_variable)
            .map(|p| p.name.as_str())
            .collect();
        let namespaces = Namespaces {
            question: ctx.question,
            file_attachment: ctx.file_attachment,
            chat_history: ctx.chat_history,
            form: ctx.form.unwrap_or(&Value::Null),
            vars: ctx.vars,
            flow: ctx.flow_config,
            checkpoint: ctx.checkpoint,
        };
        let mut resolved = serde_json::Map::with_capacity(input_values.len());
        for (name, value) in input_values {
            let resolved_value = if accept_variable.contains(name.as_str()) {
                resolver::resolve_value(&value, &ctx.node.id, &namespaces)?
            } else {
                value
            };
            resolved.insert(name, resolved_value);
        }
        let resolved_node_data = Value::Object(resolved);

        // isLastNode: no successors, or a human-input node pausing (not resuming) this call.
        let is_last_node = !ctx.has_successors
            || (ctx.node.name == HUMAN_INPUT_NODE && !ctx.is_resume_call_for_this_node);

        let final_input = assemble_final_input(
            ctx.combined_predecessor_input,
            ctx.question,
            ctx.file_attachment,
            ctx.form,
            &ctx.node.id,
        )?;

        let run_params = RunParams {
            chat_id: ctx.chat_id,
            session_id: ctx.session_id,
            human_input: ctx.human_input,
            is_last_node,
            cancellation,
        };

        let implementation = self.registry.resolve(&ctx.node.name).ok_or_else(|| {
            EngineError::NodeExecution {
                node_id: ctx.node.id.clone(),
                message: format!("no implementation registered for {}", ctx.node.name),
            }
        })?;

        // Race the node body against the abort signal: node implementations receive the
        // token themselves (honor-at-best), but the engine also enforces it at this boundary
        // so a non-cooperative node body cannot block cancellation indefinitely.
        let output = tokio::select! {
            biased;
            _ = cancellation.cancelled() => return Err(EngineError::Aborted),
            result = implementation.run(resolved_node_data, final_input, &run_params) => result,
        }
        .map_err(|e| match e {
            EngineError::Aborted => EngineError::Aborted,
            EngineError::NodeExecution { .. } => e,
            other => EngineError::NodeExecution {
                node_id: ctx.node.id.clone(),
                message: other.to_string(),
            },
        })?;

        if ctx.node.name == HUMAN_INPUT_NODE && ctx.human_input.is_none() {
            let mut output = output;
            output.human_input_action = Some(serde_json::json!({
                "id": ctx.node.id,
                "mapping": { "approve": "proceed", "reject": "stop" },
                "elements": ["approve", "reject"],
                "data": Value::Null,
            }));
            return Ok(ExecutorOutcome::AwaitingHumanInput(output));
        }

        Ok(ExecutorOutcome::Ran(output))
    }
}

/// question+uploaded-content, or form — mutually exclusive. Only enforced when there is no
/// predecessor-aggregated input (i.e. this node has no predecessors).
fn assemble_final_input(
    combined_predecessor_input: Option<&Value>,
    question: &str,
    file_attachment: Option<&str>,
    form: Option<&Value>,
    node_id: &str,
) -> Result<Value, EngineError> {
    if let Some(combined) = combined_predecessor_input {
        return Ok(combined.clone());
    }

    let has_question = !question.is_empty();
    let has_form = form.map(|f| !f.is_null()).unwrap_or(false);

    if has_question && has_form {
        return Err(EngineError::BadInput {
            node_id: node_id.to_string(),
        });
    }

    if has_form {
        return Ok(form.cloned().unwrap_or(Value::Null));
    }

    let text = match file_attachment {
        Some(content) if !content.is_empty() => format!("{content}\n{question}"),
        _ => question.to_string(),
    };
    Ok(serde_json::json!({ "json": { "text": text } }))
}
