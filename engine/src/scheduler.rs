//! Scheduler Loop (§4.7): pops ready nodes, drives the Executor, feeds outputs back into
//! dependency tracking, enforces iteration and loop-count limits, and aggregates the final
//! status. This is the engine's single entry point, `execute_agent_flow`.

use crate::combiner;
use crate::dependency;
use crate::error::EngineError;
use crate::events::EventStreamer;
use crate::executor::{ApiOverride, NodeCallContext, NodeExecutor, NodeRegistry, ExecutorOutcome};
use crate::graph::FlowGraph;
use crate::logging;
use crate::model::{
    final_status, Checkpoint, CheckpointEntry, FlowStatus, NodeOutput, ReadyQueueEntry,
    RuntimeState, WaitingNodeRecord, LOOP_NODE,
};
use crate::store::{ChatMessageStore, ExecutionStore, API_MESSAGE_ROLE, USER_MESSAGE_ROLE};
use flow_config::EngineLimits;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The incoming request to run or resume a flow (§6 Entry point).
#[derive(Clone, Debug, Default)]
pub struct FlowInput {
    pub question: Option<String>,
    pub form: Option<Value>,
    pub human_input: Option<HumanInput>,
    /// Text content of each uploaded file, in reference order; resolved as a single
    /// newline-joined `file_attachment` blob (§11).
    pub uploads_text: Vec<String>,
    pub session_id: Option<String>,
    pub lead_email: Option<String>,
    pub is_internal: bool,
    /// Id of the chat-message row this run's `apiMessage` reply is persisted against (§6).
    pub api_message_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct HumanInput {
    pub start_node_id: String,
    pub feedback: Option<String>,
}

/// Everything a run needs beyond the input payload.
pub struct ExecuteParams<'a> {
    pub graph: &'a FlowGraph,
    pub input: FlowInput,
    pub chat_id: String,
    pub agentflow_id: String,
    pub registry: Arc<dyn NodeRegistry>,
    pub store: Arc<dyn ExecutionStore>,
    pub chat_message_store: Arc<dyn ChatMessageStore>,
    pub events: Arc<dyn EventStreamer>,
    pub vars: Value,
    pub override_config: ApiOverride,
    pub limits: EngineLimits,
    pub cancellation: CancellationToken,
}

/// Result of `executeAgentFlow` (§6).
#[derive(Clone, Debug)]
pub struct FlowResult {
    pub text: String,
    pub question: Option<String>,
    pub form: Value,
    pub chat_id: String,
    pub execution_id: String,
    pub session_id: Option<String>,
    pub lead_email: Option<String>,
    pub agent_flow_executed_data: Checkpoint,
}

enum LoopExit {
    QueueDrained,
    HumanPause,
    Aborted,
    IterationLimit,
    NodeError(EngineError),
}

/// Runs (or resumes) a flow to completion, pause, error, or cancellation.
pub async fn execute_agent_flow(params: ExecuteParams<'_>) -> Result<FlowResult, EngineError> {
    let ExecuteParams {
        graph,
        input,
        chat_id,
        agentflow_id,
        registry,
        store,
        chat_message_store,
        events,
        vars,
        override_config,
        limits,
        cancellation,
    } = params;

    let session_id = input.session_id.clone().unwrap_or_default();
    let executor = NodeExecutor::new(registry);

    let mut runtime = RuntimeState::new();
    let mut queue: VecDeque<ReadyQueueEntry> = VecDeque::new();
    let mut waiting_nodes: HashMap<String, WaitingNodeRecord> = HashMap::new();
    let mut loop_counts: HashMap<String, u32> = HashMap::new();
    let mut current_human_input = input.human_input.clone();

    let (execution_id, mut checkpoint): (String, Checkpoint) = if let Some(humaninput) =
        current_human_input.clone()
    {
        let existing = store
            .latest_by_session(&agentflow_id, &session_id)
            .await?
            .ok_or_else(|| EngineError::InvalidResume {
                execution_id: String::new(),
            })?;
        if existing.state != FlowStatus::Stopped {
            return Err(EngineError::InvalidResume {
                execution_id: existing.id,
            });
        }
        let mut cp = existing.execution_data.clone();
        let entry_index = cp
            .iter()
            .position(|e| e.node_id == humaninput.start_node_id)
            .ok_or_else(|| EngineError::NodeNotInCheckpoint {
                node_id: humaninput.start_node_id.clone(),
            })?;

        if let Some(state) = cp
            .last()
            .and_then(|e| e.data.state.clone())
        {
            runtime.state = state;
        }

        logging::log_resume(&existing.id, &humaninput.start_node_id);

        // Atomic drop-then-seed: remove the stale STOPPED entry and seed the queue for the
        // same node id in the same synchronous step (Open Question 1).
        cp.remove(entry_index);
        queue.push_back(ReadyQueueEntry {
            node_id: humaninput.start_node_id.clone(),
            data: Value::Null,
            inputs: HashMap::new(),
        });

        store.update(&existing.id, Some(FlowStatus::InProgress), None).await?;
        chat_message_store.clear_latest_action(&chat_id).await?;
        (existing.id, cp)
    } else {
        if !graph.has_declared_start_input() {
            return Err(EngineError::StartInput);
        }
        let has_question = input.question.as_deref().map(|q| !q.is_empty()).unwrap_or(false);
        let has_form = input.form.as_ref().map(|f| !f.is_null()).unwrap_or(false);
        if has_question && has_form {
            return Err(EngineError::BadInput {
                node_id: graph.starting_nodes().join(","),
            });
        }
        let execution = store.create(&agentflow_id, &session_id, vec![]).await?;
        let user_message_content = if has_form {
            input.form.clone().unwrap_or(Value::Null).to_string()
        } else {
            input.question.clone().unwrap_or_default()
        };
        chat_message_store
            .append(&chat_id, USER_MESSAGE_ROLE, &user_message_content, None)
            .await?;
        for start_node in graph.starting_nodes() {
            queue.push_back(ReadyQueueEntry {
                node_id: start_node,
                data: Value::Null,
                inputs: HashMap::new(),
            });
        }
        (execution.id, Vec::new())
    };

    logging::log_graph_start(&agentflow_id, &session_id);
    events.agent_flow_event(FlowStatus::InProgress);

    let question = input.question.clone().unwrap_or_default();
    // Multiple uploaded files resolve as a single concatenated blob, in reference order (§11).
    let file_attachment = if input.uploads_text.is_empty() {
        None
    } else {
        Some(input.uploads_text.join("\n"))
    };
    let mut iterations: u32 = 0;
    let exit: LoopExit;

    'scheduler: loop {
        if queue.is_empty() {
            exit = LoopExit::QueueDrained;
            break 'scheduler;
        }
        if cancellation.is_cancelled() {
            exit = LoopExit::Aborted;
            break 'scheduler;
        }
        if iterations >= limits.max_iterations {
            exit = LoopExit::IterationLimit;
            break 'scheduler;
        }
        iterations += 1;

        let entry = queue.pop_front().expect("checked non-empty above");
        let Some(node) = graph.node(&entry.node_id).cloned() else {
            continue;
        };
        if node.is_sticky_note() {
            continue;
        }

        logging::log_node_start(&node.id);
        events.next_agent_flow_event(&node.id, &node.label, FlowStatus::InProgress, None);

        let has_successors = !graph.successors(&node.id).is_empty();
        let flow_config = build_flow_config(
            &agentflow_id,
            &chat_id,
            &session_id,
            &runtime,
            input.is_internal,
            input.lead_email.as_deref(),
            input.api_message_id.as_deref(),
            &override_config,
        );
        logging::log_node_state(&node.id, &entry.data);
        let human_input_value = current_human_input.as_ref().map(|h| {
            serde_json::json!({
                "startNodeId": h.start_node_id,
                "feedback": h.feedback,
            })
        });
        let is_resume_call_for_this_node = current_human_input
            .as_ref()
            .map(|h| h.start_node_id == node.id)
            .unwrap_or(false);
        let combined_input = if entry.data.is_null() && entry.inputs.is_empty() {
            None
        } else {
            Some(&entry.data)
        };

        let ctx = NodeCallContext {
            node: &node,
            has_successors,
            combined_predecessor_input: combined_input,
            question: &question,
            file_attachment: file_attachment.as_deref(),
            form: input.form.as_ref(),
            chat_history: &runtime.chat_history,
            vars: &vars,
            flow_config: &flow_config,
            checkpoint: &checkpoint,
            override_config: &override_config,
            human_input: human_input_value.as_ref(),
            is_resume_call_for_this_node,
            chat_id: &chat_id,
            session_id: &session_id,
        };

        match executor.execute(ctx, &cancellation).await {
            Err(EngineError::Aborted) => {
                checkpoint.push(CheckpointEntry {
                    node_id: node.id.clone(),
                    node_label: node.label.clone(),
                    data: NodeOutput::default(),
                    previous_node_ids: graph.predecessors(&node.id).to_vec(),
                    status: FlowStatus::Terminated,
                });
                events.next_agent_flow_event(&node.id, &node.label, FlowStatus::Terminated, None);
                events.agent_flow_executed_data_event(&checkpoint);
                exit = LoopExit::Aborted;
                break 'scheduler;
            }
            Err(other) => {
                checkpoint.push(CheckpointEntry {
                    node_id: node.id.clone(),
                    node_label: node.label.clone(),
                    data: NodeOutput::default(),
                    previous_node_ids: graph.predecessors(&node.id).to_vec(),
                    status: FlowStatus::Error,
                });
                events.next_agent_flow_event(
                    &node.id,
                    &node.label,
                    FlowStatus::Error,
                    Some(&other.to_string()),
                );
                events.agent_flow_executed_data_event(&checkpoint);
                exit = LoopExit::NodeError(other);
                break 'scheduler;
            }
            Ok(ExecutorOutcome::AwaitingHumanInput(output)) => {
                if let Some(action) = &output.human_input_action {
                    events.action_event(action);
                }
                checkpoint.push(CheckpointEntry {
                    node_id: node.id.clone(),
                    node_label: node.label.clone(),
                    data: output,
                    previous_node_ids: graph.predecessors(&node.id).to_vec(),
                    status: FlowStatus::Stopped,
                });
                events.next_agent_flow_event(&node.id, &node.label, FlowStatus::Stopped, None);
                events.agent_flow_executed_data_event(&checkpoint);
                exit = LoopExit::HumanPause;
                break 'scheduler;
            }
            Ok(ExecutorOutcome::Ran(output)) => {
                current_human_input = None;

                apply_runtime_updates(&mut runtime, &output);

                checkpoint.push(CheckpointEntry {
                    node_id: node.id.clone(),
                    node_label: node.label.clone(),
                    data: output.clone(),
                    previous_node_ids: graph.predecessors(&node.id).to_vec(),
                    status: FlowStatus::Finished,
                });
                logging::log_checkpoint_append(&node.id, checkpoint.len());
                events.next_agent_flow_event(&node.id, &node.label, FlowStatus::Finished, None);
                events.agent_flow_executed_data_event(&checkpoint);

                let skip = crate::pruner::pruned_successors(graph, &node, &output);
                if !skip.is_empty() {
                    logging::log_branch_pruned(&node.id, skip.len());
                }

                for successor in graph.successors(&node.id) {
                    if skip.contains(successor) {
                        continue;
                    }
                    let record = waiting_nodes
                        .entry(successor.clone())
                        .or_insert_with(|| dependency::analyze(graph, successor));
                    record
                        .received_inputs
                        .insert(node.id.clone(), output.clone());
                    if record.is_ready() {
                        logging::log_waiting_ready(successor);
                        let record = waiting_nodes.remove(successor).unwrap();
                        let as_values: HashMap<String, Value> = record
                            .received_inputs
                            .iter()
                            .map(|(k, v)| (k.clone(), serde_json::to_value(v).unwrap_or(Value::Null)))
                            .collect();
                        let combined = combiner::combine_inputs(&as_values);
                        queue.push_back(ReadyQueueEntry {
                            node_id: successor.clone(),
                            data: combined,
                            inputs: record.received_inputs,
                        });
                    }
                }

                if node.name == LOOP_NODE {
                    if let Some(loop_target) = output.node_id.clone() {
                        let count = loop_counts.get(&node.id).copied().unwrap_or(0) + 1;
                        let max = output.max_loop_count.unwrap_or(limits.max_loop_count);
                        logging::log_loop_iteration(&node.id, count, max);
                        if count < max {
                            loop_counts.insert(node.id.clone(), count);
                            let as_value = serde_json::to_value(&output).unwrap_or(Value::Null);
                            queue.push_back(ReadyQueueEntry {
                                node_id: loop_target,
                                data: as_value,
                                inputs: HashMap::new(),
                            });
                            current_human_input = None;
                        }
                    }
                }
            }
        }
    }

    let final_flow_status = match &exit {
        LoopExit::Aborted => FlowStatus::Terminated,
        LoopExit::IterationLimit => FlowStatus::Error,
        LoopExit::NodeError(_) => FlowStatus::Error,
        LoopExit::QueueDrained | LoopExit::HumanPause => {
            final_status(checkpoint.iter().map(|e| &e.status))
        }
    };

    store
        .update(&execution_id, Some(final_flow_status), Some(checkpoint.clone()))
        .await?;
    logging::log_graph_complete(final_flow_status);
    events.agent_flow_event(final_flow_status);

    if let LoopExit::NodeError(err) = exit {
        logging::log_graph_error(&err);
        return Err(err);
    }
    if let LoopExit::IterationLimit = exit {
        let err = EngineError::IterationLimit {
            limit: limits.max_iterations,
        };
        logging::log_graph_error(&err);
        return Err(err);
    }

    let text = checkpoint
        .last()
        .and_then(|e| e.data.content.clone())
        .unwrap_or_else(|| " ".to_string());

    let pending_action = checkpoint
        .last()
        .and_then(|e| e.data.human_input_action.clone());
    chat_message_store
        .append(&chat_id, API_MESSAGE_ROLE, &text, pending_action)
        .await?;

    let result = FlowResult {
        text,
        question: input.question,
        form: runtime.form,
        chat_id,
        execution_id,
        session_id: input.session_id,
        lead_email: input.lead_email,
        agent_flow_executed_data: checkpoint,
    };

    Ok(result)
}

fn apply_runtime_updates(runtime: &mut RuntimeState, output: &NodeOutput) {
    if let Some(state) = &output.state {
        runtime.state = state.clone();
        logging::log_state_update("runtime");
    }
    if !output.chat_history.is_empty() {
        runtime.chat_history.extend(output.chat_history.clone());
    }
    if let Some(form) = &output.form {
        runtime.form = form.clone();
    }
}

fn build_flow_config(
    agentflow_id: &str,
    chat_id: &str,
    session_id: &str,
    runtime: &RuntimeState,
    is_internal: bool,
    lead_email: Option<&str>,
    api_message_id: Option<&str>,
    override_config: &ApiOverride,
) -> Value {
    let mut bag = serde_json::json!({
        "chatflowid": agentflow_id,
        "chatId": chat_id,
        "sessionId": session_id,
        "apiMessageId": api_message_id,
        "state": runtime.state,
        "chatHistory": runtime.chat_history,
        "isInternal": is_internal,
        "leadEmail": lead_email,
    });
    if let Value::Object(map) = &mut bag {
        map.extend(override_config.flattened_fields());
    }
    bag
}
