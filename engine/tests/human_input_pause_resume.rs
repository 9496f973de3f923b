//! A `humanInputAgentflow` node pauses the flow (STOPPED) when no human input is supplied, and a
//! second call carrying `humanInput` resumes from that node and finishes the flow.


use agentflow_engine::{
    execute_agent_flow, events::NullEventStreamer, ApiOverride, ExecuteParams, FlowGraph,
    FlowInput, FlowStatus, HumanInput, MemoryChatMessageStore, MemoryExecutionStore,
};
use fixtures::{bare_node, edge, start_node, TestRegistry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn pause_then_resume_finishes() {
    let nodes = vec![
        start_node("start_0", "startAgentflow"),
        bare_node("human_0", "humanInputAgentflow"),
        bare_node("after_0", "llmAgentflow"),
    ];
    let edges = vec![edge("start_0", 0, "human_0"), edge("human_0", 0, "after_0")];
    let graph = FlowGraph::build(nodes, edges).unwrap();

    let store = Arc::new(MemoryExecutionStore::new());
    let chat_message_store = Arc::new(MemoryChatMessageStore::new());
    let registry = Arc::new(TestRegistry::new());

    let first = execute_agent_flow(ExecuteParams {
        graph: &graph,
        input: FlowInput {
            question: Some("please confirm".to_string()),
            session_id: Some("sess-1".to_string()),
            ..Default::default()
        },
        chat_id: "chat-1".to_string(),
        agentflow_id: "flow-1".to_string(),
        registry: registry.clone(),
        store: store.clone(),
        chat_message_store: chat_message_store.clone(),
        events: Arc::new(NullEventStreamer),
        vars: serde_json::Value::Null,
        override_config: ApiOverride::default(),
        limits: flow_config::EngineLimits::default(),
        cancellation: CancellationToken::new(),
    })
    .await
    .unwrap();

    assert_eq!(first.agent_flow_executed_data.len(), 2);
    assert_eq!(
        first.agent_flow_executed_data.last().unwrap().status,
        FlowStatus::Stopped
    );

    let resumed = execute_agent_flow(ExecuteParams {
        graph: &graph,
        input: FlowInput {
            session_id: Some("sess-1".to_string()),
            human_input: Some(HumanInput {
                start_node_id: "human_0".to_string(),
                feedback: Some("approved".to_string()),
            }),
            ..Default::default()
        },
        chat_id: "chat-1".to_string(),
        agentflow_id: "flow-1".to_string(),
        registry,
        store,
        chat_message_store,
        events: Arc::new(NullEventStreamer),
        vars: serde_json::Value::Null,
        override_config: ApiOverride::default(),
        limits: flow_config::EngineLimits::default(),
        cancellation: CancellationToken::new(),
    })
    .await
    .unwrap();

    assert_eq!(resumed.agent_flow_executed_data.len(), 3);
    assert!(resumed
        .agent_flow_executed_data
        .iter()
        .all(|e| e.status == FlowStatus::Finished));
    assert_eq!(resumed.text, " ");
}
