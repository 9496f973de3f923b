//! A fresh run against a graph whose start node(s) never declare a `startInputType` is rejected
//! with `StartInput` before any node runs.


use agentflow_engine::{
    execute_agent_flow, events::NullEventStreamer, ApiOverride, EngineError, ExecuteParams,
    FlowGraph, FlowInput, MemoryExecutionStore, NullChatMessageStore,
};
use fixtures::{bare_node, edge, TestRegistry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn missing_start_input_type_is_rejected() {
    let nodes = vec![
        bare_node("start_0", "startAgentflow"),
        bare_node("llm_0", "llmAgentflow"),
    ];
    let edges = vec![edge("start_0", 0, "llm_0")];
    let graph = FlowGraph::build(nodes, edges).unwrap();

    let err = execute_agent_flow(ExecuteParams {
        graph: &graph,
        input: FlowInput::default(),
        chat_id: "chat-1".to_string(),
        agentflow_id: "flow-1".to_string(),
        registry: Arc::new(TestRegistry::new()),
        store: Arc::new(MemoryExecutionStore::new()),
        chat_message_store: Arc::new(NullChatMessageStore),
        events: Arc::new(NullEventStreamer),
        vars: serde_json::Value::Null,
        override_config: ApiOverride::default(),
        limits: flow_config::EngineLimits::default(),
        cancellation: CancellationToken::new(),
    })
    .await
    .unwrap_err();

    assert!(matches!(err, EngineError::StartInput));
}
