//! A linear two-node chain runs to completion and carries the question through variable
//! resolution.


use agentflow_engine::{
    execute_agent_flow, events::NullEventStreamer, ApiOverride, ExecuteParams, FlowGraph,
    FlowInput, FlowStatus, MemoryExecutionStore, NullChatMessageStore,
};
use fixtures::{edge, node_with_value, start_node, TestRegistry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn chain_finishes_and_resolves_question() {
    let nodes = vec![
        start_node("start_0", "startAgentflow"),
        node_with_value(
            "llm_0",
            "llmAgentflow",
            "text",
            serde_json::json!("hello {{question}}"),
        ),
    ];
    let edges = vec![edge("start_0", 0, "llm_0")];
    let graph = FlowGraph::build(nodes, edges).unwrap();

    let input = FlowInput {
        question: Some("world".to_string()),
        ..Default::default()
    };

    let result = execute_agent_flow(ExecuteParams {
        graph: &graph,
        input,
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
    .unwrap();

    assert_eq!(result.agent_flow_executed_data.len(), 2);
    assert_eq!(result.text, "hello world");
    assert!(result
        .agent_flow_executed_data
        .iter()
        .all(|e| e.status == FlowStatus::Finished));
}
