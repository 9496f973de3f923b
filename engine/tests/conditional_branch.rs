//! A condition node prunes its unfulfilled branch; the merge node proceeds on the surviving
//! branch alone, and the pruned branch never appears in the checkpoint.


use agentflow_engine::{
    execute_agent_flow, events::NullEventStreamer, ApiOverride, ExecuteParams, FlowGraph,
    FlowInput, MemoryExecutionStore, NullChatMessageStore,
};
use fixtures::{bare_node, edge, node_with_value, start_node, TestRegistry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn pruned_branch_is_absent_from_checkpoint() {
    let nodes = vec![
        start_node("start_0", "startAgentflow"),
        node_with_value(
            "cond_0",
            "conditionAgentflow",
            "take_first",
            serde_json::json!(true),
        ),
        bare_node("a_0", "llmAgentflow"),
        bare_node("b_0", "llmAgentflow"),
        bare_node("merge_0", "llmAgentflow"),
    ];
    let edges = vec![
        edge("start_0", 0, "cond_0"),
        edge("cond_0", 0, "a_0"),
        edge("cond_0", 1, "b_0"),
        edge("a_0", 0, "merge_0"),
        edge("b_0", 0, "merge_0"),
    ];
    let graph = FlowGraph::build(nodes, edges).unwrap();

    let result = execute_agent_flow(ExecuteParams {
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
    .unwrap();

    let visited: Vec<&str> = result
        .agent_flow_executed_data
        .iter()
        .map(|e| e.node_id.as_str())
        .collect();
    assert!(visited.contains(&"a_0"));
    assert!(!visited.contains(&"b_0"));
    assert!(visited.contains(&"merge_0"));
}
