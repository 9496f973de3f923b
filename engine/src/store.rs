//! Execution Store (§4.8): persists checkpoint snapshots, supports resume.

use crate::error::EngineError;
use crate::model::{Checkpoint, Execution, FlowStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Persists `Execution` rows and serves `latestBySession` lookups. The Execution Store is the
/// system of record between runs (§3 Ownership); the engine owns the in-flight `Execution` only
/// for the duration of one run.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn create(
        &self,
        agentflow_id: &str,
        session_id: &str,
        initial_data: Checkpoint,
    ) -> Result<Execution, EngineError>;

    async fn update(
        &self,
        id: &str,
        state: Option<FlowStatus>,
        execution_data: Option<Checkpoint>,
    ) -> Result<(), EngineError>;

    async fn latest_by_session(
        &self,
        agentflow_id: &str,
        session_id: &str,
    ) -> Result<Option<Execution>, EngineError>;
}

/// In-memory execution store. Not persistent; for dev, tests, and single-process deployments.
pub struct MemoryExecutionStore {
    inner: Arc<RwLock<MemoryStoreInner>>,
}

struct MemoryStoreInner {
    by_id: HashMap<String, Execution>,
    /// (agentflow_id, session_id) -> latest execution id
    latest: HashMap<(String, String), String>,
}

impl MemoryExecutionStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemoryStoreInner {
                by_id: HashMap::new(),
                latest: HashMap::new(),
            })),
        }
    }
}

impl Default for MemoryExecutionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionStore for MemoryExecutionStore {
    async fn create(
        &self,
        agentflow_id: &str,
        session_id: &str,
        initial_data: Checkpoint,
    ) -> Result<Execution, EngineError> {
        let execution = Execution {
            id: uuid::Uuid::new_v4().to_string(),
            agentflow_id: agentflow_id.to_string(),
            session_id: session_id.to_string(),
            state: FlowStatus::InProgress,
            execution_data: initial_data,
            created_date: now_rfc3339_stub(),
            stopped_date: None,
        };
        let mut guard = self.inner.write().await;
        guard.by_id.insert(execution.id.clone(), execution.clone());
        guard
            .latest
            .insert((agentflow_id.to_string(), session_id.to_string()), execution.id.clone());
        Ok(execution)
    }

    async fn update(
        &self,
        id: &str,
        state: Option<FlowStatus>,
        execution_data: Option<Checkpoint>,
    ) -> Result<(), EngineError> {
        let mut guard = self.inner.write().await;
        let execution = guard
            .by_id
            .get_mut(id)
            .ok_or_else(|| EngineError::Graph(format!("unknown execution {id}")))?;
        if let Some(state) = state {
            if state == FlowStatus::Stopped {
                execution.stopped_date = Some(now_rfc3339_stub());
            }
            execution.state = state;
        }
        if let Some(data) = execution_data {
            execution.execution_data = data;
        }
        Ok(())
    }

    async fn latest_by_session(
        &self,
        agentflow_id: &str,
        session_id: &str,
    ) -> Result<Option<Execution>, EngineError> {
        let guard = self.inner.read().await;
        let id = guard
            .latest
            .get(&(agentflow_id.to_string(), session_id.to_string()));
        Ok(id.and_then(|id| guard.by_id.get(id)).cloned())
    }
}

/// Stand-in timestamp: the engine core takes no clock dependency (keeps the scheduler
/// deterministic under test); a host wires a real clock in by post-processing `created_date` /
/// `stopped_date` if it needs wall-clock fidelity beyond ordering.
fn now_rfc3339_stub() -> String {
    "0000-00-00T00:00:00Z".to_string()
}

/// Role recorded against the incoming input on every run.
pub const USER_MESSAGE_ROLE: &str = "userMessage";
/// Role recorded against the flow's response on every run.
pub const API_MESSAGE_ROLE: &str = "apiMessage";

/// One persisted chat-message row. `action` carries the pending human-input action (§4.5) while
/// an execution is STOPPED on this row, and is cleared when that execution resumes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessageRecord {
    pub id: String,
    pub chat_id: String,
    pub role: String,
    pub content: String,
    pub action: Option<Value>,
}

/// Persists the two chat-message rows (`userMessage`, `apiMessage`) an execution writes per run
/// (§6). The engine core never reads these rows back; it only appends and, on resume, clears the
/// stale action left on the paused row.
#[async_trait]
pub trait ChatMessageStore: Send + Sync {
    async fn append(
        &self,
        chat_id: &str,
        role: &str,
        content: &str,
        action: Option<Value>,
    ) -> Result<ChatMessageRecord, EngineError>;

    /// Clears `action` on the most recent row for `chat_id` that still has one set.
    async fn clear_latest_action(&self, chat_id: &str) -> Result<(), EngineError>;
}

/// In-memory chat-message store, mirroring `MemoryExecutionStore`'s shape.
pub struct MemoryChatMessageStore {
    inner: Arc<RwLock<HashMap<String, Vec<ChatMessageRecord>>>>,
}

impl MemoryChatMessageStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for MemoryChatMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatMessageStore for MemoryChatMessageStore {
    async fn append(
        &self,
        chat_id: &str,
        role: &str,
        content: &str,
        action: Option<Value>,
    ) -> Result<ChatMessageRecord, EngineError> {
        let record = ChatMessageRecord {
            id: uuid::Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            role: role.to_string(),
            content: content.to_string(),
            action,
        };
        let mut guard = self.inner.write().await;
        guard
            .entry(chat_id.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn clear_latest_action(&self, chat_id: &str) -> Result<(), EngineError> {
        let mut guard = self.inner.write().await;
        if let Some(rows) = guard.get_mut(chat_id) {
            if let Some(latest) = rows.iter_mut().rev().find(|r| r.action.is_some()) {
                latest.action = None;
            }
        }
        Ok(())
    }
}

/// No-op chat-message store for callers that don't persist chat history.
pub struct NullChatMessageStore;

#[async_trait]
impl ChatMessageStore for NullChatMessageStore {
    async fn append(
        &self,
        chat_id: &str,
        role: &str,
        content: &str,
        action: Option<Value>,
    ) -> Result<ChatMessageRecord, EngineError> {
        Ok(ChatMessageRecord {
            id: String::new(),
            chat_id: chat_id.to_string(),
            role: role.to_string(),
            content: content.to_string(),
            action,
        })
    }

    async fn clear_latest_action(&self, _chat_id: &str) -> Result<(), EngineError> {
        Ok(())
    }
}
