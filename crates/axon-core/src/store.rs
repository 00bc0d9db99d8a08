//! Session store interface and audit record types
//!
//! One audit entry is written per interaction; the store owns its own
//! transactional discipline, callers hold no cross-call locks.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Tool call captured in an audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedToolCall {
    /// Tool call identifier
    pub id: String,
    /// Function name
    pub name: String,
    /// JSON-encoded arguments
    pub arguments: String,
}

/// Tool response captured in an audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedToolResponse {
    /// Tool call this responds to
    pub tool_call_id: String,
    /// Tool output or error text
    pub content: String,
}

/// Token counters captured per turn
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordedUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One submit-stream cycle of the agent loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    /// Zero-based turn counter within the interaction
    pub turn_index: u32,
    /// SHA-256 of the canonical request JSON submitted this turn, hex-encoded
    pub request_hash: String,
    /// Aggregated assistant text for the turn
    pub response_content: String,
    /// Tool calls the model requested this turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_tool_calls: Vec<RecordedToolCall>,
    /// Tool results fed back for the next turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_responses: Vec<RecordedToolResponse>,
    /// Token usage for the turn
    pub usage: RecordedUsage,
    /// Terminal error for the turn, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Canonical audit entry, one per interaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub session_id: String,
    pub user_id: String,
    pub agent_name: String,
    /// Per-turn records in execution order
    pub turns: Vec<TurnRecord>,
    /// Set when the interaction ended on a non-recoverable error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the turn budget was exhausted
    #[serde(default)]
    pub truncated: bool,
}

/// Persistent store for audit entries
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Append one audit entry
    async fn append(&self, entry: AuditEntry) -> std::io::Result<()>;
}

/// Store that appends one JSON line per audit entry to a file
pub struct JsonlSessionStore {
    path: PathBuf,
    // Serializes appends so concurrent interactions never interleave lines
    write_lock: Mutex<()>,
}

impl JsonlSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl SessionStore for JsonlSessionStore {
    async fn append(&self, entry: AuditEntry) -> std::io::Result<()> {
        let mut line = serde_json::to_string(&entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

/// In-memory store, used by tests and dry runs
#[derive(Default)]
pub struct MemorySessionStore {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn append(&self, entry: AuditEntry) -> std::io::Result<()> {
        self.entries.lock().await.push(entry);
        Ok(())
    }
}
