//! Audit sink: per-turn accumulation, one store write per interaction

use std::sync::Arc;

use axon_core::store::{AuditEntry, SessionStore, TurnRecord};

/// Collects turn records and flushes one audit entry at termination
///
/// The sink is per-interaction and not shared. `flush` is idempotent: a
/// second call with the same session is a no-op.
pub struct AuditSink {
    store: Arc<dyn SessionStore>,
    turns: Vec<TurnRecord>,
    error: Option<String>,
    truncated: bool,
    flushed: bool,
}

impl AuditSink {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            turns: Vec::new(),
            error: None,
            truncated: false,
            flushed: false,
        }
    }

    /// Accumulate one turn; no I/O happens here
    pub fn record_turn(&mut self, record: TurnRecord) {
        self.turns.push(record);
    }

    /// Mark the interaction as ended on a non-recoverable error
    pub fn set_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }

    /// Mark the interaction as cut short by the turn budget
    pub fn set_truncated(&mut self) {
        self.truncated = true;
    }

    /// Write the audit entry; store failures are logged, never propagated
    pub async fn flush(&mut self, session_id: &str, user_id: &str, agent_name: &str) {
        if self.flushed {
            return;
        }
        self.flushed = true;

        let entry = AuditEntry {
            session_id: session_id.to_owned(),
            user_id: user_id.to_owned(),
            agent_name: agent_name.to_owned(),
            turns: self.turns.clone(),
            error: self.error.clone(),
            truncated: self.truncated,
        };

        if let Err(e) = self.store.append(entry).await {
            tracing::error!(session_id, error = %e, "failed to write audit entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axon_core::MemorySessionStore;
    use axon_core::store::RecordedUsage;

    use super::*;

    fn record(turn_index: u32) -> TurnRecord {
        TurnRecord {
            turn_index,
            request_hash: "00".repeat(32),
            response_content: "hello".to_owned(),
            response_tool_calls: vec![],
            tool_responses: vec![],
            usage: RecordedUsage::default(),
            error: None,
        }
    }

    #[tokio::test]
    async fn flush_writes_exactly_one_entry() {
        let store = Arc::new(MemorySessionStore::new());
        let mut sink = AuditSink::new(Arc::clone(&store) as Arc<dyn SessionStore>);

        sink.record_turn(record(0));
        sink.record_turn(record(1));
        sink.flush("s1", "u1", "assistant").await;
        sink.flush("s1", "u1", "assistant").await;

        let entries = store.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].turns.len(), 2);
        assert_eq!(entries[0].session_id, "s1");
        assert!(!entries[0].truncated);
    }

    #[tokio::test]
    async fn store_failures_do_not_propagate() {
        struct BrokenStore;

        #[async_trait]
        impl SessionStore for BrokenStore {
            async fn append(&self, _entry: AuditEntry) -> std::io::Result<()> {
                Err(std::io::Error::other("store offline"))
            }
        }

        let mut sink = AuditSink::new(Arc::new(BrokenStore));
        sink.record_turn(record(0));
        sink.set_error("upstream timed out");
        sink.flush("s1", "u1", "assistant").await;
    }
}
