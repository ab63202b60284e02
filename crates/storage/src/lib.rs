use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use intelli_core::{ConversationState, IntentTag, Reply, Topic};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

/// Exclusive access to one conversation. Holding the lock serializes its turns.
pub type ConversationHandle = Arc<Mutex<ConversationRecord>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub at: DateTime<Utc>,
    pub user_text: String,
    pub intent: IntentTag,
    pub topic: Option<Topic>,
    pub reply: Reply,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub conversation_id: String,
    pub state: ConversationState,
    pub opened_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub turns: Vec<TurnRecord>,
}

impl ConversationRecord {
    pub fn new(conversation_id: impl Into<String>, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            state: ConversationState::new(),
            opened_at: now,
            expires_at: now + ttl,
            turns: Vec::new(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn touch(&mut self, now: DateTime<Utc>, ttl: Duration) {
        self.expires_at = now + ttl;
    }

    /// Appends a turn, keeping only the newest `max_turns`.
    pub fn push_turn(&mut self, turn: TurnRecord, max_turns: usize) {
        self.turns.push(turn);
        if self.turns.len() > max_turns {
            let keep_from = self.turns.len() - max_turns;
            self.turns.drain(..keep_from);
        }
    }
}

pub trait ConversationRepository: Send + Sync {
    /// Returns the live conversation, or `None` if it is unknown or expired.
    async fn load(&self, conversation_id: &str, now: DateTime<Utc>)
        -> Result<Option<ConversationHandle>>;
    /// Inserts `record` unless a live conversation with the same id exists,
    /// in which case the existing one is returned.
    async fn open(&self, record: ConversationRecord) -> Result<ConversationHandle>;
    async fn remove(&self, conversation_id: &str) -> Result<bool>;
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
    async fn count(&self) -> Result<usize>;
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    conversations: Arc<RwLock<HashMap<String, ConversationHandle>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationRepository for MemoryStore {
    async fn load(
        &self,
        conversation_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ConversationHandle>> {
        let handle = self.conversations.read().get(conversation_id).cloned();
        match handle {
            Some(handle) if handle.lock().is_expired(now) => {
                // A concurrent `open` may have replaced the entry since the read.
                let mut guard = self.conversations.write();
                let stale = guard.get(conversation_id).is_some_and(|current| {
                    Arc::ptr_eq(current, &handle) && current.lock().is_expired(now)
                });
                if stale {
                    guard.remove(conversation_id);
                }
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn open(&self, record: ConversationRecord) -> Result<ConversationHandle> {
        let now = record.opened_at;
        let mut guard = self.conversations.write();

        if let Some(existing) = guard.get(&record.conversation_id) {
            if !existing.lock().is_expired(now) {
                return Ok(existing.clone());
            }
        }

        let id = record.conversation_id.clone();
        let handle = Arc::new(Mutex::new(record));
        guard.insert(id, handle.clone());
        Ok(handle)
    }

    async fn remove(&self, conversation_id: &str) -> Result<bool> {
        Ok(self.conversations.write().remove(conversation_id).is_some())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut removed = 0_u64;
        self.conversations.write().retain(|_, handle| {
            let keep = !handle.lock().is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });

        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.conversations.read().len())
    }
}
