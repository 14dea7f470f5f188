//! In-memory conversation history using moka.
//!
//! Each conversation is one cache entry keyed by conversation id. Entries
//! expire `ttl` after the last appended turn.

use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

use super::{HistoryStore, StoreError};
use warden_core::ConversationTurn;

/// Conversation history cache.
pub struct MemoryHistoryStore {
    cache: Cache<String, Arc<Vec<ConversationTurn>>>,
    max_turns: usize,
}

impl MemoryHistoryStore {
    /// Create a store holding up to `max_conversations` conversations of at
    /// most `max_turns` turns each.
    pub fn new(max_conversations: u64, max_turns: usize, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_conversations)
            .time_to_live(ttl)
            .build();

        Self { cache, max_turns }
    }

    /// Number of stored turns in a conversation.
    pub async fn turn_count(&self, conversation_id: &str) -> usize {
        self.cache
            .get(conversation_id)
            .await
            .map(|turns| turns.len())
            .unwrap_or(0)
    }

    /// Drop a conversation.
    pub async fn invalidate(&self, conversation_id: &str) {
        self.cache.invalidate(conversation_id).await;
    }

    /// Get the number of conversations held.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for MemoryHistoryStore {
    fn default() -> Self {
        Self::new(10_000, 50, Duration::from_secs(24 * 60 * 60))
    }
}

impl std::fmt::Debug for MemoryHistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHistoryStore")
            .field("entries", &self.cache.entry_count())
            .field("max_turns", &self.max_turns)
            .finish()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn get_recent_turns(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        let Some(turns) = self.cache.get(conversation_id).await else {
            return Ok(Vec::new());
        };

        let skip = turns.len().saturating_sub(limit);
        Ok(turns[skip..].to_vec())
    }

    async fn append_turn(
        &self,
        conversation_id: &str,
        turn: ConversationTurn,
    ) -> Result<(), StoreError> {
        // Read-modify-write: a concurrent append to the same conversation may be lost
        let mut turns = self
            .cache
            .get(conversation_id)
            .await
            .map(|existing| existing.as_ref().clone())
            .unwrap_or_default();

        turns.push(turn);
        if turns.len() > self.max_turns {
            let excess = turns.len() - self.max_turns;
            turns.drain(..excess);
        }

        self.cache
            .insert(conversation_id.to_string(), Arc::new(turns))
            .await;
        Ok(())
    }
}
