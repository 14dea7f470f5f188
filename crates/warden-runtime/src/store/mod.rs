//! Storage collaborators.
//!
//! The query service reads profiles and conversation history through these
//! traits and never owns the storage itself. In-memory implementations back
//! the CLI and tests.

use async_trait::async_trait;
use thiserror::Error;

use warden_core::{ConversationTurn, UserProfile};

mod history;
mod profiles;

pub use history::MemoryHistoryStore;
pub use profiles::MemoryProfileStore;

/// Errors from storage collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Stored record is corrupt: {0}")]
    Corrupt(String),
}

/// Read access to user profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch a profile snapshot. `Ok(None)` means the user does not exist.
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError>;
}

/// Conversation turns, partitioned by conversation id.
///
/// Concurrent appends to the same conversation are ordered by the
/// implementation, not by the caller.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Up to `limit` most recent turns, oldest first.
    async fn get_recent_turns(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, StoreError>;

    /// Append a completed turn.
    async fn append_turn(
        &self,
        conversation_id: &str,
        turn: ConversationTurn,
    ) -> Result<(), StoreError>;
}
