//! In-memory profile store.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

use super::{ProfileStore, StoreError};
use warden_core::UserProfile;

/// Profile records held as raw JSON, parsed and validated on every read
/// like items fetched from a key-value store.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    records: RwLock<HashMap<String, JsonValue>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a parsed profile.
    pub fn insert(&self, profile: &UserProfile) -> Result<(), StoreError> {
        let record =
            serde_json::to_value(profile).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.records.write().insert(profile.user_id.clone(), record);
        Ok(())
    }

    /// Store a raw record under `user_id` without validating it.
    pub fn insert_record(&self, user_id: impl Into<String>, record: JsonValue) {
        self.records.write().insert(user_id.into(), record);
    }

    pub fn with_profile(self, profile: &UserProfile) -> Result<Self, StoreError> {
        self.insert(profile)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        let record = self.records.read().get(user_id).cloned();
        match record {
            None => Ok(None),
            Some(value) => UserProfile::from_value(value)
                .map(Some)
                .map_err(|e| StoreError::Corrupt(format!("profile '{}': {}", user_id, e))),
        }
    }
}
