//! In-memory store for ephemeral runs and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Scope, SessionStore};
use crate::error::StoreError;

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<(Scope, String), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every session-scoped entry, as closing the browser tab would.
    pub async fn end_session(&self) {
        self.entries
            .write()
            .await
            .retain(|(scope, _), _| *scope == Scope::Durable);
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, scope: Scope, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .entries
            .read()
            .await
            .get(&(scope, key.to_string()))
            .cloned())
    }

    async fn set(&self, scope: Scope, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .insert((scope, key.to_string()), value.to_string());
        Ok(())
    }

    async fn remove(&self, scope: Scope, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .entries
            .write()
            .await
            .remove(&(scope, key.to_string()))
            .is_some())
    }
}
