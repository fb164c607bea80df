//! Persistence layer. Where the wizard keeps things between runs.
//!
//! Two lifetimes, mirroring browser storage:
//! - **Session** scope: the state snapshot and the temp token. Gone when
//!   the session ends.
//! - **Durable** scope: the access token. Survives across sessions and
//!   drives resume reconciliation on the next start.

pub mod libsql_backend;
pub mod memory;
mod migrations;

pub use libsql_backend::LibSqlStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::StoreError;
use crate::onboarding::model::SNAPSHOT_KEY;

pub const TEMP_TOKEN_KEY: &str = "yuno_temp_token";
pub const ACCESS_TOKEN_KEY: &str = "yuno_access_token";

/// How long an entry lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Session,
    Durable,
}

/// Backend-agnostic key-value storage for onboarding data.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, scope: Scope, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, scope: Scope, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove an entry. Returns whether it existed.
    async fn remove(&self, scope: Scope, key: &str) -> Result<bool, StoreError>;

    // ── Snapshot ────────────────────────────────────────────────────

    /// Raw snapshot JSON; parsing (and tolerating corruption) is the caller's job.
    async fn load_snapshot(&self) -> Result<Option<String>, StoreError> {
        self.get(Scope::Session, SNAPSHOT_KEY).await
    }

    async fn save_snapshot(&self, json: &str) -> Result<(), StoreError> {
        self.set(Scope::Session, SNAPSHOT_KEY, json).await
    }

    async fn clear_snapshot(&self) -> Result<(), StoreError> {
        self.remove(Scope::Session, SNAPSHOT_KEY).await.map(|_| ())
    }

    // ── Credentials ─────────────────────────────────────────────────

    async fn load_access_token(&self) -> Result<Option<SecretString>, StoreError> {
        Ok(self
            .get(Scope::Durable, ACCESS_TOKEN_KEY)
            .await?
            .filter(|t| !t.is_empty())
            .map(SecretString::from))
    }

    async fn save_access_token(&self, token: &SecretString) -> Result<(), StoreError> {
        self.set(Scope::Durable, ACCESS_TOKEN_KEY, token.expose_secret())
            .await
    }

    async fn clear_access_token(&self) -> Result<(), StoreError> {
        self.remove(Scope::Durable, ACCESS_TOKEN_KEY).await.map(|_| ())
    }

    async fn load_temp_token(&self) -> Result<Option<SecretString>, StoreError> {
        Ok(self
            .get(Scope::Session, TEMP_TOKEN_KEY)
            .await?
            .filter(|t| !t.is_empty())
            .map(SecretString::from))
    }

    async fn save_temp_token(&self, token: &SecretString) -> Result<(), StoreError> {
        self.set(Scope::Session, TEMP_TOKEN_KEY, token.expose_secret())
            .await
    }

    async fn clear_temp_token(&self) -> Result<(), StoreError> {
        self.remove(Scope::Session, TEMP_TOKEN_KEY).await.map(|_| ())
    }
}
