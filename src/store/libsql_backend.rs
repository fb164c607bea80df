//! libSQL store: onboarding data in a local SQLite file.
//!
//! Session-scoped rows are keyed by `session:<id>`, so several wizard
//! sessions can share one file and `end_session` only clears its own.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{params, Connection, Database as LibSqlDatabase};
use tracing::info;

use super::migrations;
use super::{Scope, SessionStore};
use crate::error::StoreError;

const DURABLE_SCOPE: &str = "durable";

/// libSQL-backed [`SessionStore`].
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    session_scope: String,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path, session_id: &str) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_database(db, session_id).await?;
        info!(path = %path.display(), session_id, "Onboarding store opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory(session_id: &str) -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StoreError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db, session_id).await
    }

    async fn from_database(db: LibSqlDatabase, session_id: &str) -> Result<Self, StoreError> {
        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;

        Ok(Self {
            db: Arc::new(db),
            conn,
            session_scope: format!("session:{session_id}"),
        })
    }

    fn scope_name(&self, scope: Scope) -> &str {
        match scope {
            Scope::Session => &self.session_scope,
            Scope::Durable => DURABLE_SCOPE,
        }
    }

    /// Delete every row of this session's scope.
    pub async fn end_session(&self) -> Result<u64, StoreError> {
        self.conn
            .execute("DELETE FROM kv WHERE scope = ?1", params![self.session_scope.as_str()])
            .await
            .map_err(|e| StoreError::Query(format!("end_session: {e}")))
    }
}

#[async_trait]
impl SessionStore for LibSqlStore {
    async fn get(&self, scope: Scope, key: &str) -> Result<Option<String>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT value FROM kv WHERE scope = ?1 AND key = ?2",
                params![self.scope_name(scope), key],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<String>(0)
                .map(Some)
                .map_err(|e| StoreError::Query(format!("get: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("get: {e}"))),
        }
    }

    async fn set(&self, scope: Scope, key: &str, value: &str) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO kv (scope, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (scope, key) DO UPDATE SET value = ?3, updated_at = ?4",
                params![self.scope_name(scope), key, value, now],
            )
            .await
            .map_err(|e| StoreError::Query(format!("set: {e}")))?;
        Ok(())
    }

    async fn remove(&self, scope: Scope, key: &str) -> Result<bool, StoreError> {
        let count = self
            .conn
            .execute(
                "DELETE FROM kv WHERE scope = ?1 AND key = ?2",
                params![self.scope_name(scope), key],
            )
            .await
            .map_err(|e| StoreError::Query(format!("remove: {e}")))?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use secrecy::{ExposeSecret, SecretString};

    use super::*;

    #[tokio::test]
    async fn kv_crud() {
        let store = LibSqlStore::new_memory("s1").await.unwrap();
        assert!(store.get(Scope::Session, "k").await.unwrap().is_none());

        store.set(Scope::Session, "k", "v1").await.unwrap();
        store.set(Scope::Session, "k", "v2").await.unwrap();
        assert_eq!(store.get(Scope::Session, "k").await.unwrap().as_deref(), Some("v2"));

        assert!(store.remove(Scope::Session, "k").await.unwrap());
        assert!(!store.remove(Scope::Session, "k").await.unwrap());
    }

    #[tokio::test]
    async fn snapshot_and_tokens() {
        let store = LibSqlStore::new_memory("s1").await.unwrap();
        store.save_snapshot(r#"{"currentStep":3}"#).await.unwrap();
        store
            .save_access_token(&SecretString::from("acc".to_string()))
            .await
            .unwrap();
        store
            .save_temp_token(&SecretString::from("tmp".to_string()))
            .await
            .unwrap();

        assert_eq!(
            store.load_snapshot().await.unwrap().as_deref(),
            Some(r#"{"currentStep":3}"#)
        );
        assert_eq!(store.load_access_token().await.unwrap().unwrap().expose_secret(), "acc");

        store.end_session().await.unwrap();
        assert!(store.load_snapshot().await.unwrap().is_none());
        assert!(store.load_temp_token().await.unwrap().is_none());
        assert!(store.load_access_token().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn access_token_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/onboarding.db");

        {
            let store = LibSqlStore::new_local(&path, "first").await.unwrap();
            store
                .save_access_token(&SecretString::from("acc".to_string()))
                .await
                .unwrap();
            store.save_snapshot("{}").await.unwrap();
        }

        let reopened = LibSqlStore::new_local(&path, "second").await.unwrap();
        assert_eq!(
            reopened.load_access_token().await.unwrap().unwrap().expose_secret(),
            "acc"
        );
        // A different session id does not see the first session's snapshot.
        assert!(reopened.load_snapshot().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let store = LibSqlStore::new_memory("s1").await.unwrap();
        migrations::run_migrations(&store.conn).await.unwrap();
        store.set(Scope::Durable, "k", "v").await.unwrap();
        assert!(store.get(Scope::Durable, "k").await.unwrap().is_some());
    }
}
