//! Key-value settings persistence.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, TransactionBehavior, params};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::database::Database;
use crate::error::StateError;

/// Generic key-value settings store.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Read a value; `None` when the key was never written or was deleted.
    async fn get(&self, key: &str) -> Result<Option<Value>, StateError>;

    /// Insert or replace a value.
    async fn upsert(&self, key: &str, value: Value) -> Result<(), StateError>;

    /// Write `value` only if the stored value still equals `expected`
    /// (`None`: only if the key is absent). Returns whether it was written.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&Value>,
        value: Value,
    ) -> Result<bool, StateError>;

    /// Delete a key. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StateError>;

    /// Connectivity probe.
    async fn ping(&self) -> Result<(), StateError>;
}

/// In-memory settings store for testing.
pub struct MemorySettingsStore {
    values: RwLock<HashMap<String, Value>>,
    offline: AtomicBool,
}

impl MemorySettingsStore {
    /// Create a new memory store.
    pub fn new() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            offline: AtomicBool::new(false),
        }
    }

    /// Simulate an unreachable store: every call fails until reset.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StateError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StateError::Connection("settings store offline".to_string()));
        }
        Ok(())
    }
}

impl Default for MemorySettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StateError> {
        self.check_online()?;
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn upsert(&self, key: &str, value: Value) -> Result<(), StateError> {
        self.check_online()?;
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&Value>,
        value: Value,
    ) -> Result<bool, StateError> {
        self.check_online()?;
        let mut values = self.values.write().await;
        if values.get(key) != expected {
            return Ok(false);
        }
        values.insert(key.to_string(), value);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), StateError> {
        self.check_online()?;
        self.values.write().await.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StateError> {
        self.check_online()
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// SQLite-backed settings store.
pub struct SqliteSettingsStore {
    db: Database,
}

impl SqliteSettingsStore {
    /// Create the store, initializing its table if needed.
    pub async fn new(db: Database) -> Result<Self, StateError> {
        db.connection()
            .call(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;
        Ok(Self { db })
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StateError> {
        let key = key.to_string();
        let raw: Option<String> = self
            .db
            .connection()
            .call(move |conn| {
                let value = conn
                    .query_row(
                        "SELECT value FROM settings WHERE key = ?1",
                        [&key],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(value)
            })
            .await?;

        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, key: &str, value: Value) -> Result<(), StateError> {
        let key = key.to_string();
        let text = serde_json::to_string(&value)?;
        let now = Utc::now().to_rfc3339();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                     updated_at = excluded.updated_at",
                    params![key, text, now],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&Value>,
        value: Value,
    ) -> Result<bool, StateError> {
        let key = key.to_string();
        let expected = expected.cloned();
        let text = serde_json::to_string(&value)?;
        let now = Utc::now().to_rfc3339();
        let swapped = self
            .db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let current: Option<String> = tx
                    .query_row(
                        "SELECT value FROM settings WHERE key = ?1",
                        [&key],
                        |row| row.get(0),
                    )
                    .optional()?;
                let current: Option<Value> = current
                    .map(|text| serde_json::from_str(&text))
                    .transpose()
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))
                    })?;
                if current != expected {
                    return Ok(false);
                }
                tx.execute(
                    "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                     updated_at = excluded.updated_at",
                    params![key, text, now],
                )?;
                tx.commit()?;
                Ok(true)
            })
            .await?;
        Ok(swapped)
    }

    async fn delete(&self, key: &str) -> Result<(), StateError> {
        let key = key.to_string();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute("DELETE FROM settings WHERE key = ?1", [&key])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StateError> {
        self.db.ping().await
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
