//! Minimal string key/value persistence interface and its backends.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::{Database, DbError, DbResult};

/// Durable string-keyed storage used by `CacheStore`.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> DbResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> DbResult<()>;

    /// Remove every key starting with `prefix`. Returns how many were removed.
    async fn remove_prefix(&self, prefix: &str) -> DbResult<u64>;
}

/// Process-local store for tests and `cache_path = ":memory:"`.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        match self.entries.read() {
            Ok(entries) => entries.len(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading kv entries: {e}");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| DbError::Unavailable(format!("kv lock poisoned: {e}")))?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| DbError::Unavailable(format!("kv lock poisoned: {e}")))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_prefix(&self, prefix: &str) -> DbResult<u64> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| DbError::Unavailable(format!("kv lock poisoned: {e}")))?;
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }
}

#[async_trait]
impl KvStore for Database {
    async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_cache WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        sqlx::query(
            r#"INSERT INTO kv_cache (key, value, updated_at) VALUES (?1, ?2, ?3)
               ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at"#,
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().timestamp())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn remove_prefix(&self, prefix: &str) -> DbResult<u64> {
        // substr() instead of LIKE so '%' and '_' in identities need no escaping.
        let result = sqlx::query("DELETE FROM kv_cache WHERE substr(key, 1, length(?1)) = ?1")
            .bind(prefix)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }
}
