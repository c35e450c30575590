// crates/db/src/cache.rs
//! Identity-namespaced snapshot cache over a [`KvStore`].
//!
//! Every failure here is logged and swallowed: a cache that cannot be read
//! behaves like an empty one, and a failed write only loses the snapshot.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::kv::{KvStore, MemoryKv};

const NAMESPACE: &str = "statboard:v1";

/// Logical snapshot slots, one per dashboard section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheSlice {
    Stats,
    Performance,
    Activity,
    Uploads,
    Analytics,
}

impl CacheSlice {
    pub const ALL: [CacheSlice; 5] = [
        CacheSlice::Stats,
        CacheSlice::Performance,
        CacheSlice::Activity,
        CacheSlice::Uploads,
        CacheSlice::Analytics,
    ];

    pub fn key(self) -> &'static str {
        match self {
            CacheSlice::Stats => "stats",
            CacheSlice::Performance => "performance",
            CacheSlice::Activity => "activity",
            CacheSlice::Uploads => "uploads",
            CacheSlice::Analytics => "analytics",
        }
    }
}

/// Prefix shared by every key belonging to `identity`.
///
/// The identity is length-prefixed so no identity's prefix is a prefix of
/// another identity's keys (`"a"` vs `"a:b"`).
pub fn identity_prefix(identity: &str) -> String {
    format!("{NAMESPACE}:{}:{identity}:", identity.len())
}

pub fn namespaced_key(identity: &str, key: &str) -> String {
    format!("{}{key}", identity_prefix(identity))
}

#[derive(Clone)]
pub struct CacheStore {
    kv: Arc<dyn KvStore>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore").finish_non_exhaustive()
    }
}

impl CacheStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKv::new()))
    }

    /// Last value written for `(identity, key)`. Missing, unreadable and
    /// malformed entries all read as `None`.
    pub async fn get(&self, identity: &str, key: &str) -> Option<Value> {
        if identity.is_empty() {
            return None;
        }
        let full_key = namespaced_key(identity, key);
        let raw = match self.kv.get(&full_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %full_key, error = %e, "Cache read failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %full_key, error = %e, "Discarding malformed cache entry");
                None
            }
        }
    }

    pub async fn set(&self, identity: &str, key: &str, value: &Value) {
        if identity.is_empty() {
            debug!(key, "Skipping cache write without identity");
            return;
        }
        let full_key = namespaced_key(identity, key);
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %full_key, error = %e, "Cache value not serializable");
                return;
            }
        };
        if let Err(e) = self.kv.set(&full_key, &raw).await {
            warn!(key = %full_key, error = %e, "Cache write failed");
        }
    }

    /// Drop every entry for `identity`. Other identities are untouched.
    pub async fn clear_all(&self, identity: &str) {
        if identity.is_empty() {
            return;
        }
        match self.kv.remove_prefix(&identity_prefix(identity)).await {
            Ok(removed) => debug!(removed, "Cleared cached snapshots"),
            Err(e) => warn!(error = %e, "Cache clear failed"),
        }
    }

    pub async fn get_slice<T: DeserializeOwned>(&self, identity: &str, slice: CacheSlice) -> Option<T> {
        let value = self.get(identity, slice.key()).await?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                warn!(slice = slice.key(), error = %e, "Cached slice has unexpected shape");
                None
            }
        }
    }

    pub async fn set_slice<T: Serialize>(&self, identity: &str, slice: CacheSlice, value: &T) {
        match serde_json::to_value(value) {
            Ok(value) => self.set(identity, slice.key(), &value).await,
            Err(e) => warn!(slice = slice.key(), error = %e, "Slice not serializable"),
        }
    }
}
