// Two-tier (memory + disk) key/value cache with per-entry TTL

use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::Result;

const MAX_FILE_STEM_LEN: usize = 200;

static NON_ALPHANUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9]+").expect("valid regex"));

/// A cached payload with its creation time and optional TTL, both in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: i64,
    pub ttl: Option<u64>,
}

impl<T> CacheEntry<T> {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        match self.ttl {
            Some(ttl) => now_ms - self.timestamp > ttl as i64,
            None => false,
        }
    }
}

/// Key/value cache checked in memory first, then on disk (one JSON file per key).
///
/// Disk failures never fail a call: a write error is logged and the memory
/// copy still stands; a missing or corrupt file reads as a miss.
pub struct CacheStore {
    dir: PathBuf,
    memory: DashMap<String, CacheEntry<Value>>,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            memory: DashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name used to persist `key`
    pub fn file_name_for(key: &str) -> String {
        let mut stem = NON_ALPHANUMERIC.replace_all(key, "_").into_owned();
        stem.truncate(MAX_FILE_STEM_LEN);
        format!("{}.json", stem)
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(Self::file_name_for(key))
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now = now_ms();

        let in_memory = self.memory.get(key).map(|entry| entry.value().clone());
        let entry = match in_memory {
            Some(entry) if entry.is_expired(now) => {
                debug!("Cache entry expired in memory: {}", key);
                self.memory.remove(key);
                self.remove_file(key).await;
                return None;
            }
            Some(entry) => entry,
            None => {
                let entry = self.read_persisted(key, now).await?;
                self.memory.insert(key.to_string(), entry.clone());
                entry
            }
        };

        match serde_json::from_value(entry.data) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("Cache entry {} has an unexpected shape: {}", key, e);
                None
            }
        }
    }

    async fn read_persisted(&self, key: &str, now: i64) -> Option<CacheEntry<Value>> {
        let path = self.path_for(key);
        let content = tokio::fs::read_to_string(&path).await.ok()?;

        let entry: CacheEntry<Value> = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Ignoring corrupt cache file {}: {}", path.display(), e);
                return None;
            }
        };

        if entry.is_expired(now) {
            debug!("Cache entry expired on disk: {}", key);
            self.remove_file(key).await;
            return None;
        }

        debug!("Promoted cache entry from disk: {}", key);
        Some(entry)
    }

    /// Store `value` in both tiers. Only serialization errors are returned.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_ms: Option<u64>) -> Result<()> {
        let entry = CacheEntry {
            data: serde_json::to_value(value)?,
            timestamp: now_ms(),
            ttl: ttl_ms,
        };

        let body = serde_json::to_vec(&entry)?;
        self.memory.insert(key.to_string(), entry);

        if let Err(e) = self.write_file(key, &body).await {
            warn!("Failed to persist cache entry {} to {}: {}", key, self.dir.display(), e);
        }

        Ok(())
    }

    async fn write_file(&self, key: &str, body: &[u8]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await
    }

    pub async fn delete(&self, key: &str) {
        self.memory.remove(key);
        self.remove_file(key).await;
    }

    /// Remove every entry from memory and every persisted cache file
    pub async fn clear(&self) {
        self.memory.clear();

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(_) => return,
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!("Failed to remove cache file {}: {}", path.display(), e);
                }
            }
        }
    }

    async fn remove_file(&self, key: &str) {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove cache file {}: {}", path.display(), e),
        }
    }
}

/// Current wall-clock time in milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
