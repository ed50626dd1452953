//! 带读缓存的类型化键值存储。
//!
//! - 读：缓存未过期直接返回；否则读底层并回填缓存（缺失/空串视为 `null`）。
//! - 写：先同步更新缓存，再写底层。底层失败时错误上抛，缓存保持新值。
//! - 删：先删缓存，再删底层。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use super::StorageError;
use super::host::HostStorage;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    stored_at: Instant,
}

pub struct KeyValueStore {
    host: Arc<dyn HostStorage>,
    ttl: Duration,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl KeyValueStore {
    pub fn new(host: Arc<dyn HostStorage>) -> Self {
        Self::with_ttl(host, DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(host: Arc<dyn HostStorage>, ttl: Duration) -> Self {
        Self {
            host,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 读取并反序列化；存储为空时返回 `Ok(None)`，解析失败返回错误而不是 `None`。
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let value = self.get_value(key).await?;
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|source| StorageError::Parse {
                key: key.to_string(),
                source,
            })
    }

    pub async fn get_value(&self, key: &str) -> Result<Value, StorageError> {
        if let Some(value) = self.cached(key) {
            debug!(target: "storage", key, "cache hit");
            return Ok(value);
        }

        debug!(target: "storage", key, "cache miss, reading host storage");
        let raw = self.host.get_item(key).await?;
        let value = match raw.as_deref().map(str::trim) {
            None | Some("") => Value::Null,
            Some(text) => {
                serde_json::from_str(text).map_err(|source| StorageError::Parse {
                    key: key.to_string(),
                    source,
                })?
            }
        };
        self.fill(key, value.clone());
        Ok(value)
    }

    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let value = serde_json::to_value(value).map_err(StorageError::Serialize)?;
        self.set_value(key, value).await
    }

    pub async fn set_value(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let text = serde_json::to_string(&value).map_err(StorageError::Serialize)?;
        self.fill(key, value);
        self.host.set_item(key, text).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.cache().remove(key);
        self.host.remove_item(key).await
    }

    pub fn clear_cache(&self) {
        self.cache().clear();
    }

    fn cached(&self, key: &str) -> Option<Value> {
        let cache = self.cache();
        let entry = cache.get(key)?;
        (entry.stored_at.elapsed() < self.ttl).then(|| entry.value.clone())
    }

    fn fill(&self, key: &str, value: Value) {
        self.cache().insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        // 缓存只做纯内存操作，锁中毒时沿用内部数据
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
