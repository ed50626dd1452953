//! 宿主键值存储接口及两种实现。
//!
//! 宿主容器只认字符串：`getItem(key) -> value`、`setItem(key, value)`、`removeItem(key)`。
//! 序列化交给上层 [`KeyValueStore`](super::kv_store::KeyValueStore)。

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::StorageError;

#[async_trait]
pub trait HostStorage: Send + Sync {
    /// 不存在的键返回 `None`；部分宿主对缺失键返回空串，调用方同样视为缺失。
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError>;

    async fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// 进程内实现，附带读写计数，便于观察缓存是否生效。
#[derive(Debug, Default)]
pub struct MemoryHostStorage {
    items: Mutex<HashMap<String, String>>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MemoryHostStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items<I, K, V>(items: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            items: Mutex::new(
                items
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            ..Self::default()
        }
    }

    /// 底层 `get_item` 被调用的次数。
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// 直接读取原始字符串，不计入读计数。
    pub async fn raw(&self, key: &str) -> Option<String> {
        self.items.lock().await.get(key).cloned()
    }
}

#[async_trait]
impl HostStorage for MemoryHostStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.items.lock().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.items.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.items.lock().await.remove(key);
        Ok(())
    }
}

/// 以单个 JSON 对象文件模拟宿主云存储（命令行前端使用）。
///
/// 每次写入都会整体重写文件；文件不存在视为空存储。
#[derive(Debug)]
pub struct FileHostStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileHostStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BTreeMap::new());
            }
            Err(err) => {
                return Err(StorageError::Transport(format!(
                    "read {}: {err}",
                    self.path.display()
                )));
            }
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|err| {
            StorageError::Transport(format!("corrupt store {}: {err}", self.path.display()))
        })
    }

    async fn persist(&self, items: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|err| {
                StorageError::Transport(format!("create {}: {err}", parent.display()))
            })?;
        }
        let body = serde_json::to_string_pretty(items)
            .map_err(|err| StorageError::Transport(err.to_string()))?;
        // 先写临时文件再改名，避免中途失败留下半截文件
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|err| StorageError::Transport(format!("write {}: {err}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|err| {
            StorageError::Transport(format!("rename {}: {err}", self.path.display()))
        })
    }
}

#[async_trait]
impl HostStorage for FileHostStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut items = self.load().await?;
        items.insert(key.to_string(), value);
        self.persist(&items).await?;
        debug!(target: "storage", key, path = %self.path.display(), "host item written");
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut items = self.load().await?;
        if items.remove(key).is_some() {
            self.persist(&items).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn memory_storage_counts_reads_and_writes() {
        let host = MemoryHostStorage::with_items([("a", "1")]);
        assert_eq!(host.get_item("a").await.expect("get"), Some("1".to_string()));
        assert_eq!(host.get_item("b").await.expect("get"), None);
        host.set_item("b", "2".to_string()).await.expect("set");
        host.remove_item("a").await.expect("remove");

        assert_eq!(host.reads(), 2);
        assert_eq!(host.writes(), 2);
        assert_eq!(host.raw("a").await, None);
        assert_eq!(host.raw("b").await, Some("2".to_string()));
    }

    #[tokio::test]
    async fn file_storage_round_trips_through_disk() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("store.json");

        let host = FileHostStorage::new(&path);
        assert_eq!(host.get_item("k").await.expect("empty get"), None);
        host.set_item("k", "[\"1\"]".to_string()).await.expect("set");

        let reopened = FileHostStorage::new(&path);
        assert_eq!(
            reopened.get_item("k").await.expect("get"),
            Some("[\"1\"]".to_string())
        );

        reopened.remove_item("k").await.expect("remove");
        assert_eq!(host.get_item("k").await.expect("get"), None);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_transport_error() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("store.json");
        std::fs::write(&path, "not json").expect("seed");

        let host = FileHostStorage::new(&path);
        let err = host.get_item("k").await.unwrap_err();
        assert!(matches!(err, StorageError::Transport(_)));
    }
}
