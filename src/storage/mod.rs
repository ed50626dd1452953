//! 本地状态层：宿主键值存储 → 带缓存的 `KeyValueStore` → 偏好仓库。

pub mod host;
pub mod kv_store;
pub mod models;
pub mod preferences;

use thiserror::Error;

pub use host::{FileHostStorage, HostStorage, MemoryHostStorage};
pub use kv_store::KeyValueStore;
pub use models::{LastReadEntry, ProgressEntry, ReadingSettings, Role, StorageKey, Theme};
pub use preferences::UserPreferencesRepository;

#[derive(Debug, Error)]
pub enum StorageError {
    /// 宿主存储不可用或读写失败。
    #[error("storage transport error: {0}")]
    Transport(String),
    #[error("stored value for '{key}' is not valid json: {source}")]
    Parse {
        key: String,
        source: serde_json::Error,
    },
    #[error("value could not be serialized: {0}")]
    Serialize(serde_json::Error),
    /// 写入前的参数校验失败，不会触达存储。
    #[error("validation error: {0}")]
    Validation(String),
}
