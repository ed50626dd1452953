//! 用户偏好仓库：角色、阅读设置、订阅、书签、阅读进度、阅读历史。
//!
//! 每个修改操作都是“读一次 + 写一次”。所有修改串行通过同一把异步锁，
//! 两个并发的 `add_subscription` 不会互相覆盖；读操作不加锁。

use std::collections::BTreeMap;
use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::StorageError;
use super::kv_store::KeyValueStore;
use super::models::{
    LAST_READ_LIMIT, LastReadEntry, ProgressEntry, ReadingSettings, Role, StorageKey,
};

type ProgressMap = BTreeMap<String, ProgressEntry>;

pub struct UserPreferencesRepository {
    store: Arc<KeyValueStore>,
    mutations: Mutex<()>,
}

impl UserPreferencesRepository {
    pub fn new(store: Arc<KeyValueStore>) -> Self {
        Self {
            store,
            mutations: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &KeyValueStore {
        &self.store
    }

    // ── 角色 ────────────────────────────────────────────────

    pub async fn get_role(&self) -> Result<Role, StorageError> {
        Ok(self
            .store
            .get::<Role>(StorageKey::UserRole.as_str())
            .await?
            .unwrap_or_default())
    }

    pub async fn set_role(&self, role: Role) -> Result<(), StorageError> {
        let _serial = self.mutations.lock().await;
        info!(target: "storage", %role, "role updated");
        self.store.set(StorageKey::UserRole.as_str(), &role).await
    }

    // ── 阅读设置 ────────────────────────────────────────────

    pub async fn get_reading_settings(&self) -> Result<ReadingSettings, StorageError> {
        let stored = self
            .store
            .get::<ReadingSettings>(StorageKey::ReadingSettings.as_str())
            .await?;
        Ok(stored.unwrap_or_default().normalized())
    }

    pub async fn save_reading_settings(&self, settings: ReadingSettings) -> Result<(), StorageError> {
        settings.validate()?;
        let _serial = self.mutations.lock().await;
        self.store
            .set(StorageKey::ReadingSettings.as_str(), &settings)
            .await
    }

    // ── 订阅 / 书签 ─────────────────────────────────────────

    pub async fn get_subscriptions(&self) -> Result<Vec<String>, StorageError> {
        self.members(StorageKey::Subscriptions).await
    }

    /// 已订阅时不写入，返回 `false`。
    pub async fn add_subscription(&self, novel_id: &str) -> Result<bool, StorageError> {
        self.add_member(StorageKey::Subscriptions, novel_id).await
    }

    pub async fn remove_subscription(&self, novel_id: &str) -> Result<(), StorageError> {
        self.remove_member(StorageKey::Subscriptions, novel_id).await
    }

    /// 切换订阅状态，返回切换后的状态。
    pub async fn toggle_subscription(&self, novel_id: &str) -> Result<bool, StorageError> {
        self.toggle_member(StorageKey::Subscriptions, novel_id).await
    }

    pub async fn get_bookmarks(&self) -> Result<Vec<String>, StorageError> {
        self.members(StorageKey::Bookmarks).await
    }

    pub async fn add_bookmark(&self, novel_id: &str) -> Result<bool, StorageError> {
        self.add_member(StorageKey::Bookmarks, novel_id).await
    }

    pub async fn remove_bookmark(&self, novel_id: &str) -> Result<(), StorageError> {
        self.remove_member(StorageKey::Bookmarks, novel_id).await
    }

    pub async fn toggle_bookmark(&self, novel_id: &str) -> Result<bool, StorageError> {
        self.toggle_member(StorageKey::Bookmarks, novel_id).await
    }

    async fn members(&self, key: StorageKey) -> Result<Vec<String>, StorageError> {
        let mut ids = self
            .store
            .get::<Vec<String>>(key.as_str())
            .await?
            .unwrap_or_default();
        // 旧数据里可能有重复项，保留首次出现的位置
        let mut seen = std::collections::HashSet::with_capacity(ids.len());
        ids.retain(|id| seen.insert(id.clone()));
        Ok(ids)
    }

    async fn add_member(&self, key: StorageKey, novel_id: &str) -> Result<bool, StorageError> {
        let _serial = self.mutations.lock().await;
        let mut ids = self.members(key).await?;
        if ids.iter().any(|id| id == novel_id) {
            debug!(target: "storage", key = key.as_str(), novel_id, "already present");
            return Ok(false);
        }
        ids.push(novel_id.to_string());
        self.store.set(key.as_str(), &ids).await?;
        Ok(true)
    }

    async fn remove_member(&self, key: StorageKey, novel_id: &str) -> Result<(), StorageError> {
        let _serial = self.mutations.lock().await;
        let mut ids = self.members(key).await?;
        ids.retain(|id| id != novel_id);
        self.store.set(key.as_str(), &ids).await
    }

    async fn toggle_member(&self, key: StorageKey, novel_id: &str) -> Result<bool, StorageError> {
        let _serial = self.mutations.lock().await;
        let mut ids = self.members(key).await?;
        let present = ids.iter().any(|id| id == novel_id);
        if present {
            ids.retain(|id| id != novel_id);
        } else {
            ids.push(novel_id.to_string());
        }
        self.store.set(key.as_str(), &ids).await?;
        Ok(!present)
    }

    // ── 阅读进度 ────────────────────────────────────────────

    pub async fn get_reading_progress(
        &self,
        novel_id: &str,
    ) -> Result<Option<ProgressEntry>, StorageError> {
        let mut all = self.progress_map().await?;
        Ok(all.remove(novel_id))
    }

    pub async fn save_reading_progress(
        &self,
        novel_id: &str,
        chapter_id: &str,
        position: u32,
    ) -> Result<(), StorageError> {
        let _serial = self.mutations.lock().await;
        let mut all = self.progress_map().await?;
        all.insert(
            novel_id.to_string(),
            ProgressEntry {
                last_chapter_id: chapter_id.to_string(),
                scroll_position: position,
                updated_at: OffsetDateTime::now_utc(),
            },
        );
        debug!(target: "storage", novel_id, chapter_id, position, "progress saved");
        self.store
            .set(StorageKey::ReadingProgress.as_str(), &all)
            .await
    }

    async fn progress_map(&self) -> Result<ProgressMap, StorageError> {
        Ok(self
            .store
            .get::<ProgressMap>(StorageKey::ReadingProgress.as_str())
            .await?
            .unwrap_or_default())
    }

    // ── 阅读历史 ────────────────────────────────────────────

    /// 最近阅读在前。
    pub async fn get_last_read(&self) -> Result<Vec<LastReadEntry>, StorageError> {
        Ok(self
            .store
            .get::<Vec<LastReadEntry>>(StorageKey::LastRead.as_str())
            .await?
            .unwrap_or_default())
    }

    /// 新条目放在最前，同一本书的旧条目被移除，总数截断到 [`LAST_READ_LIMIT`]。
    pub async fn add_last_read(&self, novel_id: &str, chapter_id: &str) -> Result<(), StorageError> {
        let _serial = self.mutations.lock().await;
        let previous = self.get_last_read().await?;
        let entry = LastReadEntry {
            novel_id: novel_id.to_string(),
            chapter_id: chapter_id.to_string(),
            timestamp: OffsetDateTime::now_utc(),
        };
        let history: Vec<LastReadEntry> = std::iter::once(entry)
            .chain(previous.into_iter().filter(|e| e.novel_id != novel_id))
            .take(LAST_READ_LIMIT)
            .collect();
        self.store.set(StorageKey::LastRead.as_str(), &history).await
    }

    // ── 清理 ────────────────────────────────────────────────

    /// 删除全部逻辑键并清空缓存（账号/会话重置）。
    pub async fn clear_all(&self) -> Result<(), StorageError> {
        let _serial = self.mutations.lock().await;
        for key in StorageKey::ALL {
            self.store.remove(key.as_str()).await?;
        }
        self.store.clear_cache();
        info!(target: "storage", "all preferences cleared");
        Ok(())
    }
}
