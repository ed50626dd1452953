//! 章节阅读会话：滚动进度、定时保存、打开章节时恢复位置。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::network::models::Chapter;
use crate::storage::{StorageError, UserPreferencesRepository};

/// 默认保存间隔。
pub const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_y: f64,
    pub document_height: f64,
    pub viewport_height: f64,
}

impl ScrollMetrics {
    /// 0..=100；内容不足一屏时为 0。
    pub fn progress_percent(&self) -> u8 {
        let scrollable = self.document_height - self.viewport_height;
        if scrollable <= 0.0 || !scrollable.is_finite() {
            return 0;
        }
        let ratio = (self.scroll_y / scrollable * 100.0).round();
        ratio.clamp(0.0, 100.0) as u8
    }

    pub fn position(&self) -> u32 {
        if !self.scroll_y.is_finite() {
            return 0;
        }
        self.scroll_y.max(0.0).round().min(u32::MAX as f64) as u32
    }
}

/// 打开章节的结果；`restore_position` 为 `None` 时从顶部开始。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStart {
    pub novel_id: String,
    pub chapter_id: String,
    pub restore_position: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterNeighbors {
    pub prev: Option<String>,
    pub next: Option<String>,
}

impl ChapterNeighbors {
    /// 按章节号确定上一章 / 下一章；找不到当前章节时两者都为空。
    pub fn locate(chapters: &[Chapter], current: &str) -> Self {
        let mut ordered: Vec<&Chapter> = chapters.iter().collect();
        ordered.sort_by_key(|c| c.chapter_number);
        let Some(idx) = ordered.iter().position(|c| c.id == current) else {
            return Self::default();
        };
        Self {
            prev: idx
                .checked_sub(1)
                .and_then(|i| ordered.get(i))
                .map(|c| c.id.clone()),
            next: ordered.get(idx + 1).map(|c| c.id.clone()),
        }
    }
}

pub struct ReadingSessionTracker {
    prefs: Arc<UserPreferencesRepository>,
    novel_id: String,
    chapter_id: String,
    save_interval: Duration,
    last_saved: Option<Instant>,
    position: u32,
    progress: u8,
}

impl ReadingSessionTracker {
    /// 进入章节：仅当记录的章节与当前章节一致且位置大于 0 时恢复位置，
    /// 之后写入阅读历史。
    pub async fn open(
        prefs: Arc<UserPreferencesRepository>,
        novel_id: &str,
        chapter_id: &str,
        save_interval: Duration,
    ) -> Result<(Self, SessionStart), StorageError> {
        let mut tracker = Self {
            prefs,
            novel_id: novel_id.to_string(),
            chapter_id: String::new(),
            save_interval,
            last_saved: None,
            position: 0,
            progress: 0,
        };
        let start = tracker.enter(chapter_id).await?;
        Ok((tracker, start))
    }

    pub fn novel_id(&self) -> &str {
        &self.novel_id
    }

    pub fn chapter_id(&self) -> &str {
        &self.chapter_id
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn position(&self) -> u32 {
        self.position
    }

    /// 每次滚动都更新进度；距上次保存超过间隔（首次滚动总是）才落盘。
    /// 返回是否发生了保存。
    pub async fn on_scroll(&mut self, metrics: ScrollMetrics) -> Result<bool, StorageError> {
        self.progress = metrics.progress_percent();
        self.position = metrics.position();

        let now = Instant::now();
        let due = self
            .last_saved
            .is_none_or(|t| now.duration_since(t) > self.save_interval);
        if !due {
            return Ok(false);
        }
        self.last_saved = Some(now);
        self.persist().await?;
        Ok(true)
    }

    /// 立即保存，不受间隔限制。
    pub async fn flush(&mut self) -> Result<(), StorageError> {
        self.last_saved = Some(Instant::now());
        self.persist().await
    }

    /// 切换章节前先强制保存当前位置。
    pub async fn navigate(&mut self, chapter_id: &str) -> Result<SessionStart, StorageError> {
        self.flush().await?;
        info!(
            target: "reader",
            novel_id = %self.novel_id,
            from = %self.chapter_id,
            to = chapter_id,
            "navigate"
        );
        self.enter(chapter_id).await
    }

    async fn enter(&mut self, chapter_id: &str) -> Result<SessionStart, StorageError> {
        let restore_position = self
            .prefs
            .get_reading_progress(&self.novel_id)
            .await?
            .filter(|p| p.last_chapter_id == chapter_id && p.scroll_position > 0)
            .map(|p| p.scroll_position);

        self.chapter_id = chapter_id.to_string();
        self.position = restore_position.unwrap_or(0);
        self.progress = 0;
        self.last_saved = None;

        self.prefs.add_last_read(&self.novel_id, chapter_id).await?;
        debug!(
            target: "reader",
            novel_id = %self.novel_id,
            chapter_id,
            restore = ?restore_position,
            "chapter opened"
        );
        Ok(SessionStart {
            novel_id: self.novel_id.clone(),
            chapter_id: self.chapter_id.clone(),
            restore_position,
        })
    }

    async fn persist(&self) -> Result<(), StorageError> {
        self.prefs
            .save_reading_progress(&self.novel_id, &self.chapter_id, self.position)
            .await
    }
}
