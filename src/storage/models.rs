//! 本地偏好记录的数据模型。
//!
//! 字段名与宿主存储中的 JSON 保持一致（camelCase），旧客户端写入的
//! `lastChapter` / `position` 通过别名兼容读取。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

use super::StorageError;

pub const MIN_FONT_SIZE: u8 = 14;
pub const MAX_FONT_SIZE: u8 = 24;
pub const DEFAULT_FONT_SIZE: u8 = 18;
pub const FONT_SIZE_STEP: u8 = 2;

/// 阅读历史最多保留的条目数。
pub const LAST_READ_LIMIT: usize = 20;

/// 宿主存储中的逻辑键，每个偏好字段一个。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    UserRole,
    ReadingSettings,
    Subscriptions,
    Bookmarks,
    ReadingProgress,
    LastRead,
}

impl StorageKey {
    pub const ALL: [StorageKey; 6] = [
        StorageKey::UserRole,
        StorageKey::ReadingSettings,
        StorageKey::Subscriptions,
        StorageKey::Bookmarks,
        StorageKey::ReadingProgress,
        StorageKey::LastRead,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StorageKey::UserRole => "user_role",
            StorageKey::ReadingSettings => "reading_settings",
            StorageKey::Subscriptions => "subscriptions",
            StorageKey::Bookmarks => "bookmarks",
            StorageKey::ReadingProgress => "reading_progress",
            StorageKey::LastRead => "last_read",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Reader,
    Translator,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Reader => "reader",
            Role::Translator => "translator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "reader" => Ok(Role::Reader),
            "translator" => Ok(Role::Translator),
            other => Err(StorageError::Validation(format!("invalid role '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Sepia,
    Dark,
}

impl FromStr for Theme {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "light" => Ok(Theme::Light),
            "sepia" => Ok(Theme::Sepia),
            "dark" => Ok(Theme::Dark),
            other => Err(StorageError::Validation(format!("invalid theme '{other}'"))),
        }
    }
}

/// 阅读设置。缺失字段在反序列化时取默认值，因此旧版本留下的不完整记录也能读出完整结构。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReadingSettings {
    pub font_size: u8,
    pub theme: Theme,
}

impl Default for ReadingSettings {
    fn default() -> Self {
        Self {
            font_size: DEFAULT_FONT_SIZE,
            theme: Theme::Light,
        }
    }
}

impl ReadingSettings {
    /// 先收敛到合法档位再调整，结果总能通过 `validate`。
    pub fn increase_font(&mut self) {
        *self = self.normalized();
        self.font_size = self
            .font_size
            .saturating_add(FONT_SIZE_STEP)
            .min(MAX_FONT_SIZE);
    }

    pub fn decrease_font(&mut self) {
        *self = self.normalized();
        self.font_size = self
            .font_size
            .saturating_sub(FONT_SIZE_STEP)
            .max(MIN_FONT_SIZE);
    }

    pub fn reset_font(&mut self) {
        self.font_size = DEFAULT_FONT_SIZE;
    }

    pub fn validate(&self) -> Result<(), StorageError> {
        let size = self.font_size;
        if !(MIN_FONT_SIZE..=MAX_FONT_SIZE).contains(&size)
            || (size - MIN_FONT_SIZE) % FONT_SIZE_STEP != 0
        {
            return Err(StorageError::Validation(format!(
                "font size {size} outside {MIN_FONT_SIZE}..={MAX_FONT_SIZE} step {FONT_SIZE_STEP}"
            )));
        }
        Ok(())
    }

    /// 把存储中可能越界的值收敛到合法档位。
    pub(crate) fn normalized(mut self) -> Self {
        let size = self.font_size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
        self.font_size = size - (size - MIN_FONT_SIZE) % FONT_SIZE_STEP;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    #[serde(alias = "lastChapter")]
    pub last_chapter_id: String,
    #[serde(alias = "position", default, deserialize_with = "de_pixels")]
    pub scroll_position: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

// 浏览器的 scrollY 可能带小数
fn de_pixels<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok(raw.max(0.0).round().min(u32::MAX as f64) as u32)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastReadEntry {
    pub novel_id: String,
    pub chapter_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}
