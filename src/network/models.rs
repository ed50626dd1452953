//! 后端接口的数据结构：返回体、提交体与分页/排序参数。

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use super::ApiError;

/// 每页条数；返回条数等于该值即认为可能还有下一页。
pub const PAGE_SIZE: u32 = 20;

/// 后端 id 可能是数字也可能是字符串，统一成字符串。
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Num(i64),
    Text(String),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Num(n) => n.to_string(),
            RawId::Text(s) => s,
        }
    }
}

fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawId::deserialize(deserializer).map(String::from)
}

fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawId>::deserialize(deserializer)?.map(String::from))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Novel {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub translator_id: Option<String>,
    #[serde(default)]
    pub translator_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub subscribers: u64,
    #[serde(default)]
    pub chapters_count: Option<u64>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(deserialize_with = "de_id")]
    pub novel_id: String,
    pub chapter_number: u32,
    pub title: String,
    /// 列表接口通常不带正文。
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// “最新章节”流中的一条。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterFeedItem {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(deserialize_with = "de_id")]
    pub novel_id: String,
    #[serde(default)]
    pub novel_title: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    pub chapter_number: u32,
    pub title: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translator {
    #[serde(deserialize_with = "de_id")]
    pub user_id: String,
    #[serde(default)]
    pub username: Option<String>,
    pub display_name: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatorStats {
    #[serde(default, alias = "novelsCount")]
    pub novels_count: u64,
    #[serde(default, alias = "chaptersCount")]
    pub chapters_count: u64,
    #[serde(default, alias = "subscribersCount")]
    pub subscribers_count: u64,
    #[serde(default)]
    pub views: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(default, deserialize_with = "de_opt_id")]
    pub id: Option<String>,
    pub name: String,
}

// ── 提交体 ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct NewTranslator {
    pub user_id: String,
    pub username: Option<String>,
    pub display_name: String,
    pub bio: Option<String>,
}

impl NewTranslator {
    pub fn validate(&self) -> Result<(), ApiError> {
        require("user_id", &self.user_id)?;
        require("display_name", &self.display_name)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TranslatorUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NovelDraft {
    pub title: String,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub translator_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl NovelDraft {
    pub fn validate(&self) -> Result<(), ApiError> {
        require("title", &self.title)?;
        require("translator_id", &self.translator_id)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChapterDraft {
    pub chapter_number: u32,
    pub title: String,
    pub content: String,
}

impl ChapterDraft {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.chapter_number == 0 {
            return Err(ApiError::Validation(
                "chapter_number must be at least 1".to_string(),
            ));
        }
        require("title", &self.title)?;
        require("content", &self.content)
    }
}

fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::Validation(format!("{field} is required")));
    }
    Ok(())
}

// ── 查询参数 ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub page: u32,
    pub limit: u32,
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            page: 1,
            limit: PAGE_SIZE,
        }
    }
}

impl Paging {
    pub fn page(page: u32) -> Self {
        Self {
            page: page.max(1),
            ..Self::default()
        }
    }

    pub(crate) fn params(self) -> [(&'static str, String); 2] {
        [
            ("page", self.page.max(1).to_string()),
            ("limit", self.limit.max(1).to_string()),
        ]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    #[default]
    UpdatedAt,
    CreatedAt,
    Title,
    Views,
    Subscribers,
}

impl SortField {
    pub fn as_str(self) -> &'static str {
        match self {
            SortField::UpdatedAt => "updated_at",
            SortField::CreatedAt => "created_at",
            SortField::Title => "title",
            SortField::Views => "views",
            SortField::Subscribers => "subscribers",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sort {
    pub field: SortField,
    pub order: SortOrder,
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field.as_str(), self.order.as_str())
    }
}

/// `/novels` 列表查询。`ids` 非空时只返回这些小说（订阅/书签视图）。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NovelQuery {
    pub paging: Paging,
    pub sort: Sort,
    pub translator_id: Option<String>,
    pub ids: Vec<String>,
}

impl NovelQuery {
    pub(crate) fn params(&self) -> Vec<(&'static str, String)> {
        let mut params: Vec<(&'static str, String)> = self.paging.params().into();
        params.push(("sort", self.sort.field.as_str().to_string()));
        params.push(("order", self.sort.order.as_str().to_string()));
        if let Some(id) = self.translator_id.as_deref().filter(|s| !s.is_empty()) {
            params.push(("translator_id", id.to_string()));
        }
        if !self.ids.is_empty() {
            params.push(("ids", self.ids.join(",")));
        }
        params
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterQuery {
    pub paging: Paging,
    /// 按章节号排序的方向，缺省由后端决定。
    pub order: Option<SortOrder>,
}

impl ChapterQuery {
    pub(crate) fn params(&self) -> Vec<(&'static str, String)> {
        let mut params: Vec<(&'static str, String)> = self.paging.params().into();
        if let Some(order) = self.order {
            params.push(("order", order.as_str().to_string()));
        }
        params
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatestQuery {
    pub paging: Paging,
    pub subscribed_only: bool,
    pub query: Option<String>,
}

impl LatestQuery {
    pub(crate) fn params(&self) -> Vec<(&'static str, String)> {
        let mut params: Vec<(&'static str, String)> = self.paging.params().into();
        params.push(("subscribed_only", self.subscribed_only.to_string()));
        if let Some(q) = self.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            params.push(("query", q.to_string()));
        }
        params
    }
}
