//! HTTP 目录客户端。
//!
//! 所有请求都以 `api_base_url` 为根，成功响应为 `{"data": ...}`，
//! 失败响应为 `{"detail": "..."}`。这里不做任何自动重试。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::ApiError;
use super::models::{
    Chapter, ChapterDraft, ChapterFeedItem, ChapterQuery, LatestQuery, NewTranslator, Novel,
    NovelDraft, NovelQuery, Paging, Tag, Translator, TranslatorStats, TranslatorUpdate,
};
use super::source::CatalogSource;
use crate::base_system::context::Config;

const GENERIC_ERROR: &str = "API Error";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<Value>,
}

#[derive(Clone)]
pub struct CatalogClient {
    client: Client,
    base: Url,
}

impl CatalogClient {
    pub fn new(
        base_url: &str,
        timeout: Option<Duration>,
        connect_timeout: Option<Duration>,
    ) -> Result<Self, ApiError> {
        let base = Url::parse(base_url.trim())
            .map_err(|err| ApiError::Validation(format!("invalid base url '{base_url}': {err}")))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::Validation(format!(
                "base url '{base_url}' cannot carry a path"
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut builder = Client::builder().default_headers(headers);
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        if let Some(t) = connect_timeout {
            builder = builder.connect_timeout(t);
        }

        Ok(Self {
            client: builder.build()?,
            base,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::new(
            &config.api_base_url,
            Some(config.request_timeout()),
            Some(config.connect_timeout()),
        )
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Validation("base url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, ApiError> {
        let url = self.endpoint(segments)?;
        debug!(target: "catalog", %method, %url, "request");
        Ok(self.client.request(method, url))
    }

    /// 发送请求并拆出 `data`；`data` 缺失视为响应格式错误。
    async fn fetch<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        self.fetch_optional(req)
            .await?
            .ok_or_else(|| ApiError::Decode("response envelope has no data".to_string()))
    }

    async fn fetch_optional<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
    ) -> Result<Option<T>, ApiError> {
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;

        if !status.is_success() {
            let message = error_message(&body);
            warn!(target: "catalog", status = status.as_u16(), %message, "request failed");
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        // 204 等空响应
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let envelope: Envelope<T> = serde_json::from_slice(&body)
            .map_err(|err| ApiError::Decode(format!("{err}")))?;
        Ok(envelope.data)
    }

    /// 只关心成功与否的请求（删除、计数）。
    async fn execute(&self, req: RequestBuilder) -> Result<(), ApiError> {
        self.fetch_optional::<Value>(req).await.map(|_| ())
    }

    // ── 译者 ────────────────────────────────────────────────

    pub async fn get_translator(&self, user_id: &str) -> Result<Translator, ApiError> {
        self.fetch(self.request(Method::GET, &["translators", user_id])?)
            .await
    }

    pub async fn create_translator(&self, data: &NewTranslator) -> Result<Translator, ApiError> {
        data.validate()?;
        self.fetch(self.request(Method::POST, &["translators"])?.json(data))
            .await
    }

    pub async fn update_translator(
        &self,
        user_id: &str,
        data: &TranslatorUpdate,
    ) -> Result<Translator, ApiError> {
        self.fetch(self.request(Method::PUT, &["translators", user_id])?.json(data))
            .await
    }

    pub async fn translator_stats(&self, user_id: &str) -> Result<TranslatorStats, ApiError> {
        self.fetch(self.request(Method::GET, &["translators", user_id, "stats"])?)
            .await
    }

    // ── 小说 ────────────────────────────────────────────────

    pub async fn list_novels(&self, query: &NovelQuery) -> Result<Vec<Novel>, ApiError> {
        self.fetch(self.request(Method::GET, &["novels"])?.query(&query.params()))
            .await
    }

    pub async fn get_novel(&self, novel_id: &str) -> Result<Novel, ApiError> {
        self.fetch(self.request(Method::GET, &["novels", novel_id])?)
            .await
    }

    pub async fn create_novel(&self, draft: &NovelDraft) -> Result<Novel, ApiError> {
        draft.validate()?;
        self.fetch(self.request(Method::POST, &["novels"])?.json(draft))
            .await
    }

    pub async fn update_novel(&self, novel_id: &str, draft: &NovelDraft) -> Result<Novel, ApiError> {
        draft.validate()?;
        self.fetch(self.request(Method::PUT, &["novels", novel_id])?.json(draft))
            .await
    }

    pub async fn delete_novel(&self, novel_id: &str) -> Result<(), ApiError> {
        self.execute(self.request(Method::DELETE, &["novels", novel_id])?)
            .await
    }

    pub async fn increment_novel_views(&self, novel_id: &str) -> Result<(), ApiError> {
        self.execute(self.request(Method::POST, &["novels", novel_id, "views"])?)
            .await
    }

    pub async fn search_novels(&self, query: &str, paging: Paging) -> Result<Vec<Novel>, ApiError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let mut params: Vec<(&str, String)> = vec![("query", query.to_string())];
        params.extend(paging.params());
        self.fetch(self.request(Method::GET, &["novels", "search"])?.query(&params))
            .await
    }

    // ── 章节 ────────────────────────────────────────────────

    pub async fn list_chapters(
        &self,
        novel_id: &str,
        query: &ChapterQuery,
    ) -> Result<Vec<Chapter>, ApiError> {
        self.fetch(
            self.request(Method::GET, &["novels", novel_id, "chapters"])?
                .query(&query.params()),
        )
        .await
    }

    pub async fn get_chapter(&self, novel_id: &str, chapter_id: &str) -> Result<Chapter, ApiError> {
        self.fetch(self.request(Method::GET, &["novels", novel_id, "chapters", chapter_id])?)
            .await
    }

    pub async fn create_chapter(
        &self,
        novel_id: &str,
        draft: &ChapterDraft,
    ) -> Result<Chapter, ApiError> {
        draft.validate()?;
        self.fetch(
            self.request(Method::POST, &["novels", novel_id, "chapters"])?
                .json(draft),
        )
        .await
    }

    pub async fn update_chapter(
        &self,
        novel_id: &str,
        chapter_id: &str,
        draft: &ChapterDraft,
    ) -> Result<Chapter, ApiError> {
        draft.validate()?;
        self.fetch(
            self.request(Method::PUT, &["novels", novel_id, "chapters", chapter_id])?
                .json(draft),
        )
        .await
    }

    pub async fn delete_chapter(&self, novel_id: &str, chapter_id: &str) -> Result<(), ApiError> {
        self.execute(self.request(Method::DELETE, &["novels", novel_id, "chapters", chapter_id])?)
            .await
    }

    pub async fn increment_chapter_views(
        &self,
        novel_id: &str,
        chapter_id: &str,
    ) -> Result<(), ApiError> {
        self.execute(self.request(
            Method::POST,
            &["novels", novel_id, "chapters", chapter_id, "views"],
        )?)
        .await
    }

    pub async fn latest_chapters(
        &self,
        query: &LatestQuery,
    ) -> Result<Vec<ChapterFeedItem>, ApiError> {
        self.fetch(
            self.request(Method::GET, &["chapters", "latest"])?
                .query(&query.params()),
        )
        .await
    }

    // ── 标签 ────────────────────────────────────────────────

    pub async fn list_tags(&self) -> Result<Vec<Tag>, ApiError> {
        self.fetch(self.request(Method::GET, &["tags"])?).await
    }

    pub async fn novel_tags(&self, novel_id: &str) -> Result<Vec<Tag>, ApiError> {
        self.fetch(self.request(Method::GET, &["novels", novel_id, "tags"])?)
            .await
    }

    pub async fn update_novel_tags(&self, novel_id: &str, tags: &[String]) -> Result<(), ApiError> {
        #[derive(Serialize)]
        struct TagsBody<'a> {
            tags: &'a [String],
        }
        self.execute(
            self.request(Method::PUT, &["novels", novel_id, "tags"])?
                .json(&TagsBody { tags }),
        )
        .await
    }
}

fn error_message(body: &[u8]) -> String {
    let detail = serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.detail);
    match detail {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        Some(Value::Null) | None => GENERIC_ERROR.to_string(),
        Some(Value::String(_)) => GENERIC_ERROR.to_string(),
        // FastAPI 校验失败时 detail 是数组
        Some(other) => other.to_string(),
    }
}

#[async_trait]
impl CatalogSource for CatalogClient {
    async fn list_novels(&self, query: &NovelQuery) -> Result<Vec<Novel>, ApiError> {
        CatalogClient::list_novels(self, query).await
    }

    async fn latest_chapters(&self, query: &LatestQuery) -> Result<Vec<ChapterFeedItem>, ApiError> {
        CatalogClient::latest_chapters(self, query).await
    }

    async fn search_novels(&self, query: &str, paging: Paging) -> Result<Vec<Novel>, ApiError> {
        CatalogClient::search_novels(self, query, paging).await
    }

    async fn list_chapters(
        &self,
        novel_id: &str,
        query: &ChapterQuery,
    ) -> Result<Vec<Chapter>, ApiError> {
        CatalogClient::list_chapters(self, novel_id, query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> CatalogClient {
        CatalogClient::new(base, None, None).expect("client")
    }

    #[test]
    fn endpoints_append_to_base_path() {
        let c = client("http://localhost:8000/api");
        let url = c.endpoint(&["novels", "42", "chapters"]).expect("url");
        assert_eq!(url.as_str(), "http://localhost:8000/api/novels/42/chapters");

        let c = client("http://localhost:8000/api/");
        let url = c.endpoint(&["tags"]).expect("url");
        assert_eq!(url.as_str(), "http://localhost:8000/api/tags");
    }

    #[test]
    fn path_segments_are_escaped() {
        let c = client("http://localhost/api");
        let url = c.endpoint(&["novels", "a/b"]).expect("url");
        assert_eq!(url.as_str(), "http://localhost/api/novels/a%2Fb");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(
            CatalogClient::new("not a url", None, None),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn error_message_prefers_detail() {
        assert_eq!(error_message(br#"{"detail":"Novel not found"}"#), "Novel not found");
        assert_eq!(error_message(b"<html>"), GENERIC_ERROR);
        assert_eq!(error_message(br#"{"detail":""}"#), GENERIC_ERROR);
        assert!(error_message(br#"{"detail":[{"msg":"field required"}]}"#).contains("field required"));
    }
}
