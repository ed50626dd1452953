use async_trait::async_trait;

use super::ApiError;
use super::models::{Chapter, ChapterFeedItem, ChapterQuery, LatestQuery, Novel, NovelQuery, Paging};

/// 列表控制器与阅读会话依赖的只读接口。
///
/// [`CatalogClient`](super::CatalogClient) 是 HTTP 实现；测试里可以换成脚本化的桩。
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn list_novels(&self, query: &NovelQuery) -> Result<Vec<Novel>, ApiError>;

    async fn latest_chapters(&self, query: &LatestQuery) -> Result<Vec<ChapterFeedItem>, ApiError>;

    async fn search_novels(&self, query: &str, paging: Paging) -> Result<Vec<Novel>, ApiError>;

    async fn list_chapters(
        &self,
        novel_id: &str,
        query: &ChapterQuery,
    ) -> Result<Vec<Chapter>, ApiError>;
}
