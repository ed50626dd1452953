//! 译者后台的写操作：新建 / 修改 / 删除小说，发布章节。
//!
//! 修改类操作先取回小说并核对 `translator_id`，不属于当前译者时直接中止，
//! 不会发出写请求。服务端的 401/403/404 也归入同样的中止类错误。

use thiserror::Error;
use tracing::{info, warn};

use crate::network::models::{Chapter, ChapterDraft, Novel, NovelDraft};
use crate::network::{ApiError, CatalogClient};
use crate::storage::{Role, StorageError, UserPreferencesRepository};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("only translators can manage novels")]
    NotTranslator,
    #[error("novel {0} not found")]
    NovelNotFound(String),
    #[error("novel {0} belongs to another translator")]
    AccessDenied(String),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl PublishError {
    /// 需要离开编辑界面的错误；其余错误可以原地重试。
    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            PublishError::NotTranslator
                | PublishError::NovelNotFound(_)
                | PublishError::AccessDenied(_)
        )
    }

    fn for_novel(novel_id: &str, err: ApiError) -> Self {
        if err.is_access_denied() {
            PublishError::AccessDenied(novel_id.to_string())
        } else if err.is_not_found() {
            PublishError::NovelNotFound(novel_id.to_string())
        } else {
            PublishError::Api(err)
        }
    }
}

/// 以某位译者身份执行写操作。
pub struct Publisher<'a> {
    client: &'a CatalogClient,
    prefs: &'a UserPreferencesRepository,
    user_id: &'a str,
}

impl<'a> Publisher<'a> {
    pub fn new(
        client: &'a CatalogClient,
        prefs: &'a UserPreferencesRepository,
        user_id: &'a str,
    ) -> Self {
        Self {
            client,
            prefs,
            user_id,
        }
    }

    /// `translator_id` 总是填成当前译者。
    pub async fn create_novel(&self, mut draft: NovelDraft) -> Result<Novel, PublishError> {
        self.ensure_translator().await?;
        draft.translator_id = self.user_id.to_string();
        let novel = self.client.create_novel(&draft).await.map_err(|err| {
            if err.is_access_denied() {
                PublishError::NotTranslator
            } else {
                PublishError::Api(err)
            }
        })?;
        info!(target: "publish", novel_id = %novel.id, "novel created");
        Ok(novel)
    }

    pub async fn edit_novel(
        &self,
        novel_id: &str,
        mut draft: NovelDraft,
    ) -> Result<Novel, PublishError> {
        self.owned_novel(novel_id).await?;
        draft.translator_id = self.user_id.to_string();
        let novel = self
            .client
            .update_novel(novel_id, &draft)
            .await
            .map_err(|err| PublishError::for_novel(novel_id, err))?;
        info!(target: "publish", novel_id, "novel updated");
        Ok(novel)
    }

    pub async fn delete_novel(&self, novel_id: &str) -> Result<(), PublishError> {
        self.owned_novel(novel_id).await?;
        self.client
            .delete_novel(novel_id)
            .await
            .map_err(|err| PublishError::for_novel(novel_id, err))?;
        info!(target: "publish", novel_id, "novel deleted");
        Ok(())
    }

    pub async fn publish_chapter(
        &self,
        novel_id: &str,
        draft: &ChapterDraft,
    ) -> Result<Chapter, PublishError> {
        draft.validate()?;
        self.owned_novel(novel_id).await?;
        let chapter = self
            .client
            .create_chapter(novel_id, draft)
            .await
            .map_err(|err| PublishError::for_novel(novel_id, err))?;
        info!(
            target: "publish",
            novel_id,
            chapter_id = %chapter.id,
            number = chapter.chapter_number,
            "chapter published"
        );
        Ok(chapter)
    }

    async fn ensure_translator(&self) -> Result<(), PublishError> {
        if self.prefs.get_role().await? != Role::Translator {
            return Err(PublishError::NotTranslator);
        }
        Ok(())
    }

    async fn owned_novel(&self, novel_id: &str) -> Result<Novel, PublishError> {
        self.ensure_translator().await?;
        let novel = self
            .client
            .get_novel(novel_id)
            .await
            .map_err(|err| PublishError::for_novel(novel_id, err))?;
        if novel.translator_id.as_deref() != Some(self.user_id) {
            warn!(
                target: "publish",
                novel_id,
                owner = ?novel.translator_id,
                user_id = self.user_id,
                "not the owner"
            );
            return Err(PublishError::AccessDenied(novel_id.to_string()));
        }
        Ok(novel)
    }
}
