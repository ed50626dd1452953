//! 搜索输入防抖：每次输入取消上一次尚未到期的任务，静默一段时间后才真正触发。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::{ListController, ListError};

/// 可取消的延时任务。到期后任务会完整执行，不再受后续取消影响。
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Option<CancellationToken>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn schedule<F>(&mut self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let token = CancellationToken::new();
        self.pending = Some(token.clone());
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            task.await;
        })
    }

    pub fn cancel(&mut self) {
        if let Some(token) = self.pending.take() {
            token.cancel();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// 搜索框：把输入防抖后交给 [`ListController::set_search_query`]。
///
/// 后台任务的失败通过 `errors` 通道回报给界面。
pub struct SearchBox {
    controller: Arc<ListController>,
    debouncer: Debouncer,
    errors: mpsc::UnboundedSender<ListError>,
}

impl SearchBox {
    pub fn new(
        controller: Arc<ListController>,
        delay: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<ListError>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                controller,
                debouncer: Debouncer::new(delay),
                errors: tx,
            },
            rx,
        )
    }

    pub fn input(&mut self, text: &str) -> JoinHandle<()> {
        let controller = self.controller.clone();
        let errors = self.errors.clone();
        let text = text.to_string();
        debug!(target: "search", query = %text, "input");
        self.debouncer.schedule(async move {
            if let Err(err) = controller.set_search_query(&text).await {
                error!(target: "search", "search failed: {err}");
                let _ = errors.send(err);
            }
        })
    }

    pub fn cancel(&mut self) {
        self.debouncer.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ApiError;
    use crate::network::models::{
        Chapter, ChapterFeedItem, ChapterQuery, LatestQuery, Novel, NovelQuery, Paging,
    };
    use crate::network::source::CatalogSource;
    use crate::session::Tab;
    use crate::storage::{KeyValueStore, MemoryHostStorage, UserPreferencesRepository};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingCatalog {
        queries: Mutex<Vec<Option<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl CatalogSource for RecordingCatalog {
        async fn list_novels(&self, _query: &NovelQuery) -> Result<Vec<Novel>, ApiError> {
            Ok(Vec::new())
        }

        async fn latest_chapters(&self, query: &LatestQuery) -> Result<Vec<ChapterFeedItem>, ApiError> {
            self.queries.lock().unwrap().push(query.query.clone());
            if self.fail {
                return Err(ApiError::Status {
                    status: 500,
                    message: "API Error".to_string(),
                });
            }
            Ok(Vec::new())
        }

        async fn search_novels(&self, _query: &str, _paging: Paging) -> Result<Vec<Novel>, ApiError> {
            Ok(Vec::new())
        }

        async fn list_chapters(
            &self,
            _novel_id: &str,
            _query: &ChapterQuery,
        ) -> Result<Vec<Chapter>, ApiError> {
            Ok(Vec::new())
        }
    }

    fn controller(catalog: Arc<RecordingCatalog>) -> Arc<ListController> {
        let store = KeyValueStore::new(Arc::new(MemoryHostStorage::new()));
        let prefs = Arc::new(UserPreferencesRepository::new(Arc::new(store)));
        Arc::new(ListController::new(catalog, prefs, Tab::Latest))
    }

    #[tokio::test(start_paused = true)]
    async fn debouncer_runs_only_the_last_task() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut debouncer = Debouncer::new(Duration::from_millis(300));

        for _ in 0..3 {
            let hits = hits.clone();
            debouncer.schedule(async move {
                hits.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_pending_task() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        let handle = debouncer.schedule({
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
            }
        });
        debouncer.cancel();
        handle.await.expect("join");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_typing_issues_one_search() {
        let catalog = Arc::new(RecordingCatalog::default());
        let (mut search, _errors) = SearchBox::new(controller(catalog.clone()), Duration::from_millis(300));

        search.input("a");
        tokio::time::sleep(Duration::from_millis(100)).await;
        search.input("ab");
        tokio::time::sleep(Duration::from_millis(100)).await;
        let last = search.input("abc");
        last.await.expect("join");

        assert_eq!(*catalog.queries.lock().unwrap(), vec![Some("abc".to_string())]);

        // 相同的搜索词不再触发请求
        search.input("abc ").await.expect("join");
        assert_eq!(catalog.queries.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_reported_on_channel() {
        let catalog = Arc::new(RecordingCatalog {
            fail: true,
            ..RecordingCatalog::default()
        });
        let (mut search, mut errors) = SearchBox::new(controller(catalog), Duration::from_millis(300));

        search.input("dragon").await.expect("join");
        let err = errors.recv().await.expect("error reported");
        assert!(matches!(err, ListError::Api(ApiError::Status { status: 500, .. })));
    }
}
