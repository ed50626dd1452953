//! 分页列表状态机（订阅 / 书签 / 最新章节 / 搜索 / 译者作品 / 章节目录）。
//!
//! 状态：`Idle` → `Loading` → `Idle` 或 `Exhausted`。
//! - `reset()`：page=1、has_more=true、清空列表和占位状态，随后立即 `load_next()`。
//! - `load_next()`：正在加载或没有更多时直接跳过；成功后 page+1，
//!   返回条数等于 [`PAGE_SIZE`] 才认为还有下一页。
//! - 每次 `reset()` 递增 epoch，加载返回时 epoch 已变化的结果直接丢弃。
//!
//! 状态锁只在同步片段内持有，不跨越任何 `.await`。

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use super::ListError;
use crate::network::models::{
    Chapter, ChapterFeedItem, ChapterQuery, LatestQuery, Novel, NovelQuery, PAGE_SIZE, Paging, Sort,
};
use crate::network::source::CatalogSource;
use crate::storage::UserPreferencesRepository;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tab {
    Subscriptions,
    Bookmarks,
    Latest,
    Search,
    /// 译者后台：只列出该译者的作品。
    Translator(String),
    /// 某部小说的章节目录，只使用排序中的方向。
    Chapters(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// 最新章节流只看已订阅的小说。
    pub subscribed_only: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListItem {
    Novel(Novel),
    /// 最新章节流中的条目
    Feed(ChapterFeedItem),
    Chapter(Chapter),
}

impl ListItem {
    pub fn id(&self) -> &str {
        match self {
            ListItem::Novel(n) => &n.id,
            ListItem::Feed(c) => &c.id,
            ListItem::Chapter(c) => &c.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            ListItem::Novel(n) => &n.title,
            ListItem::Feed(c) => &c.title,
            ListItem::Chapter(c) => &c.title,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListPhase {
    Idle,
    Loading,
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { count: usize, has_more: bool },
    /// 正在加载或已无更多，没有发出请求。
    Skipped,
    /// 加载期间发生了 reset，结果被丢弃。
    Stale,
}

#[derive(Debug, Clone)]
pub struct ListSnapshot {
    pub tab: Tab,
    pub items: Vec<ListItem>,
    pub page: u32,
    pub has_more: bool,
    pub phase: ListPhase,
    pub show_empty_placeholder: bool,
    pub sort: Sort,
    pub filter: ListFilter,
    pub search_query: String,
}

#[derive(Debug)]
struct ListState {
    tab: Tab,
    sort: Sort,
    filter: ListFilter,
    search_query: String,
    items: Vec<ListItem>,
    page: u32,
    has_more: bool,
    loading: bool,
    empty_placeholder: bool,
    epoch: u64,
    trigger_visible: bool,
}

impl ListState {
    fn phase(&self) -> ListPhase {
        if self.loading {
            ListPhase::Loading
        } else if !self.has_more {
            ListPhase::Exhausted
        } else {
            ListPhase::Idle
        }
    }
}

/// 一次加载所需参数的快照，发出请求前从状态中拷出。
#[derive(Debug, Clone)]
struct PendingLoad {
    epoch: u64,
    page: u32,
    tab: Tab,
    sort: Sort,
    filter: ListFilter,
    search_query: String,
}

pub struct ListController {
    catalog: Arc<dyn CatalogSource>,
    prefs: Arc<UserPreferencesRepository>,
    state: Mutex<ListState>,
}

impl ListController {
    pub fn new(
        catalog: Arc<dyn CatalogSource>,
        prefs: Arc<UserPreferencesRepository>,
        tab: Tab,
    ) -> Self {
        Self {
            catalog,
            prefs,
            state: Mutex::new(ListState {
                tab,
                sort: Sort::default(),
                filter: ListFilter::default(),
                search_query: String::new(),
                items: Vec::new(),
                page: 1,
                has_more: true,
                loading: false,
                empty_placeholder: false,
                epoch: 0,
                trigger_visible: false,
            }),
        }
    }

    pub fn snapshot(&self) -> ListSnapshot {
        let st = self.state();
        ListSnapshot {
            tab: st.tab.clone(),
            items: st.items.clone(),
            page: st.page,
            has_more: st.has_more,
            phase: st.phase(),
            show_empty_placeholder: st.empty_placeholder,
            sort: st.sort,
            filter: st.filter,
            search_query: st.search_query.clone(),
        }
    }

    pub fn phase(&self) -> ListPhase {
        self.state().phase()
    }

    pub fn has_more(&self) -> bool {
        self.state().has_more
    }

    pub fn page(&self) -> u32 {
        self.state().page
    }

    pub fn is_loading(&self) -> bool {
        self.state().loading
    }

    pub fn tab(&self) -> Tab {
        self.state().tab.clone()
    }

    /// 回到第一页并立即加载。
    pub async fn reset(&self) -> Result<LoadOutcome, ListError> {
        {
            let mut st = self.state();
            st.epoch += 1;
            st.page = 1;
            st.has_more = true;
            st.items.clear();
            st.loading = false;
            st.empty_placeholder = false;
            st.trigger_visible = false;
            debug!(target: "list", tab = ?st.tab, epoch = st.epoch, "reset");
        }
        self.load_next().await
    }

    pub async fn load_next(&self) -> Result<LoadOutcome, ListError> {
        let pending = {
            let mut st = self.state();
            if st.loading || !st.has_more {
                return Ok(LoadOutcome::Skipped);
            }
            st.loading = true;
            PendingLoad {
                epoch: st.epoch,
                page: st.page,
                tab: st.tab.clone(),
                sort: st.sort,
                filter: st.filter,
                search_query: st.search_query.clone(),
            }
        };

        let result = self.fetch(&pending).await;

        let mut st = self.state();
        if st.epoch != pending.epoch {
            debug!(
                target: "list",
                load_epoch = pending.epoch,
                current_epoch = st.epoch,
                "discarding stale response"
            );
            return Ok(LoadOutcome::Stale);
        }
        st.loading = false;

        let items = match result {
            Ok(items) => items,
            Err(err) => {
                warn!(target: "list", tab = ?pending.tab, page = pending.page, "load failed: {err}");
                return Err(err);
            }
        };

        let count = items.len();
        let has_more = count == PAGE_SIZE as usize;
        st.has_more = has_more;
        if pending.page == 1 {
            st.items = items;
            st.empty_placeholder = count == 0;
        } else {
            st.items.extend(items);
            if count > 0 {
                st.empty_placeholder = false;
            }
        }
        st.page = pending.page + 1;

        info!(
            target: "list",
            tab = ?pending.tab,
            page = pending.page,
            count,
            has_more,
            "page loaded"
        );
        Ok(LoadOutcome::Loaded { count, has_more })
    }

    /// 切换到不同的标签页时重置；点击当前标签不做任何事。
    pub async fn switch_tab(&self, tab: Tab) -> Result<LoadOutcome, ListError> {
        if !self.update(|st| replace_if_changed(&mut st.tab, tab)) {
            return Ok(LoadOutcome::Skipped);
        }
        self.reset().await
    }

    pub async fn set_sort(&self, sort: Sort) -> Result<LoadOutcome, ListError> {
        if !self.update(|st| replace_if_changed(&mut st.sort, sort)) {
            return Ok(LoadOutcome::Skipped);
        }
        self.reset().await
    }

    pub async fn set_filter(&self, filter: ListFilter) -> Result<LoadOutcome, ListError> {
        if !self.update(|st| replace_if_changed(&mut st.filter, filter)) {
            return Ok(LoadOutcome::Skipped);
        }
        self.reset().await
    }

    /// 同时修改过滤条件和搜索词，有变化时只重置一次。
    pub async fn set_filter_and_query(
        &self,
        filter: ListFilter,
        query: &str,
    ) -> Result<LoadOutcome, ListError> {
        let query = query.trim().to_string();
        let changed = self.update(|st| {
            let filter_changed = replace_if_changed(&mut st.filter, filter);
            let query_changed = replace_if_changed(&mut st.search_query, query);
            filter_changed || query_changed
        });
        if !changed {
            return Ok(LoadOutcome::Skipped);
        }
        self.reset().await
    }

    /// 搜索词（去掉首尾空白后）与当前相同则跳过。
    pub async fn set_search_query(&self, query: &str) -> Result<LoadOutcome, ListError> {
        let query = query.trim().to_string();
        if !self.update(|st| replace_if_changed(&mut st.search_query, query)) {
            return Ok(LoadOutcome::Skipped);
        }
        self.reset().await
    }

    /// 列表底部的触发区域可见性变化；仅在“不可见 → 可见”时加载下一页。
    pub async fn on_scroll_trigger(&self, intersecting: bool) -> Result<LoadOutcome, ListError> {
        let crossed = self.update(|st| {
            let crossed = intersecting && !st.trigger_visible;
            st.trigger_visible = intersecting;
            crossed
        });
        if !crossed {
            return Ok(LoadOutcome::Skipped);
        }
        self.load_next().await
    }

    async fn fetch(&self, load: &PendingLoad) -> Result<Vec<ListItem>, ListError> {
        let paging = Paging::page(load.page);
        let items = match &load.tab {
            Tab::Subscriptions => {
                let ids = self.prefs.get_subscriptions().await?;
                self.novels_by_ids(ids, paging, load.sort).await?
            }
            Tab::Bookmarks => {
                let ids = self.prefs.get_bookmarks().await?;
                self.novels_by_ids(ids, paging, load.sort).await?
            }
            Tab::Latest => {
                let query = LatestQuery {
                    paging,
                    subscribed_only: load.filter.subscribed_only,
                    query: non_empty(&load.search_query),
                };
                self.catalog
                    .latest_chapters(&query)
                    .await?
                    .into_iter()
                    .map(ListItem::Feed)
                    .collect()
            }
            Tab::Search => {
                if load.search_query.is_empty() {
                    Vec::new()
                } else {
                    self.catalog
                        .search_novels(&load.search_query, paging)
                        .await?
                        .into_iter()
                        .map(ListItem::Novel)
                        .collect()
                }
            }
            Tab::Translator(translator_id) => {
                let query = NovelQuery {
                    paging,
                    sort: load.sort,
                    translator_id: Some(translator_id.clone()),
                    ids: Vec::new(),
                };
                self.catalog
                    .list_novels(&query)
                    .await?
                    .into_iter()
                    .map(ListItem::Novel)
                    .collect()
            }
            Tab::Chapters(novel_id) => {
                let query = ChapterQuery {
                    paging,
                    order: Some(load.sort.order),
                };
                self.catalog
                    .list_chapters(novel_id, &query)
                    .await?
                    .into_iter()
                    .map(ListItem::Chapter)
                    .collect()
            }
        };
        Ok(items)
    }

    /// 本地集合为空时不发请求。
    async fn novels_by_ids(
        &self,
        ids: Vec<String>,
        paging: Paging,
        sort: Sort,
    ) -> Result<Vec<ListItem>, ListError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = NovelQuery {
            paging,
            sort,
            translator_id: None,
            ids,
        };
        Ok(self
            .catalog
            .list_novels(&query)
            .await?
            .into_iter()
            .map(ListItem::Novel)
            .collect())
    }

    fn update<R>(&self, f: impl FnOnce(&mut ListState) -> R) -> R {
        f(&mut self.state())
    }

    fn state(&self) -> MutexGuard<'_, ListState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn replace_if_changed<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}
