//! 端到端流程：文件存储 + 偏好仓库 + HTTP 客户端 + 列表/阅读会话。

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::{Path as UrlPath, Query, State};
use axum::routing::{get, post};
use serde_json::{Value, json};
use tempfile::tempdir;

use novels_reader::network::models::{NewTranslator, Sort, SortOrder};
use novels_reader::session::{
    ChapterNeighbors, ListItem, ListPhase, ListSnapshot, ReadingSessionTracker, SearchBox, Tab,
    become_translator,
};
use novels_reader::storage::{FileHostStorage, Role};
use novels_reader::{
    CatalogClient, KeyValueStore, ListController, PAGE_SIZE, UserPreferencesRepository,
};

#[derive(Default)]
struct Backend {
    novel_requests: AtomicUsize,
    latest_queries: Mutex<Vec<HashMap<String, String>>>,
    chapter_queries: Mutex<Vec<HashMap<String, String>>>,
}

type Shared = State<Arc<Backend>>;

/// 按 `ids` 过滤；不带 `ids` 时第 1 页返回满页、第 2 页返回 5 条。
async fn novels(State(b): Shared, Query(q): Query<HashMap<String, String>>) -> Json<Value> {
    b.novel_requests.fetch_add(1, Ordering::SeqCst);
    let items: Vec<Value> = match q.get("ids") {
        Some(ids) => ids
            .split(',')
            .map(|id| json!({"id": id, "title": format!("Novel {id}")}))
            .collect(),
        None => {
            let page: usize = q.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
            let count = if page == 1 { PAGE_SIZE as usize } else { 5 };
            (0..count)
                .map(|i| json!({"id": page * 100 + i, "title": format!("Novel {i}")}))
                .collect()
        }
    };
    Json(json!({ "data": items }))
}

async fn latest(State(b): Shared, Query(q): Query<HashMap<String, String>>) -> Json<Value> {
    b.latest_queries.lock().unwrap().push(q);
    Json(json!({
        "data": [{"id": 1, "novel_id": 42, "chapter_number": 1, "title": "Opening"}]
    }))
}

/// 共 23 章：第 1 页满页，第 2 页 3 章。
async fn chapters(
    State(b): Shared,
    UrlPath(novel): UrlPath<String>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Value> {
    let page: u32 = q.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let asc = q.get("order").map(String::as_str) == Some("asc");
    b.chapter_queries.lock().unwrap().push(q);
    let mut numbers: Vec<u32> = (1..=23).collect();
    if !asc {
        numbers.reverse();
    }
    let items: Vec<Value> = numbers
        .into_iter()
        .skip((page as usize - 1) * PAGE_SIZE as usize)
        .take(PAGE_SIZE as usize)
        .map(|n| json!({"id": n + 100, "novel_id": novel, "chapter_number": n, "title": format!("Chapter {n}")}))
        .collect();
    Json(json!({ "data": items }))
}

async fn create_translator(Json(body): Json<Value>) -> Json<Value> {
    Json(json!({
        "data": {
            "user_id": body["user_id"],
            "display_name": body["display_name"]
        }
    }))
}

async fn serve(backend: Arc<Backend>) -> CatalogClient {
    let api = Router::new()
        .route("/novels", get(novels))
        .route("/novels/:id/chapters", get(chapters))
        .route("/chapters/latest", get(latest))
        .route("/translators", post(create_translator));
    let app = Router::new().nest("/api", api).with_state(backend);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    CatalogClient::new(&format!("http://{addr}/api"), None, None).expect("client")
}

fn prefs_at(path: &Path) -> Arc<UserPreferencesRepository> {
    let host = Arc::new(FileHostStorage::new(path));
    Arc::new(UserPreferencesRepository::new(Arc::new(KeyValueStore::new(host))))
}

fn ids(snap: &ListSnapshot) -> Vec<&str> {
    snap.items.iter().map(|i| i.id()).collect()
}

#[tokio::test]
async fn subscribe_then_list_subscriptions() {
    let dir = tempdir().expect("tempdir");
    let prefs = prefs_at(&dir.path().join("store.json"));
    let backend = Arc::new(Backend::default());
    let client = Arc::new(serve(backend.clone()).await);

    prefs.add_subscription("42").await.expect("subscribe");
    prefs.add_subscription("42").await.expect("subscribe again");
    assert_eq!(prefs.get_subscriptions().await.expect("subs"), vec!["42"]);

    let ctrl = ListController::new(client, prefs.clone(), Tab::Subscriptions);
    ctrl.reset().await.expect("load");

    let snap = ctrl.snapshot();
    assert_eq!(ids(&snap), vec!["42"]);
    assert!(!snap.has_more);
    assert!(!snap.show_empty_placeholder);
}

#[tokio::test]
async fn empty_bookmarks_do_not_hit_the_network() {
    let dir = tempdir().expect("tempdir");
    let prefs = prefs_at(&dir.path().join("store.json"));
    let backend = Arc::new(Backend::default());
    let client = Arc::new(serve(backend.clone()).await);

    prefs.remove_bookmark("7").await.expect("remove absent");
    let ctrl = ListController::new(client, prefs, Tab::Bookmarks);
    ctrl.reset().await.expect("load");

    assert!(ctrl.snapshot().show_empty_placeholder);
    assert_eq!(backend.novel_requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn translator_list_pages_until_short_page() {
    let dir = tempdir().expect("tempdir");
    let prefs = prefs_at(&dir.path().join("store.json"));
    let backend = Arc::new(Backend::default());
    let client = Arc::new(serve(backend.clone()).await);

    let ctrl = ListController::new(client, prefs, Tab::Translator("9".to_string()));
    ctrl.reset().await.expect("page 1");
    assert!(ctrl.has_more());

    ctrl.load_next().await.expect("page 2");
    let snap = ctrl.snapshot();
    assert_eq!(snap.items.len(), PAGE_SIZE as usize + 5);
    assert_eq!(snap.phase, ListPhase::Exhausted);

    ctrl.load_next().await.expect("noop");
    assert_eq!(backend.novel_requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn progress_survives_restart_and_restores_matching_chapter() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("store.json");

    {
        let prefs = prefs_at(&path);
        prefs.save_reading_progress("10", "3", 540).await.expect("save");
        let entry = prefs
            .get_reading_progress("10")
            .await
            .expect("get")
            .expect("entry");
        assert_eq!(entry.last_chapter_id, "3");
        assert_eq!(entry.scroll_position, 540);
    }

    // 新实例没有缓存，只能从文件读回
    let prefs = prefs_at(&path);
    let interval = Duration::from_millis(5000);

    let (_, other) = ReadingSessionTracker::open(prefs.clone(), "10", "4", interval)
        .await
        .expect("open 4");
    assert_eq!(other.restore_position, None);

    let (_, same) = ReadingSessionTracker::open(prefs.clone(), "10", "3", interval)
        .await
        .expect("open 3");
    assert_eq!(same.restore_position, Some(540));

    let history = prefs.get_last_read().await.expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].chapter_id, "3");
}

#[tokio::test]
async fn legacy_progress_records_are_readable() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("store.json");
    let legacy = json!({
        "reading_progress": json!({
            "10": {"lastChapter": "3", "position": 540.4, "updatedAt": "2024-05-01T10:00:00Z"}
        })
        .to_string()
    });
    std::fs::write(&path, legacy.to_string()).expect("write legacy");

    let prefs = prefs_at(&path);
    let (_, start) = ReadingSessionTracker::open(prefs, "10", "3", Duration::from_secs(5))
        .await
        .expect("open");
    assert_eq!(start.restore_position, Some(540));
}

#[tokio::test]
async fn debounced_search_issues_one_latest_request() {
    let dir = tempdir().expect("tempdir");
    let prefs = prefs_at(&dir.path().join("store.json"));
    let backend = Arc::new(Backend::default());
    let client = Arc::new(serve(backend.clone()).await);

    let ctrl = Arc::new(ListController::new(client, prefs, Tab::Latest));
    let (mut search, mut errors) = SearchBox::new(ctrl.clone(), Duration::from_millis(50));

    search.input("a");
    search.input("ab");
    search.input("abc").await.expect("join");

    let queries = backend.latest_queries.lock().unwrap().clone();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].get("query").map(String::as_str), Some("abc"));
    assert_eq!(ctrl.snapshot().search_query, "abc");
    assert!(errors.try_recv().is_err());
}

#[tokio::test]
async fn becoming_translator_switches_role() {
    let dir = tempdir().expect("tempdir");
    let prefs = prefs_at(&dir.path().join("store.json"));
    let client = serve(Arc::new(Backend::default())).await;
    assert_eq!(prefs.get_role().await.expect("role"), Role::Reader);

    let invalid = NewTranslator::default();
    assert!(become_translator(&client, &prefs, &invalid).await.is_err());
    assert_eq!(prefs.get_role().await.expect("role"), Role::Reader);

    let data = NewTranslator {
        user_id: "u-1".to_string(),
        display_name: "Lin".to_string(),
        ..NewTranslator::default()
    };
    let translator = become_translator(&client, &prefs, &data).await.expect("become");
    assert_eq!(translator.user_id, "u-1");
    assert_eq!(prefs.get_role().await.expect("role"), Role::Translator);

    prefs.clear_all().await.expect("clear");
    assert_eq!(prefs.get_role().await.expect("role"), Role::Reader);
}

#[tokio::test]
async fn chapter_index_spans_pages_for_neighbours() {
    let dir = tempdir().expect("tempdir");
    let prefs = prefs_at(&dir.path().join("store.json"));
    let backend = Arc::new(Backend::default());
    let client = Arc::new(serve(backend.clone()).await);

    let ctrl = ListController::new(client, prefs, Tab::Chapters("10".to_string()));
    ctrl.set_sort(Sort {
        order: SortOrder::Asc,
        ..Sort::default()
    })
    .await
    .expect("page 1");
    while ctrl.has_more() {
        ctrl.load_next().await.expect("next page");
    }
    assert_eq!(ctrl.phase(), ListPhase::Exhausted);

    let chapters: Vec<_> = ctrl
        .snapshot()
        .items
        .into_iter()
        .filter_map(|item| match item {
            ListItem::Chapter(c) => Some(c),
            _ => None,
        })
        .collect();
    assert_eq!(chapters.len(), 23);

    // 第 20 章在第 1 页末尾，下一章要从第 2 页取
    let around = ChapterNeighbors::locate(&chapters, "120");
    assert_eq!(around.prev.as_deref(), Some("119"));
    assert_eq!(around.next.as_deref(), Some("121"));

    let queries = backend.chapter_queries.lock().unwrap().clone();
    assert_eq!(queries.len(), 2);
    assert!(queries.iter().all(|q| q.get("order").map(String::as_str) == Some("asc")));
}
