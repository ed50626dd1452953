//! 译者后台写操作：角色与归属检查、服务端拒绝时的中止。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use serde_json::{Value, json};

use novels_reader::network::models::{ChapterDraft, NovelDraft};
use novels_reader::session::{PublishError, Publisher};
use novels_reader::storage::{MemoryHostStorage, Role};
use novels_reader::{CatalogClient, KeyValueStore, UserPreferencesRepository};

const ME: &str = "u-1";

#[derive(Default)]
struct Backend {
    writes: AtomicUsize,
    bodies: Mutex<Vec<Value>>,
}

impl Backend {
    fn write(&self, body: Value) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.bodies.lock().unwrap().push(body);
    }

    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

type Shared = State<Arc<Backend>>;

/// `mine` 属于 u-1，`theirs` 属于 u-2，`revoked` 读取正常但写入返回 403。
fn owner_of(id: &str) -> Option<&'static str> {
    match id {
        "mine" | "revoked" => Some(ME),
        "theirs" => Some("u-2"),
        _ => None,
    }
}

async fn get_novel(Path(id): Path<String>) -> (StatusCode, Json<Value>) {
    match owner_of(&id) {
        Some(owner) => (
            StatusCode::OK,
            Json(json!({"data": {"id": id, "title": "Sword Song", "translator_id": owner}})),
        ),
        None => (StatusCode::NOT_FOUND, Json(json!({"detail": "Novel not found"}))),
    }
}

async fn create_novel(State(b): Shared, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let data = json!({"id": 5, "title": body["title"], "translator_id": body["translator_id"]});
    b.write(body);
    (StatusCode::CREATED, Json(json!({ "data": data })))
}

async fn update_novel(
    State(b): Shared,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if id == "revoked" {
        return (StatusCode::FORBIDDEN, Json(json!({"detail": "Access denied"})));
    }
    let data = json!({"id": id, "title": body["title"], "translator_id": body["translator_id"]});
    b.write(body);
    (StatusCode::OK, Json(json!({ "data": data })))
}

async fn delete_novel(State(b): Shared, Path(id): Path<String>) -> StatusCode {
    b.write(json!({"deleted": id}));
    StatusCode::NO_CONTENT
}

async fn create_chapter(
    State(b): Shared,
    Path(novel): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let data = json!({
        "id": 77,
        "novel_id": novel,
        "chapter_number": body["chapter_number"],
        "title": body["title"]
    });
    b.write(body);
    Json(json!({ "data": data }))
}

async fn setup(role: Role) -> (CatalogClient, UserPreferencesRepository, Arc<Backend>) {
    let backend = Arc::new(Backend::default());
    let api = Router::new()
        .route("/novels", post(create_novel))
        .route(
            "/novels/:id",
            get(get_novel).put(update_novel).delete(delete_novel),
        )
        .route("/novels/:id/chapters", post(create_chapter));
    let app = Router::new().nest("/api", api).with_state(backend.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    let client = CatalogClient::new(&format!("http://{addr}/api"), None, None).expect("client");

    let store = KeyValueStore::new(Arc::new(MemoryHostStorage::new()));
    let prefs = UserPreferencesRepository::new(Arc::new(store));
    prefs.set_role(role).await.expect("role");
    (client, prefs, backend)
}

fn draft(title: &str) -> NovelDraft {
    NovelDraft {
        title: title.to_string(),
        ..NovelDraft::default()
    }
}

fn chapter_draft() -> ChapterDraft {
    ChapterDraft {
        chapter_number: 4,
        title: "Dawn".to_string(),
        content: "The sun rose.".to_string(),
    }
}

#[tokio::test]
async fn readers_cannot_publish() {
    let (client, prefs, backend) = setup(Role::Reader).await;
    let publisher = Publisher::new(&client, &prefs, ME);

    let err = publisher.create_novel(draft("New")).await.unwrap_err();
    assert!(matches!(err, PublishError::NotTranslator));
    assert!(err.is_abort());

    let err = publisher.delete_novel("mine").await.unwrap_err();
    assert!(matches!(err, PublishError::NotTranslator));
    assert_eq!(backend.writes(), 0);
}

#[tokio::test]
async fn created_novel_is_owned_by_the_caller() {
    let (client, prefs, backend) = setup(Role::Translator).await;
    let publisher = Publisher::new(&client, &prefs, ME);

    let novel = publisher.create_novel(draft("Sword Song")).await.expect("create");
    assert_eq!(novel.id, "5");
    assert_eq!(novel.translator_id.as_deref(), Some(ME));
    assert_eq!(backend.bodies.lock().unwrap()[0]["translator_id"], ME);
}

#[tokio::test]
async fn owner_can_edit_delete_and_publish() {
    let (client, prefs, backend) = setup(Role::Translator).await;
    let publisher = Publisher::new(&client, &prefs, ME);

    let novel = publisher
        .edit_novel("mine", draft("Sword Song II"))
        .await
        .expect("edit");
    assert_eq!(novel.title, "Sword Song II");

    let chapter = publisher
        .publish_chapter("mine", &chapter_draft())
        .await
        .expect("publish");
    assert_eq!(chapter.id, "77");
    assert_eq!(chapter.novel_id, "mine");
    assert_eq!(chapter.chapter_number, 4);

    publisher.delete_novel("mine").await.expect("delete");
    assert_eq!(backend.writes(), 3);
}

#[tokio::test]
async fn someone_elses_novel_is_rejected_before_writing() {
    let (client, prefs, backend) = setup(Role::Translator).await;
    let publisher = Publisher::new(&client, &prefs, ME);

    let err = publisher.edit_novel("theirs", draft("Mine now")).await.unwrap_err();
    assert!(matches!(&err, PublishError::AccessDenied(id) if id == "theirs"));
    assert!(err.is_abort());

    let err = publisher
        .publish_chapter("theirs", &chapter_draft())
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::AccessDenied(_)));
    assert!(publisher.delete_novel("theirs").await.is_err());
    assert_eq!(backend.writes(), 0);
}

#[tokio::test]
async fn missing_novel_aborts() {
    let (client, prefs, _) = setup(Role::Translator).await;
    let publisher = Publisher::new(&client, &prefs, ME);

    let err = publisher.edit_novel("gone", draft("X")).await.unwrap_err();
    assert!(matches!(&err, PublishError::NovelNotFound(id) if id == "gone"));
    assert!(err.is_abort());
}

#[tokio::test]
async fn server_side_denial_is_an_abort() {
    let (client, prefs, backend) = setup(Role::Translator).await;
    let publisher = Publisher::new(&client, &prefs, ME);

    let err = publisher.edit_novel("revoked", draft("X")).await.unwrap_err();
    assert!(matches!(&err, PublishError::AccessDenied(id) if id == "revoked"));
    assert_eq!(backend.writes(), 0);
}

#[tokio::test]
async fn invalid_chapter_is_not_an_abort() {
    let (client, prefs, backend) = setup(Role::Translator).await;
    let publisher = Publisher::new(&client, &prefs, ME);

    let empty = ChapterDraft {
        content: String::new(),
        ..chapter_draft()
    };
    let err = publisher.publish_chapter("mine", &empty).await.unwrap_err();
    assert!(matches!(err, PublishError::Api(_)));
    assert!(!err.is_abort());
    assert_eq!(backend.writes(), 0);
}
