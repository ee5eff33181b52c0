use std::sync::Arc;

use actix_web::{test, web, App};
use forum::repo::sqlite::SqliteRepo;
use forum::routes::{config, AppState};
use forum::storage::FsFileStore;
use sqlx::sqlite::SqlitePoolOptions;

async fn state(upload_dir: &std::path::Path) -> AppState {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let repo = SqliteRepo::new(pool);
    repo.init_schema().await.unwrap();
    AppState {
        repo: Arc::new(repo),
        file_store: Arc::new(FsFileStore::new(upload_dir).unwrap()),
    }
}

#[actix_web::test]
async fn document_crud_flow() {
    let tmp = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state(tmp.path()).await))
            .configure(config),
    )
    .await;

    let grid = serde_json::json!([["a", "b", "c"], ["d", "e", "f"]]);

    // a document against a thread that does not exist still succeeds
    let req = test::TestRequest::post()
        .uri("/api/documents")
        .set_json(&serde_json::json!({
            "title": "Grid",
            "thread_id": 999999,
            "content": grid,
            "type": "table"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let doc: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let doc_id = doc["id"].as_str().unwrap().to_owned();
    assert!(!doc_id.is_empty());
    assert_eq!(doc["thread_id"], 999999);
    assert_eq!(doc["type"], "table");
    assert_eq!(doc["view_count"], 0);

    // fetch round-trips the grid structurally and bumps the view count
    let req = test::TestRequest::get()
        .uri(&format!("/api/documents/{doc_id}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let fetched: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(fetched["content"], grid);
    assert_eq!(fetched["view_count"], 1);
    assert!(!fetched["last_viewed"].is_null());

    // per-thread listing maps id -> document
    let req = test::TestRequest::get()
        .uri("/api/threads/999999/documents")
        .to_request();
    let resp = test::call_service(&app, req).await;
    let listing: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(listing.as_object().unwrap().len(), 1);
    assert_eq!(listing[&doc_id]["title"], "Grid");

    // full replace
    let req = test::TestRequest::put()
        .uri(&format!("/api/documents/{doc_id}"))
        .set_json(&serde_json::json!({
            "title": "Notes",
            "thread_id": 999999,
            "content": "plain text now",
            "type": "note"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let replaced: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(replaced["title"], "Notes");
    assert_eq!(replaced["content"], "plain text now");
    assert_eq!(replaced["type"], "note");

    // delete and 404 afterwards
    let req = test::TestRequest::delete()
        .uri(&format!("/api/documents/{doc_id}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["message"], "Document deleted");

    let req = test::TestRequest::get()
        .uri(&format!("/api/documents/{doc_id}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["detail"], "Document not found");
}

#[actix_web::test]
async fn malformed_document_payload_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state(tmp.path()).await))
            .configure(config),
    )
    .await;

    // content must be a string or a grid of strings
    let req = test::TestRequest::post()
        .uri("/api/documents")
        .set_json(&serde_json::json!({
            "title": "bad",
            "thread_id": 1,
            "content": 42,
            "type": "note"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert!(body["detail"].is_string());
}
