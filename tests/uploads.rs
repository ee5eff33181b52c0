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

const BOUNDARY: &str = "FORUMTESTBOUNDARY";

fn text_part(name: &str, value: &str) -> Vec<u8> {
    format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
        .into_bytes()
}

fn file_part(name: &str, filename: &str, bytes: &[u8]) -> Vec<u8> {
    let mut part = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    part.extend_from_slice(bytes);
    part.extend_from_slice(b"\r\n");
    part
}

fn close_parts() -> Vec<u8> {
    format!("--{BOUNDARY}--\r\n").into_bytes()
}

fn multipart_post(uri: &str, body: Vec<u8>) -> actix_web::test::TestRequest {
    test::TestRequest::post()
        .uri(uri)
        .insert_header((
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(body)
}

// Minimal 1x1 PNG, enough for MIME sniffing
fn png_bytes() -> Vec<u8> {
    vec![
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D',
        b'R', 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
        0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, b'I', b'D', b'A', b'T', 0x78, 0x9C, 0x63, 0x00,
        0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, b'I',
        b'E', b'N', b'D', 0xAE, 0x42, 0x60, 0x82,
    ]
}

#[actix_web::test]
async fn upload_then_fetch_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state(tmp.path()).await))
            .configure(config),
    )
    .await;

    let png = png_bytes();
    let mut body = file_part("file", "a.png", &png);
    body.extend(close_parts());
    let req = multipart_post("/api/upload", body).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let uploaded: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let path = uploaded["filename"].as_str().unwrap();
    assert!(path.starts_with("/uploads/"));
    assert!(path.ends_with(".png"));

    // served back with the sniffed content type
    let name = path.strip_prefix("/uploads/").unwrap();
    let req = test::TestRequest::get()
        .uri(&format!("/api/uploads/{name}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let content_type = resp
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_owned();
    assert_eq!(content_type, "image/png");
    let served = test::read_body(resp).await;
    assert_eq!(served.as_ref(), png.as_slice());
}

#[actix_web::test]
async fn upload_without_file_part_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state(tmp.path()).await))
            .configure(config),
    )
    .await;

    let mut body = text_part("note", "no file here");
    body.extend(close_parts());
    let req = multipart_post("/api/upload", body).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn missing_upload_is_a_404() {
    let tmp = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state(tmp.path()).await))
            .configure(config),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/uploads/no-such-file.png")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn thread_creation_stores_attached_image() {
    let tmp = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state(tmp.path()).await))
            .configure(config),
    )
    .await;

    let mut body = Vec::new();
    body.extend(text_part("title", "With image"));
    body.extend(text_part("creator", "carol"));
    body.extend(text_part("initial_post", "look at this"));
    body.extend(file_part("image", "pic.png", &png_bytes()));
    body.extend(close_parts());
    let req = multipart_post("/api/threads", body).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let thread: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let thread_id = thread["id"].as_i64().unwrap();

    // the initial post carries the public path of the stored file
    let req = test::TestRequest::get()
        .uri(&format!("/api/threads/{thread_id}/posts"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let posts: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let image = posts[0]["image"].as_str().unwrap();
    assert!(image.starts_with("/uploads/"));
    assert!(image.ends_with(".png"));

    // and the file itself is fetchable
    let name = image.strip_prefix("/uploads/").unwrap();
    let req = test::TestRequest::get()
        .uri(&format!("/api/uploads/{name}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
}
