use std::collections::HashMap;
use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::TryStreamExt as _;

use crate::error::ApiError;
use crate::models::*;
use crate::repo::{DocumentRepo as _, PostRepo as _, Repo, ThreadRepo as _};
use crate::storage::FileStore;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()),
    )
    .service(
        web::scope("/api")
            .service(
                web::resource("/threads")
                    .route(web::get().to(list_threads))
                    .route(web::post().to(create_thread)),
            )
            .service(
                web::resource("/threads/{id}")
                    .route(web::get().to(get_thread))
                    .route(web::delete().to(delete_thread)),
            )
            .service(
                web::resource("/threads/{id}/posts")
                    .route(web::get().to(list_posts))
                    .route(web::post().to(create_post)),
            )
            .service(
                web::resource("/system/threads/{id}/posts")
                    .route(web::post().to(create_system_post)),
            )
            .service(web::resource("/threads/{id}/documents").route(web::get().to(list_documents)))
            .service(web::resource("/upload").route(web::post().to(upload_file)))
            .service(web::resource("/uploads/{name}").route(web::get().to(serve_upload)))
            .service(web::resource("/documents").route(web::post().to(create_document)))
            .service(
                web::resource("/documents/{id}")
                    .route(web::get().to(get_document))
                    .route(web::put().to(update_document))
                    .route(web::delete().to(delete_document)),
            )
            .service(
                web::resource("/posts/{id}")
                    .route(web::get().to(get_post))
                    .route(web::put().to(update_post))
                    .route(web::delete().to(delete_post)),
            ),
    );
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub file_store: Arc<dyn FileStore>,
}

const UPLOAD_SIZE_LIMIT: usize = 10 * 1024 * 1024; // 10 MiB

struct UploadedFile {
    filename: String,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct FormData {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

impl FormData {
    fn take_text(&mut self, name: &str) -> Result<String, ApiError> {
        self.fields
            .remove(name)
            .ok_or_else(|| ApiError::BadRequest(format!("missing form field `{name}`")))
    }
}

/// Drains a multipart stream into text fields and file parts. Parts with a
/// filename are treated as files, everything else as UTF-8 text.
async fn collect_form(mut payload: Multipart) -> Result<FormData, ApiError> {
    let mut form = FormData::default();
    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        log::error!("multipart error: {e}");
        ApiError::BadRequest(e.to_string())
    })? {
        let disposition = field.content_disposition();
        let Some(name) = disposition.get_name().map(str::to_owned) else {
            continue;
        };
        let filename = disposition.get_filename().map(str::to_owned);
        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(|e| {
            log::error!("stream read error: {e}");
            ApiError::Internal(e.to_string())
        })? {
            if bytes.len() + chunk.len() > UPLOAD_SIZE_LIMIT {
                return Err(ApiError::PayloadTooLarge);
            }
            bytes.extend_from_slice(&chunk);
        }
        match filename {
            Some(filename) if !filename.is_empty() => {
                form.files.insert(name, UploadedFile { filename, bytes });
            }
            _ => {
                let value = String::from_utf8(bytes).map_err(|_| {
                    ApiError::BadRequest(format!("form field `{name}` is not valid UTF-8"))
                })?;
                form.fields.insert(name, value);
            }
        }
    }
    Ok(form)
}

async fn save_upload(
    store: &dyn FileStore,
    file: &UploadedFile,
) -> Result<String, ApiError> {
    store.save(&file.filename, &file.bytes).await.map_err(|e| {
        log::error!("upload save failed: {e}");
        ApiError::Internal(e.to_string())
    })
}

// ---------------- Thread handlers -----------------------------------

#[utoipa::path(
    get,
    path = "/api/threads",
    responses(
        (status = 200, description = "All threads, most recently active first", body = [Thread])
    )
)]
pub async fn list_threads(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let threads = data.repo.list_threads().await?;
    Ok(HttpResponse::Ok().json(threads))
}

#[utoipa::path(
    get,
    path = "/api/threads/{id}",
    params(("id" = Id, Path, description = "Thread id")),
    responses(
        (status = 200, description = "Thread with its posts and documents", body = ThreadDetail),
        (status = 404, description = "Thread not found")
    )
)]
pub async fn get_thread(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let detail = data.repo.get_thread_detail(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[utoipa::path(
    post,
    path = "/api/threads",
    responses(
        (status = 200, description = "Thread created", body = Thread),
        (status = 400, description = "Missing form field"),
        (status = 500, description = "Image could not be saved")
    )
)]
pub async fn create_thread(
    data: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let mut form = collect_form(payload).await?;
    let title = form.take_text("title")?;
    let creator = form.take_text("creator")?;
    let initial_post = form.take_text("initial_post")?;
    // an image save failure short-circuits before anything is inserted
    let image = match form.files.remove("image") {
        Some(file) => Some(save_upload(data.file_store.as_ref(), &file).await?),
        None => None,
    };
    let thread = data
        .repo
        .create_thread(NewThread {
            title,
            creator,
            initial_post,
            image,
        })
        .await?;
    Ok(HttpResponse::Ok().json(thread))
}

#[utoipa::path(
    delete,
    path = "/api/threads/{id}",
    params(("id" = Id, Path, description = "Thread id")),
    responses(
        (status = 200, description = "Thread and everything it owned deleted"),
        (status = 404, description = "Thread not found")
    )
)]
pub async fn delete_thread(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    data.repo.delete_thread(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Thread deleted" })))
}

// ---------------- Post handlers --------------------------------------

#[utoipa::path(
    get,
    path = "/api/threads/{id}/posts",
    params(("id" = Id, Path, description = "Thread id")),
    responses(
        (status = 200, description = "Posts in chronological order; empty for unknown threads", body = [Post])
    )
)]
pub async fn list_posts(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let posts = data.repo.list_posts(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(posts))
}

#[utoipa::path(
    post,
    path = "/api/threads/{id}/posts",
    params(("id" = Id, Path, description = "Thread id")),
    responses(
        (status = 200, description = "Post created", body = Post),
        (status = 404, description = "Thread not found"),
        (status = 500, description = "Image could not be saved")
    )
)]
pub async fn create_post(
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let thread_id = path.into_inner();
    let mut form = collect_form(payload).await?;
    let text = form.take_text("text")?;
    // the thread must exist before the image touches disk
    data.repo.get_thread(thread_id).await?;
    let image = match form.files.remove("image") {
        Some(file) => Some(save_upload(data.file_store.as_ref(), &file).await?),
        None => None,
    };
    let post = data
        .repo
        .create_post(thread_id, "user", NewPost { text, image })
        .await?;
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    post,
    path = "/api/system/threads/{id}/posts",
    params(("id" = Id, Path, description = "Thread id")),
    request_body = NewPost,
    responses(
        (status = 200, description = "Post created with author \"system\"", body = Post),
        (status = 404, description = "Thread not found")
    )
)]
pub async fn create_system_post(
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<NewPost>,
) -> Result<HttpResponse, ApiError> {
    let post = data
        .repo
        .create_post(path.into_inner(), "system", payload.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    get,
    path = "/api/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post; marks it seen and bumps its view count", body = Post),
        (status = 404, description = "Post not found")
    )
)]
pub async fn get_post(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    put,
    path = "/api/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    request_body = NewPost,
    responses(
        (status = 200, description = "Post overwritten and marked edited", body = Post),
        (status = 404, description = "Post not found")
    )
)]
pub async fn update_post(
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<NewPost>,
) -> Result<HttpResponse, ApiError> {
    let post = data
        .repo
        .update_post(path.into_inner(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    delete,
    path = "/api/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post deleted"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn delete_post(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    data.repo.delete_post(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Post deleted" })))
}

// ---------------- Document handlers -----------------------------------

#[utoipa::path(
    get,
    path = "/api/threads/{id}/documents",
    params(("id" = Id, Path, description = "Thread id")),
    responses(
        (status = 200, description = "Mapping from document id to document")
    )
)]
pub async fn list_documents(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let documents = data.repo.list_documents(path.into_inner()).await?;
    let by_id: HashMap<String, Document> = documents
        .into_iter()
        .map(|doc| (doc.id.clone(), doc))
        .collect();
    Ok(HttpResponse::Ok().json(by_id))
}

#[utoipa::path(
    post,
    path = "/api/documents",
    request_body = NewDocument,
    responses(
        (status = 200, description = "Document created; the referenced thread is not checked", body = Document)
    )
)]
pub async fn create_document(
    data: web::Data<AppState>,
    payload: web::Json<NewDocument>,
) -> Result<HttpResponse, ApiError> {
    let document = data.repo.create_document(payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(document))
}

#[utoipa::path(
    get,
    path = "/api/documents/{id}",
    params(("id" = String, Path, description = "Document id")),
    responses(
        (status = 200, description = "Document; bumps its view count", body = Document),
        (status = 404, description = "Document not found")
    )
)]
pub async fn get_document(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let document = data.repo.get_document(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(document))
}

#[utoipa::path(
    put,
    path = "/api/documents/{id}",
    params(("id" = String, Path, description = "Document id")),
    request_body = NewDocument,
    responses(
        (status = 200, description = "Document fully replaced", body = Document),
        (status = 404, description = "Document not found")
    )
)]
pub async fn update_document(
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<NewDocument>,
) -> Result<HttpResponse, ApiError> {
    let document = data
        .repo
        .update_document(&path.into_inner(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(document))
}

#[utoipa::path(
    delete,
    path = "/api/documents/{id}",
    params(("id" = String, Path, description = "Document id")),
    responses(
        (status = 200, description = "Document deleted"),
        (status = 404, description = "Document not found")
    )
)]
pub async fn delete_document(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    data.repo.delete_document(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Document deleted" })))
}

// ---------------- Upload handlers --------------------------------------

#[utoipa::path(
    post,
    path = "/api/upload",
    responses(
        (status = 200, description = "File stored; body carries its public path"),
        (status = 400, description = "No file part in the form"),
        (status = 413, description = "Payload too large"),
        (status = 500, description = "File could not be written")
    )
)]
pub async fn upload_file(
    data: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let mut form = collect_form(payload).await?;
    let file = form
        .files
        .remove("file")
        .ok_or_else(|| ApiError::BadRequest("missing file part `file`".into()))?;
    let path = save_upload(data.file_store.as_ref(), &file).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "filename": path })))
}

#[utoipa::path(
    get,
    path = "/api/uploads/{name}",
    params(("name" = String, Path, description = "Stored file name")),
    responses(
        (status = 200, description = "Stored file with sniffed content type"),
        (status = 404, description = "File not found")
    )
)]
pub async fn serve_upload(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let (bytes, mime) = data.file_store.load(&path.into_inner()).await?;
    Ok(HttpResponse::Ok()
        .insert_header(("Content-Type", mime))
        .body(bytes))
}
