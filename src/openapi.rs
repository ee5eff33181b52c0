use crate::models::{
    Document, DocumentContent, NewDocument, NewPost, NewThread, Post, Thread, ThreadDetail,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::list_threads,
        crate::routes::get_thread,
        crate::routes::create_thread,
        crate::routes::delete_thread,
        crate::routes::list_posts,
        crate::routes::create_post,
        crate::routes::create_system_post,
        crate::routes::get_post,
        crate::routes::update_post,
        crate::routes::delete_post,
        crate::routes::list_documents,
        crate::routes::create_document,
        crate::routes::get_document,
        crate::routes::update_document,
        crate::routes::delete_document,
        crate::routes::upload_file,
        crate::routes::serve_upload,
    ),
    components(schemas(
        Thread, NewThread, ThreadDetail, Post, NewPost,
        Document, NewDocument, DocumentContent
    )),
    tags(
        (name = "threads", description = "Thread operations"),
        (name = "posts", description = "Post operations"),
        (name = "documents", description = "Document operations"),
        (name = "files", description = "Upload operations"),
    )
)]
pub struct ApiDoc;
