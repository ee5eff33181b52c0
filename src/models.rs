use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Thread {
    pub id: Id,
    pub title: String,
    pub creator: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub view_count: i64,
    pub reply_count: i64,
}

/// Input for the thread-creation route. `image` holds the public path of an
/// already-saved upload, never raw bytes.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewThread {
    pub title: String,
    pub creator: String,
    pub initial_post: String,
    pub image: Option<String>,
}

/// A thread together with its full post and document collections, as
/// returned by the single-thread fetch.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ThreadDetail {
    pub id: Id,
    pub title: String,
    pub creator: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub view_count: i64,
    pub reply_count: i64,
    pub posts: Vec<Post>,
    pub documents: Vec<Document>,
}

impl ThreadDetail {
    pub fn from_parts(thread: Thread, posts: Vec<Post>, documents: Vec<Document>) -> Self {
        Self {
            id: thread.id,
            title: thread.title,
            creator: thread.creator,
            created_at: thread.created_at,
            updated_at: thread.updated_at,
            last_activity: thread.last_activity,
            view_count: thread.view_count,
            reply_count: thread.reply_count,
            posts,
            documents,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Post {
    pub id: Id,
    pub thread_id: Id,
    pub author: String,
    pub text: String,
    pub image: Option<String>,
    pub time: DateTime<Utc>,
    pub edited: bool,
    pub seen: bool,
    pub view_count: i64,
    pub last_viewed: Option<DateTime<Utc>>,
    pub is_initial_post: bool,
}

/// Client-writable post fields; used both for creation and for the full
/// overwrite performed by update.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewPost {
    pub text: String,
    pub image: Option<String>,
}

/// Document body: either plain text or a grid of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum DocumentContent {
    Text(String),
    Grid(Vec<Vec<String>>),
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Document {
    pub id: String,
    pub thread_id: Id,
    pub title: String,
    pub content: DocumentContent,
    #[serde(rename = "type")]
    pub kind: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub view_count: i64,
    pub last_viewed: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewDocument {
    pub title: String,
    pub thread_id: Id,
    pub content: DocumentContent,
    #[serde(rename = "type")]
    pub kind: String,
}
