use async_trait::async_trait;

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("malformed document content: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait ThreadRepo: Send + Sync {
    /// All threads, most recently active first.
    async fn list_threads(&self) -> RepoResult<Vec<Thread>>;
    /// Plain lookup with no side effects; used for existence checks.
    async fn get_thread(&self, id: Id) -> RepoResult<Thread>;
    /// Single-thread fetch: bumps view_count before the read and returns
    /// the thread with its posts and documents.
    async fn get_thread_detail(&self, id: Id) -> RepoResult<ThreadDetail>;
    /// Inserts the thread and its initial post in one transaction.
    async fn create_thread(&self, new: NewThread) -> RepoResult<Thread>;
    /// Deletes the thread and everything it owns.
    async fn delete_thread(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait PostRepo: Send + Sync {
    /// Posts of a thread in chronological order; empty for unknown ids.
    async fn list_posts(&self, thread_id: Id) -> RepoResult<Vec<Post>>;
    /// Inserts a post and bumps the parent thread's reply_count and
    /// last_activity in the same transaction.
    async fn create_post(&self, thread_id: Id, author: &str, new: NewPost) -> RepoResult<Post>;
    /// Single-post fetch: bumps view_count, marks seen, stamps last_viewed.
    async fn get_post(&self, id: Id) -> RepoResult<Post>;
    /// Overwrites the client-writable fields and marks the post edited.
    async fn update_post(&self, id: Id, upd: NewPost) -> RepoResult<Post>;
    async fn delete_post(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait DocumentRepo: Send + Sync {
    async fn list_documents(&self, thread_id: Id) -> RepoResult<Vec<Document>>;
    /// Inserts with a server-generated id. The referenced thread is not
    /// checked for existence.
    async fn create_document(&self, new: NewDocument) -> RepoResult<Document>;
    /// Single-document fetch: bumps view_count and stamps last_viewed.
    async fn get_document(&self, id: &str) -> RepoResult<Document>;
    /// Full replace of every client-writable field.
    async fn update_document(&self, id: &str, upd: NewDocument) -> RepoResult<Document>;
    async fn delete_document(&self, id: &str) -> RepoResult<()>;
}

pub trait Repo: ThreadRepo + PostRepo + DocumentRepo {}

impl<T> Repo for T where T: ThreadRepo + PostRepo + DocumentRepo {}

pub mod sqlite {
    use super::*;
    use chrono::{DateTime, Utc};
    use sqlx::SqlitePool;

    /// Seed entry inserted on first start against an empty database. Each
    /// entry becomes a thread (title derived from the text) holding the
    /// entry as its initial post.
    pub struct SeedPost {
        pub author: &'static str,
        pub text: &'static str,
        pub image: Option<&'static str>,
    }

    /// Extension point; ships empty.
    pub const SEED_POSTS: &[SeedPost] = &[];

    const THREAD_COLS: &str =
        "id, title, creator, created_at, updated_at, last_activity, view_count, reply_count";
    const POST_COLS: &str =
        "id, thread_id, author, text, image, time, edited, seen, view_count, last_viewed, is_initial_post";
    const DOCUMENT_COLS: &str =
        "id, thread_id, title, content, type, created_at, updated_at, view_count, last_viewed";

    #[derive(sqlx::FromRow)]
    struct ThreadRow {
        id: Id,
        title: String,
        creator: String,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        last_activity: DateTime<Utc>,
        view_count: i64,
        reply_count: i64,
    }

    impl From<ThreadRow> for Thread {
        fn from(row: ThreadRow) -> Self {
            Thread {
                id: row.id,
                title: row.title,
                creator: row.creator,
                created_at: row.created_at,
                updated_at: row.updated_at,
                last_activity: row.last_activity,
                view_count: row.view_count,
                reply_count: row.reply_count,
            }
        }
    }

    #[derive(sqlx::FromRow)]
    struct PostRow {
        id: Id,
        thread_id: Id,
        author: String,
        text: String,
        image: Option<String>,
        time: DateTime<Utc>,
        edited: bool,
        seen: bool,
        view_count: i64,
        last_viewed: Option<DateTime<Utc>>,
        is_initial_post: bool,
    }

    impl From<PostRow> for Post {
        fn from(row: PostRow) -> Self {
            Post {
                id: row.id,
                thread_id: row.thread_id,
                author: row.author,
                text: row.text,
                image: row.image,
                time: row.time,
                edited: row.edited,
                seen: row.seen,
                view_count: row.view_count,
                last_viewed: row.last_viewed,
                is_initial_post: row.is_initial_post,
            }
        }
    }

    // content holds serialized JSON; parsing happens at the boundary so a
    // corrupt row surfaces as RepoError::Malformed instead of a panic.
    #[derive(sqlx::FromRow)]
    struct DocumentRow {
        id: String,
        thread_id: Id,
        title: String,
        content: String,
        #[sqlx(rename = "type")]
        kind: String,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        view_count: i64,
        last_viewed: Option<DateTime<Utc>>,
    }

    impl TryFrom<DocumentRow> for Document {
        type Error = RepoError;

        fn try_from(row: DocumentRow) -> Result<Self, RepoError> {
            let content: DocumentContent = serde_json::from_str(&row.content)?;
            Ok(Document {
                id: row.id,
                thread_id: row.thread_id,
                title: row.title,
                content,
                kind: row.kind,
                created_at: row.created_at,
                updated_at: row.updated_at,
                view_count: row.view_count,
                last_viewed: row.last_viewed,
            })
        }
    }

    #[derive(Clone)]
    pub struct SqliteRepo {
        pool: SqlitePool,
    }

    impl SqliteRepo {
        pub fn new(pool: SqlitePool) -> Self {
            Self { pool }
        }

        /// Idempotent schema creation; safe to run on every start.
        pub async fn init_schema(&self) -> RepoResult<()> {
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS threads (
                    id            INTEGER PRIMARY KEY AUTOINCREMENT,
                    title         TEXT NOT NULL,
                    creator       TEXT NOT NULL,
                    created_at    TEXT NOT NULL,
                    updated_at    TEXT NOT NULL,
                    last_activity TEXT NOT NULL,
                    view_count    INTEGER NOT NULL DEFAULT 0,
                    reply_count   INTEGER NOT NULL DEFAULT 0
                )
                "#,
            )
            .execute(&self.pool)
            .await?;
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS posts (
                    id              INTEGER PRIMARY KEY AUTOINCREMENT,
                    thread_id       INTEGER NOT NULL REFERENCES threads(id),
                    author          TEXT NOT NULL,
                    text            TEXT NOT NULL,
                    image           TEXT,
                    time            TEXT NOT NULL,
                    edited          INTEGER NOT NULL DEFAULT 0,
                    seen            INTEGER NOT NULL DEFAULT 0,
                    view_count      INTEGER NOT NULL DEFAULT 0,
                    last_viewed     TEXT,
                    is_initial_post INTEGER NOT NULL DEFAULT 0
                )
                "#,
            )
            .execute(&self.pool)
            .await?;
            // no FK on thread_id: document creation performs no existence
            // check, so rows may reference threads that were never created
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS documents (
                    id          TEXT PRIMARY KEY,
                    thread_id   INTEGER NOT NULL,
                    title       TEXT NOT NULL,
                    content     TEXT NOT NULL,
                    type        TEXT NOT NULL,
                    created_at  TEXT NOT NULL,
                    updated_at  TEXT NOT NULL,
                    view_count  INTEGER NOT NULL DEFAULT 0,
                    last_viewed TEXT
                )
                "#,
            )
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        /// One-time seed: runs only when the database holds no threads and
        /// no posts.
        pub async fn seed_if_empty(&self) -> RepoResult<()> {
            let (threads,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM threads")
                .fetch_one(&self.pool)
                .await?;
            let (posts,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
                .fetch_one(&self.pool)
                .await?;
            if threads > 0 || posts > 0 {
                return Ok(());
            }
            for seed in SEED_POSTS {
                let now = Utc::now();
                let mut tx = self.pool.begin().await?;
                let row: ThreadRow = sqlx::query_as(
                    "INSERT INTO threads (title, creator, created_at, updated_at, last_activity) \
                     VALUES (?1, 'system', ?2, ?2, ?2) \
                     RETURNING id, title, creator, created_at, updated_at, last_activity, view_count, reply_count",
                )
                .bind(seed_title(seed.text))
                .bind(now)
                .fetch_one(&mut *tx)
                .await?;
                sqlx::query(
                    "INSERT INTO posts (thread_id, author, text, image, time, is_initial_post) \
                     VALUES (?1, ?2, ?3, ?4, ?5, 1)",
                )
                .bind(row.id)
                .bind(seed.author)
                .bind(seed.text)
                .bind(seed.image)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;
            }
            Ok(())
        }
    }

    fn seed_title(text: &str) -> String {
        if text.chars().count() > 50 {
            let head: String = text.chars().take(50).collect();
            format!("{head}...")
        } else {
            text.to_string()
        }
    }

    #[async_trait]
    impl ThreadRepo for SqliteRepo {
        async fn list_threads(&self) -> RepoResult<Vec<Thread>> {
            let rows: Vec<ThreadRow> = sqlx::query_as(&format!(
                "SELECT {THREAD_COLS} FROM threads ORDER BY last_activity DESC"
            ))
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().map(Thread::from).collect())
        }

        async fn get_thread(&self, id: Id) -> RepoResult<Thread> {
            let row: Option<ThreadRow> =
                sqlx::query_as(&format!("SELECT {THREAD_COLS} FROM threads WHERE id = ?1"))
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?;
            row.map(Thread::from).ok_or(RepoError::NotFound("Thread"))
        }

        async fn get_thread_detail(&self, id: Id) -> RepoResult<ThreadDetail> {
            let mut tx = self.pool.begin().await?;
            let row: Option<ThreadRow> = sqlx::query_as(&format!(
                "UPDATE threads SET view_count = view_count + 1, updated_at = ?1 \
                 WHERE id = ?2 RETURNING {THREAD_COLS}"
            ))
            .bind(Utc::now())
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
            let Some(row) = row else {
                return Err(RepoError::NotFound("Thread"));
            };
            let posts: Vec<PostRow> = sqlx::query_as(&format!(
                "SELECT {POST_COLS} FROM posts WHERE thread_id = ?1 ORDER BY time ASC, id ASC"
            ))
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;
            let documents: Vec<DocumentRow> = sqlx::query_as(&format!(
                "SELECT {DOCUMENT_COLS} FROM documents WHERE thread_id = ?1 ORDER BY created_at ASC"
            ))
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;
            tx.commit().await?;
            let documents = documents
                .into_iter()
                .map(Document::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ThreadDetail::from_parts(
                row.into(),
                posts.into_iter().map(Post::from).collect(),
                documents,
            ))
        }

        async fn create_thread(&self, new: NewThread) -> RepoResult<Thread> {
            let now = Utc::now();
            let mut tx = self.pool.begin().await?;
            let row: ThreadRow = sqlx::query_as(&format!(
                "INSERT INTO threads (title, creator, created_at, updated_at, last_activity) \
                 VALUES (?1, ?2, ?3, ?3, ?3) RETURNING {THREAD_COLS}"
            ))
            .bind(&new.title)
            .bind(&new.creator)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;
            sqlx::query(
                "INSERT INTO posts (thread_id, author, text, image, time, is_initial_post) \
                 VALUES (?1, ?2, ?3, ?4, ?5, 1)",
            )
            .bind(row.id)
            .bind(&new.creator)
            .bind(&new.initial_post)
            .bind(&new.image)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            Ok(row.into())
        }

        async fn delete_thread(&self, id: Id) -> RepoResult<()> {
            // explicit cascade: posts and documents go in the same
            // transaction as the owning thread
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM posts WHERE thread_id = ?1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM documents WHERE thread_id = ?1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            let deleted = sqlx::query("DELETE FROM threads WHERE id = ?1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            if deleted.rows_affected() == 0 {
                // tx dropped here, rolling back the dependent deletes
                return Err(RepoError::NotFound("Thread"));
            }
            tx.commit().await?;
            Ok(())
        }
    }

    #[async_trait]
    impl PostRepo for SqliteRepo {
        async fn list_posts(&self, thread_id: Id) -> RepoResult<Vec<Post>> {
            let rows: Vec<PostRow> = sqlx::query_as(&format!(
                "SELECT {POST_COLS} FROM posts WHERE thread_id = ?1 ORDER BY time ASC, id ASC"
            ))
            .bind(thread_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().map(Post::from).collect())
        }

        async fn create_post(&self, thread_id: Id, author: &str, new: NewPost) -> RepoResult<Post> {
            let now = Utc::now();
            let mut tx = self.pool.begin().await?;
            let bumped = sqlx::query(
                "UPDATE threads SET reply_count = reply_count + 1, last_activity = ?1, updated_at = ?1 \
                 WHERE id = ?2",
            )
            .bind(now)
            .bind(thread_id)
            .execute(&mut *tx)
            .await?;
            if bumped.rows_affected() == 0 {
                return Err(RepoError::NotFound("Thread"));
            }
            let row: PostRow = sqlx::query_as(&format!(
                "INSERT INTO posts (thread_id, author, text, image, time) \
                 VALUES (?1, ?2, ?3, ?4, ?5) RETURNING {POST_COLS}"
            ))
            .bind(thread_id)
            .bind(author)
            .bind(&new.text)
            .bind(&new.image)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;
            tx.commit().await?;
            Ok(row.into())
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            let row: Option<PostRow> = sqlx::query_as(&format!(
                "UPDATE posts SET view_count = view_count + 1, seen = 1, last_viewed = ?1 \
                 WHERE id = ?2 RETURNING {POST_COLS}"
            ))
            .bind(Utc::now())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            row.map(Post::from).ok_or(RepoError::NotFound("Post"))
        }

        async fn update_post(&self, id: Id, upd: NewPost) -> RepoResult<Post> {
            // edited is set unconditionally, not diffed against old values
            let row: Option<PostRow> = sqlx::query_as(&format!(
                "UPDATE posts SET text = ?1, image = ?2, edited = 1 \
                 WHERE id = ?3 RETURNING {POST_COLS}"
            ))
            .bind(&upd.text)
            .bind(&upd.image)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            row.map(Post::from).ok_or(RepoError::NotFound("Post"))
        }

        async fn delete_post(&self, id: Id) -> RepoResult<()> {
            // the parent thread's reply_count is left as-is
            let deleted = sqlx::query("DELETE FROM posts WHERE id = ?1")
                .bind(id)
                .execute(&self.pool)
                .await?;
            if deleted.rows_affected() == 0 {
                return Err(RepoError::NotFound("Post"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl DocumentRepo for SqliteRepo {
        async fn list_documents(&self, thread_id: Id) -> RepoResult<Vec<Document>> {
            let rows: Vec<DocumentRow> = sqlx::query_as(&format!(
                "SELECT {DOCUMENT_COLS} FROM documents WHERE thread_id = ?1 ORDER BY created_at ASC"
            ))
            .bind(thread_id)
            .fetch_all(&self.pool)
            .await?;
            rows.into_iter().map(Document::try_from).collect()
        }

        async fn create_document(&self, new: NewDocument) -> RepoResult<Document> {
            let id = uuid::Uuid::new_v4().to_string();
            let content = serde_json::to_string(&new.content)?;
            let row: DocumentRow = sqlx::query_as(&format!(
                "INSERT INTO documents (id, thread_id, title, content, type, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6) RETURNING {DOCUMENT_COLS}"
            ))
            .bind(&id)
            .bind(new.thread_id)
            .bind(&new.title)
            .bind(&content)
            .bind(&new.kind)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await?;
            row.try_into()
        }

        async fn get_document(&self, id: &str) -> RepoResult<Document> {
            let row: Option<DocumentRow> = sqlx::query_as(&format!(
                "UPDATE documents SET view_count = view_count + 1, last_viewed = ?1 \
                 WHERE id = ?2 RETURNING {DOCUMENT_COLS}"
            ))
            .bind(Utc::now())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            row.ok_or(RepoError::NotFound("Document"))?.try_into()
        }

        async fn update_document(&self, id: &str, upd: NewDocument) -> RepoResult<Document> {
            let content = serde_json::to_string(&upd.content)?;
            let row: Option<DocumentRow> = sqlx::query_as(&format!(
                "UPDATE documents SET title = ?1, thread_id = ?2, content = ?3, type = ?4, updated_at = ?5 \
                 WHERE id = ?6 RETURNING {DOCUMENT_COLS}"
            ))
            .bind(&upd.title)
            .bind(upd.thread_id)
            .bind(&content)
            .bind(&upd.kind)
            .bind(Utc::now())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            row.ok_or(RepoError::NotFound("Document"))?.try_into()
        }

        async fn delete_document(&self, id: &str) -> RepoResult<()> {
            let deleted = sqlx::query("DELETE FROM documents WHERE id = ?1")
                .bind(id)
                .execute(&self.pool)
                .await?;
            if deleted.rows_affected() == 0 {
                return Err(RepoError::NotFound("Document"));
            }
            Ok(())
        }
    }
}
