use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Persists an uploaded byte stream under a fresh generated name and
    /// returns the public path it is served from (`/uploads/<name>`).
    async fn save(&self, original_name: &str, bytes: &[u8]) -> Result<String, FileStoreError>;
    /// Reads a stored file back together with its sniffed MIME type.
    async fn load(&self, name: &str) -> Result<(Vec<u8>, String), FileStoreError>;
}

/// Filesystem-backed store writing into a single flat upload directory.
pub struct FsFileStore {
    dir: PathBuf,
}

impl FsFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }
}

#[async_trait]
impl FileStore for FsFileStore {
    async fn save(&self, original_name: &str, bytes: &[u8]) -> Result<String, FileStoreError> {
        // keep the original extension; the name itself is a fresh UUID,
        // collisions are not checked for
        let name = match Path::new(original_name).extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        };
        tokio::fs::write(self.dir.join(&name), bytes).await?;
        Ok(format!("/uploads/{name}"))
    }

    async fn load(&self, name: &str) -> Result<(Vec<u8>, String), FileStoreError> {
        // stored names are flat UUIDs; anything path-like is not ours
        if name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(FileStoreError::NotFound);
        }
        let bytes = match tokio::fs::read(self.dir.join(name)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FileStoreError::NotFound)
            }
            Err(e) => return Err(e.into()),
        };
        let mime = infer::get(&bytes)
            .map(|t| t.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        Ok((bytes, mime))
    }
}

/// Factory used in main; panics early if the upload directory is unusable.
pub fn build_file_store() -> Arc<dyn FileStore> {
    let dir = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".into());
    match FsFileStore::new(&dir) {
        Ok(store) => Arc::new(store),
        Err(e) => panic!("Failed to initialize upload store at '{dir}': {e}"),
    }
}
