mod sqlite;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use sqlite::WorkspaceStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XDG data directory is unavailable")]
    MissingDataDir,
    #[error("parent folder does not exist: {0}")]
    ParentMissing(String),
    #[error("path already exists: {0}")]
    AlreadyExists(String),
    #[error("invalid node name: {0:?}")]
    InvalidName(String),
    #[error("invalid node kind: {0}")]
    InvalidNodeKind(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::AlreadyExists(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Folder,
}

impl NodeKind {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Folder => "folder",
        }
    }

    pub(crate) fn parse(value: &str) -> Result<Self, StoreError> {
        match value {
            "file" => Ok(NodeKind::File),
            "folder" => Ok(NodeKind::Folder),
            other => Err(StoreError::InvalidNodeKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredNode {
    pub path: String,
    pub parent_path: String,
    pub name: String,
    pub kind: NodeKind,
    pub content: Option<String>,
}

/// Hierarchical workspace storage addressed by absolute paths (`/` is the
/// root, which always exists).
///
/// Creation fails when the parent is missing or the name is taken; the sync
/// engine retries such failures.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn create_folder(&self, parent: &str, name: &str) -> Result<(), StoreError>;

    async fn create_file(&self, parent: &str, name: &str, content: &str)
    -> Result<(), StoreError>;

    async fn delete_all(&self) -> Result<(), StoreError>;

    async fn list(&self) -> Result<Vec<StoredNode>, StoreError>;

    async fn read_file(&self, path: &str) -> Result<Option<String>, StoreError>;
}

pub(crate) fn validate_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}
