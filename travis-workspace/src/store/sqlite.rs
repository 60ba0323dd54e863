use std::{fs, path::Path, path::PathBuf};

use async_trait::async_trait;
use sqlx::{Row, SqlitePool, migrate::Migrator, sqlite::SqliteConnectOptions, sqlite::SqliteRow};
use time::OffsetDateTime;

use super::{FileStore, NodeKind, StoreError, StoredNode, validate_name};
use crate::sync::paths::{ROOT, join};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed workspace file tree.
pub struct WorkspaceStore {
    pool: SqlitePool,
}

impl WorkspaceStore {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePool::connect(database_url).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub async fn new_default() -> Result<Self, StoreError> {
        Self::open(&default_db_path()?).await
    }

    pub async fn init(&self) -> Result<(), StoreError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub async fn get_node(&self, path: &str) -> Result<Option<StoredNode>, StoreError> {
        let row = sqlx::query(
            "SELECT path, parent_path, name, kind, content FROM nodes WHERE path = ?1",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(node_from_row).transpose()
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM nodes")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn insert_node(
        &self,
        parent: &str,
        name: &str,
        kind: NodeKind,
        content: Option<&str>,
    ) -> Result<(), StoreError> {
        validate_name(name)?;
        self.ensure_folder(parent).await?;
        let path = join(parent, name);
        let result = sqlx::query(
            "INSERT INTO nodes (path, parent_path, name, kind, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&path)
        .bind(parent)
        .bind(name)
        .bind(kind.as_str())
        .bind(content)
        .bind(OffsetDateTime::now_utc().unix_timestamp())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Err(StoreError::AlreadyExists(path))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn ensure_folder(&self, path: &str) -> Result<(), StoreError> {
        if path == ROOT {
            return Ok(());
        }
        match self.get_node(path).await? {
            Some(node) if node.kind == NodeKind::Folder => Ok(()),
            _ => Err(StoreError::ParentMissing(path.to_string())),
        }
    }
}

#[async_trait]
impl FileStore for WorkspaceStore {
    async fn create_folder(&self, parent: &str, name: &str) -> Result<(), StoreError> {
        self.insert_node(parent, name, NodeKind::Folder, None).await
    }

    async fn create_file(
        &self,
        parent: &str,
        name: &str,
        content: &str,
    ) -> Result<(), StoreError> {
        self.insert_node(parent, name, NodeKind::File, Some(content))
            .await
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM nodes").execute(&self.pool).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StoredNode>, StoreError> {
        let rows = sqlx::query(
            "SELECT path, parent_path, name, kind, content FROM nodes ORDER BY path ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(node_from_row).collect()
    }

    async fn read_file(&self, path: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .get_node(path)
            .await?
            .filter(|node| node.kind == NodeKind::File)
            .map(|node| node.content.unwrap_or_default()))
    }
}

fn node_from_row(row: &SqliteRow) -> Result<StoredNode, StoreError> {
    let kind: String = row.try_get("kind")?;
    Ok(StoredNode {
        path: row.try_get("path")?,
        parent_path: row.try_get("parent_path")?,
        name: row.try_get("name")?,
        kind: NodeKind::parse(&kind)?,
        content: row.try_get("content")?,
    })
}

fn default_db_path() -> Result<PathBuf, StoreError> {
    let mut path = dirs::data_dir().ok_or(StoreError::MissingDataDir)?;
    path.push("travis");
    path.push("workspace.db");
    Ok(path)
}

#[cfg(test)]
#[path = "sqlite_tests.rs"]
mod tests;
