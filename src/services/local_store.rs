//! src/services/local_store.rs
//!
//! LocalObjectStore: an `ObjectStore` backed by SQLite for metadata and
//! local disk for object payloads, sharded beneath
//! `base_path/{container}/{shard}/{shard}/{key}`.

use crate::{
    errors::{StorageError, StorageResult},
    models::{
        container::{Container, check_container_name},
        object::{ObjectEntry, StoredObject},
    },
    services::object_store::{ByteStream, ObjectStore},
};
use async_trait::async_trait;
use chrono::Utc;
use futures::{StreamExt, stream::BoxStream};
use md5::Context;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");
const MAX_OBJECT_KEY_LEN: usize = 1024;

/// Object store keeping payloads on local disk and metadata in SQLite.
///
/// Uploads stream into a temporary file, are fsynced and then renamed into
/// place, so a reader never observes a half-written payload.
#[derive(Clone)]
pub struct LocalObjectStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

impl LocalObjectStore {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn migrate(&self) -> StorageResult<()> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        debug!("running {} schema statements", statements.len());

        for stmt in statements {
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Rejects empty keys, absolute keys, `..` segments and control characters.
    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        let invalid = key.is_empty()
            || key.len() > MAX_OBJECT_KEY_LEN
            || key.starts_with('/')
            || key.ends_with('/')
            || key.split('/').any(|segment| segment.is_empty() || segment == "..")
            || key.bytes().any(|b| b.is_ascii_control() || b == b'\\');
        if invalid {
            return Err(StorageError::InvalidObjectKey(key.to_string()));
        }
        Ok(())
    }

    fn ensure_container_name_safe(&self, name: &str) -> StorageResult<()> {
        check_container_name(name).map_err(|reason| StorageError::InvalidContainerName {
            name: name.to_string(),
            reason: reason.into(),
        })
    }

    fn container_root(&self, container: &str) -> PathBuf {
        self.base_path.join(container)
    }

    /// Two-level shard directories from MD5(container/key), limiting the
    /// number of entries per directory.
    fn object_shards(container: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", container, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, container: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(container, key);
        let mut path = self.container_root(container);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    /// Fetch a container row, creating it (and its directory) if missing.
    async fn ensure_container(&self, name: &str) -> StorageResult<Container> {
        self.ensure_container_name_safe(name)?;
        fs::create_dir_all(self.container_root(name)).await?;

        sqlx::query(
            "INSERT INTO containers (id, name, created_at) VALUES (?, ?, ?)
             ON CONFLICT(name) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;

        let container = sqlx::query_as::<_, Container>(
            "SELECT id, name, created_at FROM containers WHERE name = ?",
        )
        .bind(name)
        .fetch_one(&*self.db)
        .await?;
        Ok(container)
    }

    async fn find_container(&self, name: &str) -> StorageResult<Option<Container>> {
        let container = sqlx::query_as::<_, Container>(
            "SELECT id, name, created_at FROM containers WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&*self.db)
        .await?;
        Ok(container)
    }

    /// Stream-upload an object to disk and upsert its metadata.
    ///
    /// Overwriting an existing key replaces the payload and resets `created_at`.
    pub async fn put_object(
        &self,
        container: &str,
        key: &str,
        body: ByteStream,
        cancel: &CancellationToken,
    ) -> StorageResult<StoredObject> {
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        self.ensure_key_safe(key)?;
        let container_rec = self.ensure_container(container).await?;

        let file_path = self.object_path(&container_rec.name, key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let (size_bytes, etag) = match write_payload(&tmp_path, body, cancel).await {
            Ok(written) => written,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err);
            }
        };

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }

        let insert_result = sqlx::query_as::<_, StoredObject>(
            r#"
            INSERT INTO objects (id, container_id, key, size_bytes, etag, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(container_id, key) DO UPDATE SET
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                created_at = excluded.created_at
            RETURNING id, container_id, key, size_bytes, etag, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(container_rec.id)
        .bind(key)
        .bind(size_bytes)
        .bind(&etag)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await;

        match insert_result {
            Ok(obj) => {
                debug!(container, key, size_bytes, etag = %obj.etag, "stored object");
                Ok(obj)
            }
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(StorageError::Sqlx(err))
            }
        }
    }

    /// Recursively remove empty directories up to the container root.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload(
        &self,
        container: &str,
        key: &str,
        body: ByteStream,
        cancel: &CancellationToken,
    ) -> StorageResult<()> {
        self.put_object(container, key, body, cancel).await.map(|_| ())
    }

    fn list<'a>(&'a self, container: &'a str) -> BoxStream<'a, StorageResult<ObjectEntry>> {
        sqlx::query_as::<_, ObjectEntry>(
            "SELECT o.key AS key, o.created_at AS created_at
             FROM objects o JOIN containers c ON c.id = o.container_id
             WHERE c.name = ?
             ORDER BY o.key ASC",
        )
        .bind(container)
        .fetch(&*self.db)
        .map(|row| row.map_err(StorageError::from))
        .boxed()
    }

    async fn delete_if_exists(
        &self,
        container: &str,
        key: &str,
        cancel: &CancellationToken,
    ) -> StorageResult<bool> {
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        self.ensure_key_safe(key)?;
        let Some(container_rec) = self.find_container(container).await? else {
            return Ok(false);
        };

        let result = sqlx::query("DELETE FROM objects WHERE container_id = ? AND key = ?")
            .bind(container_rec.id)
            .bind(key)
            .execute(&*self.db)
            .await?;
        let row_removed = result.rows_affected() > 0;

        let file_path = self.object_path(&container_rec.name, key);
        let file_removed = match fs::remove_file(&file_path).await {
            Ok(_) => {
                debug!("removed physical file {}", file_path.display());
                true
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
                false
            }
            Err(err) => return Err(StorageError::Io(err)),
        };

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.container_root(&container_rec.name))
                .await;
        }

        Ok(row_removed || file_removed)
    }
}

/// Write `body` to a fresh file at `path`, returning its size and MD5 etag.
///
/// Stops with `StorageError::Cancelled` as soon as `cancel` fires.
async fn write_payload(
    path: &Path,
    mut body: ByteStream,
    cancel: &CancellationToken,
) -> StorageResult<(i64, String)> {
    let mut file = File::create(path).await?;
    let mut size_bytes: i64 = 0;
    let mut digest = Context::new();

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StorageError::Cancelled),
            chunk = body.next() => chunk,
        };
        let Some(chunk) = chunk else { break };
        let chunk = chunk?;
        size_bytes += chunk.len() as i64;
        digest.consume(&chunk);
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok((size_bytes, format!("{:x}", digest.compute())))
}
