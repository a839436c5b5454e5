//! The object store surface the transfer and retention services depend on.
//!
//! Keys are `/`-separated paths within a container. Implementations must be
//! safe to share between tasks; the scheduler never calls them concurrently
//! but holds them behind an `Arc`.

use crate::{errors::StorageResult, models::object::ObjectEntry};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::io;
use tokio_util::sync::CancellationToken;

/// Body of an upload, consumed chunk by chunk.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `body` under `key`, creating the container if it does not exist
    /// and replacing any object already stored under the same key.
    async fn upload(
        &self,
        container: &str,
        key: &str,
        body: ByteStream,
        cancel: &CancellationToken,
    ) -> StorageResult<()>;

    /// Lazily enumerate every object in `container`.
    ///
    /// A container that does not exist yields an empty stream.
    fn list<'a>(&'a self, container: &'a str) -> BoxStream<'a, StorageResult<ObjectEntry>>;

    /// Remove `key`. Returns `Ok(false)` when there was nothing to remove.
    async fn delete_if_exists(
        &self,
        container: &str,
        key: &str,
        cancel: &CancellationToken,
    ) -> StorageResult<bool>;

    /// Remove every key in `keys`, each independently of the others.
    ///
    /// Keys not reached because of cancellation report `StorageError::Cancelled`.
    async fn delete_batch(
        &self,
        container: &str,
        keys: &[String],
        cancel: &CancellationToken,
    ) -> Vec<(String, StorageResult<bool>)> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            let outcome = if cancel.is_cancelled() {
                Err(crate::errors::StorageError::Cancelled)
            } else {
                self.delete_if_exists(container, key, cancel).await
            };
            results.push((key.clone(), outcome));
        }
        results
    }
}
