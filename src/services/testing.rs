//! In-memory `ObjectStore` used by the service tests.

use crate::{
    errors::{StorageError, StorageResult},
    models::object::ObjectEntry,
    services::object_store::{ByteStream, ObjectStore},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt, stream::BoxStream};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    io,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio_util::sync::CancellationToken;

type ObjectKey = (String, String);
type UploadHook = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<ObjectKey, (Vec<u8>, Option<DateTime<Utc>>)>>,
    failing_uploads: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
    fail_listing: AtomicBool,
    panic_on_list: AtomicBool,
    upload_delay: Mutex<Option<Duration>>,
    upload_hooks: Mutex<HashMap<String, UploadHook>>,
    uploads: AtomicUsize,
    delete_calls: AtomicUsize,
    active_uploads: AtomicUsize,
    max_active_uploads: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn insert(&self, container: &str, key: &str, created_at: Option<DateTime<Utc>>) {
        self.objects.lock().unwrap().insert(
            (container.to_string(), key.to_string()),
            (Vec::new(), created_at),
        );
    }

    pub fn keys(&self, container: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(c, _)| c == container)
            .map(|(_, k)| k.clone())
            .collect()
    }

    pub fn payload(&self, container: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(container.to_string(), key.to_string()))
            .map(|(bytes, _)| bytes.clone())
    }

    pub fn fail_uploads_of(&self, key: &str) {
        self.failing_uploads.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_deletes_of(&self, key: &str) {
        self.failing_deletes.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_listing(&self) {
        self.fail_listing.store(true, Ordering::SeqCst);
    }

    pub fn panic_on_list(&self, enabled: bool) {
        self.panic_on_list.store(enabled, Ordering::SeqCst);
    }

    pub fn set_upload_delay(&self, delay: Duration) {
        *self.upload_delay.lock().unwrap() = Some(delay);
    }

    /// Run `hook` right after `key` has been stored, before the caller sees
    /// the upload succeed.
    pub fn on_upload_of(&self, key: &str, hook: impl Fn() + Send + Sync + 'static) {
        self.upload_hooks
            .lock()
            .unwrap()
            .insert(key.to_string(), Box::new(hook));
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn max_active_uploads(&self) -> usize {
        self.max_active_uploads.load(Ordering::SeqCst)
    }

    pub fn active_uploads(&self) -> usize {
        self.active_uploads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        container: &str,
        key: &str,
        body: ByteStream,
        cancel: &CancellationToken,
    ) -> StorageResult<()> {
        let active = self.active_uploads.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_uploads.fetch_max(active, Ordering::SeqCst);

        let delay = *self.upload_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let bytes: io::Result<Vec<Vec<u8>>> =
            body.map_ok(|chunk| chunk.to_vec()).try_collect().await;
        self.active_uploads.fetch_sub(1, Ordering::SeqCst);
        let bytes = bytes?;

        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        if self.failing_uploads.lock().unwrap().contains(key) {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "simulated network failure",
            )));
        }

        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().insert(
            (container.to_string(), key.to_string()),
            (bytes.concat(), Some(Utc::now())),
        );
        if let Some(hook) = self.upload_hooks.lock().unwrap().get(key) {
            hook();
        }
        Ok(())
    }

    fn list<'a>(&'a self, container: &'a str) -> BoxStream<'a, StorageResult<ObjectEntry>> {
        if self.panic_on_list.load(Ordering::SeqCst) {
            panic!("simulated fault while listing");
        }
        if self.fail_listing.load(Ordering::SeqCst) {
            let err = io::Error::new(io::ErrorKind::PermissionDenied, "simulated listing failure");
            return futures::stream::iter(vec![Err(StorageError::Io(err))]).boxed();
        }
        let entries: Vec<_> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((c, _), _)| c == container)
            .map(|((_, key), (_, created_at))| {
                Ok(ObjectEntry {
                    key: key.clone(),
                    created_at: *created_at,
                })
            })
            .collect();
        futures::stream::iter(entries).boxed()
    }

    async fn delete_if_exists(
        &self,
        container: &str,
        key: &str,
        _cancel: &CancellationToken,
    ) -> StorageResult<bool> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_deletes.lock().unwrap().contains(key) {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "simulated delete failure",
            )));
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .remove(&(container.to_string(), key.to_string()))
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn failed_body_read_releases_the_active_slot() {
        let store = MemoryObjectStore::default();
        let body: ByteStream = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"head")),
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated")),
        ])
        .boxed();

        let err = store
            .upload("files", "a.txt", body, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Io(_)));
        assert_eq!(store.active_uploads(), 0);
        assert!(store.keys("files").is_empty());
    }
}
