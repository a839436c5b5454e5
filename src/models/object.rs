//! Represents an object (file) stored in a container.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata row for a single object (blob) within a container.
///
/// The payload itself lives on disk; this struct only describes it.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct StoredObject {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Foreign key linking to the parent container.
    pub container_id: Uuid,

    /// Object key (path-like identifier within the container).
    pub key: String,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 checksum of the payload, lowercase hex.
    pub etag: String,

    /// When this object was (re)created. An overwrite resets it.
    pub created_at: DateTime<Utc>,
}

/// One entry of a container listing as returned by an object store.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    pub created_at: Option<DateTime<Utc>>,
}
