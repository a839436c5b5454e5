//! Represents an object already present in the remote store, as seen by retention.

use super::object::ObjectEntry;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;

/// Key separator used by the object store.
pub const KEY_SEPARATOR: &str = "/";

/// A remote object split into its logical folder and leaf name.
///
/// `folder` is everything before the last `/` of the key; objects directly in
/// the container root have an empty folder.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct RemoteObjectRecord {
    pub name: String,
    pub folder: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl RemoteObjectRecord {
    pub fn from_entry(entry: ObjectEntry) -> Self {
        let (folder, name) = match entry.key.rfind(KEY_SEPARATOR) {
            Some(pos) => (
                entry.key[..pos].to_string(),
                entry.key[pos + KEY_SEPARATOR.len()..].to_string(),
            ),
            None => (String::new(), entry.key),
        };
        Self {
            name,
            folder,
            created_at: entry.created_at,
        }
    }

    /// Reassemble the full object key.
    pub fn key(&self) -> String {
        if self.folder.is_empty() {
            self.name.clone()
        } else {
            format!("{}{}{}", self.folder, KEY_SEPARATOR, self.name)
        }
    }

    /// Newest first. A missing timestamp ranks as the oldest possible value;
    /// equal timestamps fall back to the name so the order is deterministic.
    pub fn newest_first(a: &Self, b: &Self) -> Ordering {
        match (a.created_at, b.created_at) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
        .then_with(|| a.name.cmp(&b.name))
    }
}
