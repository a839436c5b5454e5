//! A file discovered under the staging root.

use super::remote_object::KEY_SEPARATOR;
use std::path::{Component, Path, PathBuf};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalFileEntry {
    /// Full path on disk.
    pub path: PathBuf,

    /// Path relative to the scan root joined with `/`. Used verbatim as the remote key.
    pub relative_path: String,
}

impl LocalFileEntry {
    /// Build an entry for `path` found under `root`.
    ///
    /// Returns `None` when `path` is not below `root` or a segment is not valid UTF-8.
    pub fn new(root: &Path, path: &Path) -> Option<Self> {
        let relative = path.strip_prefix(root).ok()?;
        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(segment) => segments.push(segment.to_str()?),
                _ => return None,
            }
        }
        if segments.is_empty() {
            return None;
        }
        Some(Self {
            path: path.to_path_buf(),
            relative_path: segments.join(KEY_SEPARATOR),
        })
    }
}
