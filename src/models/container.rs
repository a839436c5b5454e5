//! Represents a container, the top-level namespace objects are uploaded into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A storage container in the local object store.
///
/// Containers are created lazily on the first upload that targets them.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Container {
    /// Unique identifier for this container (UUID for internal DB use).
    pub id: Uuid,

    /// Container name (lowercase letters, digits and hyphens).
    pub name: String,

    /// When this container was created.
    pub created_at: DateTime<Utc>,
}

const CONTAINER_NAME_MIN_LEN: usize = 3;
const CONTAINER_NAME_MAX_LEN: usize = 63;

/// Check a container name, returning the violated rule on failure.
///
/// - 3–63 characters
/// - lowercase letters, digits and hyphens only
/// - must start and end with a letter or digit
/// - no consecutive hyphens
pub fn check_container_name(name: &str) -> Result<(), &'static str> {
    if !(CONTAINER_NAME_MIN_LEN..=CONTAINER_NAME_MAX_LEN).contains(&name.len()) {
        return Err("must be between 3 and 63 characters");
    }
    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '-'))
    {
        return Err("allowed characters are lowercase letters, digits, and hyphens");
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err("must start and end with a lowercase letter or digit");
    }
    if name.contains("--") {
        return Err("cannot contain consecutive hyphens");
    }
    Ok(())
}
