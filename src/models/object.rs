//! Represents a stored archive object (one opaque blob on disk).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A single archive payload held by the store.
///
/// The row describes the blob; the bytes themselves live on disk under the
/// store's sharded directory layout. One `project_metadata` record may be
/// joined to it by `key`, but its absence is tolerated.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct StoredObject {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Object key, a flat file name such as `myapp.zip`.
    pub key: String,

    /// Payload size in bytes.
    pub size_bytes: i64,

    /// MD5 checksum computed while streaming the upload.
    pub etag: Option<String>,

    /// When this object was (last) uploaded.
    pub created_at: DateTime<Utc>,
}
