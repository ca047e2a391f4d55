//! Represents the metadata record joined to an archive object by file name.

use crate::models::project;
use crate::models::tree::TreeNode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

/// Stored metadata for one archive object.
///
/// Keyed by `file_name` (the object key). At most one record exists per
/// object; the catalog falls back to defaults when it is missing.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct ProjectMetadata {
    /// Object key this record belongs to (`<name>.<zip|rar>`).
    pub file_name: String,

    /// Display name supplied at upload time.
    pub project_name: String,

    /// Optional free-form description.
    pub description: Option<String>,

    /// Directory tree extracted from the archive, stored as JSON.
    pub structure: Json<TreeNode>,

    /// Download counter, reset to zero on every (re)upload.
    pub downloads: i64,

    /// When the record was written.
    pub created_at: DateTime<Utc>,
}

impl ProjectMetadata {
    /// Default record for an object that was stored without metadata, used
    /// by the reconciliation sweep. Name is derived from the file name;
    /// description stays empty and the counter starts at zero.
    pub fn placeholder(file_name: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            project_name: project::display_name(file_name).to_string(),
            description: None,
            structure: Json(TreeNode::empty()),
            downloads: 0,
            created_at: Utc::now(),
        }
    }
}
