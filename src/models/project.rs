//! The catalog's read model: one `Project` per listed archive object.

use crate::models::metadata::ProjectMetadata;
use crate::models::object::StoredObject;
use crate::models::tree::TreeNode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Description shown when an object has no metadata record.
pub const DEFAULT_DESCRIPTION: &str = "No description provided";

/// A catalog entry, materialized per listing by joining an object row with
/// its (optional) metadata record and a freshly signed download link.
/// Never persisted as a unit; each listing produces a fresh snapshot.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub file_url: String,
    pub file_name: String,
    pub file_size: i64,
    pub structure: TreeNode,
    pub created_at: DateTime<Utc>,
    pub downloads: i64,
}

impl Project {
    pub fn from_parts(
        object: StoredObject,
        file_url: String,
        metadata: Option<ProjectMetadata>,
    ) -> Self {
        let fallback_name = display_name(&object.key).to_string();
        let (name, description, structure, downloads) = match metadata {
            Some(record) => (
                record.project_name,
                record
                    .description
                    .filter(|text| !text.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
                record.structure.0,
                record.downloads,
            ),
            None => (
                fallback_name,
                DEFAULT_DESCRIPTION.to_string(),
                TreeNode::empty(),
                0,
            ),
        };

        Self {
            id: object.id,
            name,
            description,
            file_url,
            file_name: object.key,
            file_size: object.size_bytes,
            structure,
            created_at: object.created_at,
            downloads,
        }
    }
}

/// Return the canonical archive extension (`zip` or `rar`) of a file name,
/// judged by suffix only.
pub fn archive_extension(file_name: &str) -> Option<&'static str> {
    if file_name.ends_with(".zip") {
        Some("zip")
    } else if file_name.ends_with(".rar") {
        Some("rar")
    } else {
        None
    }
}

pub fn is_archive_key(key: &str) -> bool {
    archive_extension(key).is_some()
}

/// Derive a display name from an archive file name by stripping the
/// extension. Idempotent: re-appending the extension reconstructs the key.
pub fn display_name(file_name: &str) -> &str {
    file_name
        .strip_suffix(".zip")
        .or_else(|| file_name.strip_suffix(".rar"))
        .unwrap_or(file_name)
}
