//! Data models for the project archive hub.
//!
//! `StoredObject` and `ProjectMetadata` map to database rows via
//! `sqlx::FromRow`; `Project` is the read model the catalog materializes
//! per listing by joining the two; `TreeNode` is the directory tree kept
//! inside each metadata record.

pub mod metadata;
pub mod object;
pub mod project;
pub mod tree;
