//! src/services/store_service.rs
//!
//! StoreService — the storage/record collaborator behind the catalog.
//! Durable state lives in SQLite (the object listing and the
//! `project_metadata` records) and on local disk (archive payloads sharded
//! beneath `base_path/{shard}/{shard}/{key}`). Signed download links are
//! issued and verified through `LinkSigner`.

use crate::models::{metadata::ProjectMetadata, object::StoredObject};
use crate::services::signer::{LinkSigner, SignerError};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{0}` not found")]
    ObjectNotFound(String),
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error(transparent)]
    Sign(#[from] SignerError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

const MAX_OBJECT_KEY_LEN: usize = 255;

/// StoreService provides the operations the catalog consumes:
/// - stream-upload an object with overwrite semantics and progress reporting
/// - read an object back for streaming download
/// - list the full object inventory
/// - issue and verify signed download links
/// - upsert/select/update `project_metadata` records keyed by file name
#[derive(Clone)]
pub struct StoreService {
    /// Shared SQLite connection pool for listings and metadata records.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where archive payloads are stored.
    pub base_path: PathBuf,

    signer: LinkSigner,
}

impl StoreService {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>, signer: LinkSigner) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            signer,
        }
    }

    /// Catalog keys are flat file names. Rejects empty, oversized, hidden
    /// (dot-prefixed) and traversal-shaped keys, path separators, and
    /// bytes that cannot appear in a download header.
    fn ensure_key_safe(key: &str) -> StoreResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StoreError::InvalidObjectKey);
        }
        if key.starts_with('.') || key.contains("..") {
            return Err(StoreError::InvalidObjectKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || matches!(b, b'/' | b'\\' | b'"' | b'\0'))
        {
            return Err(StoreError::InvalidObjectKey);
        }
        Ok(())
    }

    /// Two-level shard identifiers for a key: the first two bytes of
    /// MD5(key) as lowercase hex. Keeps per-directory file counts low.
    fn object_shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    /// Full object inventory in key order. Listing order is an artifact of
    /// the query, not part of the catalog contract.
    pub async fn list_objects(&self) -> StoreResult<Vec<StoredObject>> {
        let objects = sqlx::query_as::<_, StoredObject>(
            "SELECT id, key, size_bytes, etag, created_at FROM objects ORDER BY key ASC",
        )
        .fetch_all(&*self.db)
        .await?;
        Ok(objects)
    }

    /// Fetch one object row by key.
    pub async fn fetch_object(&self, key: &str) -> StoreResult<StoredObject> {
        Self::ensure_key_safe(key)?;
        sqlx::query_as::<_, StoredObject>(
            "SELECT id, key, size_bytes, etag, created_at FROM objects WHERE key = ?",
        )
        .bind(key)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StoreError::ObjectNotFound(key.to_string()),
            other => StoreError::Sqlx(other),
        })
    }

    /// Stream-upload an object with overwrite-on-conflict semantics.
    ///
    /// - Writes chunks to a temporary file, computing MD5 and size as they
    ///   arrive.
    /// - Reports cumulative progress (0–100) through `on_progress` when the
    ///   total size is known; the callback is informational only.
    /// - Fsyncs and atomically renames into the final sharded location.
    /// - Upserts the object row; a row failure removes the payload so disk
    ///   and listing cannot drift apart on the write path.
    pub async fn put_object<S, F>(
        &self,
        key: &str,
        stream: S,
        total_bytes: Option<u64>,
        mut on_progress: F,
    ) -> StoreResult<StoredObject>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
        F: FnMut(f64),
    {
        Self::ensure_key_safe(key)?;

        let file_path = self.object_path(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StoreError::Io(io::Error::other("object path missing parent directory"))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut written: u64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StoreError::Io(err));
                }
            };
            written += chunk.len() as u64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
            if let Some(total) = total_bytes
                && total > 0
            {
                on_progress(100.0 * written as f64 / total as f64);
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }

        let etag = format!("{:x}", digest.compute());
        let insert_result = sqlx::query_as::<_, StoredObject>(
            r#"
            INSERT INTO objects (id, key, size_bytes, etag, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                created_at = excluded.created_at
            RETURNING id, key, size_bytes, etag, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(key)
        .bind(written as i64)
        .bind(&etag)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await;

        match insert_result {
            Ok(object) => Ok(object),
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(StoreError::Sqlx(err))
            }
        }
    }

    /// Fetch an object for reading: its row plus an opened file handle
    /// ready for streaming out. A row without a payload file reports
    /// ObjectNotFound rather than a bare I/O error.
    pub async fn object_reader(&self, key: &str) -> StoreResult<(StoredObject, File)> {
        let object = self.fetch_object(key).await?;

        let file_path = self.object_path(key);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StoreError::ObjectNotFound(key.to_string())
            } else {
                StoreError::Io(err)
            }
        })?;

        Ok((object, file))
    }

    /// Issue a signed download link for `key` with the configured validity
    /// window.
    pub fn signed_url(&self, key: &str) -> StoreResult<String> {
        Ok(self.signer.signed_url(key)?)
    }

    /// Verify a presented signed-link signature and expiry.
    pub fn verify_signed_link(&self, key: &str, expires: i64, signature: &str) -> bool {
        self.signer.verify(key, expires, signature)
    }

    /// Insert or replace the metadata record keyed by `file_name`.
    pub async fn upsert_metadata(&self, record: &ProjectMetadata) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO project_metadata
                (file_name, project_name, description, structure, downloads, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(file_name) DO UPDATE SET
                project_name = excluded.project_name,
                description = excluded.description,
                structure = excluded.structure,
                downloads = excluded.downloads,
                created_at = excluded.created_at
            "#,
        )
        .bind(&record.file_name)
        .bind(&record.project_name)
        .bind(&record.description)
        .bind(&record.structure)
        .bind(record.downloads)
        .bind(record.created_at)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    /// Look up the metadata record for an object. Absence is not an error;
    /// the catalog applies defaults.
    pub async fn find_metadata(&self, file_name: &str) -> StoreResult<Option<ProjectMetadata>> {
        let record = sqlx::query_as::<_, ProjectMetadata>(
            "SELECT file_name, project_name, description, structure, downloads, created_at
             FROM project_metadata WHERE file_name = ?",
        )
        .bind(file_name)
        .fetch_optional(&*self.db)
        .await?;
        Ok(record)
    }

    /// Add one to an object's download counter. Returns the number of rows
    /// touched — zero when no metadata record exists yet.
    pub async fn increment_downloads(&self, file_name: &str) -> StoreResult<u64> {
        let result =
            sqlx::query("UPDATE project_metadata SET downloads = downloads + 1 WHERE file_name = ?")
                .bind(file_name)
                .execute(&*self.db)
                .await?;
        Ok(result.rows_affected())
    }

    /// Keys of objects that have no metadata record, in key order. Input
    /// for the reconciliation sweep.
    pub async fn keys_missing_metadata(&self) -> StoreResult<Vec<String>> {
        let keys = sqlx::query_scalar::<_, String>(
            "SELECT o.key FROM objects o
             LEFT JOIN project_metadata m ON m.file_name = o.key
             WHERE m.file_name IS NULL
             ORDER BY o.key ASC",
        )
        .fetch_all(&*self.db)
        .await?;
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsafe_keys() {
        for key in [
            "",
            ".hidden.zip",
            "../escape.zip",
            "a/b.zip",
            "a\\b.zip",
            "quote\".zip",
            "nul\0.zip",
        ] {
            assert!(
                matches!(
                    StoreService::ensure_key_safe(key),
                    Err(StoreError::InvalidObjectKey)
                ),
                "expected `{key}` to be rejected"
            );
        }
    }

    #[test]
    fn accepts_ordinary_archive_keys() {
        for key in ["myapp.zip", "my app.rar", "release-1.2.3.zip"] {
            assert!(StoreService::ensure_key_safe(key).is_ok());
        }
    }

    #[test]
    fn shards_are_stable_per_key() {
        let (a1, b1) = StoreService::object_shards("myapp.zip");
        let (a2, b2) = StoreService::object_shards("myapp.zip");
        assert_eq!((a1.as_str(), b1.as_str()), (a2.as_str(), b2.as_str()));
        assert_eq!(a1.len(), 2);
        assert_eq!(b1.len(), 2);
    }
}
