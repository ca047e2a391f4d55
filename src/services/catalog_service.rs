//! Catalog controller.
//!
//! Materializes `Project` read models by joining the object listing with
//! metadata records and fresh signed links, accepts archive uploads
//! (structure extraction included), records download events, and runs the
//! metadata reconciliation sweep.

use crate::models::{
    metadata::ProjectMetadata,
    object::StoredObject,
    project::{self, Project},
    tree::TreeNode,
};
use crate::services::store_service::{StoreError, StoreService};
use crate::services::structure;
use bytes::Bytes;
use chrono::Utc;
use futures::future::join_all;
use futures::{Stream, stream};
use sqlx::types::Json;
use std::io;
use thiserror::Error;
use tracing::{debug, info, warn};

const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("a project name is required")]
    MissingName,
    #[error("`{0}` is not a zip or rar archive")]
    UnsupportedExtension(String),
    #[error("archive could not be read: {0}")]
    InvalidArchive(#[from] zip::result::ZipError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Everything the catalog needs to accept one upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Display name. Optional at the transport layer; whether an empty
    /// name is tolerated depends on the catalog's validation strictness.
    pub name: Option<String>,
    pub description: Option<String>,
    /// Original file name of the uploaded archive, used for the extension
    /// check and as the name fallback.
    pub file_name: String,
    pub bytes: Bytes,
}

#[derive(Clone)]
pub struct CatalogService {
    pub store: StoreService,
    require_name: bool,
}

impl CatalogService {
    /// `require_name = false` restores the hub's historical looseness:
    /// uploads without a name derive one from the archive file name.
    pub fn new(store: StoreService, require_name: bool) -> Self {
        Self {
            store,
            require_name,
        }
    }

    /// Produce a fresh catalog snapshot: every stored `.zip`/`.rar` object
    /// enriched with a signed link and its metadata record. Enrichment runs
    /// concurrently across objects. A failed metadata lookup downgrades
    /// that entry to defaults instead of failing the listing; only the
    /// object listing itself is fatal.
    pub async fn list(&self) -> Result<Vec<Project>, CatalogError> {
        let objects = self.store.list_objects().await?;
        let enriched = join_all(
            objects
                .into_iter()
                .filter(|object| project::is_archive_key(&object.key))
                .map(|object| self.enrich(object)),
        )
        .await;
        enriched.into_iter().collect()
    }

    async fn enrich(&self, object: StoredObject) -> Result<Project, CatalogError> {
        let file_url = self.store.signed_url(&object.key)?;
        let metadata = match self.store.find_metadata(&object.key).await {
            Ok(found) => found,
            Err(err) => {
                warn!(
                    "metadata lookup for {} failed, listing with defaults: {}",
                    object.key, err
                );
                None
            }
        };
        Ok(Project::from_parts(object, file_url, metadata))
    }

    /// Accept one archive upload.
    ///
    /// Validation (extension by suffix, name presence) happens before any
    /// storage work, as does structure extraction for zip sources — a
    /// corrupt archive never reaches disk. `.rar` archives are stored with
    /// an empty tree since no decoder is wired in. The payload write is
    /// fatal on failure; the metadata upsert afterwards is tolerated when
    /// it fails, leaving the object listed with defaults until the next
    /// upload or a reconciliation sweep.
    ///
    /// Returns the canonical object key.
    pub async fn upload<F>(
        &self,
        request: UploadRequest,
        on_progress: F,
    ) -> Result<String, CatalogError>
    where
        F: FnMut(f64),
    {
        let Some(extension) = project::archive_extension(&request.file_name) else {
            return Err(CatalogError::UnsupportedExtension(request.file_name));
        };

        let name = match request
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
        {
            Some(name) => name.to_string(),
            None if self.require_name => return Err(CatalogError::MissingName),
            None => project::display_name(&request.file_name).to_string(),
        };
        let key = format!("{name}.{extension}");

        let structure = if extension == "zip" {
            structure::structure_from_zip(&request.bytes)?
        } else {
            TreeNode::empty()
        };

        let total = request.bytes.len() as u64;
        let object = self
            .store
            .put_object(&key, chunked(request.bytes), Some(total), on_progress)
            .await?;
        info!("stored archive {} ({} bytes)", object.key, object.size_bytes);

        let record = ProjectMetadata {
            file_name: key.clone(),
            project_name: name,
            description: request
                .description
                .filter(|description| !description.trim().is_empty()),
            structure: Json(structure),
            downloads: 0,
            created_at: Utc::now(),
        };
        if let Err(err) = self.store.upsert_metadata(&record).await {
            warn!(
                "metadata write for {} failed after upload; object kept, defaults apply: {}",
                key, err
            );
        }

        Ok(key)
    }

    /// Record a download event and hand back a fresh signed link.
    ///
    /// The counter increment is best-effort: a failure (or a missing
    /// metadata record) is logged and the download proceeds anyway.
    pub async fn download(&self, file_name: &str) -> Result<String, CatalogError> {
        let object = self.store.fetch_object(file_name).await?;

        match self.store.increment_downloads(file_name).await {
            Ok(0) => warn!(
                "no metadata record to count download of {}; run --reconcile to backfill",
                file_name
            ),
            Ok(_) => debug!("download recorded for {}", file_name),
            Err(err) => warn!("download count update for {} failed: {}", file_name, err),
        }

        Ok(self.store.signed_url(&object.key)?)
    }

    /// Backfill placeholder metadata records for archive objects that lack
    /// one. Returns how many records were written.
    pub async fn reconcile(&self) -> Result<usize, CatalogError> {
        let missing = self.store.keys_missing_metadata().await?;
        let mut backfilled = 0;
        for key in missing.iter().filter(|key| project::is_archive_key(key)) {
            self.store
                .upsert_metadata(&ProjectMetadata::placeholder(key))
                .await?;
            info!("backfilled metadata record for {}", key);
            backfilled += 1;
        }
        Ok(backfilled)
    }
}

/// Split an in-memory payload into a chunk stream so uploads exercise the
/// same streaming write path as any other producer and progress can be
/// reported per chunk.
fn chunked(bytes: Bytes) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
    let total = bytes.len();
    stream::iter((0..total).step_by(UPLOAD_CHUNK_BYTES).map(
        move |start| -> io::Result<Bytes> {
            Ok(bytes.slice(start..usize::min(start + UPLOAD_CHUNK_BYTES, total)))
        },
    ))
}
