//! End-to-end exercises of the catalog services against an in-memory
//! database and a temporary payload directory.

use bytes::Bytes;
use project_hub::models::project::DEFAULT_DESCRIPTION;
use project_hub::services::catalog_service::{CatalogError, CatalogService, UploadRequest};
use project_hub::services::signer::LinkSigner;
use project_hub::services::store_service::{StoreError, StoreService};
use sqlx::sqlite::SqlitePoolOptions;
use std::io::{Cursor, Write};
use std::sync::Arc;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

async fn catalog(require_name: bool) -> (CatalogService, TempDir) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("schema");

    let payloads = TempDir::new().expect("payload dir");
    let signer = LinkSigner::new("test-secret", "http://localhost:3000", 3600);
    let store = StoreService::new(Arc::new(pool), payloads.path(), signer);
    (CatalogService::new(store, require_name), payloads)
}

fn sample_zip() -> Bytes {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for path in [
        "src/index.js",
        "src/components/Button.js",
        "__MACOSX/._index.js",
        ".DS_Store",
    ] {
        writer.start_file(path, options).expect("zip entry");
        writer.write_all(b"content").expect("zip entry body");
    }
    Bytes::from(writer.finish().expect("zip archive").into_inner())
}

fn upload_request(name: &str, file_name: &str, bytes: Bytes) -> UploadRequest {
    UploadRequest {
        name: Some(name.to_string()),
        description: Some("A sample project".to_string()),
        file_name: file_name.to_string(),
        bytes,
    }
}

async fn put_raw_object(store: &StoreService, key: &str, payload: &'static [u8]) {
    let chunks = futures::stream::iter([Ok::<Bytes, std::io::Error>(Bytes::from_static(payload))]);
    store
        .put_object(key, chunks, None, |_| {})
        .await
        .expect("raw object stored");
}

#[tokio::test]
async fn upload_then_list_round_trip() {
    let (catalog, _payloads) = catalog(true).await;

    let mut progress = Vec::new();
    let key = catalog
        .upload(
            upload_request("myapp", "archive-on-disk.zip", sample_zip()),
            |percent| progress.push(percent),
        )
        .await
        .expect("upload");
    assert_eq!(key, "myapp.zip");
    assert!(!progress.is_empty());
    assert!((progress.last().copied().unwrap() - 100.0).abs() < 1e-9);
    assert!(progress.windows(2).all(|pair| pair[0] <= pair[1]));

    let projects = catalog.list().await.expect("listing");
    assert_eq!(projects.len(), 1);
    let project = &projects[0];
    assert_eq!(project.name, "myapp");
    assert_eq!(project.file_name, "myapp.zip");
    assert_eq!(project.description, "A sample project");
    assert_eq!(project.downloads, 0);
    assert!(project.file_size > 0);
    assert!(project.file_url.contains("/files/myapp.zip?expires="));

    let structure = serde_json::to_string(&project.structure).expect("tree json");
    assert_eq!(
        structure,
        r#"{"src":{"components":{"Button.js":"file"},"index.js":"file"}}"#
    );
}

#[tokio::test]
async fn reupload_overwrites_and_resets_the_counter() {
    let (catalog, _payloads) = catalog(true).await;

    let key = catalog
        .upload(upload_request("myapp", "v1.zip", sample_zip()), |_| {})
        .await
        .expect("first upload");
    catalog.download(&key).await.expect("download");

    catalog
        .upload(
            UploadRequest {
                name: Some("myapp".to_string()),
                description: Some("Second revision".to_string()),
                file_name: "v2.zip".to_string(),
                bytes: sample_zip(),
            },
            |_| {},
        )
        .await
        .expect("re-upload");

    let projects = catalog.list().await.expect("listing");
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].description, "Second revision");
    assert_eq!(projects[0].downloads, 0);
}

#[tokio::test]
async fn rejects_unsupported_extensions_before_any_storage_work() {
    let (catalog, _payloads) = catalog(true).await;

    let err = catalog
        .upload(
            upload_request("notes", "notes.txt", Bytes::from_static(b"plain text")),
            |_| {},
        )
        .await
        .expect_err("txt must be rejected");
    assert!(matches!(err, CatalogError::UnsupportedExtension(_)));

    let objects = catalog.store.list_objects().await.expect("inventory");
    assert!(objects.is_empty(), "nothing may reach the store");
}

#[tokio::test]
async fn rejects_corrupt_zip_before_any_storage_work() {
    let (catalog, _payloads) = catalog(true).await;

    let err = catalog
        .upload(
            upload_request("broken", "broken.zip", Bytes::from_static(b"not a zip")),
            |_| {},
        )
        .await
        .expect_err("corrupt archive must be rejected");
    assert!(matches!(err, CatalogError::InvalidArchive(_)));

    let objects = catalog.store.list_objects().await.expect("inventory");
    assert!(objects.is_empty());
}

#[tokio::test]
async fn name_requirement_is_configurable() {
    let (strict, _payloads) = catalog(true).await;
    let err = strict
        .upload(
            UploadRequest {
                name: Some("   ".to_string()),
                description: None,
                file_name: "myapp.zip".to_string(),
                bytes: sample_zip(),
            },
            |_| {},
        )
        .await
        .expect_err("blank name must be rejected under strict validation");
    assert!(matches!(err, CatalogError::MissingName));

    let (lenient, _payloads) = catalog(false).await;
    let key = lenient
        .upload(
            UploadRequest {
                name: None,
                description: None,
                file_name: "myapp.zip".to_string(),
                bytes: sample_zip(),
            },
            |_| {},
        )
        .await
        .expect("name derived from the file name");
    assert_eq!(key, "myapp.zip");

    let projects = lenient.list().await.expect("listing");
    assert_eq!(projects[0].name, "myapp");
}

#[tokio::test]
async fn rar_uploads_are_stored_without_structure() {
    let (catalog, _payloads) = catalog(true).await;

    let key = catalog
        .upload(
            upload_request("legacy", "legacy.rar", Bytes::from_static(b"rar payload")),
            |_| {},
        )
        .await
        .expect("rar upload");
    assert_eq!(key, "legacy.rar");

    let projects = catalog.list().await.expect("listing");
    assert_eq!(projects.len(), 1);
    assert!(projects[0].structure.is_empty());
    assert_eq!(projects[0].description, "A sample project");
}

#[tokio::test]
async fn listing_applies_defaults_when_metadata_is_missing() {
    let (catalog, _payloads) = catalog(true).await;
    put_raw_object(&catalog.store, "bare.zip", b"zip-shaped payload").await;
    put_raw_object(&catalog.store, "readme.txt", b"not an archive").await;

    let projects = catalog.list().await.expect("listing");
    assert_eq!(projects.len(), 1, "non-archive objects stay out of the catalog");

    let project = &projects[0];
    assert_eq!(project.name, "bare");
    assert_eq!(project.description, DEFAULT_DESCRIPTION);
    assert_eq!(project.downloads, 0);
    assert!(project.structure.is_empty());
}

#[tokio::test]
async fn download_counts_events_and_issues_verifiable_links() {
    let (catalog, _payloads) = catalog(true).await;
    catalog
        .upload(upload_request("myapp", "myapp.zip", sample_zip()), |_| {})
        .await
        .expect("upload");

    let url = catalog.download("myapp.zip").await.expect("download");
    catalog.download("myapp.zip").await.expect("second download");

    let projects = catalog.list().await.expect("listing");
    assert_eq!(projects[0].downloads, 2);

    let query = url.split_once('?').expect("signed query").1;
    let mut expires = 0i64;
    let mut signature = String::new();
    for pair in query.split('&') {
        let (name, value) = pair.split_once('=').expect("query pair");
        match name {
            "expires" => expires = value.parse().expect("expiry timestamp"),
            "signature" => signature = value.to_string(),
            _ => {}
        }
    }
    assert!(catalog.store.verify_signed_link("myapp.zip", expires, &signature));
    assert!(!catalog.store.verify_signed_link("other.zip", expires, &signature));

    let err = catalog
        .download("ghost.zip")
        .await
        .expect_err("unknown projects cannot be downloaded");
    assert!(matches!(
        err,
        CatalogError::Store(StoreError::ObjectNotFound(_))
    ));
}

#[tokio::test]
async fn metadata_write_failure_leaves_the_object_downloadable() {
    let (catalog, _payloads) = catalog(true).await;
    sqlx::query("DROP TABLE project_metadata")
        .execute(&*catalog.store.db)
        .await
        .expect("drop metadata table");

    let key = catalog
        .upload(upload_request("survivor", "survivor.zip", sample_zip()), |_| {})
        .await
        .expect("upload succeeds despite the failed metadata write");

    let projects = catalog.list().await.expect("listing with defaults");
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].description, DEFAULT_DESCRIPTION);
    assert_eq!(projects[0].downloads, 0);

    let url = catalog.download(&key).await.expect("download still works");
    assert!(url.contains("/files/survivor.zip"));

    let (object, _reader) = catalog
        .store
        .object_reader(&key)
        .await
        .expect("payload readable");
    assert_eq!(object.key, "survivor.zip");
}

#[tokio::test]
async fn reconcile_backfills_archive_objects_without_metadata() {
    let (catalog, _payloads) = catalog(true).await;
    put_raw_object(&catalog.store, "orphan.zip", b"zip-shaped payload").await;
    put_raw_object(&catalog.store, "notes.txt", b"not an archive").await;

    let backfilled = catalog.reconcile().await.expect("sweep");
    assert_eq!(backfilled, 1);

    let record = catalog
        .store
        .find_metadata("orphan.zip")
        .await
        .expect("lookup")
        .expect("record backfilled");
    assert_eq!(record.project_name, "orphan");
    assert_eq!(record.downloads, 0);
    assert!(record.structure.0.is_empty());

    assert!(
        catalog
            .store
            .find_metadata("notes.txt")
            .await
            .expect("lookup")
            .is_none(),
        "non-archive objects are not backfilled"
    );

    let second = catalog.reconcile().await.expect("second sweep");
    assert_eq!(second, 0, "sweep is idempotent");
}
