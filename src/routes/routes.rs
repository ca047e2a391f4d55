//! Defines routes for the project archive hub.
//!
//! ## Structure
//! - **Catalog endpoints**
//!   - `GET  /projects` — list the catalog (projects with signed links)
//!   - `POST /projects` — upload an archive (multipart: name, description, file)
//!   - `POST /projects/{file_name}/download` — count a download, redirect to a signed link
//!
//! - **Payload endpoint**
//!   - `GET /files/{file_name}?expires&signature` — serve a signed link
//!
//! Health endpoints (`/healthz`, `/readyz`) are mounted at the root.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        project_handlers::{download_project, fetch_file, list_projects, upload_project},
    },
    services::catalog_service::CatalogService,
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build the router for all catalog routes.
///
/// The router carries shared state (`CatalogService`) to all handlers.
pub fn routes() -> Router<CatalogService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // catalog
        .route("/projects", get(list_projects).post(upload_project))
        .route("/projects/{file_name}/download", post(download_project))
        // signed payload downloads
        .route("/files/{file_name}", get(fetch_file))
}
