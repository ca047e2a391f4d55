//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks DB connectivity and disk I/O

use crate::services::catalog_service::CatalogService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use tokio::fs;
use uuid::Uuid;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    database: CheckStatus,
    disk: CheckStatus,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// `GET /healthz`
///
/// Liveness probe — always 200, never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// `GET /readyz`
///
/// Readiness probe: a `SELECT 1` against SQLite plus a write/read/delete
/// round trip under the payload directory. 200 when both pass, 503
/// otherwise.
pub async fn readyz(State(catalog): State<CatalogService>) -> impl IntoResponse {
    let database = check_database(&catalog).await;
    let disk = check_disk(&catalog).await;

    let all_ok = database.ok && disk.ok;
    let body = ReadyResponse {
        status: if all_ok { "ok" } else { "error" },
        database,
        disk,
    };
    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

async fn check_database(catalog: &CatalogService) -> CheckStatus {
    match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&*catalog.store.db)
        .await
    {
        Ok(1) => CheckStatus {
            ok: true,
            error: None,
        },
        Ok(other) => CheckStatus {
            ok: false,
            error: Some(format!("unexpected result: {other}")),
        },
        Err(err) => CheckStatus {
            ok: false,
            error: Some(err.to_string()),
        },
    }
}

async fn check_disk(catalog: &CatalogService) -> CheckStatus {
    let probe = catalog
        .store
        .base_path
        .join(format!(".readyz-{}", Uuid::new_v4()));

    let outcome = async {
        fs::write(&probe, b"ready").await?;
        let contents = fs::read(&probe).await?;
        if contents != b"ready" {
            return Err(std::io::Error::other("probe content mismatch"));
        }
        Ok::<_, std::io::Error>(())
    }
    .await;

    let _ = fs::remove_file(&probe).await;

    match outcome {
        Ok(()) => CheckStatus {
            ok: true,
            error: None,
        },
        Err(err) => CheckStatus {
            ok: false,
            error: Some(err.to_string()),
        },
    }
}
