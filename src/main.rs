use anyhow::Result;
use axum::{Router, extract::DefaultBodyLimit};
use project_hub::config::{AppConfig, DEFAULT_SIGNING_SECRET};
use project_hub::routes;
use project_hub::services::{
    catalog_service::CatalogService, signer::LinkSigner, store_service::StoreService,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + reconcile flag ---
    let (cfg, reconcile) = AppConfig::from_env_and_args()?;

    tracing::info!(
        "Starting project-hub on {} (storage: {}, database: {})",
        cfg.addr(),
        cfg.storage_dir,
        cfg.database_url
    );
    if cfg.signing_secret == DEFAULT_SIGNING_SECRET {
        tracing::warn!(
            "PROJECT_HUB_SIGNING_SECRET is not set; download links are signed with the default development secret"
        );
    }

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db_path = cfg
        .database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");
    if let Some(parent) = Path::new(db_path).parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent)?;
        tracing::info!("Created database directory {:?}", parent);
    }

    let options = SqliteConnectOptions::from_str(&cfg.database_url)?.create_if_missing(true);
    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?,
    );

    sqlx::migrate!("./migrations").run(&*db).await?;

    // --- Initialize core services ---
    let signer = LinkSigner::new(&cfg.signing_secret, &cfg.public_url, cfg.link_ttl_secs);
    let store = StoreService::new(db, cfg.storage_dir.clone(), signer);
    let catalog = CatalogService::new(store, !cfg.allow_unnamed);

    // --- Handle reconcile mode ---
    if reconcile {
        let backfilled = catalog.reconcile().await?;
        tracing::info!("Reconciliation complete: {} metadata record(s) backfilled", backfilled);
        return Ok(()); // exit after the sweep
    }

    // --- Build router ---
    let app: Router = routes::routes()
        .layer(DefaultBodyLimit::max(cfg.max_upload_bytes))
        .with_state(catalog);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
