use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Signing secret used when none is configured. Fine for local use; links
/// minted with it are forgeable, so production deployments must set
/// PROJECT_HUB_SIGNING_SECRET.
pub const DEFAULT_SIGNING_SECRET: &str = "project-hub-dev-secret";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// External base URL embedded in signed download links.
    pub public_url: String,
    pub signing_secret: String,
    /// Signed link validity window in seconds.
    pub link_ttl_secs: i64,
    /// Accept uploads without a project name, deriving one from the
    /// archive file name.
    pub allow_unnamed: bool,
    pub max_upload_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Project archive sharing hub API")]
pub struct Args {
    /// Host to bind to (overrides PROJECT_HUB_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PROJECT_HUB_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where archive payloads are stored (overrides PROJECT_HUB_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides PROJECT_HUB_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Base URL used in signed download links (overrides PROJECT_HUB_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Secret for signing download links (overrides PROJECT_HUB_SIGNING_SECRET)
    #[arg(long)]
    pub signing_secret: Option<String>,

    /// Signed link validity window in seconds (overrides PROJECT_HUB_LINK_TTL_SECS)
    #[arg(long)]
    pub link_ttl_secs: Option<i64>,

    /// Accept uploads without a project name
    #[arg(long)]
    pub allow_unnamed: bool,

    /// Backfill metadata records for objects that lack one, then exit
    #[arg(long)]
    pub reconcile: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the
    /// reconcile flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("PROJECT_HUB_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port: u16 = env_parsed("PROJECT_HUB_PORT", 3000)?;
        let env_storage =
            env::var("PROJECT_HUB_STORAGE_DIR").unwrap_or_else(|_| "./data/archives".into());
        let env_db = env::var("PROJECT_HUB_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/project_hub.db".into());
        let env_secret = env::var("PROJECT_HUB_SIGNING_SECRET")
            .unwrap_or_else(|_| DEFAULT_SIGNING_SECRET.into());
        let env_ttl: i64 = env_parsed("PROJECT_HUB_LINK_TTL_SECS", 3600)?;
        let env_max_upload: usize =
            env_parsed("PROJECT_HUB_MAX_UPLOAD_BYTES", 256 * 1024 * 1024)?;

        // --- Merge ---
        let port = args.port.unwrap_or(env_port);
        let env_public = env::var("PROJECT_HUB_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://127.0.0.1:{port}"));

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port,
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            public_url: args.public_url.unwrap_or(env_public),
            signing_secret: args.signing_secret.unwrap_or(env_secret),
            link_ttl_secs: args.link_ttl_secs.unwrap_or(env_ttl),
            allow_unnamed: args.allow_unnamed || env_flag("PROJECT_HUB_ALLOW_UNNAMED"),
            max_upload_bytes: env_max_upload,
        };

        Ok((cfg, args.reconcile))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_parsed<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {key} value `{value}`")),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).context(format!("reading {key}")),
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key)
        .map(|value| matches!(value.as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
