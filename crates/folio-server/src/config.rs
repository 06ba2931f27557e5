//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development. Asset-host credentials are the
//! exception: without them the admin asset delete answers with an error.

use std::net::SocketAddr;
use std::path::PathBuf;

use folio_shared::constants::{DEFAULT_HTTP_PORT, DEFAULT_MAX_BODY_BYTES};

pub const DEFAULT_ASSET_HOST_BASE_URL: &str = "https://api.cloudinary.com/v1_1";

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `None` (the platform data directory).
    pub database_path: Option<PathBuf>,

    /// Bearer token for `/api/v0/admin_cloudinary/*`.
    /// Env: `ADMIN_TOKEN`
    /// Default: empty (endpoint unauthenticated).
    pub admin_token: Option<String>,

    /// Env: `ASSET_HOST_BASE_URL`
    pub asset_host_base_url: String,

    /// Env: `ASSET_HOST_CLOUD_NAME`
    pub asset_host_cloud_name: Option<String>,

    /// Env: `ASSET_HOST_API_KEY`
    pub asset_host_api_key: Option<String>,

    /// Env: `ASSET_HOST_API_SECRET`
    pub asset_host_api_secret: Option<String>,

    /// Largest accepted request body in bytes.
    /// Env: `MAX_BODY_BYTES`
    /// Default: 1 MiB
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: None,
            admin_token: None,
            asset_host_base_url: DEFAULT_ASSET_HOST_BASE_URL.to_string(),
            asset_host_cloud_name: None,
            asset_host_api_key: None,
            asset_host_api_secret: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

// Secrets stay out of the startup log.
impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("database_path", &self.database_path)
            .field("admin_token", &self.admin_token.as_ref().map(|_| "<set>"))
            .field("asset_host_base_url", &self.asset_host_base_url)
            .field("asset_host_cloud_name", &self.asset_host_cloud_name)
            .field("asset_host_api_key", &self.asset_host_api_key.as_ref().map(|_| "<set>"))
            .field(
                "asset_host_api_secret",
                &self.asset_host_api_secret.as_ref().map(|_| "<set>"),
            )
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        config.database_path = non_empty(lookup("DATABASE_PATH")).map(PathBuf::from);
        config.admin_token = non_empty(lookup("ADMIN_TOKEN"));

        if let Some(url) = non_empty(lookup("ASSET_HOST_BASE_URL")) {
            config.asset_host_base_url = url.trim_end_matches('/').to_string();
        }
        config.asset_host_cloud_name = non_empty(lookup("ASSET_HOST_CLOUD_NAME"));
        config.asset_host_api_key = non_empty(lookup("ASSET_HOST_API_KEY"));
        config.asset_host_api_secret = non_empty(lookup("ASSET_HOST_API_SECRET"));

        if let Some(val) = lookup("MAX_BODY_BYTES") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_body_bytes = n,
                _ => tracing::warn!(value = %val, "Invalid MAX_BODY_BYTES, using default"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
