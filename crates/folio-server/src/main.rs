//! # folio-server
//!
//! HTTP server for Folio articles and their images.
//!
//! This binary provides:
//! - **Article routes** that create and update an article together with its
//!   image set through the store's save coordinator
//! - **Single-image routes** guarded by the per-article image bounds
//! - **Admin asset delete** that removes unreferenced uploads from the asset
//!   host

mod api;
mod asset_host;
mod config;
mod error;

use std::sync::Arc;

use folio_store::Database;
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::asset_host::CloudinaryHost;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,folio_server=debug,folio_store=debug")),
        )
        .init();

    info!(
        "Starting {} server v{}",
        folio_shared::constants::APP_NAME,
        env!("CARGO_PKG_VERSION")
    );

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");
    if config.admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN not set, admin asset delete is unauthenticated");
    }

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let db = match &config.database_path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Database::open_at(path)?
        }
        None => Database::new()?,
    };

    let asset_host = CloudinaryHost::from_config(&config);
    if !asset_host.is_configured() {
        tracing::warn!("Asset host credentials missing, admin asset delete will fail");
    }

    let http_addr = config.http_addr;
    let app_state = AppState {
        db: Arc::new(Mutex::new(db)),
        asset_host: Arc::new(asset_host),
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
