//! Outbound calls to the image asset host.
//!
//! Only one operation is needed: destroying an uploaded asset by its public
//! id. [`CloudinaryHost`] speaks the Cloudinary upload API; tests swap in
//! their own [`AssetHost`].

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Deserialize;
use sha1::{Digest, Sha1};
use thiserror::Error;

use crate::config::ServerConfig;

#[derive(Debug, Error)]
pub enum AssetHostError {
    #[error("asset host credentials are not configured")]
    NotConfigured,

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response status {0}")]
    Status(u16),
}

#[async_trait]
pub trait AssetHost: Send + Sync {
    /// Ask the host to delete `public_id`. Returns the host's `result`
    /// string, `"ok"` on success.
    async fn destroy(&self, public_id: &str) -> Result<String, AssetHostError>;
}

struct Credentials {
    cloud_name: String,
    api_key: String,
    api_secret: String,
}

/// Cloudinary-compatible asset host.
pub struct CloudinaryHost {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<Credentials>,
}

#[derive(Deserialize)]
struct DestroyResponse {
    result: String,
}

impl CloudinaryHost {
    pub fn from_config(config: &ServerConfig) -> Self {
        let credentials = match (
            &config.asset_host_cloud_name,
            &config.asset_host_api_key,
            &config.asset_host_api_secret,
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(Credentials {
                cloud_name: cloud_name.clone(),
                api_key: api_key.clone(),
                api_secret: api_secret.clone(),
            }),
            _ => None,
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.asset_host_base_url.clone(),
            credentials,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }
}

#[async_trait]
impl AssetHost for CloudinaryHost {
    async fn destroy(&self, public_id: &str) -> Result<String, AssetHostError> {
        let creds = self.credentials.as_ref().ok_or(AssetHostError::NotConfigured)?;

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
            .to_string();
        let signature = sign(
            &[("public_id", public_id), ("timestamp", &timestamp)],
            &creds.api_secret,
        );
        let url = format!("{}/{}/image/destroy", self.base_url, creds.cloud_name);

        let resp = self
            .client
            .post(&url)
            .form(&[
                ("public_id", public_id),
                ("timestamp", timestamp.as_str()),
                ("api_key", creds.api_key.as_str()),
                ("signature", signature.as_str()),
            ])
            .send()
            .await?;

        // Cloudinary reports "not found" with a 200 and a non-ok result.
        if !resp.status().is_success() {
            return Err(AssetHostError::Status(resp.status().as_u16()));
        }

        let body: DestroyResponse = resp.json().await?;
        tracing::debug!(public_id, result = %body.result, "asset host destroy");
        Ok(body.result)
    }
}

/// Request signature: parameters sorted by name, joined as `k=v&k=v`, the
/// API secret appended, SHA-1, lowercase hex.
fn sign(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha1::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}
