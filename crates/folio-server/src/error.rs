use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use folio_shared::ValidationErrors;
use folio_store::StoreError;
use thiserror::Error;

use crate::asset_host::AssetHostError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("{0}")]
    Unprocessable(ValidationErrors),

    #[error("Asset host error: {0}")]
    AssetHost(#[from] AssetHostError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ServerError::NotFound("Record not found".into()),
            StoreError::Invalid(errors) => ServerError::Unprocessable(errors),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
            ServerError::Unprocessable(errors) => {
                let body = serde_json::json!({
                    "error": self.to_string(),
                    "errors": crate::api::error_views(errors),
                });
                return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(body)).into_response();
            }
            ServerError::AssetHost(AssetHostError::NotConfigured) => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            ServerError::AssetHost(e) => {
                tracing::error!(error = %e, "asset host request failed");
                (StatusCode::BAD_GATEWAY, "Asset host error".to_string())
            }
            ServerError::Internal(detail) => {
                tracing::error!(error = %detail, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
