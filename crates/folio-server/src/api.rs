use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use folio_shared::{AssetRef, Field, ValidationErrors};
use folio_store::{ArticleForm, ArticleParams, Database, ImageAttributes, SaveState, StoreError};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::asset_host::AssetHost;
use crate::config::ServerConfig;
use crate::error::ServerError;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub asset_host: Arc<dyn AssetHost>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/articles", get(list_articles).post(create_article))
        .route("/articles/new", get(new_article))
        .route(
            "/articles/:id",
            get(show_article)
                .patch(update_article)
                .put(update_article)
                .delete(destroy_article),
        )
        .route("/articles/:id/edit", get(edit_article))
        .route("/articles/:id/images", post(create_image))
        .route(
            "/articles/:id/images/:image_id",
            patch(update_image).put(update_image).delete(destroy_image),
        )
        .route(
            "/api/v0/articles/:id/images/:image_id",
            delete(api_destroy_image),
        )
        .route(
            "/api/v0/admin_cloudinary/:public_id",
            delete(admin_destroy_asset),
        )
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Serialize)]
pub(crate) struct ErrorView {
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<Field>,
    message: String,
}

pub(crate) fn error_views(errors: &ValidationErrors) -> Vec<ErrorView> {
    errors
        .iter()
        .map(|e| ErrorView {
            kind: e.kind(),
            field: e.field(),
            message: e.to_string(),
        })
        .collect()
}

/// Everything a client needs to re-display a form, including the asset
/// references it already uploaded.
#[derive(Serialize)]
struct FormView<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    article_id: Option<Uuid>,
    title: &'a str,
    body: &'a str,
    image_attributes: &'a ImageAttributes,
    new_cl_ids: Vec<&'a str>,
    destroying_image_ids: Vec<&'a str>,
    state: SaveState,
    errors: Vec<ErrorView>,
    error_count: usize,
}

impl<'a> FormView<'a> {
    fn of(form: &'a ArticleForm) -> Self {
        Self {
            article_id: form.article().map(|a| a.id),
            title: form.title(),
            body: form.body(),
            image_attributes: form.image_attributes(),
            new_cl_ids: form.new_cl_ids(),
            destroying_image_ids: form.destroying_image_ids(),
            state: form.state(),
            errors: error_views(form.errors()),
            error_count: form.errors().len(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ImageParams {
    #[serde(default)]
    cl_id: Option<String>,
    #[serde(default)]
    position: Option<i64>,
}

// ---------------------------------------------------------------------------
// Articles
// ---------------------------------------------------------------------------

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn list_articles(State(state): State<AppState>) -> Result<Response, ServerError> {
    let db = state.db.lock().await;
    Ok(Json(db.list_articles()?).into_response())
}

async fn new_article() -> Response {
    let form = ArticleForm::new(ArticleParams::default());
    Json(FormView::of(&form)).into_response()
}

async fn create_article(
    State(state): State<AppState>,
    Json(params): Json<ArticleParams>,
) -> Result<Response, ServerError> {
    let mut db = state.db.lock().await;
    let mut form = ArticleForm::new(params);
    save_and_respond(&mut form, &mut db)
}

async fn show_article(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ServerError> {
    let id = parse_id(&id)?;
    let db = state.db.lock().await;
    Ok(Json(db.get_article_with_images(id)?).into_response())
}

async fn edit_article(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ServerError> {
    let id = parse_id(&id)?;
    let db = state.db.lock().await;
    let article = db.get_article(id)?;
    let images = db.list_images(id)?;
    let form = ArticleForm::edit(article, &images);
    Ok(Json(FormView::of(&form)).into_response())
}

async fn update_article(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(params): Json<ArticleParams>,
) -> Result<Response, ServerError> {
    let id = parse_id(&id)?;
    let mut db = state.db.lock().await;
    let article = db.get_article(id)?;
    let images = db.list_images(id)?;
    let mut form = ArticleForm::for_update(article, &images, params);
    save_and_respond(&mut form, &mut db)
}

async fn destroy_article(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ServerError> {
    let id = parse_id(&id)?;
    let db = state.db.lock().await;
    if !db.delete_article(id)? {
        return Err(ServerError::NotFound(format!("Article {id}")));
    }
    Ok(Redirect::to("/articles").into_response())
}

/// Redirect to the saved article, or `422` with the form state.
fn save_and_respond(form: &mut ArticleForm, db: &mut Database) -> Result<Response, ServerError> {
    if form.save(db)? {
        let id = form
            .article()
            .map(|a| a.id)
            .ok_or_else(|| ServerError::Internal("saved form without article".into()))?;
        return Ok(Redirect::to(&format!("/articles/{id}")).into_response());
    }

    info!(
        article_id = ?form.article().map(|a| a.id),
        errors = form.errors().len(),
        "article form not saved"
    );
    Ok((StatusCode::UNPROCESSABLE_ENTITY, Json(FormView::of(form))).into_response())
}

// ---------------------------------------------------------------------------
// Single images
// ---------------------------------------------------------------------------

async fn create_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(params): Json<ImageParams>,
) -> Result<Response, ServerError> {
    let id = parse_id(&id)?;
    let cl_id = AssetRef::new(params.cl_id.unwrap_or_default());
    let mut db = state.db.lock().await;
    db.create_image(id, &cl_id, params.position)?;
    Ok(Redirect::to(&format!("/articles/{id}")).into_response())
}

async fn update_image(
    State(state): State<AppState>,
    Path((id, image_id)): Path<(String, String)>,
    Json(params): Json<ImageParams>,
) -> Result<Response, ServerError> {
    let (id, image_id) = (parse_id(&id)?, parse_id(&image_id)?);
    let cl_id = params.cl_id.map(AssetRef::new);
    let mut db = state.db.lock().await;
    db.update_image(id, image_id, cl_id.as_ref(), params.position)?;
    Ok(Redirect::to(&format!("/articles/{id}")).into_response())
}

/// Redirects whether or not the image could be removed; the last image of an
/// article stays.
async fn destroy_image(
    State(state): State<AppState>,
    Path((id, image_id)): Path<(String, String)>,
) -> Result<Response, ServerError> {
    let (id, image_id) = (parse_id(&id)?, parse_id(&image_id)?);
    let mut db = state.db.lock().await;
    match db.destroy_image(id, image_id) {
        Ok(()) | Err(StoreError::Invalid(_)) => {
            Ok(Redirect::to(&format!("/articles/{id}")).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

async fn api_destroy_image(
    State(state): State<AppState>,
    Path((id, image_id)): Path<(String, String)>,
) -> Result<Response, ServerError> {
    let (id, image_id) = (parse_id(&id)?, parse_id(&image_id)?);
    let mut db = state.db.lock().await;
    match db.destroy_image(id, image_id) {
        Ok(()) => Ok(Json(MessageResponse {
            message: "Deleted image",
        })
        .into_response()),
        Err(StoreError::Invalid(_)) => Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(MessageResponse {
                message: "Cannot delete image",
            }),
        )
            .into_response()),
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

/// Without a configured `ADMIN_TOKEN` the admin endpoint is open.
fn verify_admin_token(headers: &HeaderMap, config: &ServerConfig) -> Result<(), ServerError> {
    let Some(ref expected) = config.admin_token else {
        return Ok(());
    };

    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or(auth);

    use subtle::ConstantTimeEq;
    let token_bytes = token.as_bytes();
    let expected_bytes = expected.as_bytes();
    if token_bytes.len() != expected_bytes.len()
        || token_bytes.ct_eq(expected_bytes).unwrap_u8() != 1
    {
        return Err(ServerError::Forbidden("Invalid admin token".into()));
    }

    Ok(())
}

/// Delete an uploaded asset that no image refers to, e.g. one abandoned in
/// a rejected form.
async fn admin_destroy_asset(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(public_id): Path<String>,
) -> Result<Response, ServerError> {
    verify_admin_token(&headers, &state.config)?;

    let public_id = public_id.trim().to_string();
    if public_id.is_empty() {
        return Err(ServerError::BadRequest("public id is blank".into()));
    }

    // Lock released before the outbound call.
    let referenced = state.db.lock().await.asset_referenced(&public_id)?;
    if referenced {
        info!(public_id = %public_id, "refusing to delete referenced asset");
        return Ok((
            StatusCode::FORBIDDEN,
            Json(MessageResponse {
                message: "Cannot delete image",
            }),
        )
            .into_response());
    }

    let result = state.asset_host.destroy(&public_id).await?;
    if result == "ok" {
        info!(public_id = %public_id, "asset deleted");
        Ok(Json(MessageResponse {
            message: "Deleted image",
        })
        .into_response())
    } else {
        info!(public_id = %public_id, result = %result, "asset host refused delete");
        Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(MessageResponse {
                message: "Cannot delete image",
            }),
        )
            .into_response())
    }
}

fn parse_id(raw: &str) -> Result<Uuid, ServerError> {
    Uuid::parse_str(raw).map_err(|_| ServerError::NotFound(format!("No record with id {raw}")))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
