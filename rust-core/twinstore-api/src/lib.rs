// SPDX-License-Identifier: PMPL-1.0-or-later
//! TwinStore API
//!
//! HTTP surface over the project catalog. Authentication happens upstream:
//! the gateway forwards the caller's identity in the `X-User-Id` header and
//! every handler binds its services to that tenant.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, instrument, warn};

use twinstore_adapter::{AdapterRegistry, BackendKind, Document, Filter, FindOptions};
use twinstore_repository::{Catalog, ErrorKind, RepoError};

/// Header carrying the authenticated tenant.
pub const TENANT_HEADER: &str = "x-user-id";

/// Result code of every successful envelope.
pub const SUCCESS_CODE: &str = "0000";

const ENV_HOST: &str = "TWINSTORE_HOST";
const ENV_PORT: &str = "TWINSTORE_PORT";

/// API errors
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Repo(err) => err.kind(),
            ApiError::BadRequest(_) => ErrorKind::InvalidArgument,
            ApiError::Config(_) => ErrorKind::Internal,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let kind = self.kind();
        let status = match kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::Connection => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self, "Request failed");
        }

        let body = Json(ErrorResponse {
            success: false,
            error: self.to_string(),
            kind,
        });

        (status, body).into_response()
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub kind: ErrorKind,
}

/// Success response body: `{success: true, data: {code: "0000", result}}`
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: Payload<T>,
}

#[derive(Debug, Serialize)]
pub struct Payload<T> {
    pub code: &'static str,
    pub result: T,
}

fn ok<T: Serialize>(result: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data: Payload {
            code: SUCCESS_CODE,
            result,
        },
    })
}

/// API configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ApiConfig {
    /// Read `TWINSTORE_HOST` / `TWINSTORE_PORT`, defaulting anything unset.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(host) = lookup(ENV_HOST).filter(|h| !h.trim().is_empty()) {
            config.host = host;
        }
        if let Some(port) = lookup(ENV_PORT).filter(|p| !p.trim().is_empty()) {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| ApiError::Config(format!("invalid {ENV_PORT} `{port}`")))?;
        }
        Ok(config)
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub backend: BackendKind,
    pub adapter_active: bool,
    pub uptime_seconds: u64,
}

/// Query parameters accepted by list endpoints
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Exact match on `code`
    pub code: Option<String>,
    /// Field to sort by
    pub sort: Option<String>,
    /// `asc` (default) or `desc`
    pub order: Option<String>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

impl ListQuery {
    fn filter(&self) -> Filter {
        match &self.code {
            Some(code) => Filter::new().eq("code", code.as_str()),
            None => Filter::new(),
        }
    }

    fn options(&self) -> Result<FindOptions, ApiError> {
        let mut options = FindOptions::new();
        if let Some(field) = &self.sort {
            options = match self.order.as_deref() {
                None | Some("asc") => options.sort_asc(field.as_str()),
                Some("desc") => options.sort_desc(field.as_str()),
                Some(other) => {
                    return Err(ApiError::BadRequest(format!(
                        "order must be `asc` or `desc`, got `{other}`"
                    )))
                }
            };
        }
        if let Some(skip) = self.skip {
            options = options.skip(skip);
        }
        if let Some(limit) = self.limit {
            options = options.limit(limit);
        }
        Ok(options)
    }
}

/// Request body for the `PUT .../{id}/status` routes
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: bool,
}

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<AdapterRegistry>,
    pub catalog: Catalog,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(registry: Arc<AdapterRegistry>) -> Result<Self, ApiError> {
        Ok(Self {
            catalog: Catalog::new(Arc::clone(&registry))?,
            registry,
            start_time: std::time::Instant::now(),
        })
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("backend", &self.registry.config().backend)
            .finish()
    }
}

/// The tenant named by the `X-User-Id` header.
fn tenant(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest("missing X-User-Id header".to_string()))
}

/// Build the API router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/health", get(health_handler))
        // Projects
        .route("/projects", get(list_projects_handler).post(create_project_handler))
        .route(
            "/projects/{id}",
            get(get_project_handler)
                .put(update_project_handler)
                .delete(delete_project_handler),
        )
        .route("/projects/{id}/status", put(project_status_handler))
        .route(
            "/projects/{id}/configs/{language}",
            get(get_config_handler).put(save_config_handler),
        )
        .route(
            "/projects/by-code/{code}/json",
            get(get_project_json_handler).put(save_project_json_handler),
        )
        // Design projects
        .route(
            "/design-projects",
            get(list_design_projects_handler).post(create_design_project_handler),
        )
        .route(
            "/design-projects/{id}",
            get(get_design_project_handler)
                .put(update_design_project_handler)
                .delete(delete_design_project_handler),
        )
        // Content configs
        .route(
            "/content-configs",
            get(list_content_configs_handler).post(create_content_config_handler),
        )
        .route(
            "/content-configs/{id}",
            get(get_content_config_handler)
                .put(update_content_config_handler)
                .delete(delete_content_config_handler),
        )
        .route("/content-configs/{id}/status", put(content_config_status_handler))
        // Fields
        .route("/fields", get(list_fields_handler).post(create_field_handler))
        .route(
            "/fields/{id}",
            get(get_field_handler)
                .put(update_field_handler)
                .delete(delete_field_handler),
        )
        .route("/fields/{id}/status", put(field_status_handler))
        .with_state(state)
}

/// Health check handler
#[instrument(skip(state))]
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: state.registry.config().backend,
        adapter_active: state.registry.is_active().await,
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

#[instrument(skip(state, headers))]
async fn list_projects_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Envelope<Vec<Document>>>, ApiError> {
    let tenant = tenant(&headers)?;
    let projects = state.catalog.projects(Some(&tenant)).await?;
    let found = projects.list(&query.filter(), &query.options()?).await?;
    Ok(ok(found))
}

#[instrument(skip(state, headers, body))]
async fn create_project_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Document>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = tenant(&headers)?;
    let projects = state.catalog.projects(Some(&tenant)).await?;
    let created = projects.create(body).await?;
    Ok((StatusCode::CREATED, ok(created)))
}

#[instrument(skip(state, headers))]
async fn get_project_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Document>>, ApiError> {
    let tenant = tenant(&headers)?;
    let projects = state.catalog.projects(Some(&tenant)).await?;
    Ok(ok(projects.get(&id).await?))
}

#[instrument(skip(state, headers, body))]
async fn update_project_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Document>,
) -> Result<Json<Envelope<Document>>, ApiError> {
    let tenant = tenant(&headers)?;
    let projects = state.catalog.projects(Some(&tenant)).await?;
    Ok(ok(projects.update(&id, body).await?))
}

#[instrument(skip(state, headers))]
async fn delete_project_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Value>>, ApiError> {
    let tenant = tenant(&headers)?;
    let projects = state.catalog.projects(Some(&tenant)).await?;
    projects.delete(&id).await?;
    Ok(ok(serde_json::json!({ "id": id })))
}

#[instrument(skip(state, headers))]
async fn project_status_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<Envelope<Document>>, ApiError> {
    let tenant = tenant(&headers)?;
    let projects = state.catalog.projects(Some(&tenant)).await?;
    Ok(ok(projects.toggle_status(&id, request.status).await?))
}

#[instrument(skip(state, headers))]
async fn get_config_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, language)): Path<(String, String)>,
) -> Result<Json<Envelope<Value>>, ApiError> {
    let tenant = tenant(&headers)?;
    let projects = state.catalog.projects(Some(&tenant)).await?;
    Ok(ok(projects.get_config(&id, &language).await?))
}

#[instrument(skip(state, headers, config))]
async fn save_config_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, language)): Path<(String, String)>,
    Json(config): Json<Value>,
) -> Result<Json<Envelope<Value>>, ApiError> {
    let tenant = tenant(&headers)?;
    let projects = state.catalog.projects(Some(&tenant)).await?;
    Ok(ok(projects.save_config(&id, &language, config).await?))
}

#[instrument(skip(state, headers))]
async fn get_project_json_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> Result<Json<Envelope<Value>>, ApiError> {
    let tenant = tenant(&headers)?;
    let projects = state.catalog.projects(Some(&tenant)).await?;
    Ok(ok(projects.project_json(&code).await?))
}

#[instrument(skip(state, headers, json))]
async fn save_project_json_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
    Json(json): Json<Value>,
) -> Result<Json<Envelope<Value>>, ApiError> {
    let tenant = tenant(&headers)?;
    let projects = state.catalog.projects(Some(&tenant)).await?;
    Ok(ok(projects.save_json(&code, json).await?))
}

#[instrument(skip(state, headers))]
async fn list_design_projects_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Envelope<Vec<Document>>>, ApiError> {
    let tenant = tenant(&headers)?;
    let designs = state.catalog.design_projects(Some(&tenant)).await?;
    let found = designs.list(&query.filter(), &query.options()?).await?;
    Ok(ok(found))
}

#[instrument(skip(state, headers, body))]
async fn create_design_project_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Document>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = tenant(&headers)?;
    let designs = state.catalog.design_projects(Some(&tenant)).await?;
    let created = designs.create(body).await?;
    Ok((StatusCode::CREATED, ok(created)))
}

#[instrument(skip(state, headers))]
async fn get_design_project_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Document>>, ApiError> {
    let tenant = tenant(&headers)?;
    let designs = state.catalog.design_projects(Some(&tenant)).await?;
    Ok(ok(designs.get(&id).await?))
}

#[instrument(skip(state, headers, body))]
async fn update_design_project_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Document>,
) -> Result<Json<Envelope<Document>>, ApiError> {
    let tenant = tenant(&headers)?;
    let designs = state.catalog.design_projects(Some(&tenant)).await?;
    Ok(ok(designs.update(&id, body).await?))
}

#[instrument(skip(state, headers))]
async fn delete_design_project_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Value>>, ApiError> {
    let tenant = tenant(&headers)?;
    let designs = state.catalog.design_projects(Some(&tenant)).await?;
    designs.delete(&id).await?;
    Ok(ok(serde_json::json!({ "id": id })))
}

#[instrument(skip(state, headers))]
async fn list_content_configs_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Envelope<Vec<Document>>>, ApiError> {
    let tenant = tenant(&headers)?;
    let configs = state.catalog.content_configs(Some(&tenant)).await?;
    let found = configs.list(&query.filter(), &query.options()?).await?;
    Ok(ok(found))
}

#[instrument(skip(state, headers, body))]
async fn create_content_config_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Document>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = tenant(&headers)?;
    let configs = state.catalog.content_configs(Some(&tenant)).await?;
    let created = configs.create(body).await?;
    Ok((StatusCode::CREATED, ok(created)))
}

#[instrument(skip(state, headers))]
async fn get_content_config_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Document>>, ApiError> {
    let tenant = tenant(&headers)?;
    let configs = state.catalog.content_configs(Some(&tenant)).await?;
    Ok(ok(configs.get(&id).await?))
}

#[instrument(skip(state, headers, body))]
async fn update_content_config_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Document>,
) -> Result<Json<Envelope<Document>>, ApiError> {
    let tenant = tenant(&headers)?;
    let configs = state.catalog.content_configs(Some(&tenant)).await?;
    Ok(ok(configs.update(&id, body).await?))
}

#[instrument(skip(state, headers))]
async fn delete_content_config_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Value>>, ApiError> {
    let tenant = tenant(&headers)?;
    let configs = state.catalog.content_configs(Some(&tenant)).await?;
    configs.delete(&id).await?;
    Ok(ok(serde_json::json!({ "id": id })))
}

#[instrument(skip(state, headers))]
async fn content_config_status_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<Envelope<Document>>, ApiError> {
    let tenant = tenant(&headers)?;
    let configs = state.catalog.content_configs(Some(&tenant)).await?;
    Ok(ok(configs.toggle_status(&id, request.status).await?))
}

#[instrument(skip(state, headers))]
async fn list_fields_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Envelope<Vec<Document>>>, ApiError> {
    let tenant = tenant(&headers)?;
    let fields = state.catalog.fields(Some(&tenant)).await?;
    let found = fields.list(&query.filter(), &query.options()?).await?;
    Ok(ok(found))
}

#[instrument(skip(state, headers, body))]
async fn create_field_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Document>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = tenant(&headers)?;
    let fields = state.catalog.fields(Some(&tenant)).await?;
    let created = fields.create(body).await?;
    Ok((StatusCode::CREATED, ok(created)))
}

#[instrument(skip(state, headers))]
async fn get_field_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Document>>, ApiError> {
    let tenant = tenant(&headers)?;
    let fields = state.catalog.fields(Some(&tenant)).await?;
    Ok(ok(fields.get(&id).await?))
}

#[instrument(skip(state, headers, body))]
async fn update_field_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Document>,
) -> Result<Json<Envelope<Document>>, ApiError> {
    let tenant = tenant(&headers)?;
    let fields = state.catalog.fields(Some(&tenant)).await?;
    Ok(ok(fields.update(&id, body).await?))
}

#[instrument(skip(state, headers))]
async fn delete_field_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Value>>, ApiError> {
    let tenant = tenant(&headers)?;
    let fields = state.catalog.fields(Some(&tenant)).await?;
    fields.delete(&id).await?;
    Ok(ok(serde_json::json!({ "id": id })))
}

#[instrument(skip(state, headers))]
async fn field_status_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<Envelope<Document>>, ApiError> {
    let tenant = tenant(&headers)?;
    let fields = state.catalog.fields(Some(&tenant)).await?;
    Ok(ok(fields.toggle_status(&id, request.status).await?))
}

/// Start the API server and run until Ctrl-C.
pub async fn serve(config: ApiConfig, state: AppState) -> Result<(), std::io::Error> {
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting TwinStore API server on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
