//! HTTP API for catalog imports and searches.
//!
//! A thin axum layer over the import pipeline ([`crate::ingest`]), the
//! cache-fronted search gateway ([`crate::search`]) and the statistics
//! queries ([`CatalogStore::stats`]). Handlers adapt HTTP to those calls;
//! all catalog semantics live in the modules behind them.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/v1/catmat/import` | Import a CATMAT workbook (multipart field `file`) |
//! | `POST` | `/api/v1/catser/import` | Import a CATSER workbook (multipart field `file`) |
//! | `GET`  | `/api/v1/catmat/search` | Search CATMAT items (`q`, filters, paging) |
//! | `GET`  | `/api/v1/catser/search` | Search CATSER items (`q`, filters, paging) |
//! | `GET`  | `/api/v1/catalog/stats` | Row counts and per-group/per-status breakdowns |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "header_not_found", "message": "cabeçalho CATMAT não encontrado" } }
//! ```
//!
//! Import failures additionally carry a `"result"` member with the partial
//! [`ImportResult`] accumulated before the failure, when rows were processed:
//!
//! ```json
//! {
//!   "error": { "code": "stream_interrupted", "message": "XML da planilha inválido: ..." },
//!   "result": { "rows_read": 120, "rows_saved": 118, "rows_skipped": 2 }
//! }
//! ```
//!
//! Error codes: `bad_request` (400), `invalid_workbook` (400),
//! `header_not_found` (422), `timeout` (408), `stream_interrupted` (500),
//! `search_failed` (500). Per-row problems never produce an error response;
//! they are entries in the 200 response's `errors` list.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted; the API is consumed by
//! browser front ends served from other origins.
//!
//! # Examples
//!
//! ```bash
//! curl -F file=@catmat.xlsx http://127.0.0.1:8080/api/v1/catmat/import
//! curl 'http://127.0.0.1:8080/api/v1/catmat/search?q=caneta&group_code=75&limit=20'
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::cache::TieredCache;
use crate::config::Config;
use crate::db;
use crate::ingest::{self, ImportError};
use crate::models::{
    CatalogStats, CatmatItem, CatmatSearchParams, CatserItem, CatserSearchParams, ImportResult,
    SearchResult,
};
use crate::search::{SearchError, SearchGateway};
use crate::store::CatalogStore;

/// Uploads above this size are rejected before any handler runs. Published
/// CATMAT sheets are an order of magnitude under this.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Whole-request deadline. Large imports dominate it; searches finish far
/// under it.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    /// Persistent catalog store (pooled SQLite handle, cheap to clone).
    store: CatalogStore,
    /// Cache-fronted search entry point.
    gateway: Arc<SearchGateway>,
}

/// Starts the catalog HTTP server.
///
/// Binds to the address configured in `[server].bind` and registers all
/// route handlers. Runs until the process receives Ctrl+C, then drains
/// in-flight requests before returning.
///
/// The database must already be initialized; run `catsearch init` once
/// before the first start.
///
/// # Arguments
///
/// - `config` — application configuration (database path, cache settings, bind address).
///
/// # Returns
///
/// Returns `Ok(())` when the server shuts down, or an error if binding fails.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    let pool = db::connect(config).await?;
    let store = CatalogStore::new(pool);
    let cache = match &config.cache {
        Some(cache_config) => TieredCache::connect(cache_config).await?,
        None => TieredCache::disabled(),
    };
    let state = AppState {
        gateway: Arc::new(SearchGateway::new(store.clone(), cache)),
        store,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/v1/catmat/import", post(handle_import_catmat))
        .route("/api/v1/catser/import", post(handle_import_catser))
        .route("/api/v1/catmat/search", get(handle_search_catmat))
        .route("/api/v1/catser/search", get(handle_search_catser))
        .route("/api/v1/catalog/stats", get(handle_stats))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(middleware::from_fn(|request: Request, next: Next| {
            enforce_deadline(REQUEST_TIMEOUT, request, next)
        }))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    println!("Catalog API listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Whole-request deadline middleware. A request past the deadline is
/// dropped where it stands and answered with the timeout envelope; per-row
/// upserts already committed by a cancelled import stay applied.
async fn enforce_deadline(deadline: Duration, request: Request, next: Next) -> Response {
    match tokio::time::timeout(deadline, next.run(request)).await {
        Ok(response) => response,
        Err(_) => AppError {
            status: StatusCode::REQUEST_TIMEOUT,
            code: "timeout",
            message: format!("request exceeded {}s", deadline.as_secs()),
            result: None,
        }
        .into_response(),
    }
}

/// Resolves when the process receives Ctrl+C. Handed to axum as the
/// graceful-shutdown trigger so in-flight imports finish their rows.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    tracing::info!("shutdown signal received, draining in-flight requests");
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
    /// Partial import accumulation, present only on import failures that
    /// processed rows before dying.
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<ImportResult>,
}

/// Inner error detail with a machine-readable code and human-readable message.
#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"invalid_workbook"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    result: Option<ImportResult>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
            result: self.result,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Constructs a 400 Bad Request error.
fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
        result: None,
    }
}

/// Maps an [`ImportError`] onto the wire contract: unreadable workbook is a
/// 400, a sheet whose header signature never matched is a 422, a row stream
/// that died mid-sheet is a 500. The partial accumulation travels with the
/// error when one exists.
fn import_failure(err: ImportError) -> AppError {
    let message = err.to_string();
    let (status, code, result) = match err {
        ImportError::InvalidWorkbook(_) => (StatusCode::BAD_REQUEST, "invalid_workbook", None),
        ImportError::HeaderNotFound { partial, .. } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "header_not_found",
            Some(partial),
        ),
        ImportError::Stream { partial, .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "stream_interrupted",
            Some(partial),
        ),
    };
    AppError {
        status,
        code,
        message,
        result,
    }
}

/// Maps a [`SearchError`] onto the wire contract. Count-query failures never
/// reach here; the gateway already degrades those to the page length.
fn search_failure(err: SearchError) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "search_failed",
        message: err.to_string(),
        result: None,
    }
}

// ============ POST /api/v1/{catalog}/import ============

/// Handler for `POST /api/v1/catmat/import`.
async fn handle_import_catmat(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ImportResult>, AppError> {
    let bytes = read_upload(multipart).await?;
    let result = ingest::import_catmat(&state.store, bytes)
        .await
        .map_err(import_failure)?;
    Ok(Json(result))
}

/// Handler for `POST /api/v1/catser/import`.
async fn handle_import_catser(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ImportResult>, AppError> {
    let bytes = read_upload(multipart).await?;
    let result = ingest::import_catser(&state.store, bytes)
        .await
        .map_err(import_failure)?;
    Ok(Json(result))
}

/// Pulls the uploaded workbook out of the multipart body. The upload must
/// arrive in a field named `file`; other fields are ignored.
async fn read_upload(mut multipart: Multipart) -> Result<Vec<u8>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| bad_request(format!("unreadable multipart body: {err}")))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|err| bad_request(format!("failed to read upload: {err}")))?;
            return Ok(bytes.to_vec());
        }
    }
    Err(bad_request("multipart field 'file' is required"))
}

// ============ GET /api/v1/{catalog}/search ============

/// Handler for `GET /api/v1/catmat/search`.
///
/// Malformed numeric filters are rejected by the `Query` extractor before
/// this runs; absent ones simply do not constrain the result. `limit` and
/// `offset` are normalized by the gateway, so out-of-range values clamp
/// instead of failing.
async fn handle_search_catmat(
    State(state): State<AppState>,
    Query(params): Query<CatmatSearchParams>,
) -> Result<Json<SearchResult<CatmatItem>>, AppError> {
    let result = state
        .gateway
        .search_catmat(&params)
        .await
        .map_err(search_failure)?;
    Ok(Json(result))
}

/// Handler for `GET /api/v1/catser/search`.
async fn handle_search_catser(
    State(state): State<AppState>,
    Query(params): Query<CatserSearchParams>,
) -> Result<Json<SearchResult<CatserItem>>, AppError> {
    let result = state
        .gateway
        .search_catser(&params)
        .await
        .map_err(search_failure)?;
    Ok(Json(result))
}

// ============ GET /api/v1/catalog/stats ============

/// Handler for `GET /api/v1/catalog/stats`.
///
/// Never fails: individual broken stat queries degrade to zero/empty inside
/// [`CatalogStore::stats`] with a logged error.
async fn handle_stats(State(state): State<AppState>) -> Json<CatalogStats> {
    Json(state.store.stats().await)
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

/// Handler for `GET /health`.
///
/// Returns a simple health check response with the server status and version.
/// This endpoint is used by load balancers and monitoring tools.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
