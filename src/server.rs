//! HTTP server for document storage management and conversion.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/document/create-folder` | Create a folder under the documents root |
//! | `POST` | `/document/move-files` | Move stored files that no workspace has embedded |
//! | `POST` | `/document/download` | Stream a stored file as an attachment |
//! | `GET`  | `/document/view?docpath=` | Stream a stored file inline, typed by extension |
//! | `POST` | `/process` | Convert a file from the hotdir into per-page documents |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Storage endpoints answer failures with
//!
//! ```json
//! { "success": false, "message": "File not found" }
//! ```
//!
//! while `/process` always answers with a conversion result
//! (`{ "success", "reason", "documents" }`).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::convert::Converter;
use crate::file_server::{FileServeError, FileServer};
use crate::folders::{FolderError, FolderManager};
use crate::models::{ConversionResult, FileMoveRequest, FolderCreateRequest};
use crate::moves::MoveService;
use crate::path_guard::PathGuard;
use crate::repository::SqliteDocumentRepository;
use crate::{db, migrate};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub folders: FolderManager,
    pub moves: MoveService,
    pub files: FileServer,
    pub converter: Arc<Converter>,
    /// Guards `/process` filenames; uploads are read from the hotdir.
    pub hotdir: PathGuard,
}

impl AppState {
    /// Wires every service against the configured roots and database.
    ///
    /// Creates the documents root and hotdir when missing and brings the
    /// schema up to date.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&config.storage.documents_root).await?;
        tokio::fs::create_dir_all(&config.storage.hotdir).await?;

        let pool = db::connect(config).await?;
        migrate::migrate_pool(&pool).await?;

        let storage = PathGuard::new(&config.storage.documents_root);
        let repository = Arc::new(SqliteDocumentRepository::new(pool));

        Ok(Self {
            config: Arc::new(config.clone()),
            folders: FolderManager::new(storage.clone()),
            moves: MoveService::new(repository, storage.clone()),
            files: FileServer::new(storage),
            converter: Arc::new(Converter::from_config(config)),
            hotdir: PathGuard::new(&config.storage.hotdir),
        })
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/document/create-folder", post(handle_create_folder))
        .route("/document/move-files", post(handle_move_files))
        .route("/document/download", post(handle_download))
        .route("/document/download/", post(handle_download))
        .route("/document/view", get(handle_view))
        .route("/process", post(handle_process))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState::from_config(config).await?;
    let app = router(state);

    tracing::info!(
        "serving {} on http://{}",
        config.storage.documents_root.display(),
        bind_addr
    );

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct StatusBody {
    success: bool,
    message: Option<String>,
}

/// Internal error type that converts into a `{success:false,message}` response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = StatusBody {
            success: false,
            message: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

fn ok(message: Option<String>) -> Json<StatusBody> {
    Json(StatusBody {
        success: true,
        message,
    })
}

// ============ POST /document/create-folder ============

async fn handle_create_folder(
    State(state): State<AppState>,
    body: Result<Json<FolderCreateRequest>, JsonRejection>,
) -> Result<Json<StatusBody>, AppError> {
    let Json(req) = body.map_err(|rejection| {
        tracing::warn!("create folder: {}", rejection.body_text());
        AppError::internal(format!("Failed to create folder: {}", rejection.body_text()))
    })?;

    match state.folders.create_folder(&req.name).await {
        Ok(_) => Ok(ok(None)),
        Err(FolderError::AlreadyExists) => {
            Err(AppError::internal(FolderError::AlreadyExists.to_string()))
        }
        Err(e) => {
            tracing::error!("create folder {:?}: {}", req.name, e);
            Err(AppError::internal(format!("Failed to create folder: {}", e)))
        }
    }
}

// ============ POST /document/move-files ============

async fn handle_move_files(
    State(state): State<AppState>,
    body: Result<Json<FileMoveRequest>, JsonRejection>,
) -> Result<Json<StatusBody>, AppError> {
    let Json(req) = body.map_err(|rejection| {
        tracing::warn!("move files: {}", rejection.body_text());
        AppError::internal("Failed to move files.")
    })?;

    let report = state.moves.move_files(req.files).await.map_err(|e| {
        tracing::error!("move files: {:#}", e);
        AppError::internal("Failed to move files.")
    })?;

    if report.failed() > 0 {
        return Err(AppError::internal("Failed to move some files."));
    }
    Ok(ok(report.message()))
}

// ============ POST /document/download ============

#[derive(Deserialize)]
struct DownloadRequest {
    docpath: Option<String>,
}

async fn handle_download(
    State(state): State<AppState>,
    body: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let docpath = body
        .ok()
        .and_then(|Json(req)| req.docpath)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::internal("Invalid file path."))?;

    match state.files.download(&docpath).await {
        Ok(file) => Ok(file.into_response()),
        Err(FileServeError::Invalid(_)) => Err(AppError::internal("Invalid file path.")),
        Err(FileServeError::NotFound(_)) => {
            Err(AppError::new(StatusCode::NOT_FOUND, "File not found"))
        }
        Err(e) => {
            tracing::error!("download: {}", e);
            Err(AppError::internal("Error reading file"))
        }
    }
}

// ============ GET /document/view ============

#[derive(Deserialize)]
struct ViewQuery {
    docpath: Option<String>,
}

async fn handle_view(
    State(state): State<AppState>,
    Query(query): Query<ViewQuery>,
) -> Result<Response, AppError> {
    let docpath = query
        .docpath
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::new(StatusCode::BAD_REQUEST, "Document path is required"))?;

    match state.files.view(&docpath).await {
        Ok(file) => Ok(file.into_response()),
        Err(FileServeError::Invalid(_)) => {
            Err(AppError::new(StatusCode::FORBIDDEN, "Invalid file path"))
        }
        Err(FileServeError::NotFound(_)) => {
            Err(AppError::new(StatusCode::NOT_FOUND, "File not found"))
        }
        Err(e) => {
            tracing::error!("view: {}", e);
            Err(AppError::internal("Error reading file"))
        }
    }
}

// ============ POST /process ============

#[derive(Deserialize)]
struct ProcessRequest {
    filename: String,
}

/// Converts `<hotdir>/<filename>`. Invalid or missing files answer 400 with
/// a failed conversion result.
async fn handle_process(
    State(state): State<AppState>,
    body: Result<Json<ProcessRequest>, JsonRejection>,
) -> (StatusCode, Json<ConversionResult>) {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ConversionResult::failed(rejection.body_text())),
            )
        }
    };

    let path = match state.hotdir.resolve(&req.filename) {
        Ok(path) => path,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ConversionResult::failed(format!("Invalid filename: {}", e))),
            )
        }
    };

    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ConversionResult::failed(format!(
                "File does not exist in upload directory: {}",
                req.filename
            ))),
        );
    }

    let display_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| req.filename.clone());
    let result = state.converter.convert(&path, &display_name).await;
    (StatusCode::OK, Json(result))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
