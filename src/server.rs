//! HTTP API over [`crate::download`] (feature `server`).
//!
//! | Method | Path                    | Description |
//! |--------|-------------------------|-------------|
//! | POST   | `/download`             | Run a download, reply with a link to the file |
//! | GET    | `/downloads/{filename}` | Stream a stored PDF as an attachment |
//!
//! `POST /api/download` is accepted as an alias of `/download`.
//!
//! Every request gets its own browser session. Downloads run on a spawned
//! task so a client that hangs up does not cancel a half-finished capture
//! and leak its browser.

use crate::config::DownloadConfig;
use crate::download::download;
use crate::error::ScribdError;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};

/// Shared state: the base configuration every request starts from.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<DownloadConfig>,
}

impl AppState {
    pub fn new(config: DownloadConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

/// Body of `POST /download`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadRequest {
    pub url_or_id: Option<String>,
    pub compress: Option<bool>,
    pub clean: Option<bool>,
}

/// Body of every `POST /download` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DownloadReply {
    Ok {
        message: String,
        download_link: String,
    },
    Err {
        error: String,
    },
}

impl DownloadReply {
    fn error(message: impl Into<String>) -> Self {
        Self::Err {
            error: message.into(),
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/download", post(download_document))
        .route("/api/download", post(download_document))
        .route("/downloads/{filename}", get(serve_download))
        .with_state(state)
}

/// HTTP status for a fatal download error.
pub fn status_for(err: &ScribdError) -> StatusCode {
    match err {
        ScribdError::InvalidInput { .. } | ScribdError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
        ScribdError::ViewerLoadTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `POST /download`
pub async fn download_document(
    State(state): State<AppState>,
    body: Result<Json<DownloadRequest>, JsonRejection>,
) -> (StatusCode, Json<DownloadReply>) {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!("Rejected download request body: {}", rejection);
            return missing_input();
        }
    };
    let Some(url_or_id) = request.url_or_id.filter(|s| !s.trim().is_empty()) else {
        return missing_input();
    };

    let mut config = (*state.config).clone();
    config.compress = request.compress.unwrap_or(false);
    config.clean = request.clean.unwrap_or(true);
    info!(
        compress = config.compress,
        clean = config.clean,
        "Download requested: {}",
        url_or_id
    );

    let task = tokio::spawn(async move { download(&url_or_id, &config).await });
    match task.await {
        Ok(Ok(output)) => {
            let Some(name) = output.file_name() else {
                error!("Output path has no file name: {}", output.path.display());
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(DownloadReply::error("Download failed. Please check the logs.")),
                );
            };
            (
                StatusCode::OK,
                Json(DownloadReply::Ok {
                    message: "Download successful!".into(),
                    download_link: download_link(name),
                }),
            )
        }
        Ok(Err(e)) => {
            error!("Download failed: {}", e);
            (status_for(&e), Json(DownloadReply::error(e.to_string())))
        }
        Err(e) => {
            error!("Download task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(DownloadReply::error("Download failed. Please check the logs.")),
            )
        }
    }
}

fn missing_input() -> (StatusCode, Json<DownloadReply>) {
    (
        StatusCode::BAD_REQUEST,
        Json(DownloadReply::error("Missing 'url_or_id' in request.")),
    )
}

/// Link under which a stored file is served. The name is one path segment,
/// so `#`, `%` and spaces are percent-encoded.
pub fn download_link(file_name: &str) -> String {
    format!("/downloads/{}", urlencoding::encode(file_name))
}

/// True for a bare file name that cannot leave the output directory.
///
/// Dots inside a name (`Wait... what.pdf`) are fine; only `.` and `..` as
/// whole components are refused.
pub fn is_safe_filename(name: &str) -> bool {
    if name.contains(['/', '\\', '\0']) {
        return false;
    }
    let mut components = std::path::Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    )
}

/// `GET /downloads/{filename}`
pub async fn serve_download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Response {
    if !is_safe_filename(&filename) {
        warn!("Rejected file request: {:?}", filename);
        return (StatusCode::BAD_REQUEST, "Invalid file name").into_response();
    }

    let path = state.config.output_dir.join(&filename);
    let file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return (StatusCode::NOT_FOUND, "File not found").into_response();
        }
        Err(e) => {
            error!("Failed to open {}: {}", path.display(), e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file").into_response();
        }
    };

    let disposition = format!("attachment; filename=\"{}\"", filename.replace('"', ""));
    let Ok(disposition) = HeaderValue::from_bytes(disposition.as_bytes()) else {
        return (StatusCode::BAD_REQUEST, "Invalid file name").into_response();
    };

    info!("Serving {}", path.display());
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response()
}
