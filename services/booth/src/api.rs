use crate::config::ApiConfig;
use crate::error::{BoothError, BoothResult};
use crate::image_proxy::ImageProxy;
use crate::models::{Photo, PhotoDownload, PhotoUpload, Session, SessionDetails};
use crate::photo_service::PhotoService;
use crate::realtime::ws_handler;
use crate::session_service::SessionService;
use crate::store::SessionStore;
use anyhow::{Context, Result};
use axum::{
    extract::{multipart::Field, DefaultBodyLimit, Multipart, Path, Query, State},
    http::{HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionService>,
    pub photos: Arc<PhotoService>,
    pub image_proxy: Arc<ImageProxy>,
    /// Probed by the readiness endpoint
    pub store: Arc<dyn SessionStore>,
}

/// Response to an ended session
#[derive(Debug, Serialize)]
pub struct EndSessionResponse {
    pub message: String,
    pub session: Session,
}

/// Response to a successful upload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    pub photo: Photo,
    pub qr_code_url: Option<String>,
}

/// Response to a bulk photo delete
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePhotosResponse {
    pub message: String,
    pub deleted_count: usize,
}

/// Query parameters for the image pass-through
#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub url: Option<String>,
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<HeaderValue> = config
                .cors_origins
                .iter()
                .filter_map(|o| match o.parse() {
                    Ok(origin) => Some(origin),
                    Err(_) => {
                        warn!(origin = %o, "Ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/create", post(create_session))
        .route("/api/sessions/:session_id", get(get_session).delete(end_session))
        .route("/api/photos/upload", post(upload_photo))
        .route("/api/photos/:download_code", get(get_photo))
        .route("/api/photos/session/:session_id", delete(delete_session_photos))
        .route("/proxy-image", get(proxy_image))
        .route("/ws", get(ws_handler));

    // Serve the built frontend; client-side routes fall back to index.html
    if let Some(ref static_dir) = config.static_dir {
        let index = ServeFile::new(format!("{}/index.html", static_dir.trim_end_matches('/')));
        router = router.fallback_service(ServeDir::new(static_dir).fallback(index));
    }

    router
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "booth-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": format!("{e:#}")
            })),
        ),
    }
}

async fn create_session(
    State(state): State<AppState>,
) -> BoothResult<(StatusCode, Json<Session>)> {
    let session = state.sessions.create().await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn list_sessions(State(state): State<AppState>) -> BoothResult<Json<Vec<Session>>> {
    Ok(Json(state.sessions.list_active().await?))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> BoothResult<Json<SessionDetails>> {
    Ok(Json(state.sessions.get(&session_id).await?))
}

async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> BoothResult<Json<EndSessionResponse>> {
    let session = state.sessions.end(&session_id).await?;
    Ok(Json(EndSessionResponse {
        message: "Session ended successfully".to_string(),
        session,
    }))
}

/// Multipart fields: `photo` (file), `sessionId`, `style`, `generatedUrl`
#[instrument(skip(state, multipart))]
async fn upload_photo(
    State(state): State<AppState>,
    multipart: Multipart,
) -> BoothResult<(StatusCode, Json<UploadResponse>)> {
    let upload = read_upload(multipart).await?;
    let photo = state.photos.upload(upload).await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: "Photo uploaded successfully".to_string(),
            qr_code_url: photo.qr_code_url.clone(),
            photo,
        }),
    ))
}

async fn read_upload(mut multipart: Multipart) -> BoothResult<PhotoUpload> {
    let mut upload = PhotoUpload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| BoothError::bad_request(format!("Failed to read form field: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "photo" => {
                upload.content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| BoothError::bad_request(format!("Failed to read photo: {}", e)))?;
                upload.image = Some(bytes.to_vec());
            }
            "sessionId" => upload.session_id = Some(read_text(field).await?),
            "style" => upload.style = Some(read_text(field).await?),
            "generatedUrl" => upload.generated_url = Some(read_text(field).await?),
            _ => {}
        }
    }

    Ok(upload)
}

async fn read_text(field: Field<'_>) -> BoothResult<String> {
    let name = field.name().unwrap_or_default().to_string();
    field
        .text()
        .await
        .map_err(|e| BoothError::bad_request(format!("Invalid {}: {}", name, e)))
}

async fn get_photo(
    State(state): State<AppState>,
    Path(download_code): Path<String>,
) -> BoothResult<Json<PhotoDownload>> {
    Ok(Json(state.photos.get_by_download_code(&download_code).await?))
}

async fn delete_session_photos(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> BoothResult<Json<DeletePhotosResponse>> {
    let deleted_count = state.photos.delete_for_session(&session_id).await?;
    Ok(Json(DeletePhotosResponse {
        message: "Photos deleted successfully".to_string(),
        deleted_count,
    }))
}

async fn proxy_image(
    State(state): State<AppState>,
    Query(params): Query<ProxyQuery>,
) -> BoothResult<String> {
    let url = params.url.unwrap_or_default();
    state.image_proxy.fetch_data_url(&url).await
}

/// Start the booth API server, stopping when `shutdown` resolves
pub async fn start_api_server(
    state: AppState,
    config: &ApiConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting booth API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
