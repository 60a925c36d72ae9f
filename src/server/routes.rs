use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use crate::camera::types::{RecordingDescriptor, TimeRange};
use crate::camera::CameraConfig;
use crate::error::CameraError;
use crate::ptz::{PtzCommand, StreamQuality};
use crate::service::CameraService;

#[derive(Clone)]
pub struct AppState {
    pub service: CameraService,
    pub download_dir: PathBuf,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/cameras", get(list_cameras).post(add_camera))
        .route("/cameras/:camera_id", delete(remove_camera))
        .route("/cameras/:camera_id/discover", post(detect_protocols))
        .route("/cameras/:camera_id/redetect", post(redetect))
        .route("/cameras/:camera_id/capabilities", post(negotiate_capabilities))
        .route("/cameras/:camera_id/recordings", get(search_recordings))
        .route("/cameras/:camera_id/playback-url", post(get_playback_url))
        .route("/cameras/:camera_id/download", post(download_recording))
        .route("/cameras/:camera_id/ptz", post(send_ptz_command))
        .route("/cameras/:camera_id/stream", post(select_stream))
        .route("/discover/:host", post(discover_device))
        .route("/scan/ws-discovery", post(ws_discover))
        .route("/scan/subnet", post(sweep_subnet))
        .route("/settings/tls", put(set_tls))
        .route("/health", get(health_check))
        .with_state(state)
}

/// `CameraError` as a JSON response.
pub struct ApiError(CameraError);

impl From<CameraError> for ApiError {
    fn from(e: CameraError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CameraError::AuthenticationFailure { .. } => StatusCode::UNAUTHORIZED,
            CameraError::MalformedInput(_) | CameraError::InvalidCommand(_) => StatusCode::BAD_REQUEST,
            CameraError::ExhaustedStrategies { .. } => StatusCode::BAD_GATEWAY,
            CameraError::CapabilityMissing(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CameraError::UnknownCamera(_) => StatusCode::NOT_FOUND,
        };
        let body = json!({ "error": self.0.code(), "message": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Camera record without its password.
#[derive(Debug, Serialize)]
pub struct CameraSummary {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub manufacturer: Option<String>,
    pub has_credentials: bool,
    pub stream_url: Option<String>,
    pub ptz_override: bool,
}

impl From<&CameraConfig> for CameraSummary {
    fn from(c: &CameraConfig) -> Self {
        Self {
            id: c.id.clone(),
            name: c.display_name().to_string(),
            host: c.host.clone(),
            port: c.port,
            manufacturer: c.manufacturer.clone(),
            has_credentials: c.credentials().is_some(),
            stream_url: c.stream_url.clone(),
            ptz_override: c.ptz_override.is_some(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ForceQuery {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct RecordingQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub recording_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub recording: RecordingDescriptor,
    /// File name under the download directory; defaults to the recording's own.
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct StreamRequest {
    #[serde(default)]
    pub quality: StreamQuality,
}

#[derive(Debug, Deserialize)]
pub struct DiscoverQuery {
    pub manufacturer: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SweepQuery {
    pub prefix: Option<Ipv4Addr>,
}

#[derive(Debug, Deserialize)]
pub struct TlsSetting {
    pub accept_self_signed: bool,
}

async fn list_cameras(State(state): State<AppState>) -> Json<Vec<CameraSummary>> {
    let cameras = state.service.cameras().list().await;
    Json(cameras.iter().map(CameraSummary::from).collect())
}

async fn add_camera(
    State(state): State<AppState>,
    Json(config): Json<CameraConfig>,
) -> Result<(StatusCode, Json<CameraSummary>), ApiError> {
    let summary = CameraSummary::from(&config);
    state.service.add_camera(config).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

async fn remove_camera(State(state): State<AppState>, Path(camera_id): Path<String>) -> Response {
    if state.service.remove_camera(&camera_id).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        ApiError(CameraError::UnknownCamera(camera_id)).into_response()
    }
}

async fn detect_protocols(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
    Query(q): Query<ForceQuery>,
) -> ApiResult<crate::camera::types::ProtocolDetectionResult> {
    tracing::info!("Protocol detection for camera: {} (force={})", camera_id, q.force);
    Ok(Json(state.service.detect_protocols(&camera_id, q.force).await?))
}

async fn redetect(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
) -> ApiResult<crate::camera::types::ProtocolDetectionResult> {
    Ok(Json(state.service.redetect(&camera_id).await?))
}

async fn negotiate_capabilities(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
    Query(q): Query<ForceQuery>,
) -> ApiResult<crate::camera::types::CameraCapabilities> {
    Ok(Json(state.service.negotiate_capabilities(&camera_id, q.force).await?))
}

async fn search_recordings(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
    Query(q): Query<RecordingQuery>,
) -> ApiResult<Vec<RecordingDescriptor>> {
    let range = TimeRange::new(q.start, q.end);
    let recordings = state
        .service
        .search_recordings(&camera_id, range, q.recording_type.as_deref())
        .await?;
    Ok(Json(recordings))
}

async fn get_playback_url(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
    Json(recording): Json<RecordingDescriptor>,
) -> ApiResult<crate::resolver::PlaybackUrl> {
    Ok(Json(state.service.get_playback_url(&camera_id, &recording).await?))
}

/// Only the final component of a requested name is used.
fn destination_name(request: &DownloadRequest) -> Result<String, CameraError> {
    let raw = request
        .filename
        .as_deref()
        .unwrap_or(request.recording.filename.as_str());
    std::path::Path::new(raw.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && *n != "..")
        .map(str::to_string)
        .ok_or_else(|| CameraError::malformed(format!("invalid download file name {:?}", raw)))
}

async fn download_recording(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
    Json(request): Json<DownloadRequest>,
) -> ApiResult<crate::resolver::DownloadReport> {
    let name = destination_name(&request)?;
    let destination = state.download_dir.join(&camera_id).join(name);
    let report = state
        .service
        .download_recording(&camera_id, &request.recording, &destination)
        .await?;
    Ok(Json(report))
}

async fn send_ptz_command(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
    Json(command): Json<PtzCommand>,
) -> ApiResult<serde_json::Value> {
    let accepted = state.service.send_ptz_command(&camera_id, &command).await?;
    Ok(Json(json!({ "accepted": accepted })))
}

async fn select_stream(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
    request: Option<Json<StreamRequest>>,
) -> ApiResult<crate::ptz::StreamSelection> {
    let quality = request.map(|Json(r)| r.quality).unwrap_or_default();
    Ok(Json(state.service.select_stream(&camera_id, quality).await?))
}

async fn discover_device(
    State(state): State<AppState>,
    Path(host): Path<String>,
    Query(q): Query<DiscoverQuery>,
) -> ApiResult<crate::camera::types::ProtocolDetectionResult> {
    tracing::info!("Discovery request for host: {}", host);
    Ok(Json(
        state
            .service
            .discover_device(&host, q.manufacturer.as_deref())
            .await?,
    ))
}

async fn ws_discover(State(state): State<AppState>) -> ApiResult<Vec<crate::discovery::DiscoveredDevice>> {
    Ok(Json(state.service.ws_discover().await?))
}

async fn sweep_subnet(
    State(state): State<AppState>,
    Query(q): Query<SweepQuery>,
) -> ApiResult<Vec<crate::camera::types::ProtocolDetectionResult>> {
    Ok(Json(state.service.sweep_subnet(q.prefix).await?))
}

async fn set_tls(State(state): State<AppState>, Json(setting): Json<TlsSetting>) -> Json<serde_json::Value> {
    state.service.set_accept_self_signed(setting.accept_self_signed).await;
    Json(json!({ "accept_self_signed": state.service.accepts_self_signed() }))
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
