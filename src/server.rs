// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! HTTP upload service.
//!
//! `POST /upload-video/` takes a multipart `file` field, stores it in a
//! temporary file for the duration of the request, runs a fresh
//! [`PostureAnalyzer`] over it on the blocking pool, and answers with the
//! dominant posture and the per-frame results.

use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use crate::analyzer::{PoseEstimator, PostureAnalyzer, VideoAnalysis};
use crate::error::{PostureError, Result};
use crate::inference::InferenceConfig;
use crate::model::PoseModel;
use crate::posture::{FrameResult, PostureAngles};
use crate::source::{IMAGE_EXTENSIONS, Source, VIDEO_EXTENSIONS};

/// Default upload limit (512 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Builds a fresh estimator for each request.
pub type EstimatorFactory = Arc<dyn Fn() -> Result<Box<dyn PoseEstimator + Send>> + Send + Sync>;

/// Server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Pose model loaded for every request.
    pub model_path: PathBuf,
    /// Inference settings for the pose model.
    pub inference: InferenceConfig,
    /// Largest accepted request body, in bytes.
    pub max_upload_bytes: usize,
    /// Directory for temporary uploads; the system temp directory when `None`.
    pub upload_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            model_path: PathBuf::from(crate::download::DEFAULT_POSE_MODEL),
            inference: InferenceConfig::default(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            upload_dir: None,
        }
    }
}

/// Shared, read-only application state. Holds no model instance.
pub struct AppState {
    config: ServerConfig,
    factory: EstimatorFactory,
}

impl AppState {
    /// State that loads `config.model_path` with ONNX Runtime on every request.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let model_path = config.model_path.clone();
        let inference = config.inference.clone();
        let factory: EstimatorFactory = Arc::new(move || -> Result<Box<dyn PoseEstimator + Send>> {
            Ok(Box::new(PoseModel::load_with_config(&model_path, inference.clone())?))
        });
        Self { config, factory }
    }

    /// State with a custom estimator factory.
    #[must_use]
    pub fn with_factory(config: ServerConfig, factory: EstimatorFactory) -> Self {
        Self { config, factory }
    }

    /// The server settings.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }
}

// One analyzed frame
#[derive(Debug, Serialize, ToSchema)]
pub struct FrameReport {
    /// 1-based frame index in the uploaded video
    #[schema(example = 12)]
    frame: usize,
    /// Posture recognised in this frame: squat or desk_sitting
    #[schema(example = "squat")]
    posture_type: String,
    /// Bad-posture findings
    flags: Vec<String>,
    /// True when at least one flag was raised
    bad_posture: bool,
    /// Hip-knee-ankle angle in degrees (squat frames, null when no knee was visible)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<f32>)]
    knee_angle: Option<Option<f32>>,
    /// Ear-shoulder-hip angle in degrees (desk_sitting frames)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<f32>)]
    neck_angle: Option<Option<f32>>,
    /// Shoulder-hip-knee angle in degrees
    back_angle: Option<f32>,
}

impl From<&FrameResult> for FrameReport {
    fn from(result: &FrameResult) -> Self {
        let (knee_angle, neck_angle) = match result.angles {
            PostureAngles::Squat { knee_angle, .. } => (Some(knee_angle), None),
            PostureAngles::DeskSitting { neck_angle, .. } => (None, Some(neck_angle)),
        };
        Self {
            frame: result.frame,
            posture_type: result.posture_type.to_string(),
            flags: result.flags.iter().map(ToString::to_string).collect(),
            bad_posture: result.bad_posture,
            knee_angle,
            neck_angle,
            back_angle: result.angles.back_angle(),
        }
    }
}

// Whole-video analysis
#[derive(Debug, Serialize, ToSchema)]
pub struct AnalysisResponse {
    /// Dominant posture across detected frames (ties go to squat)
    #[schema(example = "squat")]
    posture_type: String,
    /// Frames in which a person was detected, in order
    frame_results: Vec<FrameReport>,
    /// Frames decoded from the upload
    total_frames: usize,
    /// Frames with a detected person
    detected_frames: usize,
    /// Detected frames with at least one flag
    bad_posture_frames: usize,
}

impl From<&VideoAnalysis> for AnalysisResponse {
    fn from(analysis: &VideoAnalysis) -> Self {
        Self {
            posture_type: analysis.posture_type.to_string(),
            frame_results: analysis.frame_results.iter().map(FrameReport::from).collect(),
            total_frames: analysis.total_frames,
            detected_frames: analysis.detected_frames,
            bad_posture_frames: analysis.bad_posture_frames,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    error: String,
}

#[derive(Serialize, ToSchema)]
struct InfoResponse {
    /// Pose model loaded per request
    model_path: String,
    /// Person confidence threshold
    confidence_threshold: f32,
    /// Input size override (height, width), if any
    imgsz: Option<(usize, usize)>,
    /// Largest accepted upload in bytes
    max_upload_bytes: usize,
}

#[derive(Serialize, ToSchema)]
struct HealthResponse {
    /// Server status
    status: String,
    /// API version
    version: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: error.into() }))
}

fn error_status(err: &PostureError) -> StatusCode {
    if err.is_input_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

// OpenAPI Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Posture Analyzer",
        description = "Upload a squat or desk-sitting video and get the dominant posture with per-frame angles and bad-posture flags.",
        version = "0.1.0",
        license(name = "AGPL-3.0", url = "https://ultralytics.com/license")
    ),
    paths(root, health, info, upload_video),
    components(schemas(FrameReport, AnalysisResponse, ErrorResponse, InfoResponse, HealthResponse)),
    tags(
        (name = "analysis", description = "Posture analysis endpoints"),
        (name = "health", description = "Health check endpoints")
    )
)]
struct ApiDoc;

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/info", get(info))
        .route("/upload-video/", post(upload_video))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
///
/// The model is fetched if missing and loaded once up front so that a broken
/// model fails at startup rather than on the first upload.
///
/// # Errors
///
/// Returns `FeatureNotEnabled` when built without the `video` feature, since
/// uploads could not be decoded. Otherwise returns an error if the model
/// cannot be resolved or loaded, or the address cannot be bound.
pub async fn serve(mut config: ServerConfig) -> Result<()> {
    ensure_video_support()?;

    let model_path = config.model_path.clone();
    let inference = config.inference.clone();
    config.model_path = tokio::task::spawn_blocking(move || {
        let path = crate::download::ensure_model(&model_path)?;
        let model = PoseModel::load_with_config(&path, inference)?;
        tracing::info!(model = ?model, "pose model ready");
        Ok::<_, PostureError>(path)
    })
    .await
    .map_err(|e| PostureError::ModelLoadError(format!("Model loading task failed: {e}")))??;

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| PostureError::IoError(format!("Failed to bind {addr}: {e}")))?;
    let local: SocketAddr = listener.local_addr()?;
    tracing::info!(%local, "server listening, Swagger UI at /swagger-ui/");

    let app = router(Arc::new(AppState::new(config)));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

#[cfg(feature = "video")]
#[allow(clippy::unnecessary_wraps)]
const fn ensure_video_support() -> Result<()> {
    Ok(())
}

#[cfg(not(feature = "video"))]
fn ensure_video_support() -> Result<()> {
    Err(PostureError::FeatureNotEnabled(
        "The upload service decodes videos and requires the 'video' feature; rebuild with --features video"
            .to_string(),
    ))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}

/// Root endpoint
///
/// Returns a short usage banner.
#[utoipa::path(
    get,
    path = "/",
    tag = "health",
    responses(
        (status = 200, description = "Welcome message", body = String)
    )
)]
async fn root() -> &'static str {
    "Posture Analyzer - POST a video to /upload-video/ as multipart field 'file'. Swagger UI at /swagger-ui/"
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Server is healthy", body = HealthResponse)
    )
)]
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: crate::VERSION.to_string(),
    })
}

/// Model and limits in effect
#[utoipa::path(
    get,
    path = "/info",
    tag = "analysis",
    responses(
        (status = 200, description = "Server configuration", body = InfoResponse)
    )
)]
async fn info(State(state): State<Arc<AppState>>) -> Json<InfoResponse> {
    let config = state.config();
    Json(InfoResponse {
        model_path: config.model_path.display().to_string(),
        confidence_threshold: config.inference.confidence_threshold,
        imgsz: config.inference.imgsz,
        max_upload_bytes: config.max_upload_bytes,
    })
}

/// Analyze an uploaded video
///
/// Upload a video (or a single image) as multipart field `file`. Every frame
/// with a detected person is classified; the response holds the dominant
/// posture and the per-frame results.
#[utoipa::path(
    post,
    path = "/upload-video/",
    tag = "analysis",
    request_body(content_type = "multipart/form-data", description = "Video file to analyze"),
    responses(
        (status = 200, description = "Analysis complete", body = AnalysisResponse),
        (status = 400, description = "Missing 'file' field or undecodable video", body = ErrorResponse),
        (status = 500, description = "Model, inference or storage failure", body = ErrorResponse)
    )
)]
async fn upload_video(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> std::result::Result<Json<AnalysisResponse>, ApiError> {
    let (filename, data) = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => {
                let filename = field.file_name().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Failed to read upload: {e}")))?;
                break (filename, data);
            }
            Ok(Some(_)) => {}
            Ok(None) => return Err(api_error(StatusCode::BAD_REQUEST, "Missing 'file' field")),
            Err(e) => {
                return Err(api_error(StatusCode::BAD_REQUEST, format!("Invalid multipart body: {e}")));
            }
        }
    };

    tracing::info!(filename = ?filename, bytes = data.len(), "received upload");

    let analysis = tokio::task::spawn_blocking(move || analyze_upload(&state, filename.as_deref(), &data))
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("Analysis task failed: {e}")))?
        .map_err(|e| {
            let status = error_status(&e);
            tracing::warn!(%status, error = %e, "upload analysis failed");
            api_error(status, e.to_string())
        })?;

    Ok(Json(AnalysisResponse::from(&analysis)))
}

/// Temp file suffix that keeps the upload's extension when it is one we decode.
fn upload_suffix(filename: Option<&str>) -> String {
    filename
        .and_then(|name| Path::new(name).extension())
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .filter(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()) || IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .map_or_else(|| ".mp4".to_string(), |ext| format!(".{ext}"))
}

/// Persist the upload, analyze it with a request-scoped estimator, then remove it.
///
/// The temporary file is deleted when dropped on every error path; on success
/// it is closed explicitly so a failed deletion gets logged.
fn analyze_upload(state: &AppState, filename: Option<&str>, data: &[u8]) -> Result<VideoAnalysis> {
    let suffix = upload_suffix(filename);
    let mut builder = tempfile::Builder::new();
    builder.prefix("posture-upload-").suffix(&suffix);
    let mut temp = match &state.config.upload_dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    temp.write_all(data)?;
    temp.flush()?;

    let estimator = (state.factory)()?;
    let analysis = PostureAnalyzer::new(estimator).analyze_source(Source::from(temp.path()))?;

    let temp_path = temp.path().to_path_buf();
    if let Err(e) = temp.close() {
        tracing::error!(path = %temp_path.display(), error = %e, "failed to delete temporary upload");
    }
    Ok(analysis)
}
