// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! HTTP handler tests against the router, with stub estimators.

mod common;

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use posture_analyzer::server::{AppState, EstimatorFactory, ServerConfig, router};
use posture_analyzer::{PoseEstimator, PostureError, Result};
use serde_json::Value;
use tower::ServiceExt;

use common::{Scripted, squat_pose};

const BOUNDARY: &str = "posture-test-boundary";

fn squat_factory() -> EstimatorFactory {
    Arc::new(|| -> Result<Box<dyn PoseEstimator + Send>> {
        Ok(Box::new(Scripted::poses(vec![Some(squat_pose())])))
    })
}

fn app(factory: EstimatorFactory) -> axum::Router {
    router(Arc::new(AppState::with_factory(ServerConfig::default(), factory)))
}

fn app_with_upload_dir(factory: EstimatorFactory, dir: &Path) -> axum::Router {
    let config = ServerConfig {
        upload_dir: Some(dir.to_path_buf()),
        ..ServerConfig::default()
    };
    router(Arc::new(AppState::with_factory(config, factory)))
}

fn pending_uploads(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("posture-upload-"))
        .count()
}

fn png_bytes() -> Vec<u8> {
    let mut bytes = Vec::new();
    image::DynamicImage::new_rgb8(8, 8)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

fn multipart_body(field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload-video/")
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let response = app(squat_factory())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_info_reports_config() {
    let response = app(squat_factory())
        .oneshot(Request::builder().uri("/info").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["model_path"], "yolo11n-pose.onnx");
    assert_eq!(json["max_upload_bytes"], 512 * 1024 * 1024);
    assert!(json.get("iou_threshold").is_none());
}

#[tokio::test]
async fn test_upload_image_returns_analysis() {
    let response = app(squat_factory())
        .oneshot(upload_request(multipart_body("file", "frame.png", &png_bytes())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["posture_type"], "squat");
    let frames = json["frame_results"].as_array().unwrap();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["frame"], 1);
    assert_eq!(frames[0]["bad_posture"], true);
    assert!(frames[0].get("knee_angle").is_some());
}

#[tokio::test]
async fn test_missing_file_field_is_bad_request() {
    let response = app(squat_factory())
        .oneshot(upload_request(multipart_body("video", "frame.png", &png_bytes())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Missing 'file' field");
}

#[tokio::test]
async fn test_model_failure_is_server_error() {
    let factory: EstimatorFactory = Arc::new(|| -> Result<Box<dyn PoseEstimator + Send>> {
        Err(PostureError::ModelLoadError("Model file not found: gone.onnx".to_string()))
    });
    let response = app(factory)
        .oneshot(upload_request(multipart_body("file", "frame.png", &png_bytes())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = json_body(response).await;
    assert!(json["error"].as_str().unwrap().contains("gone.onnx"));
}

#[tokio::test]
async fn test_undecodable_frame_is_skipped() {
    let response = app(squat_factory())
        .oneshot(upload_request(multipart_body("file", "frame.png", b"not a png")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["posture_type"], "squat");
    assert_eq!(json["frame_results"], serde_json::json!([]));
    assert_eq!(json["total_frames"], 1);
}

#[tokio::test]
async fn test_uploads_removed_on_success_and_failure() {
    let dir = tempfile::tempdir().unwrap();

    let response = app_with_upload_dir(squat_factory(), dir.path())
        .oneshot(upload_request(multipart_body("file", "frame.png", &png_bytes())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(pending_uploads(dir.path()), 0);

    // The factory runs after the upload is persisted, so it sees the file on disk.
    let seen = Arc::new(AtomicUsize::new(0));
    let failing: EstimatorFactory = {
        let seen = Arc::clone(&seen);
        let dir: PathBuf = dir.path().to_path_buf();
        Arc::new(move || -> Result<Box<dyn PoseEstimator + Send>> {
            seen.store(pending_uploads(&dir), Ordering::SeqCst);
            Err(PostureError::ModelLoadError("session init failed".to_string()))
        })
    };
    let response = app_with_upload_dir(failing, dir.path())
        .oneshot(upload_request(multipart_body("file", "clip.mp4", b"not a video")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(pending_uploads(dir.path()), 0);

    // Opening the source fails after the estimator is built.
    let response = app_with_upload_dir(squat_factory(), dir.path())
        .oneshot(upload_request(multipart_body("file", "clip.mp4", b"not a video")))
        .await
        .unwrap();
    assert!(response.status().is_client_error() || response.status().is_server_error());
    assert_eq!(pending_uploads(dir.path()), 0);
}

#[cfg(feature = "video")]
#[tokio::test]
async fn test_undecodable_video_is_bad_request() {
    let response = app(squat_factory())
        .oneshot(upload_request(multipart_body("file", "clip.mp4", b"definitely not a video")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_openapi_document() {
    let response = app(squat_factory())
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert!(json["paths"].get("/upload-video/").is_some());
}
