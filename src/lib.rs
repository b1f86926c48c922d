// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

#![allow(clippy::multiple_crate_versions)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # Posture Analyzer
//!
//! Squat and desk-sitting posture analysis for videos, built on Ultralytics
//! YOLO pose models running in ONNX Runtime.
//!
//! Every frame with a detected person is reduced to three joint angles (knee,
//! back, neck), classified as `squat` or `desk_sitting`, and checked against
//! fixed posture thresholds. The video as a whole gets the posture with the
//! most frame votes, ties going to `squat`.
//!
//! ## Features
//!
//! - **Frame classification** - knee, back and neck angles with bad-posture flags
//! - **Video aggregation** - dominant posture plus the ordered per-frame results
//! - **Pluggable pose estimation** - any [`PoseEstimator`]; [`PoseModel`] runs YOLO pose ONNX exports
//! - **HTTP service** - `POST /upload-video/` with OpenAPI docs
//! - **Annotated output** - skeleton, angles and flags drawn onto the video
//!
//! ## Quick Start (Library)
//!
//! ```no_run
//! use posture_analyzer::{PoseModel, PostureAnalyzer, Source};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let model = PoseModel::load("yolo11n-pose.onnx")?;
//!     let mut analyzer = PostureAnalyzer::new(model);
//!
//!     let analysis = analyzer.analyze_source(Source::from("squat.mp4"))?;
//!     println!("dominant posture: {}", analysis.posture_type);
//!     for frame in analysis.frame_results.iter().filter(|f| f.bad_posture) {
//!         println!("frame {}: {:?}", frame.frame, frame.flags);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Single frames can be classified without a model:
//!
//! ```
//! use posture_analyzer::{FrameClassifier, Keypoint, Landmark, PoseLandmarks, PostureType};
//!
//! let pose = PoseLandmarks::default()
//!     .with(Keypoint::LeftShoulder, Landmark::new(0.50, 0.20, 0.9))
//!     .with(Keypoint::LeftHip, Landmark::new(0.50, 0.50, 0.9))
//!     .with(Keypoint::LeftKnee, Landmark::new(0.80, 0.50, 0.9))
//!     .with(Keypoint::LeftAnkle, Landmark::new(0.80, 0.80, 0.9));
//!
//! let result = FrameClassifier::default().classify(1, &pose);
//! assert_eq!(result.posture_type, PostureType::Squat);
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! # Analyze a video (auto-downloads yolo11n-pose.onnx)
//! posture-analyzer analyze --source squat.mp4
//!
//! # Save the annotated video and the JSON result
//! posture-analyzer analyze --source squat.mp4 --save --json result.json
//!
//! # Run the upload service
//! posture-analyzer serve --port 8000
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`geometry`] | [`joint_angle`] between three points |
//! | [`landmarks`] | COCO body keypoints ([`PoseLandmarks`], [`Keypoint`]) |
//! | [`thresholds`] | [`PostureThresholds`] used by the classifier |
//! | [`posture`] | [`FrameClassifier`] and [`FrameResult`] |
//! | [`analyzer`] | [`PostureAnalyzer`] and [`VideoAnalysis`] |
//! | [`model`] | [`PoseModel`] for YOLO pose ONNX models |
//! | [`source`] | Input frames ([`Source`], [`SourceIterator`]) |
//! | [`io`] | Annotated video and frame output |
//! | [`server`] | axum upload service |
//! | [`error`] | Error types ([`PostureError`], [`Result`]) |
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `annotate` | Skeleton and posture overlays (default) |
//! | `video` | Video decoding and encoding via FFmpeg |
//! | `cuda` | NVIDIA CUDA acceleration |
//! | `tensorrt` | NVIDIA `TensorRT` optimization |
//! | `coreml` | Apple `CoreML` (macOS/iOS) |
//! | `openvino` | Intel `OpenVINO` |

// Modules
pub mod analyzer;
#[cfg(feature = "annotate")]
pub mod annotate;
pub mod cli;
pub mod download;
pub mod error;
pub mod geometry;
pub mod inference;
pub mod io;
pub mod landmarks;
pub mod metadata;
pub mod model;
pub mod postprocessing;
pub mod posture;
pub mod preprocessing;
pub mod server;
pub mod source;
pub mod thresholds;

// Re-export main types for convenience
pub use analyzer::{FrameEvent, FrameObserver, PoseEstimator, PostureAnalyzer, PostureTally, VideoAnalysis};
pub use error::{PostureError, Result};
pub use geometry::{Point, joint_angle};
pub use inference::InferenceConfig;
pub use landmarks::{Keypoint, Landmark, PoseLandmarks};
pub use model::PoseModel;
pub use posture::{FrameClassifier, FrameResult, KneeSide, PostureAngles, PostureFlag, PostureType};
pub use source::{Source, SourceIterator, SourceMeta};
pub use thresholds::PostureThresholds;

// Re-export metadata for advanced use
pub use metadata::ModelMetadata;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
