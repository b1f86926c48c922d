// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::download::DEFAULT_POSE_MODEL;
use crate::inference::DEFAULT_CONFIDENCE;

/// CLI arguments parser.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = r#"Examples:
    posture-analyzer analyze --source squat.mp4
    posture-analyzer analyze -s frames/ --save --json result.json
    posture-analyzer analyze -m yolo11n-pose.onnx -s desk.mp4 --conf 0.5 --imgsz 640
    posture-analyzer serve --port 8000
    MODEL_PATH=models/yolo11n-pose.onnx posture-analyzer serve"#)]
pub struct Cli {
    #[command(subcommand)]
    /// Subcommand to execute.
    pub command: Commands,
}

/// Commands for the CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze the posture in a video, image, or directory of frames
    Analyze(AnalyzeArgs),
    /// Run the HTTP upload service
    Serve(ServeArgs),
}

/// Arguments for the analyze command.
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Video file, image, or directory of extracted frames
    #[arg(short, long)]
    pub source: PathBuf,

    /// Path to the YOLO pose ONNX model (downloaded if it is the default and missing)
    #[arg(short, long, env = "MODEL_PATH", default_value = DEFAULT_POSE_MODEL)]
    pub model: PathBuf,

    /// Person confidence threshold
    #[arg(long, default_value_t = DEFAULT_CONFIDENCE)]
    pub conf: f32,

    /// Inference image size
    #[arg(long)]
    pub imgsz: Option<usize>,

    /// Save the annotated video (or frames) to runs/posture/analyze
    #[arg(long, default_value_t = false)]
    pub save: bool,

    /// Write the analysis result as JSON to this file
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Show per-frame output
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub verbose: bool,
}

/// Arguments for the serve command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Interface to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind
    #[arg(short, long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Path to the YOLO pose ONNX model (downloaded if it is the default and missing)
    #[arg(short, long, env = "MODEL_PATH", default_value = DEFAULT_POSE_MODEL)]
    pub model: PathBuf,

    /// Person confidence threshold
    #[arg(long, default_value_t = DEFAULT_CONFIDENCE)]
    pub conf: f32,

    /// Largest accepted upload in MiB
    #[arg(long, default_value_t = 512)]
    pub max_upload_mb: usize,

    /// Directory for temporary uploads (defaults to the system temp directory)
    #[arg(long, env = "UPLOAD_DIR")]
    pub upload_dir: Option<PathBuf>,
}
