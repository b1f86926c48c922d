// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Error types for posture analysis.

use std::fmt;

/// Result type alias for posture analysis operations.
pub type Result<T> = std::result::Result<T, PostureError>;

/// Main error type for the posture analyzer.
#[derive(Debug)]
pub enum PostureError {
    /// Error loading the ONNX pose model.
    ModelLoadError(String),
    /// Error during pose model inference.
    InferenceError(String),
    /// Error processing images.
    ImageError(String),
    /// Invalid configuration provided.
    ConfigError(String),
    /// IO error (file not found, permission denied, temp file cleanup, etc.).
    IoError(String),
    /// Wrapped `std::io::Error`.
    Io(std::io::Error),
    /// Error parsing model metadata.
    MetadataError(String),
    /// Video decoding or encoding error.
    VideoError(String),
    /// The uploaded or requested input is not something we can analyze.
    InputError(String),
    /// Feature not enabled.
    FeatureNotEnabled(String),
}

impl PostureError {
    /// Whether this error was caused by the caller's input rather than by the service.
    #[must_use]
    pub const fn is_input_error(&self) -> bool {
        matches!(self, Self::InputError(_) | Self::VideoError(_) | Self::ImageError(_))
    }
}

impl fmt::Display for PostureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelLoadError(msg) => write!(f, "Model load error: {msg}"),
            Self::InferenceError(msg) => write!(f, "Inference error: {msg}"),
            Self::ImageError(msg) => write!(f, "Image error: {msg}"),
            Self::ConfigError(msg) => write!(f, "Config error: {msg}"),
            Self::IoError(msg) => write!(f, "IO error: {msg}"),
            Self::Io(err) => write!(f, "IO error: {err}"),
            Self::MetadataError(msg) => write!(f, "Metadata error: {msg}"),
            Self::VideoError(msg) => write!(f, "Video error: {msg}"),
            Self::InputError(msg) => write!(f, "Input error: {msg}"),
            Self::FeatureNotEnabled(msg) => write!(f, "Feature not enabled: {msg}"),
        }
    }
}

impl std::error::Error for PostureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PostureError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<image::ImageError> for PostureError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageError(err.to_string())
    }
}
