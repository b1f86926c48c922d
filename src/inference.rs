// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Pose model inference configuration.
//!
//! This module defines the [`InferenceConfig`] struct, which controls how the
//! pose model finds a person in a frame: detection confidence, input image
//! sizing and ONNX Runtime threading.

/// Default person detection confidence.
pub const DEFAULT_CONFIDENCE: f32 = 0.3;

/// Configuration for pose model inference.
///
/// # Example
///
/// ```rust
/// use posture_analyzer::InferenceConfig;
///
/// let config = InferenceConfig::new()
///     .with_confidence(0.5)
///     .with_imgsz(640, 640);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceConfig {
    /// Minimum person confidence (0.0 to 1.0).
    /// Frames whose best person scores lower than this count as "no landmarks".
    pub confidence_threshold: f32,
    /// Explicit input image size (height, width).
    /// If `None`, the model's metadata will be used to determine input size.
    pub imgsz: Option<(usize, usize)>,
    /// Number of intra-op threads for ONNX Runtime (`0` lets ONNX Runtime decide).
    pub num_threads: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE,
            imgsz: None,
            num_threads: 0,
        }
    }
}

impl InferenceConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the person confidence threshold.
    #[must_use]
    pub const fn with_confidence(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Set the input image size.
    ///
    /// # Arguments
    ///
    /// * `height` - The target image height.
    /// * `width` - The target image width.
    #[must_use]
    pub const fn with_imgsz(mut self, height: usize, width: usize) -> Self {
        self.imgsz = Some((height, width));
        self
    }

    /// Set the number of intra-op threads. `0` means auto.
    #[must_use]
    pub const fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads;
        self
    }

    /// Check that the confidence is within `[0, 1]` and the image size is non-zero.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` naming the out-of-range value.
    pub fn validate(&self) -> crate::Result<()> {
        let confidence = self.confidence_threshold;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(crate::PostureError::ConfigError(format!(
                "confidence must be between 0.0 and 1.0, got {confidence}"
            )));
        }
        if self.imgsz.is_some_and(|(h, w)| h == 0 || w == 0) {
            return Err(crate::PostureError::ConfigError(
                "imgsz must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = InferenceConfig::default();
        assert!((config.confidence_threshold - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.imgsz, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = InferenceConfig::new()
            .with_confidence(0.5)
            .with_imgsz(640, 480)
            .with_threads(8);

        assert!((config.confidence_threshold - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.imgsz, Some((640, 480)));
        assert_eq!(config.num_threads, 8);
    }

    #[test]
    fn test_config_validate() {
        assert!(InferenceConfig::new().with_confidence(1.5).validate().is_err());
        assert!(InferenceConfig::new().with_confidence(-0.1).validate().is_err());
        assert!(InferenceConfig::new().with_imgsz(0, 640).validate().is_err());
    }
}
