// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! YOLO pose model loading and inference.
//!
//! This module provides [`PoseModel`], which wraps an ONNX Runtime session for
//! an Ultralytics YOLO pose export and implements [`PoseEstimator`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::DynamicImage;
#[cfg(feature = "coreml")]
use ort::execution_providers::CoreMLExecutionProvider;
#[cfg(feature = "cuda")]
use ort::execution_providers::CUDAExecutionProvider;
use ort::execution_providers::ExecutionProviderDispatch;
#[cfg(feature = "openvino")]
use ort::execution_providers::OpenVINOExecutionProvider;
#[cfg(feature = "tensorrt")]
use ort::execution_providers::TensorRTExecutionProvider;
use ort::session::Session;
use ort::value::TensorRef;

use crate::analyzer::PoseEstimator;
use crate::error::{PostureError, Result};
use crate::inference::InferenceConfig;
use crate::landmarks::{NUM_KEYPOINTS, PoseLandmarks};
use crate::metadata::ModelMetadata;
use crate::postprocessing::{PersonDetection, postprocess_pose};
use crate::preprocessing::preprocess_image;

/// Keys Ultralytics writes into the ONNX custom metadata.
const METADATA_KEYS: [&str; 14] = [
    "description",
    "author",
    "date",
    "version",
    "license",
    "docs",
    "stride",
    "task",
    "batch",
    "imgsz",
    "names",
    "half",
    "channels",
    "kpt_shape",
];

/// YOLO pose model.
///
/// # Example
///
/// ```no_run
/// use posture_analyzer::PoseModel;
///
/// let mut model = PoseModel::load("yolo11n-pose.onnx")?;
/// let frame = image::open("frame.jpg")?;
/// if let Some(person) = model.detect(&frame)? {
///     println!("person with confidence {:.2}", person.score);
/// }
/// # Ok::<(), posture_analyzer::PostureError>(())
/// ```
pub struct PoseModel {
    session: Session,
    metadata: ModelMetadata,
    input_name: String,
    output_name: String,
    config: InferenceConfig,
    path: PathBuf,
    warmed_up: bool,
}

impl PoseModel {
    /// Load a pose model with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the model file doesn't exist, can't be loaded, or
    /// is not a pose model.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_config(path, InferenceConfig::default())
    }

    /// Load a pose model with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the model file
    /// doesn't exist or can't be loaded, or the model is not a 17-keypoint
    /// pose model.
    pub fn load_with_config<P: AsRef<Path>>(path: P, config: InferenceConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref();

        if !path.exists() {
            return Err(PostureError::ModelLoadError(format!(
                "Model file not found: {}",
                path.display()
            )));
        }

        let mut builder = Session::builder().map_err(|e| {
            PostureError::ModelLoadError(format!("Failed to create session builder: {e}"))
        })?;

        let providers = execution_providers();
        if !providers.is_empty() {
            tracing::debug!(providers = ?enabled_providers(), "registering execution providers");
            builder = builder
                .with_execution_providers(providers)
                .map_err(|e| PostureError::ModelLoadError(format!("Failed to register execution providers: {e}")))?;
        }

        let session = builder
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
            .map_err(|e| PostureError::ModelLoadError(format!("Failed to set optimization level: {e}")))?
            .with_intra_threads(config.num_threads)
            .map_err(|e| PostureError::ModelLoadError(format!("Failed to set intra-thread count: {e}")))?
            .commit_from_file(path)
            .map_err(|e| PostureError::ModelLoadError(format!("Failed to load model: {e}")))?;

        let metadata = Self::extract_metadata(&session)?;
        if !metadata.is_pose() {
            return Err(PostureError::ModelLoadError(format!(
                "{} is a '{}' model, a pose model is required",
                path.display(),
                metadata.task
            )));
        }
        if metadata.kpt_shape.0 != NUM_KEYPOINTS {
            return Err(PostureError::ModelLoadError(format!(
                "Expected {NUM_KEYPOINTS} keypoints, model has {}",
                metadata.kpt_shape.0
            )));
        }

        let input_name = session
            .inputs
            .first()
            .map_or_else(|| "images".to_string(), |i| i.name.clone());
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| PostureError::ModelLoadError("Model has no outputs".to_string()))?;

        let config = InferenceConfig {
            imgsz: config.imgsz.or(Some(metadata.imgsz)),
            ..config
        };

        tracing::debug!(
            model = %path.display(),
            imgsz = ?config.imgsz,
            version = %metadata.version,
            "loaded pose model"
        );

        Ok(Self {
            session,
            metadata,
            input_name,
            output_name,
            config,
            path: path.to_path_buf(),
            warmed_up: false,
        })
    }

    /// Collect Ultralytics metadata from the session and parse it.
    fn extract_metadata(session: &Session) -> Result<ModelMetadata> {
        let model_metadata = session
            .metadata()
            .map_err(|e| PostureError::ModelLoadError(format!("Failed to get model metadata: {e}")))?;

        let yaml = METADATA_KEYS
            .iter()
            .filter_map(|key| {
                model_metadata
                    .custom(key)
                    .ok()
                    .flatten()
                    .map(|value| format!("{key}: {value}"))
            })
            .collect::<Vec<_>>()
            .join("\n");

        if yaml.is_empty() {
            tracing::warn!("model has no Ultralytics metadata, assuming a 640x640 COCO pose model");
            return Ok(ModelMetadata::default());
        }

        let map = HashMap::from([("metadata".to_string(), yaml)]);
        ModelMetadata::from_onnx_metadata(&map)
    }

    /// Run one inference on a blank input so the first real frame is not slow.
    ///
    /// # Errors
    ///
    /// Returns an error if the session fails to run.
    pub fn warmup(&mut self) -> Result<()> {
        if self.warmed_up {
            return Ok(());
        }
        let (h, w) = self.input_size();
        let dummy = ndarray::Array4::<f32>::zeros((1, 3, h, w));
        self.run_inference(&dummy)?;
        self.warmed_up = true;
        Ok(())
    }

    /// Find the most confident person in a frame.
    ///
    /// # Errors
    ///
    /// Returns an error if preprocessing or inference fails.
    pub fn detect(&mut self, image: &DynamicImage) -> Result<Option<PersonDetection>> {
        if !self.warmed_up {
            self.warmup()?;
        }

        let preprocess = preprocess_image(image, self.input_size())?;
        let (output, shape) = self.run_inference(&preprocess.tensor)?;

        Ok(postprocess_pose(
            &output,
            &shape,
            &preprocess,
            &self.config,
            self.metadata.num_classes(),
        ))
    }

    fn run_inference(&mut self, input: &ndarray::Array4<f32>) -> Result<(Vec<f32>, Vec<usize>)> {
        let input_contiguous = input.as_standard_layout();
        let input_tensor = TensorRef::from_array_view(&input_contiguous)
            .map_err(|e| PostureError::InferenceError(format!("Failed to create input tensor: {e}")))?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(|e| PostureError::InferenceError(format!("Inference failed: {e}")))?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            PostureError::InferenceError(format!("Output '{}' not found", self.output_name))
        })?;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| PostureError::InferenceError(format!("Failed to extract output: {e}")))?;

        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let shape: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        Ok((data.to_vec(), shape))
    }

    /// Input size (height, width) used for letterboxing.
    #[must_use]
    pub fn input_size(&self) -> (usize, usize) {
        self.config.imgsz.unwrap_or(self.metadata.imgsz)
    }

    /// The model metadata.
    #[must_use]
    pub const fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// The inference configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Path the model was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PoseEstimator for PoseModel {
    fn estimate(&mut self, frame: &DynamicImage) -> Result<Option<PoseLandmarks>> {
        Ok(self.detect(frame)?.map(|person| person.landmarks))
    }
}

impl std::fmt::Debug for PoseModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoseModel")
            .field("path", &self.path)
            .field("task", &self.metadata.task)
            .field("imgsz", &self.input_size())
            .field("kpt_shape", &self.metadata.kpt_shape)
            .finish_non_exhaustive()
    }
}

/// Execution providers compiled into this build, in priority order. ONNX
/// Runtime falls back to the next one, and finally to `CPU`.
#[must_use]
pub fn enabled_providers() -> Vec<&'static str> {
    #[allow(unused_mut)]
    let mut names = Vec::new();
    #[cfg(feature = "tensorrt")]
    names.push("TensorRT");
    #[cfg(feature = "cuda")]
    names.push("CUDA");
    #[cfg(feature = "openvino")]
    names.push("OpenVINO");
    #[cfg(feature = "coreml")]
    names.push("CoreML");
    names.push("CPU");
    names
}

fn execution_providers() -> Vec<ExecutionProviderDispatch> {
    #[allow(unused_mut)]
    let mut providers = Vec::new();
    #[cfg(feature = "tensorrt")]
    providers.push(TensorRTExecutionProvider::default().build());
    #[cfg(feature = "cuda")]
    providers.push(CUDAExecutionProvider::default().build());
    #[cfg(feature = "openvino")]
    providers.push(OpenVINOExecutionProvider::default().build());
    #[cfg(feature = "coreml")]
    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
    providers
}
