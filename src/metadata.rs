// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! ONNX model metadata parsing.
//!
//! Ultralytics exports store their configuration as YAML-ish key/value pairs in
//! the ONNX custom metadata. Only the fields the pose pipeline needs are read.

use std::collections::HashMap;

use crate::error::{PostureError, Result};
use crate::landmarks::NUM_KEYPOINTS;

/// Task name that pose models declare.
pub const POSE_TASK: &str = "pose";

/// Metadata extracted from an Ultralytics YOLO pose ONNX model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMetadata {
    /// Model description.
    pub description: String,
    /// Ultralytics version used for export.
    pub version: String,
    /// Task the model performs (`pose` for usable models).
    pub task: String,
    /// Model stride (typically 32 for YOLO).
    pub stride: u32,
    /// Input image size as (height, width).
    pub imgsz: (usize, usize),
    /// Keypoint layout as (keypoints, values per keypoint).
    pub kpt_shape: (usize, usize),
    /// Class ID to class name mapping.
    pub names: HashMap<usize, String>,
}

impl ModelMetadata {
    /// Parse metadata from ONNX model custom metadata properties.
    ///
    /// # Errors
    ///
    /// Returns an error if no metadata is present or it is malformed.
    pub fn from_onnx_metadata(metadata_map: &HashMap<String, String>) -> Result<Self> {
        let yaml_str = metadata_map
            .get("metadata")
            .or_else(|| metadata_map.get("model_metadata"))
            .or_else(|| metadata_map.values().find(|v| v.contains("task:")))
            .ok_or_else(|| {
                PostureError::MetadataError(
                    "No metadata found in ONNX model. Ensure the model was exported with Ultralytics."
                        .to_string(),
                )
            })?;

        Self::from_yaml_str(yaml_str)
    }

    /// Parse metadata from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric field cannot be parsed.
    pub fn from_yaml_str(yaml_str: &str) -> Result<Self> {
        let mut metadata = Self::default();

        for line in yaml_str.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim().trim_matches('\'').trim_matches('"');

            match key {
                "description" => metadata.description = value.to_string(),
                "version" => metadata.version = value.to_string(),
                "task" => metadata.task = value.to_lowercase(),
                "stride" => {
                    metadata.stride = value.parse().map_err(|_| {
                        PostureError::MetadataError(format!("Invalid stride value: {value}"))
                    })?;
                }
                _ => {
                    if let Ok(class_id) = key.parse::<usize>() {
                        metadata.names.insert(class_id, value.to_string());
                    }
                }
            }
        }

        if let Some((h, w)) = Self::parse_pair(yaml_str, "imgsz") {
            metadata.imgsz = (h, w);
        }
        if let Some(shape) = Self::parse_pair(yaml_str, "kpt_shape") {
            metadata.kpt_shape = shape;
        }

        Ok(metadata)
    }

    /// Parse a two-element list, either inline (`key: [a, b]`) or as YAML list items.
    fn parse_pair(yaml_str: &str, key: &str) -> Option<(usize, usize)> {
        let needle = format!("{key}:");
        let lines: Vec<&str> = yaml_str.lines().collect();
        let start = lines.iter().position(|l| l.trim_start().starts_with(&needle))?;
        let line = lines[start];

        let mut values: Vec<usize> = Vec::new();
        if let (Some(open), Some(close)) = (line.find('['), line.find(']')) {
            values = line[open + 1..close]
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
        } else {
            for following in &lines[start + 1..] {
                let trimmed = following.trim();
                if let Some(item) = trimmed.strip_prefix('-') {
                    if let Ok(val) = item.trim().parse() {
                        values.push(val);
                    }
                } else if !trimmed.is_empty() && !trimmed.starts_with('#') {
                    break;
                }
                if values.len() >= 2 {
                    break;
                }
            }
        }

        (values.len() >= 2).then(|| (values[0], values[1]))
    }

    /// Whether the model produces pose keypoints.
    #[must_use]
    pub fn is_pose(&self) -> bool {
        self.task == POSE_TASK
    }

    /// Get the number of classes in this model.
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.names.len().max(1)
    }
}

impl Default for ModelMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            version: String::new(),
            task: POSE_TASK.to_string(),
            stride: 32,
            imgsz: (640, 640),
            kpt_shape: (NUM_KEYPOINTS, 3),
            names: HashMap::from([(0, "person".to_string())]),
        }
    }
}
