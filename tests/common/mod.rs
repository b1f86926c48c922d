// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Shared fixtures: hand-placed poses and a scripted estimator.

#![allow(dead_code)]

use std::collections::VecDeque;

use image::DynamicImage;
use posture_analyzer::{Keypoint, Landmark, PoseEstimator, PoseLandmarks, PostureError, Result};

fn lm(x: f32, y: f32) -> Landmark {
    Landmark::new(x, y, 0.9)
}

/// Deep squat: 90° knee, 90° back (back flagged as abnormal).
pub fn squat_pose() -> PoseLandmarks {
    PoseLandmarks::default()
        .with(Keypoint::LeftShoulder, lm(0.50, 0.20))
        .with(Keypoint::LeftHip, lm(0.50, 0.50))
        .with(Keypoint::LeftKnee, lm(0.80, 0.50))
        .with(Keypoint::LeftAnkle, lm(0.80, 0.80))
}

/// Upright sitting with ear, shoulder, hip, knee and ankle in one vertical line.
pub fn upright_pose() -> PoseLandmarks {
    PoseLandmarks::default()
        .with(Keypoint::LeftEar, lm(0.50, 0.05))
        .with(Keypoint::LeftShoulder, lm(0.50, 0.20))
        .with(Keypoint::LeftHip, lm(0.50, 0.50))
        .with(Keypoint::LeftKnee, lm(0.50, 0.80))
        .with(Keypoint::LeftAnkle, lm(0.50, 0.95))
}

/// Upright sitting with the head pushed forward (neck about 124°).
pub fn forward_head_pose() -> PoseLandmarks {
    upright_pose().with(Keypoint::LeftEar, lm(0.65, 0.10))
}

/// Answers `estimate` calls from a script, then reports no person.
pub struct Scripted {
    answers: VecDeque<Result<Option<PoseLandmarks>>>,
    pub calls: usize,
}

impl Scripted {
    pub fn new(answers: Vec<Result<Option<PoseLandmarks>>>) -> Self {
        Self {
            answers: answers.into(),
            calls: 0,
        }
    }

    pub fn poses(poses: Vec<Option<PoseLandmarks>>) -> Self {
        Self::new(poses.into_iter().map(Ok).collect())
    }

    pub fn failure(message: &str) -> Result<Option<PoseLandmarks>> {
        Err(PostureError::InferenceError(message.to_string()))
    }
}

impl PoseEstimator for Scripted {
    fn estimate(&mut self, _frame: &DynamicImage) -> Result<Option<PoseLandmarks>> {
        self.calls += 1;
        self.answers.pop_front().unwrap_or(Ok(None))
    }
}

/// `n` small blank frames.
pub fn blank_frames(n: usize) -> Vec<DynamicImage> {
    (0..n).map(|_| DynamicImage::new_rgb8(16, 16)).collect()
}
