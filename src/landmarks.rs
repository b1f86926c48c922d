// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Body landmarks produced by the pose model.
//!
//! Landmarks follow the 17-point COCO-Pose layout used by YOLO pose models.
//! Positions are normalized to `[0, 1]` by the source frame width and height,
//! and every landmark carries the model's visibility score.

use serde::Serialize;

use crate::geometry::Point;

/// Number of landmarks in a COCO-Pose skeleton.
pub const NUM_KEYPOINTS: usize = 17;

/// COCO-Pose skeleton structure (pairs of keypoint indices).
pub const SKELETON: [[usize; 2]; 19] = [
    [15, 13], // left ankle to left knee
    [13, 11], // left knee to left hip
    [16, 14], // right ankle to right knee
    [14, 12], // right knee to right hip
    [11, 12], // left hip to right hip
    [5, 11],  // left shoulder to left hip
    [6, 12],  // right shoulder to right hip
    [5, 6],   // left shoulder to right shoulder
    [5, 7],   // left shoulder to left elbow
    [6, 8],   // right shoulder to right elbow
    [7, 9],   // left elbow to left wrist
    [8, 10],  // right elbow to right wrist
    [1, 2],   // left eye to right eye
    [0, 1],   // nose to left eye
    [0, 2],   // nose to right eye
    [1, 3],   // left eye to left ear
    [2, 4],   // right eye to right ear
    [3, 5],   // left ear to left shoulder
    [4, 6],   // right ear to right shoulder
];

/// Named body joints, in COCO-Pose index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keypoint {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl Keypoint {
    /// All keypoints in index order.
    pub const ALL: [Self; NUM_KEYPOINTS] = [
        Self::Nose,
        Self::LeftEye,
        Self::RightEye,
        Self::LeftEar,
        Self::RightEar,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
    ];

    /// Position of this keypoint in the model output.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Snake-case name of the joint.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEye => "left_eye",
            Self::RightEye => "right_eye",
            Self::LeftEar => "left_ear",
            Self::RightEar => "right_ear",
            Self::LeftShoulder => "left_shoulder",
            Self::RightShoulder => "right_shoulder",
            Self::LeftElbow => "left_elbow",
            Self::RightElbow => "right_elbow",
            Self::LeftWrist => "left_wrist",
            Self::RightWrist => "right_wrist",
            Self::LeftHip => "left_hip",
            Self::RightHip => "right_hip",
            Self::LeftKnee => "left_knee",
            Self::RightKnee => "right_knee",
            Self::LeftAnkle => "left_ankle",
            Self::RightAnkle => "right_ankle",
        }
    }
}

/// A single tracked body joint.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Landmark {
    /// Normalized x coordinate.
    pub x: f32,
    /// Normalized y coordinate.
    pub y: f32,
    /// Visibility/confidence score in `[0, 1]`.
    pub visibility: f32,
}

impl Landmark {
    /// Create a new landmark.
    #[must_use]
    pub const fn new(x: f32, y: f32, visibility: f32) -> Self {
        Self { x, y, visibility }
    }

    /// Position of the landmark, without its visibility.
    #[must_use]
    pub const fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// The full landmark set of one detected person in one frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PoseLandmarks {
    landmarks: [Landmark; NUM_KEYPOINTS],
}

impl PoseLandmarks {
    /// Build a landmark set from COCO-ordered landmarks.
    #[must_use]
    pub const fn new(landmarks: [Landmark; NUM_KEYPOINTS]) -> Self {
        Self { landmarks }
    }

    /// Build a landmark set from raw `[x, y, visibility]` rows.
    ///
    /// Returns `None` unless exactly [`NUM_KEYPOINTS`] rows are given.
    #[must_use]
    pub fn from_rows(rows: &[[f32; 3]]) -> Option<Self> {
        if rows.len() != NUM_KEYPOINTS {
            return None;
        }
        let mut landmarks = [Landmark::default(); NUM_KEYPOINTS];
        for (slot, row) in landmarks.iter_mut().zip(rows) {
            *slot = Landmark::new(row[0], row[1], row[2]);
        }
        Some(Self { landmarks })
    }

    /// Replace one landmark, returning the updated set.
    #[must_use]
    pub const fn with(mut self, keypoint: Keypoint, landmark: Landmark) -> Self {
        self.landmarks[keypoint.index()] = landmark;
        self
    }

    /// Get a landmark by joint.
    #[must_use]
    pub const fn get(&self, keypoint: Keypoint) -> &Landmark {
        &self.landmarks[keypoint.index()]
    }

    /// Position of a landmark.
    #[must_use]
    pub const fn point(&self, keypoint: Keypoint) -> Point {
        self.get(keypoint).point()
    }

    /// Visibility score of a landmark.
    #[must_use]
    pub const fn visibility(&self, keypoint: Keypoint) -> f32 {
        self.get(keypoint).visibility
    }

    /// Iterate over all landmarks in COCO order.
    pub fn iter(&self) -> impl Iterator<Item = (Keypoint, &Landmark)> {
        Keypoint::ALL.into_iter().zip(self.landmarks.iter())
    }
}
