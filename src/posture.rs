// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Per-frame posture classification.
//!
//! This module turns the landmarks of one frame into a [`FrameResult`]: it picks
//! the knee side to measure, derives the knee, back and neck angles, decides
//! between [`PostureType::Squat`] and [`PostureType::DeskSitting`], and raises
//! [`PostureFlag`]s for bad form.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::geometry::joint_angle;
use crate::landmarks::{Keypoint, PoseLandmarks};
use crate::thresholds::{PostureThresholds, within};

/// Activity recognised in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PostureType {
    /// Squatting.
    Squat,
    /// Sitting at a desk.
    DeskSitting,
}

impl PostureType {
    /// Tie-break precedence when counting votes: earlier entries win ties.
    pub const PRECEDENCE: [Self; 2] = [Self::Squat, Self::DeskSitting];

    /// Returns the string representation used in reports.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Squat => "squat",
            Self::DeskSitting => "desk_sitting",
        }
    }
}

impl fmt::Display for PostureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PostureType {
    type Err = PostureParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "squat" => Ok(Self::Squat),
            "desk_sitting" | "desk-sitting" | "sitting" => Ok(Self::DeskSitting),
            _ => Err(PostureParseError(s.to_string())),
        }
    }
}

/// Error returned when parsing an invalid posture string.
#[derive(Debug, Clone)]
pub struct PostureParseError(String);

impl fmt::Display for PostureParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid posture '{}', expected one of: squat, desk_sitting",
            self.0
        )
    }
}

impl std::error::Error for PostureParseError {}

/// Which leg the knee angle was measured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KneeSide {
    Left,
    Right,
}

impl KneeSide {
    /// The (hip, knee, ankle) triple for this side.
    #[must_use]
    pub const fn joints(self) -> (Keypoint, Keypoint, Keypoint) {
        match self {
            Self::Left => (Keypoint::LeftHip, Keypoint::LeftKnee, Keypoint::LeftAnkle),
            Self::Right => (Keypoint::RightHip, Keypoint::RightKnee, Keypoint::RightAnkle),
        }
    }

    /// The knee keypoint for this side.
    #[must_use]
    pub const fn knee(self) -> Keypoint {
        self.joints().1
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl fmt::Display for KneeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bad-posture finding for one frame.
///
/// Each flag carries the threshold values it was checked against, and is
/// reported as a human-readable message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PostureFlag {
    /// Squat back angle outside `(low, high)`.
    BackAngleAbnormal { low: f32, high: f32 },
    /// Squat knee angle above `max`.
    KneeTooStraight { max: f32 },
    /// Sitting neck angle outside `[min, max]`.
    NeckNotStraight { min: f32, max: f32 },
    /// Sitting back angle outside `[min, max]`.
    BackNotStraight { min: f32, max: f32 },
}

impl fmt::Display for PostureFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BackAngleAbnormal { low, high } => {
                write!(f, "Back angle abnormal during squat (<{low}° or >{high}°)")
            }
            Self::KneeTooStraight { max } => write!(f, "Knee too straight during squat (>{max}°)"),
            Self::NeckNotStraight { min, max } => {
                write!(f, "Neck not straight while sitting (outside {min}°–{max}°)")
            }
            Self::BackNotStraight { min, max } => {
                write!(f, "Back not straight while sitting (outside {min}°–{max}°)")
            }
        }
    }
}

impl Serialize for PostureFlag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Angles measured on one frame, before classification.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JointAngles {
    /// Side the knee angle was measured on, if any knee was visible enough.
    pub knee_side: Option<KneeSide>,
    /// Hip-knee-ankle angle on `knee_side`.
    pub knee_angle: Option<f32>,
    /// Left shoulder-hip-knee angle.
    pub back_angle: Option<f32>,
    /// Left ear-shoulder-hip angle.
    pub neck_angle: Option<f32>,
}

/// The angle fields reported for a frame, which depend on its posture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PostureAngles {
    /// Reported for squat frames.
    Squat {
        knee_angle: Option<f32>,
        back_angle: Option<f32>,
    },
    /// Reported for desk-sitting frames.
    DeskSitting {
        neck_angle: Option<f32>,
        back_angle: Option<f32>,
    },
}

impl PostureAngles {
    /// Keep only the angles relevant to `posture`.
    #[must_use]
    pub const fn for_posture(posture: PostureType, angles: &JointAngles) -> Self {
        match posture {
            PostureType::Squat => Self::Squat {
                knee_angle: angles.knee_angle,
                back_angle: angles.back_angle,
            },
            PostureType::DeskSitting => Self::DeskSitting {
                neck_angle: angles.neck_angle,
                back_angle: angles.back_angle,
            },
        }
    }

    #[must_use]
    pub const fn posture_type(&self) -> PostureType {
        match self {
            Self::Squat { .. } => PostureType::Squat,
            Self::DeskSitting { .. } => PostureType::DeskSitting,
        }
    }

    #[must_use]
    pub const fn back_angle(&self) -> Option<f32> {
        match self {
            Self::Squat { back_angle, .. } | Self::DeskSitting { back_angle, .. } => *back_angle,
        }
    }

    /// Knee angle, only present on squat frames.
    #[must_use]
    pub const fn knee_angle(&self) -> Option<f32> {
        match self {
            Self::Squat { knee_angle, .. } => *knee_angle,
            Self::DeskSitting { .. } => None,
        }
    }

    /// Neck angle, only present on desk-sitting frames.
    #[must_use]
    pub const fn neck_angle(&self) -> Option<f32> {
        match self {
            Self::DeskSitting { neck_angle, .. } => *neck_angle,
            Self::Squat { .. } => None,
        }
    }
}

/// Classification of one frame that had landmarks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameResult {
    /// 1-based index of the frame in the source.
    pub frame: usize,
    /// Posture recognised in this frame.
    pub posture_type: PostureType,
    /// Bad-posture findings, possibly empty.
    pub flags: Vec<PostureFlag>,
    /// `true` iff `flags` is non-empty.
    pub bad_posture: bool,
    /// Posture-specific angles.
    #[serde(flatten)]
    pub angles: PostureAngles,
    /// Knee side used for the knee angle (for overlays only).
    #[serde(skip)]
    pub knee_side: Option<KneeSide>,
}

impl FrameResult {
    /// Build a frame result; posture and `bad_posture` are derived from `angles` and `flags`.
    #[must_use]
    pub fn new(
        frame: usize,
        angles: PostureAngles,
        flags: Vec<PostureFlag>,
        knee_side: Option<KneeSide>,
    ) -> Self {
        Self {
            frame,
            posture_type: angles.posture_type(),
            bad_posture: !flags.is_empty(),
            flags,
            angles,
            knee_side,
        }
    }
}

/// Classifies single frames against a fixed [`PostureThresholds`] set.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameClassifier {
    thresholds: PostureThresholds,
}

impl FrameClassifier {
    /// Create a classifier with the given thresholds.
    #[must_use]
    pub const fn new(thresholds: PostureThresholds) -> Self {
        Self { thresholds }
    }

    /// Thresholds in use.
    #[must_use]
    pub const fn thresholds(&self) -> &PostureThresholds {
        &self.thresholds
    }

    /// Pick the knee to measure: the more visible one among those above the
    /// visibility threshold. Left wins ties.
    #[must_use]
    pub fn select_knee(&self, pose: &PoseLandmarks) -> Option<KneeSide> {
        let mut best: Option<(KneeSide, f32)> = None;
        for side in [KneeSide::Left, KneeSide::Right] {
            let visibility = pose.visibility(side.knee());
            if visibility <= self.thresholds.knee_visibility_min {
                continue;
            }
            if best.is_none_or(|(_, v)| visibility > v) {
                best = Some((side, visibility));
            }
        }
        best.map(|(side, _)| side)
    }

    /// Measure knee, back and neck angles on a frame.
    #[must_use]
    pub fn measure(&self, pose: &PoseLandmarks) -> JointAngles {
        let knee_side = self.select_knee(pose);
        let knee_angle = knee_side.and_then(|side| {
            let (hip, knee, ankle) = side.joints();
            joint_angle(pose.point(hip), pose.point(knee), pose.point(ankle))
        });

        // Back and neck are always measured on the left side.
        let back_angle = joint_angle(
            pose.point(Keypoint::LeftShoulder),
            pose.point(Keypoint::LeftHip),
            pose.point(Keypoint::LeftKnee),
        );
        let neck_angle = joint_angle(
            pose.point(Keypoint::LeftEar),
            pose.point(Keypoint::LeftShoulder),
            pose.point(Keypoint::LeftHip),
        );

        JointAngles {
            knee_side,
            knee_angle,
            back_angle,
            neck_angle,
        }
    }

    /// Decide the posture from measured angles.
    ///
    /// A bent knee means squat. Otherwise a bent back also means squat, even
    /// when the knee angle is known.
    #[must_use]
    pub fn posture(&self, angles: &JointAngles) -> PostureType {
        let t = &self.thresholds;
        if angles.knee_angle.is_some_and(|knee| knee < t.knee_squat_threshold)
            || angles.back_angle.is_some_and(|back| back < t.back_squat_threshold)
        {
            PostureType::Squat
        } else {
            PostureType::DeskSitting
        }
    }

    /// Bad-posture findings for a frame in the given posture.
    #[must_use]
    pub fn flags(&self, posture: PostureType, angles: &JointAngles) -> Vec<PostureFlag> {
        let t = &self.thresholds;
        let mut flags = Vec::new();

        match posture {
            PostureType::Squat => {
                if angles
                    .back_angle
                    .is_some_and(|back| back < t.back_abnormal_low || back > t.back_abnormal_high)
                {
                    flags.push(PostureFlag::BackAngleAbnormal {
                        low: t.back_abnormal_low,
                        high: t.back_abnormal_high,
                    });
                }
                if angles
                    .knee_angle
                    .is_some_and(|knee| knee > t.knee_straight_threshold)
                {
                    flags.push(PostureFlag::KneeTooStraight {
                        max: t.knee_straight_threshold,
                    });
                }
            }
            PostureType::DeskSitting => {
                if angles.neck_angle.is_some_and(|neck| !within(t.neck_range, neck)) {
                    flags.push(PostureFlag::NeckNotStraight {
                        min: t.neck_range.0,
                        max: t.neck_range.1,
                    });
                }
                if angles.back_angle.is_some_and(|back| !within(t.back_range, back)) {
                    flags.push(PostureFlag::BackNotStraight {
                        min: t.back_range.0,
                        max: t.back_range.1,
                    });
                }
            }
        }

        flags
    }

    /// Classify already-measured angles.
    #[must_use]
    pub fn classify_angles(&self, frame: usize, angles: &JointAngles) -> FrameResult {
        let posture = self.posture(angles);
        let flags = self.flags(posture, angles);
        FrameResult::new(
            frame,
            PostureAngles::for_posture(posture, angles),
            flags,
            angles.knee_side,
        )
    }

    /// Measure and classify one frame.
    #[must_use]
    pub fn classify(&self, frame: usize, pose: &PoseLandmarks) -> FrameResult {
        self.classify_angles(frame, &self.measure(pose))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::Landmark;

    fn angles(knee: Option<f32>, back: Option<f32>, neck: Option<f32>) -> JointAngles {
        JointAngles {
            knee_side: knee.map(|_| KneeSide::Left),
            knee_angle: knee,
            back_angle: back,
            neck_angle: neck,
        }
    }

    fn with_knee_visibility(left: f32, right: f32) -> PoseLandmarks {
        PoseLandmarks::default()
            .with(Keypoint::LeftKnee, Landmark::new(0.4, 0.7, left))
            .with(Keypoint::RightKnee, Landmark::new(0.6, 0.7, right))
    }

    #[test]
    fn test_posture_type_strings() {
        assert_eq!(PostureType::Squat.to_string(), "squat");
        assert_eq!(PostureType::DeskSitting.to_string(), "desk_sitting");
        assert_eq!("desk_sitting".parse::<PostureType>().unwrap(), PostureType::DeskSitting);
        assert_eq!("SQUAT".parse::<PostureType>().unwrap(), PostureType::Squat);
        assert!("standing".parse::<PostureType>().is_err());
    }

    #[test]
    fn test_flag_messages() {
        let t = PostureThresholds::default();
        let classifier = FrameClassifier::new(t);

        let squat = classifier.flags(PostureType::Squat, &angles(Some(170.0), Some(90.0), None));
        assert_eq!(
            squat.iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec![
                "Back angle abnormal during squat (<100° or >170°)",
                "Knee too straight during squat (>160°)",
            ]
        );

        let sitting = classifier.flags(
            PostureType::DeskSitting,
            &angles(None, Some(190.0), Some(140.0)),
        );
        assert_eq!(
            sitting.iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec![
                "Neck not straight while sitting (outside 150°–185°)",
                "Back not straight while sitting (outside 150°–185°)",
            ]
        );
    }

    #[test]
    fn test_bent_knee_good_squat() {
        let result = FrameClassifier::default()
            .classify_angles(1, &angles(Some(120.0), Some(160.0), Some(170.0)));
        assert_eq!(result.posture_type, PostureType::Squat);
        assert!(result.flags.is_empty());
        assert!(!result.bad_posture);
        assert_eq!(result.angles.knee_angle(), Some(120.0));
        assert_eq!(result.angles.back_angle(), Some(160.0));
        assert_eq!(result.angles.neck_angle(), None);
    }

    #[test]
    fn test_sitting_with_bent_neck() {
        let result = FrameClassifier::default()
            .classify_angles(3, &angles(Some(150.0), Some(160.0), Some(140.0)));
        assert_eq!(result.posture_type, PostureType::DeskSitting);
        assert!(result.bad_posture);
        assert_eq!(result.flags.len(), 1);
        assert!(result.flags[0].to_string().starts_with("Neck not straight"));
        assert_eq!(result.angles.knee_angle(), None);
        assert_eq!(result.angles.neck_angle(), Some(140.0));
    }

    #[test]
    fn test_unknown_knee_falls_back_to_back_angle() {
        let result =
            FrameClassifier::default().classify_angles(1, &angles(None, Some(145.0), Some(170.0)));
        assert_eq!(result.posture_type, PostureType::Squat);
        assert_eq!(result.angles.knee_angle(), None);
        assert!(!result.bad_posture);
    }

    #[test]
    fn test_straight_knee_with_bent_back_is_still_squat() {
        let result = FrameClassifier::default()
            .classify_angles(1, &angles(Some(165.0), Some(145.0), Some(170.0)));
        assert_eq!(result.posture_type, PostureType::Squat);
        assert_eq!(
            result.flags,
            vec![PostureFlag::KneeTooStraight { max: 160.0 }]
        );
    }

    #[test]
    fn test_threshold_boundaries() {
        let classifier = FrameClassifier::default();
        // Exactly at thresholds: not a squat.
        assert_eq!(
            classifier.posture(&angles(Some(140.0), Some(150.0), None)),
            PostureType::DeskSitting
        );
        // Inclusive sitting ranges.
        assert!(
            classifier
                .flags(PostureType::DeskSitting, &angles(None, Some(185.0), Some(150.0)))
                .is_empty()
        );
        // Exclusive squat back limits.
        assert!(
            classifier
                .flags(PostureType::Squat, &angles(None, Some(100.0), None))
                .is_empty()
        );
        assert!(
            classifier
                .flags(PostureType::Squat, &angles(Some(160.0), Some(170.0), None))
                .is_empty()
        );
    }

    #[test]
    fn test_unknown_angles_raise_no_flags() {
        let classifier = FrameClassifier::default();
        let result = classifier.classify_angles(1, &angles(None, None, None));
        assert_eq!(result.posture_type, PostureType::DeskSitting);
        assert!(!result.bad_posture);
    }

    #[test]
    fn test_knee_selection() {
        let classifier = FrameClassifier::default();
        assert_eq!(
            classifier.select_knee(&with_knee_visibility(0.9, 0.4)),
            Some(KneeSide::Left)
        );
        assert_eq!(
            classifier.select_knee(&with_knee_visibility(0.3, 0.8)),
            Some(KneeSide::Right)
        );
        assert_eq!(
            classifier.select_knee(&with_knee_visibility(0.5, 0.5)),
            Some(KneeSide::Left)
        );
        assert_eq!(
            classifier.select_knee(&with_knee_visibility(0.05, 0.2)),
            Some(KneeSide::Right)
        );
        assert_eq!(classifier.select_knee(&with_knee_visibility(0.1, 0.1)), None);
    }

    #[test]
    fn test_classify_from_landmarks() {
        // Upright seated figure viewed from the side, thigh horizontal.
        let pose = PoseLandmarks::default()
            .with(Keypoint::LeftEar, Landmark::new(0.50, 0.10, 0.9))
            .with(Keypoint::LeftShoulder, Landmark::new(0.50, 0.20, 0.9))
            .with(Keypoint::LeftHip, Landmark::new(0.50, 0.50, 0.9))
            .with(Keypoint::LeftKnee, Landmark::new(0.80, 0.50, 0.9))
            .with(Keypoint::LeftAnkle, Landmark::new(0.80, 0.80, 0.9));

        let classifier = FrameClassifier::default();
        let measured = classifier.measure(&pose);
        assert_eq!(measured.knee_side, Some(KneeSide::Left));
        assert!((measured.knee_angle.unwrap() - 90.0).abs() < 1e-3);
        assert!((measured.back_angle.unwrap() - 90.0).abs() < 1e-3);
        assert!((measured.neck_angle.unwrap() - 180.0).abs() < 1e-3);

        // A 90 degree knee reads as a squat with an abnormal back.
        let result = classifier.classify(7, &pose);
        assert_eq!(result.frame, 7);
        assert_eq!(result.posture_type, PostureType::Squat);
        assert_eq!(
            result.flags,
            vec![PostureFlag::BackAngleAbnormal {
                low: 100.0,
                high: 170.0
            }]
        );
        assert_eq!(result.knee_side, Some(KneeSide::Left));
    }

    #[test]
    fn test_serialized_fields_follow_posture() {
        let squat = FrameClassifier::default()
            .classify_angles(2, &angles(None, Some(120.0), Some(175.0)));
        let json = serde_json::to_value(&squat).unwrap();
        assert_eq!(json["frame"], 2);
        assert_eq!(json["posture_type"], "squat");
        assert_eq!(json["bad_posture"], false);
        assert!(json["knee_angle"].is_null());
        assert!(json.get("knee_angle").is_some());
        assert!(json.get("neck_angle").is_none());
        assert!(json.get("knee_side").is_none());

        let sitting = FrameClassifier::default()
            .classify_angles(4, &angles(Some(170.0), Some(200.0), Some(160.0)));
        let json = serde_json::to_value(&sitting).unwrap();
        assert_eq!(json["posture_type"], "desk_sitting");
        assert_eq!(json["bad_posture"], true);
        assert_eq!(
            json["flags"][0],
            "Back not straight while sitting (outside 150°–185°)"
        );
        assert!(json.get("knee_angle").is_none());
        assert!(json["neck_angle"].is_number());
    }
}
