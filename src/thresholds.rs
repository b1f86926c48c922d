// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Angle thresholds used to classify posture and flag bad form.
//!
//! All values are in degrees except [`PostureThresholds::knee_visibility_min`],
//! which is a landmark visibility score.

/// Knee angle below which a frame is a squat.
pub const KNEE_SQUAT_THRESHOLD: f32 = 140.0;
/// Back angle below which a frame is a squat (fallback rule).
pub const BACK_SQUAT_THRESHOLD: f32 = 150.0;
/// Lowest acceptable back angle during a squat.
pub const BACK_ABNORMAL_LOW: f32 = 100.0;
/// Highest acceptable back angle during a squat.
pub const BACK_ABNORMAL_HIGH: f32 = 170.0;
/// Knee angle above which the knee counts as too straight during a squat.
pub const KNEE_STRAIGHT_THRESHOLD: f32 = 160.0;
/// Acceptable neck angle range while sitting (inclusive).
pub const NECK_RANGE: (f32, f32) = (150.0, 185.0);
/// Acceptable back angle range while sitting (inclusive).
pub const BACK_RANGE: (f32, f32) = (150.0, 185.0);
/// Minimum knee visibility for a side to be measured.
pub const KNEE_VISIBILITY_MIN: f32 = 0.1;

/// Fixed threshold set for the frame classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostureThresholds {
    /// Knee angle below which the frame is a squat.
    pub knee_squat_threshold: f32,
    /// Back angle below which the frame is a squat.
    pub back_squat_threshold: f32,
    /// Squat back angle below this is abnormal.
    pub back_abnormal_low: f32,
    /// Squat back angle above this is abnormal.
    pub back_abnormal_high: f32,
    /// Squat knee angle above this is too straight.
    pub knee_straight_threshold: f32,
    /// Inclusive `(min, max)` acceptable sitting neck angle.
    pub neck_range: (f32, f32),
    /// Inclusive `(min, max)` acceptable sitting back angle.
    pub back_range: (f32, f32),
    /// A knee must be strictly more visible than this to be measured.
    pub knee_visibility_min: f32,
}

impl Default for PostureThresholds {
    fn default() -> Self {
        Self {
            knee_squat_threshold: KNEE_SQUAT_THRESHOLD,
            back_squat_threshold: BACK_SQUAT_THRESHOLD,
            back_abnormal_low: BACK_ABNORMAL_LOW,
            back_abnormal_high: BACK_ABNORMAL_HIGH,
            knee_straight_threshold: KNEE_STRAIGHT_THRESHOLD,
            neck_range: NECK_RANGE,
            back_range: BACK_RANGE,
            knee_visibility_min: KNEE_VISIBILITY_MIN,
        }
    }
}

/// Whether `value` lies within the inclusive `range`.
pub(crate) fn within(range: (f32, f32), value: f32) -> bool {
    (range.0..=range.1).contains(&value)
}
