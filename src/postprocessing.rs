// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Decoding of YOLO pose model outputs.
//!
//! A pose head emits one row per anchor: `[cx, cy, w, h, class scores..., kpts...]`
//! with 17 keypoints of `(x, y, conf)`. The output may come as
//! `[1, features, anchors]` or transposed `[1, anchors, features]`.

#![allow(clippy::cast_precision_loss)]

use ndarray::{Array2, s};

use crate::inference::InferenceConfig;
use crate::landmarks::{NUM_KEYPOINTS, PoseLandmarks};
use crate::preprocessing::{PreprocessResult, clip_point, scale_coords, scale_point};

const KPT_DIM: usize = 3;
const KPT_FEATURES: usize = NUM_KEYPOINTS * KPT_DIM;

/// The single most confident person found in a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonDetection {
    /// Bounding box `[x1, y1, x2, y2]` in original frame pixels.
    pub bbox: [f32; 4],
    /// Person confidence.
    pub score: f32,
    /// Landmarks normalized by frame width and height.
    pub landmarks: PoseLandmarks,
}

/// One decoded anchor that passed the confidence filter.
struct Candidate {
    bbox: [f32; 4],
    score: f32,
    keypoints: Vec<[f32; 3]>,
}

/// Decode a raw pose output into the best person, if any.
///
/// Anchors under the confidence threshold are dropped and the highest-scoring
/// remaining anchor is returned. Only one person is ever reported, so no
/// overlap suppression is needed. Ties keep the earlier anchor.
#[must_use]
pub fn postprocess_pose(
    output: &[f32],
    output_shape: &[usize],
    preprocess: &PreprocessResult,
    config: &InferenceConfig,
    num_classes: usize,
) -> Option<PersonDetection> {
    let output_2d = to_rows(output, output_shape, 4 + num_classes.max(1) + KPT_FEATURES)?;
    let num_classes = output_2d.ncols().saturating_sub(4 + KPT_FEATURES).max(1);

    let mut best: Option<Candidate> = None;
    for row in output_2d.rows() {
        let best_score = row
            .slice(s![4..4 + num_classes])
            .iter()
            .copied()
            .filter(|s| !s.is_nan())
            .fold(0.0_f32, f32::max);

        if best_score < config.confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        let scaled = scale_coords(
            &[cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
            preprocess.scale,
            preprocess.padding,
        );
        let [x1, y1] = clip_point([scaled[0], scaled[1]], preprocess.orig_shape);
        let [x2, y2] = clip_point([scaled[2], scaled[3]], preprocess.orig_shape);

        let kpt_start = 4 + num_classes;
        let keypoints = (0..NUM_KEYPOINTS)
            .map(|k| {
                let off = kpt_start + k * KPT_DIM;
                let p = scale_point([row[off], row[off + 1]], preprocess.scale, preprocess.padding);
                let [x, y] = clip_point(p, preprocess.orig_shape);
                [x, y, row[off + 2]]
            })
            .collect();

        if best.as_ref().is_none_or(|b| best_score > b.score) {
            best = Some(Candidate {
                bbox: [x1, y1, x2, y2],
                score: best_score,
                keypoints,
            });
        }
    }

    let best = best?;

    let (orig_h, orig_w) = preprocess.orig_shape;
    let (orig_h, orig_w) = (orig_h as f32, orig_w as f32);
    let rows: Vec<[f32; 3]> = best
        .keypoints
        .iter()
        .map(|[x, y, conf]| [x / orig_w, y / orig_h, *conf])
        .collect();

    Some(PersonDetection {
        bbox: best.bbox,
        score: best.score,
        landmarks: PoseLandmarks::from_rows(&rows)?,
    })
}

/// Reshape the raw output into `[anchors, features]`.
fn to_rows(output: &[f32], output_shape: &[usize], expected_features: usize) -> Option<Array2<f32>> {
    let dims: Vec<usize> = output_shape.iter().copied().filter(|&d| d != 1).collect();
    let (a, b) = match dims.as_slice() {
        [a, b] => (*a, *b),
        _ => return None,
    };
    if output.len() != a * b {
        return None;
    }

    let channel_first = a == expected_features || (a < b && a >= 4 + KPT_FEATURES);
    let (features, arr) = if channel_first {
        let arr = Array2::from_shape_vec((a, b), output.to_vec()).ok()?;
        (a, arr.t().to_owned())
    } else {
        (b, Array2::from_shape_vec((a, b), output.to_vec()).ok()?)
    };

    if features < 4 + 1 + KPT_FEATURES {
        tracing::warn!(features, "pose output has too few features");
        return None;
    }
    Some(arr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::Keypoint;

    const NUM_FEATURES: usize = 56;
    const NUM_PREDS: usize = 100;

    fn preprocess() -> PreprocessResult {
        PreprocessResult {
            tensor: ndarray::Array4::zeros((1, 3, 640, 640)),
            orig_shape: (640, 640),
            scale: (1.0, 1.0),
            padding: (0.0, 0.0),
        }
    }

    /// Write one anchor into a channel-first `[56, NUM_PREDS]` buffer.
    fn put_anchor(output: &mut [f32], idx: usize, center: (f32, f32), score: f32, kpt: (f32, f32, f32)) {
        let set = |output: &mut [f32], feature: usize, v: f32| output[idx + NUM_PREDS * feature] = v;
        set(output, 0, center.0);
        set(output, 1, center.1);
        set(output, 2, 50.0);
        set(output, 3, 50.0);
        set(output, 4, score);
        for k in 0..NUM_KEYPOINTS {
            let offset = 5 + k * 3;
            set(output, offset, kpt.0);
            set(output, offset + 1, kpt.1);
            set(output, offset + 2, kpt.2);
        }
    }

    #[test]
    fn test_postprocess_pose_logic() {
        let mut output = vec![0.0; NUM_PREDS * NUM_FEATURES];
        put_anchor(&mut output, 0, (100.0, 100.0), 0.9, (320.0, 160.0, 0.8));

        let person = postprocess_pose(
            &output,
            &[1, NUM_FEATURES, NUM_PREDS],
            &preprocess(),
            &InferenceConfig::default(),
            1,
        )
        .unwrap();

        assert!((person.score - 0.9).abs() < 1e-6);
        assert_eq!(person.bbox, [75.0, 75.0, 125.0, 125.0]);
        let knee = person.landmarks.get(Keypoint::LeftKnee);
        assert!((knee.x - 0.5).abs() < 1e-6);
        assert!((knee.y - 0.25).abs() < 1e-6);
        assert!((knee.visibility - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_postprocess_pose_picks_highest_score() {
        let mut output = vec![0.0; NUM_PREDS * NUM_FEATURES];
        put_anchor(&mut output, 0, (100.0, 100.0), 0.6, (10.0, 10.0, 0.5));
        put_anchor(&mut output, 1, (400.0, 400.0), 0.95, (400.0, 400.0, 0.9));

        let person = postprocess_pose(
            &output,
            &[1, NUM_FEATURES, NUM_PREDS],
            &preprocess(),
            &InferenceConfig::default(),
            1,
        )
        .unwrap();
        assert!((person.score - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_postprocess_pose_overlapping_people_keep_best() {
        let mut output = vec![0.0; NUM_PREDS * NUM_FEATURES];
        put_anchor(&mut output, 0, (100.0, 100.0), 0.7, (10.0, 10.0, 0.5));
        put_anchor(&mut output, 1, (102.0, 102.0), 0.85, (20.0, 20.0, 0.5));
        put_anchor(&mut output, 2, (104.0, 104.0), 0.85, (30.0, 30.0, 0.5));

        let person = postprocess_pose(
            &output,
            &[1, NUM_FEATURES, NUM_PREDS],
            &preprocess(),
            &InferenceConfig::default(),
            1,
        )
        .unwrap();
        assert!((person.score - 0.85).abs() < 1e-6);
        assert_eq!(person.bbox, [77.0, 77.0, 127.0, 127.0]);
    }

    #[test]
    fn test_postprocess_pose_below_threshold() {
        let mut output = vec![0.0; NUM_PREDS * NUM_FEATURES];
        put_anchor(&mut output, 0, (100.0, 100.0), 0.2, (10.0, 10.0, 0.5));

        let person = postprocess_pose(
            &output,
            &[1, NUM_FEATURES, NUM_PREDS],
            &preprocess(),
            &InferenceConfig::default(),
            1,
        );
        assert!(person.is_none());
    }

    #[test]
    fn test_postprocess_pose_transposed() {
        let mut channel_first = vec![0.0; NUM_PREDS * NUM_FEATURES];
        put_anchor(&mut channel_first, 3, (200.0, 200.0), 0.7, (64.0, 64.0, 0.6));

        let mut transposed = vec![0.0; NUM_PREDS * NUM_FEATURES];
        for f in 0..NUM_FEATURES {
            for p in 0..NUM_PREDS {
                transposed[p * NUM_FEATURES + f] = channel_first[f * NUM_PREDS + p];
            }
        }

        let person = postprocess_pose(
            &transposed,
            &[1, NUM_PREDS, NUM_FEATURES],
            &preprocess(),
            &InferenceConfig::default(),
            1,
        )
        .unwrap();
        assert!((person.landmarks.get(Keypoint::Nose).x - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_postprocess_pose_bad_shape() {
        let output = vec![0.0; 10];
        assert!(postprocess_pose(&output, &[1, 2, 3, 4], &preprocess(), &InferenceConfig::default(), 1).is_none());
        assert!(postprocess_pose(&output, &[1, 2, 5], &preprocess(), &InferenceConfig::default(), 1).is_none());
    }
}
