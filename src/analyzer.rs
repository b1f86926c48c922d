// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Whole-video posture analysis.
//!
//! [`PostureAnalyzer`] walks the frames of a [`Source`] in order, asks a
//! [`PoseEstimator`] for the landmarks of each one, classifies the frames that
//! have a person, and tallies posture votes into a [`VideoAnalysis`].
//!
//! # Example
//!
//! ```no_run
//! use posture_analyzer::{PoseModel, PostureAnalyzer, Source};
//!
//! let model = PoseModel::load("yolo11n-pose.onnx")?;
//! let mut analyzer = PostureAnalyzer::new(model);
//! let analysis = analyzer.analyze_source(Source::from("squat.mp4"))?;
//! println!("dominant posture: {}", analysis.posture_type);
//! # Ok::<(), posture_analyzer::PostureError>(())
//! ```

use image::DynamicImage;
use serde::Serialize;

use crate::error::Result;
use crate::landmarks::PoseLandmarks;
use crate::posture::{FrameClassifier, FrameResult, PostureType};
use crate::source::{Source, SourceIterator, SourceMeta};

/// Anything that can find the landmarks of one person in a frame.
///
/// `Ok(None)` means no person was found; the frame is skipped without error.
pub trait PoseEstimator {
    /// Estimate the landmarks of the most prominent person in `frame`.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be processed.
    fn estimate(&mut self, frame: &DynamicImage) -> Result<Option<PoseLandmarks>>;
}

impl<E: PoseEstimator + ?Sized> PoseEstimator for Box<E> {
    fn estimate(&mut self, frame: &DynamicImage) -> Result<Option<PoseLandmarks>> {
        (**self).estimate(frame)
    }
}

impl<E: PoseEstimator + ?Sized> PoseEstimator for &mut E {
    fn estimate(&mut self, frame: &DynamicImage) -> Result<Option<PoseLandmarks>> {
        (**self).estimate(frame)
    }
}

/// Everything known about one decoded frame, handed to a [`FrameObserver`].
#[derive(Debug, Clone, Copy)]
pub struct FrameEvent<'a> {
    /// 1-based frame index.
    pub index: usize,
    /// The decoded frame.
    pub image: &'a DynamicImage,
    /// Source metadata for the frame.
    pub meta: &'a SourceMeta,
    /// Landmarks, when a person was found.
    pub landmarks: Option<&'a PoseLandmarks>,
    /// Classification, when a person was found.
    pub result: Option<&'a FrameResult>,
}

/// Receives every decoded frame during an analysis.
pub trait FrameObserver {
    /// Called once per decoded frame, in order.
    ///
    /// # Errors
    ///
    /// An error aborts the analysis.
    fn on_frame(&mut self, event: &FrameEvent<'_>) -> Result<()>;
}

impl<F> FrameObserver for F
where
    F: FnMut(&FrameEvent<'_>) -> Result<()>,
{
    fn on_frame(&mut self, event: &FrameEvent<'_>) -> Result<()> {
        self(event)
    }
}

/// Per-posture vote counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostureTally {
    counts: [usize; PostureType::PRECEDENCE.len()],
}

impl PostureTally {
    /// Empty tally: every posture at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counts: [0; PostureType::PRECEDENCE.len()],
        }
    }

    const fn slot(posture: PostureType) -> usize {
        match posture {
            PostureType::Squat => 0,
            PostureType::DeskSitting => 1,
        }
    }

    /// Add one vote.
    pub const fn record(&mut self, posture: PostureType) {
        self.counts[Self::slot(posture)] += 1;
    }

    /// Votes for `posture`.
    #[must_use]
    pub const fn count(&self, posture: PostureType) -> usize {
        self.counts[Self::slot(posture)]
    }

    /// Total votes.
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// The posture with the most votes. Ties go to the earlier entry of
    /// [`PostureType::PRECEDENCE`], so an empty tally yields `Squat`.
    #[must_use]
    pub fn dominant(&self) -> PostureType {
        let mut best = PostureType::PRECEDENCE[0];
        for posture in PostureType::PRECEDENCE {
            if self.count(posture) > self.count(best) {
                best = posture;
            }
        }
        best
    }

    /// `(posture, votes)` pairs in precedence order.
    pub fn iter(&self) -> impl Iterator<Item = (PostureType, usize)> + '_ {
        PostureType::PRECEDENCE.into_iter().map(|p| (p, self.count(p)))
    }
}

/// Outcome of analyzing a whole video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoAnalysis {
    /// Dominant posture across all detected frames.
    pub posture_type: PostureType,
    /// One entry per frame with landmarks, in frame order.
    pub frame_results: Vec<FrameResult>,
    /// Frames decoded from the source.
    pub total_frames: usize,
    /// Frames in which a person was found.
    pub detected_frames: usize,
    /// Detected frames with at least one flag.
    pub bad_posture_frames: usize,
    /// Per-posture votes behind `posture_type`.
    #[serde(skip)]
    pub tally: PostureTally,
}

impl VideoAnalysis {
    fn from_parts(tally: PostureTally, frame_results: Vec<FrameResult>, total_frames: usize) -> Self {
        Self {
            posture_type: tally.dominant(),
            detected_frames: frame_results.len(),
            bad_posture_frames: frame_results.iter().filter(|r| r.bad_posture).count(),
            frame_results,
            total_frames,
            tally,
        }
    }
}

/// Drives frame-by-frame classification over a source.
///
/// The analyzer owns its estimator; build one per video (or per request) so
/// that no model state is shared between analyses.
#[derive(Debug)]
pub struct PostureAnalyzer<E> {
    estimator: E,
    classifier: FrameClassifier,
}

impl<E: PoseEstimator> PostureAnalyzer<E> {
    /// Create an analyzer with the default thresholds.
    pub fn new(estimator: E) -> Self {
        Self {
            estimator,
            classifier: FrameClassifier::default(),
        }
    }

    /// Use a specific frame classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: FrameClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// The frame classifier in use.
    pub const fn classifier(&self) -> &FrameClassifier {
        &self.classifier
    }

    /// Give back the estimator.
    pub fn into_estimator(self) -> E {
        self.estimator
    }

    /// Open `source` and analyze all of its frames.
    ///
    /// # Errors
    ///
    /// Fails if the source cannot be opened. Per-frame failures are logged and
    /// skipped.
    pub fn analyze_source(&mut self, source: Source) -> Result<VideoAnalysis> {
        self.analyze_frames(SourceIterator::new(source)?, None)
    }

    /// Like [`analyze_source`](Self::analyze_source), calling `observer` on every frame.
    ///
    /// # Errors
    ///
    /// Fails if the source cannot be opened or the observer fails.
    pub fn analyze_source_with(
        &mut self,
        source: Source,
        observer: &mut dyn FrameObserver,
    ) -> Result<VideoAnalysis> {
        self.analyze_frames(SourceIterator::new(source)?, Some(observer))
    }

    /// Analyze an ordered stream of decoded frames.
    ///
    /// Every item consumes a 1-based frame index, including frames that fail
    /// to decode or to estimate; those are logged and skipped.
    ///
    /// # Errors
    ///
    /// Only observer failures abort the analysis.
    pub fn analyze_frames<I>(
        &mut self,
        frames: I,
        mut observer: Option<&mut dyn FrameObserver>,
    ) -> Result<VideoAnalysis>
    where
        I: IntoIterator<Item = Result<(DynamicImage, SourceMeta)>>,
    {
        let mut tally = PostureTally::new();
        let mut frame_results = Vec::new();
        let mut total_frames = 0;

        for (i, item) in frames.into_iter().enumerate() {
            let index = i + 1;
            total_frames = index;

            let (image, meta) = match item {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(frame = index, error = %e, "skipping undecodable frame");
                    continue;
                }
            };

            let landmarks = match self.estimator.estimate(&image) {
                Ok(landmarks) => landmarks,
                Err(e) => {
                    tracing::warn!(frame = index, error = %e, "pose estimation failed, skipping frame");
                    None
                }
            };

            let result = landmarks.as_ref().map(|pose| {
                let result = self.classifier.classify(index, pose);
                tracing::debug!(
                    frame = index,
                    posture = %result.posture_type,
                    knee = ?result.angles.knee_angle(),
                    back = ?result.angles.back_angle(),
                    neck = ?result.angles.neck_angle(),
                    bad_posture = result.bad_posture,
                    "classified frame"
                );
                result
            });

            if let Some(obs) = observer.as_deref_mut() {
                obs.on_frame(&FrameEvent {
                    index,
                    image: &image,
                    meta: &meta,
                    landmarks: landmarks.as_ref(),
                    result: result.as_ref(),
                })?;
            }

            if let Some(result) = result {
                tally.record(result.posture_type);
                frame_results.push(result);
            } else {
                tracing::trace!(frame = index, "no person in frame");
            }
        }

        let analysis = VideoAnalysis::from_parts(tally, frame_results, total_frames);
        tracing::info!(
            posture = %analysis.posture_type,
            total_frames = analysis.total_frames,
            detected_frames = analysis.detected_frames,
            bad_posture_frames = analysis.bad_posture_frames,
            "video analysis complete"
        );
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PostureError;
    use crate::landmarks::{Keypoint, Landmark};

    /// Returns scripted answers in order, then "no person".
    struct Scripted(std::vec::IntoIter<Result<Option<PoseLandmarks>>>);

    impl Scripted {
        fn new(answers: Vec<Result<Option<PoseLandmarks>>>) -> Self {
            Self(answers.into_iter())
        }
    }

    impl PoseEstimator for Scripted {
        fn estimate(&mut self, _frame: &DynamicImage) -> Result<Option<PoseLandmarks>> {
            self.0.next().unwrap_or(Ok(None))
        }
    }

    /// Upright, fully visible person: desk sitting with no flags.
    fn sitting() -> PoseLandmarks {
        PoseLandmarks::default()
            .with(Keypoint::LeftEar, Landmark::new(0.5, 0.1, 0.9))
            .with(Keypoint::LeftShoulder, Landmark::new(0.5, 0.2, 0.9))
            .with(Keypoint::LeftHip, Landmark::new(0.5, 0.5, 0.9))
            .with(Keypoint::LeftKnee, Landmark::new(0.5, 0.8, 0.9))
            .with(Keypoint::LeftAnkle, Landmark::new(0.5, 0.95, 0.9))
    }

    /// Knee bent to 90 degrees: squat.
    fn squatting() -> PoseLandmarks {
        PoseLandmarks::default()
            .with(Keypoint::LeftEar, Landmark::new(0.5, 0.1, 0.9))
            .with(Keypoint::LeftShoulder, Landmark::new(0.5, 0.2, 0.9))
            .with(Keypoint::LeftHip, Landmark::new(0.5, 0.5, 0.9))
            .with(Keypoint::LeftKnee, Landmark::new(0.8, 0.5, 0.9))
            .with(Keypoint::LeftAnkle, Landmark::new(0.8, 0.8, 0.9))
    }

    fn frames(n: usize) -> Vec<Result<(DynamicImage, SourceMeta)>> {
        (0..n)
            .map(|i| {
                let meta = SourceMeta {
                    frame_idx: i,
                    ..SourceMeta::default()
                };
                Ok((DynamicImage::new_rgb8(4, 4), meta))
            })
            .collect()
    }

    #[test]
    fn test_tally_dominant_and_ties() {
        let mut tally = PostureTally::new();
        assert_eq!(tally.dominant(), PostureType::Squat);

        tally.record(PostureType::DeskSitting);
        assert_eq!(tally.dominant(), PostureType::DeskSitting);

        tally.record(PostureType::Squat);
        assert_eq!(tally.dominant(), PostureType::Squat);
        assert_eq!(tally.total(), 2);
        assert_eq!(
            tally.iter().collect::<Vec<_>>(),
            vec![(PostureType::Squat, 1), (PostureType::DeskSitting, 1)]
        );
    }

    #[test]
    fn test_no_landmarks_anywhere() {
        let mut analyzer = PostureAnalyzer::new(Scripted::new(vec![]));
        let analysis = analyzer.analyze_frames(frames(5), None).unwrap();

        assert_eq!(analysis.posture_type, PostureType::Squat);
        assert!(analysis.frame_results.is_empty());
        assert_eq!(analysis.total_frames, 5);
        assert_eq!(analysis.detected_frames, 0);
    }

    #[test]
    fn test_majority_and_frame_indices() {
        let script = vec![
            Ok(Some(sitting())),
            Ok(None),
            Ok(Some(squatting())),
            Ok(Some(sitting())),
        ];
        let mut analyzer = PostureAnalyzer::new(Scripted::new(script));
        let analysis = analyzer.analyze_frames(frames(4), None).unwrap();

        assert_eq!(analysis.posture_type, PostureType::DeskSitting);
        let indices: Vec<usize> = analysis.frame_results.iter().map(|r| r.frame).collect();
        assert_eq!(indices, vec![1, 3, 4]);
        assert_eq!(analysis.frame_results[1].posture_type, PostureType::Squat);
        assert_eq!(analysis.detected_frames, 3);
    }

    #[test]
    fn test_estimator_error_is_skipped() {
        let script = vec![
            Err(PostureError::InferenceError("boom".to_string())),
            Ok(Some(squatting())),
        ];
        let mut analyzer = PostureAnalyzer::new(Scripted::new(script));
        let analysis = analyzer.analyze_frames(frames(2), None).unwrap();

        assert_eq!(analysis.frame_results.len(), 1);
        assert_eq!(analysis.frame_results[0].frame, 2);
        assert_eq!(analysis.total_frames, 2);
    }

    #[test]
    fn test_decode_error_consumes_index() {
        let mut input = frames(2);
        input.insert(0, Err(PostureError::VideoError("corrupt".to_string())));

        let mut analyzer = PostureAnalyzer::new(Scripted::new(vec![Ok(Some(sitting())), Ok(Some(sitting()))]));
        let analysis = analyzer.analyze_frames(input, None).unwrap();

        let indices: Vec<usize> = analysis.frame_results.iter().map(|r| r.frame).collect();
        assert_eq!(indices, vec![2, 3]);
    }

    #[test]
    fn test_observer_sees_every_frame() {
        let script = vec![Ok(Some(sitting())), Ok(None), Ok(Some(squatting()))];
        let mut analyzer = PostureAnalyzer::new(Scripted::new(script));

        let mut seen = Vec::new();
        let mut observer = |event: &FrameEvent<'_>| -> Result<()> {
            seen.push((event.index, event.result.map(|r| r.posture_type)));
            Ok(())
        };
        analyzer.analyze_frames(frames(3), Some(&mut observer)).unwrap();

        assert_eq!(
            seen,
            vec![
                (1, Some(PostureType::DeskSitting)),
                (2, None),
                (3, Some(PostureType::Squat)),
            ]
        );
    }

    #[test]
    fn test_observer_error_aborts() {
        let mut analyzer = PostureAnalyzer::new(Scripted::new(vec![]));
        let mut observer = |_: &FrameEvent<'_>| -> Result<()> {
            Err(PostureError::IoError("disk full".to_string()))
        };
        assert!(analyzer.analyze_frames(frames(1), Some(&mut observer)).is_err());
    }

    #[test]
    fn test_bad_posture_count() {
        // Knee at 90 degrees and back at 90 degrees: squat, back outside (100, 170).
        let mut analyzer = PostureAnalyzer::new(Scripted::new(vec![Ok(Some(squatting()))]));
        let analysis = analyzer.analyze_frames(frames(1), None).unwrap();
        let result = &analysis.frame_results[0];

        assert!(result.bad_posture);
        assert_eq!(result.bad_posture, !result.flags.is_empty());
        assert_eq!(analysis.bad_posture_frames, 1);
    }
}
