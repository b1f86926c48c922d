// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::PathBuf;

#[cfg(feature = "annotate")]
use crate::annotate::find_next_run_dir;
use crate::analyzer::{FrameEvent, FrameObserver, PostureAnalyzer, VideoAnalysis};
use crate::cli::args::AnalyzeArgs;
use crate::cli::logging::set_verbose;
use crate::error::{PostureError, Result};
#[cfg(feature = "annotate")]
use crate::io::AnnotatedOutput;
use crate::posture::{FrameResult, PostureAngles};
use crate::source::Source;
use crate::{InferenceConfig, PoseModel, VERSION};
use crate::{section, success, verbose, warn};

/// Prints one line per frame and forwards frames to the annotated output, if any.
struct ConsoleObserver {
    kind: &'static str,
    #[cfg(feature = "annotate")]
    output: Option<AnnotatedOutput>,
}

impl FrameObserver for ConsoleObserver {
    fn on_frame(&mut self, event: &FrameEvent<'_>) -> Result<()> {
        verbose!("{}", frame_line(self.kind, event));
        #[cfg(feature = "annotate")]
        if let Some(output) = &mut self.output {
            output.write(event)?;
        }
        Ok(())
    }
}

/// Run a posture analysis from the command line.
///
/// # Errors
///
/// Returns an error if the model cannot be loaded, the source cannot be
/// opened, or the annotated output or JSON file cannot be written.
pub fn run_analysis(args: &AnalyzeArgs) -> Result<VideoAnalysis> {
    set_verbose(args.verbose);

    let mut config = InferenceConfig::new().with_confidence(args.conf);
    if let Some(sz) = args.imgsz {
        config = config.with_imgsz(sz, sz);
    }
    config.validate()?;

    let model_path = crate::download::ensure_model(&args.model)?;
    let model = PoseModel::load_with_config(&model_path, config)?;

    let (h, w) = model.input_size();
    println!("Posture Analyzer {VERSION} 🚀 Rust ONNX");
    verbose!(
        "{} summary: {} keypoints, imgsz=({h}, {w}), conf={}",
        model.path().display(),
        model.metadata().kpt_shape.0,
        model.config().confidence_threshold
    );

    let source = Source::from(args.source.as_path());
    #[cfg_attr(not(feature = "annotate"), allow(unused_variables))]
    let save_dir = if args.save { Some(next_save_dir()?) } else { None };

    let mut observer = ConsoleObserver {
        kind: if source.is_video() { "video" } else { "image" },
        #[cfg(feature = "annotate")]
        output: save_dir
            .clone()
            .map(|dir| AnnotatedOutput::new(dir, source.is_video())),
    };

    let mut analyzer = PostureAnalyzer::new(model);
    let analysis = analyzer.analyze_source_with(source, &mut observer)?;

    #[cfg(feature = "annotate")]
    if let Some(output) = observer.output.take() {
        let written = output.frames_written();
        output.finish()?;
        if let Some(dir) = &save_dir {
            success!("{written} annotated frames saved to {}", dir.display());
        }
    }

    print_summary(&analysis);

    if let Some(path) = &args.json {
        write_json(&analysis, path)?;
        success!("Results written to {}", path.display());
    }

    Ok(analysis)
}

#[cfg(feature = "annotate")]
fn next_save_dir() -> Result<PathBuf> {
    let dir = find_next_run_dir("runs/posture", "analyze");
    std::fs::create_dir_all(&dir)
        .map_err(|e| PostureError::IoError(format!("Failed to create {}: {e}", dir.display())))?;
    Ok(dir)
}

#[cfg(not(feature = "annotate"))]
fn next_save_dir() -> Result<PathBuf> {
    Err(PostureError::FeatureNotEnabled(
        "--save requires the 'annotate' feature".to_string(),
    ))
}

fn write_json(analysis: &VideoAnalysis, path: &std::path::Path) -> Result<()> {
    let json = serde_json::to_string_pretty(analysis)
        .map_err(|e| PostureError::IoError(format!("Failed to serialize results: {e}")))?;
    std::fs::write(path, json)
        .map_err(|e| PostureError::IoError(format!("Failed to write {}: {e}", path.display())))
}

fn format_angle(angle: Option<f32>) -> String {
    angle.map_or_else(|| "n/a".to_string(), |a| format!("{a:.1}°"))
}

/// Angles of a classified frame, e.g. `knee 85.0°, back 120.0°`.
fn format_angles(result: &FrameResult) -> String {
    match result.angles {
        PostureAngles::Squat { knee_angle, back_angle } => {
            format!("knee {}, back {}", format_angle(knee_angle), format_angle(back_angle))
        }
        PostureAngles::DeskSitting { neck_angle, back_angle } => {
            format!("neck {}, back {}", format_angle(neck_angle), format_angle(back_angle))
        }
    }
}

fn frame_line(kind: &str, event: &FrameEvent<'_>) -> String {
    let total = event
        .meta
        .total_frames
        .map_or_else(|| "?".to_string(), |n| n.to_string());
    let prefix = format!("{kind} (frame {}/{total}) {}:", event.index, event.meta.path);

    match event.result {
        Some(result) if result.bad_posture => {
            let flags: Vec<String> = result.flags.iter().map(ToString::to_string).collect();
            format!(
                "{prefix} {}, {} ⚠️ {}",
                result.posture_type,
                format_angles(result),
                flags.join("; ")
            )
        }
        Some(result) => format!("{prefix} {}, {}", result.posture_type, format_angles(result)),
        None => format!("{prefix} no person"),
    }
}

fn print_summary(analysis: &VideoAnalysis) {
    section!("Summary");
    verbose!(
        "{} frames decoded, {} with a person, {} with bad posture",
        analysis.total_frames,
        analysis.detected_frames,
        analysis.bad_posture_frames
    );
    for (posture, votes) in analysis.tally.iter() {
        verbose!("  {posture}: {votes}");
    }
    if analysis.detected_frames == 0 {
        warn!("No person detected in any frame; defaulting to '{}'", analysis.posture_type);
    }
    success!("Dominant posture: {}", analysis.posture_type);
}
