// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Writing annotated analysis output: an MP4 for video sources, JPEG frames otherwise.

use std::path::{Path, PathBuf};

#[cfg(feature = "video")]
use video_rs::{Encoder, Time, encode::Settings as EncoderSettings};

#[cfg(feature = "annotate")]
use crate::analyzer::{FrameEvent, FrameObserver};
use crate::error::{PostureError, Result};

/// Frame rate used when the source does not report one.
pub const DEFAULT_FPS: f32 = 30.0;

#[cfg(feature = "video")]
static INIT: std::sync::Once = std::sync::Once::new();

/// Initialize `video-rs` (FFmpeg) once per process. Safe to call repeatedly.
pub fn init_video() {
    #[cfg(feature = "video")]
    INIT.call_once(|| {
        if let Err(e) = video_rs::init() {
            tracing::error!(error = %e, "failed to initialize video-rs");
        }
    });
}

/// H.264 MP4 writer on top of the `video-rs` encoder.
#[cfg(feature = "video")]
pub struct VideoWriter {
    encoder: Encoder,
    frame_duration: Time,
    position: Time,
    width: usize,
    height: usize,
}

#[cfg(feature = "video")]
impl VideoWriter {
    /// Create a writer for `width`x`height` frames at `fps`.
    ///
    /// # Errors
    ///
    /// Returns an error if the output directory or encoder cannot be created.
    pub fn new<P: AsRef<Path>>(path: P, width: usize, height: usize, fps: f32) -> Result<Self> {
        init_video();
        let output_path = path.as_ref();

        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PostureError::IoError(format!("Failed to create directory {}: {e}", parent.display()))
            })?;
        }

        let settings = EncoderSettings::preset_h264_yuv420p(width, height, false);
        let encoder = Encoder::new(output_path, settings)
            .map_err(|e| PostureError::VideoError(format!("Failed to create video encoder: {e}")))?;

        let fps = if fps.is_finite() && fps > 0.0 { fps } else { DEFAULT_FPS };

        Ok(Self {
            encoder,
            frame_duration: Time::from_secs_f64(1.0 / f64::from(fps)),
            position: Time::zero(),
            width,
            height,
        })
    }

    /// Encode one frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame size differs from the video size or encoding fails.
    pub fn write_frame(&mut self, frame: &image::DynamicImage) -> Result<()> {
        let rgb = frame.to_rgb8();
        let (width, height) = (rgb.width() as usize, rgb.height() as usize);

        if (width, height) != (self.width, self.height) {
            return Err(PostureError::VideoError(format!(
                "Frame dimensions {width}x{height} do not match video dimensions {}x{}",
                self.width, self.height
            )));
        }

        let frame_array = ndarray::Array3::from_shape_vec((height, width, 3), rgb.into_raw())
            .map_err(|e| PostureError::VideoError(e.to_string()))?;

        self.encoder
            .encode(&frame_array, self.position)
            .map_err(|e| PostureError::VideoError(format!("Failed to encode frame: {e}")))?;

        self.position = self.position.aligned_with(self.frame_duration).add();
        Ok(())
    }

    /// Flush and close the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the encoder fails to finish.
    pub fn finish(mut self) -> Result<()> {
        self.encoder
            .finish()
            .map_err(|e| PostureError::VideoError(format!("Failed to finish video encoding: {e}")))
    }
}

/// Saves every analyzed frame with its posture overlay.
///
/// Video sources become `<stem>.mp4` in the save directory (with the `video`
/// feature); anything else is written as numbered JPEGs.
#[cfg(feature = "annotate")]
pub struct AnnotatedOutput {
    save_dir: PathBuf,
    as_video: bool,
    frames_written: usize,
    #[cfg(feature = "video")]
    writer: Option<VideoWriter>,
}

#[cfg(feature = "annotate")]
impl AnnotatedOutput {
    /// Create an output rooted at `save_dir`.
    #[must_use]
    pub fn new(save_dir: PathBuf, source_is_video: bool) -> Self {
        Self {
            save_dir,
            as_video: cfg!(feature = "video") && source_is_video,
            frames_written: 0,
            #[cfg(feature = "video")]
            writer: None,
        }
    }

    /// Directory the output goes to.
    #[must_use]
    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    /// Frames written so far.
    #[must_use]
    pub const fn frames_written(&self) -> usize {
        self.frames_written
    }

    fn stem(meta_path: &str) -> String {
        Path::new(meta_path)
            .file_stem()
            .map_or_else(|| "frames".to_string(), |s| s.to_string_lossy().to_string())
    }

    /// Write one frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be annotated, encoded or saved.
    pub fn write(&mut self, event: &FrameEvent<'_>) -> Result<()> {
        let rendered = match (event.landmarks, event.result) {
            (Some(landmarks), Some(result)) => crate::annotate::annotate_frame(event.image, landmarks, result),
            _ => event.image.clone(),
        };

        if self.as_video {
            #[cfg(feature = "video")]
            {
                if self.writer.is_none() {
                    let path = self.save_dir.join(format!("{}.mp4", Self::stem(&event.meta.path)));
                    self.writer = Some(VideoWriter::new(
                        path,
                        rendered.width() as usize,
                        rendered.height() as usize,
                        event.meta.fps.unwrap_or(DEFAULT_FPS),
                    )?);
                }
                if let Some(writer) = &mut self.writer {
                    writer.write_frame(&rendered)?;
                }
            }
        } else {
            std::fs::create_dir_all(&self.save_dir).map_err(|e| {
                PostureError::IoError(format!("Failed to create {}: {e}", self.save_dir.display()))
            })?;
            let name = format!("{}_{:05}.jpg", Self::stem(&event.meta.path), event.index);
            rendered
                .to_rgb8()
                .save(self.save_dir.join(name))
                .map_err(|e| PostureError::IoError(format!("Failed to save frame {}: {e}", event.index)))?;
        }

        self.frames_written += 1;
        Ok(())
    }

    /// Close any open video file.
    ///
    /// # Errors
    ///
    /// Returns an error if the video writer fails to finish.
    pub fn finish(self) -> Result<()> {
        #[cfg(feature = "video")]
        if let Some(writer) = self.writer {
            writer.finish()?;
        }
        Ok(())
    }
}

#[cfg(feature = "annotate")]
impl FrameObserver for AnnotatedOutput {
    fn on_frame(&mut self, event: &FrameEvent<'_>) -> Result<()> {
        self.write(event)
    }
}
