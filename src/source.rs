// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Frame sources for posture analysis.
//!
//! A [`Source`] names where frames come from: a video file, a single image, a
//! directory of extracted frames, or frames already in memory.
//! [`SourceIterator`] opens it eagerly and yields decoded frames in order.

use std::path::{Path, PathBuf};

use image::DynamicImage;

use crate::error::{PostureError, Result};

/// Video container extensions recognised when classifying a path.
pub const VIDEO_EXTENSIONS: [&str; 10] = [
    "mp4", "avi", "mov", "mkv", "wmv", "flv", "webm", "m4v", "mpeg", "mpg",
];

/// Image extensions recognised when classifying a path.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

/// Represents different input sources for analysis.
#[derive(Debug, Clone)]
pub enum Source {
    /// Path to a video file.
    Video(PathBuf),
    /// Path to an image file.
    Image(PathBuf),
    /// Directory of frame images, read in file-name order.
    Directory(PathBuf),
    /// Frames already decoded in memory.
    Frames(Vec<DynamicImage>),
}

impl Source {
    /// Check if this source is a video.
    #[must_use]
    pub const fn is_video(&self) -> bool {
        matches!(self, Self::Video(_))
    }

    /// Get the path if this source has one.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Video(p) | Self::Image(p) | Self::Directory(p) => Some(p),
            Self::Frames(_) => None,
        }
    }

    fn has_extension(path: &Path, extensions: &[&str]) -> bool {
        path.extension().is_some_and(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            extensions.contains(&ext.as_str())
        })
    }
}

/// Convert from a string path to Source.
///
/// Directories become [`Source::Directory`], known image extensions become
/// [`Source::Image`], everything else is treated as a video.
impl From<&str> for Source {
    fn from(s: &str) -> Self {
        Self::from(Path::new(s))
    }
}

impl From<String> for Source {
    fn from(s: String) -> Self {
        Self::from(Path::new(&s))
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Self::from(path.as_path())
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        if path.is_dir() {
            Self::Directory(path.to_path_buf())
        } else if Self::has_extension(path, &IMAGE_EXTENSIONS) {
            Self::Image(path.to_path_buf())
        } else {
            Self::Video(path.to_path_buf())
        }
    }
}

impl From<DynamicImage> for Source {
    fn from(img: DynamicImage) -> Self {
        Self::Frames(vec![img])
    }
}

impl From<Vec<DynamicImage>> for Source {
    fn from(frames: Vec<DynamicImage>) -> Self {
        Self::Frames(frames)
    }
}

/// Metadata about a source frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMeta {
    /// 0-based position of the frame in the source.
    pub frame_idx: usize,
    /// Total frames, when known up front.
    pub total_frames: Option<usize>,
    /// Source path or identifier.
    pub path: String,
    /// Frames per second (video sources only).
    pub fps: Option<f32>,
}

impl Default for SourceMeta {
    fn default() -> Self {
        Self {
            frame_idx: 0,
            total_frames: Some(1),
            path: String::new(),
            fps: None,
        }
    }
}

/// Iterator over the frames of a [`Source`].
pub struct SourceIterator {
    path: String,
    current_frame: usize,
    total_frames: Option<usize>,
    kind: Frames,
}

enum Frames {
    Images(Vec<PathBuf>),
    Memory(std::vec::IntoIter<DynamicImage>),
    #[cfg(feature = "video")]
    Video(Box<video_rs::decode::Decoder>),
}

impl SourceIterator {
    /// Open a source.
    ///
    /// Files and directories are checked and video containers are opened here,
    /// so an unusable source fails before any frame is processed.
    ///
    /// # Errors
    ///
    /// Returns an `InputError` if the source does not exist or cannot be
    /// decoded, and `FeatureNotEnabled` for videos when built without the
    /// `video` feature.
    pub fn new(source: Source) -> Result<Self> {
        let path = source
            .path()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();

        let (kind, total_frames) = match source {
            Source::Image(p) => {
                if !p.is_file() {
                    return Err(PostureError::InputError(format!("Image not found: {}", p.display())));
                }
                (Frames::Images(vec![p]), Some(1))
            }
            Source::Directory(dir) => {
                let paths = collect_images_from_dir(&dir)?;
                let n = paths.len();
                (Frames::Images(paths), Some(n))
            }
            Source::Frames(frames) => {
                let n = frames.len();
                (Frames::Memory(frames.into_iter()), Some(n))
            }
            Source::Video(p) => open_video(&p)?,
        };

        Ok(Self {
            path,
            current_frame: 0,
            total_frames,
            kind,
        })
    }

    /// Total frames, if known.
    #[must_use]
    pub const fn total_frames(&self) -> Option<usize> {
        self.total_frames
    }

    fn meta(&self, fps: Option<f32>) -> SourceMeta {
        SourceMeta {
            frame_idx: self.current_frame,
            total_frames: self.total_frames,
            path: self.path.clone(),
            fps,
        }
    }
}

#[cfg(feature = "video")]
fn open_video(path: &Path) -> Result<(Frames, Option<usize>)> {
    crate::io::init_video();

    if !path.is_file() {
        return Err(PostureError::InputError(format!("Video not found: {}", path.display())));
    }

    let decoder = video_rs::decode::Decoder::new(path).map_err(|e| {
        PostureError::InputError(format!("Cannot decode {} as video: {e}", path.display()))
    })?;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let total = decoder
        .duration()
        .ok()
        .map(|d| (d.as_secs_f64() * f64::from(decoder.frame_rate())).round() as usize);

    Ok((Frames::Video(Box::new(decoder)), total))
}

#[cfg(not(feature = "video"))]
fn open_video(path: &Path) -> Result<(Frames, Option<usize>)> {
    Err(PostureError::FeatureNotEnabled(format!(
        "Decoding {} requires the 'video' feature",
        path.display()
    )))
}

/// Collect image paths from a directory, sorted by name.
fn collect_images_from_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(PostureError::InputError(format!("Not a directory: {}", dir.display())));
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| Source::has_extension(path, &IMAGE_EXTENSIONS))
        .collect();

    paths.sort();
    Ok(paths)
}

impl Iterator for SourceIterator {
    type Item = Result<(DynamicImage, SourceMeta)>;

    fn next(&mut self) -> Option<Self::Item> {
        let base = self.meta(None);
        let item = match &mut self.kind {
            Frames::Images(paths) => {
                let path = paths.get(base.frame_idx)?;
                let meta = SourceMeta {
                    path: path.to_string_lossy().to_string(),
                    ..base
                };
                image::open(path)
                    .map(|img| (img, meta))
                    .map_err(|e| PostureError::ImageError(format!("Failed to load {}: {e}", path.display())))
            }
            Frames::Memory(frames) => Ok((frames.next()?, base)),
            #[cfg(feature = "video")]
            Frames::Video(decoder) => {
                let meta = SourceMeta {
                    fps: Some(decoder.frame_rate()),
                    ..base
                };
                match decoder.decode() {
                    Ok((_ts, frame)) => video_frame_to_image(&frame).map(|img| (img, meta)),
                    Err(e) if is_end_of_stream(&e) => return None,
                    Err(e) => {
                        tracing::warn!(
                            frame = self.current_frame + 1,
                            error = %e,
                            "video decoding failed, remaining frames are not analyzed"
                        );
                        return None;
                    }
                }
            }
        };

        self.current_frame += 1;
        Some(item)
    }
}

/// Whether a decoder error marks the regular end of the stream.
#[cfg(feature = "video")]
const fn is_end_of_stream(error: &video_rs::Error) -> bool {
    matches!(error, video_rs::Error::ReadExhausted | video_rs::Error::DecodeExhausted)
}

/// Convert a `video_rs` RGB frame to a `DynamicImage`.
#[cfg(feature = "video")]
fn video_frame_to_image(frame: &video_rs::Frame) -> Result<DynamicImage> {
    let (h, w, _) = frame.dim();
    let height =
        u32::try_from(h).map_err(|_| PostureError::VideoError("Frame height exceeds u32::MAX".to_string()))?;
    let width =
        u32::try_from(w).map_err(|_| PostureError::VideoError("Frame width exceeds u32::MAX".to_string()))?;

    let raw: Vec<u8> = frame.iter().copied().collect();
    image::RgbImage::from_raw(width, height, raw)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| PostureError::VideoError("Failed to create image from video frame".to_string()))
}
