// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Posture overlays: skeleton, measured joint angles and a text panel with the
//! posture label and any bad-posture flags.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use ab_glyph::{FontArc, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_line_segment_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::landmarks::{Keypoint, NUM_KEYPOINTS, PoseLandmarks, SKELETON};
use crate::posture::FrameResult;

/// Assets URL for downloading fonts
const ASSETS_URL: &str = "https://github.com/ultralytics/assets/releases/download/v0.0.0";

/// Font used for the text panel.
pub const FONT_NAME: &str = "Arial.ttf";

/// Keypoints below this confidence are not drawn.
pub const KPT_DRAW_MIN: f32 = 0.5;

/// Ultralytics Pose Color Palette
pub const POSE_COLORS: [[u8; 3]; 20] = [
    [255, 128, 0],   // #ff8000
    [255, 153, 51],  // #ff9933
    [255, 178, 102], // #ffb266
    [230, 230, 0],   // #e6e600
    [255, 153, 255], // #ff99ff
    [153, 204, 255], // #99ccff
    [255, 102, 255], // #ff66ff
    [255, 51, 255],  // #ff33ff
    [102, 178, 255], // #66b2ff
    [51, 153, 255],  // #3399ff
    [255, 153, 153], // #ff9999
    [255, 102, 102], // #ff6666
    [255, 51, 51],   // #ff3333
    [153, 255, 153], // #99ff99
    [102, 255, 102], // #66ff66
    [51, 255, 51],   // #33ff33
    [0, 255, 0],     // #00ff00
    [0, 0, 255],     // #0000ff
    [255, 0, 0],     // #ff0000
    [255, 255, 255], // #ffffff
];

/// `POSE_COLORS` index per `SKELETON` limb: legs orange, torso and arms blue, face green.
pub const LIMB_COLOR_INDICES: [usize; 19] = [0, 0, 0, 0, 7, 7, 7, 9, 9, 9, 9, 9, 16, 16, 16, 16, 16, 16, 16];

/// `POSE_COLORS` index per keypoint.
pub const KPT_COLOR_INDICES: [usize; NUM_KEYPOINTS] = [16, 16, 16, 16, 16, 9, 9, 9, 9, 9, 9, 0, 0, 0, 0, 0, 0];

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const PANEL_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const GOOD_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BAD_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Find the next available run directory (analyze, analyze2, analyze3, etc.)
#[must_use]
pub fn find_next_run_dir(base: &str, prefix: &str) -> PathBuf {
    let base_path = Path::new(base);

    let first = base_path.join(prefix);
    if !first.exists() {
        return first;
    }

    (2..)
        .map(|i| base_path.join(format!("{prefix}{i}")))
        .find(|p| !p.exists())
        .unwrap_or(first)
}

/// Check if font exists locally or download it into the Ultralytics config dir.
pub fn check_font(font: &str) -> Option<PathBuf> {
    let font_name = Path::new(font).file_name()?.to_string_lossy();
    let config_dir = dirs::config_dir()?.join("Ultralytics");
    let font_path = config_dir.join(font_name.as_ref());

    if font_path.exists() {
        return Some(font_path);
    }

    if let Err(e) = fs::create_dir_all(&config_dir) {
        tracing::warn!(error = %e, "failed to create font directory");
        return None;
    }

    let url = format!("{ASSETS_URL}/{font_name}");
    tracing::info!(%url, path = %font_path.display(), "downloading font");

    let response = match ureq::get(&url).call() {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(%url, error = %e, "failed to download font");
            return None;
        }
    };

    let copied = File::create(&font_path).and_then(|mut file| {
        let mut reader = response.into_body().into_reader();
        io::copy(&mut reader, &mut file)
    });
    if let Err(e) = copied {
        tracing::warn!(error = %e, "failed to write font");
        let _ = fs::remove_file(&font_path);
        return None;
    }

    Some(font_path)
}

/// The overlay font, loaded (and downloaded if needed) once per process.
fn overlay_font() -> Option<&'static FontArc> {
    static FONT: OnceLock<Option<FontArc>> = OnceLock::new();
    FONT.get_or_init(|| {
        let data = fs::read(check_font(FONT_NAME)?).ok()?;
        FontArc::try_from_vec(data).ok()
    })
    .as_ref()
}

/// Draw the posture overlay for one classified frame.
///
/// Text is skipped if the font cannot be obtained.
#[must_use]
pub fn annotate_frame(image: &DynamicImage, landmarks: &PoseLandmarks, result: &FrameResult) -> DynamicImage {
    annotate_frame_with_font(image, landmarks, result, overlay_font())
}

/// [`annotate_frame`] with an explicit font; `None` draws only the skeleton.
#[must_use]
pub fn annotate_frame_with_font(
    image: &DynamicImage,
    landmarks: &PoseLandmarks,
    result: &FrameResult,
    font: Option<&FontArc>,
) -> DynamicImage {
    let mut img = image.to_rgb8();
    draw_skeleton(&mut img, landmarks);
    draw_measured_angles(&mut img, landmarks, result);
    if let Some(font) = font {
        draw_panel(&mut img, result, font);
    }
    DynamicImage::ImageRgb8(img)
}

#[allow(clippy::cast_precision_loss)]
fn to_pixels(landmarks: &PoseLandmarks, kpt: Keypoint, width: u32, height: u32) -> (f32, f32) {
    let p = landmarks.point(kpt);
    (p.x * width as f32, p.y * height as f32)
}

fn draw_thick_line(img: &mut RgbImage, a: (f32, f32), b: (f32, f32), color: Rgb<u8>, thickness: i32) {
    #[allow(clippy::cast_precision_loss)]
    for d in -(thickness / 2)..=(thickness / 2) {
        let o = d as f32;
        draw_line_segment_mut(img, (a.0 + o, a.1), (b.0 + o, b.1), color);
        draw_line_segment_mut(img, (a.0, a.1 + o), (b.0, b.1 + o), color);
    }
}

#[allow(clippy::cast_possible_truncation)]
fn draw_skeleton(img: &mut RgbImage, landmarks: &PoseLandmarks) {
    let (w, h) = img.dimensions();

    for (limb, &[a, b]) in SKELETON.iter().enumerate() {
        let (ka, kb) = (Keypoint::ALL[a], Keypoint::ALL[b]);
        if landmarks.visibility(ka) < KPT_DRAW_MIN || landmarks.visibility(kb) < KPT_DRAW_MIN {
            continue;
        }
        let color = Rgb(POSE_COLORS[LIMB_COLOR_INDICES[limb]]);
        draw_thick_line(img, to_pixels(landmarks, ka, w, h), to_pixels(landmarks, kb, w, h), color, 2);
    }

    for (kpt, landmark) in landmarks.iter() {
        if landmark.visibility < KPT_DRAW_MIN {
            continue;
        }
        let (x, y) = to_pixels(landmarks, kpt, w, h);
        let color = Rgb(POSE_COLORS[KPT_COLOR_INDICES[kpt.index()]]);
        draw_filled_circle_mut(img, (x.round() as i32, y.round() as i32), 4, color);
    }
}

/// Highlight the joint triples whose angles were reported.
fn draw_measured_angles(img: &mut RgbImage, landmarks: &PoseLandmarks, result: &FrameResult) {
    let (w, h) = img.dimensions();
    let color = if result.bad_posture { BAD_COLOR } else { GOOD_COLOR };

    let mut triples = vec![(Keypoint::LeftShoulder, Keypoint::LeftHip, Keypoint::LeftKnee)];
    if result.angles.neck_angle().is_some() {
        triples.push((Keypoint::LeftEar, Keypoint::LeftShoulder, Keypoint::LeftHip));
    }
    if let (Some(side), Some(_)) = (result.knee_side, result.angles.knee_angle()) {
        triples.push(side.joints());
    }

    for (a, b, c) in triples {
        let (pa, pb, pc) = (to_pixels(landmarks, a, w, h), to_pixels(landmarks, b, w, h), to_pixels(landmarks, c, w, h));
        draw_thick_line(img, pa, pb, color, 3);
        draw_thick_line(img, pb, pc, color, 3);
    }
}

fn panel_lines(result: &FrameResult) -> Vec<(String, Rgb<u8>)> {
    let fmt_angle = |v: Option<f32>| v.map_or_else(|| "n/a".to_string(), |a| format!("{a:.1}"));

    let mut lines = vec![(format!("Posture: {}", result.posture_type), TEXT_COLOR)];
    if let Some(knee) = result.angles.knee_angle() {
        lines.push((format!("Knee angle: {knee:.1}"), TEXT_COLOR));
    }
    lines.push((format!("Back angle: {}", fmt_angle(result.angles.back_angle())), TEXT_COLOR));
    if result.angles.neck_angle().is_some() {
        lines.push((format!("Neck angle: {}", fmt_angle(result.angles.neck_angle())), TEXT_COLOR));
    }
    for flag in &result.flags {
        lines.push((flag.to_string(), BAD_COLOR));
    }
    lines
}

#[allow(clippy::cast_possible_wrap, clippy::cast_precision_loss)]
fn draw_panel(img: &mut RgbImage, result: &FrameResult, font: &FontArc) {
    let scale = PxScale::from((img.height() as f32 / 30.0).clamp(14.0, 32.0));
    let lines = panel_lines(result);

    let mut y = 10i32;
    for (text, color) in &lines {
        let (tw, th) = text_size(scale, font, text);
        draw_filled_rect_mut(img, Rect::at(6, y - 2).of_size(tw + 8, th + 6), PANEL_COLOR);
        draw_text_mut(img, *color, 10, y, scale, font, text);
        y += th as i32 + 8;
    }
}
