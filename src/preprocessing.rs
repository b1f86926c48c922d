// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Frame preprocessing for pose inference.
//!
//! Frames are letterboxed into the model input size (aspect ratio preserved,
//! gray padding), normalized to `[0, 1]`, and laid out as an NCHW tensor.

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use fast_image_resize::images::Image;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::{DynamicImage, GenericImageView, RgbImage};
use ndarray::Array4;

use crate::error::{PostureError, Result};

/// Default letterbox padding color (gray).
pub const LETTERBOX_COLOR: [u8; 3] = [114, 114, 114];

/// A letterboxed frame ready for the model, plus the transform needed to map
/// model-space coordinates back onto the original frame.
#[derive(Debug, Clone)]
pub struct PreprocessResult {
    /// Image tensor in NCHW format, normalized to `[0, 1]`.
    pub tensor: Array4<f32>,
    /// Original image dimensions (height, width).
    pub orig_shape: (u32, u32),
    /// Scale factors applied (`scale_y`, `scale_x`).
    pub scale: (f32, f32),
    /// Padding applied (`pad_top`, `pad_left`).
    pub padding: (f32, f32),
}

/// Letterbox geometry for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    new_width: u32,
    new_height: u32,
    pad_left: u32,
    pad_top: u32,
    scale: (f32, f32),
}

/// Preprocess a frame for pose inference.
///
/// # Arguments
///
/// * `image` - Input frame.
/// * `target_size` - Model input size as (height, width).
///
/// # Errors
///
/// Returns an `ImageError` if the frame is empty or cannot be resized.
pub fn preprocess_image(image: &DynamicImage, target_size: (usize, usize)) -> Result<PreprocessResult> {
    let (orig_width, orig_height) = image.dimensions();
    if orig_width == 0 || orig_height == 0 {
        return Err(PostureError::ImageError("Frame has zero size".to_string()));
    }

    let lb = calculate_letterbox_params(orig_width, orig_height, target_size);
    let resized = resize_rgb(&image.to_rgb8(), lb.new_width, lb.new_height)?;

    let (dst_h, dst_w) = target_size;
    let mut canvas = RgbImage::from_pixel(dst_w as u32, dst_h as u32, image::Rgb(LETTERBOX_COLOR));
    image::imageops::replace(
        &mut canvas,
        &resized,
        i64::from(lb.pad_left),
        i64::from(lb.pad_top),
    );

    Ok(PreprocessResult {
        tensor: image_to_tensor(&canvas),
        orig_shape: (orig_height, orig_width),
        scale: lb.scale,
        padding: (lb.pad_top as f32, lb.pad_left as f32),
    })
}

/// Bilinear resize with `fast_image_resize`.
fn resize_rgb(src: &RgbImage, width: u32, height: u32) -> Result<RgbImage> {
    let (src_w, src_h) = src.dimensions();
    if (src_w, src_h) == (width, height) {
        return Ok(src.clone());
    }

    let src_image = Image::from_vec_u8(src_w, src_h, src.as_raw().clone(), PixelType::U8x3)
        .map_err(|e| PostureError::ImageError(format!("Failed to wrap frame: {e}")))?;
    let mut dst_image = Image::new(width.max(1), height.max(1), PixelType::U8x3);

    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
    Resizer::new()
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| PostureError::ImageError(format!("Failed to resize frame: {e}")))?;

    RgbImage::from_raw(width.max(1), height.max(1), dst_image.into_vec())
        .ok_or_else(|| PostureError::ImageError("Resized buffer has wrong size".to_string()))
}

/// Compute the scaled size and centered padding that fit the frame inside `target_size`.
fn calculate_letterbox_params(orig_width: u32, orig_height: u32, target_size: (usize, usize)) -> Letterbox {
    let (target_h, target_w) = (target_size.0 as f32, target_size.1 as f32);
    let (orig_h, orig_w) = (orig_height as f32, orig_width as f32);

    let scale = (target_h / orig_h).min(target_w / orig_w);

    let new_width = ((orig_w * scale).round() as u32).max(1);
    let new_height = ((orig_h * scale).round() as u32).max(1);

    let pad_left = (target_size.1 as u32).saturating_sub(new_width) / 2;
    let pad_top = (target_size.0 as u32).saturating_sub(new_height) / 2;

    Letterbox {
        new_width,
        new_height,
        pad_left,
        pad_top,
        scale: (new_height as f32 / orig_h, new_width as f32 / orig_w),
    }
}

/// Convert an RGB image to a normalized NCHW tensor.
fn image_to_tensor(image: &RgbImage) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);

    let mut tensor = Array4::zeros((1, 3, h, w));
    for (x, y, pixel) in image.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            tensor[[0, c, y, x]] = f32::from(pixel[c]) / 255.0;
        }
    }
    tensor
}

/// Map a model-space point back onto the original frame.
///
/// # Arguments
///
/// * `point` - `[x, y]` in letterboxed model space.
/// * `scale` - Scale factors (`scale_y`, `scale_x`) from preprocessing.
/// * `padding` - Padding (`pad_top`, `pad_left`) from preprocessing.
#[must_use]
pub fn scale_point(point: [f32; 2], scale: (f32, f32), padding: (f32, f32)) -> [f32; 2] {
    let (scale_y, scale_x) = scale;
    let (pad_top, pad_left) = padding;
    [(point[0] - pad_left) / scale_x, (point[1] - pad_top) / scale_y]
}

/// Map a model-space box `[x1, y1, x2, y2]` back onto the original frame.
#[must_use]
pub fn scale_coords(coords: &[f32; 4], scale: (f32, f32), padding: (f32, f32)) -> [f32; 4] {
    let [x1, y1] = scale_point([coords[0], coords[1]], scale, padding);
    let [x2, y2] = scale_point([coords[2], coords[3]], scale, padding);
    [x1, y1, x2, y2]
}

/// Clamp a point to the frame bounds given as (height, width).
#[must_use]
pub const fn clip_point(point: [f32; 2], shape: (u32, u32)) -> [f32; 2] {
    let (h, w) = (shape.0 as f32, shape.1 as f32);
    [point[0].clamp(0.0, w), point[1].clamp(0.0, h)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_params_square() {
        let lb = calculate_letterbox_params(640, 640, (640, 640));
        assert_eq!((lb.new_width, lb.new_height), (640, 640));
        assert_eq!((lb.pad_left, lb.pad_top), (0, 0));
    }

    #[test]
    fn test_letterbox_params_wide() {
        let lb = calculate_letterbox_params(1280, 720, (640, 640));
        assert_eq!(lb.new_width, 640);
        assert_eq!(lb.new_height, 360);
        assert_eq!(lb.pad_left, 0);
        assert_eq!(lb.pad_top, 140);
    }

    #[test]
    fn test_preprocess_shape_and_padding() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 32, image::Rgb([255, 0, 0])));
        let result = preprocess_image(&img, (64, 64)).unwrap();

        assert_eq!(result.tensor.shape(), &[1, 3, 64, 64]);
        assert_eq!(result.orig_shape, (32, 64));
        assert_eq!(result.padding, (16.0, 0.0));

        // Padding row is gray, image row is red.
        assert!((result.tensor[[0, 0, 0, 0]] - 114.0 / 255.0).abs() < 1e-6);
        assert!((result.tensor[[0, 0, 32, 32]] - 1.0).abs() < 1e-6);
        assert!(result.tensor[[0, 1, 32, 32]].abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_rejects_empty_frame() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        assert!(preprocess_image(&img, (64, 64)).is_err());
    }

    #[test]
    fn test_scale_coords() {
        let scaled = scale_coords(&[100.0, 100.0, 200.0, 200.0], (1.0, 1.0), (10.0, 10.0));
        assert!((scaled[0] - 90.0).abs() < 1e-6);
        assert!((scaled[1] - 90.0).abs() < 1e-6);
        assert!((scaled[2] - 190.0).abs() < 1e-6);
        assert!((scaled[3] - 190.0).abs() < 1e-6);
    }

    #[test]
    fn test_scale_point_undoes_letterbox() {
        let p = scale_point([320.0, 320.0], (0.5, 0.5), (140.0, 0.0));
        assert!((p[0] - 640.0).abs() < 1e-4);
        assert!((p[1] - 360.0).abs() < 1e-4);
    }

    #[test]
    fn test_clip_point() {
        let clipped = clip_point([-10.0, 700.0], (480, 640));
        assert!(clipped[0].abs() < 1e-6);
        assert!((clipped[1] - 480.0).abs() < 1e-6);
    }
}
