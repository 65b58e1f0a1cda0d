// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing;

use crate::image_model::{Image, TargetSpec};

/// Converts `image` to 8 bits, mapping its minimum value to 0 and its
/// maximum value to 255. A constant image maps to all zeros.
pub fn to_gray_image(image: &Image) -> GrayImage {
    let (height, width) = image.dim();
    let min = image.iter().copied().fold(f64::INFINITY, f64::min);
    let max = image.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        let value = image[[y as usize, x as usize]];
        if range > 0.0 {
            Luma([((value - min) / range * 255.0).round() as u8])
        } else {
            Luma([0])
        }
    })
}

/// Renders `image` in grayscale with the outline of `target` drawn in red.
pub fn render_with_target_outline(image: &Image, target: &TargetSpec) -> RgbImage {
    let mut rendered = DynamicImage::ImageLuma8(to_gray_image(image)).into_rgb8();
    let (row, col) = target.position;
    drawing::draw_hollow_circle_mut(
        &mut rendered,
        (col.round() as i32, row.round() as i32),
        target.radius.round() as i32,
        Rgb::<u8>([255, 0, 0]));
    rendered
}

// mod tests.
