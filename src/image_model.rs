// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Synthetic two-class image generator. A signal-absent image is a standard
//! normal background plus additive Gaussian noise; a signal-present image
//! additionally carries a filled disk of constant amplitude.

use log::debug;
use ndarray::{Array2, Zip};
use rand::Rng;
use rand_distr::StandardNormal;

/// One noisy realization of either class. Shape is (height, width), indexed
/// as `[[row, col]]`.
pub type Image = Array2<f64>;

/// Describes the disk-shaped target added to signal-present images.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TargetSpec {
    /// Disk center as (row, col). Need not be integral, and need not lie
    /// within the image.
    pub position: (f64, f64),

    /// Constant value added to every pixel within the disk.
    pub amplitude: f64,

    /// Disk radius in pixels. Pixels at exactly this distance from
    /// `position` are part of the disk.
    pub radius: f64,
}

impl Default for TargetSpec {
    fn default() -> Self {
        TargetSpec{position: (32.0, 32.0), amplitude: -1.5, radius: 8.0}
    }
}

/// Returns a `shape` sized mask that is true for every pixel (y, x) with
/// (x - col)^2 + (y - row)^2 <= radius^2, where `center` is (row, col).
///
/// Both the image generator and the signal-known-exactly template are built
/// from this mask, so the generated target and the template disk always
/// coincide.
///
/// # Panics
/// If `radius` is negative or NaN.
pub fn disk_mask(shape: (usize, usize), center: (f64, f64), radius: f64)
                 -> Array2<bool> {
    assert!(radius >= 0.0, "Disk radius must be non-negative, got {}", radius);
    let (row, col) = center;
    let radius_2 = radius * radius;
    Array2::from_shape_fn(shape, |(y, x)| {
        let dy = y as f64 - row;
        let dx = x as f64 - col;
        dx * dx + dy * dy <= radius_2
    })
}

/// Draws one image of the given `size` (height, width).
///
/// # Arguments
///   `size` - Image dimensions as (height, width). Both must be positive.
///
///   `target` - The disk to add. `None` yields a signal-absent image.
///
///   `noise_std` - Standard deviation of the zero-mean Gaussian noise that is
///   added on top of the unit-variance background. Zero disables the noise
///   term, leaving background (plus target) only.
///
///   `rng` - Source of the random draws. The background array is drawn in
///   full before the noise array, so two calls that start from the same RNG
///   state differ only by the target disk.
///
/// # Panics
/// On non-positive dimensions, negative or non-finite `noise_std`, or a
/// negative target radius.
pub fn generate_image<R: Rng + ?Sized>(size: (usize, usize),
                                       target: Option<&TargetSpec>,
                                       noise_std: f64,
                                       rng: &mut R) -> Image {
    let (height, width) = size;
    assert!(height > 0 && width > 0,
            "Image size must be positive, got HxW {}x{}", height, width);
    assert!(noise_std >= 0.0 && noise_std.is_finite(),
            "Noise standard deviation must be non-negative, got {}", noise_std);

    let mut image: Image =
        Array2::from_shape_fn(size, |_| rng.sample::<f64, _>(StandardNormal));

    if let Some(target) = target {
        let mask = disk_mask(size, target.position, target.radius);
        let mut target_pixels = 0;
        Zip::from(&mut image).and(&mask).for_each(|pixel, &inside| {
            if inside {
                *pixel += target.amplitude;
                target_pixels += 1;
            }
        });
        debug!("Added target {:?} to {} pixels", target, target_pixels);
    }

    for pixel in image.iter_mut() {
        *pixel += noise_std * rng.sample::<f64, _>(StandardNormal);
    }
    image
}

// mod tests.
