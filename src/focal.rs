//! Focal point detection for smart cropping.
//!
//! The default "energy" algorithm walks a coarse grid over the image,
//! applies the Sobel kernel pair to luminance at each sampled pixel, and
//! keeps the location with the largest gradient magnitude. Edges and
//! high-contrast detail pull the crop toward themselves; flat sky does not.
//!
//! A "faces" algorithm is reserved in the configuration but has no
//! implementation, so it degrades to energy detection. Images too small to
//! fit the 3x3 kernel fall back to the geometric center.

use image::{DynamicImage, GrayImage};

/// Salient point in source pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocalPoint {
    pub x: u32,
    pub y: u32,
}

/// Pick the focal point for `image` using the configured algorithm name.
///
/// Unknown algorithm names (including the reserved `"faces"`) use energy
/// detection.
pub fn detect_focal_point(image: &DynamicImage, algorithm: &str) -> FocalPoint {
    match algorithm {
        "energy" => energy_point(image),
        _ => energy_point(image),
    }
}

/// Sobel gradient magnitude at `(x, y)`; caller guarantees a 1px margin.
fn pixel_energy(luma: &GrayImage, x: u32, y: u32) -> f64 {
    const SOBEL_X: [[i32; 3]; 3] = [[-1, 0, 1], [-2, 0, 2], [-1, 0, 1]];
    const SOBEL_Y: [[i32; 3]; 3] = [[-1, -2, -1], [0, 0, 0], [1, 2, 1]];

    let mut gx = 0i32;
    let mut gy = 0i32;
    for ky in 0..3u32 {
        for kx in 0..3u32 {
            let v = luma.get_pixel(x + kx - 1, y + ky - 1).0[0] as i32;
            gx += v * SOBEL_X[ky as usize][kx as usize];
            gy += v * SOBEL_Y[ky as usize][kx as usize];
        }
    }
    ((gx * gx + gy * gy) as f64).sqrt()
}

fn energy_point(image: &DynamicImage) -> FocalPoint {
    let width = image.width();
    let height = image.height();
    let center = FocalPoint {
        x: width / 2,
        y: height / 2,
    };
    if width < 3 || height < 3 {
        return center;
    }

    let luma = image.to_luma8();

    // Coarse sampling grid; stride scales with the image so large photos
    // stay cheap to analyze.
    let stride = (width.min(height) / 50).max(5);

    let mut best = center;
    let mut best_energy = 0.0f64;
    let mut y = 1;
    while y < height - 1 {
        let mut x = 1;
        while x < width - 1 {
            let energy = pixel_energy(&luma, x, y);
            if energy > best_energy {
                best_energy = energy;
                best = FocalPoint { x, y };
            }
            x += stride;
        }
        y += stride;
    }
    best
}
