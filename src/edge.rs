// edge.rs — edge map extraction (grayscale → blur → Canny).
//
// Produces the binary edge map the voting kernel consumes. Mirrors the
// preprocessing of the reference pipeline: 5-tap Gaussian blur with
// σ = 1.4, Sobel gradients, gradient-direction non-maximum suppression,
// then double-threshold hysteresis. Edge pixels are 255, everything
// else 0.

use image::RgbImage;

use crate::convolution::{convolve_separable, gaussian_kernel_1d};
use crate::error::HoughError;
use crate::gradient::sobel_xy;
use crate::image::Image;

/// Blur kernel constants used by the reference pipeline.
const BLUR_RADIUS: usize = 2; // 5-tap
const BLUR_SIGMA: f32 = 1.4;

/// Marker value for an edge pixel in the output map.
pub const EDGE_ON: u8 = 255;

/// Load an RGB image from disk.
///
/// # Errors
/// `Resource` if the file is missing, unreadable, or decodes to an
/// empty image.
pub fn load_image(path: &str) -> Result<RgbImage, HoughError> {
    let img = image::open(path)
        .map_err(|e| HoughError::Resource(format!("failed to load {path}: {e}")))?
        .to_rgb8();
    if img.width() == 0 || img.height() == 0 {
        return Err(HoughError::Resource(format!("{path} decoded to an empty image")));
    }
    Ok(img)
}

/// Convert an RGB image to a luma grayscale `Image<u8>`.
pub fn grayscale(rgb: &RgbImage) -> Image<u8> {
    let (w, h) = (rgb.width() as usize, rgb.height() as usize);
    let mut gray = Image::new(w, h);
    for (x, y, px) in rgb.enumerate_pixels() {
        // Rec. 601 luma weights.
        let l = 0.299 * px.0[0] as f32 + 0.587 * px.0[1] as f32 + 0.114 * px.0[2] as f32;
        gray.set(x as usize, y as usize, l.round().clamp(0.0, 255.0) as u8);
    }
    gray
}

/// Extract a binary edge map from a grayscale image.
///
/// `low` and `high` are the hysteresis thresholds on the Sobel gradient
/// magnitude: pixels at or above `high` seed edges, pixels at or above
/// `low` extend them (8-connected).
pub fn detect_edges(gray: &Image<u8>, low: f32, high: f32) -> Image<u8> {
    let w = gray.width();
    let h = gray.height();
    if w == 0 || h == 0 {
        return Image::new(w, h);
    }

    let k = gaussian_kernel_1d(BLUR_RADIUS, BLUR_SIGMA);
    let blurred = convolve_separable(gray, &k, &k);
    let (ix, iy) = sobel_xy(&blurred);

    let mut mag = Image::<f32>::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let gx = ix.get(x, y);
            let gy = iy.get(x, y);
            mag.set(x, y, (gx * gx + gy * gy).sqrt());
        }
    }

    let thinned = suppress_non_maxima(&mag, &ix, &iy);
    hysteresis(&thinned, low, high)
}

/// Keep only pixels that are local maxima along the gradient direction.
///
/// The gradient angle is quantized to four directions (0°, 45°, 90°,
/// 135°) and each pixel is compared against its two neighbors along
/// that direction. Border pixels are suppressed outright.
fn suppress_non_maxima(mag: &Image<f32>, ix: &Image<f32>, iy: &Image<f32>) -> Image<f32> {
    let w = mag.width();
    let h = mag.height();
    let mut out = Image::<f32>::new(w, h);
    if w < 3 || h < 3 {
        return out;
    }

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let m = mag.get(x, y);
            if m == 0.0 {
                continue;
            }
            let gx = ix.get(x, y);
            let gy = iy.get(x, y);
            // Quantize the gradient direction to one of four neighbor
            // axes. tan(22.5°) ≈ 0.4142 separates the sectors.
            let (dx, dy): (isize, isize) = if gx == 0.0 && gy == 0.0 {
                (1, 0)
            } else {
                let t = (gy / gx.abs().max(f32::MIN_POSITIVE)).abs();
                if t < 0.4142 {
                    (1, 0) // horizontal gradient
                } else if t > 2.4142 {
                    (0, 1) // vertical gradient
                } else if gx.signum() == gy.signum() {
                    (1, 1) // 45° diagonal
                } else {
                    (1, -1) // 135° diagonal
                }
            };
            let a = mag.get((x as isize + dx) as usize, (y as isize + dy) as usize);
            let b = mag.get((x as isize - dx) as usize, (y as isize - dy) as usize);
            if m >= a && m >= b {
                out.set(x, y, m);
            }
        }
    }
    out
}

/// Double threshold with hysteresis: magnitudes ≥ `high` are edges,
/// magnitudes in [`low`, `high`) become edges only when 8-connected to
/// one, transitively (flood fill from the strong seeds).
fn hysteresis(mag: &Image<f32>, low: f32, high: f32) -> Image<u8> {
    let w = mag.width();
    let h = mag.height();
    let mut out = Image::<u8>::new(w, h);
    let mut queue = Vec::new();

    for y in 0..h {
        for x in 0..w {
            if mag.get(x, y) >= high {
                out.set(x, y, EDGE_ON);
                queue.push((x, y));
            }
        }
    }

    while let Some((x, y)) = queue.pop() {
        for dy in -1isize..=1 {
            for dx in -1isize..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let nx = x as isize + dx;
                let ny = y as isize + dy;
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let (nx, ny) = (nx as usize, ny as usize);
                if out.get(nx, ny) == 0 && mag.get(nx, ny) >= low {
                    out.set(nx, ny, EDGE_ON);
                    queue.push((nx, ny));
                }
            }
        }
    }
    out
}
