// gradient.rs — Sobel gradients for edge extraction.
//
// Sobel kernels are separable:
//   Sobel_x: row [-1, 0, 1] (derivative), col [1, 2, 1] (smoothing)
//   Sobel_y: row [ 1, 2, 1] (smoothing),  col [-1, 0, 1] (derivative)
//
// Border handling (clamp/replicate) is inherited from convolution.rs.

use crate::convolution::convolve_separable;
use crate::image::{Image, Pixel};

const SOBEL_DERIV: [f32; 3] = [-1.0, 0.0, 1.0];
const SOBEL_SMOOTH: [f32; 3] = [1.0, 2.0, 1.0];

/// Horizontal gradient Ix. Positive where intensity increases rightward.
/// Unnormalized (range roughly [-1020, 1020] for u8 input).
pub fn sobel_x<T: Pixel>(src: &Image<T>) -> Image<f32> {
    convolve_separable(src, &SOBEL_DERIV, &SOBEL_SMOOTH)
}

/// Vertical gradient Iy. Positive where intensity increases downward.
pub fn sobel_y<T: Pixel>(src: &Image<T>) -> Image<f32> {
    convolve_separable(src, &SOBEL_SMOOTH, &SOBEL_DERIV)
}

/// Both gradients at once; Canny always needs both.
pub fn sobel_xy<T: Pixel>(src: &Image<T>) -> (Image<f32>, Image<f32>) {
    (sobel_x(src), sobel_y(src))
}
