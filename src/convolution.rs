// convolution.rs — separable 1D convolution for Image<T>.
//
// A 2D convolution with a separable kernel decomposes into a horizontal
// and a vertical 1D pass, O(2k) per pixel instead of O(k²). Used by the
// Gaussian blur in the edge extraction stage.
//
// BORDER HANDLING: clamp (replicate edge pixels). Out-of-bounds sample
// indices are clamped to the nearest valid pixel.

use crate::image::{Image, Pixel};

/// Build a normalized 1D Gaussian kernel of length `2 * radius + 1`.
///
/// # Panics
/// Panics if `sigma <= 0`.
pub fn gaussian_kernel_1d(radius: usize, sigma: f32) -> Vec<f32> {
    assert!(sigma > 0.0, "sigma must be positive (got {sigma})");
    let mut kernel = Vec::with_capacity(2 * radius + 1);
    let denom = 2.0 * sigma * sigma;
    for i in 0..(2 * radius + 1) {
        let d = i as f32 - radius as f32;
        kernel.push((-d * d / denom).exp());
    }
    let sum: f32 = kernel.iter().sum();
    for k in &mut kernel {
        *k /= sum;
    }
    kernel
}

/// Convolve each row of `src` with a centered 1D kernel.
///
/// # Panics
/// Panics if the kernel is empty or of even length.
pub fn convolve_rows<T: Pixel>(src: &Image<T>, kernel: &[f32]) -> Image<f32> {
    assert!(!kernel.is_empty(), "kernel must not be empty");
    assert!(kernel.len() % 2 == 1, "kernel length must be odd (got {})", kernel.len());

    let w = src.width();
    let h = src.height();
    let half = (kernel.len() / 2) as isize;
    let mut dst = Image::<f32>::new(w, h);

    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for (ki, &kv) in kernel.iter().enumerate() {
                let sx = (x as isize + ki as isize - half).clamp(0, (w - 1) as isize);
                acc += src.get(sx as usize, y).to_f32() * kv;
            }
            dst.set(x, y, acc);
        }
    }
    dst
}

/// Convolve each column of `src` with a centered 1D kernel.
///
/// # Panics
/// Panics if the kernel is empty or of even length.
pub fn convolve_cols(src: &Image<f32>, kernel: &[f32]) -> Image<f32> {
    assert!(!kernel.is_empty(), "kernel must not be empty");
    assert!(kernel.len() % 2 == 1, "kernel length must be odd (got {})", kernel.len());

    let w = src.width();
    let h = src.height();
    let half = (kernel.len() / 2) as isize;
    let mut dst = Image::<f32>::new(w, h);

    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for (ki, &kv) in kernel.iter().enumerate() {
                let sy = (y as isize + ki as isize - half).clamp(0, (h - 1) as isize);
                acc += src.get(x, sy as usize) * kv;
            }
            dst.set(x, y, acc);
        }
    }
    dst
}

/// Full separable convolution: horizontal pass with `kernel_row`, then
/// vertical pass with `kernel_col`.
pub fn convolve_separable<T: Pixel>(
    src: &Image<T>,
    kernel_row: &[f32],
    kernel_col: &[f32],
) -> Image<f32> {
    let tmp = convolve_rows(src, kernel_row);
    convolve_cols(&tmp, kernel_col)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaussian_kernel_is_normalized_and_symmetric() {
        let k = gaussian_kernel_1d(2, 1.4);
        assert_eq!(k.len(), 5);
        let sum: f32 = k.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5, "kernel sum {sum}");
        assert!((k[0] - k[4]).abs() < 1e-6);
        assert!((k[1] - k[3]).abs() < 1e-6);
        assert!(k[2] > k[1] && k[1] > k[0]);
    }

    #[test]
    fn identity_kernel_preserves_image() {
        let data: Vec<u8> = (0..20).collect();
        let img = Image::from_vec(5, 4, data);
        let out = convolve_separable(&img, &[1.0], &[1.0]);
        for (x, y, v) in img.pixels() {
            assert!((out.get(x, y) - v as f32).abs() < 1e-6);
        }
    }

    #[test]
    fn blur_preserves_mean() {
        // The kernel sums to 1, so the average intensity should barely
        // move (clamp borders pull edge pixels toward the edge value).
        let mut img: Image<u8> = Image::new(32, 32);
        for y in 0..32 {
            for x in 0..32 {
                img.set(x, y, ((x * 7 + y * 13) % 256) as u8);
            }
        }
        let n = (img.width() * img.height()) as f32;
        let mean_before: f32 = img.pixels().map(|(_, _, v)| v as f32).sum::<f32>() / n;

        let k = gaussian_kernel_1d(2, 1.4);
        let blurred = convolve_separable(&img, &k, &k);
        let mean_after: f32 = blurred.pixels().map(|(_, _, v)| v).sum::<f32>() / n;

        assert!(
            (mean_before - mean_after).abs() < 2.0,
            "mean shifted too much: {mean_before} → {mean_after}"
        );
    }

    #[test]
    fn constant_image_is_fixed_point() {
        let img = Image::<u8>::from_vec(9, 9, vec![77u8; 81]);
        let k = gaussian_kernel_1d(2, 1.0);
        let out = convolve_separable(&img, &k, &k);
        for (_, _, v) in out.pixels() {
            assert!((v - 77.0).abs() < 1e-3);
        }
    }
}
