// raster.rs — result aggregation and circle rasterization.
//
// Consumes one batch's mask planes at a time: scans them for nonzero
// cells (ascending radius, row-major within a plane, so the draw order
// is deterministic for a fixed batch) and draws a midpoint-circle
// outline per detection onto the shared output image. Detections are
// ephemeral — produced, drawn, and returned only for reporting.

use image::{Rgb, RgbImage};

use crate::planner::RadiusBatch;

/// Outline color for detected circles.
pub const DETECTION_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// One detected circle: a nonzero cell in a radius plane's mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub x: u32,
    pub y: u32,
    pub radius: u32,
}

/// Scan a batch's mask planes for detections.
///
/// `planes` is plane-major (`batch.count * width * height` words).
/// Output order: ascending radius, then row-major — deterministic for a
/// fixed batch, so overlapping-circle pixel colors are reproducible.
pub fn collect_detections(
    batch: RadiusBatch,
    planes: &[u32],
    width: usize,
    height: usize,
) -> Vec<Detection> {
    debug_assert_eq!(planes.len(), batch.count as usize * width * height);
    let mut out = Vec::new();
    for plane in 0..batch.count {
        let radius = batch.plane_radius(plane);
        let base = plane as usize * width * height;
        for (i, &m) in planes[base..base + width * height].iter().enumerate() {
            if m != 0 {
                out.push(Detection {
                    x: (i % width) as u32,
                    y: (i / width) as u32,
                    radius,
                });
            }
        }
    }
    out
}

/// Draw a one-pixel circle outline with the midpoint algorithm.
/// Points falling outside the image are skipped.
pub fn draw_circle(image: &mut RgbImage, cx: i64, cy: i64, radius: u32, color: Rgb<u8>) {
    let w = image.width() as i64;
    let h = image.height() as i64;
    let mut plot = |x: i64, y: i64| {
        if x >= 0 && y >= 0 && x < w && y < h {
            image.put_pixel(x as u32, y as u32, color);
        }
    };

    if radius == 0 {
        plot(cx, cy);
        return;
    }

    let mut x = radius as i64;
    let mut y = 0i64;
    let mut err = 1 - x;
    while x >= y {
        plot(cx + x, cy + y);
        plot(cx + y, cy + x);
        plot(cx - y, cy + x);
        plot(cx - x, cy + y);
        plot(cx - x, cy - y);
        plot(cx - y, cy - x);
        plot(cx + y, cy - x);
        plot(cx + x, cy - y);
        y += 1;
        if err < 0 {
            err += 2 * y + 1;
        } else {
            x -= 1;
            err += 2 * (y - x) + 1;
        }
    }
}

/// Aggregate one batch: collect its detections and draw them onto
/// `image`. Returns the detections for reporting.
pub fn aggregate(
    batch: RadiusBatch,
    planes: &[u32],
    width: usize,
    height: usize,
    image: &mut RgbImage,
) -> Vec<Detection> {
    let detections = collect_detections(batch, planes, width, height);
    for d in &detections {
        draw_circle(image, d.x as i64, d.y as i64, d.radius, DETECTION_COLOR);
    }
    detections
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(start: u32, count: u32) -> RadiusBatch {
        RadiusBatch { start_radius: start, count, step: 1 }
    }

    #[test]
    fn collects_in_radius_then_row_major_order() {
        let (w, h) = (4usize, 3usize);
        let b = batch(7, 2);
        let mut planes = vec![0u32; 2 * w * h];
        planes[1 * w + 2] = 1; // plane 0 (radius 7), (2, 1)
        planes[w * h + 0] = 1; // plane 1 (radius 8), (0, 0)
        planes[w * h + 2 * w + 3] = 1; // plane 1, (3, 2)

        let dets = collect_detections(b, &planes, w, h);
        assert_eq!(
            dets,
            vec![
                Detection { x: 2, y: 1, radius: 7 },
                Detection { x: 0, y: 0, radius: 8 },
                Detection { x: 3, y: 2, radius: 8 },
            ]
        );
    }

    #[test]
    fn circle_outline_is_on_the_circle() {
        let mut img = RgbImage::new(41, 41);
        draw_circle(&mut img, 20, 20, 10, DETECTION_COLOR);

        let mut count = 0;
        for (x, y, px) in img.enumerate_pixels() {
            if px.0 != [0, 0, 0] {
                count += 1;
                let dx = x as f32 - 20.0;
                let dy = y as f32 - 20.0;
                let d = (dx * dx + dy * dy).sqrt();
                assert!(
                    (d - 10.0).abs() < 0.75,
                    "outline pixel ({x},{y}) lies at distance {d}"
                );
            }
        }
        // A radius-10 midpoint circle has on the order of 2πr pixels.
        assert!((40..=72).contains(&count), "unexpected outline size {count}");
    }

    #[test]
    fn circle_clips_at_image_border() {
        let mut img = RgbImage::new(10, 10);
        // Center outside the canvas; only an arc should appear, no panic.
        draw_circle(&mut img, -3, 5, 6, DETECTION_COLOR);
        assert!(img.enumerate_pixels().any(|(_, _, px)| px.0 != [0, 0, 0]));
    }

    #[test]
    fn aggregation_is_idempotent() {
        let (w, h) = (32usize, 32usize);
        let b = batch(6, 2);
        let mut planes = vec![0u32; 2 * w * h];
        planes[16 * w + 16] = 1;
        planes[w * h + 10 * w + 20] = 1;

        let base = RgbImage::from_pixel(w as u32, h as u32, Rgb([30, 30, 30]));

        let mut once = base.clone();
        aggregate(b, &planes, w, h, &mut once);

        let mut twice = base.clone();
        aggregate(b, &planes, w, h, &mut twice);
        aggregate(b, &planes, w, h, &mut twice);

        assert_eq!(once.as_raw(), twice.as_raw(), "double aggregation changed pixels");
    }

    #[test]
    fn zero_radius_detection_marks_single_pixel() {
        let mut img = RgbImage::new(5, 5);
        draw_circle(&mut img, 2, 2, 0, DETECTION_COLOR);
        let lit: Vec<_> = img
            .enumerate_pixels()
            .filter(|(_, _, px)| px.0 != [0, 0, 0])
            .map(|(x, y, _)| (x, y))
            .collect();
        assert_eq!(lit, vec![(2, 2)]);
    }
}
