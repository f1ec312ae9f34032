// detector.rs — top-level circle detection entry points.
//
// Ties the stages together: validate the configuration, plan radius
// batches from the backend's memory ceiling, size the backend's buffer
// slots, drive the double-buffered pipeline, and aggregate every
// batch's masks onto the caller's canvas.

use std::time::Duration;

use image::RgbImage;

use crate::config::HoughConfig;
use crate::cpu::CpuBackend;
use crate::error::HoughError;
use crate::gpu::device::GpuDevice;
use crate::gpu::exec::GpuBackend;
use crate::image::Image;
use crate::pipeline::{BatchTiming, HoughBackend, HoughPipeline};
use crate::planner::BatchPlanner;
use crate::raster::{self, Detection};

/// Outcome of one detection run.
#[derive(Debug, Clone)]
pub struct DetectionReport {
    /// Every detection, in batch order (ascending radius overall).
    pub detections: Vec<Detection>,
    /// Per-batch timings, in batch order.
    pub timings: Vec<BatchTiming>,
    /// Total pipeline wall clock.
    pub total: Duration,
}

/// Detect circles on the GPU.
///
/// The annotated circles are drawn onto `canvas`, which must match the
/// edge map's dimensions (it is normally the image the edges came from).
pub fn detect_circles_gpu(
    gpu: &GpuDevice,
    config: &HoughConfig,
    edge: &Image<u8>,
    canvas: &mut RgbImage,
) -> Result<DetectionReport, HoughError> {
    config.validate()?;
    check_canvas(edge, canvas)?;
    let planner =
        BatchPlanner::from_config(config, gpu.max_memory_allocation(), edge.width(), edge.height())?;
    let mut backend = GpuBackend::new(gpu, edge, config, planner.max_batch_count())?;
    run_pipeline(&mut backend, planner, config, edge, canvas)
}

/// Detect circles on the CPU reference backend.
///
/// `memory_ceiling` plays the role of the device allocation limit and
/// controls the batch split exactly as on the GPU.
pub fn detect_circles_cpu(
    config: &HoughConfig,
    edge: &Image<u8>,
    canvas: &mut RgbImage,
    memory_ceiling: u64,
) -> Result<DetectionReport, HoughError> {
    config.validate()?;
    check_canvas(edge, canvas)?;
    let planner = BatchPlanner::from_config(config, memory_ceiling, edge.width(), edge.height())?;
    let mut backend = CpuBackend::new(
        edge,
        config.sensitivity,
        config.radius_tolerance,
        planner.max_batch_count(),
    );
    run_pipeline(&mut backend, planner, config, edge, canvas)
}

fn check_canvas(edge: &Image<u8>, canvas: &RgbImage) -> Result<(), HoughError> {
    if canvas.width() as usize != edge.width() || canvas.height() as usize != edge.height() {
        return Err(HoughError::Configuration(format!(
            "canvas {}×{} does not match edge map {}×{}",
            canvas.width(),
            canvas.height(),
            edge.width(),
            edge.height(),
        )));
    }
    Ok(())
}

fn run_pipeline<B: HoughBackend>(
    backend: &mut B,
    planner: BatchPlanner,
    config: &HoughConfig,
    edge: &Image<u8>,
    canvas: &mut RgbImage,
) -> Result<DetectionReport, HoughError> {
    let (w, h) = (edge.width(), edge.height());
    let mut pipeline = HoughPipeline::new(config.profile);
    let mut detections = Vec::new();
    pipeline.run(backend, planner, |batch, planes| {
        detections.extend(raster::aggregate(batch, planes, w, h, canvas));
    })?;
    Ok(DetectionReport {
        detections,
        timings: pipeline.timings().to_vec(),
        total: pipeline.total(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canvas_size_mismatch_is_configuration_error() {
        let edge = Image::<u8>::new(32, 32);
        let mut canvas = RgbImage::new(16, 16);
        let err = detect_circles_cpu(&HoughConfig::default(), &edge, &mut canvas, u64::MAX)
            .unwrap_err();
        assert!(matches!(err, HoughError::Configuration(_)));
    }

    #[test]
    fn blank_edge_map_yields_no_detections() {
        let edge = Image::<u8>::new(48, 48);
        let mut canvas = RgbImage::new(48, 48);
        let mut config = HoughConfig::default();
        config.min_radius = 5;
        config.max_radius = 10;
        let report = detect_circles_cpu(&config, &edge, &mut canvas, u64::MAX).unwrap();
        assert!(report.detections.is_empty());
        assert!(canvas.pixels().all(|px| px.0 == [0, 0, 0]));
        assert_eq!(report.timings.len(), 1);
    }

    #[test]
    fn invalid_config_fails_before_planning() {
        let edge = Image::<u8>::new(32, 32);
        let mut canvas = RgbImage::new(32, 32);
        let mut config = HoughConfig::default();
        config.sensitivity = 2.0;
        let err = detect_circles_cpu(&config, &edge, &mut canvas, u64::MAX).unwrap_err();
        assert!(matches!(err, HoughError::Configuration(_)));
    }
}
