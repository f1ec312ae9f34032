// config.rs — detection parameters.
//
// Values only: how the numbers get here (config file, CLI, hard-coding
// in a demo) is the caller's business. `validate()` applies the checks
// the pipeline relies on, so every entry point can fail fast with a
// `Configuration` error before any device work starts.

use crate::error::HoughError;

/// Parameters for one circle detection run.
#[derive(Debug, Clone)]
pub struct HoughConfig {
    /// Smallest candidate radius, in pixels. Inclusive.
    pub min_radius: u32,
    /// Largest candidate radius, in pixels. Inclusive.
    pub max_radius: u32,
    /// Spacing between candidate radii.
    pub radius_step: u32,
    /// Vote threshold as a fraction of the circle circumference, in
    /// (0, 1]. A cell detects when it collects at least
    /// `2π·radius·sensitivity` votes.
    pub sensitivity: f32,
    /// Half-width of the voting annulus, in pixels. Each edge pixel votes
    /// for every cell whose distance lies within `radius ± tolerance`.
    /// 0 votes along the one-pixel-wide circle only.
    pub radius_tolerance: u32,
    /// Canny hysteresis thresholds on the Sobel gradient magnitude.
    pub canny_low: f32,
    pub canny_high: f32,
    /// Extra divisor applied to the device memory ceiling when sizing
    /// radius batches. The planner already accounts for both buffer kinds
    /// and both double-buffer slots; this is headroom on top of that for
    /// drivers that over-report their limits.
    pub headroom_divisor: u64,
    /// Emit per-batch timing lines to stderr.
    pub profile: bool,
    /// Show the annotated result in a window (honored by the demo, not
    /// the library).
    pub visualize: bool,
}

impl Default for HoughConfig {
    fn default() -> Self {
        HoughConfig {
            min_radius: 10,
            max_radius: 100,
            radius_step: 1,
            sensitivity: 0.8,
            radius_tolerance: 1,
            canny_low: 100.0,
            canny_high: 200.0,
            headroom_divisor: 1,
            profile: false,
            visualize: false,
        }
    }
}

impl HoughConfig {
    /// Check parameter ranges. Called by every detection entry point.
    pub fn validate(&self) -> Result<(), HoughError> {
        if self.radius_step == 0 {
            return Err(HoughError::Configuration("radius_step must be >= 1".into()));
        }
        if self.min_radius == 0 {
            return Err(HoughError::Configuration("min_radius must be >= 1".into()));
        }
        if self.max_radius < self.min_radius {
            return Err(HoughError::Configuration(format!(
                "radius range is empty: min {} > max {}",
                self.min_radius, self.max_radius
            )));
        }
        if !(self.sensitivity > 0.0 && self.sensitivity <= 1.0) {
            return Err(HoughError::Configuration(format!(
                "sensitivity must lie in (0, 1], got {}",
                self.sensitivity
            )));
        }
        if self.headroom_divisor == 0 {
            return Err(HoughError::Configuration(
                "headroom_divisor must be >= 1".into(),
            ));
        }
        if self.canny_low > self.canny_high {
            return Err(HoughError::Configuration(format!(
                "canny_low {} exceeds canny_high {}",
                self.canny_low, self.canny_high
            )));
        }
        Ok(())
    }

    /// Number of candidate radii in the search range.
    pub fn radius_count(&self) -> u32 {
        (self.max_radius - self.min_radius) / self.radius_step + 1
    }
}

/// Device selection flags.
#[derive(Debug, Clone, Copy)]
pub struct DeviceConfig {
    /// Index into the enumerated adapter list (after the prefer-GPU
    /// reordering). 0 picks the best available adapter.
    pub adapter_index: usize,
    /// Try hardware adapters before software rasterizers. With `false`
    /// the adapters are taken in enumeration order.
    pub prefer_gpu: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig { adapter_index: 0, prefer_gpu: true }
    }
}
