// planner.rs — radius-batch scheduling under a device memory ceiling.
//
// The radius search range usually does not fit on the device in one go:
// every candidate radius needs a full W×H plane of u32 vote counters
// plus a same-sized output-mask plane, and the double-buffered pipeline
// keeps two live copies of each. The planner slices the range into
// contiguous batches whose plane count fits the ceiling, and hands them
// out lazily, in ascending radius order, gapless.

use crate::config::HoughConfig;
use crate::error::HoughError;

/// Bytes per accumulator/mask cell (u32 vote counters).
pub const BYTES_PER_COUNTER: u64 = 4;
/// Buffer kinds held per radius plane: accumulator + output mask.
pub const BUFFER_KINDS: u64 = 2;
/// Physical copies of each kind kept live by the double buffer.
pub const BUFFER_SLOTS: u64 = 2;
/// Dispatches index radius planes on the workgroup z axis, which the
/// device caps at 65535 workgroups per dimension.
pub const MAX_PLANES_PER_DISPATCH: u64 = 65_535;

/// A contiguous run of candidate radii processed as one dispatch.
///
/// Plane `i` of the batch covers radius `start_radius + i * step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadiusBatch {
    pub start_radius: u32,
    pub count: u32,
    pub step: u32,
}

impl RadiusBatch {
    /// Radius covered by accumulator plane `plane` of this batch.
    ///
    /// # Panics
    /// Panics if `plane >= count`.
    #[inline]
    pub fn plane_radius(&self, plane: u32) -> u32 {
        assert!(plane < self.count, "plane {plane} out of range for batch of {}", self.count);
        self.start_radius + plane * self.step
    }

    /// Largest radius in the batch.
    #[inline]
    pub fn last_radius(&self) -> u32 {
        self.start_radius + (self.count - 1) * self.step
    }

    /// Iterate the batch's radii in ascending order.
    pub fn radii(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.count).map(move |i| self.start_radius + i * self.step)
    }
}

/// Lazy batch generator over a radius search range.
///
/// Construct with [`BatchPlanner::new`] (or [`BatchPlanner::from_config`])
/// and drive as an `Iterator<Item = RadiusBatch>`. Batches are emitted
/// ascending; every radius in `[min_radius, max_radius]` at `step`
/// spacing appears in exactly one batch.
#[derive(Debug, Clone)]
pub struct BatchPlanner {
    next_radius: u32,
    remaining: u32,
    step: u32,
    max_batch_count: u32,
}

impl BatchPlanner {
    /// Plan batches for the given range and device memory ceiling.
    ///
    /// The per-radius footprint is
    /// `width * height * 4 bytes * 2 kinds * 2 slots`, i.e. all device
    /// memory a radius plane occupies across the double buffer.
    /// `headroom` divides the usable ceiling once more for drivers that
    /// over-report their allocation limit.
    ///
    /// # Errors
    /// `Configuration` when the range is empty or inverted, the step is
    /// zero, the image is empty, or a single radius plane does not fit
    /// under the ceiling.
    pub fn new(
        min_radius: u32,
        max_radius: u32,
        step: u32,
        ceiling: u64,
        width: usize,
        height: usize,
        headroom: u64,
    ) -> Result<Self, HoughError> {
        if step == 0 {
            return Err(HoughError::Configuration("radius step must be >= 1".into()));
        }
        if max_radius < min_radius {
            return Err(HoughError::Configuration(format!(
                "radius range is empty: min {min_radius} > max {max_radius}"
            )));
        }
        if width == 0 || height == 0 {
            return Err(HoughError::Configuration(format!(
                "cannot plan batches for an empty {width}×{height} image"
            )));
        }
        if headroom == 0 {
            return Err(HoughError::Configuration("headroom divisor must be >= 1".into()));
        }

        let bytes_per_radius =
            width as u64 * height as u64 * BYTES_PER_COUNTER * BUFFER_KINDS * BUFFER_SLOTS;
        let max_batch_count =
            (ceiling / (bytes_per_radius * headroom)).min(MAX_PLANES_PER_DISPATCH);
        if max_batch_count < 1 {
            return Err(HoughError::Configuration(format!(
                "device memory ceiling {ceiling} B cannot hold a single \
                 {width}×{height} radius plane ({bytes_per_radius} B across the double buffer)"
            )));
        }
        let max_batch_count = u32::try_from(max_batch_count).unwrap_or(u32::MAX);

        Ok(BatchPlanner {
            next_radius: min_radius,
            remaining: (max_radius - min_radius) / step + 1,
            step,
            max_batch_count,
        })
    }

    /// Plan from a validated [`HoughConfig`] and a device ceiling.
    pub fn from_config(
        config: &HoughConfig,
        ceiling: u64,
        width: usize,
        height: usize,
    ) -> Result<Self, HoughError> {
        Self::new(
            config.min_radius,
            config.max_radius,
            config.radius_step,
            ceiling,
            width,
            height,
            config.headroom_divisor,
        )
    }

    /// Largest batch size the planner will emit. Backends size their
    /// buffer slots from this.
    #[inline]
    pub fn max_batch_count(&self) -> u32 {
        self.max_batch_count.min(self.remaining.max(1))
    }

    /// Radii not yet handed out.
    #[inline]
    pub fn remaining_radii(&self) -> u32 {
        self.remaining
    }
}

impl Iterator for BatchPlanner {
    type Item = RadiusBatch;

    fn next(&mut self) -> Option<RadiusBatch> {
        if self.remaining == 0 {
            return None;
        }
        let count = self.remaining.min(self.max_batch_count);
        let batch = RadiusBatch {
            start_radius: self.next_radius,
            count,
            step: self.step,
        };
        self.remaining -= count;
        self.next_radius += count * self.step;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining.div_ceil(self.max_batch_count) as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for BatchPlanner {}

#[cfg(test)]
mod tests {
    use super::*;

    /// Ceiling that fits exactly `planes` W×H radius planes.
    fn ceiling_for(planes: u64, w: u64, h: u64) -> u64 {
        planes * w * h * BYTES_PER_COUNTER * BUFFER_KINDS * BUFFER_SLOTS
    }

    #[test]
    fn single_batch_when_range_fits() {
        let p = BatchPlanner::new(10, 20, 1, ceiling_for(64, 100, 100), 100, 100, 1).unwrap();
        let batches: Vec<_> = p.collect();
        assert_eq!(batches, vec![RadiusBatch { start_radius: 10, count: 11, step: 1 }]);
    }

    #[test]
    fn splits_into_ceiling_sized_batches_with_tail() {
        // 11 radii, 5 per batch → 5, 5, 1.
        let p = BatchPlanner::new(15, 25, 1, ceiling_for(5, 100, 100), 100, 100, 1).unwrap();
        assert_eq!(p.max_batch_count(), 5);
        let batches: Vec<_> = p.collect();
        assert_eq!(
            batches,
            vec![
                RadiusBatch { start_radius: 15, count: 5, step: 1 },
                RadiusBatch { start_radius: 20, count: 5, step: 1 },
                RadiusBatch { start_radius: 25, count: 1, step: 1 },
            ]
        );
    }

    #[test]
    fn stepped_range_stays_gapless() {
        let p = BatchPlanner::new(10, 30, 4, ceiling_for(2, 64, 64), 64, 64, 1).unwrap();
        let radii: Vec<u32> = p.flat_map(|b| b.radii().collect::<Vec<_>>()).collect();
        assert_eq!(radii, vec![10, 14, 18, 22, 26, 30]);
    }

    #[test]
    fn zero_capacity_is_configuration_error() {
        let bytes_per_radius = 100 * 100 * 4 * 4;
        let err = BatchPlanner::new(10, 20, 1, bytes_per_radius - 1, 100, 100, 1).unwrap_err();
        assert!(matches!(err, HoughError::Configuration(_)));
    }

    #[test]
    fn headroom_divides_capacity() {
        let c = ceiling_for(8, 100, 100);
        let p1 = BatchPlanner::new(1, 100, 1, c, 100, 100, 1).unwrap();
        let p2 = BatchPlanner::new(1, 100, 1, c, 100, 100, 2).unwrap();
        assert_eq!(p1.max_batch_count(), 8);
        assert_eq!(p2.max_batch_count(), 4);
    }

    #[test]
    fn empty_and_inverted_inputs_rejected() {
        assert!(BatchPlanner::new(20, 10, 1, u64::MAX, 10, 10, 1).is_err());
        assert!(BatchPlanner::new(10, 20, 0, u64::MAX, 10, 10, 1).is_err());
        assert!(BatchPlanner::new(10, 20, 1, u64::MAX, 0, 10, 1).is_err());
        assert!(BatchPlanner::new(10, 20, 1, u64::MAX, 10, 10, 0).is_err());
    }

    #[test]
    fn plane_radius_and_last_radius() {
        let b = RadiusBatch { start_radius: 15, count: 5, step: 2 };
        assert_eq!(b.plane_radius(0), 15);
        assert_eq!(b.plane_radius(4), 23);
        assert_eq!(b.last_radius(), 23);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn plane_radius_past_count_panics() {
        let b = RadiusBatch { start_radius: 15, count: 5, step: 2 };
        b.plane_radius(5);
    }
}
