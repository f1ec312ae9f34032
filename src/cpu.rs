// cpu.rs — CPU reference backend.
//
// The authoritative implementation of the vote and threshold kernels:
// the WGSL in shaders/hough.wgsl mirrors these loops operation for
// operation, and the GPU backend is validated against this one. Also
// serves as the software fallback when no usable adapter exists, and as
// the deterministic backend for tests that must run without a GPU.
//
// Execution is synchronous — every dispatch completes before it
// returns — but the backend still mints and checks pipeline events so
// the orchestrator's hazard rule is exercised identically on both
// backends.

use std::f32::consts::PI;

use crate::error::HoughError;
use crate::image::Image;
use crate::pipeline::{HoughBackend, PipelineEvent, Slot};
use crate::planner::RadiusBatch;

// ---------------------------------------------------------------------------
// Kernel semantics (shared with the WGSL implementation)
// ---------------------------------------------------------------------------

/// Vote threshold for one radius plane: `2π·r·sensitivity`, truncated,
/// floored at 1 so a zero threshold can never mark every cell.
#[inline]
pub fn vote_threshold(radius: u32, sensitivity: f32) -> u32 {
    ((2.0 * PI * radius as f32 * sensitivity) as u32).max(1)
}

/// Annulus band test: does a cell at squared distance `d2` from an edge
/// pixel receive a vote for `radius` with the given band half-width?
///
/// The band is `(r - tol - 0.5)² < d² <= (r + tol + 0.5)²`. For tiny
/// radii the inner bound goes negative and the band collapses to the
/// full disk, matching the reference kernel's small-radius handling.
#[inline]
pub fn in_vote_band(d2: f32, radius: u32, tolerance: u32) -> bool {
    let r = radius as f32;
    let tol = tolerance as f32;
    let inner = r - tol - 0.5;
    // Non-positive inner bound admits distance 0 (the pixel itself).
    let lo = if inner > 0.0 { inner * inner } else { -1.0 };
    let hi = (r + tol + 0.5) * (r + tol + 0.5);
    d2 > lo && d2 <= hi
}

/// Accumulate votes for every plane of `batch` into `accum`
/// (plane-major, `count * w * h` words, pre-zeroed).
///
/// For each nonzero edge pixel, every cell whose distance lies in the
/// annulus band around the plane's radius gains one vote. Parallel over
/// pixels × planes on the GPU; plain loops here.
pub fn cast_votes(edge: &Image<u8>, accum: &mut [u32], batch: RadiusBatch, tolerance: u32) {
    let w = edge.width();
    let h = edge.height();
    debug_assert_eq!(accum.len(), batch.count as usize * w * h);

    for (ex, ey, v) in edge.pixels() {
        if v == 0 {
            continue;
        }
        for plane in 0..batch.count {
            let radius = batch.plane_radius(plane);
            let reach = (radius + tolerance) as isize + 1;
            let base = plane as usize * w * h;
            let y_lo = (ey as isize - reach).max(0) as usize;
            let y_hi = (ey as isize + reach).min(h as isize - 1) as usize;
            let x_lo = (ex as isize - reach).max(0) as usize;
            let x_hi = (ex as isize + reach).min(w as isize - 1) as usize;
            for cy in y_lo..=y_hi {
                let dy = cy as isize - ey as isize;
                for cx in x_lo..=x_hi {
                    let dx = cx as isize - ex as isize;
                    let d2 = (dx * dx + dy * dy) as f32;
                    if in_vote_band(d2, radius, tolerance) {
                        accum[base + cy * w + cx] += 1;
                    }
                }
            }
        }
    }
}

/// Threshold every plane of `batch`: `masks[cell] = 1` iff the cell's
/// votes reach the plane's threshold and the cell lies at least
/// `radius + tolerance` from every image border (a circle centered
/// closer than that would leave the image).
pub fn threshold_planes(
    accum: &[u32],
    masks: &mut [u32],
    batch: RadiusBatch,
    width: usize,
    height: usize,
    sensitivity: f32,
    tolerance: u32,
) {
    debug_assert_eq!(accum.len(), masks.len());
    for plane in 0..batch.count {
        let radius = batch.plane_radius(plane);
        let threshold = vote_threshold(radius, sensitivity);
        let margin = (radius + tolerance) as usize;
        let base = plane as usize * width * height;
        for y in 0..height {
            for x in 0..width {
                let idx = base + y * width + x;
                let inside = x >= margin
                    && y >= margin
                    && x + margin < width
                    && y + margin < height;
                masks[idx] = u32::from(inside && accum[idx] >= threshold);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

struct CpuSlot {
    accum: Vec<u32>,
    masks: Vec<u32>,
}

/// Software backend over host memory.
pub struct CpuBackend {
    edge: Image<u8>,
    sensitivity: f32,
    tolerance: u32,
    slots: [CpuSlot; 2],
    /// Ticket of the last minted event.
    next_ticket: u64,
    /// All tickets up to and including this one have completed. With
    /// synchronous execution this always equals `next_ticket`, but the
    /// checks in `dispatch`/`read_masks` keep the event discipline
    /// honest across backends.
    completed: u64,
}

impl CpuBackend {
    /// Allocate a backend with slots sized for `max_batch_count` planes.
    pub fn new(edge: &Image<u8>, sensitivity: f32, tolerance: u32, max_batch_count: u32) -> Self {
        let plane_words = edge.width() * edge.height();
        let words = max_batch_count as usize * plane_words;
        let slot = || CpuSlot { accum: vec![0; words], masks: vec![0; words] };
        CpuBackend {
            edge: edge.clone(),
            sensitivity,
            tolerance,
            slots: [slot(), slot()],
            next_ticket: 0,
            completed: 0,
        }
    }

    fn check_complete(&self, event: PipelineEvent, what: &str) -> Result<(), HoughError> {
        if event.ticket() > self.completed {
            return Err(HoughError::DeviceExecution(format!(
                "{what} gated on event {} which has not completed (latest {})",
                event.ticket(),
                self.completed,
            )));
        }
        Ok(())
    }
}

impl HoughBackend for CpuBackend {
    fn zero_slot(&mut self, slot: Slot) -> Result<(), HoughError> {
        let s = &mut self.slots[slot.index()];
        s.accum.fill(0);
        s.masks.fill(0);
        Ok(())
    }

    fn dispatch(
        &mut self,
        batch: RadiusBatch,
        slot: Slot,
        wait_on: Option<PipelineEvent>,
    ) -> Result<PipelineEvent, HoughError> {
        if let Some(ev) = wait_on {
            self.check_complete(ev, "dispatch")?;
        }

        let w = self.edge.width();
        let h = self.edge.height();
        let words = batch.count as usize * w * h;
        let s = &mut self.slots[slot.index()];
        if words > s.accum.len() {
            return Err(HoughError::DeviceExecution(format!(
                "batch of {} planes exceeds slot capacity of {} planes",
                batch.count,
                s.accum.len() / (w * h),
            )));
        }

        // Clear → vote → threshold, the same stage chain the GPU encodes.
        s.accum[..words].fill(0);
        cast_votes(&self.edge, &mut s.accum[..words], batch, self.tolerance);
        threshold_planes(
            &s.accum[..words],
            &mut s.masks[..words],
            batch,
            w,
            h,
            self.sensitivity,
            self.tolerance,
        );

        self.next_ticket += 1;
        self.completed = self.next_ticket;
        Ok(PipelineEvent::new(self.next_ticket))
    }

    fn read_masks(
        &mut self,
        slot: Slot,
        batch: RadiusBatch,
        gate: PipelineEvent,
    ) -> Result<Vec<u32>, HoughError> {
        self.check_complete(gate, "readback")?;
        let words = batch.count as usize * self.edge.width() * self.edge.height();
        Ok(self.slots[slot.index()].masks[..words].to_vec())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
