// pipeline.rs — double-buffered batch pipeline orchestration.
//
// The orchestrator drives one asynchronous device command queue from a
// single host thread. Per batch it issues a paired dispatch (accumulator
// clear → vote → threshold) into the *current* buffer slot, then drains
// the *previous* slot (blocking mask readback + rasterization) while the
// device executes the new batch. Two physical slots serve the whole run;
// a role index flips between them each iteration.
//
// HAZARD RULE
// ────────────
// With two slots and an unbounded batch sequence, the slot receiving
// batch i last held batch i-2. Its host read finished during iteration
// i-1 (readback is synchronous), but the device-side write may not have:
// the dispatch into a slot therefore carries the slot's retained
// completion event as `wait_on`, and the backend must not start the vote
// kernel before that event completes. On a single in-order queue this is
// subsumed by submission order; the CPU and mock backends check it
// explicitly. Retained events live in the pool, one per slot, never in
// ambient synchronization state.

use std::fmt;
use std::time::{Duration, Instant};

use crate::error::HoughError;
use crate::planner::RadiusBatch;

// ---------------------------------------------------------------------------
// Events and slots
// ---------------------------------------------------------------------------

/// Opaque handle for the completion of an asynchronous device operation.
///
/// Backends mint one per dispatch (monotonic ticket) and resolve it to
/// their own notion of completion: the wgpu backend maps tickets to
/// `SubmissionIndex`, the CPU backend completes synchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineEvent {
    ticket: u64,
}

impl PipelineEvent {
    pub fn new(ticket: u64) -> Self {
        PipelineEvent { ticket }
    }

    pub fn ticket(&self) -> u64 {
        self.ticket
    }
}

/// One of the two physical buffer slots (accumulator + mask pair).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Slot::A => 0,
            Slot::B => 1,
        }
    }

    #[inline]
    pub fn other(self) -> Slot {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }
}

// ---------------------------------------------------------------------------
// Buffer pool (role tracker)
// ---------------------------------------------------------------------------

/// Current/previous role labels over the two slots, plus the retained
/// completion event of the last dispatch into each slot.
///
/// The physical device memory lives in the backend, addressed by
/// [`Slot`]; the pool owns only the labels, so `swap()` is an O(1) flip
/// that touches no memory.
#[derive(Debug)]
pub struct BufferPool {
    current: Slot,
    retained: [Option<PipelineEvent>; 2],
}

impl BufferPool {
    pub fn new() -> Self {
        BufferPool { current: Slot::A, retained: [None, None] }
    }

    #[inline]
    pub fn current(&self) -> Slot {
        self.current
    }

    #[inline]
    pub fn previous(&self) -> Slot {
        self.current.other()
    }

    /// Exchange the current/previous labels.
    #[inline]
    pub fn swap(&mut self) {
        self.current = self.current.other();
    }

    /// Record the completion event of the latest dispatch into `slot`.
    pub fn retain(&mut self, slot: Slot, event: PipelineEvent) {
        self.retained[slot.index()] = Some(event);
    }

    /// The retained event of `slot`, if any dispatch targeted it yet.
    pub fn retained(&self, slot: Slot) -> Option<PipelineEvent> {
        self.retained[slot.index()]
    }

    /// Remove and return the retained event of `slot`.
    pub fn take_retained(&mut self, slot: Slot) -> Option<PipelineEvent> {
        self.retained[slot.index()].take()
    }

    /// Back to the initial state: slot A current, no retained events.
    pub fn reset(&mut self) {
        *self = BufferPool::new();
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Backend contract
// ---------------------------------------------------------------------------

/// Compute backend driven by the pipeline: owns the two physical buffer
/// slots and executes the vote/threshold kernel pair.
///
/// All operations except `read_masks` are non-blocking from the host's
/// perspective; `read_masks` is the pipeline's only suspension point.
pub trait HoughBackend {
    /// Queue a device-side zero fill of both buffers of `slot`.
    fn zero_slot(&mut self, slot: Slot) -> Result<(), HoughError>;

    /// Queue the paired dispatch for `batch` into `slot`: accumulator
    /// clear, vote kernel, threshold kernel, chained so each stage reads
    /// only what the prior stage finished writing. Returns the
    /// completion event of the threshold stage.
    ///
    /// When `wait_on` is given, the clear/vote must not begin until that
    /// event has completed (cross-batch ordering on a reused slot).
    fn dispatch(
        &mut self,
        batch: RadiusBatch,
        slot: Slot,
        wait_on: Option<PipelineEvent>,
    ) -> Result<PipelineEvent, HoughError>;

    /// Blocking copy of the first `batch.count` mask planes of `slot`
    /// to host memory, gated on `gate` (the slot's retained dispatch
    /// event). Returns `batch.count * width * height` words, plane-major.
    fn read_masks(
        &mut self,
        slot: Slot,
        batch: RadiusBatch,
        gate: PipelineEvent,
    ) -> Result<Vec<u32>, HoughError>;
}

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Wall-clock timings for one batch. Observational only — never feeds
/// back into scheduling.
#[derive(Debug, Clone, Copy)]
pub struct BatchTiming {
    pub batch: RadiusBatch,
    /// Host time spent encoding and submitting the dispatch.
    pub dispatch: Duration,
    /// Host time spent waiting for, reading back, and consuming results.
    pub drain: Duration,
}

impl fmt::Display for BatchTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "radii {}..={} ({} planes): dispatch {:.2?}, drain {:.2?}",
            self.batch.start_radius,
            self.batch.last_radius(),
            self.batch.count,
            self.dispatch,
            self.drain,
        )
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Pipeline lifecycle over one batch sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Buffers zeroed, batch 0 dispatched, its event retained.
    Primed,
    /// Steady state: dispatch batch i, drain batch i-1.
    Running,
    /// Loop exhausted; the last dispatched batch is being drained.
    Draining,
    /// Terminal. No device operations on pipeline buffers until the
    /// next `run()` re-primes.
    Done,
}

/// The double-buffered pipeline orchestrator.
///
/// One instance drives one batch sequence per `run()` call; a later call
/// re-primes the same instance. Results are handed to the `consume`
/// callback one batch at a time, in batch order.
pub struct HoughPipeline {
    state: PipelineState,
    pool: BufferPool,
    profile: bool,
    timings: Vec<BatchTiming>,
    total: Duration,
}

impl HoughPipeline {
    pub fn new(profile: bool) -> Self {
        HoughPipeline {
            state: PipelineState::Done,
            pool: BufferPool::new(),
            profile,
            timings: Vec::new(),
            total: Duration::ZERO,
        }
    }

    #[inline]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Per-batch timings of the last `run()`, in batch order.
    pub fn timings(&self) -> &[BatchTiming] {
        &self.timings
    }

    /// Total wall clock of the last `run()`.
    pub fn total(&self) -> Duration {
        self.total
    }

    /// Drive `backend` through every batch of `batches`, handing each
    /// batch's mask planes to `consume` exactly once, in batch order.
    ///
    /// The dispatch of batch i overlaps the drain of batch i-1: the
    /// readback blocks the host while the device executes the freshly
    /// submitted batch.
    pub fn run<B, F>(
        &mut self,
        backend: &mut B,
        batches: impl IntoIterator<Item = RadiusBatch>,
        mut consume: F,
    ) -> Result<(), HoughError>
    where
        B: HoughBackend,
        F: FnMut(RadiusBatch, &[u32]),
    {
        let run_start = Instant::now();
        self.pool.reset();
        self.timings.clear();
        self.total = Duration::ZERO;

        let mut iter = batches.into_iter();
        let Some(first) = iter.next() else {
            self.state = PipelineState::Done;
            return Ok(());
        };

        // PRIMED: zero both slots device-side, then dispatch batch 0
        // into the current slot and hold its completion event.
        self.state = PipelineState::Primed;
        backend.zero_slot(Slot::A)?;
        backend.zero_slot(Slot::B)?;

        let t = Instant::now();
        let event = backend.dispatch(first, self.pool.current(), None)?;
        self.pool.retain(self.pool.current(), event);
        let mut in_flight = (first, t.elapsed());

        // RUNNING: for each further batch, swap roles, dispatch into the
        // new current slot (device-ordered after that slot's prior
        // dispatch), then drain the previous slot on the host.
        self.state = PipelineState::Running;
        for batch in iter {
            self.pool.swap();
            let current = self.pool.current();

            // The slot last held batch i-2; its retained event orders
            // the new write after the old one without stalling the host.
            let wait_on = self.pool.take_retained(current);
            let t_dispatch = Instant::now();
            let event = backend.dispatch(batch, current, wait_on)?;
            self.pool.retain(current, event);
            let dispatch = t_dispatch.elapsed();

            let (done_batch, done_dispatch) = in_flight;
            self.drain(backend, self.pool.previous(), done_batch, done_dispatch, &mut consume)?;
            in_flight = (batch, dispatch);
        }

        // DRAINING: the last dispatched batch still has unread results.
        self.state = PipelineState::Draining;
        let (last_batch, last_dispatch) = in_flight;
        self.drain(backend, self.pool.current(), last_batch, last_dispatch, &mut consume)?;

        self.total = run_start.elapsed();
        if self.profile {
            eprintln!(
                "[circlet] pipeline: {} batches in {:.2?}",
                self.timings.len(),
                self.total,
            );
        }
        self.state = PipelineState::Done;
        Ok(())
    }

    /// Blocking readback + consumption of one finished batch.
    fn drain<B, F>(
        &mut self,
        backend: &mut B,
        slot: Slot,
        batch: RadiusBatch,
        dispatch: Duration,
        consume: &mut F,
    ) -> Result<(), HoughError>
    where
        B: HoughBackend,
        F: FnMut(RadiusBatch, &[u32]),
    {
        let gate = self
            .pool
            .retained(slot)
            .expect("slot being drained must carry a retained dispatch event");
        let t = Instant::now();
        let planes = backend.read_masks(slot, batch, gate)?;
        consume(batch, &planes);

        let timing = BatchTiming { batch, dispatch, drain: t.elapsed() };
        if self.profile {
            eprintln!("[circlet] {timing}");
        }
        self.timings.push(timing);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_swap_flips_roles_in_place() {
        let mut pool = BufferPool::new();
        assert_eq!(pool.current(), Slot::A);
        assert_eq!(pool.previous(), Slot::B);
        pool.swap();
        assert_eq!(pool.current(), Slot::B);
        assert_eq!(pool.previous(), Slot::A);
        pool.swap();
        assert_eq!(pool.current(), Slot::A);
    }

    #[test]
    fn pool_retains_events_per_slot() {
        let mut pool = BufferPool::new();
        assert_eq!(pool.retained(Slot::A), None);
        pool.retain(Slot::A, PipelineEvent::new(7));
        pool.retain(Slot::B, PipelineEvent::new(9));
        assert_eq!(pool.retained(Slot::A), Some(PipelineEvent::new(7)));
        assert_eq!(pool.take_retained(Slot::A), Some(PipelineEvent::new(7)));
        assert_eq!(pool.retained(Slot::A), None);
        assert_eq!(pool.retained(Slot::B), Some(PipelineEvent::new(9)));
    }

    /// Backend stub that returns empty planes; used for state-machine
    /// tests that don't care about kernel semantics.
    struct NullBackend {
        next_ticket: u64,
    }

    impl HoughBackend for NullBackend {
        fn zero_slot(&mut self, _slot: Slot) -> Result<(), HoughError> {
            Ok(())
        }

        fn dispatch(
            &mut self,
            _batch: RadiusBatch,
            _slot: Slot,
            _wait_on: Option<PipelineEvent>,
        ) -> Result<PipelineEvent, HoughError> {
            self.next_ticket += 1;
            Ok(PipelineEvent::new(self.next_ticket))
        }

        fn read_masks(
            &mut self,
            _slot: Slot,
            batch: RadiusBatch,
            _gate: PipelineEvent,
        ) -> Result<Vec<u32>, HoughError> {
            Ok(vec![0; batch.count as usize])
        }
    }

    fn batch(start: u32, count: u32) -> RadiusBatch {
        RadiusBatch { start_radius: start, count, step: 1 }
    }

    #[test]
    fn empty_batch_sequence_completes_immediately() {
        let mut pipeline = HoughPipeline::new(false);
        let mut backend = NullBackend { next_ticket: 0 };
        pipeline.run(&mut backend, Vec::new(), |_, _| unreachable!()).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Done);
        assert!(pipeline.timings().is_empty());
    }

    #[test]
    fn consumes_each_batch_once_in_order() {
        let mut pipeline = HoughPipeline::new(false);
        let mut backend = NullBackend { next_ticket: 0 };
        let batches = vec![batch(10, 3), batch(13, 3), batch(16, 1)];

        let mut seen = Vec::new();
        pipeline
            .run(&mut backend, batches.clone(), |b, _| seen.push(b))
            .unwrap();

        assert_eq!(seen, batches);
        assert_eq!(pipeline.state(), PipelineState::Done);
        assert_eq!(pipeline.timings().len(), 3);
    }

    #[test]
    fn run_reprimes_after_done() {
        let mut pipeline = HoughPipeline::new(false);
        let mut backend = NullBackend { next_ticket: 0 };
        pipeline.run(&mut backend, vec![batch(5, 2)], |_, _| ()).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Done);

        let mut count = 0;
        pipeline
            .run(&mut backend, vec![batch(5, 2), batch(7, 2)], |_, _| count += 1)
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(pipeline.timings().len(), 2);
    }
}
