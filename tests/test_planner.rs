// tests/test_planner.rs — batch coverage and ceiling properties.

use circlet::error::HoughError;
use circlet::planner::{
    BatchPlanner, RadiusBatch, BUFFER_KINDS, BUFFER_SLOTS, BYTES_PER_COUNTER,
};

/// Ceiling that fits exactly `planes` W×H radius planes across the
/// double buffer.
fn ceiling_for(planes: u64, w: u64, h: u64) -> u64 {
    planes * w * h * BYTES_PER_COUNTER * BUFFER_KINDS * BUFFER_SLOTS
}

// ===== Coverage =====

#[test]
fn batches_cover_every_radius_exactly_once() {
    // Sweep ranges, steps, and batch capacities; the concatenated batch
    // radii must equal the expected arithmetic sequence — no gaps, no
    // overlaps, no reordering.
    for &min in &[1u32, 5, 13] {
        for &span in &[0u32, 1, 7, 41, 100] {
            for &step in &[1u32, 2, 3, 7] {
                for &cap in &[1u64, 3, 8, 64] {
                    let max = min + span;
                    let planner =
                        BatchPlanner::new(min, max, step, ceiling_for(cap, 32, 32), 32, 32, 1)
                            .unwrap();

                    let expected: Vec<u32> = (min..=max).step_by(step as usize).collect();
                    let got: Vec<u32> = planner
                        .flat_map(|b| b.radii().collect::<Vec<_>>())
                        .collect();
                    assert_eq!(
                        got, expected,
                        "coverage broken for min={min} max={max} step={step} cap={cap}"
                    );
                }
            }
        }
    }
}

#[test]
fn batches_are_contiguous_and_monotonic() {
    let planner = BatchPlanner::new(10, 200, 3, ceiling_for(7, 64, 64), 64, 64, 1).unwrap();
    let batches: Vec<RadiusBatch> = planner.collect();
    assert!(batches.len() > 1);
    for pair in batches.windows(2) {
        assert_eq!(
            pair[1].start_radius,
            pair[0].last_radius() + pair[0].step,
            "gap between {:?} and {:?}",
            pair[0],
            pair[1]
        );
    }
}

// ===== Ceiling respect =====

#[test]
fn no_batch_exceeds_the_memory_ceiling() {
    for &(w, h) in &[(100usize, 100usize), (640, 480), (17, 31)] {
        for &cap in &[1u64, 2, 5, 33] {
            let ceiling = ceiling_for(cap, w as u64, h as u64);
            let planner = BatchPlanner::new(5, 300, 1, ceiling, w, h, 1).unwrap();
            for batch in planner {
                // One buffer of the batch must fit the ceiling outright
                // (the planner's own budget is stricter: ×2 kinds ×2 slots).
                let buffer_bytes = batch.count as u64 * w as u64 * h as u64 * BYTES_PER_COUNTER;
                assert!(
                    buffer_bytes <= ceiling,
                    "batch {batch:?} needs {buffer_bytes} B against ceiling {ceiling}"
                );
                assert!(batch.count as u64 <= cap);
            }
        }
    }
}

#[test]
fn largest_batch_matches_max_batch_count() {
    let planner = BatchPlanner::new(15, 25, 1, ceiling_for(5, 100, 100), 100, 100, 1).unwrap();
    let cap = planner.max_batch_count();
    assert_eq!(cap, 5);
    let largest = planner.map(|b| b.count).max().unwrap();
    assert_eq!(largest, cap);
}

// ===== Failure modes =====

#[test]
fn ceiling_below_one_plane_fails_before_any_allocation() {
    let one_plane = ceiling_for(1, 100, 100);
    let err = BatchPlanner::new(10, 20, 1, one_plane - 1, 100, 100, 1).unwrap_err();
    match err {
        HoughError::Configuration(msg) => {
            assert!(msg.contains("ceiling"), "unhelpful message: {msg}")
        }
        other => panic!("expected Configuration error, got {other:?}"),
    }
}

#[test]
fn headroom_shrinks_batches() {
    let ceiling = ceiling_for(8, 64, 64);
    let plain: Vec<_> = BatchPlanner::new(1, 16, 1, ceiling, 64, 64, 1).unwrap().collect();
    let halved: Vec<_> = BatchPlanner::new(1, 16, 1, ceiling, 64, 64, 2).unwrap().collect();
    assert_eq!(plain.len(), 2); // 8 + 8
    assert_eq!(halved.len(), 4); // 4 + 4 + 4 + 4
    let radii = |bs: &[RadiusBatch]| -> Vec<u32> {
        bs.iter().flat_map(|b| b.radii().collect::<Vec<_>>()).collect()
    };
    assert_eq!(radii(&plain), radii(&halved));
}
