// gpu/mod.rs — wgpu compute backend.
//
// The CPU implementation in cpu.rs is the authoritative reference for
// the kernel semantics; everything here is validated against it
// cell-for-cell. The split per module:
//
//   device.rs   adapter selection, limits, dispatch geometry
//   edge.rs     edge-map upload (R8Uint texture + staging buffer)
//   kernels.rs  WGSL compilation, bind group layout, the two pipelines
//   exec.rs     GpuBackend — buffer slots, dispatch encoding, readback
//
// The host drives a single in-order queue: pass order inside one
// encoder gives the vote→threshold dependency, submission order gives
// cross-batch ordering, and SubmissionIndex stands in for the pipeline
// event when the host must gate a readback.

pub mod device;
pub mod edge;
pub mod exec;
pub mod kernels;
