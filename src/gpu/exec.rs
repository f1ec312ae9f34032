// gpu/exec.rs — the wgpu backend.
//
// Owns the two physical buffer slots (accumulator + mask pair each) and
// encodes the per-batch dispatch: accumulator clear → vote pass →
// threshold pass, all in one command encoder, so the vote kernel reads
// a zeroed accumulator and the threshold kernel reads finished votes.
//
// EVENTS:
// Every dispatch mints a ticket mapped to the wgpu SubmissionIndex of
// its submission. `wait_on` needs no extra encoding — all work goes to
// the single in-order queue, so submission order already serializes a
// new dispatch after the previous one targeting the same slot — but the
// ticket is still validated, keeping the backend honest to the same
// event discipline the CPU and mock backends enforce. Readback gates on
// `Maintain::WaitForSubmissionIndex`, the only point where the host
// blocks on the device.

use std::collections::HashMap;

use wgpu::util::DeviceExt;

use crate::config::HoughConfig;
use crate::error::HoughError;
use crate::gpu::device::GpuDevice;
use crate::gpu::edge::GpuEdgeMap;
use crate::gpu::kernels::{HoughKernels, HoughParams};
use crate::image::Image;
use crate::pipeline::{HoughBackend, PipelineEvent, Slot};
use crate::planner::RadiusBatch;

struct GpuSlot {
    accum: wgpu::Buffer,
    masks: wgpu::Buffer,
}

/// GPU backend: edge map, kernel pair, and the double-buffer slots.
pub struct GpuBackend<'a> {
    gpu: &'a GpuDevice,
    kernels: HoughKernels,
    edge: GpuEdgeMap,
    sensitivity: f32,
    tolerance: u32,
    slots: [GpuSlot; 2],
    /// Size of one slot buffer, in bytes (largest batch × plane bytes).
    slot_bytes: u64,
    max_batch_count: u32,
    next_ticket: u64,
    submissions: HashMap<u64, wgpu::SubmissionIndex>,
}

impl<'a> GpuBackend<'a> {
    /// Upload the edge map, compile the kernels, and allocate both
    /// buffer slots sized for `max_batch_count` planes.
    ///
    /// # Errors
    /// `DeviceExecution` on shader build failure or buffer validation
    /// failure (the planner's ceiling should rule the latter out).
    pub fn new(
        gpu: &'a GpuDevice,
        edge: &Image<u8>,
        config: &HoughConfig,
        max_batch_count: u32,
    ) -> Result<Self, HoughError> {
        let kernels = HoughKernels::new(gpu)?;
        let gpu_edge = GpuEdgeMap::upload(gpu, edge);

        let plane_bytes = edge.width() as u64 * edge.height() as u64 * 4;
        let slot_bytes = max_batch_count as u64 * plane_bytes;

        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let make_slot = |accum_label: &str, masks_label: &str| GpuSlot {
            accum: gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(accum_label),
                size: slot_bytes,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            masks: gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(masks_label),
                size: slot_bytes,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            }),
        };
        let slots = [
            make_slot("slot A accumulator", "slot A masks"),
            make_slot("slot B accumulator", "slot B masks"),
        ];
        if let Some(err) = pollster::block_on(gpu.device.pop_error_scope()) {
            return Err(HoughError::DeviceExecution(format!(
                "buffer allocation failed ({slot_bytes} B per buffer): {err}"
            )));
        }

        Ok(GpuBackend {
            gpu,
            kernels,
            edge: gpu_edge,
            sensitivity: config.sensitivity,
            tolerance: config.radius_tolerance,
            slots,
            slot_bytes,
            max_batch_count,
            next_ticket: 0,
            submissions: HashMap::new(),
        })
    }

    fn params_for(&self, batch: RadiusBatch) -> HoughParams {
        HoughParams {
            width: self.edge.width,
            height: self.edge.height,
            start_radius: batch.start_radius,
            radius_step: batch.step,
            plane_count: batch.count,
            tolerance: self.tolerance,
            sensitivity: self.sensitivity,
            _pad: 0,
        }
    }

    fn submission_for(&self, event: PipelineEvent) -> Result<wgpu::SubmissionIndex, HoughError> {
        self.submissions
            .get(&event.ticket())
            .cloned()
            .ok_or_else(|| {
                HoughError::DeviceExecution(format!(
                    "event {} was never minted by this backend",
                    event.ticket()
                ))
            })
    }

    fn mint(&mut self, index: wgpu::SubmissionIndex) -> PipelineEvent {
        self.next_ticket += 1;
        self.submissions.insert(self.next_ticket, index);
        PipelineEvent::new(self.next_ticket)
    }
}

impl HoughBackend for GpuBackend<'_> {
    fn zero_slot(&mut self, slot: Slot) -> Result<(), HoughError> {
        let s = &self.slots[slot.index()];
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("zero slot") });
        encoder.clear_buffer(&s.accum, 0, None);
        encoder.clear_buffer(&s.masks, 0, None);
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn dispatch(
        &mut self,
        batch: RadiusBatch,
        slot: Slot,
        wait_on: Option<PipelineEvent>,
    ) -> Result<PipelineEvent, HoughError> {
        if batch.count > self.max_batch_count {
            return Err(HoughError::DeviceExecution(format!(
                "batch of {} planes exceeds slot capacity of {}",
                batch.count, self.max_batch_count,
            )));
        }
        if let Some(ev) = wait_on {
            // Submission order on the single queue already places this
            // dispatch after the event's submission; just validate it.
            self.submission_for(ev)?;
        }

        let s = &self.slots[slot.index()];
        let params = self.params_for(batch);
        let params_buf = self.gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("hough params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let bind_group = self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("hough BG"),
            layout: &self.kernels.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&self.edge.view),
                },
                wgpu::BindGroupEntry { binding: 1, resource: s.accum.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: params_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: s.masks.as_entire_binding() },
            ],
        });

        let batch_bytes = batch.count as u64 * self.edge.width as u64 * self.edge.height as u64 * 4;
        let (wg_x, wg_y) = self.gpu.dispatch_size(self.edge.width, self.edge.height);

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("hough batch") });
        // Fresh votes require zeroed counters; the clear is device-side
        // and ordered before the vote pass by the encoder.
        encoder.clear_buffer(&s.accum, 0, Some(batch_bytes));
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("cast_votes"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.kernels.vote);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(wg_x, wg_y, batch.count);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("threshold_planes"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.kernels.threshold);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(wg_x, wg_y, batch.count);
        }

        let index = self.gpu.queue.submit(std::iter::once(encoder.finish()));
        Ok(self.mint(index))
    }

    fn read_masks(
        &mut self,
        slot: Slot,
        batch: RadiusBatch,
        gate: PipelineEvent,
    ) -> Result<Vec<u32>, HoughError> {
        let index = self.submission_for(gate)?;
        self.gpu.device.poll(wgpu::Maintain::WaitForSubmissionIndex(index));

        let batch_bytes = batch.count as u64 * self.edge.width as u64 * self.edge.height as u64 * 4;
        debug_assert!(batch_bytes <= self.slot_bytes);

        let readback = self.gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("mask readback"),
            size: batch_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("mask readback") });
        encoder.copy_buffer_to_buffer(
            &self.slots[slot.index()].masks,
            0,
            &readback,
            0,
            batch_bytes,
        );
        self.gpu.queue.submit(std::iter::once(encoder.finish()));

        let buf_slice = readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buf_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.gpu.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| HoughError::DeviceExecution("readback map callback never fired".into()))?
            .map_err(|e| HoughError::DeviceExecution(format!("readback map failed: {e}")))?;

        let mapped = buf_slice.get_mapped_range();
        let words: Vec<u32> = bytemuck::cast_slice(&mapped).to_vec();
        drop(mapped);
        readback.unmap();
        Ok(words)
    }
}
