// gpu/kernels.rs — WGSL compilation and compute pipelines.
//
// Builds the two pipelines (vote, threshold) from shaders/hough.wgsl.
// Both entry points live in one module and share one bind group layout,
// so a single bind group per dispatch serves both passes.
//
// Compilation runs inside a wgpu validation error scope: a WGSL or
// binding error is surfaced as `DeviceExecution` with the naga
// diagnostics verbatim, instead of the asynchronous uncaptured-error
// handler killing the process later.

use crate::error::HoughError;
use crate::gpu::device::GpuDevice;

/// Uniform parameters for both kernels. Field order and padding must
/// match `struct HoughParams` in hough.wgsl exactly.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct HoughParams {
    pub width: u32,
    pub height: u32,
    pub start_radius: u32,
    pub radius_step: u32,
    pub plane_count: u32,
    pub tolerance: u32,
    pub sensitivity: f32,
    pub _pad: u32,
}

/// The compiled kernel pair and its shared bind group layout.
pub struct HoughKernels {
    pub vote: wgpu::ComputePipeline,
    pub threshold: wgpu::ComputePipeline,
    pub layout: wgpu::BindGroupLayout,
}

impl HoughKernels {
    /// Compile the shader module and build both pipelines.
    ///
    /// # Errors
    /// `DeviceExecution` with the build log when the WGSL fails to
    /// compile or a pipeline fails validation.
    pub fn new(gpu: &GpuDevice) -> Result<Self, HoughError> {
        let shader_template = include_str!("../shaders/hough.wgsl");
        let shader_src = shader_template
            .replace("{{WG_X}}", &gpu.workgroup_size.x.to_string())
            .replace("{{WG_Y}}", &gpu.workgroup_size.y.to_string());

        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("hough.wgsl"),
            source: wgpu::ShaderSource::Wgsl(shader_src.into()),
        });

        let layout = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("hough BGL"),
            entries: &[
                // 0 — edge map texture (R8Uint)
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Uint,
                    },
                    count: None,
                },
                // 1 — accumulator planes (storage read_write, atomics)
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // 2 — params uniform
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // 3 — output mask planes (storage read_write)
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("hough pipeline layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let vote = gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("cast_votes"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: "cast_votes",
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });
        let threshold = gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("threshold_planes"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: "threshold_planes",
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        if let Some(err) = pollster::block_on(gpu.device.pop_error_scope()) {
            return Err(HoughError::DeviceExecution(format!(
                "kernel build failed: {err}"
            )));
        }

        Ok(HoughKernels { vote, threshold, layout })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;

    #[test]
    fn params_layout_matches_wgsl_struct() {
        // 8 fields × 4 bytes; uniform structs are 16-byte aligned, which
        // 32 bytes satisfies without tail padding.
        assert_eq!(std::mem::size_of::<HoughParams>(), 32);
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn kernels_compile_on_real_device() {
        let gpu = GpuDevice::select(&DeviceConfig::default()).expect("adapter available");
        let kernels = HoughKernels::new(&gpu).expect("shader should compile");
        drop(kernels);
    }
}
