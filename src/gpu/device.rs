// gpu/device.rs — wgpu device selection and limits.
//
// ADAPTER SELECTION:
// The run configuration names an adapter index and a prefer-GPU flag.
// We enumerate every adapter on the primary backends ourselves instead
// of using `request_adapter`'s power-preference heuristics, which can
// grab a software rasterizer while a real GPU is present. With
// `prefer_gpu` the hardware adapters (discrete, integrated, virtual,
// other) are ordered before CPU/software ones, so index 0 is the best
// available device and the software rasterizer remains the documented
// fallback when nothing else exists.
//
// MEMORY CEILING:
// `max_memory_allocation()` reports the storage-buffer binding limit of
// the created device. The batch planner divides the radius search range
// by it, so an accumulator or mask buffer never exceeds what the device
// will bind.

use std::fmt;

use crate::config::DeviceConfig;
use crate::error::HoughError;

/// Workgroup configuration for the 2D compute dispatches.
///
/// 16×8 = 128 invocations: four 32-wide warps on NVIDIA, two 64-wide
/// wavefronts on AMD, and the 16-wide x dimension aligns with cache
/// lines for row-major plane data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkgroupSize {
    pub x: u32,
    pub y: u32,
}

impl WorkgroupSize {
    pub const DEFAULT: WorkgroupSize = WorkgroupSize { x: 16, y: 8 };
}

impl fmt::Display for WorkgroupSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}×{}", self.x, self.y)
    }
}

/// Cached adapter information for logging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.backend, self.device_type)
    }
}

/// The GPU context: device, queue, and the limits the pipeline cares
/// about. Create once per run via [`GpuDevice::select`]; every kernel
/// object and queue handle is owned here and passed into the backend
/// explicitly — nothing is process-wide.
///
/// # Field drop order
/// `_instance` is declared last so the `wgpu::Instance` outlives
/// `device` and `queue` (fields drop top to bottom).
#[derive(Debug)]
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: AdapterInfo,
    pub workgroup_size: WorkgroupSize,
    max_memory_allocation: u64,
    _instance: wgpu::Instance,
}

impl GpuDevice {
    /// Select an adapter per the device configuration and create the
    /// device and queue.
    ///
    /// # Errors
    /// `Configuration` when `adapter_index` is past the end of the
    /// enumerated list; `DeviceExecution` when no adapter exists at all
    /// or the device request fails.
    pub fn select(config: &DeviceConfig) -> Result<Self, HoughError> {
        pollster::block_on(Self::init_async(config))
    }

    async fn init_async(config: &DeviceConfig) -> Result<Self, HoughError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let mut adapters: Vec<wgpu::Adapter> = instance
            .enumerate_adapters(wgpu::Backends::PRIMARY)
            .into_iter()
            .collect();
        if adapters.is_empty() {
            return Err(HoughError::DeviceExecution(
                "no compute adapter found on any primary backend".into(),
            ));
        }

        if config.prefer_gpu {
            // Stable partition: hardware first, software rasterizers last.
            adapters.sort_by_key(|a| {
                matches!(a.get_info().device_type, wgpu::DeviceType::Cpu)
            });
        }

        for a in &adapters {
            let info = a.get_info();
            eprintln!(
                "[circlet] adapter: {} ({:?}, {:?})",
                info.name, info.backend, info.device_type
            );
        }

        if config.adapter_index >= adapters.len() {
            return Err(HoughError::Configuration(format!(
                "adapter index {} out of range ({} adapters found)",
                config.adapter_index,
                adapters.len(),
            )));
        }
        let adapter = adapters.swap_remove(config.adapter_index);

        let raw_info = adapter.get_info();
        let adapter_info = AdapterInfo {
            name: raw_info.name.clone(),
            device_type: raw_info.device_type,
            backend: raw_info.backend,
        };
        eprintln!("[circlet] using adapter: {adapter_info}");

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("circlet"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(|e| HoughError::DeviceExecution(format!("device request failed: {e}")))?;

        let max_memory_allocation = device.limits().max_storage_buffer_binding_size as u64;

        Ok(GpuDevice {
            device,
            queue,
            adapter_info,
            workgroup_size: WorkgroupSize::DEFAULT,
            max_memory_allocation,
            _instance: instance,
        })
    }

    /// Largest single buffer the device will bind, in bytes. Feeds the
    /// batch planner's memory ceiling.
    #[inline]
    pub fn max_memory_allocation(&self) -> u64 {
        self.max_memory_allocation
    }

    /// Workgroup counts covering a `img_w`×`img_h` plane (ceiling
    /// division; the shaders guard out-of-bounds global IDs).
    pub fn dispatch_size(&self, img_w: u32, img_h: u32) -> (u32, u32) {
        let dx = img_w.div_ceil(self.workgroup_size.x);
        let dy = img_h.div_ceil(self.workgroup_size.y);
        (dx, dy)
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GpuDevice {{ adapter: {}, workgroup: {}, ceiling: {} MiB }}",
            self.adapter_info,
            self.workgroup_size,
            self.max_memory_allocation >> 20,
        )
    }
}
