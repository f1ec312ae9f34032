// gpu/edge.rs — edge-map upload.
//
// The binary edge map is immutable for the whole run and read by every
// vote dispatch, so it is uploaded once as an `R8Uint` 2D texture
// (one 8-bit unsigned channel, `textureLoad` in WGSL returns the raw
// integer — 0 or 255).
//
// wgpu requires `bytes_per_row` in a buffer→texture copy to be a
// multiple of 256, so rows are re-packed into an aligned staging buffer
// before the copy. Host rows are contiguous (Image<u8> has no padding);
// only the destination rows gain alignment padding.

use wgpu::util::DeviceExt;

use crate::gpu::device::GpuDevice;
use crate::image::Image;

const COPY_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

/// The run's edge map, resident on the GPU.
pub struct GpuEdgeMap {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl GpuEdgeMap {
    /// Upload a binary edge map. Returns immediately; the copy is
    /// ordered before any later dispatch by queue submission order.
    pub fn upload(gpu: &GpuDevice, src: &Image<u8>) -> Self {
        let width = src.width() as u32;
        let height = src.height() as u32;

        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("edge map"),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R8Uint,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        // Re-pack rows at the copy alignment.
        let aligned_bytes_per_row = align_to(width, COPY_ALIGNMENT);
        let mut staging = vec![0u8; (aligned_bytes_per_row * height) as usize];
        let src_data = src.as_slice();
        for y in 0..height as usize {
            let dst = y * aligned_bytes_per_row as usize;
            staging[dst..dst + width as usize]
                .copy_from_slice(&src_data[y * width as usize..(y + 1) * width as usize]);
        }

        let staging_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("edge map staging"),
            contents: &staging,
            usage: wgpu::BufferUsages::COPY_SRC,
        });

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("edge upload") });
        encoder.copy_buffer_to_texture(
            wgpu::ImageCopyBuffer {
                buffer: &staging_buf,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(aligned_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        );
        gpu.queue.submit(std::iter::once(encoder.finish()));

        GpuEdgeMap { texture, view, width, height }
    }
}

/// Round `value` up to the next multiple of `alignment`.
#[inline]
pub(crate) fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_to_rounds_up_to_copy_alignment() {
        assert_eq!(align_to(0, 256), 0);
        assert_eq!(align_to(1, 256), 256);
        assert_eq!(align_to(100, 256), 256);
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(257, 256), 512);
        assert_eq!(align_to(641, 256), 768);
    }

    #[test]
    fn staging_repack_preserves_rows() {
        // Reproduce the upload loop on the host and check row placement.
        let img = Image::<u8>::from_vec(3, 2, vec![10, 20, 30, 40, 50, 60]);
        let aligned = align_to(3, 256) as usize;
        let mut staging = vec![0u8; aligned * 2];
        for y in 0..2usize {
            let dst = y * aligned;
            staging[dst..dst + 3].copy_from_slice(&img.as_slice()[y * 3..(y + 1) * 3]);
        }
        assert_eq!(&staging[0..3], &[10, 20, 30]);
        assert_eq!(&staging[aligned..aligned + 3], &[40, 50, 60]);
        assert!(staging[3..aligned].iter().all(|&b| b == 0));
    }
}
