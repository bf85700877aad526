//! Static geometry and growable dynamic buffers shared by the GPU backend's draw calls.

use wgpu::util::DeviceExt;

use crate::vertex::PathVertex;

/// Unit quad in `[-0.5, 0.5]` with UVs in `[0, 1]`, used by `stamp`/`circle` instancing and by
/// `draw_image`/`draw_offscreen`.
pub struct UnitQuad {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

impl UnitQuad {
    pub fn new(device: &wgpu::Device) -> Self {
        let vertices = [
            PathVertex { position: [-0.5, -0.5], uv: [0.0, 1.0] },
            PathVertex { position: [0.5, -0.5], uv: [1.0, 1.0] },
            PathVertex { position: [0.5, 0.5], uv: [1.0, 0.0] },
            PathVertex { position: [-0.5, 0.5], uv: [0.0, 0.0] },
        ];
        let indices: [u16; 6] = [0, 1, 2, 0, 2, 3];

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("inkstroke unit quad vertices"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("inkstroke unit quad indices"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self { vertex_buffer, index_buffer, index_count: indices.len() as u32 }
    }
}

/// A vertex buffer that grows by doubling when a requested upload exceeds its capacity
/// (§4.14 "dynamic buffers ... with capacity doubling on overflow").
pub struct DynamicBuffer {
    buffer: wgpu::Buffer,
    capacity: u64,
    usage: wgpu::BufferUsages,
    label: &'static str,
}

impl DynamicBuffer {
    pub fn new(device: &wgpu::Device, label: &'static str, usage: wgpu::BufferUsages) -> Self {
        let capacity = 4096u64;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: capacity,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self { buffer, capacity, usage, label }
    }

    /// Uploads `bytes`, growing the backing buffer (by doubling) if it is too small.
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, bytes: &[u8]) {
        let needed = bytes.len() as u64;
        if needed > self.capacity {
            let mut capacity = self.capacity;
            while capacity < needed {
                capacity *= 2;
            }
            self.capacity = capacity;
            self.buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(self.label),
                size: self.capacity,
                usage: self.usage | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
        }
        queue.write_buffer(&self.buffer, 0, bytes);
    }

    pub fn slice(&self, bytes_len: u64) -> wgpu::BufferSlice<'_> {
        self.buffer.slice(0..bytes_len.max(1))
    }
}
