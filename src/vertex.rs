//! Packed GPU vertex/instance layouts shared by the six shader programs (§4.14).

use bytemuck::{Pod, Zeroable};

/// Vertex for the `solid`/`texture`/`line` geometry (unit quad and dynamic path buffers).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct PathVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

impl PathVertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2],
        }
    }
}

/// Per-instance data for the `stamp` program (batched textured dots, §4.14).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct StampInstance {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub opacity: f32,
}

impl StampInstance {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &wgpu::vertex_attr_array![2 => Float32x4],
        }
    }
}

/// Per-instance data for the `circle` program (instanced SDF discs, §4.12 `draw_circles`).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct CircleInstance {
    pub cx: f32,
    pub cy: f32,
    pub radius: f32,
    pub color: [f32; 4],
}

impl CircleInstance {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &wgpu::vertex_attr_array![2 => Float32x3, 3 => Float32x4],
        }
    }
}

/// Quad-per-segment vertex for the `line` program, carrying an `edge` coordinate in
/// `[-1, +1]` used by the fragment shader's analytic AA (§4.14).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct LineVertex {
    pub position: [f32; 2],
    pub edge: f32,
    pub color: [f32; 4],
}

impl LineVertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32, 2 => Float32x4],
        }
    }
}

/// Column-major 3x3 projection/transform uniform, laid out per §4.14's projection matrix.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct TransformUniform {
    pub columns: [[f32; 4]; 3],
}

impl TransformUniform {
    pub fn new(projection: [[f32; 3]; 3], current: crate::geom::Affine) -> Self {
        let transform = [
            [current.a, current.b, 0.0],
            [current.c, current.d, 0.0],
            [current.e, current.f, 1.0],
        ];
        let combined = mat3_mul(projection, transform);
        Self {
            columns: [
                [combined[0][0], combined[0][1], combined[0][2], 0.0],
                [combined[1][0], combined[1][1], combined[1][2], 0.0],
                [combined[2][0], combined[2][1], combined[2][2], 0.0],
            ],
        }
    }
}

fn mat3_mul(a: [[f32; 3]; 3], b: [[f32; 3]; 3]) -> [[f32; 3]; 3] {
    let mut out = [[0.0f32; 3]; 3];
    for col in 0..3 {
        for row in 0..3 {
            out[col][row] = a[0][row] * b[col][0] + a[1][row] * b[col][1] + a[2][row] * b[col][2];
        }
    }
    out
}
