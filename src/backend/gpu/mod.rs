//! GPU Drawing Backend (C14): `DrawingBackend` over `wgpu`, implementing the stencil-based
//! fill/clip/mask protocol described in §4.14. Context creation is fallible; callers should
//! fall back to `RasterBackend` (C13) when `GpuBackend::new` returns an error or when
//! `GpuBackend::meets_minimum_requirements` is false.
//!
//! The spec's programs are described as fixed GLSL 3.00 ES source; since the surrounding
//! ecosystem (and this crate's dependency stack) is built on `wgpu`, the six programs are
//! authored in WGSL instead (see `shaders.rs`) rather than transliterated GLSL.

mod buffers;
mod cache;
mod pipelines;
mod shaders;

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::backend::{BlendMode, DrawState, DrawingBackend, TextureSource, MAX_CLIP_DEPTH};
use crate::color::Color;
use crate::error::{RenderError, RenderResult};
use crate::geom::{Affine, Rect};
use crate::id::TextureId;
use crate::stamps::Stamp;
use crate::vertex::{CircleInstance, LineVertex, PathVertex, StampInstance, TransformUniform};

use buffers::{DynamicBuffer, UnitQuad};
use cache::StateCache;
use pipelines::{clip_reference, ProgramKind};

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const STENCIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Stencil8;
const MIN_MAX_TEXTURE_DIMENSION: u32 = 2048;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct FragUniform {
    colour: [f32; 4],
}

fn projection_matrix(width: f32, height: f32) -> [[f32; 3]; 3] {
    [
        [2.0 / width, 0.0, 0.0],
        [0.0, -2.0 / height, 0.0],
        [-1.0, 1.0, 1.0],
    ]
}

/// Colour + optional stencil render target. `msaa` is `Some` when the backend resolved a 4x
/// multisampled attachment at creation.
struct RenderTarget {
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    msaa_view: Option<wgpu::TextureView>,
    stencil_view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl RenderTarget {
    fn new(device: &wgpu::Device, width: u32, height: u32, sample_count: u32) -> Self {
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("inkstroke gpu target colour"),
            size: wgpu::Extent3d { width: width.max(1), height: height.max(1), depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());

        let msaa_view = if sample_count > 1 {
            let msaa = device.create_texture(&wgpu::TextureDescriptor {
                label: Some("inkstroke gpu target msaa"),
                size: wgpu::Extent3d { width: width.max(1), height: height.max(1), depth_or_array_layers: 1 },
                mip_level_count: 1,
                sample_count,
                dimension: wgpu::TextureDimension::D2,
                format: COLOR_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });
            Some(msaa.create_view(&wgpu::TextureViewDescriptor::default()))
        } else {
            None
        };

        let stencil = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("inkstroke gpu target stencil"),
            size: wgpu::Extent3d { width: width.max(1), height: height.max(1), depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format: STENCIL_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let stencil_view = stencil.create_view(&wgpu::TextureViewDescriptor::default());

        Self { color, color_view, msaa_view, stencil_view, width, height }
    }

    /// The view render passes should attach as the colour target: the MSAA view when present
    /// (resolved into `color_view` automatically by the pass's `resolve_target`), else the
    /// plain colour view.
    fn draw_view(&self) -> &wgpu::TextureView {
        self.msaa_view.as_ref().unwrap_or(&self.color_view)
    }

    fn resolve_target(&self) -> Option<&wgpu::TextureView> {
        self.msaa_view.as_ref().map(|_| &self.color_view)
    }
}

struct UploadedTexture {
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    width: u32,
    height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Main,
    Offscreen(TextureId),
}

pub struct GpuBackend {
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    valid: bool,

    width: u32,
    height: u32,
    sample_count: u32,

    main: RenderTarget,
    offscreens: HashMap<TextureId, RenderTarget>,
    textures: HashMap<TextureId, UploadedTexture>,
    next_texture_id: u64,

    pipelines: pipelines::Pipelines,
    quad: UnitQuad,
    path_buf: DynamicBuffer,
    instance_buf: DynamicBuffer,
    line_buf: DynamicBuffer,

    transform_uniform: wgpu::Buffer,
    frag_uniform: wgpu::Buffer,
    dummy_texture: wgpu::TextureView,
    dummy_sampler: wgpu::Sampler,
    bind_group_layout: wgpu::BindGroupLayout,

    state_cache: StateCache,
    state: DrawState,
    state_stack: Vec<DrawState>,
    fill_colour: Color,
    stroke_colour: Color,
    line_width: f32,

    target: Target,
    target_stack: Vec<Target>,
    offscreen_save_stack: Vec<DrawState>,
}

impl GpuBackend {
    /// Blocking context creation (no async executor is guaranteed around library code, so
    /// adapter/device acquisition is driven with `pollster`, matching the pack's convention
    /// for synchronous `wgpu` setup in non-windowed contexts).
    pub fn new(width: u32, height: u32) -> RenderResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| RenderError::ResourceUnavailable(format!("no suitable GPU adapter: {e}")))?;

        let limits = adapter.limits();
        if limits.max_texture_dimension_2d < MIN_MAX_TEXTURE_DIMENSION {
            return Err(RenderError::ResourceUnavailable(format!(
                "adapter max texture dimension {} below minimum {}",
                limits.max_texture_dimension_2d, MIN_MAX_TEXTURE_DIMENSION
            )));
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("inkstroke gpu backend"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: Default::default(),
        }))
        .map_err(|e| RenderError::ResourceUnavailable(format!("device request failed: {e}")))?;

        let color_features = adapter.get_texture_format_features(COLOR_FORMAT);
        let sample_count = if color_features.flags.sample_count_supported(4) { 4 } else { 1 };

        Self::from_device(instance, adapter, device, queue, width, height, sample_count)
    }

    fn from_device(
        instance: wgpu::Instance,
        adapter: wgpu::Adapter,
        device: wgpu::Device,
        queue: wgpu::Queue,
        width: u32,
        height: u32,
        sample_count: u32,
    ) -> RenderResult<Self> {
        let pipelines = pipelines::Pipelines::new(&device, COLOR_FORMAT, STENCIL_FORMAT, sample_count);
        let main = RenderTarget::new(&device, width, height, sample_count);
        let quad = UnitQuad::new(&device);

        let path_buf = DynamicBuffer::new(&device, "inkstroke path buffer", wgpu::BufferUsages::VERTEX);
        let instance_buf = DynamicBuffer::new(&device, "inkstroke instance buffer", wgpu::BufferUsages::VERTEX);
        let line_buf = DynamicBuffer::new(&device, "inkstroke line buffer", wgpu::BufferUsages::VERTEX);

        let transform_uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("inkstroke transform uniform"),
            size: std::mem::size_of::<TransformUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let frag_uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("inkstroke frag uniform"),
            size: std::mem::size_of::<FragUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let dummy = device.create_texture_with_data(
            &queue,
            &wgpu::TextureDescriptor {
                label: Some("inkstroke dummy texture"),
                size: wgpu::Extent3d { width: 1, height: 1, depth_or_array_layers: 1 },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &[255, 255, 255, 255],
        );
        let dummy_texture = dummy.create_view(&wgpu::TextureViewDescriptor::default());
        let dummy_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("inkstroke dummy sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("inkstroke per-draw bind group layout (mirrors pipelines::Pipelines)"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            valid: true,
            width,
            height,
            sample_count,
            main,
            offscreens: HashMap::new(),
            textures: HashMap::new(),
            next_texture_id: 1,
            pipelines,
            quad,
            path_buf,
            instance_buf,
            line_buf,
            transform_uniform,
            frag_uniform,
            dummy_texture,
            dummy_sampler,
            bind_group_layout,
            state_cache: StateCache::new(),
            state: DrawState::default(),
            state_stack: Vec::new(),
            fill_colour: Color::BLACK,
            stroke_colour: Color::BLACK,
            line_width: 1.0,
            target: Target::Main,
            target_stack: Vec::new(),
            offscreen_save_stack: Vec::new(),
        })
    }

    pub fn meets_minimum_requirements(&self) -> bool {
        self.adapter.limits().max_texture_dimension_2d >= MIN_MAX_TEXTURE_DIMENSION
    }

    /// Context-loss recovery (§4.14): flips `valid`, clears caches, and rebuilds every GPU
    /// resource (programs, buffers, offscreens) from scratch.
    pub fn handle_lost(&mut self) -> RenderResult<()> {
        self.valid = false;
        let offscreen_sizes: Vec<(TextureId, u32, u32)> =
            self.offscreens.iter().map(|(id, t)| (*id, t.width, t.height)).collect();

        let rebuilt = Self::from_device(
            self.instance.clone(),
            self.adapter.clone(),
            self.device.clone(),
            self.queue.clone(),
            self.width,
            self.height,
            self.sample_count,
        )?;
        *self = rebuilt;
        for (id, w, h) in offscreen_sizes {
            self.get_offscreen(id, w, h)?;
        }
        self.valid = true;
        Ok(())
    }

    fn current_target(&self) -> &RenderTarget {
        match self.target {
            Target::Main => &self.main,
            Target::Offscreen(id) => self.offscreens.get(&id).unwrap_or(&self.main),
        }
    }

    fn target_size(&self) -> (u32, u32) {
        let t = self.current_target();
        (t.width, t.height)
    }

    fn write_transform(&self) {
        let (w, h) = self.target_size();
        let uniform = TransformUniform::new(projection_matrix(w as f32, h as f32), self.state.transform);
        self.queue.write_buffer(&self.transform_uniform, 0, bytemuck::cast_slice(&[uniform]));
    }

    fn write_frag_colour(&self, colour: Color) {
        let uniform = FragUniform { colour: colour.premultiplied() };
        self.queue.write_buffer(&self.frag_uniform, 0, bytemuck::cast_slice(&[uniform]));
    }

    fn bind_group(&self, texture: Option<TextureId>) -> wgpu::BindGroup {
        let (view, sampler) = texture
            .and_then(|id| self.textures.get(&id))
            .map(|t| (&t.view, &t.sampler))
            .unwrap_or((&self.dummy_texture, &self.dummy_sampler));

        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("inkstroke per-draw bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: self.transform_uniform.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: self.frag_uniform.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::TextureView(view) },
                wgpu::BindGroupEntry { binding: 3, resource: wgpu::BindingResource::Sampler(sampler) },
            ],
        })
    }

    fn clip_active(&self) -> bool {
        self.state.clip_depth > 0
    }

    fn stencil_reference(&self) -> u32 {
        clip_reference(self.state.clip_depth)
    }

    /// Stencil-marks `vertices` with non-zero winding via a `TRIANGLE_FAN`-equivalent triangle
    /// list (two-sided `INCR_WRAP`/`DECR_WRAP`), using `encoder` against the current target.
    fn mark_winding_fan(&mut self, encoder: &mut wgpu::CommandEncoder, vertices: &[f32]) {
        let fan = fan_triangle_list(vertices);
        if fan.is_empty() {
            return;
        }
        self.path_buf.upload(&self.device, &self.queue, bytemuck::cast_slice(&fan));
        self.write_transform();
        let bind_group = self.bind_group(None);
        let target = self.current_target_snapshot();

        let mut pass = Self::begin_pass(encoder, &target, wgpu::LoadOp::Load, wgpu::LoadOp::Load);
        pass.set_pipeline(&self.pipelines.mark_fill_path);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.set_stencil_reference(0);
        pass.set_vertex_buffer(0, self.path_buf.slice((fan.len() * std::mem::size_of::<PathVertex>()) as u64));
        pass.draw(0..fan.len() as u32, 0..1);
    }

    fn mark_winding_triangles(&mut self, encoder: &mut wgpu::CommandEncoder, vertices: &[f32]) {
        let tris = to_path_vertices(vertices);
        if tris.is_empty() {
            return;
        }
        self.path_buf.upload(&self.device, &self.queue, bytemuck::cast_slice(&tris));
        self.write_transform();
        let bind_group = self.bind_group(None);
        let target = self.current_target_snapshot();

        let mut pass = Self::begin_pass(encoder, &target, wgpu::LoadOp::Load, wgpu::LoadOp::Load);
        pass.set_pipeline(&self.pipelines.mark_fill_triangles);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.set_stencil_reference(1);
        pass.set_vertex_buffer(0, self.path_buf.slice((tris.len() * std::mem::size_of::<PathVertex>()) as u64));
        pass.draw(0..tris.len() as u32, 0..1);
    }

    fn resolve_paint(&mut self, encoder: &mut wgpu::CommandEncoder, colour: Color) {
        self.write_transform();
        self.write_frag_colour(colour);
        let bind_group = self.bind_group(None);
        let target = self.current_target_snapshot();

        let mut pass = Self::begin_pass(encoder, &target, wgpu::LoadOp::Load, wgpu::LoadOp::Load);
        pass.set_pipeline(&self.pipelines.resolve_solid);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.set_stencil_reference(0);
        pass.draw(0..3, 0..1);
    }

    fn resolve_erase_outside(&mut self, encoder: &mut wgpu::CommandEncoder) {
        self.write_frag_colour(Color::rgba(255, 255, 255, 255));
        let bind_group = self.bind_group(None);
        let target = self.current_target_snapshot();

        let mut pass = Self::begin_pass(encoder, &target, wgpu::LoadOp::Load, wgpu::LoadOp::Load);
        pass.set_pipeline(&self.pipelines.resolve_erase);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.set_stencil_reference(0);
        pass.draw(0..3, 0..1);
    }

    fn clear_winding_bits(&mut self, encoder: &mut wgpu::CommandEncoder) {
        let bind_group = self.bind_group(None);
        let target = self.current_target_snapshot();
        let mut pass = Self::begin_pass(encoder, &target, wgpu::LoadOp::Load, wgpu::LoadOp::Load);
        pass.set_pipeline(&self.pipelines.clear_winding_bits);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.set_stencil_reference(0);
        pass.draw(0..3, 0..1);
    }

    fn current_target_snapshot(&self) -> TargetViews {
        let t = self.current_target();
        TargetViews {
            draw_view: t.draw_view().clone(),
            resolve_target: t.resolve_target().cloned(),
            stencil_view: t.stencil_view.clone(),
        }
    }

    fn begin_pass<'e>(
        encoder: &'e mut wgpu::CommandEncoder,
        target: &'e TargetViews,
        color_load: wgpu::LoadOp<wgpu::Color>,
        stencil_load: wgpu::LoadOp<u32>,
    ) -> wgpu::RenderPass<'e> {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("inkstroke gpu pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.draw_view,
                resolve_target: target.resolve_target.as_ref(),
                ops: wgpu::Operations { load: color_load, store: wgpu::StoreOp::Store },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &target.stencil_view,
                depth_ops: None,
                stencil_ops: Some(wgpu::Operations { load: stencil_load, store: wgpu::StoreOp::Store }),
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        })
    }

    fn paint_program(
        &mut self,
        program: ProgramKind,
        texture: Option<TextureId>,
        vertex_bytes: &[u8],
        vertex_count: u32,
        instance_bytes: Option<&[u8]>,
        instance_count: u32,
        colour: Color,
    ) {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("inkstroke paint"),
        });

        self.write_transform();
        self.write_frag_colour(colour);
        let bind_group = self.bind_group(texture);
        let target = self.current_target_snapshot();
        let clipped = self.clip_active();
        let stencil_reference = self.stencil_reference();

        if !vertex_bytes.is_empty() {
            self.path_buf.upload(&self.device, &self.queue, vertex_bytes);
        }
        if let Some(bytes) = instance_bytes {
            self.instance_buf.upload(&self.device, &self.queue, bytes);
        }

        {
            let pipeline = self.pipelines.paint(program);
            let pipeline = if clipped { &pipeline.clipped } else { &pipeline.unclipped };
            let mut pass = Self::begin_pass(&mut encoder, &target, wgpu::LoadOp::Load, wgpu::LoadOp::Load);
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_stencil_reference(stencil_reference);
            if !vertex_bytes.is_empty() {
                pass.set_vertex_buffer(0, self.path_buf.slice(vertex_bytes.len() as u64));
            }
            if instance_bytes.is_some() {
                pass.set_vertex_buffer(0, self.quad.vertex_buffer.slice(..));
                pass.set_vertex_buffer(1, self.instance_buf.slice(instance_bytes.unwrap().len() as u64));
                pass.set_index_buffer(self.quad.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
                pass.draw_indexed(0..self.quad.index_count, 0, 0..instance_count);
            } else {
                pass.draw(0..vertex_count, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

struct TargetViews {
    draw_view: wgpu::TextureView,
    resolve_target: Option<wgpu::TextureView>,
    stencil_view: wgpu::TextureView,
}

fn to_path_vertices(flat: &[f32]) -> Vec<PathVertex> {
    flat.chunks_exact(2).map(|p| PathVertex { position: [p[0], p[1]], uv: [0.0, 0.0] }).collect()
}

/// Converts a closed-polygon flat vertex array into a `v0, vi, vi+1` triangle list, the
/// `TRIANGLE_LIST` equivalent of the spec's `TRIANGLE_FAN` (wgpu has no fan topology).
fn fan_triangle_list(flat: &[f32]) -> Vec<PathVertex> {
    let points = to_path_vertices(flat);
    if points.len() < 3 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity((points.len() - 2) * 3);
    for i in 1..points.len() - 1 {
        out.push(points[0]);
        out.push(points[i]);
        out.push(points[i + 1]);
    }
    out
}

impl DrawingBackend for GpuBackend {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.main = RenderTarget::new(&self.device, width, height, self.sample_count);
        self.offscreens.clear();
        self.state_cache.invalidate_all();
    }

    fn destroy(&mut self) {
        self.offscreens.clear();
        self.textures.clear();
        self.valid = false;
    }

    fn save(&mut self) {
        self.state_stack.push(self.state);
    }

    fn restore(&mut self) {
        if let Some(state) = self.state_stack.pop() {
            self.state = state;
        }
    }

    fn set_transform(&mut self, transform: Affine) {
        self.state.transform = transform;
    }

    fn compose_transform(&mut self, transform: Affine) {
        self.state.transform = self.state.transform.compose(&transform);
    }

    fn translate(&mut self, tx: f32, ty: f32) {
        self.compose_transform(Affine::translation(tx, ty));
    }

    fn scale(&mut self, sx: f32, sy: f32) {
        self.compose_transform(Affine::scaling(sx, sy));
    }

    fn get_transform(&self) -> Affine {
        self.state.transform
    }

    fn set_fill_colour(&mut self, colour: Color) {
        self.fill_colour = colour;
    }

    fn set_stroke_colour(&mut self, colour: Color) {
        self.stroke_colour = colour;
    }

    fn set_line_width(&mut self, width: f32) {
        self.line_width = width;
    }

    fn set_alpha(&mut self, alpha: f32) {
        self.state.alpha = alpha;
    }

    fn set_blend_mode(&mut self, mode: BlendMode) {
        self.state.blend_mode = mode;
    }

    fn clear(&mut self, colour: Color) {
        let mut encoder =
            self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("inkstroke clear") });
        let target = self.current_target_snapshot();
        let [r, g, b, a] = colour.premultiplied();
        {
            let _pass = Self::begin_pass(
                &mut encoder,
                &target,
                wgpu::LoadOp::Clear(wgpu::Color { r: r as f64, g: g as f64, b: b as f64, a: a as f64 }),
                wgpu::LoadOp::Clear(0),
            );
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn fill_rect(&mut self, rect: Rect) {
        let vertices = [
            rect.min_x, rect.min_y, rect.max_x, rect.min_y, rect.max_x, rect.max_y, rect.min_x, rect.max_y,
        ];
        self.fill_path(&vertices);
    }

    fn stroke_rect(&mut self, rect: Rect) {
        let segments = [
            rect.min_x, rect.min_y, rect.max_x, rect.min_y,
            rect.max_x, rect.min_y, rect.max_x, rect.max_y,
            rect.max_x, rect.max_y, rect.min_x, rect.max_y,
            rect.min_x, rect.max_y, rect.min_x, rect.min_y,
        ];
        let colour = self.stroke_colour;
        let width = self.line_width;
        self.draw_lines(&segments, colour, width);
    }

    fn fill_path(&mut self, vertices: &[f32]) {
        if vertices.len() < 6 {
            return;
        }
        let mut encoder =
            self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("inkstroke fill_path") });
        self.mark_winding_fan(&mut encoder, vertices);
        let colour = Color::rgba(
            self.fill_colour.0[0],
            self.fill_colour.0[1],
            self.fill_colour.0[2],
            (self.fill_colour.0[3] as f32 * self.state.alpha) as u8,
        );
        self.resolve_paint(&mut encoder, colour);
        self.clear_winding_bits(&mut encoder);
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn fill_triangles(&mut self, vertices: &[f32]) {
        if vertices.len() < 6 {
            return;
        }
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("inkstroke fill_triangles") });
        self.mark_winding_triangles(&mut encoder, vertices);
        let colour = Color::rgba(
            self.fill_colour.0[0],
            self.fill_colour.0[1],
            self.fill_colour.0[2],
            (self.fill_colour.0[3] as f32 * self.state.alpha) as u8,
        );
        self.resolve_paint(&mut encoder, colour);
        self.clear_winding_bits(&mut encoder);
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn draw_image(&mut self, texture: TextureId, dx: f32, dy: f32, dw: f32, dh: f32) {
        let vertices = [dx, dy, dx + dw, dy, dx + dw, dy + dh, dx, dy + dh];
        let path_vertices: Vec<PathVertex> = [0u16, 1, 2, 0, 2, 3]
            .iter()
            .map(|&i| {
                let p = &vertices[(i as usize) * 2..(i as usize) * 2 + 2];
                let uv = match i {
                    0 => [0.0, 0.0],
                    1 => [1.0, 0.0],
                    2 => [1.0, 1.0],
                    _ => [0.0, 1.0],
                };
                PathVertex { position: [p[0], p[1]], uv }
            })
            .collect();
        let bytes = bytemuck::cast_slice(&path_vertices).to_vec();
        let count = path_vertices.len() as u32;
        let alpha = (255.0 * self.state.alpha) as u8;
        self.paint_program(
            ProgramKind::Texture,
            Some(texture),
            &bytes,
            count,
            None,
            0,
            Color::rgba(255, 255, 255, alpha),
        );
    }

    fn clip_rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        let vertices = [x, y, x + w, y, x + w, y + h, x, y + h];
        self.clip_path(&vertices);
    }

    fn clip_path(&mut self, vertices: &[f32]) {
        if self.state.clip_depth >= MAX_CLIP_DEPTH {
            tracing::warn!("clip_path exceeded MAX_CLIP_DEPTH ({MAX_CLIP_DEPTH}); ignoring new clip level");
            return;
        }
        let mut encoder =
            self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("inkstroke clip_path") });
        self.mark_winding_fan(&mut encoder, vertices);

        let level = self.state.clip_depth + 1;
        {
            self.write_transform();
            let bind_group = self.bind_group(None);
            let target = self.current_target_snapshot();
            let mut pass = Self::begin_pass(&mut encoder, &target, wgpu::LoadOp::Load, wgpu::LoadOp::Load);
            pass.set_pipeline(&self.pipelines.invert_clip[(level - 1) as usize]);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_stencil_reference(0);
            pass.draw(0..3, 0..1);
        }
        self.clear_winding_bits(&mut encoder);
        self.queue.submit(std::iter::once(encoder.finish()));

        self.state.clip_depth = level;
    }

    fn mask_to_path(&mut self, vertices: &[f32]) {
        let mut encoder =
            self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("inkstroke mask_to_path") });
        self.mark_winding_fan(&mut encoder, vertices);
        self.resolve_erase_outside(&mut encoder);
        self.clear_winding_bits(&mut encoder);
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn mask_to_triangles(&mut self, vertices: &[f32]) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("inkstroke mask_to_triangles") });
        self.mark_winding_triangles(&mut encoder, vertices);
        self.resolve_erase_outside(&mut encoder);
        self.clear_winding_bits(&mut encoder);
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn get_offscreen(&mut self, id: TextureId, width: u32, height: u32) -> RenderResult<()> {
        let needs_alloc = self.offscreens.get(&id).map(|t| t.width != width || t.height != height).unwrap_or(true);
        if needs_alloc {
            if width == 0 || height == 0 {
                return Err(RenderError::ResourceUnavailable(format!(
                    "offscreen {id} requested with zero dimension ({width}x{height})"
                )));
            }
            self.offscreens.insert(id, RenderTarget::new(&self.device, width, height, self.sample_count));
        }
        Ok(())
    }

    fn begin_offscreen(&mut self, id: TextureId) {
        self.target_stack.push(self.target);
        self.offscreen_save_stack.push(self.state);
        self.target = Target::Offscreen(id);
        self.state.transform = Affine::IDENTITY;
        self.state.clip_depth = 0;
    }

    fn end_offscreen(&mut self) {
        if let Some(previous) = self.target_stack.pop() {
            self.target = previous;
        }
        if let Some(state) = self.offscreen_save_stack.pop() {
            self.state = state;
        }
    }

    fn draw_offscreen(&mut self, id: TextureId, dx: f32, dy: f32, dw: f32, dh: f32) {
        let Some(target) = self.offscreens.get(&id) else { return };
        let (w, h) = (target.width, target.height);
        let _ = (w, h);

        // The resolve colour texture is framebuffer-style (upside down relative to the main
        // surface), so the destination quad samples with a V-flipped UV.
        let vertices = [dx, dy, dx + dw, dy, dx + dw, dy + dh, dx, dy + dh];
        let uvs = [[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];
        let path_vertices: Vec<PathVertex> = [0usize, 1, 2, 0, 2, 3]
            .iter()
            .map(|&i| PathVertex { position: [vertices[i * 2], vertices[i * 2 + 1]], uv: uvs[i] })
            .collect();

        // `draw_offscreen` samples the offscreen's own resolve texture, which isn't part of
        // `self.textures`; bind it directly rather than going through `paint_program`.
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("inkstroke draw_offscreen") });
        self.write_transform();
        let alpha = (255.0 * self.state.alpha) as u8;
        self.write_frag_colour(Color::rgba(255, 255, 255, alpha));
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("inkstroke draw_offscreen bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: self.transform_uniform.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: self.frag_uniform.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::TextureView(&target.color_view) },
                wgpu::BindGroupEntry { binding: 3, resource: wgpu::BindingResource::Sampler(&sampler) },
            ],
        });
        self.path_buf.upload(&self.device, &self.queue, bytemuck::cast_slice(&path_vertices));
        let clipped = self.clip_active();
        let stencil_reference = self.stencil_reference();
        let main_target = self.current_target_snapshot();
        {
            let pipeline = if clipped { &self.pipelines.texture.clipped } else { &self.pipelines.texture.unclipped };
            let mut pass = Self::begin_pass(&mut encoder, &main_target, wgpu::LoadOp::Load, wgpu::LoadOp::Load);
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_stencil_reference(stencil_reference);
            pass.set_vertex_buffer(0, self.path_buf.slice((path_vertices.len() * std::mem::size_of::<PathVertex>()) as u64));
            pass.draw(0..path_vertices.len() as u32, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn draw_stamps(&mut self, texture: TextureId, stamps: &[Stamp]) {
        let instances: Vec<StampInstance> = stamps
            .iter()
            .filter(|s| s.opacity >= crate::stamps::OPACITY_DROP_THRESHOLD)
            .map(|s| StampInstance { x: s.x, y: s.y, size: s.size, opacity: s.opacity })
            .collect();
        if instances.is_empty() {
            return;
        }
        let bytes = bytemuck::cast_slice(&instances).to_vec();
        let count = instances.len() as u32;
        let alpha = (255.0 * self.state.alpha) as u8;
        self.paint_program(
            ProgramKind::Stamp,
            Some(texture),
            &[],
            0,
            Some(&bytes),
            count,
            Color::rgba(255, 255, 255, alpha),
        );
    }

    fn draw_stamp_discs(&mut self, colour: Color, stamps: &[Stamp]) {
        let instances: Vec<CircleInstance> = stamps
            .iter()
            .filter(|s| s.opacity >= crate::stamps::OPACITY_DROP_THRESHOLD)
            .map(|s| CircleInstance { cx: s.x, cy: s.y, radius: s.size * 0.5, color: colour.premultiplied() })
            .collect();
        if instances.is_empty() {
            return;
        }
        let bytes = bytemuck::cast_slice(&instances).to_vec();
        let count = instances.len() as u32;
        self.paint_program(ProgramKind::Circle, None, &[], 0, Some(&bytes), count, Color::TRANSPARENT);
    }

    fn apply_grain(&mut self, texture: TextureId, offset_x: f32, offset_y: f32, strength: f32) {
        let (w, h) = self.target_size();
        // Tiled at scale 0.3, translated by `(offset * 0.3, offset * 0.3)` (§4.12).
        let scale = 0.3f32;
        let vertices = [0.0, 0.0, w as f32, 0.0, w as f32, h as f32, 0.0, h as f32];
        let tile_offset = [offset_x * scale, offset_y * scale];
        let path_vertices: Vec<PathVertex> = [0usize, 1, 2, 0, 2, 3]
            .iter()
            .map(|&i| {
                let p = [vertices[i * 2], vertices[i * 2 + 1]];
                let uv = [p[0] * scale / w as f32 + tile_offset[0], p[1] * scale / h as f32 + tile_offset[1]];
                PathVertex { position: p, uv }
            })
            .collect();
        let bytes = bytemuck::cast_slice(&path_vertices).to_vec();
        let count = path_vertices.len() as u32;
        self.paint_program(
            ProgramKind::Grain,
            Some(texture),
            &bytes,
            count,
            None,
            0,
            Color::rgba(255, 255, 255, (255.0 * strength) as u8),
        );
    }

    fn create_texture(&mut self, source: &TextureSource) -> TextureId {
        let id = TextureId(self.next_texture_id);
        self.next_texture_id += 1;

        let texture = self.device.create_texture_with_data(
            &self.queue,
            &wgpu::TextureDescriptor {
                label: Some("inkstroke uploaded texture"),
                size: wgpu::Extent3d { width: source.width, height: source.height, depth_or_array_layers: 1 },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            source.pixels,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("inkstroke texture sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        self.textures.insert(id, UploadedTexture { view, sampler, width: source.width, height: source.height });
        id
    }

    fn delete_texture(&mut self, handle: TextureId) {
        self.textures.remove(&handle);
    }

    fn draw_lines(&mut self, segments: &[f32], colour: Color, width: f32) {
        let mut vertices = Vec::with_capacity(segments.len() * 2);
        for seg in segments.chunks_exact(4) {
            let (x0, y0, x1, y1) = (seg[0], seg[1], seg[2], seg[3]);
            let dx = x1 - x0;
            let dy = y1 - y0;
            let len = (dx * dx + dy * dy).sqrt().max(1e-6);
            let (nx, ny) = (-dy / len * width * 0.5, dx / len * width * 0.5);
            let c = colour.premultiplied();
            let quad = [
                ([x0 + nx, y0 + ny], -1.0),
                ([x1 + nx, y1 + ny], -1.0),
                ([x1 - nx, y1 - ny], 1.0),
                ([x0 - nx, y0 - ny], 1.0),
            ];
            for &idx in &[0usize, 1, 2, 0, 2, 3] {
                let (pos, edge) = quad[idx];
                vertices.push(LineVertex { position: pos, edge, color: c });
            }
        }
        if vertices.is_empty() {
            return;
        }

        let mut encoder =
            self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("inkstroke draw_lines") });
        self.write_transform();
        self.write_frag_colour(Color::TRANSPARENT);
        let bind_group = self.bind_group(None);
        self.line_buf.upload(&self.device, &self.queue, bytemuck::cast_slice(&vertices));
        let clipped = self.clip_active();
        let stencil_reference = self.stencil_reference();
        let target = self.current_target_snapshot();
        {
            let pipeline = if clipped { &self.pipelines.line.clipped } else { &self.pipelines.line.unclipped };
            let mut pass = Self::begin_pass(&mut encoder, &target, wgpu::LoadOp::Load, wgpu::LoadOp::Load);
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_stencil_reference(stencil_reference);
            pass.set_vertex_buffer(0, self.line_buf.slice((vertices.len() * std::mem::size_of::<LineVertex>()) as u64));
            pass.draw(0..vertices.len() as u32, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn draw_circles(&mut self, circles: &[f32], colour: Color) {
        let instances: Vec<CircleInstance> = circles
            .chunks_exact(3)
            .map(|c| CircleInstance { cx: c[0], cy: c[1], radius: c[2], color: colour.premultiplied() })
            .collect();
        if instances.is_empty() {
            return;
        }
        let bytes = bytemuck::cast_slice(&instances).to_vec();
        let count = instances.len() as u32;
        self.paint_program(ProgramKind::Circle, None, &[], 0, Some(&bytes), count, Color::TRANSPARENT);
    }
}

#[cfg(test)]
mod tests {
    use super::{fan_triangle_list, projection_matrix, to_path_vertices};

    #[test]
    fn projection_matrix_maps_corners_to_clip_space() {
        let m = projection_matrix(1024.0, 768.0);
        // top-left pixel (0, 0) -> clip (-1, 1)
        assert_eq!(m[2][0], -1.0);
        assert_eq!(m[2][1], 1.0);
        // y is flipped: scale factor is negative.
        assert!(m[1][1] < 0.0);
        assert_eq!(m[0][0], 2.0 / 1024.0);
    }

    #[test]
    fn to_path_vertices_pairs_up_flat_coordinates() {
        let flat = [0.0, 0.0, 10.0, 0.0, 10.0, 10.0];
        let verts = to_path_vertices(&flat);
        assert_eq!(verts.len(), 3);
        assert_eq!(verts[1].position, [10.0, 0.0]);
        assert_eq!(verts[0].uv, [0.0, 0.0]);
    }

    #[test]
    fn fan_triangle_list_emits_one_triangle_per_interior_vertex() {
        // A square: 4 points -> 2 triangles -> 6 vertices.
        let flat = [0.0, 0.0, 10.0, 0.0, 10.0, 10.0, 0.0, 10.0];
        let tris = fan_triangle_list(&flat);
        assert_eq!(tris.len(), 6);
        // Every triangle shares the fan's first vertex.
        assert_eq!(tris[0].position, [0.0, 0.0]);
        assert_eq!(tris[3].position, [0.0, 0.0]);
    }

    #[test]
    fn fan_triangle_list_is_empty_below_a_triangle() {
        let flat = [0.0, 0.0, 10.0, 0.0];
        assert!(fan_triangle_list(&flat).is_empty());
    }
}
