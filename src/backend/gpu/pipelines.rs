//! Pipeline construction for the six programs plus the stencil-protocol passes (§4.14).
//!
//! Stencil layout: bits 0-4 hold a non-zero winding counter (`WINDING_MASK`), bits 5-7 hold up
//! to three nested clip flags (`CLIP_MASK`, one bit per `clip_path` depth). Every "paint"
//! program (`solid`/`texture`/`stamp`/`grain`/`circle`/`line`) exists in a clipped and an
//! unclipped variant, since the stencil compare function is baked into the pipeline rather
//! than settable per draw; the active clip bit pattern itself is supplied per draw via
//! `set_stencil_reference`.

use wgpu::TextureFormat;

use crate::vertex::{CircleInstance, LineVertex, PathVertex, StampInstance};

use super::shaders;

pub const WINDING_MASK: u32 = 0x1F;
pub const CLIP_MASK: u32 = 0xE0;

/// Bits asserted once `depth` nested `clip_path` calls are active (depth in `1..=3`).
pub fn clip_reference(depth: u8) -> u32 {
    ((1u32 << depth) - 1) << 5
}

/// Which bit a given (1-indexed) clip nesting level owns.
pub fn clip_bit(level: u8) -> u32 {
    1 << (4 + level)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    Solid,
    Texture,
    Stamp,
    Grain,
    Circle,
    Line,
}

pub struct PaintPipeline {
    pub clipped: wgpu::RenderPipeline,
    pub unclipped: wgpu::RenderPipeline,
}

pub struct Pipelines {
    pub solid: PaintPipeline,
    pub texture: PaintPipeline,
    pub stamp: PaintPipeline,
    pub grain: PaintPipeline,
    pub circle: PaintPipeline,
    pub line: PaintPipeline,

    /// Pass 1 of `fill_path`: two-sided `INCR_WRAP`/`DECR_WRAP` winding mark, no colour output.
    pub mark_fill_path: wgpu::RenderPipeline,
    /// Pass 1 of `fill_triangles`: single-bit `REPLACE` mark, no colour output.
    pub mark_fill_triangles: wgpu::RenderPipeline,
    /// Pass 2 of `fill_path`/`fill_triangles`: full-screen paint where winding bits are
    /// non-zero, then reset to 0.
    pub resolve_solid: wgpu::RenderPipeline,
    /// `mask_to_path`/`mask_to_triangles` pass (b): full-screen destination-out erase where
    /// winding bits are still zero.
    pub resolve_erase: wgpu::RenderPipeline,
    /// `mask_to_path`/`mask_to_triangles` pass (c), and the shared winding-bit clear used after
    /// `fill_path`/`fill_triangles`: unconditional reset of bits 0-4, no colour output.
    pub clear_winding_bits: wgpu::RenderPipeline,
    /// `clip_path`: one pipeline per nesting level (`clip_reference`'s bit), `INVERT`-marks
    /// that level's bit, no colour output.
    pub invert_clip: [wgpu::RenderPipeline; 3],

    pub stencil_format: TextureFormat,
    pub color_format: TextureFormat,
    pub sample_count: u32,
}

fn path_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    PathVertex::desc()
}

fn instance_layouts(per_instance: wgpu::VertexBufferLayout<'static>) -> [wgpu::VertexBufferLayout<'static>; 2] {
    [path_vertex_layout(), per_instance]
}

fn blend_premultiplied() -> wgpu::BlendState {
    wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
    }
}

fn blend_destination_out() -> wgpu::BlendState {
    wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::Zero,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::Zero,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
    }
}

fn paint_stencil_state(clipped: bool) -> wgpu::StencilState {
    let face = wgpu::StencilFaceState {
        compare: if clipped { wgpu::CompareFunction::Equal } else { wgpu::CompareFunction::Always },
        fail_op: wgpu::StencilOperation::Keep,
        depth_fail_op: wgpu::StencilOperation::Keep,
        pass_op: wgpu::StencilOperation::Keep,
    };
    wgpu::StencilState {
        front: face,
        back: face,
        read_mask: if clipped { CLIP_MASK } else { 0 },
        write_mask: 0,
    }
}

fn build_pipeline(
    device: &wgpu::Device,
    label: &str,
    module: &wgpu::ShaderModule,
    layout: &wgpu::PipelineLayout,
    vertex_buffers: &[wgpu::VertexBufferLayout<'static>],
    color_format: TextureFormat,
    blend: Option<wgpu::BlendState>,
    color_writes: wgpu::ColorWrites,
    stencil_format: TextureFormat,
    stencil: wgpu::StencilState,
    sample_count: u32,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs_main"),
            buffers: vertex_buffers,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState { format: color_format, blend, write_mask: color_writes })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: stencil_format,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::Always,
            stencil,
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState { count: sample_count, ..Default::default() },
        multiview: None,
        cache: None,
    })
}

impl Pipelines {
    pub fn new(
        device: &wgpu::Device,
        color_format: TextureFormat,
        stencil_format: TextureFormat,
        sample_count: u32,
    ) -> Self {
        let solid_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("inkstroke solid shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::SOLID.into()),
        });
        let texture_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("inkstroke texture shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::TEXTURE.into()),
        });
        let stamp_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("inkstroke stamp shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::STAMP.into()),
        });
        let grain_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("inkstroke grain shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::GRAIN.into()),
        });
        let circle_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("inkstroke circle shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::CIRCLE.into()),
        });
        let line_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("inkstroke line shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::LINE.into()),
        });
        let fullscreen_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("inkstroke fullscreen resolve shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::FULLSCREEN_STENCIL_RESOLVE.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("inkstroke uniform bind group layout"),
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

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("inkstroke pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let make_paint = |label: &str,
                          module: &wgpu::ShaderModule,
                          buffers: &[wgpu::VertexBufferLayout<'static>],
                          blend: wgpu::BlendState| {
            PaintPipeline {
                clipped: build_pipeline(
                    device,
                    &format!("{label} (clipped)"),
                    module,
                    &layout,
                    buffers,
                    color_format,
                    Some(blend),
                    wgpu::ColorWrites::ALL,
                    stencil_format,
                    paint_stencil_state(true),
                    sample_count,
                ),
                unclipped: build_pipeline(
                    device,
                    &format!("{label} (unclipped)"),
                    module,
                    &layout,
                    buffers,
                    color_format,
                    Some(blend),
                    wgpu::ColorWrites::ALL,
                    stencil_format,
                    paint_stencil_state(false),
                    sample_count,
                ),
            }
        };

        let solid = make_paint("inkstroke solid pipeline", &solid_module, &[path_vertex_layout()], blend_premultiplied());
        let texture = make_paint("inkstroke texture pipeline", &texture_module, &[path_vertex_layout()], blend_premultiplied());
        let stamp = make_paint(
            "inkstroke stamp pipeline",
            &stamp_module,
            &instance_layouts(StampInstance::desc()),
            blend_premultiplied(),
        );
        // `apply_grain` is the only caller and always composites destination-out (§4.12).
        let grain = make_paint("inkstroke grain pipeline", &grain_module, &[path_vertex_layout()], blend_destination_out());
        let circle = make_paint(
            "inkstroke circle pipeline",
            &circle_module,
            &instance_layouts(CircleInstance::desc()),
            blend_premultiplied(),
        );
        let line = make_paint("inkstroke line pipeline", &line_module, &[LineVertex::desc()], blend_premultiplied());

        let mark_fill_path = build_pipeline(
            device,
            "inkstroke fill_path winding mark",
            &solid_module,
            &layout,
            &[path_vertex_layout()],
            color_format,
            None,
            wgpu::ColorWrites::empty(),
            stencil_format,
            wgpu::StencilState {
                front: wgpu::StencilFaceState {
                    compare: wgpu::CompareFunction::Always,
                    fail_op: wgpu::StencilOperation::Keep,
                    depth_fail_op: wgpu::StencilOperation::Keep,
                    pass_op: wgpu::StencilOperation::IncrementWrap,
                },
                back: wgpu::StencilFaceState {
                    compare: wgpu::CompareFunction::Always,
                    fail_op: wgpu::StencilOperation::Keep,
                    depth_fail_op: wgpu::StencilOperation::Keep,
                    pass_op: wgpu::StencilOperation::DecrementWrap,
                },
                read_mask: WINDING_MASK,
                write_mask: WINDING_MASK,
            },
            sample_count,
        );

        let mark_fill_triangles = build_pipeline(
            device,
            "inkstroke fill_triangles mark",
            &solid_module,
            &layout,
            &[path_vertex_layout()],
            color_format,
            None,
            wgpu::ColorWrites::empty(),
            stencil_format,
            wgpu::StencilState {
                front: wgpu::StencilFaceState {
                    compare: wgpu::CompareFunction::Always,
                    fail_op: wgpu::StencilOperation::Keep,
                    depth_fail_op: wgpu::StencilOperation::Keep,
                    pass_op: wgpu::StencilOperation::Replace,
                },
                back: wgpu::StencilFaceState {
                    compare: wgpu::CompareFunction::Always,
                    fail_op: wgpu::StencilOperation::Keep,
                    depth_fail_op: wgpu::StencilOperation::Keep,
                    pass_op: wgpu::StencilOperation::Replace,
                },
                read_mask: WINDING_MASK,
                write_mask: WINDING_MASK,
            },
            sample_count,
        );

        let resolve_solid = build_pipeline(
            device,
            "inkstroke winding resolve (paint + reset)",
            &fullscreen_module,
            &layout,
            &[],
            color_format,
            Some(blend_premultiplied()),
            wgpu::ColorWrites::ALL,
            stencil_format,
            wgpu::StencilState {
                front: wgpu::StencilFaceState {
                    compare: wgpu::CompareFunction::NotEqual,
                    fail_op: wgpu::StencilOperation::Keep,
                    depth_fail_op: wgpu::StencilOperation::Keep,
                    pass_op: wgpu::StencilOperation::Replace,
                },
                back: wgpu::StencilFaceState {
                    compare: wgpu::CompareFunction::NotEqual,
                    fail_op: wgpu::StencilOperation::Keep,
                    depth_fail_op: wgpu::StencilOperation::Keep,
                    pass_op: wgpu::StencilOperation::Replace,
                },
                read_mask: WINDING_MASK,
                write_mask: WINDING_MASK,
            },
            sample_count,
        );

        let resolve_erase = build_pipeline(
            device,
            "inkstroke mask erase (outside stencil)",
            &fullscreen_module,
            &layout,
            &[],
            color_format,
            Some(blend_destination_out()),
            wgpu::ColorWrites::ALL,
            stencil_format,
            wgpu::StencilState {
                front: wgpu::StencilFaceState {
                    compare: wgpu::CompareFunction::Equal,
                    fail_op: wgpu::StencilOperation::Keep,
                    depth_fail_op: wgpu::StencilOperation::Keep,
                    pass_op: wgpu::StencilOperation::Keep,
                },
                back: wgpu::StencilFaceState {
                    compare: wgpu::CompareFunction::Equal,
                    fail_op: wgpu::StencilOperation::Keep,
                    depth_fail_op: wgpu::StencilOperation::Keep,
                    pass_op: wgpu::StencilOperation::Keep,
                },
                read_mask: WINDING_MASK,
                write_mask: 0,
            },
            sample_count,
        );

        let clear_winding_bits = build_pipeline(
            device,
            "inkstroke winding bits clear",
            &fullscreen_module,
            &layout,
            &[],
            color_format,
            None,
            wgpu::ColorWrites::empty(),
            stencil_format,
            wgpu::StencilState {
                front: wgpu::StencilFaceState {
                    compare: wgpu::CompareFunction::Always,
                    fail_op: wgpu::StencilOperation::Keep,
                    depth_fail_op: wgpu::StencilOperation::Keep,
                    pass_op: wgpu::StencilOperation::Replace,
                },
                back: wgpu::StencilFaceState {
                    compare: wgpu::CompareFunction::Always,
                    fail_op: wgpu::StencilOperation::Keep,
                    depth_fail_op: wgpu::StencilOperation::Keep,
                    pass_op: wgpu::StencilOperation::Replace,
                },
                read_mask: WINDING_MASK,
                write_mask: WINDING_MASK,
            },
            sample_count,
        );

        let invert_clip = std::array::from_fn(|level_idx| {
            let bit = clip_bit(level_idx as u8 + 1);
            build_pipeline(
                device,
                "inkstroke clip_path invert",
                &fullscreen_module,
                &layout,
                &[],
                color_format,
                None,
                wgpu::ColorWrites::empty(),
                stencil_format,
                wgpu::StencilState {
                    front: wgpu::StencilFaceState {
                        compare: wgpu::CompareFunction::NotEqual,
                        fail_op: wgpu::StencilOperation::Keep,
                        depth_fail_op: wgpu::StencilOperation::Keep,
                        pass_op: wgpu::StencilOperation::Invert,
                    },
                    back: wgpu::StencilFaceState {
                        compare: wgpu::CompareFunction::NotEqual,
                        fail_op: wgpu::StencilOperation::Keep,
                        depth_fail_op: wgpu::StencilOperation::Keep,
                        pass_op: wgpu::StencilOperation::Invert,
                    },
                    read_mask: WINDING_MASK,
                    write_mask: bit,
                },
                sample_count,
            )
        });

        Self {
            solid,
            texture,
            stamp,
            grain,
            circle,
            line,
            mark_fill_path,
            mark_fill_triangles,
            resolve_solid,
            resolve_erase,
            clear_winding_bits,
            invert_clip,
            stencil_format,
            color_format,
            sample_count,
        }
    }

    pub fn paint(&self, program: ProgramKind) -> &PaintPipeline {
        match program {
            ProgramKind::Solid => &self.solid,
            ProgramKind::Texture => &self.texture,
            ProgramKind::Stamp => &self.stamp,
            ProgramKind::Grain => &self.grain,
            ProgramKind::Circle => &self.circle,
            ProgramKind::Line => &self.line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{clip_bit, clip_reference, CLIP_MASK};

    #[test]
    fn clip_reference_accumulates_one_bit_per_nesting_depth() {
        assert_eq!(clip_reference(0), 0);
        assert_eq!(clip_reference(1), clip_bit(1));
        assert_eq!(clip_reference(2), clip_bit(1) | clip_bit(2));
        assert_eq!(clip_reference(3), clip_bit(1) | clip_bit(2) | clip_bit(3));
    }

    #[test]
    fn clip_reference_stays_within_the_clip_mask() {
        for depth in 0..=3 {
            assert_eq!(clip_reference(depth) & !CLIP_MASK, 0);
        }
    }

    #[test]
    fn clip_bit_is_distinct_per_level() {
        let bits: Vec<u32> = (1..=3).map(clip_bit).collect();
        assert_ne!(bits[0], bits[1]);
        assert_ne!(bits[1], bits[2]);
        assert_eq!(bits[0], 0x20);
    }
}
