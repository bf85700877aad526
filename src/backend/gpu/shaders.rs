//! WGSL source for the six programs (§4.14). The spec's glossary describes these as GLSL
//! 3.00 ES programs; wgpu only consumes WGSL (or SPIR-V), so they are authored here in WGSL
//! with the same six names and responsibilities rather than transliterated GLSL.

pub const SOLID: &str = r#"
struct Transform {
    columns: array<vec4<f32>, 3>,
};
@group(0) @binding(0) var<uniform> transform: Transform;

struct VertexOut {
    @builtin(position) position: vec4<f32>,
};

@vertex
fn vs_main(@location(0) position: vec2<f32>, @location(1) uv: vec2<f32>) -> VertexOut {
    let c0 = transform.columns[0].xy;
    let c1 = transform.columns[1].xy;
    let c2 = transform.columns[2].xy;
    let p = c0 * position.x + c1 * position.y + c2;
    var out: VertexOut;
    out.position = vec4<f32>(p, 0.0, 1.0);
    let _unused = uv;
    return out;
}

struct FragUniforms {
    colour: vec4<f32>,
};
@group(0) @binding(1) var<uniform> frag: FragUniforms;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return frag.colour;
}
"#;

pub const TEXTURE: &str = r#"
struct Transform {
    columns: array<vec4<f32>, 3>,
};
@group(0) @binding(0) var<uniform> transform: Transform;

struct FragUniforms {
    colour: vec4<f32>,
};
@group(0) @binding(1) var<uniform> frag: FragUniforms;
@group(0) @binding(2) var tex: texture_2d<f32>;
@group(0) @binding(3) var samp: sampler;

struct VertexOut {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@location(0) position: vec2<f32>, @location(1) uv: vec2<f32>) -> VertexOut {
    let c0 = transform.columns[0].xy;
    let c1 = transform.columns[1].xy;
    let c2 = transform.columns[2].xy;
    let p = c0 * position.x + c1 * position.y + c2;
    var out: VertexOut;
    out.position = vec4<f32>(p, 0.0, 1.0);
    out.uv = uv;
    return out;
}

@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4<f32> {
    let c = textureSample(tex, samp, in.uv);
    // `frag.colour.a` carries the caller's opacity (§4.12 `set_alpha` / `draw_offscreen` alpha).
    return c * frag.colour.a;
}
"#;

/// Instanced per-dot draw: per-instance `[x, y, size, opacity]`.
pub const STAMP: &str = r#"
struct Transform {
    columns: array<vec4<f32>, 3>,
};
@group(0) @binding(0) var<uniform> transform: Transform;

struct FragUniforms {
    colour: vec4<f32>,
};
@group(0) @binding(1) var<uniform> frag: FragUniforms;
@group(0) @binding(2) var tex: texture_2d<f32>;
@group(0) @binding(3) var samp: sampler;

struct VertexOut {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) opacity: f32,
};

@vertex
fn vs_main(
    @location(0) quad_pos: vec2<f32>,
    @location(1) quad_uv: vec2<f32>,
    @location(2) instance: vec4<f32>,
) -> VertexOut {
    let centre = instance.xy;
    let size = instance.z;
    let opacity = instance.w;
    let world = centre + quad_pos * size;

    let c0 = transform.columns[0].xy;
    let c1 = transform.columns[1].xy;
    let c2 = transform.columns[2].xy;
    let p = c0 * world.x + c1 * world.y + c2;

    var out: VertexOut;
    out.position = vec4<f32>(p, 0.0, 1.0);
    out.uv = quad_uv;
    out.opacity = opacity;
    return out;
}

@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4<f32> {
    let c = textureSample(tex, samp, in.uv);
    // Per-instance opacity (the stamp's own deposit alpha) times the caller's global alpha.
    return c * in.opacity * frag.colour.a;
}
"#;

/// Tiled grain sample used by `apply_grain`, composited destination-out at the caller's
/// `strength`.
pub const GRAIN: &str = TEXTURE;

/// Instanced SDF disc, AA'd with `fwidth`.
pub const CIRCLE: &str = r#"
struct Transform {
    columns: array<vec4<f32>, 3>,
};
@group(0) @binding(0) var<uniform> transform: Transform;

struct VertexOut {
    @builtin(position) position: vec4<f32>,
    @location(0) local: vec2<f32>,
    @location(1) colour: vec4<f32>,
};

@vertex
fn vs_main(
    @location(0) quad_pos: vec2<f32>,
    @location(1) _quad_uv: vec2<f32>,
    @location(2) instance_centre_radius: vec3<f32>,
    @location(3) instance_colour: vec4<f32>,
) -> VertexOut {
    let centre = instance_centre_radius.xy;
    let radius = instance_centre_radius.z;
    let world = centre + quad_pos * radius * 2.0;

    let c0 = transform.columns[0].xy;
    let c1 = transform.columns[1].xy;
    let c2 = transform.columns[2].xy;
    let p = c0 * world.x + c1 * world.y + c2;

    var out: VertexOut;
    out.position = vec4<f32>(p, 0.0, 1.0);
    out.local = quad_pos * 2.0;
    out.colour = instance_colour;
    return out;
}

@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4<f32> {
    let d = length(in.local);
    let aa = fwidth(d);
    let alpha = 1.0 - smoothstep(1.0 - aa, 1.0 + aa, d);
    return in.colour * alpha;
}
"#;

/// Quad-per-segment with an `edge` coordinate in `[-1, +1]` for analytic AA.
pub const LINE: &str = r#"
struct Transform {
    columns: array<vec4<f32>, 3>,
};
@group(0) @binding(0) var<uniform> transform: Transform;

struct VertexOut {
    @builtin(position) position: vec4<f32>,
    @location(0) edge: f32,
    @location(1) colour: vec4<f32>,
};

@vertex
fn vs_main(
    @location(0) position: vec2<f32>,
    @location(1) edge: f32,
    @location(2) colour: vec4<f32>,
) -> VertexOut {
    let c0 = transform.columns[0].xy;
    let c1 = transform.columns[1].xy;
    let c2 = transform.columns[2].xy;
    let p = c0 * position.x + c1 * position.y + c2;

    var out: VertexOut;
    out.position = vec4<f32>(p, 0.0, 1.0);
    out.edge = edge;
    out.colour = colour;
    return out;
}

@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4<f32> {
    let alpha = 1.0 - smoothstep(0.5, 1.0, abs(in.edge));
    return in.colour * alpha;
}
"#;

/// Full-screen quad used by the stencil resolve/reset passes and by `apply_grain`'s fallback.
pub const FULLSCREEN_STENCIL_RESOLVE: &str = r#"
struct VertexOut {
    @builtin(position) position: vec4<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOut {
    var positions = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(3.0, -1.0),
        vec2<f32>(-1.0, 3.0),
    );
    var out: VertexOut;
    out.position = vec4<f32>(positions[index], 0.0, 1.0);
    return out;
}

struct FragUniforms {
    colour: vec4<f32>,
};
@group(0) @binding(0) var<uniform> frag: FragUniforms;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return frag.colour;
}
"#;
