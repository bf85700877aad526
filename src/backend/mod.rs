//! Drawing Backend Interface (C12) and its two implementations: the software raster backend
//! (C13, over `tiny-skia`) and the GPU backend (C14, over `wgpu`).

pub mod gpu;
pub mod raster;

use crate::color::Color;
use crate::error::RenderResult;
use crate::geom::{Affine, Rect};
use crate::id::TextureId;
use crate::stamps::Stamp;

/// Blend modes a backend must support (§4.12).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    SourceOver,
    DestinationIn,
    DestinationOut,
    Multiply,
}

impl Default for BlendMode {
    fn default() -> Self {
        BlendMode::SourceOver
    }
}

/// A texture upload source. Pixels are tightly packed, row-major, straight-alpha RGBA8.
pub struct TextureSource<'a> {
    pub width: u32,
    pub height: u32,
    pub pixels: &'a [u8],
}

/// Drawing-state captured by `save`/`restore`, in addition to the transform itself: current
/// alpha, blend mode, active clip depth, and scissor rect (§4.12).
#[derive(Debug, Clone, Copy)]
pub struct DrawState {
    pub transform: Affine,
    pub alpha: f32,
    pub blend_mode: BlendMode,
    pub clip_depth: u8,
    pub scissor: Option<Rect>,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            transform: Affine::IDENTITY,
            alpha: 1.0,
            blend_mode: BlendMode::SourceOver,
            clip_depth: 0,
            scissor: None,
        }
    }
}

/// Maximum nested `clip_path` depth (§4.14): exceeding it logs a warning and the new level is
/// a no-op.
pub const MAX_CLIP_DEPTH: u8 = 3;

/// The drawing backend contract (§4.12). All primitives obey the current transform unless
/// stated otherwise; colour strings/values are always sRGB, parsed via `Color::parse_hex`.
pub trait DrawingBackend {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn resize(&mut self, width: u32, height: u32);
    fn destroy(&mut self);

    fn save(&mut self);
    fn restore(&mut self);
    fn set_transform(&mut self, transform: Affine);
    fn compose_transform(&mut self, transform: Affine);
    fn translate(&mut self, tx: f32, ty: f32);
    fn scale(&mut self, sx: f32, sy: f32);
    fn get_transform(&self) -> Affine;

    fn set_fill_colour(&mut self, colour: Color);
    fn set_stroke_colour(&mut self, colour: Color);
    fn set_line_width(&mut self, width: f32);
    fn set_alpha(&mut self, alpha: f32);
    fn set_blend_mode(&mut self, mode: BlendMode);

    fn clear(&mut self, colour: Color);
    fn fill_rect(&mut self, rect: Rect);
    fn stroke_rect(&mut self, rect: Rect);
    /// `vertices` is a flat `[x0, y0, x1, y1, ...]` array interpreted as a closed polygon.
    fn fill_path(&mut self, vertices: &[f32]);
    /// Every 3 vertices (6 floats) is one triangle.
    fn fill_triangles(&mut self, vertices: &[f32]);
    fn draw_image(&mut self, texture: TextureId, dx: f32, dy: f32, dw: f32, dh: f32);

    /// Fast scissor path when axis-aligned.
    fn clip_rect(&mut self, x: f32, y: f32, w: f32, h: f32);
    /// Nested up to `MAX_CLIP_DEPTH`.
    fn clip_path(&mut self, vertices: &[f32]);

    /// Keeps pixels inside the path, clears the rest. Does not nest, and does not affect
    /// stencil clip state visible to subsequent calls.
    fn mask_to_path(&mut self, vertices: &[f32]);
    fn mask_to_triangles(&mut self, vertices: &[f32]);

    /// Idempotent in `id`; resized on demand.
    fn get_offscreen(&mut self, id: TextureId, width: u32, height: u32) -> RenderResult<()>;
    fn begin_offscreen(&mut self, id: TextureId);
    fn end_offscreen(&mut self);
    fn draw_offscreen(&mut self, id: TextureId, dx: f32, dy: f32, dw: f32, dh: f32);

    /// Batched; `texture` is pre-coloured.
    fn draw_stamps(&mut self, texture: TextureId, stamps: &[Stamp]);
    /// Textureless circles, stamps with opacity below 0.05 are skipped.
    fn draw_stamp_discs(&mut self, colour: Color, stamps: &[Stamp]);

    /// Over the current clip, removes intensity by the tiled `texture` sampled at scale 0.3,
    /// offset by `(offset * 0.3, offset * 0.3)`, with global alpha `strength` in
    /// destination-out.
    fn apply_grain(&mut self, texture: TextureId, offset_x: f32, offset_y: f32, strength: f32);

    fn create_texture(&mut self, source: &TextureSource) -> TextureId;
    fn delete_texture(&mut self, handle: TextureId);

    fn draw_lines(&mut self, segments: &[f32], colour: Color, width: f32);
    fn draw_circles(&mut self, circles: &[f32], colour: Color);

    /// No-op permissible on the GPU backend; shadows are used only by paper backgrounds.
    fn set_shadow(&mut self, _colour: Color, _offset_x: f32, _offset_y: f32, _blur: f32) {}
    fn clear_shadow(&mut self) {}
}
