//! Software Raster Backend (C13): `DrawingBackend` implemented over `tiny-skia`.

use super::{BlendMode, DrawState, DrawingBackend, TextureSource, MAX_CLIP_DEPTH};
use crate::color::Color;
use crate::error::{RenderError, RenderResult};
use crate::geom::{Affine, Rect};
use crate::id::TextureId;
use crate::stamps::Stamp;
use ahash::HashMap;
use tiny_skia::{
    FillRule, Mask, Paint, Path, PathBuilder, Pixmap, PixmapPaint, Transform as SkTransform,
};

fn to_sk_transform(a: Affine) -> SkTransform {
    SkTransform::from_row(a.a, a.b, a.c, a.d, a.e, a.f)
}

fn to_sk_color(c: Color) -> tiny_skia::Color {
    let [r, g, b, a] = c.normalize();
    tiny_skia::Color::from_rgba(r, g, b, a).unwrap_or(tiny_skia::Color::BLACK)
}

fn to_sk_blend(mode: BlendMode) -> tiny_skia::BlendMode {
    match mode {
        BlendMode::SourceOver => tiny_skia::BlendMode::SourceOver,
        BlendMode::DestinationIn => tiny_skia::BlendMode::DestinationIn,
        BlendMode::DestinationOut => tiny_skia::BlendMode::DestinationOut,
        BlendMode::Multiply => tiny_skia::BlendMode::Multiply,
    }
}

/// Builds a smooth closed path from a flat vertex-pair array using the midpoint-quadratic
/// construction: start at the midpoint of `v0v1`, then for each `i >= 1` emit a quadratic
/// through `vi` ending at the midpoint of `vi vi+1`, closing back through `v0` (§4.13).
fn midpoint_quadratic_path(vertices: &[f32]) -> Option<Path> {
    let n = vertices.len() / 2;
    if n < 2 {
        return None;
    }
    let pt = |i: usize| (vertices[i * 2], vertices[i * 2 + 1]);
    let mid = |a: (f32, f32), b: (f32, f32)| ((a.0 + b.0) * 0.5, (a.1 + b.1) * 0.5);

    let mut pb = PathBuilder::new();
    let p0 = pt(0);
    let start = mid(pt(n - 1), p0);
    pb.move_to(start.0, start.1);
    for i in 0..n {
        let cur = pt(i);
        let next = pt((i + 1) % n);
        let end = mid(cur, next);
        pb.quad_to(cur.0, cur.1, end.0, end.1);
    }
    pb.close();
    pb.finish()
}

/// Builds one sub-path per triangle with a consistent winding so overlapping triangles merge
/// under non-zero winding (§4.13).
fn triangles_path(vertices: &[f32]) -> Option<Path> {
    let tri_count = vertices.len() / 6;
    if tri_count == 0 {
        return None;
    }
    let mut pb = PathBuilder::new();
    for t in 0..tri_count {
        let base = t * 6;
        let mut pts = [
            (vertices[base], vertices[base + 1]),
            (vertices[base + 2], vertices[base + 3]),
            (vertices[base + 4], vertices[base + 5]),
        ];
        let signed_area = (pts[1].0 - pts[0].0) * (pts[2].1 - pts[0].1)
            - (pts[2].0 - pts[0].0) * (pts[1].1 - pts[0].1);
        if signed_area < 0.0 {
            pts.swap(1, 2);
        }
        pb.move_to(pts[0].0, pts[0].1);
        pb.line_to(pts[1].0, pts[1].1);
        pb.line_to(pts[2].0, pts[2].1);
        pb.close();
    }
    pb.finish()
}

fn rect_path(rect: Rect) -> Option<Path> {
    let mut pb = PathBuilder::new();
    pb.move_to(rect.min_x, rect.min_y);
    pb.line_to(rect.max_x, rect.min_y);
    pb.line_to(rect.max_x, rect.max_y);
    pb.line_to(rect.min_x, rect.max_y);
    pb.close();
    pb.finish()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Target {
    Main,
    Offscreen(TextureId),
}

struct OffscreenTarget {
    pixmap: Pixmap,
}

pub struct RasterBackend {
    main: Pixmap,
    offscreens: HashMap<TextureId, OffscreenTarget>,
    textures: HashMap<TextureId, Pixmap>,
    grain_patterns: HashMap<TextureId, Pixmap>,

    state: DrawState,
    state_stack: Vec<DrawState>,
    clip_mask: Option<Mask>,
    clip_stack: Vec<Option<Mask>>,

    fill_colour: Color,
    stroke_colour: Color,
    line_width: f32,

    target: Target,
    target_stack: Vec<Target>,
}

impl RasterBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            main: Pixmap::new(width.max(1), height.max(1)).expect("non-zero raster dimensions"),
            offscreens: HashMap::default(),
            textures: HashMap::default(),
            grain_patterns: HashMap::default(),
            state: DrawState::default(),
            state_stack: Vec::new(),
            clip_mask: None,
            clip_stack: Vec::new(),
            fill_colour: Color::BLACK,
            stroke_colour: Color::BLACK,
            line_width: 1.0,
            target: Target::Main,
            target_stack: Vec::new(),
        }
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.main
    }

    fn target_mut(&mut self) -> &mut Pixmap {
        match self.target {
            Target::Main => &mut self.main,
            Target::Offscreen(id) => {
                &mut self
                    .offscreens
                    .get_mut(&id)
                    .expect("get_offscreen called before use")
                    .pixmap
            }
        }
    }

    fn paint(&self, colour: Color) -> Paint<'static> {
        let mut paint = Paint::default();
        paint.set_color(to_sk_color(colour));
        paint.anti_alias = true;
        paint.blend_mode = to_sk_blend(self.state.blend_mode);
        paint
    }

    fn apply_global_alpha(paint: &mut Paint, alpha: f32) {
        if let tiny_skia::Shader::SolidColor(c) = paint.shader {
            paint.set_color_rgba8(
                (c.red() * 255.0) as u8,
                (c.green() * 255.0) as u8,
                (c.blue() * 255.0) as u8,
                (c.alpha() * 255.0 * alpha) as u8,
            );
        }
    }
}

impl DrawingBackend for RasterBackend {
    fn width(&self) -> u32 {
        self.main.width()
    }

    fn height(&self) -> u32 {
        self.main.height()
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.main = Pixmap::new(width.max(1), height.max(1)).expect("non-zero raster dimensions");
        self.offscreens.clear();
    }

    fn destroy(&mut self) {
        self.offscreens.clear();
        self.textures.clear();
        self.grain_patterns.clear();
    }

    fn save(&mut self) {
        self.state_stack.push(self.state);
        self.clip_stack.push(self.clip_mask.clone());
    }

    fn restore(&mut self) {
        if let Some(s) = self.state_stack.pop() {
            self.state = s;
        }
        if let Some(c) = self.clip_stack.pop() {
            self.clip_mask = c;
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
        self.state.alpha = alpha.clamp(0.0, 1.0);
    }

    fn set_blend_mode(&mut self, mode: BlendMode) {
        self.state.blend_mode = mode;
    }

    fn clear(&mut self, colour: Color) {
        self.target_mut().fill(to_sk_color(colour));
    }

    fn fill_rect(&mut self, rect: Rect) {
        let Some(path) = rect_path(rect) else { return };
        let mut paint = self.paint(self.fill_colour);
        Self::apply_global_alpha(&mut paint, self.state.alpha);
        let transform = to_sk_transform(self.state.transform);
        let clip = self.clip_mask.clone();
        self.target_mut()
            .fill_path(&path, &paint, FillRule::Winding, transform, clip.as_ref());
    }

    fn stroke_rect(&mut self, rect: Rect) {
        let Some(path) = rect_path(rect) else { return };
        let mut paint = self.paint(self.stroke_colour);
        Self::apply_global_alpha(&mut paint, self.state.alpha);
        let stroke = tiny_skia::Stroke {
            width: self.line_width,
            ..Default::default()
        };
        let transform = to_sk_transform(self.state.transform);
        let clip = self.clip_mask.clone();
        self.target_mut()
            .stroke_path(&path, &paint, &stroke, transform, clip.as_ref());
    }

    fn fill_path(&mut self, vertices: &[f32]) {
        let Some(path) = midpoint_quadratic_path(vertices) else { return };
        let mut paint = self.paint(self.fill_colour);
        Self::apply_global_alpha(&mut paint, self.state.alpha);
        let transform = to_sk_transform(self.state.transform);
        let clip = self.clip_mask.clone();
        self.target_mut()
            .fill_path(&path, &paint, FillRule::Winding, transform, clip.as_ref());
    }

    fn fill_triangles(&mut self, vertices: &[f32]) {
        let Some(path) = triangles_path(vertices) else { return };
        let mut paint = self.paint(self.fill_colour);
        Self::apply_global_alpha(&mut paint, self.state.alpha);
        let transform = to_sk_transform(self.state.transform);
        let clip = self.clip_mask.clone();
        self.target_mut()
            .fill_path(&path, &paint, FillRule::Winding, transform, clip.as_ref());
    }

    fn draw_image(&mut self, texture: TextureId, dx: f32, dy: f32, dw: f32, dh: f32) {
        let Some(src) = self.textures.get(&texture) else { return };
        let sx = dw / src.width() as f32;
        let sy = dh / src.height() as f32;
        let transform =
            to_sk_transform(self.state.transform).pre_concat(SkTransform::from_translate(dx, dy));
        let transform = transform.pre_concat(SkTransform::from_scale(sx, sy));
        let mut paint = PixmapPaint::default();
        paint.opacity = self.state.alpha;
        paint.blend_mode = to_sk_blend(self.state.blend_mode);
        let clip = self.clip_mask.clone();
        let src_ref = src.as_ref();
        self.target_mut()
            .draw_pixmap(0, 0, src_ref, &paint, transform, clip.as_ref());
    }

    fn clip_rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        self.clip_path(&[x, y, x + w, y, x + w, y + h, x, y + h]);
    }

    fn clip_path(&mut self, vertices: &[f32]) {
        if self.state.clip_depth >= MAX_CLIP_DEPTH {
            tracing::warn!("clip depth exceeded {MAX_CLIP_DEPTH}, ignoring nested clip_path");
            return;
        }
        let Some(path) = midpoint_quadratic_path(vertices) else { return };
        let transform = to_sk_transform(self.state.transform);
        let Some(path) = path.transform(transform) else { return };
        let (w, h) = (self.target_mut().width(), self.target_mut().height());

        // `path` is already transformed into device space above, so the mask itself is built
        // with an identity transform.
        let Some(mut mask) = Mask::new(w, h) else { return };
        mask.fill_path(&path, FillRule::Winding, true, SkTransform::identity());
        if let Some(existing) = &mut self.clip_mask {
            existing.intersect_path(&path, FillRule::Winding, true, SkTransform::identity());
        } else {
            self.clip_mask = Some(mask);
        }
        self.state.clip_depth += 1;
    }

    fn mask_to_path(&mut self, vertices: &[f32]) {
        let Some(path) = midpoint_quadratic_path(vertices) else { return };
        self.mask_with_path(&path);
    }

    fn mask_to_triangles(&mut self, vertices: &[f32]) {
        let Some(path) = triangles_path(vertices) else { return };
        self.mask_with_path(&path);
    }

    fn get_offscreen(&mut self, id: TextureId, width: u32, height: u32) -> RenderResult<()> {
        let needs_alloc = match self.offscreens.get(&id) {
            Some(existing) => existing.pixmap.width() != width || existing.pixmap.height() != height,
            None => true,
        };
        if needs_alloc {
            let pixmap = Pixmap::new(width.max(1), height.max(1))
                .ok_or_else(|| RenderError::ResourceUnavailable("offscreen pixmap allocation".into()))?;
            self.offscreens.insert(id, OffscreenTarget { pixmap });
        }
        Ok(())
    }

    fn begin_offscreen(&mut self, id: TextureId) {
        self.target_stack.push(self.target);
        self.target = Target::Offscreen(id);
    }

    fn end_offscreen(&mut self) {
        if let Some(prev) = self.target_stack.pop() {
            self.target = prev;
        }
    }

    fn draw_offscreen(&mut self, id: TextureId, dx: f32, dy: f32, dw: f32, dh: f32) {
        let Some(off) = self.offscreens.get(&id) else { return };
        let sx = dw / off.pixmap.width() as f32;
        let sy = dh / off.pixmap.height() as f32;
        let transform =
            to_sk_transform(self.state.transform).pre_concat(SkTransform::from_translate(dx, dy));
        let transform = transform.pre_concat(SkTransform::from_scale(sx, sy));
        let mut paint = PixmapPaint::default();
        paint.opacity = self.state.alpha;
        paint.blend_mode = to_sk_blend(self.state.blend_mode);
        let clip = self.clip_mask.clone();
        let src_ref = off.pixmap.as_ref();
        self.target_mut()
            .draw_pixmap(0, 0, src_ref, &paint, transform, clip.as_ref());
    }

    fn draw_stamps(&mut self, texture: TextureId, stamps: &[Stamp]) {
        for s in stamps {
            if s.opacity < 0.05 {
                continue;
            }
            let saved_alpha = self.state.alpha;
            self.state.alpha = s.opacity;
            self.draw_image(texture, s.x - s.size * 0.5, s.y - s.size * 0.5, s.size, s.size);
            self.state.alpha = saved_alpha;
        }
    }

    fn draw_stamp_discs(&mut self, colour: Color, stamps: &[Stamp]) {
        for s in stamps {
            if s.opacity < 0.05 {
                continue;
            }
            let mut pb = PathBuilder::new();
            pb.push_circle(s.x, s.y, s.size * 0.5);
            let Some(path) = pb.finish() else { continue };
            let mut paint = self.paint(colour);
            Self::apply_global_alpha(&mut paint, self.state.alpha * s.opacity);
            let transform = to_sk_transform(self.state.transform);
            let clip = self.clip_mask.clone();
            self.target_mut()
                .fill_path(&path, &paint, FillRule::Winding, transform, clip.as_ref());
        }
    }

    fn apply_grain(&mut self, texture: TextureId, offset_x: f32, offset_y: f32, strength: f32) {
        let Some(src) = self.grain_patterns.get(&texture).or_else(|| self.textures.get(&texture)) else {
            return;
        };
        let src = src.clone();
        let pattern_transform =
            SkTransform::from_translate(offset_x * 0.3, offset_y * 0.3).pre_concat(SkTransform::from_scale(0.3, 0.3));
        let mut paint = PixmapPaint::default();
        paint.opacity = strength;
        paint.blend_mode = tiny_skia::BlendMode::DestinationOut;
        let clip = self.clip_mask.clone();
        let target = self.target_mut();
        let tw = target.width() as i32;
        let th = target.height() as i32;
        let mut y = 0;
        while y < th {
            let mut x = 0;
            while x < tw {
                target.draw_pixmap(x, y, src.as_ref(), &paint, pattern_transform, clip.as_ref());
                x += src.width() as i32;
            }
            y += src.height() as i32;
        }
    }

    fn create_texture(&mut self, source: &TextureSource) -> TextureId {
        let mut pixmap = Pixmap::new(source.width.max(1), source.height.max(1))
            .expect("non-zero texture dimensions");
        pixmap.data_mut().copy_from_slice(source.pixels);
        let id = TextureId(self.textures.len() as u64 + 1);
        self.textures.insert(id, pixmap);
        id
    }

    fn delete_texture(&mut self, handle: TextureId) {
        self.textures.remove(&handle);
        self.grain_patterns.remove(&handle);
    }

    fn draw_lines(&mut self, segments: &[f32], colour: Color, width: f32) {
        let mut paint = self.paint(colour);
        Self::apply_global_alpha(&mut paint, self.state.alpha);
        let stroke = tiny_skia::Stroke {
            width,
            line_cap: tiny_skia::LineCap::Round,
            ..Default::default()
        };
        let transform = to_sk_transform(self.state.transform);
        let clip = self.clip_mask.clone();
        for seg in segments.chunks_exact(4) {
            let mut pb = PathBuilder::new();
            pb.move_to(seg[0], seg[1]);
            pb.line_to(seg[2], seg[3]);
            if let Some(path) = pb.finish() {
                self.target_mut()
                    .stroke_path(&path, &paint, &stroke, transform, clip.as_ref());
            }
        }
    }

    fn draw_circles(&mut self, circles: &[f32], colour: Color) {
        let mut paint = self.paint(colour);
        Self::apply_global_alpha(&mut paint, self.state.alpha);
        let transform = to_sk_transform(self.state.transform);
        let clip = self.clip_mask.clone();
        for c in circles.chunks_exact(3) {
            let mut pb = PathBuilder::new();
            pb.push_circle(c[0], c[1], c[2]);
            if let Some(path) = pb.finish() {
                self.target_mut()
                    .fill_path(&path, &paint, FillRule::Winding, transform, clip.as_ref());
            }
        }
    }
}

impl RasterBackend {
    /// Shared implementation for `mask_to_path`/`mask_to_triangles`: keeps pixels inside
    /// `path`, clears the rest, without affecting the persistent clip stack (§4.12). Rendered
    /// as a plain white fill into a scratch pixmap rather than a `ClipMask` so the keep alpha
    /// can be read back and multiplied into the target by hand.
    fn mask_with_path(&mut self, path: &Path) {
        let transform = to_sk_transform(self.state.transform);
        let Some(path) = path.clone().transform(transform) else { return };
        let (w, h) = (self.target_mut().width(), self.target_mut().height());

        let mut keep_mask = match Pixmap::new(w, h) {
            Some(p) => p,
            None => return,
        };
        let mut white = Paint::default();
        white.set_color(tiny_skia::Color::WHITE);
        white.anti_alias = true;
        keep_mask.fill_path(&path, &white, FillRule::Winding, SkTransform::identity(), None);

        let target = self.target_mut();
        for (pixel, keep) in target.pixels_mut().iter_mut().zip(keep_mask.pixels()) {
            let factor = keep.alpha() as f32 / 255.0;
            if factor >= 0.999 {
                continue;
            }
            let c = *pixel;
            *pixel = tiny_skia::PremultipliedColorU8::from_rgba(
                (c.red() as f32 * factor) as u8,
                (c.green() as f32 * factor) as u8,
                (c.blue() as f32 * factor) as u8,
                (c.alpha() as f32 * factor) as u8,
            )
            .unwrap_or(c);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Point;

    #[test]
    fn fills_a_square_without_panicking() {
        let mut backend = RasterBackend::new(32, 32);
        backend.set_fill_colour(Color::rgb(255, 0, 0));
        backend.fill_path(&[4.0, 4.0, 28.0, 4.0, 28.0, 28.0, 4.0, 28.0]);
        assert_eq!(backend.width(), 32);
    }

    #[test]
    fn offscreen_round_trip() {
        let mut backend = RasterBackend::new(16, 16);
        let id = TextureId(99);
        backend.get_offscreen(id, 8, 8).unwrap();
        backend.begin_offscreen(id);
        backend.clear(Color::rgb(10, 20, 30));
        backend.end_offscreen();
        backend.draw_offscreen(id, 0.0, 0.0, 8.0, 8.0);
    }

    #[test]
    fn midpoint_quadratic_requires_two_points() {
        assert!(midpoint_quadratic_path(&[0.0, 0.0]).is_none());
        assert!(midpoint_quadratic_path(&[0.0, 0.0, 1.0, 1.0, 2.0, 0.0]).is_some());
    }

    #[test]
    fn triangle_path_normalizes_winding() {
        let cw = [0.0, 0.0, 0.0, 1.0, 1.0, 0.0];
        let ccw = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
        assert!(triangles_path(&cw).is_some());
        assert!(triangles_path(&ccw).is_some());
        let _ = Point::ZERO;
    }
}
