//! Stroke Dispatcher (C15): chooses vertex path vs stamp path per pen/LOD/pipeline and
//! orchestrates grain isolation and ink-shading composites (§4.15).
//!
//! Per §9's "cyclic callbacks -> explicit contexts" design note, rendering consumes two
//! borrow-only context bundles (`GrainContext`, `StampContext`) instead of reaching back
//! into a host object; there is no global state here.

use crate::backend::{BlendMode, DrawingBackend};
use crate::cache::Cache;
use crate::color::Color;
use crate::config::Pipeline;
use crate::error::RenderResult;
use crate::geom::{Affine, Point, Rect};
use crate::id::{Lod, TextureId};
use crate::ink_pool;
use crate::lod as lod_simplifier;
use crate::outline::{self, OutlineResult};
use crate::pen_config::{PenConfig, PenConfigRegistry};
use crate::pen_engine;
use crate::point;
use crate::stamps::{ink as ink_stamps, scatter, Stamp};
use crate::stroke::{PenStyle, PenType, Stroke};

/// Read-only `style_id -> PenStyle` lookup (§6 "a style provider"). `style_ref` is
/// `Stroke::style_ref`; a missing id falls back to the registry's built-in default (§4.3).
pub trait StyleProvider {
    fn lookup(&self, style_ref: u64) -> Option<PenStyle>;
}

/// Grain resources and per-pen-type overrides (§6 `grain_strength_overrides`), reused across
/// every stroke dispatched in a frame.
#[derive(Debug, Clone, Default)]
pub struct GrainContext {
    pub texture: Option<TextureId>,
    pub overrides: Vec<(PenType, f32)>,
}

impl GrainContext {
    /// Combines a pen-type override (if any) with the style's own `grain` amount. The spec
    /// names this combinator (`grainToTextureStrength`) without giving its formula; this
    /// blends the two multiplicatively so `style.grain == 0` always suppresses grain
    /// regardless of the configured base strength (recorded as an open-question decision in
    /// DESIGN.md).
    pub fn texture_strength(&self, pen: PenType, base_strength: f32, style_grain: f32) -> f32 {
        let overridden = self
            .overrides
            .iter()
            .find(|(p, _)| *p == pen)
            .map(|(_, s)| *s)
            .unwrap_or(base_strength);
        (overridden * style_grain.clamp(0.0, 1.0)).clamp(0.0, 1.0)
    }
}

/// Pre-coloured stamp textures for the pencil scatter (C8) and fountain ink-shading (C9)
/// passes. Absent when `pipeline != stamps`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StampContext {
    pub pencil_texture: Option<TextureId>,
    pub ink_texture: Option<TextureId>,
}

/// Reserved offscreen ids the dispatcher itself owns for per-stroke isolation passes. Only
/// one stroke renders synchronously at a time (§5), so a single fixed id per purpose is
/// reused across strokes, relying on `get_offscreen`'s "idempotent in id; resized on demand"
/// contract (§4.12) rather than allocating a fresh id per call.
const GRAIN_ISOLATION_OFFSCREEN: TextureId = TextureId(u64::MAX - 1);
const INK_SHADING_OFFSCREEN: TextureId = TextureId(u64::MAX - 2);

/// World-unit padding around a stroke's centerline bbox before it becomes a grain-isolation
/// screen region (§4.15 "expanded by 2 px" is expressed in *screen* pixels; see
/// `screen_region`, which adds this after the width expansion).
const GRAIN_ISOLATION_SCREEN_PAD: f32 = 2.0;

/// Renders one stroke. `lod`, `dark_mode`, and `pipeline` are resolved by the caller (tile
/// worker or host) once per batch; `path_cache` is shared across strokes in that batch.
pub fn render_stroke(
    backend: &mut dyn DrawingBackend,
    stroke: &Stroke,
    styles: &dyn StyleProvider,
    registry: &PenConfigRegistry,
    lod: Lod,
    pipeline: Pipeline,
    path_cache: &mut Cache,
    grain_ctx: &GrainContext,
    stamp_ctx: Option<&StampContext>,
) -> RenderResult<()> {
    // Step 1: resolve style + config.
    let base_style = styles.lookup(stroke.style_ref).unwrap_or_default();
    let style = *stroke.effective_style(&base_style);
    let cfg = registry.get(style.pen);

    let points = point::decode(&stroke.pts);
    if points.is_empty() {
        return Ok(());
    }
    let points = lod_simplifier::simplify(&points, lod);
    if points.is_empty() {
        return Ok(());
    }

    // The italic strategy (and with it, the nib itself) falls back to round whenever the
    // resolved style+config pair lacks a nib angle (§4.7) — check the same resolved params
    // `outline::generate` uses, not `cfg.nib_angle` directly, so a style's `round` flag (or a
    // style that simply never sets a nib) can toggle a fountain pen to round on its own.
    let fountain_round =
        style.pen == PenType::Fountain && pen_engine::EffectiveParams::resolve(&style, cfg).nib_angle.is_none();

    // Step 2: ink-shaded fountain.
    if pipeline == Pipeline::Stamps && cfg.ink_stamp.is_some() && lod == Lod::Full {
        let preset = cfg.ink_preset.unwrap_or(crate::stroke::INK_PRESET_STANDARD);
        if preset.shading > 0.0 {
            if let Some(ctx) = stamp_ctx {
                if let Some(ink_texture) = ctx.ink_texture {
                    render_ink_shaded(backend, stroke, &points, &style, cfg, &preset, path_cache, ink_texture)?;
                    return Ok(());
                }
            }
            // MissingResource: pre-coloured ink texture unavailable -> fall back to solid fill.
        }
        plain_fill(backend, &style, cfg, &points, path_cache, stroke)?;
        return Ok(());
    }

    // Step 3: pencil stamp.
    if pipeline == Pipeline::Stamps && cfg.stamp.is_some() && lod == Lod::Full {
        if let Some(ctx) = stamp_ctx {
            if let Some(pencil_texture) = ctx.pencil_texture {
                let widths = pen_engine::compute_widths(&points, &style, cfg);
                let opacities = pen_engine::compute_opacities(&points, &style, cfg);
                let grain_value = style.grain;
                let mut acc = scatter::ScatterAccumulator::default();
                let stamps = scatter::compute(
                    &points,
                    &widths,
                    &opacities,
                    cfg.stamp.as_ref().unwrap(),
                    grain_value,
                    &mut acc,
                );
                backend.draw_stamps(pencil_texture, &stamps);
                return Ok(());
            }
        }
        // MissingResource: pre-coloured pencil texture unavailable -> fall back to vertex path.
    }

    // Step 4: vertex path.
    let outline = resolve_outline(path_cache, stroke, &points, &style, cfg, lod);
    let base_grain_strength = cfg.grain.map(|g| g.strength).unwrap_or(0.0);
    let grain_strength = grain_ctx.texture_strength(style.pen, base_grain_strength, style.grain);
    let grain_enabled = cfg.grain.map(|g| g.enabled).unwrap_or(false);

    if pipeline != Pipeline::Basic && lod == Lod::Full && grain_enabled && grain_strength > 0.0 {
        if let Some(texture) = grain_ctx.texture {
            render_grain_isolated(backend, stroke, &style, &outline, texture, grain_strength)?;
        } else {
            // MissingResource: grain texture not uploaded -> fall back to drawing without grain.
            backend.set_fill_colour(style.color);
            backend.set_alpha(style.opacity);
            fill_outline(backend, &outline, &style);
            backend.set_alpha(1.0);
        }
    } else if cfg.highlighter_mode {
        backend.save();
        backend.set_alpha(cfg.base_opacity);
        backend.set_blend_mode(BlendMode::Multiply);
        backend.set_fill_colour(style.color);
        fill_outline(backend, &outline, &style);
        backend.restore();
    } else {
        backend.set_fill_colour(style.color);
        backend.set_alpha(style.opacity);
        fill_outline(backend, &outline, &style);
        backend.set_alpha(1.0);
    }

    // Fountain round pools overlay, lod 0 only.
    if fountain_round && lod == Lod::Full {
        let attrs = pen_engine::compute_attributes(&points[0], &style, cfg, None);
        let pools = ink_pool::detect(&points, attrs.width);
        if !pools.is_empty() {
            paint_pools(backend, &pools, style.color);
        }
    }

    Ok(())
}

fn resolve_outline(
    path_cache: &mut Cache,
    stroke: &Stroke,
    points: &[crate::stroke::StrokePoint],
    style: &PenStyle,
    cfg: &PenConfig,
    lod_key: Lod,
) -> OutlineResult {
    if path_cache.get(stroke.id, lod_key).is_none() {
        match outline::generate(points, style, cfg, false) {
            OutlineResult::Polygon(poly) => path_cache.set_outline(stroke.id, lod_key, poly),
            OutlineResult::Sides { left, right } => {
                path_cache.set_italic_sides(stroke.id, lod_key, left, right)
            }
        }
    }
    path_cache.get(stroke.id, lod_key).cloned().unwrap_or(OutlineResult::Polygon(Vec::new()))
}

fn fill_outline(backend: &mut dyn DrawingBackend, outline: &OutlineResult, _style: &PenStyle) {
    match outline {
        OutlineResult::Polygon(_) => backend.fill_path(&outline.to_flat_polygon()),
        OutlineResult::Sides { .. } => backend.fill_triangles(&sides_to_triangles(outline)),
    }
}

/// Triangulates italic sides the same way `Cache::get_vertices` does, for call sites that
/// have an `OutlineResult` but not a cache lookup in hand.
fn sides_to_triangles(outline: &OutlineResult) -> Vec<f32> {
    let OutlineResult::Sides { left, right } = outline else {
        return Vec::new();
    };
    let n = left.len().min(right.len());
    let mut out = Vec::with_capacity(n.saturating_sub(1) * 12);
    for i in 0..n.saturating_sub(1) {
        let quad = [left[i], right[i], right[i + 1], left[i], right[i + 1], left[i + 1]];
        for p in quad {
            out.push(p.x);
            out.push(p.y);
        }
    }
    out
}

fn plain_fill(
    backend: &mut dyn DrawingBackend,
    style: &PenStyle,
    cfg: &PenConfig,
    points: &[crate::stroke::StrokePoint],
    path_cache: &mut Cache,
    stroke: &Stroke,
) -> RenderResult<()> {
    let outline = resolve_outline(path_cache, stroke, points, style, cfg, Lod::Full);
    backend.set_fill_colour(style.color);
    backend.set_alpha(style.opacity);
    fill_outline(backend, &outline, style);
    backend.set_alpha(1.0);
    Ok(())
}

fn paint_pools(backend: &mut dyn DrawingBackend, pools: &[ink_pool::Pool], colour: Color) {
    let stamps: Vec<Stamp> = pools
        .iter()
        .map(|p| Stamp {
            x: p.x,
            y: p.y,
            size: p.radius * 2.0,
            opacity: p.opacity,
        })
        .collect();
    backend.draw_stamp_discs(colour, &stamps);
}

/// Maps a world-space rect through the backend's current transform to a screen-space rect.
fn screen_region(backend: &dyn DrawingBackend, world: Rect, pad: f32) -> Rect {
    let t = backend.get_transform();
    let corners = [
        t.apply(Point::new(world.min_x, world.min_y)),
        t.apply(Point::new(world.max_x, world.min_y)),
        t.apply(Point::new(world.max_x, world.max_y)),
        t.apply(Point::new(world.min_x, world.max_y)),
    ];
    let mut region = Rect::from_points(&corners);
    region.min_x -= pad;
    region.min_y -= pad;
    region.max_x += pad;
    region.max_y += pad;
    region
}

fn region_size(region: Rect) -> (u32, u32) {
    let w = region.width().ceil().max(1.0) as u32;
    let h = region.height().ceil().max(1.0) as u32;
    (w, h)
}

/// Composites an offscreen isolation pass back onto the main target at device coordinates
/// (the offscreen's pixels already correspond 1:1 to the region's screen pixels, so the
/// composite itself is done with the transform reset to identity).
fn composite_offscreen(backend: &mut dyn DrawingBackend, id: TextureId, region: Rect) {
    backend.save();
    backend.set_transform(Affine::IDENTITY);
    backend.draw_offscreen(id, region.min_x, region.min_y, region.width(), region.height());
    backend.restore();
}

fn render_grain_isolated(
    backend: &mut dyn DrawingBackend,
    stroke: &Stroke,
    style: &PenStyle,
    outline: &OutlineResult,
    grain_texture: TextureId,
    strength: f32,
) -> RenderResult<()> {
    let region = screen_region(backend, stroke.bbox, GRAIN_ISOLATION_SCREEN_PAD);
    let (w, h) = region_size(region);
    if backend.get_offscreen(GRAIN_ISOLATION_OFFSCREEN, w, h).is_err() {
        // MissingResource: offscreen allocation failed -> draw directly, losing isolation.
        backend.set_fill_colour(style.color);
        backend.set_alpha(style.opacity);
        fill_outline(backend, outline, style);
        backend.set_alpha(1.0);
        return Ok(());
    }

    let original_transform = backend.get_transform();
    backend.begin_offscreen(GRAIN_ISOLATION_OFFSCREEN);
    backend.set_transform(Affine::translation(-region.min_x, -region.min_y).compose(&original_transform));
    backend.set_fill_colour(style.color);
    backend.set_alpha(style.opacity);
    fill_outline(backend, outline, style);
    backend.set_alpha(1.0);

    match outline {
        OutlineResult::Polygon(_) => backend.clip_path(&outline.to_flat_polygon()),
        OutlineResult::Sides { .. } => backend.clip_path(&sides_to_triangles(outline)),
    }
    let (ox, oy) = stroke.grain_anchor.unwrap_or((stroke.bbox.min_x, stroke.bbox.min_y));
    backend.apply_grain(grain_texture, ox, oy, strength);
    backend.end_offscreen();

    composite_offscreen(backend, GRAIN_ISOLATION_OFFSCREEN, region);
    Ok(())
}

fn render_ink_shaded(
    backend: &mut dyn DrawingBackend,
    stroke: &Stroke,
    points: &[crate::stroke::StrokePoint],
    style: &PenStyle,
    cfg: &PenConfig,
    preset: &crate::stroke::InkPresetConfig,
    path_cache: &mut Cache,
    ink_texture: TextureId,
) -> RenderResult<()> {
    let outline = resolve_outline(path_cache, stroke, points, style, cfg, Lod::Full);

    let attrs = pen_engine::compute_attributes(&points[0], style, cfg, None);
    let expanded = Rect {
        min_x: stroke.bbox.min_x - attrs.width * 1.5,
        min_y: stroke.bbox.min_y - attrs.width * 1.5,
        max_x: stroke.bbox.max_x + attrs.width * 1.5,
        max_y: stroke.bbox.max_y + attrs.width * 1.5,
    };
    let region = screen_region(backend, expanded, 0.0);
    let (w, h) = region_size(region);
    if backend.get_offscreen(INK_SHADING_OFFSCREEN, w, h).is_err() {
        backend.set_fill_colour(style.color);
        backend.set_alpha(style.opacity);
        fill_outline(backend, &outline, style);
        backend.set_alpha(1.0);
        return Ok(());
    }

    let widths = pen_engine::compute_widths(points, style, cfg);
    let ink_stamp_cfg = cfg.ink_stamp.as_ref().unwrap();
    let mut acc = scatter::ScatterAccumulator::default();
    let stamps = ink_stamps::compute(points, &widths, attrs.width, ink_stamp_cfg, preset, &mut acc);

    let original_transform = backend.get_transform();
    backend.begin_offscreen(INK_SHADING_OFFSCREEN);
    backend.set_transform(Affine::translation(-region.min_x, -region.min_y).compose(&original_transform));
    backend.set_alpha(style.opacity);
    backend.draw_stamps(ink_texture, &stamps);
    backend.set_alpha(1.0);

    match &outline {
        OutlineResult::Sides { .. } => backend.mask_to_triangles(&sides_to_triangles(&outline)),
        OutlineResult::Polygon(_) => backend.mask_to_path(&outline.to_flat_polygon()),
    }
    backend.end_offscreen();

    composite_offscreen(backend, INK_SHADING_OFFSCREEN, region);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::raster::RasterBackend;
    use crate::color::Color;
    use crate::id::StrokeId;
    use crate::point;
    use crate::stroke::StrokePoint;

    struct FixedStyles(PenStyle);
    impl StyleProvider for FixedStyles {
        fn lookup(&self, _style_ref: u64) -> Option<PenStyle> {
            Some(self.0)
        }
    }

    fn ballpoint_stroke() -> Stroke {
        let points: Vec<StrokePoint> = (0..40)
            .map(|i| StrokePoint::new(100.0 + i as f32 * 5.0, 200.0, 0.5))
            .collect();
        let bbox = point::compute_bbox(&points);
        Stroke {
            id: StrokeId(1),
            page_index: 0,
            style_ref: 0,
            style_overrides: None,
            bbox,
            grain_anchor: None,
            point_count: points.len() as u32,
            pts: point::encode(&points),
        }
    }

    #[test]
    fn ballpoint_line_fills_without_grain_or_stamps() {
        let mut backend = RasterBackend::new(512, 512);
        let registry = PenConfigRegistry::new();
        let stroke = ballpoint_stroke();
        let style = PenStyle {
            pen: PenType::Ballpoint,
            color: Color::rgb(0x1a, 0x1a, 0x1a),
            ..PenStyle::default()
        };
        let styles = FixedStyles(style);
        let mut cache = Cache::new(16);
        let grain_ctx = GrainContext::default();

        render_stroke(
            &mut backend,
            &stroke,
            &styles,
            &registry,
            Lod::Full,
            Pipeline::Advanced,
            &mut cache,
            &grain_ctx,
            None,
        )
        .unwrap();

        assert_eq!(cache.len(), 1);
        assert!(!cache.is_italic(stroke.id, Lod::Full));
    }

    #[test]
    fn missing_stamp_texture_falls_back_to_vertex_path() {
        let mut backend = RasterBackend::new(256, 256);
        let registry = PenConfigRegistry::new();
        let points: Vec<StrokePoint> = (0..20)
            .map(|i| StrokePoint::new(i as f32 * 2.0, 0.0, 0.6))
            .collect();
        let bbox = point::compute_bbox(&points);
        let stroke = Stroke {
            id: StrokeId(2),
            page_index: 0,
            style_ref: 0,
            style_overrides: None,
            bbox,
            grain_anchor: None,
            point_count: points.len() as u32,
            pts: point::encode(&points),
        };
        let style = PenStyle {
            pen: PenType::Pencil,
            ..PenStyle::default()
        };
        let styles = FixedStyles(style);
        let mut cache = Cache::new(16);
        let grain_ctx = GrainContext::default();

        render_stroke(
            &mut backend,
            &stroke,
            &styles,
            &registry,
            Lod::Full,
            Pipeline::Stamps,
            &mut cache,
            &grain_ctx,
            None,
        )
        .unwrap();

        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn highlighter_style_does_not_panic() {
        let mut backend = RasterBackend::new(256, 256);
        let registry = PenConfigRegistry::new();
        let points: Vec<StrokePoint> = (0..15)
            .map(|i| StrokePoint::new(i as f32 * 3.0, (i as f32).sin() * 4.0, 1.0))
            .collect();
        let bbox = point::compute_bbox(&points);
        let stroke = Stroke {
            id: StrokeId(3),
            page_index: 0,
            style_ref: 0,
            style_overrides: None,
            bbox,
            grain_anchor: None,
            point_count: points.len() as u32,
            pts: point::encode(&points),
        };
        let style = PenStyle {
            pen: PenType::Highlighter,
            opacity: 1.0,
            ..PenStyle::default()
        };
        let styles = FixedStyles(style);
        let mut cache = Cache::new(16);
        let grain_ctx = GrainContext::default();

        render_stroke(
            &mut backend,
            &stroke,
            &styles,
            &registry,
            Lod::Full,
            Pipeline::Advanced,
            &mut cache,
            &grain_ctx,
            None,
        )
        .unwrap();
    }

    #[test]
    fn fountain_round_stroke_paints_pools() {
        let mut backend = RasterBackend::new(256, 256);
        let registry = PenConfigRegistry::new();
        let mut points = Vec::new();
        for i in 0..10 {
            points.push(StrokePoint {
                timestamp_ms: i as f64 * 200.0,
                ..StrokePoint::new(i as f32 * 0.1, 0.0, 0.6)
            });
        }
        for i in 0..10 {
            points.push(StrokePoint {
                timestamp_ms: (10 + i) as f64 * 200.0,
                ..StrokePoint::new(1.0, i as f32 * 0.1, 0.6)
            });
        }
        let bbox = point::compute_bbox(&points);
        let stroke = Stroke {
            id: StrokeId(4),
            page_index: 0,
            style_ref: 0,
            style_overrides: None,
            bbox,
            grain_anchor: None,
            point_count: points.len() as u32,
            pts: point::encode(&points),
        };
        let style = PenStyle {
            pen: PenType::Fountain,
            round: true,
            ..PenStyle::default()
        };
        let styles = FixedStyles(style);
        let mut cache = Cache::new(16);
        let grain_ctx = GrainContext::default();

        render_stroke(
            &mut backend,
            &stroke,
            &styles,
            &registry,
            Lod::Full,
            Pipeline::Advanced,
            &mut cache,
            &grain_ctx,
            None,
        )
        .unwrap();
    }
}
