//! End-to-end scenarios (§8 S1-S6): each drives `render_stroke` or the tile worker through a
//! realistic stroke and checks the externally observable behaviour — backend call sequence,
//! cache contents, pool counts — rather than re-deriving properties already proven at the
//! unit level in `src/stamps/ink.rs`, `src/ink_pool.rs`, and `src/stamps/scatter.rs`.

use inkstroke::backend::raster::RasterBackend;
use inkstroke::backend::{BlendMode, DrawingBackend, TextureSource};
use inkstroke::cache::Cache;
use inkstroke::color::Color;
use inkstroke::config::Pipeline;
use inkstroke::dispatcher::{render_stroke, GrainContext, StampContext, StyleProvider};
use inkstroke::geom::{Affine, Rect};
use inkstroke::id::{Lod, StrokeId, TextureId};
use inkstroke::ink_pool;
use inkstroke::pen_config::PenConfigRegistry;
use inkstroke::stamps::Stamp;
use inkstroke::stroke::{PenStyle, PenType, Stroke, StrokePoint};
use inkstroke::tile_worker::{
    BackgroundResolver, LayoutDirection, PageBackground, PageRect, PatternTheme, StyleMap,
    TileKey, TileWorker, WorkerRequest, WorkerResponse,
};

/// One call of interest observed on the backend, for asserting call sequences the public
/// `DrawingBackend`/`RasterBackend` surface otherwise has no way to report.
#[derive(Debug, Clone, PartialEq)]
enum Event {
    FillPath,
    FillTriangles,
    DrawStamps(usize),
    DrawStampDiscs(usize),
    SetAlpha(u32),
    SetBlendMode(BlendMode),
    BeginOffscreen,
    EndOffscreen,
    DrawOffscreen,
    MaskToTriangles,
    MaskToPath,
    ClipPath,
    Save,
    Restore,
}

fn alpha_key(a: f32) -> u32 {
    (a * 1000.0).round() as u32
}

/// Wraps a `RasterBackend`, delegating every `DrawingBackend` method while logging the calls
/// a scenario cares about. Necessary because neither `RasterBackend` nor the trait itself
/// expose call counts or an event history.
struct SpyBackend {
    inner: RasterBackend,
    events: Vec<Event>,
}

impl SpyBackend {
    fn new(width: u32, height: u32) -> Self {
        Self {
            inner: RasterBackend::new(width, height),
            events: Vec::new(),
        }
    }

    fn count(&self, event: &Event) -> usize {
        self.events.iter().filter(|e| *e == event).count()
    }
}

impl DrawingBackend for SpyBackend {
    fn width(&self) -> u32 {
        self.inner.width()
    }

    fn height(&self) -> u32 {
        self.inner.height()
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.inner.resize(width, height);
    }

    fn destroy(&mut self) {
        self.inner.destroy();
    }

    fn save(&mut self) {
        self.events.push(Event::Save);
        self.inner.save();
    }

    fn restore(&mut self) {
        self.events.push(Event::Restore);
        self.inner.restore();
    }

    fn set_transform(&mut self, transform: Affine) {
        self.inner.set_transform(transform);
    }

    fn compose_transform(&mut self, transform: Affine) {
        self.inner.compose_transform(transform);
    }

    fn translate(&mut self, tx: f32, ty: f32) {
        self.inner.translate(tx, ty);
    }

    fn scale(&mut self, sx: f32, sy: f32) {
        self.inner.scale(sx, sy);
    }

    fn get_transform(&self) -> Affine {
        self.inner.get_transform()
    }

    fn set_fill_colour(&mut self, colour: Color) {
        self.inner.set_fill_colour(colour);
    }

    fn set_stroke_colour(&mut self, colour: Color) {
        self.inner.set_stroke_colour(colour);
    }

    fn set_line_width(&mut self, width: f32) {
        self.inner.set_line_width(width);
    }

    fn set_alpha(&mut self, alpha: f32) {
        self.events.push(Event::SetAlpha(alpha_key(alpha)));
        self.inner.set_alpha(alpha);
    }

    fn set_blend_mode(&mut self, mode: BlendMode) {
        self.events.push(Event::SetBlendMode(mode));
        self.inner.set_blend_mode(mode);
    }

    fn clear(&mut self, colour: Color) {
        self.inner.clear(colour);
    }

    fn fill_rect(&mut self, rect: Rect) {
        self.inner.fill_rect(rect);
    }

    fn stroke_rect(&mut self, rect: Rect) {
        self.inner.stroke_rect(rect);
    }

    fn fill_path(&mut self, vertices: &[f32]) {
        self.events.push(Event::FillPath);
        self.inner.fill_path(vertices);
    }

    fn fill_triangles(&mut self, vertices: &[f32]) {
        self.events.push(Event::FillTriangles);
        self.inner.fill_triangles(vertices);
    }

    fn draw_image(&mut self, texture: TextureId, dx: f32, dy: f32, dw: f32, dh: f32) {
        self.inner.draw_image(texture, dx, dy, dw, dh);
    }

    fn clip_rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        self.inner.clip_rect(x, y, w, h);
    }

    fn clip_path(&mut self, vertices: &[f32]) {
        self.events.push(Event::ClipPath);
        self.inner.clip_path(vertices);
    }

    fn mask_to_path(&mut self, vertices: &[f32]) {
        self.events.push(Event::MaskToPath);
        self.inner.mask_to_path(vertices);
    }

    fn mask_to_triangles(&mut self, vertices: &[f32]) {
        self.events.push(Event::MaskToTriangles);
        self.inner.mask_to_triangles(vertices);
    }

    fn get_offscreen(&mut self, id: TextureId, width: u32, height: u32) -> inkstroke::RenderResult<()> {
        self.inner.get_offscreen(id, width, height)
    }

    fn begin_offscreen(&mut self, id: TextureId) {
        self.events.push(Event::BeginOffscreen);
        self.inner.begin_offscreen(id);
    }

    fn end_offscreen(&mut self) {
        self.events.push(Event::EndOffscreen);
        self.inner.end_offscreen();
    }

    fn draw_offscreen(&mut self, id: TextureId, dx: f32, dy: f32, dw: f32, dh: f32) {
        self.events.push(Event::DrawOffscreen);
        self.inner.draw_offscreen(id, dx, dy, dw, dh);
    }

    fn draw_stamps(&mut self, texture: TextureId, stamps: &[Stamp]) {
        self.events.push(Event::DrawStamps(stamps.len()));
        self.inner.draw_stamps(texture, stamps);
    }

    fn draw_stamp_discs(&mut self, colour: Color, stamps: &[Stamp]) {
        self.events.push(Event::DrawStampDiscs(stamps.len()));
        self.inner.draw_stamp_discs(colour, stamps);
    }

    fn apply_grain(&mut self, texture: TextureId, offset_x: f32, offset_y: f32, strength: f32) {
        self.inner.apply_grain(texture, offset_x, offset_y, strength);
    }

    fn create_texture(&mut self, source: &TextureSource) -> TextureId {
        self.inner.create_texture(source)
    }

    fn delete_texture(&mut self, handle: TextureId) {
        self.inner.delete_texture(handle);
    }

    fn draw_lines(&mut self, segments: &[f32], colour: Color, width: f32) {
        self.inner.draw_lines(segments, colour, width);
    }

    fn draw_circles(&mut self, circles: &[f32], colour: Color) {
        self.inner.draw_circles(circles, colour);
    }
}

struct FixedStyle(PenStyle);
impl StyleProvider for FixedStyle {
    fn lookup(&self, _style_ref: u64) -> Option<PenStyle> {
        Some(self.0)
    }
}

fn straight_stroke(id: u64, n: usize, pressure: f32) -> Stroke {
    let points: Vec<StrokePoint> = (0..n)
        .map(|i| StrokePoint::new(100.0 + i as f32 * 5.0, 200.0, pressure))
        .collect();
    let bbox = inkstroke::point::compute_bbox(&points);
    Stroke {
        id: StrokeId(id),
        page_index: 0,
        style_ref: 0,
        style_overrides: None,
        bbox,
        grain_anchor: None,
        point_count: points.len() as u32,
        pts: inkstroke::point::encode(&points),
    }
}

fn curved_stroke(id: u64, n: usize) -> Stroke {
    let points: Vec<StrokePoint> = (0..n)
        .map(|i| {
            let t = i as f32;
            StrokePoint::new(t * 3.0, (t * 0.3).sin() * 12.0, 0.6)
        })
        .collect();
    let bbox = inkstroke::point::compute_bbox(&points);
    Stroke {
        id: StrokeId(id),
        page_index: 0,
        style_ref: 0,
        style_overrides: None,
        bbox,
        grain_anchor: None,
        point_count: points.len() as u32,
        pts: inkstroke::point::encode(&points),
    }
}

/// S1: a plain ballpoint line under `Pipeline::Advanced` (no grain configured for ballpoint,
/// no stamps requested) takes the plain vertex-path fill branch exactly once.
#[test]
fn s1_ballpoint_line_is_a_single_plain_fill() {
    let mut backend = SpyBackend::new(512, 512);
    let registry = PenConfigRegistry::new();
    let stroke = straight_stroke(1, 40, 0.5);
    let styles = FixedStyle(PenStyle {
        pen: PenType::Ballpoint,
        ..PenStyle::default()
    });
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

    assert_eq!(backend.count(&Event::FillPath), 1);
    assert_eq!(backend.count(&Event::FillTriangles), 0);
    assert!(backend.events.iter().all(|e| !matches!(e, Event::DrawStamps(_))));
    assert!(backend.events.iter().all(|e| !matches!(e, Event::BeginOffscreen)));
    assert_eq!(backend.count(&Event::SetAlpha(alpha_key(1.0))), 1);

    let outline = cache.get(stroke.id, Lod::Full).expect("outline cached");
    assert!(!outline.is_italic());
    assert!(outline.to_flat_polygon().len() / 2 >= 3);
}

/// S2: a pencil curve under `Pipeline::Stamps` with a pencil texture available takes the
/// stamp path — one `draw_stamps` call, no `fill_path`/`fill_triangles`.
#[test]
fn s2_pencil_curve_dispatches_to_stamps() {
    let mut backend = SpyBackend::new(512, 512);
    let registry = PenConfigRegistry::new();
    let stroke = curved_stroke(2, 30);
    let styles = FixedStyle(PenStyle {
        pen: PenType::Pencil,
        ..PenStyle::default()
    });
    let mut cache = Cache::new(16);
    let grain_ctx = GrainContext::default();
    let pencil_texture = backend.create_texture(&TextureSource {
        width: 1,
        height: 1,
        pixels: &[255, 255, 255, 255],
    });
    let stamp_ctx = StampContext {
        pencil_texture: Some(pencil_texture),
        ink_texture: None,
    };

    render_stroke(
        &mut backend,
        &stroke,
        &styles,
        &registry,
        Lod::Full,
        Pipeline::Stamps,
        &mut cache,
        &grain_ctx,
        Some(&stamp_ctx),
    )
    .unwrap();

    let stamp_events: Vec<_> = backend
        .events
        .iter()
        .filter_map(|e| match e {
            Event::DrawStamps(n) => Some(*n),
            _ => None,
        })
        .collect();
    assert_eq!(stamp_events.len(), 1);
    assert!(stamp_events[0] > 0);
    assert_eq!(backend.count(&Event::FillPath), 0);
    assert_eq!(backend.count(&Event::FillTriangles), 0);
}

/// S3: a fast fountain stroke under `Pipeline::Stamps` with an ink texture available takes
/// the ink-shaded offscreen path: begin -> stamps -> mask -> end -> composite. The
/// fast-vs-slow deposit opacity property itself is already proven by
/// `stamps::ink::faster_segments_deposit_less`; this only checks the call sequence.
#[test]
fn s3_fountain_italic_fast_stroke_uses_ink_shading_offscreen() {
    let mut backend = SpyBackend::new(512, 512);
    let registry = PenConfigRegistry::new();
    let points: Vec<StrokePoint> = (0..25)
        .map(|i| StrokePoint {
            timestamp_ms: i as f64 * 4.0, // fast: 5 world units every 4 ms
            ..StrokePoint::new(i as f32 * 5.0, 0.0, 0.7)
        })
        .collect();
    let bbox = inkstroke::point::compute_bbox(&points);
    let stroke = Stroke {
        id: StrokeId(3),
        page_index: 0,
        style_ref: 0,
        style_overrides: None,
        bbox,
        grain_anchor: None,
        point_count: points.len() as u32,
        pts: inkstroke::point::encode(&points),
    };
    let styles = FixedStyle(PenStyle {
        pen: PenType::Fountain,
        ..PenStyle::default()
    });
    let mut cache = Cache::new(16);
    let grain_ctx = GrainContext::default();
    let ink_texture = backend.create_texture(&TextureSource {
        width: 1,
        height: 1,
        pixels: &[255, 255, 255, 255],
    });
    let stamp_ctx = StampContext {
        pencil_texture: None,
        ink_texture: Some(ink_texture),
    };

    render_stroke(
        &mut backend,
        &stroke,
        &styles,
        &registry,
        Lod::Full,
        Pipeline::Stamps,
        &mut cache,
        &grain_ctx,
        Some(&stamp_ctx),
    )
    .unwrap();

    let sequence: Vec<&Event> = backend
        .events
        .iter()
        .filter(|e| {
            matches!(
                e,
                Event::BeginOffscreen
                    | Event::DrawStamps(_)
                    | Event::MaskToTriangles
                    | Event::MaskToPath
                    | Event::EndOffscreen
                    | Event::DrawOffscreen
            )
        })
        .collect();

    assert!(matches!(sequence.first(), Some(Event::BeginOffscreen)));
    assert!(sequence.iter().any(|e| matches!(e, Event::DrawStamps(_))));
    assert!(sequence
        .iter()
        .any(|e| matches!(e, Event::MaskToTriangles | Event::MaskToPath)));
    assert!(matches!(
        sequence.iter().rev().nth(1),
        Some(Event::EndOffscreen)
    ));
    assert!(matches!(sequence.last(), Some(Event::DrawOffscreen)));
}

/// S4: a round-fountain stroke (style `round: true`, clearing the nib so the pool overlay
/// branch in the dispatcher fires) with two slow, sharp corners paints its vertex-path body
/// once and then overlays start/end pools plus a dwell pool per corner in a single
/// `draw_stamp_discs` batch, each faint (opacity <= 0.25, dwell pools <= 0.15). Dispatched
/// through `render_stroke` end to end, not by calling the ink-pool detector (C10) directly.
#[test]
fn s4_round_fountain_slow_dwelling_stroke_yields_faint_corner_pools() {
    let mut backend = SpyBackend::new(512, 512);
    let registry = PenConfigRegistry::new();

    let mut points = Vec::new();
    for i in 0..10 {
        points.push(StrokePoint {
            timestamp_ms: i as f64 * 250.0,
            ..StrokePoint::new(i as f32 * 0.1, 0.0, 0.6)
        });
    }
    for i in 0..10 {
        points.push(StrokePoint {
            timestamp_ms: (10 + i) as f64 * 250.0,
            ..StrokePoint::new(1.0, i as f32 * 0.1, 0.6)
        });
    }
    for i in 0..10 {
        points.push(StrokePoint {
            timestamp_ms: (20 + i) as f64 * 250.0,
            ..StrokePoint::new(1.0 - i as f32 * 0.1, 1.0, 0.6)
        });
    }
    let bbox = inkstroke::point::compute_bbox(&points);
    let stroke = Stroke {
        id: StrokeId(4),
        page_index: 0,
        style_ref: 0,
        style_overrides: None,
        bbox,
        grain_anchor: None,
        point_count: points.len() as u32,
        pts: inkstroke::point::encode(&points),
    };
    let styles = FixedStyle(PenStyle {
        pen: PenType::Fountain,
        round: true,
        ..PenStyle::default()
    });
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

    assert_eq!(backend.count(&Event::FillPath), 1);
    let disc_events: Vec<_> = backend
        .events
        .iter()
        .filter_map(|e| match e {
            Event::DrawStampDiscs(n) => Some(*n),
            _ => None,
        })
        .collect();
    assert_eq!(disc_events.len(), 1, "expected exactly one pool overlay batch");
    assert!(
        disc_events[0] >= 4,
        "expected start + end + at least 2 dwell pools, got {}",
        disc_events[0]
    );

    let outline = cache.get(stroke.id, Lod::Full).expect("outline cached");
    assert!(!outline.is_italic(), "round fountain must not take the italic outline strategy");

    let pools = ink_pool::detect(&points, 3.0);
    for pool in &pools {
        assert!(pool.opacity <= 0.25, "pool opacity {} exceeds the endpoint ceiling", pool.opacity);
    }
    let dwell_pools = &pools[1..pools.len() - 1];
    for pool in dwell_pools {
        assert!(pool.opacity <= 0.15, "dwell pool opacity {} exceeds 0.15", pool.opacity);
    }
}

/// S5: a highlighter stroke is a single fill wrapped in save/restore, multiplied over the
/// page at the pen's base opacity.
#[test]
fn s5_highlighter_is_one_multiply_fill_at_base_opacity() {
    let mut backend = SpyBackend::new(256, 256);
    let registry = PenConfigRegistry::new();
    let stroke = straight_stroke(5, 20, 1.0);
    let styles = FixedStyle(PenStyle {
        pen: PenType::Highlighter,
        opacity: 1.0,
        ..PenStyle::default()
    });
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

    assert_eq!(backend.count(&Event::FillPath), 1);
    assert_eq!(backend.count(&Event::Save), 1);
    assert_eq!(backend.count(&Event::Restore), 1);
    assert_eq!(backend.count(&Event::SetBlendMode(BlendMode::Multiply)), 1);
    assert_eq!(backend.count(&Event::SetAlpha(alpha_key(0.3))), 1);

    let fill_idx = backend.events.iter().position(|e| *e == Event::FillPath).unwrap();
    let save_idx = backend.events.iter().position(|e| *e == Event::Save).unwrap();
    let restore_idx = backend.events.iter().position(|e| *e == Event::Restore).unwrap();
    assert!(save_idx < fill_idx);
    assert!(fill_idx < restore_idx);
}

struct PlainDesk;
impl BackgroundResolver for PlainDesk {
    fn desk_colour(&self, _is_dark: bool) -> Color {
        Color::rgb(180, 180, 180)
    }
    fn resolve(&self, _page_index: u32, _is_dark: bool) -> PageBackground {
        PageBackground {
            paper_color: Color::rgb(255, 255, 255),
            pattern_theme: PatternTheme::Light,
        }
    }
}

/// S6: a tile worker renders only the strokes whose world-space bbox intersects the tile's
/// requested bounds, even when the document holds more strokes than that.
#[test]
fn s6_tile_worker_renders_only_intersecting_strokes() {
    let worker = TileWorker::spawn(Box::new(PlainDesk));
    worker.send(WorkerRequest::Init { grain_image: None });
    assert!(matches!(worker.recv(), Some(WorkerResponse::Ready)));

    // US Letter in world units at 1 wu == 1 pt: 612 x 792.
    let page = PageRect {
        index: 0,
        rect: Rect {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 612.0,
            max_y: 792.0,
        },
    };

    let in_tile = straight_stroke(10, 10, 0.5); // near (100, 200)
    let also_in_tile = curved_stroke(11, 10); // near (0..90, small y)
    let far_away = straight_stroke(12, 10, 0.5);
    let far_away = Stroke {
        bbox: Rect {
            min_x: 500.0,
            min_y: 700.0,
            max_x: 560.0,
            max_y: 780.0,
        },
        ..far_away
    };

    let mut styles = StyleMap::new();
    styles.insert(0, PenStyle::default());

    let expected_ids = vec![in_tile.id, also_in_tile.id];

    worker.send(WorkerRequest::DocUpdate {
        strokes: vec![in_tile, also_in_tile, far_away],
        styles,
        pages: vec![page],
        layout_direction: LayoutDirection::Vertical,
        pipeline: Some(Pipeline::Advanced),
    });

    worker.send(WorkerRequest::RenderTile {
        tile_key: TileKey(42),
        world_bounds: Rect {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 256.0,
            max_y: 256.0,
        },
        zoom_band: 0,
        tile_physical_px: (256, 256),
        tile_world_size: 256.0,
        stroke_ids: vec![StrokeId(10), StrokeId(11), StrokeId(12)],
        is_dark_mode: false,
    });

    match worker.recv() {
        Some(WorkerResponse::TileResult {
            tile_key,
            bitmap,
            mut stroke_ids_rendered,
        }) => {
            assert_eq!(tile_key, TileKey(42));
            assert_eq!(bitmap.width, 256);
            assert_eq!(bitmap.height, 256);
            stroke_ids_rendered.sort_by_key(|id| id.0);
            let mut expected = expected_ids;
            expected.sort_by_key(|id| id.0);
            assert_eq!(stroke_ids_rendered, expected);
        }
        other => panic!(
            "expected TileResult, got: {}",
            match other {
                Some(WorkerResponse::TileError { error_text, .. }) => error_text,
                _ => "none".to_string(),
            }
        ),
    }
}
