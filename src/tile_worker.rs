//! Tile Worker Pipeline (C16): a coordinator/worker-thread split for off-screen tile
//! rendering. One `TileWorker` per OS thread; the worker owns a private path cache, pen
//! registry, and software backend, and never shares mutable state with the coordinator or
//! its siblings (§5). All communication is by message over `crossbeam_channel`.

use std::thread::{self, JoinHandle};

use ahash::{HashMap, HashSet};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use tracing::{debug, debug_span, warn};

use crate::backend::raster::RasterBackend;
use crate::backend::{DrawingBackend, TextureSource};
use crate::cache::Cache;
use crate::color::Color;
use crate::config::Pipeline;
use crate::dispatcher::{self, GrainContext, StampContext, StyleProvider};
use crate::geom::{Affine, Rect};
use crate::id::{StrokeId, TextureId};
use crate::lod;
use crate::pen_config::PenConfigRegistry;
use crate::stroke::{PenStyle, PenType, Stroke};

/// Opaque tile identifier, round-tripped verbatim (§4.16).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey(pub u64);

/// A page's rectangle in world space, used for background painting and stroke clipping.
#[derive(Debug, Clone, Copy)]
pub struct PageRect {
    pub index: u32,
    pub rect: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutDirection {
    Vertical,
    Horizontal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternTheme {
    Light,
    Dark,
}

/// Resolved per-page background (§6 "background resolver").
#[derive(Debug, Clone, Copy)]
pub struct PageBackground {
    pub paper_color: Color,
    pub pattern_theme: PatternTheme,
}

/// Maps `(page, dark-mode)` to desk colour / paper colour / pattern theme. Implemented by
/// the host; called once per overlapping page per tile. Must be `Send` to cross into the
/// worker thread.
pub trait BackgroundResolver: Send {
    fn desk_colour(&self, is_dark: bool) -> Color;
    fn resolve(&self, page_index: u32, is_dark: bool) -> PageBackground;
}

/// A read-only `style_ref -> PenStyle` snapshot, sent wholesale on `doc_update` (§6's
/// "style provider", made concrete so it can cross the channel without a trait object).
#[derive(Debug, Clone, Default)]
pub struct StyleMap(HashMap<u64, PenStyle>);

impl StyleMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, style_ref: u64, style: PenStyle) {
        self.0.insert(style_ref, style);
    }
}

impl FromIterator<(u64, PenStyle)> for StyleMap {
    fn from_iter<I: IntoIterator<Item = (u64, PenStyle)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl StyleProvider for StyleMap {
    fn lookup(&self, style_ref: u64) -> Option<PenStyle> {
        self.0.get(&style_ref).copied()
    }
}

/// Raw pixel source for the grain texture (`init`/`grain_update`). Straight-alpha RGBA8,
/// row-major, matching `TextureSource`.
#[derive(Debug, Clone)]
pub struct GrainImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// A rendered tile, transferred back to the coordinator. The pixel buffer is moved through
/// the channel rather than re-encoded, so the hand-off itself is zero-copy; the one
/// unavoidable copy is lifting pixels out of the backend's internally-owned pixmap (C13
/// exposes no `take`), done exactly once per tile.
#[derive(Debug, Clone)]
pub struct TileBitmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Main -> worker messages (§4.16).
pub enum WorkerRequest {
    Init {
        grain_image: Option<GrainImage>,
    },
    DocUpdate {
        strokes: Vec<Stroke>,
        styles: StyleMap,
        pages: Vec<PageRect>,
        layout_direction: LayoutDirection,
        pipeline: Option<Pipeline>,
    },
    /// `strength_overrides` is an associative sequence, not a map, since the transport
    /// does not structurally clone maps (§4.16).
    GrainUpdate {
        grain_image: Option<GrainImage>,
        strength_overrides: Vec<(PenType, f32)>,
    },
    StampInit {
        enabled: bool,
    },
    InkStampInit {
        enabled: bool,
    },
    RenderTile {
        tile_key: TileKey,
        world_bounds: Rect,
        zoom_band: u8,
        tile_physical_px: (u32, u32),
        tile_world_size: f32,
        stroke_ids: Vec<StrokeId>,
        is_dark_mode: bool,
    },
    Cancel {
        tile_key: Option<TileKey>,
    },
    Destroy,
}

/// Worker -> main messages (§4.16).
pub enum WorkerResponse {
    Ready,
    TileResult {
        tile_key: TileKey,
        bitmap: TileBitmap,
        stroke_ids_rendered: Vec<StrokeId>,
    },
    TileError {
        tile_key: TileKey,
        error_text: String,
    },
}

/// A single small opaque placeholder texture used when a stamp cache is enabled but the
/// host has not (yet) supplied a pre-coloured stamp texture of its own. Kept tiny since it
/// only needs to exist for `draw_stamps` to have a valid handle.
fn placeholder_stamp_texture(backend: &mut RasterBackend) -> TextureId {
    let pixels = [255u8, 255, 255, 255];
    backend.create_texture(&TextureSource {
        width: 1,
        height: 1,
        pixels: &pixels,
    })
}

/// Maps a tile's coarse zoom band to a representative zoom factor fed into
/// `lod::select_lod`. Bands are the same four buckets `select_lod` itself uses; each maps to
/// a value comfortably inside that bucket (invented mapping — the spec names
/// `zoomBandBaseZoom` without defining it, see DESIGN.md).
fn zoom_band_base_zoom(zoom_band: u8) -> f32 {
    match zoom_band {
        0 => 1.0,
        1 => 0.3,
        2 => 0.15,
        _ => 0.05,
    }
}

struct WorkerState {
    registry: PenConfigRegistry,
    path_cache: Cache,
    backend: RasterBackend,
    strokes: HashMap<StrokeId, Stroke>,
    stroke_order: Vec<StrokeId>,
    styles: StyleMap,
    pages: Vec<PageRect>,
    #[allow(dead_code)]
    layout_direction: LayoutDirection,
    pipeline: Pipeline,
    grain_texture: Option<TextureId>,
    grain_overrides: Vec<(PenType, f32)>,
    stamp_enabled: bool,
    ink_stamp_enabled: bool,
    pencil_texture: Option<TextureId>,
    ink_texture: Option<TextureId>,
    background_resolver: Box<dyn BackgroundResolver>,
}

const PATH_CACHE_CAPACITY: usize = 256;
/// The persistent backend is resized to fit every tile it renders; this is just its initial
/// allocation before the first `render_tile`.
const INITIAL_BACKEND_SIZE: u32 = 256;

impl WorkerState {
    fn new(background_resolver: Box<dyn BackgroundResolver>) -> Self {
        Self {
            registry: PenConfigRegistry::new(),
            path_cache: Cache::new(PATH_CACHE_CAPACITY),
            backend: RasterBackend::new(INITIAL_BACKEND_SIZE, INITIAL_BACKEND_SIZE),
            strokes: HashMap::default(),
            stroke_order: Vec::new(),
            styles: StyleMap::new(),
            pages: Vec::new(),
            layout_direction: LayoutDirection::Vertical,
            pipeline: Pipeline::default(),
            grain_texture: None,
            grain_overrides: Vec::new(),
            stamp_enabled: false,
            ink_stamp_enabled: false,
            pencil_texture: None,
            ink_texture: None,
            background_resolver,
        }
    }

    fn apply_grain_image(&mut self, grain_image: Option<GrainImage>) {
        if let Some(old) = self.grain_texture.take() {
            self.backend.delete_texture(old);
        }
        let Some(image) = grain_image else { return };
        if image.width == 0 || image.height == 0 {
            warn!("ignoring zero-sized grain image");
            return;
        }
        let id = self.backend.create_texture(&TextureSource {
            width: image.width,
            height: image.height,
            pixels: &image.pixels,
        });
        self.grain_texture = Some(id);
    }

    fn set_stamp_enabled(&mut self, enabled: bool) {
        self.stamp_enabled = enabled;
        if enabled {
            if self.pencil_texture.is_none() {
                self.pencil_texture = Some(placeholder_stamp_texture(&mut self.backend));
            }
        } else if let Some(id) = self.pencil_texture.take() {
            self.backend.delete_texture(id);
        }
    }

    fn set_ink_stamp_enabled(&mut self, enabled: bool) {
        self.ink_stamp_enabled = enabled;
        if enabled {
            if self.ink_texture.is_none() {
                self.ink_texture = Some(placeholder_stamp_texture(&mut self.backend));
            }
        } else if let Some(id) = self.ink_texture.take() {
            self.backend.delete_texture(id);
        }
    }

    fn apply_doc_update(
        &mut self,
        strokes: Vec<Stroke>,
        styles: StyleMap,
        pages: Vec<PageRect>,
        layout_direction: LayoutDirection,
        pipeline: Option<Pipeline>,
    ) {
        self.stroke_order = strokes.iter().map(|s| s.id).collect();
        self.strokes = strokes.into_iter().map(|s| (s.id, s)).collect();
        self.styles = styles;
        self.pages = pages;
        self.layout_direction = layout_direction;
        if let Some(p) = pipeline {
            self.pipeline = p;
        }
        self.path_cache.clear();
    }

    fn paint_background(&mut self, world_bounds: Rect, is_dark: bool) {
        self.backend.clear(self.background_resolver.desk_colour(is_dark));
        for page in &self.pages {
            if !page.rect.intersects(&world_bounds) {
                continue;
            }
            let bg = self.background_resolver.resolve(page.index, is_dark);
            self.backend.save();
            self.backend.clip_rect(
                page.rect.min_x,
                page.rect.min_y,
                page.rect.width(),
                page.rect.height(),
            );
            self.backend.set_shadow(Color::rgba(0, 0, 0, 60), 0.0, 2.0, 6.0);
            self.backend.set_fill_colour(bg.paper_color);
            self.backend.fill_rect(page.rect);
            self.backend.clear_shadow();
            // The pattern texture itself is host-supplied art, drawn by the host via
            // `draw_image` against its own asset for `pattern_theme`; the core only
            // resolves which theme applies.
            let _ = bg.pattern_theme;
            self.backend.restore();
        }
    }

    fn render_tile(
        &mut self,
        tile_key: TileKey,
        world_bounds: Rect,
        zoom_band: u8,
        tile_physical_px: (u32, u32),
        tile_world_size: f32,
        stroke_ids: Vec<StrokeId>,
        is_dark_mode: bool,
    ) -> WorkerResponse {
        let (tile_w, tile_h) = tile_physical_px;
        let span = debug_span!("render_tile", tile = tile_key.0, strokes = stroke_ids.len());
        let _guard = span.enter();

        if tile_w == 0 || tile_h == 0 || tile_world_size <= 0.0 {
            return WorkerResponse::TileError {
                tile_key,
                error_text: "degenerate tile dimensions".to_string(),
            };
        }

        self.backend.resize(tile_w, tile_h);
        let scale = tile_w as f32 / tile_world_size;
        self.backend.set_transform(Affine {
            a: scale,
            b: 0.0,
            c: 0.0,
            d: scale,
            e: -world_bounds.min_x * scale,
            f: -world_bounds.min_y * scale,
        });

        let lod_level = lod::select_lod(zoom_band_base_zoom(zoom_band));
        self.paint_background(world_bounds, is_dark_mode);

        let wanted: HashSet<StrokeId> = stroke_ids.into_iter().collect();
        let grain_ctx = GrainContext {
            texture: self.grain_texture,
            overrides: self.grain_overrides.clone(),
        };
        let stamp_ctx = StampContext {
            pencil_texture: self.pencil_texture,
            ink_texture: self.ink_texture,
        };
        let mut rendered = Vec::new();

        for page in &self.pages {
            if !page.rect.intersects(&world_bounds) {
                continue;
            }
            self.backend.save();
            self.backend.clip_rect(
                page.rect.min_x,
                page.rect.min_y,
                page.rect.width(),
                page.rect.height(),
            );
            for &id in &self.stroke_order {
                if !wanted.contains(&id) {
                    continue;
                }
                let Some(stroke) = self.strokes.get(&id) else {
                    continue;
                };
                if stroke.page_index != page.index {
                    continue;
                }
                match dispatcher::render_stroke(
                    &mut self.backend,
                    stroke,
                    &self.styles,
                    &self.registry,
                    lod_level,
                    self.pipeline,
                    &mut self.path_cache,
                    &grain_ctx,
                    Some(&stamp_ctx),
                ) {
                    Ok(()) => rendered.push(id),
                    Err(err) => warn!(stroke = id.0, %err, "stroke render failed inside tile"),
                }
            }
            self.backend.restore();
        }

        let pixmap = self.backend.pixmap();
        let bitmap = TileBitmap {
            width: pixmap.width(),
            height: pixmap.height(),
            pixels: pixmap.data().to_vec(),
        };
        debug!(tile = tile_key.0, rendered = rendered.len(), "tile rendered");
        WorkerResponse::TileResult {
            tile_key,
            bitmap,
            stroke_ids_rendered: rendered,
        }
    }
}

fn worker_loop(
    rx: Receiver<WorkerRequest>,
    tx: Sender<WorkerResponse>,
    background_resolver: Box<dyn BackgroundResolver>,
) {
    let mut state = WorkerState::new(background_resolver);

    for msg in rx.iter() {
        match msg {
            WorkerRequest::Init { grain_image } => {
                state.apply_grain_image(grain_image);
                if tx.send(WorkerResponse::Ready).is_err() {
                    break;
                }
            }
            WorkerRequest::DocUpdate {
                strokes,
                styles,
                pages,
                layout_direction,
                pipeline,
            } => {
                state.apply_doc_update(strokes, styles, pages, layout_direction, pipeline);
            }
            WorkerRequest::GrainUpdate {
                grain_image,
                strength_overrides,
            } => {
                state.apply_grain_image(grain_image);
                state.grain_overrides = strength_overrides;
            }
            WorkerRequest::StampInit { enabled } => state.set_stamp_enabled(enabled),
            WorkerRequest::InkStampInit { enabled } => state.set_ink_stamp_enabled(enabled),
            WorkerRequest::RenderTile {
                tile_key,
                world_bounds,
                zoom_band,
                tile_physical_px,
                tile_world_size,
                stroke_ids,
                is_dark_mode,
            } => {
                // Rendering is synchronous per request (§4.16); `cancel` has nothing to
                // interrupt mid-flight today, so an outstanding cancel for this tile is
                // only ever observed here as a log, matching "cancel is advisory".
                let response = state.render_tile(
                    tile_key,
                    world_bounds,
                    zoom_band,
                    tile_physical_px,
                    tile_world_size,
                    stroke_ids,
                    is_dark_mode,
                );
                // A worker MUST answer every `render_tile` with a result or an error;
                // losing the reply is a protocol violation, never a silent drop.
                if tx.send(response).is_err() {
                    break;
                }
            }
            WorkerRequest::Cancel { tile_key } => {
                let key = tile_key.map(|k| k.0);
                debug!(?key, "cancel received (advisory, no-op)");
            }
            WorkerRequest::Destroy => {
                state.backend.destroy();
                break;
            }
        }
    }
}

/// Coordinator-side handle to one worker thread. Dropping it asks the worker to destroy
/// itself and joins the thread.
pub struct TileWorker {
    sender: Sender<WorkerRequest>,
    receiver: Receiver<WorkerResponse>,
    handle: Option<JoinHandle<()>>,
}

impl TileWorker {
    pub fn spawn(background_resolver: Box<dyn BackgroundResolver>) -> Self {
        let (req_tx, req_rx) = crossbeam_channel::unbounded();
        let (resp_tx, resp_rx) = crossbeam_channel::unbounded();
        let handle = thread::Builder::new()
            .name("inkstroke-tile-worker".into())
            .spawn(move || worker_loop(req_rx, resp_tx, background_resolver))
            .expect("failed to spawn tile worker thread");
        Self {
            sender: req_tx,
            receiver: resp_rx,
            handle: Some(handle),
        }
    }

    /// Sends a request. A failed send means the worker thread has already exited (e.g.
    /// after a prior `Destroy`); there is nothing left to deliver to, so it is dropped
    /// rather than surfaced as a protocol violation.
    pub fn send(&self, request: WorkerRequest) {
        let _ = self.sender.send(request);
    }

    /// Non-blocking poll for the next reply.
    pub fn try_recv(&self) -> Result<WorkerResponse, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Blocks until the next reply arrives, or the worker has exited.
    pub fn recv(&self) -> Option<WorkerResponse> {
        self.receiver.recv().ok()
    }
}

impl Drop for TileWorker {
    fn drop(&mut self) {
        let _ = self.sender.send(WorkerRequest::Destroy);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
