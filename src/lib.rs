//! # inkstroke
//!
//! A stroke rendering core for a hand-drawing engine. `inkstroke` owns the geometry and
//! compositing pipeline between a captured pen stroke and pixels: pen materials (ballpoint,
//! felt-tip, pencil, fountain, highlighter, brush), outline generation, scatter/ink stamp
//! deposition, grain and ink-pool effects, a level-of-detail simplifier, and two drawing
//! backends — a software rasterizer (`tiny-skia`) and a GPU backend (`wgpu`) — behind one
//! [`backend::DrawingBackend`] contract. [`dispatcher::render_stroke`] is the single entry
//! point that ties a decoded stroke to one of those backends; [`tile_worker`] runs that same
//! pipeline on background threads for off-screen tile rendering.
//!
//! ## Getting started
//!
//! ```no_run
//! use inkstroke::backend::raster::RasterBackend;
//! use inkstroke::cache::Cache;
//! use inkstroke::config::Pipeline;
//! use inkstroke::dispatcher::{render_stroke, GrainContext, StyleProvider};
//! use inkstroke::id::Lod;
//! use inkstroke::pen_config::PenConfigRegistry;
//! use inkstroke::stroke::{PenStyle, Stroke};
//!
//! struct FixedStyle(PenStyle);
//! impl StyleProvider for FixedStyle {
//!     fn lookup(&self, _style_ref: u64) -> Option<PenStyle> {
//!         Some(self.0)
//!     }
//! }
//!
//! fn render(stroke: &Stroke) {
//!     let mut backend = RasterBackend::new(1024, 768);
//!     let registry = PenConfigRegistry::new();
//!     let styles = FixedStyle(PenStyle::default());
//!     let mut cache = Cache::new(256);
//!     let grain_ctx = GrainContext::default();
//!
//!     render_stroke(
//!         &mut backend,
//!         stroke,
//!         &styles,
//!         &registry,
//!         Lod::Full,
//!         Pipeline::Advanced,
//!         &mut cache,
//!         &grain_ctx,
//!         None,
//!     )
//!     .unwrap();
//! }
//! ```

pub mod backend;
pub mod cache;
pub mod color;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod geom;
mod hash;
pub mod grain;
pub mod id;
pub mod ink_pool;
pub mod lod;
pub mod outline;
pub mod pen_config;
pub mod pen_engine;
pub mod point;
pub mod stamps;
pub mod stroke;
pub mod tile_worker;
pub mod vertex;

pub use backend::{BlendMode, DrawingBackend, TextureSource};
pub use color::Color;
pub use config::{EnginePreference, Pipeline, RenderConfig};
pub use dispatcher::{render_stroke, GrainContext, StampContext, StyleProvider};
pub use error::{RenderError, RenderResult};
pub use id::{Lod, StrokeId, TextureId};
pub use pen_config::{PenConfig, PenConfigRegistry};
pub use stroke::{InkPresetConfig, PenStyle, PenType, Stroke, StrokePoint};
