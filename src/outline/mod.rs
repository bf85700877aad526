//! Outline Strategy Registry (C7) and the two generators it dispatches to.

pub mod italic;
pub mod round;

use crate::geom::Point;
use crate::pen_config::{OutlineStrategyId, PenConfig};
use crate::pen_engine::EffectiveParams;
use crate::stroke::{PenStyle, StrokePoint};

/// Either a single closed polygon (round outlines, and the fallback italic case) or two
/// independent sides (italic proper), matching §4.6's "returns both sides separately" so the
/// dispatcher can choose `fillPath` or `fillTriangles` downstream.
#[derive(Debug, Clone)]
pub enum OutlineResult {
    Polygon(Vec<Point>),
    Sides { left: Vec<Point>, right: Vec<Point> },
}

impl OutlineResult {
    pub fn is_italic(&self) -> bool {
        matches!(self, OutlineResult::Sides { .. })
    }

    /// Flattens to an `[x0, y0, x1, y1, ...]` array. For `Sides`, the two sides are
    /// concatenated into one closed ring (left forward, right reversed) so a caller that just
    /// wants *a* polygon (e.g. a plain fill fallback) always has one available.
    pub fn to_flat_polygon(&self) -> Vec<f32> {
        match self {
            OutlineResult::Polygon(pts) => flatten(pts),
            OutlineResult::Sides { left, right } => {
                let mut ring = left.clone();
                ring.extend(right.iter().rev().copied());
                flatten(&ring)
            }
        }
    }
}

fn flatten(points: &[Point]) -> Vec<f32> {
    let mut out = Vec::with_capacity(points.len() * 2);
    for p in points {
        out.push(p.x);
        out.push(p.y);
    }
    out
}

/// Dispatches to C5 or C6 per §4.7: the italic strategy falls back to standard (round) when
/// the resolved style/config pair lacks a nib angle and thickness.
pub fn generate(points: &[StrokePoint], style: &PenStyle, cfg: &PenConfig, baked: bool) -> OutlineResult {
    let wants_italic = cfg.outline_strategy == OutlineStrategyId::Italic;
    let params = EffectiveParams::resolve(style, cfg);
    let has_nib = params.nib_angle.is_some() && params.nib_thickness.is_some();

    if wants_italic && has_nib {
        let (left, right) = italic::generate(points, style, cfg, baked);
        OutlineResult::Sides { left, right }
    } else {
        OutlineResult::Polygon(round::generate(points, style, cfg))
    }
}
