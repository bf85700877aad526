//! Stroke Path Cache (C11): `(stroke_id, lod) -> Vertices | ItalicSides`.
//!
//! Eviction is LRU with a host-chosen capacity; invalidation is always whole-entry, never
//! per-vertex (§4.11). The key is a plain `(u64, u8)` tuple rather than the formatted
//! string the glossary uses for display purposes — the spec permits either (§9 open
//! question), and the tuple form avoids an allocation per lookup.

use crate::geom::Point;
use crate::id::{Lod, StrokeId};
use crate::outline::OutlineResult;
use lru::LruCache;
use std::num::NonZeroUsize;

const DEFAULT_CAPACITY: usize = 512;

type CacheKey = (u64, u8);

pub struct Cache {
    entries: LruCache<CacheKey, OutlineResult>,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Cache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            entries: LruCache::new(capacity),
        }
    }

    fn key(stroke_id: StrokeId, lod: Lod) -> CacheKey {
        (stroke_id.0, lod.as_u8())
    }

    pub fn get(&mut self, stroke_id: StrokeId, lod: Lod) -> Option<&OutlineResult> {
        self.entries.get(&Self::key(stroke_id, lod))
    }

    pub fn set_outline(&mut self, stroke_id: StrokeId, lod: Lod, polygon: Vec<Point>) {
        self.entries
            .put(Self::key(stroke_id, lod), OutlineResult::Polygon(polygon));
    }

    pub fn set_italic_sides(&mut self, stroke_id: StrokeId, lod: Lod, left: Vec<Point>, right: Vec<Point>) {
        self.entries
            .put(Self::key(stroke_id, lod), OutlineResult::Sides { left, right });
    }

    pub fn is_italic(&mut self, stroke_id: StrokeId, lod: Lod) -> bool {
        self.get(stroke_id, lod).map(OutlineResult::is_italic).unwrap_or(false)
    }

    /// Flattens the cached entry to vertex data ready for the backend: a closed
    /// midpoint-quadratic-ready polyline for the round case, per-segment triangles for the
    /// italic case (§4.11).
    pub fn get_vertices(&mut self, stroke_id: StrokeId, lod: Lod) -> Option<Vec<f32>> {
        match self.get(stroke_id, lod)? {
            OutlineResult::Polygon(pts) => Some(flatten(pts)),
            OutlineResult::Sides { left, right } => Some(triangulate_sides(left, right)),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
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

/// Builds a per-segment triangle strip between the two italic sides: for each `i`, the quad
/// `left[i], right[i], right[i+1], left[i+1]` split into two triangles.
fn triangulate_sides(left: &[Point], right: &[Point]) -> Vec<f32> {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_polygon() {
        let mut cache = Cache::new(4);
        let id = StrokeId(1);
        cache.set_outline(id, Lod::Full, vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]);
        assert!(!cache.is_italic(id, Lod::Full));
        assert_eq!(cache.get_vertices(id, Lod::Full).unwrap().len(), 4);
    }

    #[test]
    fn round_trip_italic() {
        let mut cache = Cache::new(4);
        let id = StrokeId(2);
        cache.set_italic_sides(
            id,
            Lod::Full,
            vec![Point::new(0.0, 1.0), Point::new(1.0, 1.0)],
            vec![Point::new(0.0, -1.0), Point::new(1.0, -1.0)],
        );
        assert!(cache.is_italic(id, Lod::Full));
        assert_eq!(cache.get_vertices(id, Lod::Full).unwrap().len(), 12);
    }

    #[test]
    fn eviction_is_whole_entry_lru() {
        let mut cache = Cache::new(1);
        let a = StrokeId(1);
        let b = StrokeId(2);
        cache.set_outline(a, Lod::Full, vec![Point::ZERO]);
        cache.set_outline(b, Lod::Full, vec![Point::ZERO]);
        assert!(cache.get(a, Lod::Full).is_none());
        assert!(cache.get(b, Lod::Full).is_some());
    }

    #[test]
    fn clear_drops_everything() {
        let mut cache = Cache::new(4);
        cache.set_outline(StrokeId(1), Lod::Full, vec![Point::ZERO]);
        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
