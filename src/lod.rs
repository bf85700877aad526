//! LOD Simplifier (C2): zoom-band selection and RDP polyline simplification.

use crate::geom::Point;
use crate::id::{Lod, StrokeId};
use crate::stroke::StrokePoint;

const ZOOM_THRESHOLD_0: f32 = 0.5;
const ZOOM_THRESHOLD_1: f32 = 0.25;
const ZOOM_THRESHOLD_2: f32 = 0.10;

const RDP_EPSILON_LOD1: f32 = 2.0;
const RDP_EPSILON_LOD2: f32 = 5.0;

/// Selects a discrete LOD band for a given zoom factor.
pub fn select_lod(zoom: f32) -> Lod {
    if zoom > ZOOM_THRESHOLD_0 {
        Lod::Full
    } else if zoom > ZOOM_THRESHOLD_1 {
        Lod::Medium
    } else if zoom > ZOOM_THRESHOLD_2 {
        Lod::Low
    } else {
        Lod::Endpoints
    }
}

/// Simplifies `points` at the given LOD. Lod 0 returns the input unchanged; lod 3 returns
/// only the first and last sample.
pub fn simplify(points: &[StrokePoint], lod: Lod) -> Vec<StrokePoint> {
    match lod {
        Lod::Full => points.to_vec(),
        Lod::Medium => rdp_simplify(points, RDP_EPSILON_LOD1),
        Lod::Low => rdp_simplify(points, RDP_EPSILON_LOD2),
        Lod::Endpoints => endpoints_only(points),
    }
}

fn endpoints_only(points: &[StrokePoint]) -> Vec<StrokePoint> {
    match points.len() {
        0 => Vec::new(),
        1 => vec![points[0]],
        n => vec![points[0], points[n - 1]],
    }
}

/// Iterative (explicit-stack) Ramer-Douglas-Peucker simplification, driven by a keep
/// bitmap so the output preserves the original point order without repeated allocation.
fn rdp_simplify(points: &[StrokePoint], epsilon: f32) -> Vec<StrokePoint> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }

    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;

    let mut stack: Vec<(usize, usize)> = vec![(0, n - 1)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }
        let a = Point::new(points[start].x, points[start].y);
        let b = Point::new(points[end].x, points[end].y);

        let mut max_dist = 0.0f32;
        let mut max_index = start;
        for i in (start + 1)..end {
            let p = Point::new(points[i].x, points[i].y);
            let dist = perpendicular_distance(p, a, b);
            if dist > max_dist {
                max_dist = dist;
                max_index = i;
            }
        }

        if max_dist > epsilon {
            keep[max_index] = true;
            stack.push((start, max_index));
            stack.push((max_index, end));
        }
    }

    points
        .iter()
        .zip(keep.iter())
        .filter_map(|(p, &k)| k.then_some(*p))
        .collect()
}

fn perpendicular_distance(p: Point, a: Point, b: Point) -> f32 {
    let ab = b.sub(a);
    let len = ab.length();
    if len < 1e-6 {
        return p.sub(a).length();
    }
    let ap = p.sub(a);
    // |ab x ap| / |ab|
    (ab.x * ap.y - ab.y * ap.x).abs() / len
}

/// Cache key text for a `(stroke_id, lod)` pair, matching the source format exactly
/// (`stroke_id` alone for lod 0, else `"{stroke_id}-lod{lod}"`). The cache itself keys on
/// `(u64, u8)` tuples (see `src/cache.rs`); this is kept for hosts that want the string form.
pub fn lod_cache_key(stroke_id: StrokeId, lod: Lod) -> String {
    if lod == Lod::Full {
        stroke_id.0.to_string()
    } else {
        format!("{}-lod{}", stroke_id.0, lod.as_u8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize) -> Vec<StrokePoint> {
        (0..n)
            .map(|i| StrokePoint::new(i as f32, (i as f32 * 0.3).sin() * 8.0, 0.5))
            .collect()
    }

    #[test]
    fn select_lod_thresholds() {
        assert_eq!(select_lod(1.0), Lod::Full);
        assert_eq!(select_lod(0.5), Lod::Medium);
        assert_eq!(select_lod(0.3), Lod::Medium);
        assert_eq!(select_lod(0.25), Lod::Low);
        assert_eq!(select_lod(0.15), Lod::Low);
        assert_eq!(select_lod(0.10), Lod::Endpoints);
        assert_eq!(select_lod(0.01), Lod::Endpoints);
    }

    #[test]
    fn monotonic_point_counts_and_preserves_ends() {
        let pts = line(200);
        let l0 = simplify(&pts, Lod::Full);
        let l1 = simplify(&pts, Lod::Medium);
        let l2 = simplify(&pts, Lod::Low);
        let l3 = simplify(&pts, Lod::Endpoints);

        assert!(l0.len() >= l1.len());
        assert!(l1.len() >= l2.len());
        assert!(l2.len() >= l3.len());

        for simplified in [&l1, &l2, &l3] {
            assert_eq!(simplified.first().unwrap().x, pts.first().unwrap().x);
            assert_eq!(simplified.last().unwrap().x, pts.last().unwrap().x);
        }
    }

    #[test]
    fn cache_key_format() {
        let id = StrokeId(42);
        assert_eq!(lod_cache_key(id, Lod::Full), "42");
        assert_eq!(lod_cache_key(id, Lod::Medium), "42-lod1");
    }
}
