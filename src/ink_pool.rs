//! Ink Pool Detector (C10): start/end/dwell pools for round fountain strokes.

use crate::geom::Point;
use crate::stroke::StrokePoint;

const VELOCITY_THRESHOLD: f32 = 0.3; // px/ms
const CURVATURE_THRESHOLD: f32 = 0.5; // radians
const VELOCITY_EPSILON_MS: f64 = 1e-3;

/// A single radial-gradient pool: solid colour at `radius` 0, transparent at `radius`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pool {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub opacity: f32,
}

/// Detects ink pools along a fountain stroke (§4.10). `width` is the stroke's nominal width
/// (unprojected), used as the pool radius scale.
pub fn detect(points: &[StrokePoint], width: f32) -> Vec<Pool> {
    let mut pools = Vec::new();
    if points.is_empty() {
        return pools;
    }

    let first = &points[0];
    pools.push(Pool {
        x: first.x,
        y: first.y,
        radius: (1.2 * width * first.pressure).max(0.5),
        opacity: 0.25 * first.pressure,
    });

    if points.len() > 1 {
        for i in 1..points.len() - 1 {
            let prev = &points[i - 1];
            let cur = &points[i];
            let next = &points[i + 1];

            let v = velocity(prev, cur);
            if v > VELOCITY_THRESHOLD {
                continue;
            }
            let curvature = curvature_at(prev, cur, next);
            if curvature < CURVATURE_THRESHOLD {
                continue;
            }

            let dwell = 1.0 - v / VELOCITY_THRESHOLD;
            let radius = (1.5 * width * cur.pressure * dwell).max(0.5);
            let opacity = 0.15 * cur.pressure * dwell;
            pools.push(Pool {
                x: cur.x,
                y: cur.y,
                radius,
                opacity,
            });
        }

        let last = &points[points.len() - 1];
        pools.push(Pool {
            x: last.x,
            y: last.y,
            radius: (1.2 * width * last.pressure).max(0.5),
            opacity: 0.25 * last.pressure,
        });
    }

    pools
}

fn velocity(a: &StrokePoint, b: &StrokePoint) -> f32 {
    let dt = (b.timestamp_ms - a.timestamp_ms).max(VELOCITY_EPSILON_MS);
    let seg_len = Point::new(b.x, b.y).sub(Point::new(a.x, a.y)).length() as f64;
    (seg_len / dt) as f32
}

fn curvature_at(prev: &StrokePoint, cur: &StrokePoint, next: &StrokePoint) -> f32 {
    let d1 = Point::new(cur.x, cur.y).sub(Point::new(prev.x, prev.y)).normalized();
    let d2 = Point::new(next.x, next.y).sub(Point::new(cur.x, cur.y)).normalized();
    if d1 == Point::ZERO || d2 == Point::ZERO {
        return 0.0;
    }
    d1.dot(d2).clamp(-1.0, 1.0).acos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_fast_stroke_has_only_endpoint_pools() {
        let points: Vec<StrokePoint> = (0..20)
            .map(|i| StrokePoint {
                timestamp_ms: i as f64 * 1.0,
                ..StrokePoint::new(i as f32 * 5.0, 0.0, 0.6)
            })
            .collect();
        let pools = detect(&points, 3.0);
        assert_eq!(pools.len(), 2);
    }

    #[test]
    fn slow_sharp_corner_adds_a_dwell_pool() {
        let mut points = Vec::new();
        for i in 0..10 {
            points.push(StrokePoint {
                timestamp_ms: i as f64 * 200.0,
                ..StrokePoint::new(i as f32 * 0.1, 0.0, 0.6)
            });
        }
        // A sharp corner, still slow (small spatial step per large dt).
        for i in 0..10 {
            points.push(StrokePoint {
                timestamp_ms: (10 + i) as f64 * 200.0,
                ..StrokePoint::new(1.0, i as f32 * 0.1, 0.6)
            });
        }
        let pools = detect(&points, 3.0);
        assert!(pools.len() > 2);
    }

    #[test]
    fn endpoint_opacity_scales_with_pressure() {
        let points = vec![
            StrokePoint::new(0.0, 0.0, 0.2),
            StrokePoint::new(5.0, 0.0, 0.2),
            StrokePoint::new(10.0, 0.0, 1.0),
        ];
        let pools = detect(&points, 3.0);
        let start = pools.first().unwrap();
        let end = pools.last().unwrap();
        assert!(end.opacity > start.opacity);
    }
}
