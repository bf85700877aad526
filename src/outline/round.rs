//! Round Outline Generator (C5): offset-polyline envelope for non-italic pens.

use crate::geom::Point;
use crate::pen_config::PenConfig;
use crate::pen_engine::{self, EffectiveParams};
use crate::stroke::{PenStyle, StrokePoint};

const DISC_VERTICES: usize = 8;
const DIRECTION_WINDOW: usize = 2;

/// Generates a closed polygon envelope. Single-point input degenerates to an 8-vertex disc
/// per §4.5.
pub fn generate(points: &[StrokePoint], style: &PenStyle, cfg: &PenConfig) -> Vec<Point> {
    if points.is_empty() {
        return Vec::new();
    }
    if points.len() == 1 {
        let width = pen_engine::compute_attributes(&points[0], style, cfg, None).width;
        return disc(Point::new(points[0].x, points[0].y), width * 0.5);
    }

    let params = EffectiveParams::resolve(style, cfg);
    let widths = pen_engine::compute_widths(points, style, cfg);
    let half_widths: Vec<f32> = widths.iter().map(|w| w * 0.5).collect();

    let directions = smoothed_directions(points, DIRECTION_WINDOW);
    let eased_half_widths = ema(&half_widths, params.smoothing);
    let tapered = apply_taper(points, &eased_half_widths, cfg.taper_start, cfg.taper_end);

    let mut left = Vec::with_capacity(points.len());
    let mut right = Vec::with_capacity(points.len());
    for (i, p) in points.iter().enumerate() {
        let perp = directions[i].perpendicular();
        let centre = Point::new(p.x, p.y);
        left.push(centre.add(perp.scale(tapered[i])));
        right.push(centre.sub(perp.scale(tapered[i])));
    }

    left.extend(right.into_iter().rev());
    left
}

fn disc(centre: Point, radius: f32) -> Vec<Point> {
    (0..DISC_VERTICES)
        .map(|i| {
            let theta = (i as f32 / DISC_VERTICES as f32) * std::f32::consts::TAU;
            centre.add(Point::new(theta.cos(), theta.sin()).scale(radius))
        })
        .collect()
}

fn raw_direction(points: &[StrokePoint], i: usize) -> Point {
    let n = points.len();
    let prev = if i == 0 { i } else { i - 1 };
    let next = if i + 1 >= n { i } else { i + 1 };
    let a = Point::new(points[prev].x, points[prev].y);
    let b = Point::new(points[next].x, points[next].y);
    let dir = b.sub(a).normalized();
    if dir == Point::ZERO {
        Point::new(1.0, 0.0)
    } else {
        dir
    }
}

/// Low-pass direction smoothing over a `±window` sample neighbourhood (§4.5).
fn smoothed_directions(points: &[StrokePoint], window: usize) -> Vec<Point> {
    let n = points.len();
    let raw: Vec<Point> = (0..n).map(|i| raw_direction(points, i)).collect();
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(window);
            let hi = (i + window).min(n - 1);
            let mut sum = Point::ZERO;
            for r in raw.iter().take(hi + 1).skip(lo) {
                sum = sum.add(*r);
            }
            let avg = sum.scale(1.0 / (hi - lo + 1) as f32);
            let normalized = avg.normalized();
            if normalized == Point::ZERO {
                raw[i]
            } else {
                normalized
            }
        })
        .collect()
}

/// Exponential moving average with factor `alpha` in `[0, 1]`.
pub(crate) fn ema(values: &[f32], alpha: f32) -> Vec<f32> {
    if values.is_empty() {
        return Vec::new();
    }
    let alpha = alpha.clamp(0.0, 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut acc = values[0];
    out.push(acc);
    for &v in &values[1..] {
        acc = alpha * v + (1.0 - alpha) * acc;
        out.push(acc);
    }
    out
}

fn cumulative_arclength(points: &[StrokePoint]) -> Vec<f32> {
    let mut out = Vec::with_capacity(points.len());
    let mut acc = 0.0f32;
    out.push(0.0);
    for i in 1..points.len() {
        let a = Point::new(points[i - 1].x, points[i - 1].y);
        let b = Point::new(points[i].x, points[i].y);
        acc += b.sub(a).length();
        out.push(acc);
    }
    out
}

/// Linear ramp toward zero over the first `taper_start` and last `taper_end` world units.
pub(crate) fn apply_taper(
    points: &[StrokePoint],
    half_widths: &[f32],
    taper_start: f32,
    taper_end: f32,
) -> Vec<f32> {
    let arclen = cumulative_arclength(points);
    let total = *arclen.last().unwrap_or(&0.0);
    half_widths
        .iter()
        .enumerate()
        .map(|(i, &hw)| {
            let mut t = 1.0f32;
            if taper_start > 0.0 {
                t = t.min(arclen[i] / taper_start);
            }
            if taper_end > 0.0 {
                t = t.min((total - arclen[i]) / taper_end);
            }
            hw * t.clamp(0.0, 1.0)
        })
        .collect()
}
