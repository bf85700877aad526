//! Italic Outline Generator (C6): projected-ellipse nib outline with corner repair.

use super::round::{apply_taper, ema};
use crate::geom::Point;
use crate::pen_config::PenConfig;
use crate::pen_engine::EffectiveParams;
use crate::stroke::{PenStyle, StrokePoint};

/// RDP de-jitter epsilon for baked strokes only (§4.6); never applied to live strokes.
const DEJITTER_EPSILON: f32 = 1.25e-3;
const MAX_DIP_PASSES: usize = 8;
const PERP_KERNEL_RADIUS: usize = 3;

pub fn generate(
    points: &[StrokePoint],
    style: &PenStyle,
    cfg: &PenConfig,
    baked: bool,
) -> (Vec<Point>, Vec<Point>) {
    if points.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let points: Vec<StrokePoint> = if baked {
        dejitter(points, DEJITTER_EPSILON)
    } else {
        points.to_vec()
    };

    if points.len() == 1 {
        let centre = Point::new(points[0].x, points[0].y);
        let hw = nib_half_floor(style, cfg);
        return (vec![centre.add(Point::new(hw, 0.0))], vec![centre.sub(Point::new(hw, 0.0))]);
    }

    let params = EffectiveParams::resolve(style, cfg);
    let nib_w = params.base_width;
    let nib_thickness = params.nib_thickness.unwrap_or(0.3);
    let nib_h = nib_w * nib_thickness;
    let nib_angle = params.nib_angle.unwrap_or(0.0);
    let floor = nib_h * 0.5;

    let raw_widths: Vec<f32> = points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let p_prime = p.pressure.clamp(0.0, 1.0).powf(params.pressure_curve);
            let effective_nib_angle = if params.use_barrel_rotation && p.twist != 0.0 {
                p.twist.to_radians()
            } else {
                nib_angle
            };
            let stroke_angle = stroke_angle_at(&points, i);
            let delta = stroke_angle - effective_nib_angle;
            let sin_abs = delta.sin().abs();
            let raw = nib_w * sin_abs + nib_h * (1.0 - sin_abs);
            raw * lerp(0.5, 1.0, p_prime)
        })
        .collect();

    let half_widths: Vec<f32> = raw_widths.iter().map(|w| w * 0.5).collect();
    let smoothed = ema(&half_widths, params.smoothing);
    let tapered: Vec<f32> = apply_taper(&points, &smoothed, cfg.taper_start, cfg.taper_end)
        .into_iter()
        .map(|hw| hw.max(floor))
        .collect();

    let mut perps: Vec<Point> = (0..points.len())
        .map(|i| direction_at(&points, i).perpendicular())
        .collect();

    fix_sign_consistency(&mut perps);
    smooth_perpendiculars(&mut perps, &tapered);

    let mut left = Vec::with_capacity(points.len());
    let mut right = Vec::with_capacity(points.len());
    for (i, p) in points.iter().enumerate() {
        let centre = Point::new(p.x, p.y);
        left.push(centre.add(perps[i].scale(tapered[i])));
        right.push(centre.sub(perps[i].scale(tapered[i])));
    }

    let repaired = repair_width_dips(tapered, MAX_DIP_PASSES);
    for (i, p) in points.iter().enumerate() {
        let centre = Point::new(p.x, p.y);
        left[i] = centre.add(perps[i].scale(repaired[i]));
        right[i] = centre.sub(perps[i].scale(repaired[i]));
    }

    pinch_expand(&mut left, &mut right, &perps, nib_h * 0.3);

    (left, right)
}

fn nib_half_floor(style: &PenStyle, cfg: &PenConfig) -> f32 {
    let params = EffectiveParams::resolve(style, cfg);
    let nib_h = params.base_width * params.nib_thickness.unwrap_or(0.3);
    (nib_h * 0.5).max(0.05)
}

fn direction_at(points: &[StrokePoint], i: usize) -> Point {
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

fn stroke_angle_at(points: &[StrokePoint], i: usize) -> f32 {
    let d = direction_at(points, i);
    d.y.atan2(d.x)
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Pass 1: raises width dips at corners toward the local mean, up to `max_passes` times.
fn repair_width_dips(mut widths: Vec<f32>, max_passes: usize) -> Vec<f32> {
    let n = widths.len();
    if n < 3 {
        return widths;
    }
    for _ in 0..max_passes {
        let mut changed = false;
        for i in 1..n - 1 {
            let mean = (widths[i - 1] + widths[i + 1]) * 0.5;
            if widths[i] < mean {
                widths[i] = mean;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    widths
}

/// Pass 2: keeps each perpendicular's sign consistent with its predecessor so the envelope
/// rotates smoothly through closed curves without flipping sides.
fn fix_sign_consistency(perps: &mut [Point]) {
    for i in 1..perps.len() {
        if perps[i].dot(perps[i - 1]) < 0.0 {
            perps[i] = perps[i].scale(-1.0);
        }
    }
}

/// Pass 3: Gaussian-smooths the perpendicular field with a `±3` window and renormalizes.
fn smooth_perpendiculars(perps: &mut [Point], half_widths: &[f32]) {
    let n = perps.len();
    if n == 0 {
        return;
    }
    let original = perps.to_vec();
    for i in 0..n {
        let sigma = (half_widths[i] / 2.5).max(1e-3);
        let lo = i.saturating_sub(PERP_KERNEL_RADIUS);
        let hi = (i + PERP_KERNEL_RADIUS).min(n - 1);
        let mut sum = Point::ZERO;
        let mut weight_sum = 0.0f32;
        for j in lo..=hi {
            let d = (j as f32) - (i as f32);
            let weight = (-d * d / (2.0 * sigma * sigma)).exp();
            sum = sum.add(original[j].scale(weight));
            weight_sum += weight;
        }
        if weight_sum > 0.0 {
            let avg = sum.scale(1.0 / weight_sum).normalized();
            if avg != Point::ZERO {
                perps[i] = avg;
            }
        }
    }
}

/// Opens any side-pair closer than `min_gap` back out to that minimum.
fn pinch_expand(left: &mut [Point], right: &mut [Point], perps: &[Point], min_gap: f32) {
    for i in 0..left.len() {
        let gap = left[i].sub(right[i]).length();
        if gap < min_gap && gap > 1e-6 {
            let centre = left[i].add(right[i]).scale(0.5);
            let dir = perps[i];
            left[i] = centre.add(dir.scale(min_gap * 0.5));
            right[i] = centre.sub(dir.scale(min_gap * 0.5));
        }
    }
}

/// Iterative RDP restricted to baked strokes (§4.6); mirrors `lod::rdp_simplify`'s algorithm
/// at a much tighter epsilon intended to remove acquisition jitter, not to change LOD.
fn dejitter(points: &[StrokePoint], epsilon: f32) -> Vec<StrokePoint> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }
    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;
    let mut stack = vec![(0usize, n - 1)];
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
            let ab = b.sub(a);
            let len = ab.length();
            let dist = if len < 1e-6 {
                p.sub(a).length()
            } else {
                (ab.x * p.sub(a).y - ab.y * p.sub(a).x).abs() / len
            };
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
