//! Fountain ink-shading stamp computer (C9).

use super::scatter::ScatterAccumulator as InkAccumulator;
use super::Stamp;
use crate::geom::Point;
use crate::hash::stamp_hash;
use crate::pen_config::InkStampConfig;
use crate::stroke::{InkPresetConfig, StrokePoint};

const VELOCITY_EPSILON_MS: f64 = 1e-3;

/// Computes ink-deposit stamps for every segment from `acc.last_point_index` onward.
/// `widths` is the nib-projected width per sample (`pen_engine::compute_attributes` with the
/// style's nib angle set). Unlike the scatter computer, no opacity floor is applied: every
/// stamp participates in deposit buildup (§4.9).
pub fn compute(
    points: &[StrokePoint],
    widths: &[f32],
    style_width: f32,
    cfg: &InkStampConfig,
    preset: &InkPresetConfig,
    acc: &mut InkAccumulator,
) -> Vec<Stamp> {
    let mut stamps = Vec::new();
    if points.len() < 2 {
        return stamps;
    }

    let min_floor = 0.5 * style_width * cfg.stamp_size_fraction;
    let mut i = acc.last_point_index.min(points.len() - 2);

    while i < points.len() - 1 {
        let a = Point::new(points[i].x, points[i].y);
        let b = Point::new(points[i + 1].x, points[i + 1].y);
        let seg = b.sub(a);
        let seg_len = seg.length();
        if seg_len < 1e-6 {
            i += 1;
            acc.remainder = 0.0;
            continue;
        }
        let dir = seg.scale(1.0 / seg_len);

        let dt = (points[i + 1].timestamp_ms - points[i].timestamp_ms).max(VELOCITY_EPSILON_MS);
        let v = seg_len as f64 / dt;
        let speed_factor = (v / 1.5).min(1.0) as f32;

        let size = (lerp(widths[i], widths[i + 1], 0.5) * cfg.stamp_size_fraction).max(min_floor);
        let step = (size * 0.05).max(cfg.spacing * size);
        let deposit = (preset.base_opacity - speed_factor * 0.17 * preset.shading).max(0.01);

        let mut offset = acc.remainder;
        while offset < seg_len {
            let t = (offset / seg_len).clamp(0.0, 1.0);
            let pos = a.add(dir.scale(offset));

            let idx = acc.stamp_count;
            acc.stamp_count += 1;
            let jx = (stamp_hash(idx, 0) - 0.5) * 2.0 * preset.feathering * size;
            let jy = (stamp_hash(idx, 1) - 0.5) * 2.0 * preset.feathering * size;
            let dither = 1.0 + (stamp_hash(idx, 2) - 0.5) * 0.2;

            let _ = t;
            stamps.push(Stamp {
                x: pos.x + jx,
                y: pos.y + jy,
                size,
                opacity: deposit * dither,
            });

            offset += step;
        }

        acc.remainder = offset - seg_len;
        i += 1;
    }

    acc.last_point_index = i;
    stamps
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stroke::INK_PRESET_STANDARD;

    fn line(n: usize) -> Vec<StrokePoint> {
        (0..n)
            .map(|i| StrokePoint {
                timestamp_ms: i as f64 * 8.0,
                ..StrokePoint::new(i as f32 * 2.0, 0.0, 0.6)
            })
            .collect()
    }

    #[test]
    fn every_stamp_keeps_some_deposit() {
        let pts = line(10);
        let widths = vec![2.8; 10];
        let cfg = InkStampConfig {
            stamp_size_fraction: 0.9,
            spacing: 0.3,
        };
        let mut acc = InkAccumulator::default();
        let stamps = compute(&pts, &widths, 2.8, &cfg, &INK_PRESET_STANDARD, &mut acc);
        assert!(!stamps.is_empty());
        assert!(stamps.iter().all(|s| s.opacity > 0.0));
    }

    #[test]
    fn faster_segments_deposit_less() {
        let cfg = InkStampConfig {
            stamp_size_fraction: 0.9,
            spacing: 0.3,
        };
        let widths = vec![2.8; 2];

        let slow = vec![
            StrokePoint {
                timestamp_ms: 0.0,
                ..StrokePoint::new(0.0, 0.0, 0.6)
            },
            StrokePoint {
                timestamp_ms: 100.0,
                ..StrokePoint::new(2.0, 0.0, 0.6)
            },
        ];
        let fast = vec![
            StrokePoint {
                timestamp_ms: 0.0,
                ..StrokePoint::new(0.0, 0.0, 0.6)
            },
            StrokePoint {
                timestamp_ms: 1.0,
                ..StrokePoint::new(2.0, 0.0, 0.6)
            },
        ];

        let mut acc_slow = InkAccumulator::default();
        let mut acc_fast = InkAccumulator::default();
        let slow_stamps = compute(&slow, &widths, 2.8, &cfg, &INK_PRESET_STANDARD, &mut acc_slow);
        let fast_stamps = compute(&fast, &widths, 2.8, &cfg, &INK_PRESET_STANDARD, &mut acc_fast);

        let slow_avg: f32 = slow_stamps.iter().map(|s| s.opacity).sum::<f32>() / slow_stamps.len() as f32;
        let fast_avg: f32 = fast_stamps.iter().map(|s| s.opacity).sum::<f32>() / fast_stamps.len() as f32;
        assert!(fast_avg < slow_avg);
    }
}
