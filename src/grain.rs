//! Shared grain/value-noise routine (§4.8, §4.12).
//!
//! Used two ways: as a per-particle opacity modulation in the pencil scatter stamp computer
//! (C8), and as the tiled eraser texture sampled by `apply_grain` in the drawing backends
//! (C12/C13/C14). Factoring it out keeps both effects visually consistent, which the spec
//! implies by describing "value noise from a 2D integer hash" in both places without
//! naming two different algorithms.

use crate::hash::hash2d;

/// Bilinearly-interpolated value noise at integer-lattice resolution `1/scale`.
fn value_noise2d(x: f32, y: f32, scale: f32) -> f32 {
    let sx = x / scale;
    let sy = y / scale;
    let x0 = sx.floor();
    let y0 = sy.floor();
    let tx = sx - x0;
    let ty = sy - y0;

    let x0i = x0 as i32;
    let y0i = y0 as i32;

    let v00 = hash2d(x0i, y0i);
    let v10 = hash2d(x0i + 1, y0i);
    let v01 = hash2d(x0i, y0i + 1);
    let v11 = hash2d(x0i + 1, y0i + 1);

    let sxt = smoothstep(tx);
    let syt = smoothstep(ty);

    let top = v00 + (v10 - v00) * sxt;
    let bottom = v01 + (v11 - v01) * sxt;
    top + (bottom - top) * syt
}

#[inline]
fn smoothstep(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

/// Combined coarse+fine grain sample at world position `(x, y)`, modulated by `grain_value`
/// in `[0, 1]` (§4.8: "for `grain_value=0` the output has base 0.5 with wide swing, for
/// `grain_value=1` base 1.0 with near-zero swing") and the stamp's `diameter`.
pub fn grain_noise(x: f32, y: f32, grain_value: f32, diameter: f32) -> f32 {
    let coarse = value_noise2d(x, y, 3.0 * diameter);
    let fine = value_noise2d(x, y, 1.2 * diameter);
    let mixed = coarse * 0.7 + fine * 0.3;

    let grain_value = grain_value.clamp(0.0, 1.0);
    let base = 0.5 + 0.5 * grain_value;
    let swing = 1.0 - grain_value;
    (base + (mixed - 0.5) * swing).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grain_value_zero_has_wide_swing() {
        let samples: Vec<f32> = (0..40)
            .map(|i| grain_noise(i as f32 * 0.7, i as f32 * 1.3, 0.0, 4.0))
            .collect();
        let min = samples.iter().cloned().fold(f32::MAX, f32::min);
        let max = samples.iter().cloned().fold(f32::MIN, f32::max);
        assert!(max - min > 0.2, "expected wide swing, got {}", max - min);
    }

    #[test]
    fn grain_value_one_is_near_constant() {
        let samples: Vec<f32> = (0..40)
            .map(|i| grain_noise(i as f32 * 0.7, i as f32 * 1.3, 1.0, 4.0))
            .collect();
        let min = samples.iter().cloned().fold(f32::MAX, f32::min);
        let max = samples.iter().cloned().fold(f32::MIN, f32::max);
        assert!(max - min < 0.05, "expected near-zero swing, got {}", max - min);
        assert!(samples.iter().all(|&v| v > 0.9));
    }

    #[test]
    fn deterministic() {
        assert_eq!(
            grain_noise(12.5, -3.25, 0.5, 6.0),
            grain_noise(12.5, -3.25, 0.5, 6.0)
        );
    }
}
