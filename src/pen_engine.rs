//! Pen Engine (C4): per-sample width and opacity.

use crate::pen_config::PenConfig;
use crate::stroke::{PenStyle, StrokePoint};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PenAttributes {
    pub width: f32,
    pub opacity: f32,
}

const MIN_WIDTH: f32 = 0.1;
const VELOCITY_EPSILON_MS: f64 = 1e-3;
const TILT_NORMALIZER_DEG: f32 = 70.0;

/// Width/shape knobs resolved once per stroke from the merge of the host-authored `PenStyle`
/// (per-use numbers: width, opacity, colour, curve/tilt/nib overrides) and the built-in
/// `PenConfig` (per-pen-family shape: pressure ranges, thinning, taper, stamp/ink behaviour).
/// Style values take precedence wherever the style actually carries one.
#[derive(Debug, Clone, Copy)]
pub struct EffectiveParams {
    pub base_width: f32,
    pub pressure_curve: f32,
    pub tilt_sensitivity: f32,
    pub base_opacity: f32,
    pub nib_angle: Option<f32>,
    pub nib_thickness: Option<f32>,
    pub use_barrel_rotation: bool,
    pub thinning: f32,
    pub smoothing: f32,
}

impl EffectiveParams {
    pub fn resolve(style: &PenStyle, cfg: &PenConfig) -> Self {
        Self {
            base_width: style.width_wu,
            pressure_curve: style.pressure_curve,
            tilt_sensitivity: if style.tilt_sensitivity > 0.0 {
                style.tilt_sensitivity
            } else {
                cfg.tilt_sensitivity
            },
            base_opacity: cfg.base_opacity * style.opacity,
            nib_angle: if style.round { None } else { style.nib_angle_rad.or(cfg.nib_angle) },
            nib_thickness: if style.round { None } else { style.nib_thickness.or(cfg.nib_thickness) },
            use_barrel_rotation: cfg.use_barrel_rotation,
            thinning: cfg.thinning,
            smoothing: if style.smoothing > 0.0 {
                style.smoothing
            } else {
                cfg.smoothing
            },
        }
    }
}

/// Computes per-sample width/opacity per §4.4's numbered steps. `prev`, when present, is the
/// preceding (already-processed) sample, used for velocity thinning and the nib's stroke
/// direction.
pub fn compute_attributes(
    point: &StrokePoint,
    style: &PenStyle,
    cfg: &PenConfig,
    prev: Option<&StrokePoint>,
) -> PenAttributes {
    let params = EffectiveParams::resolve(style, cfg);

    // 1. Pressure curve.
    let p_prime = point.pressure.clamp(0.0, 1.0).powf(params.pressure_curve);

    // 2. Base width from the pressure->width range.
    let mut width = params.base_width * cfg.pressure_width_range.lerp(p_prime);

    // 3. Opacity from the pressure->opacity range, if configured.
    let mut opacity = match cfg.pressure_opacity_range {
        Some(range) => params.base_opacity * range.lerp(p_prime),
        None => params.base_opacity,
    };

    // 4. Tilt widening / fade.
    if params.tilt_sensitivity > 0.0 {
        let tilt_mag = (point.tilt_x * point.tilt_x + point.tilt_y * point.tilt_y).sqrt();
        let t = (tilt_mag / TILT_NORMALIZER_DEG).min(1.0);
        width *= 1.0 + 3.0 * t * params.tilt_sensitivity;
        opacity *= 1.0 - 0.6 * t * params.tilt_sensitivity;
    }

    // 5. Nib projection replaces width entirely.
    if let Some(nib_angle) = params.nib_angle {
        let thickness_ratio = params.nib_thickness.unwrap_or(0.3);
        let w = params.base_width;
        let t = w * thickness_ratio;

        let effective_nib_angle = if params.use_barrel_rotation && point.twist != 0.0 {
            point.twist.to_radians()
        } else {
            nib_angle
        };

        let stroke_angle = prev
            .map(|p| (point.y - p.y).atan2(point.x - p.x))
            .unwrap_or(0.0);
        let delta = stroke_angle - effective_nib_angle;

        let raw = ((w * delta.sin()).powi(2) + (t * delta.cos()).powi(2)).sqrt();
        width = raw * lerp(0.5, 1.0, p_prime);
    }

    // 6. Velocity thinning.
    if let Some(prev) = prev {
        if params.thinning > 0.0 {
            let dt = (point.timestamp_ms - prev.timestamp_ms).max(VELOCITY_EPSILON_MS);
            let dx = (point.x - prev.x) as f64;
            let dy = (point.y - prev.y) as f64;
            let v = (dx.hypot(dy) / dt) as f32; // px/ms
            width *= 1.0 - (v / 3.0).min(1.0) * params.thinning * 0.5;
        }
    }

    // 7. Floors/clamps.
    width = width.max(MIN_WIDTH);
    opacity = opacity.clamp(0.0, 1.0);

    PenAttributes { width, opacity }
}

/// Convenience used by the outline generators: widths only, in point order.
pub fn compute_widths(points: &[StrokePoint], style: &PenStyle, cfg: &PenConfig) -> Vec<f32> {
    let mut out = Vec::with_capacity(points.len());
    let mut prev: Option<&StrokePoint> = None;
    for p in points {
        out.push(compute_attributes(p, style, cfg, prev).width);
        prev = Some(p);
    }
    out
}

/// Convenience used by the stamp computers: opacities only, in point order.
pub fn compute_opacities(points: &[StrokePoint], style: &PenStyle, cfg: &PenConfig) -> Vec<f32> {
    let mut out = Vec::with_capacity(points.len());
    let mut prev: Option<&StrokePoint> = None;
    for p in points {
        out.push(compute_attributes(p, style, cfg, prev).opacity);
        prev = Some(p);
    }
    out
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pen_config::PenConfigRegistry;
    use crate::stroke::{PenStyle, PenType};

    fn style_for(pen: PenType) -> PenStyle {
        PenStyle {
            pen,
            ..PenStyle::default()
        }
    }

    #[test]
    fn width_floor_and_opacity_clamp_hold() {
        let registry = PenConfigRegistry::new();
        let cfg = registry.get(PenType::Ballpoint);
        let style = style_for(PenType::Ballpoint);
        let p = StrokePoint::new(0.0, 0.0, 0.0);
        let attrs = compute_attributes(&p, &style, cfg, None);
        assert!(attrs.width >= MIN_WIDTH);
        assert!((0.0..=1.0).contains(&attrs.opacity));
    }

    #[test]
    fn higher_pressure_widens_ballpoint() {
        let registry = PenConfigRegistry::new();
        let cfg = registry.get(PenType::Ballpoint);
        let style = style_for(PenType::Ballpoint);
        let low = compute_attributes(&StrokePoint::new(0.0, 0.0, 0.1), &style, cfg, None);
        let high = compute_attributes(&StrokePoint::new(0.0, 0.0, 0.9), &style, cfg, None);
        assert!(high.width > low.width);
    }

    #[test]
    fn nib_projection_overrides_width() {
        let registry = PenConfigRegistry::new();
        let cfg = registry.get(PenType::Fountain);
        let style = style_for(PenType::Fountain);
        let prev = StrokePoint::new(0.0, 0.0, 0.5);
        let cur = StrokePoint::new(10.0, 0.0, 0.5);
        let attrs = compute_attributes(&cur, &style, cfg, Some(&prev));
        assert!(attrs.width >= MIN_WIDTH);
    }

    #[test]
    fn fast_velocity_thins_when_configured() {
        let registry = PenConfigRegistry::new();
        let cfg = registry.get(PenType::Brush);
        let style = style_for(PenType::Brush);
        let prev = StrokePoint {
            timestamp_ms: 0.0,
            ..StrokePoint::new(0.0, 0.0, 0.6)
        };
        let slow = StrokePoint {
            timestamp_ms: 100.0,
            ..StrokePoint::new(1.0, 0.0, 0.6)
        };
        let fast = StrokePoint {
            timestamp_ms: 1.0,
            ..StrokePoint::new(10.0, 0.0, 0.6)
        };
        let slow_attrs = compute_attributes(&slow, &style, cfg, Some(&prev));
        let fast_attrs = compute_attributes(&fast, &style, cfg, Some(&prev));
        assert!(fast_attrs.width < slow_attrs.width);
    }
}
