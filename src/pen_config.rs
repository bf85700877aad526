//! Pen Config Registry (C3): read-only PenType -> PenConfig table.

use crate::stroke::{InkPresetConfig, PenType, INK_PRESET_STANDARD};
use ahash::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureRange {
    pub min: f32,
    pub max: f32,
}

impl PressureRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn lerp(&self, t: f32) -> f32 {
        self.min + (self.max - self.min) * t
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrainConfig {
    pub enabled: bool,
    pub strength: f32,
}

/// Pencil scatter stamp parameters (C8).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StampConfig {
    pub spacing: f32,
}

/// Fountain ink-shading stamp parameters (C9).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InkStampConfig {
    pub stamp_size_fraction: f32,
    pub spacing: f32,
}

/// Extra scatter spread driven by stylus tilt (C8 pencil variant).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TiltScatterConfig {
    pub sensitivity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlineStrategyId {
    Standard,
    Italic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PenConfig {
    pub base_width: f32,
    pub pressure_width_range: PressureRange,
    pub pressure_opacity_range: Option<PressureRange>,
    pub thinning: f32,
    pub streamline: f32,
    pub smoothing: f32,
    pub taper_start: f32,
    pub taper_end: f32,
    pub tilt_sensitivity: f32,
    pub pressure_curve: f32,
    pub base_opacity: f32,
    pub highlighter_mode: bool,
    pub nib_angle: Option<f32>,
    pub nib_thickness: Option<f32>,
    pub use_barrel_rotation: bool,
    pub grain: Option<GrainConfig>,
    pub stamp: Option<StampConfig>,
    pub ink_stamp: Option<InkStampConfig>,
    pub tilt_scatter: Option<TiltScatterConfig>,
    pub ink_preset: Option<InkPresetConfig>,
    pub outline_strategy: OutlineStrategyId,
}

const BALLPOINT: PenConfig = PenConfig {
    base_width: 2.0,
    pressure_width_range: PressureRange::new(0.6, 1.3),
    pressure_opacity_range: None,
    thinning: 0.3,
    streamline: 0.5,
    smoothing: 0.35,
    taper_start: 2.0,
    taper_end: 2.0,
    tilt_sensitivity: 0.0,
    pressure_curve: 1.0,
    base_opacity: 1.0,
    highlighter_mode: false,
    nib_angle: None,
    nib_thickness: None,
    use_barrel_rotation: false,
    grain: None,
    stamp: None,
    ink_stamp: None,
    tilt_scatter: None,
    ink_preset: None,
    outline_strategy: OutlineStrategyId::Standard,
};

const FELT_TIP: PenConfig = PenConfig {
    base_width: 3.2,
    pressure_width_range: PressureRange::new(0.7, 1.2),
    pressure_opacity_range: Some(PressureRange::new(0.8, 1.0)),
    thinning: 0.2,
    streamline: 0.4,
    smoothing: 0.4,
    taper_start: 3.0,
    taper_end: 3.0,
    tilt_sensitivity: 0.3,
    pressure_curve: 1.0,
    base_opacity: 0.95,
    highlighter_mode: false,
    nib_angle: None,
    nib_thickness: None,
    use_barrel_rotation: false,
    grain: Some(GrainConfig {
        enabled: true,
        strength: 0.15,
    }),
    stamp: None,
    ink_stamp: None,
    tilt_scatter: None,
    ink_preset: None,
    outline_strategy: OutlineStrategyId::Standard,
};

const PENCIL: PenConfig = PenConfig {
    base_width: 2.4,
    pressure_width_range: PressureRange::new(0.5, 1.1),
    pressure_opacity_range: Some(PressureRange::new(0.4, 0.9)),
    thinning: 0.1,
    streamline: 0.3,
    smoothing: 0.25,
    taper_start: 1.5,
    taper_end: 1.5,
    tilt_sensitivity: 0.5,
    pressure_curve: 1.1,
    base_opacity: 0.85,
    highlighter_mode: false,
    nib_angle: None,
    nib_thickness: None,
    use_barrel_rotation: false,
    grain: Some(GrainConfig {
        enabled: true,
        strength: 0.45,
    }),
    stamp: Some(StampConfig { spacing: 0.35 }),
    ink_stamp: None,
    tilt_scatter: Some(TiltScatterConfig { sensitivity: 0.6 }),
    ink_preset: None,
    outline_strategy: OutlineStrategyId::Standard,
};

const FOUNTAIN: PenConfig = PenConfig {
    base_width: 2.8,
    pressure_width_range: PressureRange::new(0.5, 1.6),
    pressure_opacity_range: None,
    thinning: 0.0,
    streamline: 0.45,
    smoothing: 0.4,
    taper_start: 2.5,
    taper_end: 2.5,
    tilt_sensitivity: 0.2,
    pressure_curve: 1.0,
    base_opacity: 1.0,
    highlighter_mode: false,
    nib_angle: Some(0.4537856), // ~26 degrees
    nib_thickness: Some(0.3),
    use_barrel_rotation: true,
    grain: Some(GrainConfig {
        enabled: true,
        strength: 0.1,
    }),
    stamp: None,
    ink_stamp: Some(InkStampConfig {
        stamp_size_fraction: 0.9,
        spacing: 0.3,
    }),
    tilt_scatter: None,
    ink_preset: Some(INK_PRESET_STANDARD),
    outline_strategy: OutlineStrategyId::Italic,
};

const HIGHLIGHTER: PenConfig = PenConfig {
    base_width: 10.0,
    pressure_width_range: PressureRange::new(0.9, 1.0),
    pressure_opacity_range: None,
    thinning: 0.0,
    streamline: 0.6,
    smoothing: 0.5,
    taper_start: 0.5,
    taper_end: 0.5,
    tilt_sensitivity: 0.0,
    pressure_curve: 1.0,
    base_opacity: 0.3,
    highlighter_mode: true,
    nib_angle: None,
    nib_thickness: None,
    use_barrel_rotation: false,
    grain: None,
    stamp: None,
    ink_stamp: None,
    tilt_scatter: None,
    ink_preset: None,
    outline_strategy: OutlineStrategyId::Standard,
};

const BRUSH: PenConfig = PenConfig {
    base_width: 4.0,
    pressure_width_range: PressureRange::new(0.3, 1.8),
    pressure_opacity_range: Some(PressureRange::new(0.5, 1.0)),
    thinning: 0.4,
    streamline: 0.5,
    smoothing: 0.45,
    taper_start: 4.0,
    taper_end: 6.0,
    tilt_sensitivity: 0.4,
    pressure_curve: 1.3,
    base_opacity: 0.9,
    highlighter_mode: false,
    nib_angle: None,
    nib_thickness: None,
    use_barrel_rotation: false,
    grain: Some(GrainConfig {
        enabled: true,
        strength: 0.2,
    }),
    stamp: None,
    ink_stamp: None,
    tilt_scatter: None,
    ink_preset: None,
    outline_strategy: OutlineStrategyId::Standard,
};

/// Read-only `PenType -> PenConfig` mapping. A style lookup never fails: unknown style refs
/// are resolved by the caller to the ballpoint default (§4.3), and this registry itself
/// always has an entry for every `PenType` variant.
pub struct PenConfigRegistry {
    table: HashMap<PenType, PenConfig>,
}

impl Default for PenConfigRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PenConfigRegistry {
    pub fn new() -> Self {
        let mut table = HashMap::default();
        table.insert(PenType::Ballpoint, BALLPOINT);
        table.insert(PenType::FeltTip, FELT_TIP);
        table.insert(PenType::Pencil, PENCIL);
        table.insert(PenType::Fountain, FOUNTAIN);
        table.insert(PenType::Highlighter, HIGHLIGHTER);
        table.insert(PenType::Brush, BRUSH);
        Self { table }
    }

    pub fn get(&self, pen: PenType) -> &PenConfig {
        self.table.get(&pen).unwrap_or(&BALLPOINT)
    }

    pub fn default_style() -> crate::stroke::PenStyle {
        crate::stroke::PenStyle::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_pen_type_resolves() {
        let registry = PenConfigRegistry::new();
        for pen in [
            PenType::Ballpoint,
            PenType::FeltTip,
            PenType::Pencil,
            PenType::Fountain,
            PenType::Highlighter,
            PenType::Brush,
        ] {
            assert!(registry.get(pen).base_width > 0.0);
        }
    }

    #[test]
    fn fountain_is_italic_with_nib() {
        let registry = PenConfigRegistry::new();
        let cfg = registry.get(PenType::Fountain);
        assert_eq!(cfg.outline_strategy, OutlineStrategyId::Italic);
        assert!(cfg.nib_angle.is_some());
        assert!(cfg.nib_thickness.is_some());
    }

    #[test]
    fn highlighter_is_flagged() {
        let registry = PenConfigRegistry::new();
        assert!(registry.get(PenType::Highlighter).highlighter_mode);
    }
}
