//! Host-configurable options (§6).

use crate::stroke::PenType;

/// Rendering feature tier. Each level is a strict superset of the previous one's effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pipeline {
    /// No grain, no ink pools, no stamps — plain vertex-path fills only.
    Basic,
    /// Adds grain isolation passes and fountain ink pools, still vertex-path outlines.
    #[default]
    Advanced,
    /// Adds pencil scatter and fountain ink-shading stamp passes.
    Stamps,
}

/// Which drawing backend the host prefers. The GPU backend falls back to software on
/// creation failure (§4.14); the core never surfaces that fallback as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnginePreference {
    #[default]
    Canvas2d,
    Gpu,
}

/// Host-wide render configuration. `finger_action`, `palm_rejection`, and
/// `toolbar_position` (§6) are consumed by the host, not the core, and are not modeled here.
#[derive(Debug, Clone, Default)]
pub struct RenderConfig {
    pub pipeline: Pipeline,
    pub render_engine_preference: EnginePreference,
    /// Per-pen-type multipliers on `PenConfig::grain.strength`.
    pub grain_strength_overrides: Vec<(PenType, f32)>,
}

impl RenderConfig {
    pub fn grain_override_for(&self, pen: PenType) -> Option<f32> {
        self.grain_strength_overrides
            .iter()
            .find(|(p, _)| *p == pen)
            .map(|(_, strength)| *strength)
    }
}
