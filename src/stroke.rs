//! Core data model (§3): samples, strokes, and pen styles.

use crate::color::Color;
use crate::geom::Rect;
use crate::id::StrokeId;

/// One pressure/tilt sample. Produced by an external input collaborator; immutable once
/// captured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokePoint {
    pub x: f32,
    pub y: f32,
    /// `[0, 1]`.
    pub pressure: f32,
    /// Degrees.
    pub tilt_x: f32,
    /// Degrees.
    pub tilt_y: f32,
    /// Barrel rotation, degrees.
    pub twist: f32,
    pub timestamp_ms: f64,
}

impl StrokePoint {
    pub fn new(x: f32, y: f32, pressure: f32) -> Self {
        Self {
            x,
            y,
            pressure: pressure.clamp(0.0, 1.0),
            tilt_x: 0.0,
            tilt_y: 0.0,
            twist: 0.0,
            timestamp_ms: 0.0,
        }
    }
}

/// A captured ink stroke. Created on pen-up; mutated only by editing tools (out of scope
/// for this crate); owns its compressed samples.
#[derive(Debug, Clone)]
pub struct Stroke {
    pub id: StrokeId,
    pub page_index: u32,
    pub style_ref: u64,
    pub style_overrides: Option<PenStyle>,
    /// Centerline extent — callers expand by stroke width for screen coverage (§3 invariant).
    pub bbox: Rect,
    pub grain_anchor: Option<(f32, f32)>,
    pub point_count: u32,
    pub pts: Vec<u8>,
}

impl Stroke {
    pub fn effective_style<'a>(&'a self, base: &'a PenStyle) -> &'a PenStyle {
        self.style_overrides.as_ref().unwrap_or(base)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PenType {
    Ballpoint,
    FeltTip,
    Pencil,
    Fountain,
    Highlighter,
    Brush,
}

/// Fountain-pen ink deposit behaviour, selected by `PenConfig::ink_preset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InkPresetConfig {
    pub shading: f32,
    pub edge_darkening: f32,
    pub grain_influence: f32,
    pub feathering: f32,
    pub base_opacity: f32,
}

pub const INK_PRESET_STANDARD: InkPresetConfig = InkPresetConfig {
    shading: 0.6,
    edge_darkening: 0.3,
    grain_influence: 0.2,
    feathering: 0.15,
    base_opacity: 0.85,
};

/// Host-authored style (§3). A missing `style_ref` look-up falls back to the registry's
/// built-in ballpoint default (§4.3) so rendering always produces output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PenStyle {
    pub pen: PenType,
    pub color: Color,
    pub width_wu: f32,
    pub opacity: f32,
    pub smoothing: f32,
    pub pressure_curve: f32,
    pub tilt_sensitivity: f32,
    pub nib_angle_rad: Option<f32>,
    pub nib_thickness: Option<f32>,
    pub nib_pressure: Option<f32>,
    pub ink_preset: Option<InkPresetConfig>,
    pub grain: f32,
    /// Forces round (non-italic) rendering even when `PenConfig` defines a nib, so a fountain
    /// pen can be toggled between italic and round by style alone (§4.7).
    pub round: bool,
}

impl Default for PenStyle {
    fn default() -> Self {
        Self {
            pen: PenType::Ballpoint,
            color: Color::rgb(0x1a, 0x1a, 0x1a),
            width_wu: 2.0,
            opacity: 1.0,
            smoothing: 0.3,
            pressure_curve: 1.0,
            tilt_sensitivity: 0.0,
            nib_angle_rad: None,
            nib_thickness: None,
            nib_pressure: None,
            ink_preset: None,
            grain: 0.0,
            round: false,
        }
    }
}
