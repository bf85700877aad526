//! Point Codec (C1): compressed stroke sample (de)serialization with fixed quantization.
//!
//! The wire format is a flat array of fixed-size quantized records. Quantization steps are
//! fixed constants rather than configurable, which is what makes `decode(encode(p))`
//! idempotent (§8 property 1): re-encoding a decoded point always rounds to the same grid,
//! so a second round trip is a no-op.

use crate::geom::Rect;
use crate::stroke::StrokePoint;
use bytemuck::{Pod, Zeroable};

/// World-unit position quantum: 1/64 world unit.
const POSITION_SCALE: f32 = 64.0;
/// Pressure quantum: 1/255.
const PRESSURE_SCALE: f32 = 255.0;
/// Tilt/twist quantum: tenths of a degree.
const ANGLE_SCALE: f32 = 10.0;
/// Timestamp quantum: whole milliseconds.
const TIME_SCALE: f64 = 1.0;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct RawPoint {
    x: i32,
    y: i32,
    pressure: u8,
    _pad: [u8; 3],
    tilt_x: i16,
    tilt_y: i16,
    twist: i16,
    _pad2: [u8; 2],
    timestamp_ms: u32,
}

fn quantize(p: &StrokePoint) -> RawPoint {
    RawPoint {
        x: (p.x * POSITION_SCALE).round() as i32,
        y: (p.y * POSITION_SCALE).round() as i32,
        pressure: (p.pressure.clamp(0.0, 1.0) * PRESSURE_SCALE).round() as u8,
        _pad: [0; 3],
        tilt_x: (p.tilt_x * ANGLE_SCALE).round() as i16,
        tilt_y: (p.tilt_y * ANGLE_SCALE).round() as i16,
        twist: (p.twist * ANGLE_SCALE).round() as i16,
        _pad2: [0; 2],
        timestamp_ms: (p.timestamp_ms / TIME_SCALE).round() as u32,
    }
}

fn dequantize(r: &RawPoint) -> StrokePoint {
    StrokePoint {
        x: r.x as f32 / POSITION_SCALE,
        y: r.y as f32 / POSITION_SCALE,
        pressure: r.pressure as f32 / PRESSURE_SCALE,
        tilt_x: r.tilt_x as f32 / ANGLE_SCALE,
        tilt_y: r.tilt_y as f32 / ANGLE_SCALE,
        twist: r.twist as f32 / ANGLE_SCALE,
        timestamp_ms: r.timestamp_ms as f64 * TIME_SCALE,
    }
}

/// Encodes samples into the compressed wire form stored on `Stroke::pts`.
pub fn encode(points: &[StrokePoint]) -> Vec<u8> {
    let raw: Vec<RawPoint> = points.iter().map(quantize).collect();
    bytemuck::cast_slice(&raw).to_vec()
}

/// Decodes a compressed sample sequence. Malformed (truncated) byte slices decode to an
/// empty sequence rather than panicking (§7 MalformedInput: absorbed, not propagated).
pub fn decode(bytes: &[u8]) -> Vec<StrokePoint> {
    let record_size = std::mem::size_of::<RawPoint>();
    if bytes.len() % record_size != 0 {
        return Vec::new();
    }
    let raw: &[RawPoint] = bytemuck::cast_slice(bytes);
    raw.iter().map(dequantize).collect()
}

/// Quantizes a live (not-yet-encoded) sample sequence so active previews match the baked
/// appearance after a real encode/decode round trip (§4.1).
pub fn quantize_live(points: &[StrokePoint]) -> Vec<StrokePoint> {
    decode(&encode(points))
}

pub fn compute_bbox(points: &[StrokePoint]) -> Rect {
    let pts: Vec<crate::geom::Point> = points
        .iter()
        .map(|p| crate::geom::Point::new(p.x, p.y))
        .collect();
    Rect::from_points(&pts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_points() -> Vec<StrokePoint> {
        (0..20)
            .map(|i| StrokePoint {
                x: i as f32 * 1.3,
                y: (i as f32 * 0.7).sin() * 10.0,
                pressure: (i as f32 / 20.0).clamp(0.0, 1.0),
                tilt_x: (i as f32 - 10.0) * 3.0,
                tilt_y: (i as f32 - 5.0) * 2.0,
                twist: i as f32 * 1.5,
                timestamp_ms: i as f64 * 8.0,
            })
            .collect()
    }

    #[test]
    fn round_trip_idempotent() {
        let pts = sample_points();
        let once = decode(&encode(&pts));
        let twice = decode(&encode(&once));
        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.x, b.x);
            assert_eq!(a.y, b.y);
            assert_eq!(a.pressure, b.pressure);
            assert_eq!(a.tilt_x, b.tilt_x);
        }
    }

    #[test]
    fn decode_of_truncated_bytes_is_empty() {
        let pts = sample_points();
        let mut bytes = encode(&pts);
        bytes.pop();
        assert!(decode(&bytes).is_empty());
    }

    #[test]
    fn bbox_matches_extremes() {
        let pts = vec![
            StrokePoint::new(-5.0, 2.0, 0.5),
            StrokePoint::new(10.0, -3.0, 0.5),
            StrokePoint::new(0.0, 20.0, 0.5),
        ];
        let bbox = compute_bbox(&pts);
        assert_eq!(bbox.min_x, -5.0);
        assert_eq!(bbox.max_x, 10.0);
        assert_eq!(bbox.min_y, -3.0);
        assert_eq!(bbox.max_y, 20.0);
    }
}
