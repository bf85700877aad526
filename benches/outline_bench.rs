//! Benchmarks the LOD simplifier (C2) and the two outline generators (C5/C6) across a range
//! of stroke lengths, standing in for the teacher's `bench_render_loop` example but over the
//! parts of this crate that do not need a window or a GPU device to measure.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use inkstroke::id::Lod;
use inkstroke::lod;
use inkstroke::outline;
use inkstroke::pen_config::PenConfigRegistry;
use inkstroke::stroke::{PenStyle, PenType, StrokePoint};

const POINT_COUNTS: [usize; 3] = [64, 512, 4096];

fn wavy_stroke(n: usize) -> Vec<StrokePoint> {
    (0..n)
        .map(|i| {
            let t = i as f32;
            StrokePoint {
                x: t * 1.7,
                y: (t * 0.05).sin() * 20.0 + (t * 0.31).cos() * 4.0,
                pressure: (0.3 + 0.5 * (t * 0.02).sin().abs()).clamp(0.0, 1.0),
                tilt_x: 0.0,
                tilt_y: 0.0,
                twist: 0.0,
                timestamp_ms: t as f64 * 8.0,
            }
        })
        .collect()
}

fn bench_lod_simplify(c: &mut Criterion) {
    let mut group = c.benchmark_group("lod_simplify");
    for &n in &POINT_COUNTS {
        let points = wavy_stroke(n);
        for lod in [Lod::Medium, Lod::Low, Lod::Endpoints] {
            group.bench_with_input(BenchmarkId::new(format!("{lod:?}"), n), &points, |b, points| {
                b.iter(|| lod::simplify(black_box(points), lod));
            });
        }
    }
    group.finish();
}

fn bench_outline_generate(c: &mut Criterion) {
    let registry = PenConfigRegistry::new();
    let mut group = c.benchmark_group("outline_generate");
    for &n in &POINT_COUNTS {
        let points = wavy_stroke(n);

        let round_style = PenStyle {
            pen: PenType::Ballpoint,
            ..PenStyle::default()
        };
        let round_cfg = registry.get(PenType::Ballpoint);
        group.bench_with_input(BenchmarkId::new("round", n), &points, |b, points| {
            b.iter(|| outline::generate(black_box(points), &round_style, round_cfg, false));
        });

        let italic_style = PenStyle {
            pen: PenType::Fountain,
            ..PenStyle::default()
        };
        let italic_cfg = registry.get(PenType::Fountain);
        group.bench_with_input(BenchmarkId::new("italic", n), &points, |b, points| {
            b.iter(|| outline::generate(black_box(points), &italic_style, italic_cfg, false));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_lod_simplify, bench_outline_generate);
criterion_main!(benches);
