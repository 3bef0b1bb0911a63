use core::f64::consts::PI;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use sky_area::healpix::{self, AdaptiveGrid, PixelOrdering};
use sky_area::prelude::*;

fn sky_points(n: usize) -> Vec<SkyPoint> {
    let mut rng = fastrand::Rng::with_seed(42);
    (0..n)
        .map(|_| SkyPoint::new(2.0 * PI * rng.f64(), (2.0 * rng.f64() - 1.0).asin()))
        .collect()
}

fn bench_adaptive_grid(c: &mut Criterion) {
    let mut group = c.benchmark_group("adaptive_grid");
    for n in [1_000, 10_000] {
        let points = sky_points(n);
        group.bench_with_input(BenchmarkId::new("points", n), &points, |b, points| {
            b.iter(|| AdaptiveGrid::new(points, healpix::MAX_ORDER).unwrap());
        });
    }
    group.finish();
}

fn bench_reorder(c: &mut Criterion) {
    let mut group = c.benchmark_group("reorder");
    for nside in [64_u64, 256] {
        let values: Vec<f64> = (0..healpix::npix(nside)).map(|i| i as f64).collect();
        group.bench_with_input(BenchmarkId::new("nside", nside), &values, |b, values| {
            b.iter(|| healpix::reorder(values, PixelOrdering::Nested, PixelOrdering::Ring).unwrap());
        });
    }
    group.finish();
}

fn bench_sky_area(c: &mut Criterion) {
    let mut rng = fastrand::Rng::with_seed(3);
    let points: Vec<SkyPoint> = (0..1000)
        .map(|_| SkyPoint::new(2.0 + 0.1 * rng.f64(), 0.4 + 0.1 * rng.f64()))
        .collect();
    let posterior = SkyPosterior::builder()
        .n_trials(1)
        .seed(3)
        .build_sky(&points)
        .unwrap();
    // first call builds the cached grid
    posterior.sky_area(&[0.5], AreaMethod::Adaptive).unwrap();

    c.bench_function("sky_area_adaptive_cached", |b| {
        b.iter(|| posterior.sky_area(&[0.5, 0.9], AreaMethod::Adaptive).unwrap());
    });
    c.bench_function("sky_map_adaptive_nside64", |b| {
        b.iter(|| {
            posterior
                .to_healpix(64, PixelOrdering::Ring, MapMethod::Adaptive)
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_adaptive_grid, bench_reorder, bench_sky_area);
criterion_main!(benches);
