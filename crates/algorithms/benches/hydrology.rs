//! Benchmarks for the hydrology pipeline

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use cuenca_algorithms::hydrology::{
    accumulate, condition, flow_direction, AccumulationParams, ConditionParams,
    FlowDirectionParams, ProcessingMode,
};
use cuenca_core::{GeoTransform, Raster};

/// Bowl sloping toward the centre with a little noise, so conditioning has
/// depressions and flats to work on
fn create_basin_dem(size: usize) -> Raster<f64> {
    let mut dem = Raster::new(size, size);
    dem.set_transform(GeoTransform::new(0.0, size as f64, 1.0, -1.0));
    let center = size as f64 / 2.0;
    for row in 0..size {
        for col in 0..size {
            let dx = col as f64 - center;
            let dy = row as f64 - center;
            let noise = ((row * 7 + col * 13) % 17) as f64 * 0.01;
            dem.set(row, col, dx.hypot(dy) + noise).unwrap();
        }
    }
    dem
}

fn bench_condition(c: &mut Criterion) {
    let mut group = c.benchmark_group("hydrology/condition");
    for size in [128, 256, 512] {
        let dem = create_basin_dem(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| condition(black_box(&dem), ConditionParams::default()).unwrap())
        });
    }
    group.finish();
}

fn bench_flow_direction(c: &mut Criterion) {
    let mut group = c.benchmark_group("hydrology/flow_direction");
    for size in [256, 512, 1024] {
        let dem = condition(&create_basin_dem(size), ConditionParams::default()).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| flow_direction(black_box(&dem), FlowDirectionParams::default()).unwrap())
        });
    }
    group.finish();
}

fn bench_accumulate(c: &mut Criterion) {
    let mut group = c.benchmark_group("hydrology/accumulate");
    for size in [256, 512, 1024] {
        let dem = condition(&create_basin_dem(size), ConditionParams::default()).unwrap();
        let fdir = flow_direction(&dem, FlowDirectionParams::default()).unwrap();
        for mode in [ProcessingMode::Sequential, ProcessingMode::Wave] {
            let params = AccumulationParams { mode, ..Default::default() };
            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", mode).to_lowercase(), size),
                &size,
                |b, _| b.iter(|| accumulate(black_box(&fdir), None, params.clone()).unwrap()),
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_condition, bench_flow_direction, bench_accumulate);
criterion_main!(benches);
