//! Criterion benchmarks of the periodic poisson solver.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use rustvort::field::{IcKind, InitialCondition, VorticityField};
use rustvort::grid::GridSpec;
use rustvort::solver::PoissonSolver;
use std::sync::Arc;

const SIZES: [usize; 3] = [64, 128, 256];

/// Setup of the eigen decomposition
fn bench_poisson_setup(c: &mut Criterion) {
    let mut group = c.benchmark_group("poisson_setup");
    group.sample_size(10);
    for n in SIZES.iter() {
        let grid = GridSpec::new(*n, *n, 1.0, 1.0).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n), &grid, |b, grid| {
            b.iter(|| PoissonSolver::new(black_box(grid)).unwrap())
        });
    }
    group.finish();
}

/// Streamfunction of a gaussian vortex
fn bench_poisson_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("poisson_solve");
    let ic = InitialCondition::from_coefficients(IcKind::GaussianBlob, &[1.0, 0.1, 0.0, 0.0]).unwrap();
    for n in SIZES.iter() {
        let grid = Arc::new(GridSpec::new(*n, *n, 1.0, 1.0).unwrap());
        let solver = PoissonSolver::new(&grid).unwrap();
        let omega: Array2<f64> = VorticityField::from_initial(grid, &ic).omega;
        group.bench_with_input(BenchmarkId::from_parameter(n), &omega, |b, omega| {
            b.iter(|| solver.streamfunction(black_box(omega)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_poisson_setup, bench_poisson_solve);
criterion_main!(benches);
