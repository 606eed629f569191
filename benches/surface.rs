// Copyright (c) 2026 Kliment Olechnovic and Mikael Lund
// Part of the molsurf project, licensed under the MIT License.
// SPDX-License-Identifier: MIT

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use molsurf::{Atom, Interpolation, SurfaceKind, SurfaceParams, compute_surface};

/// Compact pseudo-random cluster of `n` atoms on a jittered cubic lattice.
fn cluster(n: usize) -> Vec<Atom> {
    let side = (n as f64).cbrt().ceil() as usize;
    (0..n)
        .map(|i| {
            let (x, y, z) = (i % side, (i / side) % side, i / (side * side));
            let t = i as f64;
            Atom::new(
                2.8f64.mul_add(x as f64, 0.4 * (t * 0.37).sin()),
                2.8f64.mul_add(y as f64, 0.4 * (t * 0.11).cos()),
                2.8f64.mul_add(z as f64, 0.4 * (t * 0.53).sin()),
                1.5 + 0.3 * (t * 0.7).sin().abs(),
            )
        })
        .collect()
}

fn bench_kinds(c: &mut Criterion) {
    let mut group = c.benchmark_group("surface");
    group.sample_size(10);

    for n in [27, 125] {
        let atoms = cluster(n);
        group.throughput(Throughput::Elements(n as u64));
        for (name, kind) in [
            ("vdw", SurfaceKind::VanDerWaals),
            ("sas", SurfaceKind::SolventAccessible),
            ("ses", SurfaceKind::SolventExcluded),
        ] {
            let params = SurfaceParams::new(kind, 1.4);
            group.bench_with_input(BenchmarkId::new(name, n), &atoms, |b, atoms| {
                b.iter(|| compute_surface(black_box(atoms), black_box(&params)));
            });
        }
    }

    group.finish();
}

fn bench_interpolation(c: &mut Criterion) {
    let atoms = cluster(64);
    let mut group = c.benchmark_group("interpolation");
    group.sample_size(10);

    for (name, interpolation) in [
        ("linear", Interpolation::Linear),
        ("nonlinear", Interpolation::Nonlinear),
    ] {
        let params = SurfaceParams::new(SurfaceKind::SolventExcluded, 1.4)
            .with_resolution(3.0)
            .with_interpolation(interpolation);
        group.bench_function(name, |b| {
            b.iter(|| compute_surface(black_box(&atoms), black_box(&params)));
        });
    }

    group.finish();
}

fn bench_progressive(c: &mut Criterion) {
    let atoms = cluster(125);
    let mut group = c.benchmark_group("progressive");
    group.sample_size(10);

    for progressive in [false, true] {
        let params = SurfaceParams::new(SurfaceKind::SolventAccessible, 1.4)
            .with_resolution(4.0)
            .with_max_grid_points(120)
            .with_progressive(progressive);
        let name = if progressive { "planes" } else { "full" };
        group.bench_function(name, |b| {
            b.iter(|| compute_surface(black_box(&atoms), black_box(&params)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_kinds, bench_interpolation, bench_progressive);
criterion_main!(benches);
