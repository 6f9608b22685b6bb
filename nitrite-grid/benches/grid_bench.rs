//! Grid index benchmarks

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use nitrite_grid::{BoundingBox, FileNodeStore, Grid, MemoryNodeStore};
use std::hint::black_box;
use tempfile::tempdir;

fn region() -> BoundingBox {
    BoundingBox::new(0.0, 0.0, 100.0, 100.0)
}

fn bench_memory_grid_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("MemoryGrid Insert");

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter_with_setup(
                || Grid::new(region(), 256, MemoryNodeStore::new()).unwrap(),
                |mut grid| {
                    for i in 0..size {
                        let x = (i % 99) as f64;
                        let y = (i / 99 % 99) as f64;
                        grid.insert_data(i as u64, BoundingBox::new(x, y, x + 1.0, y + 1.0))
                            .unwrap();
                    }
                    black_box(grid.stats())
                },
            );
        });
    }

    group.finish();
}

fn bench_file_grid_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("FileGrid Insert");

    for size in [100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter_with_setup(
                || {
                    let dir = tempdir().unwrap();
                    let path = dir.path().join("bench.grid");
                    let store = FileNodeStore::create(&path).unwrap();
                    (Grid::new(region(), 256, store).unwrap(), dir)
                },
                |(mut grid, _dir)| {
                    for i in 0..size {
                        let x = (i % 99) as f64;
                        let y = (i / 99 % 99) as f64;
                        grid.insert_data(i as u64, BoundingBox::new(x, y, x + 1.0, y + 1.0))
                            .unwrap();
                    }
                    black_box(grid.stats())
                },
            );
        });
    }

    group.finish();
}

fn bench_grid_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("Grid Search");

    let mut grid = Grid::new(region(), 256, MemoryNodeStore::new()).unwrap();
    for i in 0..10000u64 {
        let x = (i % 99) as f64;
        let y = (i / 99 % 99) as f64;
        grid.insert_data(i, BoundingBox::new(x, y, x + 1.0, y + 1.0))
            .unwrap();
    }

    group.bench_function("intersecting_10k", |b| {
        b.iter(|| {
            let query = BoundingBox::new(25.0, 25.0, 75.0, 75.0);
            black_box(grid.find_intersecting(&query).unwrap())
        });
    });

    group.bench_function("contained_10k", |b| {
        b.iter(|| {
            let query = BoundingBox::new(40.0, 40.0, 45.0, 45.0);
            black_box(grid.find_contained(&query).unwrap())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_memory_grid_insert,
    bench_file_grid_insert,
    bench_grid_search
);
criterion_main!(benches);
