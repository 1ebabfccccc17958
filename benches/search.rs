use std::hint::black_box;

use clipsearch::searcher::rank;
use clipsearch::{Embedding, Index};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::prelude::*;

const DIM: usize = 512;

fn random_embedding(rng: &mut StdRng, rows: usize) -> Embedding {
    let values = (0..rows * DIM).map(|_| rng.random_range(-1.0..1.0)).collect::<Vec<f32>>();
    Embedding::new(ndarray::Array2::from_shape_vec((rows, DIM), values).unwrap()).unwrap()
}

fn random_index(rng: &mut StdRng, n: usize, rows: usize) -> Index {
    Index::from_entries((0..n).map(|i| (format!("/img/{:06}.jpg", i), random_embedding(rng, rows))))
        .unwrap()
}

fn bench_rank(c: &mut Criterion) {
    let mut group = c.benchmark_group("Rank");
    let mut rng = StdRng::seed_from_u64(42);
    let query = random_embedding(&mut rng, 1);

    for n in [1_000, 10_000] {
        let index = random_index(&mut rng, n, 1);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("single", n), &index, |b, index| {
            b.iter(|| rank(black_box(&query), index, 10).unwrap());
        });
    }

    // 每张图片 5 个裁剪
    let index = random_index(&mut rng, 2_000, 5);
    group.throughput(Throughput::Elements(2_000));
    group.bench_function("crops/2000", |b| {
        b.iter(|| rank(black_box(&query), &index, 10).unwrap());
    });
    group.finish();
}

criterion_group!(benches, bench_rank);
criterion_main!(benches);
