use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use resynth::{DirichletSampler, KAnonDeidentifier, Multinomial, ReservoirSet, SamplingTable, Vocabulary};

fn zipf_counts(n: usize) -> Vec<(usize, f64)> {
    (0..n).map(|i| (i, 1000.0 / (1.0 + i as f64).powf(1.1))).collect()
}

fn bench_sampling_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("sampling_table");

    // Draw cost should not depend on support size or skew.
    let sizes = [10, 1_000, 100_000];

    for &size in &sizes {
        let table = SamplingTable::from_count_entries(zipf_counts(size)).expect("valid weights");
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        group.bench_function(format!("weighted_n{}", size), |b| {
            b.iter(|| black_box(table.sample_weighted(&mut rng)))
        });
        group.bench_function(format!("uniform_n{}", size), |b| {
            b.iter(|| black_box(table.sample_uniform(&mut rng)))
        });
    }

    for &size in &sizes {
        let counts = zipf_counts(size);
        group.bench_function(format!("build_n{}", size), |b| {
            b.iter(|| SamplingTable::from_count_entries(black_box(counts.clone())))
        });
    }
    group.finish();
}

fn bench_dirichlet(c: &mut Criterion) {
    let mut group = c.benchmark_group("dirichlet");

    for &size in &[100, 10_000] {
        let empirical = Multinomial::from_entries(zipf_counts(size)).expect("valid weights");
        let sampler = DirichletSampler::new(&empirical, 0.5).expect("valid prior");
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        group.bench_function(format!("posterior_table_n{}", size), |b| {
            b.iter(|| black_box(sampler.sample_table(&mut rng)))
        });
    }
    group.finish();
}

fn bench_reservoir(c: &mut Criterion) {
    let mut group = c.benchmark_group("reservoir_set");
    let k = 100;

    for &size in &[1_000u64, 100_000] {
        group.bench_function(format!("distinct_n{}_k{}", size, k), |b| {
            b.iter(|| {
                let r = ReservoirSet::new(k);
                let mut rng = ChaCha8Rng::seed_from_u64(3);
                for i in 0..size {
                    r.try_add(&mut rng, black_box(i % (size / 2)));
                }
                black_box(r.into_items());
            })
        });
    }
    group.finish();
}

fn bench_deidentify(c: &mut Criterion) {
    let mut group = c.benchmark_group("kanon");

    for &size in &[1_000usize, 10_000] {
        let names: Vec<String> = (0..size).map(|i| format!("name{:x}", i * 2654435761 % 1_000_003)).collect();
        let counts: std::collections::HashMap<String, f64> = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), 1.0 + (i % 13) as f64))
            .collect();
        let d = KAnonDeidentifier::new(5.0).expect("k > 0");
        group.bench_function(format!("deidentify_n{}", size), |b| {
            b.iter(|| {
                let mut v = Vocabulary::new();
                for n in &names {
                    v.put_if_absent(n.clone());
                }
                d.deidentify(&mut v, |s| counts.get(s).copied().unwrap_or(0.0))
                    .expect("attainable");
                black_box(v.len());
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_sampling_table,
    bench_dirichlet,
    bench_reservoir,
    bench_deidentify
);
criterion_main!(benches);
