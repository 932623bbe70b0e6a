use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lcmrs::unit_choice;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn slots(count: usize, seed: u64) -> (Vec<String>, Vec<f64>) {
    let mut rng = SmallRng::seed_from_u64(seed);
    let keys = (0..count).map(|i| format!("unit-{i}")).collect();
    let weights = (0..count).map(|_| rng.gen_range(0.0..1.0)).collect();
    (keys, weights)
}

fn benchmark_unit_choice(c: &mut Criterion) {
    let mut group = c.benchmark_group("unit_choice");
    for &units in &[1_000_usize, 10_000, 100_000] {
        let (keys, weights) = slots(units, units as u64);
        let choosers: Vec<String> = (0..units / 2).map(|i| format!("hh-{i}")).collect();
        group.throughput(Throughput::Elements(units as u64));

        group.bench_with_input(BenchmarkId::new("half_occupied", units), &units, |b, _| {
            let mut rng = SmallRng::seed_from_u64(7);
            b.iter(|| {
                let assignment =
                    unit_choice(black_box(&choosers), &keys, &weights, &mut rng).unwrap();
                black_box(assignment);
            });
        });
    }
    group.finish();
}

criterion_group!(allocation, benchmark_unit_choice);
criterion_main!(allocation);
