//! Benchmarks for the forward pass and the generation cycle.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use neuroevo::{
    compute::evolution::{GenomeRng, PopulationManager},
    schema::{EngineConfig, NetworkConfig},
};

fn bench_forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("forward");

    for hidden in [8, 32, 128, 512] {
        let config = NetworkConfig::with_layers(vec![16, hidden, hidden, 4]);
        let genome = GenomeRng::new(1)
            .random_genome(&config)
            .expect("valid layer sizes");
        let inputs: Vec<f32> = (0..16).map(|i| (i as f32 * 0.37).sin()).collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("16x{hidden}x{hidden}x4")),
            &hidden,
            |b, _| {
                b.iter(|| genome.forward(black_box(&inputs)));
            },
        );
    }

    group.finish();
}

fn bench_evolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("evolve");

    for size in [20, 100, 500] {
        let mut config = EngineConfig {
            random_seed: Some(3),
            ..Default::default()
        };
        config.network = NetworkConfig::with_layers(vec![8, 16, 4]);
        config.evolution.population_size = size;
        let mut manager = PopulationManager::new(&config);

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                manager.begin_evaluation();
                black_box(manager.evolve())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_forward, bench_evolve);
criterion_main!(benches);
