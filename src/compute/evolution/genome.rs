//! Genome manipulation utilities for evolutionary search.
//!
//! Provides random generation, crossover, mutation, tournament selection and
//! a sampled diversity estimate.

use rand::prelude::*;

use crate::compute::anomaly::{self, AnomalyKind};
use crate::compute::network::{GenomeError, NetworkGenome};
use crate::schema::{CrossoverConfig, DiversityConfig, MutationConfig, NetworkConfig};

/// Random number generator wrapper for genome operations.
pub struct GenomeRng {
    rng: StdRng,
}

impl GenomeRng {
    /// Create from seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Create with random seed.
    pub fn random() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Generate a random genome of the configured shape.
    ///
    /// Weights are uniform in ±`init_scale / sqrt(fan_in)`, biases in
    /// ±`0.1 * init_scale`.
    pub fn random_genome(&mut self, config: &NetworkConfig) -> Result<NetworkGenome, GenomeError> {
        let mut genome = NetworkGenome::zeros(&config.layer_sizes, config.activation)?;
        let scale = if config.init_scale.is_finite() {
            config.init_scale.abs()
        } else {
            1.0
        };
        for layer in genome.layers_mut() {
            let limit = scale / (layer.inputs() as f32).sqrt();
            for w in layer.weights_mut() {
                *w = self.rng.gen_range(-limit..=limit);
            }
            let bias_limit = 0.1 * scale;
            for b in layer.biases_mut() {
                *b = self.rng.gen_range(-bias_limit..=bias_limit);
            }
        }
        Ok(genome)
    }

    /// Gaussian mutation: add noise to a value and clamp it.
    pub fn gaussian_mutate(&mut self, value: f32, strength: f32, bound: f32) -> f32 {
        let noise: f32 = self.rng.sample(rand_distr::StandardNormal);
        clamp_gene(value + noise * strength, bound)
    }

    /// Mutate a genome in place.
    ///
    /// Each gene is perturbed with probability `rate`. With probability
    /// `config.major_chance` the whole call becomes a major mutation with
    /// boosted rate and strength. A non-positive rate leaves the genome
    /// bit-identical; otherwise every gene ends within ±`weight_bound`.
    pub fn mutate(
        &mut self,
        genome: &mut NetworkGenome,
        rate: f32,
        strength: f32,
        config: &MutationConfig,
    ) {
        if rate.is_nan() || rate <= 0.0 {
            return;
        }
        let strength = if strength.is_finite() {
            strength.max(0.0)
        } else {
            0.0
        };

        let (rate, strength) = if self.rng.gen_bool(probability(config.major_chance)) {
            (
                (rate * config.major_rate_factor).min(1.0),
                strength * config.major_strength_factor,
            )
        } else {
            (rate.min(1.0), strength)
        };

        let bound = config.weight_bound;
        let mut repaired = 0usize;
        for gene in genome.genes_mut() {
            if !gene.is_finite() {
                *gene = 0.0;
                repaired += 1;
            }
            if self.rng.r#gen::<f32>() < rate {
                *gene = self.gaussian_mutate(*gene, strength, bound);
            } else {
                *gene = clamp_gene(*gene, bound);
            }
        }
        if repaired > 0 {
            anomaly::report(
                AnomalyKind::NonFiniteGene,
                format_args!("{repaired} genes reset during mutation"),
            );
        }
    }

    /// Perform crossover between two genomes, recovering from shape mismatch.
    ///
    /// Incompatible parents yield a fresh clone of `parent1` and report a
    /// structural mismatch.
    pub fn crossover(
        &mut self,
        parent1: &NetworkGenome,
        parent2: &NetworkGenome,
        config: &CrossoverConfig,
    ) -> NetworkGenome {
        self.try_crossover(parent1, parent2, config)
            .unwrap_or_else(|e| {
                anomaly::report(AnomalyKind::StructuralMismatch, format_args!("crossover: {e}"));
                parent1.fresh_clone()
            })
    }

    /// Crossover that reports incompatible parents as an error.
    ///
    /// Per output neuron, either the whole incoming row and bias comes from
    /// one parent, or each gene is picked independently with an occasional
    /// linear blend of both parents.
    pub fn try_crossover(
        &mut self,
        parent1: &NetworkGenome,
        parent2: &NetworkGenome,
        config: &CrossoverConfig,
    ) -> Result<NetworkGenome, GenomeError> {
        if !parent1.same_shape(parent2) {
            return Err(GenomeError::ShapeMismatch {
                left: parent1.layer_sizes().to_vec(),
                right: parent2.layer_sizes().to_vec(),
            });
        }

        let p_first = first_parent_probability(parent1.fitness, parent2.fitness, config);
        let neuron_wise = probability(config.neuron_wise_probability);
        let blend_chance = probability(config.blend_probability);

        let mut child = parent1.clone();
        for (t, layer) in child.layers_mut().iter_mut().enumerate() {
            let l1 = &parent1.layers()[t];
            let l2 = &parent2.layers()[t];
            for neuron in 0..layer.outputs() {
                if self.rng.gen_bool(neuron_wise) {
                    let source = if self.rng.gen_bool(p_first) { l1 } else { l2 };
                    layer.row_mut(neuron).copy_from_slice(source.row(neuron));
                    layer.biases_mut()[neuron] = source.biases()[neuron];
                } else {
                    let (r1, r2) = (l1.row(neuron), l2.row(neuron));
                    for (k, gene) in layer.row_mut(neuron).iter_mut().enumerate() {
                        *gene = self.pick_gene(r1[k], r2[k], p_first, blend_chance);
                    }
                    let (b1, b2) = (l1.biases()[neuron], l2.biases()[neuron]);
                    layer.biases_mut()[neuron] = self.pick_gene(b1, b2, p_first, blend_chance);
                }
            }
        }

        let mean = 0.5 * (parent1.fitness + parent2.fitness);
        child.fitness = if mean.is_finite() { mean } else { 0.0 };
        Ok(child)
    }

    fn pick_gene(&mut self, a: f32, b: f32, p_first: f64, blend_chance: f64) -> f32 {
        if self.rng.gen_bool(blend_chance) {
            let t = self.rng.r#gen::<f32>();
            blend(a, b, t)
        } else if self.rng.gen_bool(p_first) {
            a
        } else {
            b
        }
    }

    /// Index of the fittest of `size` uniform draws (with replacement).
    pub fn tournament_index(&mut self, population: &[NetworkGenome], size: usize) -> Option<usize> {
        if population.is_empty() {
            return None;
        }
        let mut best_idx = self.rng.gen_range(0..population.len());
        for _ in 1..size.max(1) {
            let idx = self.rng.gen_range(0..population.len());
            if population[idx].fitness > population[best_idx].fitness {
                best_idx = idx;
            }
        }
        Some(best_idx)
    }

    /// Tournament selection: the fittest of `size` random draws.
    pub fn tournament_select<'a>(
        &mut self,
        population: &'a [NetworkGenome],
        size: usize,
    ) -> Option<&'a NetworkGenome> {
        self.tournament_index(population, size)
            .map(|idx| &population[idx])
    }

    /// Estimate population diversity from randomly sampled pairs.
    ///
    /// Each pair contributes the fraction of genes differing by more than
    /// `gene_threshold`; pairs of different shape count as fully different.
    /// Fewer than two genomes yield 0.
    pub fn diversity(&mut self, population: &[NetworkGenome], config: &DiversityConfig) -> f32 {
        let n = population.len();
        if n < 2 || config.sample_pairs == 0 {
            return 0.0;
        }

        let all_pairs = n * (n - 1) / 2;
        let mut total = 0.0f32;
        let mut count = 0usize;
        if all_pairs <= config.sample_pairs {
            for i in 0..n {
                for j in (i + 1)..n {
                    total += gene_difference(&population[i], &population[j], config.gene_threshold);
                    count += 1;
                }
            }
        } else {
            for _ in 0..config.sample_pairs {
                let i = self.rng.gen_range(0..n);
                let mut j = self.rng.gen_range(0..n - 1);
                if j >= i {
                    j += 1;
                }
                total += gene_difference(&population[i], &population[j], config.gene_threshold);
                count += 1;
            }
        }
        total / count as f32
    }

    /// Uniform draw in [0, 1).
    pub fn unit(&mut self) -> f32 {
        self.rng.r#gen()
    }

    /// Bernoulli draw; `p` is clamped into [0, 1].
    pub fn chance(&mut self, p: f32) -> bool {
        self.rng.gen_bool(probability(p))
    }

    /// Shuffle a slice in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }

    /// Generate next u64 for seeding child RNGs.
    pub fn next_seed(&mut self) -> u64 {
        self.rng.r#gen()
    }
}

/// Linear blend between two values.
fn blend(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Clamp into ±`bound`, zeroing non-finite values. A negative bound counts
/// by magnitude and a non-finite one falls back to the default bound.
fn clamp_gene(value: f32, bound: f32) -> f32 {
    let bound = if bound.is_finite() {
        bound.abs()
    } else {
        MutationConfig::default().weight_bound
    };
    if value.is_finite() {
        value.clamp(-bound, bound)
    } else {
        0.0
    }
}

/// Clamp a probability into the range `gen_bool` accepts.
fn probability(p: f32) -> f64 {
    if p.is_nan() {
        0.0
    } else {
        f64::from(p.clamp(0.0, 1.0))
    }
}

fn first_parent_probability(f1: f32, f2: f32, config: &CrossoverConfig) -> f64 {
    let bias = probability(config.fitter_parent_bias);
    if !(f1.is_finite() && f2.is_finite()) || f1 == f2 {
        0.5
    } else if f1 > f2 {
        bias
    } else {
        1.0 - bias
    }
}

/// Fraction of genes differing by more than `threshold`.
pub fn gene_difference(g1: &NetworkGenome, g2: &NetworkGenome, threshold: f32) -> f32 {
    if !g1.same_shape(g2) {
        return 1.0;
    }
    let total = g1.gene_count();
    if total == 0 {
        return 0.0;
    }
    let differing = g1
        .genes()
        .zip(g2.genes())
        .filter(|(a, b)| !((a - b).abs() <= threshold))
        .count();
    differing as f32 / total as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Activation;
    use proptest::prelude::*;

    fn network(layers: &[usize]) -> NetworkConfig {
        NetworkConfig::with_layers(layers.to_vec())
    }

    #[test]
    fn test_random_genome() {
        let mut rng = GenomeRng::new(42);
        let genome = rng.random_genome(&network(&[4, 8, 2])).unwrap();
        assert_eq!(genome.layer_sizes(), &[4, 8, 2]);
        assert_eq!(genome.fitness, 0.0);
        // fan_in 4 => |w| <= 0.5
        assert!(genome.layers()[0].weights().iter().all(|w| w.abs() <= 0.5));
        assert!(genome.genes().any(|g| g != 0.0));
    }

    #[test]
    fn test_random_genome_invalid_shape() {
        let mut rng = GenomeRng::new(42);
        assert!(rng.random_genome(&network(&[4])).is_err());
    }

    #[test]
    fn test_mutation_zero_rate_is_noop() {
        let mut rng = GenomeRng::new(7);
        let mut genome = rng.random_genome(&network(&[4, 8, 2])).unwrap();
        let original = genome.clone();
        for strength in [0.0, 1.0, 1e6] {
            rng.mutate(&mut genome, 0.0, strength, &MutationConfig::default());
        }
        assert!(
            genome
                .genes()
                .zip(original.genes())
                .all(|(a, b)| a.to_bits() == b.to_bits())
        );
    }

    #[test]
    fn test_mutation_full_rate_changes_genes() {
        let mut rng = GenomeRng::new(7);
        let mut genome = rng.random_genome(&network(&[4, 8, 2])).unwrap();
        let original = genome.clone();
        rng.mutate(&mut genome, 1.0, 0.5, &MutationConfig::default());
        let changed = genome
            .genes()
            .zip(original.genes())
            .filter(|(a, b)| a != b)
            .count();
        assert!(changed > genome.gene_count() / 2);
        assert_eq!(genome.layer_sizes(), original.layer_sizes());
    }

    #[test]
    fn test_mutation_repairs_non_finite() {
        let mut rng = GenomeRng::new(3);
        let mut genome = NetworkGenome::zeros(&[2, 2], Activation::Tanh).unwrap();
        genome.layers_mut()[0].weights_mut()[0] = f32::NAN;
        genome.layers_mut()[0].weights_mut()[1] = 1e9;
        rng.mutate(&mut genome, 0.01, 0.1, &MutationConfig::default());
        assert!(genome.genes().all(|g| g.is_finite() && g.abs() <= 5.0));
    }

    #[test]
    fn test_mutation_tolerates_bad_bound() {
        let mut rng = GenomeRng::new(11);
        let mut genome = rng.random_genome(&network(&[4, 8, 2])).unwrap();
        let negative = MutationConfig {
            weight_bound: -1.0,
            ..Default::default()
        };
        rng.mutate(&mut genome, 1.0, 3.0, &negative);
        assert!(genome.genes().all(|g| g.abs() <= 1.0));

        let not_a_number = MutationConfig {
            weight_bound: f32::NAN,
            ..Default::default()
        };
        rng.mutate(&mut genome, 1.0, 50.0, &not_a_number);
        assert!(genome.genes().all(|g| g.is_finite() && g.abs() <= 5.0));
        assert!(rng.gaussian_mutate(100.0, 0.0, f32::INFINITY) <= 5.0);
    }

    #[test]
    fn test_major_mutation_boosts_rate_and_strength() {
        let config = |major_chance| MutationConfig {
            major_chance,
            major_rate_factor: 10.0,
            major_strength_factor: 50.0,
            ..Default::default()
        };

        let mut rng = GenomeRng::new(21);
        let mut genome = NetworkGenome::zeros(&[4, 8, 2], Activation::Tanh).unwrap();
        rng.mutate(&mut genome, 0.1, 0.01, &config(1.0));
        let changed = genome.genes().filter(|&g| g != 0.0).count();
        let mean_delta = genome.genes().map(f32::abs).sum::<f32>() / genome.gene_count() as f32;
        assert_eq!(changed, genome.gene_count());
        assert!(mean_delta > 0.1, "mean delta {mean_delta}");

        let mut genome = NetworkGenome::zeros(&[4, 8, 2], Activation::Tanh).unwrap();
        rng.mutate(&mut genome, 0.1, 0.01, &config(0.0));
        let changed = genome.genes().filter(|&g| g != 0.0).count();
        assert!(changed < genome.gene_count() / 2);
        assert!(genome.genes().all(|g| g.abs() < 0.1));
    }

    #[test]
    fn test_crossover_shape_mismatch_recovers() {
        let mut rng = GenomeRng::new(1);
        let mut a = rng.random_genome(&network(&[4, 8, 2])).unwrap();
        a.fitness = 3.0;
        let b = rng.random_genome(&network(&[4, 6, 2])).unwrap();

        assert!(matches!(
            rng.try_crossover(&a, &b, &CrossoverConfig::default()),
            Err(GenomeError::ShapeMismatch { .. })
        ));
        let child = rng.crossover(&a, &b, &CrossoverConfig::default());
        assert_eq!(child.fitness, 0.0);
        assert!(child.genes().eq(a.genes()));
    }

    #[test]
    fn test_crossover_child_fitness_is_mean() {
        let mut rng = GenomeRng::new(1);
        let mut a = rng.random_genome(&network(&[3, 2])).unwrap();
        let mut b = rng.random_genome(&network(&[3, 2])).unwrap();
        a.fitness = 2.0;
        b.fitness = 4.0;
        let child = rng.crossover(&a, &b, &CrossoverConfig::default());
        assert_eq!(child.fitness, 3.0);
    }

    #[test]
    fn test_neuron_wise_crossover_keeps_rows_intact() {
        let mut rng = GenomeRng::new(11);
        let a = rng.random_genome(&network(&[5, 6, 3])).unwrap();
        let b = rng.random_genome(&network(&[5, 6, 3])).unwrap();
        let config = CrossoverConfig {
            neuron_wise_probability: 1.0,
            ..Default::default()
        };
        let child = rng.crossover(&a, &b, &config);
        for (t, layer) in child.layers().iter().enumerate() {
            for neuron in 0..layer.outputs() {
                let row = layer.row(neuron);
                let from_a = row == a.layers()[t].row(neuron)
                    && layer.biases()[neuron] == a.layers()[t].biases()[neuron];
                let from_b = row == b.layers()[t].row(neuron)
                    && layer.biases()[neuron] == b.layers()[t].biases()[neuron];
                assert!(from_a || from_b);
            }
        }
    }

    #[test]
    fn test_tournament_picks_fittest_when_large() {
        let mut rng = GenomeRng::new(5);
        let mut population: Vec<NetworkGenome> = (0..5)
            .map(|_| rng.random_genome(&network(&[2, 2])).unwrap())
            .collect();
        for (i, g) in population.iter_mut().enumerate() {
            g.fitness = i as f32;
        }
        // 200 draws from 5 genomes all but guarantee the best is sampled.
        let winner = rng.tournament_select(&population, 200).unwrap();
        assert_eq!(winner.fitness, 4.0);
        assert!(rng.tournament_select(&[], 3).is_none());
    }

    #[test]
    fn test_diversity() {
        let mut rng = GenomeRng::new(9);
        let config = DiversityConfig::default();
        let g = rng.random_genome(&network(&[4, 8, 2])).unwrap();
        let clones = vec![g.clone(), g.clone(), g.clone()];
        assert_eq!(rng.diversity(&clones, &config), 0.0);

        let zero = NetworkGenome::zeros(&[4, 8, 2], Activation::Tanh).unwrap();
        let mut far = zero.clone();
        for gene in far.genes_mut() {
            *gene = 1.0;
        }
        assert_eq!(rng.diversity(&[zero.clone(), far], &config), 1.0);

        let other_shape = NetworkGenome::zeros(&[4, 2], Activation::Tanh).unwrap();
        assert_eq!(gene_difference(&zero, &other_shape, 0.1), 1.0);
        assert_eq!(rng.diversity(&[zero], &config), 0.0);
    }

    #[test]
    fn test_diversity_sampled_in_range() {
        let mut rng = GenomeRng::new(9);
        let population: Vec<NetworkGenome> = (0..30)
            .map(|_| rng.random_genome(&network(&[4, 8, 2])).unwrap())
            .collect();
        let d = rng.diversity(&population, &DiversityConfig::default());
        assert!(d > 0.0 && d <= 1.0);
    }

    proptest! {
        #[test]
        fn prop_mutation_bounded(
            seed in any::<u64>(),
            rate in 0.0f32..=1.0,
            strength in 0.0f32..50.0,
        ) {
            let mut rng = GenomeRng::new(seed);
            let mut genome = rng.random_genome(&network(&[3, 5, 2])).unwrap();
            let config = MutationConfig::default();
            rng.mutate(&mut genome, rate, strength, &config);
            prop_assert!(genome.genes().all(|g| g.abs() <= config.weight_bound));
        }

        #[test]
        fn prop_crossover_gene_provenance(seed in any::<u64>()) {
            let mut rng = GenomeRng::new(seed);
            let shape = network(&[4, 8, 2]);
            let mut a = rng.random_genome(&shape).unwrap();
            let mut b = rng.random_genome(&shape).unwrap();
            a.fitness = 1.0;
            b.fitness = -1.0;
            let config = CrossoverConfig {
                blend_probability: 0.5,
                ..Default::default()
            };
            let child = rng.crossover(&a, &b, &config);
            prop_assert_eq!(child.layer_sizes(), a.layer_sizes());
            for ((c, x), y) in child.genes().zip(a.genes()).zip(b.genes()) {
                let lo = x.min(y) - 1e-6;
                let hi = x.max(y) + 1e-6;
                prop_assert!(c == x || c == y || (lo <= c && c <= hi));
            }
        }
    }
}
