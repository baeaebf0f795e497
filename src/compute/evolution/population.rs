//! Population ownership and the per-generation evolution cycle.

use serde::{Deserialize, Serialize};

use crate::compute::anomaly::{self, AnomalyKind};
use crate::compute::network::NetworkGenome;
use crate::schema::{
    EngineConfig, EvolutionConfig, EvolutionHistory, LoadStrategy, NetworkConfig, PopulationPhase,
};

use super::archive::{ArchiveError, CheckpointStore};
use super::codec::random_or_minimal;
use super::fitness::{EvaluationRecord, FitnessVerdict, classify_fitness};
use super::genome::GenomeRng;

/// Why a checkpoint was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckpointReason {
    /// Best-ever fitness strictly improved.
    Improved,
    /// Periodic save.
    Periodic,
    /// Operator request.
    Manual,
}

/// Best genome to persist, tagged with its provenance.
#[derive(Debug, Clone)]
pub struct CheckpointRequest {
    pub genome: NetworkGenome,
    pub generation: usize,
    pub fitness: f32,
    pub reason: CheckpointReason,
}

/// Summary of one completed evolution cycle.
#[derive(Debug, Clone)]
pub struct GenerationReport {
    /// Index of the generation whose fitness was ranked.
    pub generation: usize,
    pub best_fitness: f32,
    pub mean_fitness: f32,
    pub best_ever_fitness: Option<f32>,
    /// Individual fitness values reset as corrupt.
    pub corrupt_fitness: usize,
    /// The whole batch was treated as corrupt.
    pub batch_corrupt: bool,
    pub stagnating: bool,
    pub tournament_size: usize,
    /// Diversity estimate of the new generation before repair.
    pub diversity: f32,
    /// Genomes replaced by random ones (diversity or corruption repair).
    pub repaired: usize,
    pub checkpoint: Option<CheckpointRequest>,
}

/// Read-only view of the population for reporting layers.
#[derive(Debug, Clone)]
pub struct PopulationSnapshot {
    pub generation: usize,
    pub phase: PopulationPhase,
    pub fitness: Vec<f32>,
    pub best_ever: Option<NetworkGenome>,
    pub history: EvolutionHistory,
}

/// Mutation parameters for a single reproduction pass.
#[derive(Debug, Clone, Copy)]
struct CycleParams {
    rate: f32,
    strength: f32,
    radical_chance: f32,
}

/// Owns the ordered population and runs the generation cycle.
pub struct PopulationManager {
    network: NetworkConfig,
    config: EvolutionConfig,
    checkpoint_interval: usize,
    rng: GenomeRng,
    population: Vec<NetworkGenome>,
    generation: usize,
    phase: PopulationPhase,
    history: EvolutionHistory,
    best_ever: Option<NetworkGenome>,
    batch_corrupt: bool,
}

impl PopulationManager {
    /// Create a manager with a freshly randomized population.
    pub fn new(config: &EngineConfig) -> Self {
        let rng = match config.random_seed {
            Some(seed) => GenomeRng::new(seed),
            None => GenomeRng::random(),
        };
        Self::with_rng(config, rng)
    }

    /// Create a manager drawing randomness from `rng`.
    pub fn with_rng(config: &EngineConfig, rng: GenomeRng) -> Self {
        let mut manager = Self {
            network: config.network.clone(),
            config: config.evolution.clone(),
            checkpoint_interval: config.checkpoint.interval,
            rng,
            population: Vec::new(),
            generation: 0,
            phase: PopulationPhase::Idle,
            history: EvolutionHistory::default(),
            best_ever: None,
            batch_corrupt: false,
        };
        manager.initialize();
        manager
    }

    /// Replace the population with random genomes and clear all history.
    pub fn initialize(&mut self) {
        self.population = (0..self.config.population_size)
            .map(|_| random_or_minimal(&self.network, &mut self.rng))
            .collect();
        self.generation = 0;
        self.phase = PopulationPhase::Idle;
        self.history = EvolutionHistory::default();
        self.best_ever = None;
        self.batch_corrupt = false;
    }

    /// Seed the population from a stored genome.
    ///
    /// Slot 0 receives the genome itself; the following slots up to
    /// `seed_fraction` of the population receive mutated clones of it.
    pub fn seed_with(&mut self, genome: &NetworkGenome) {
        if self.population.is_empty() {
            return;
        }
        let len = self.population.len();
        let seeded = ((self.config.seed_fraction * len as f32).ceil() as usize).clamp(1, len);
        self.population[0] = genome.fresh_clone();
        for slot in 1..seeded {
            let mut clone = genome.fresh_clone();
            self.rng.mutate(
                &mut clone,
                self.config.mutation.rate,
                self.config.mutation.strength,
                &self.config.mutation,
            );
            self.population[slot] = clone;
        }
        log::info!("Seeded {seeded} of {len} genomes from stored checkpoint");
    }

    /// Seed from the checkpoint `strategy` picks in `store`.
    ///
    /// An unusable checkpoint file seeds from a random genome instead.
    pub fn seed_from_store(
        &mut self,
        store: &CheckpointStore,
        strategy: LoadStrategy,
    ) -> Result<(), ArchiveError> {
        let genome = store.load_or_random(strategy, &self.network, &mut self.rng)?;
        self.seed_with(&genome);
        Ok(())
    }

    pub fn genomes(&self) -> &[NetworkGenome] {
        &self.population
    }

    pub fn len(&self) -> usize {
        self.population.len()
    }

    pub fn is_empty(&self) -> bool {
        self.population.is_empty()
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn phase(&self) -> PopulationPhase {
        self.phase
    }

    pub fn history(&self) -> &EvolutionHistory {
        &self.history
    }

    pub fn best_ever(&self) -> Option<&NetworkGenome> {
        self.best_ever.as_ref()
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Copy of the state for display and reporting.
    pub fn snapshot(&self) -> PopulationSnapshot {
        PopulationSnapshot {
            generation: self.generation,
            phase: self.phase,
            fitness: self.population.iter().map(|g| g.fitness).collect(),
            best_ever: self.best_ever.clone(),
            history: self.history.clone(),
        }
    }

    /// Start evaluating the current population: all fitness reset to 0.
    pub fn begin_evaluation(&mut self) {
        for genome in &mut self.population {
            genome.fitness = 0.0;
        }
        self.phase = PopulationPhase::Evaluating;
    }

    /// Write evaluation results back into the genomes.
    ///
    /// Returns how many records were applied. Records pointing outside the
    /// population are skipped.
    pub fn apply_evaluations(&mut self, records: &[EvaluationRecord]) -> usize {
        if self.phase != PopulationPhase::Evaluating {
            log::warn!(
                "Applying evaluations while population is {:?}, not Evaluating",
                self.phase
            );
        }
        let mut applied = 0;
        for record in records {
            match self.population.get_mut(record.genome_index) {
                Some(genome) => {
                    genome.fitness = record.fitness;
                    applied += 1;
                }
                None => log::warn!(
                    "Evaluation record for genome {} ignored; population has {}",
                    record.genome_index,
                    self.population.len()
                ),
            }
        }
        applied
    }

    /// Flag the current batch of fitness values as untrustworthy.
    ///
    /// The next [`evolve`](Self::evolve) resets all fitness, shuffles the
    /// ranking and re-randomizes part of the population.
    pub fn mark_batch_corrupt(&mut self) {
        self.batch_corrupt = true;
    }

    /// Run one generation cycle: rank, elitism, reproduction, diversity
    /// repair, fitness reset.
    pub fn evolve(&mut self) -> GenerationReport {
        let evaluated = self.generation;

        // Ranked
        self.phase = PopulationPhase::Ranked;
        let (corrupt_fitness, sentinel_hit) = self.sanitize_fitness();
        let batch_corrupt = std::mem::take(&mut self.batch_corrupt) || sentinel_hit;
        if batch_corrupt {
            log::warn!(
                "Generation {evaluated}: fitness batch treated as corrupt; resetting all fitness"
            );
            for genome in &mut self.population {
                genome.fitness = 0.0;
            }
            self.rng.shuffle(&mut self.population);
        }
        self.population
            .sort_by(|a, b| b.fitness.total_cmp(&a.fitness));

        let best_fitness = self.population.first().map_or(0.0, |g| g.fitness);
        let mean_fitness = if self.population.is_empty() {
            0.0
        } else {
            self.population.iter().map(|g| g.fitness).sum::<f32>() / self.population.len() as f32
        };
        let improved = !batch_corrupt && self.update_best_ever();
        let stagnating = self.is_stagnating(best_fitness);
        self.history.best_fitness.push(best_fitness);
        self.history.avg_fitness.push(mean_fitness);

        // Reproducing
        self.phase = PopulationPhase::Reproducing;
        let params = self.cycle_params(stagnating);
        let tournament_size = self.config.selection.tournament_size(evaluated);
        let mut next = self.reproduce(params, tournament_size);

        let diversity = self.rng.diversity(&next, &self.config.diversity);
        let mut repaired = 0;
        if diversity < self.config.diversity.floor || batch_corrupt {
            repaired = self.rerandomize_tail(&mut next);
            log::info!(
                "Generation {evaluated}: diversity {diversity:.3}, replaced {repaired} genomes"
            );
        }
        for genome in &mut next {
            genome.fitness = 0.0;
        }
        self.population = next;
        self.history.diversity.push(diversity);

        self.generation += 1;
        self.phase = PopulationPhase::Idle;

        let periodic = self.checkpoint_interval > 0 && self.generation % self.checkpoint_interval == 0;
        let checkpoint = if improved || periodic {
            self.best_ever.as_ref().map(|genome| CheckpointRequest {
                genome: genome.clone(),
                generation: evaluated,
                fitness: genome.fitness,
                reason: if improved {
                    CheckpointReason::Improved
                } else {
                    CheckpointReason::Periodic
                },
            })
        } else {
            None
        };

        log::debug!(
            "Generation {evaluated}: best {best_fitness:.3}, mean {mean_fitness:.3}, \
             tournament {tournament_size}, stagnating {stagnating}"
        );

        GenerationReport {
            generation: evaluated,
            best_fitness,
            mean_fitness,
            best_ever_fitness: self.best_ever.as_ref().map(|g| g.fitness),
            corrupt_fitness,
            batch_corrupt,
            stagnating,
            tournament_size,
            diversity,
            repaired,
            checkpoint,
        }
    }

    /// Reset corrupt fitness values to 0. Returns the count and whether a
    /// sentinel was seen.
    fn sanitize_fitness(&mut self) -> (usize, bool) {
        let guard = &self.config.fitness_guard;
        let mut corrupt = 0;
        let mut sentinel_hit = false;
        for (index, genome) in self.population.iter_mut().enumerate() {
            let verdict = classify_fitness(genome.fitness, guard);
            if verdict.is_corrupt() {
                anomaly::report(
                    AnomalyKind::CorruptFitness,
                    format_args!("genome {index}: {} ({verdict:?})", genome.fitness),
                );
                genome.fitness = 0.0;
                corrupt += 1;
                sentinel_hit |= verdict == FitnessVerdict::Sentinel;
            }
        }
        (corrupt, sentinel_hit)
    }

    /// Record the top genome if it strictly beats the best ever.
    fn update_best_ever(&mut self) -> bool {
        let Some(top) = self.population.first() else {
            return false;
        };
        if self
            .best_ever
            .as_ref()
            .is_none_or(|best| top.fitness > best.fitness)
        {
            self.best_ever = Some(top.clone());
            true
        } else {
            false
        }
    }

    fn is_stagnating(&self, best: f32) -> bool {
        let stagnation = &self.config.stagnation;
        if !stagnation.enabled {
            return false;
        }
        match self.history.recent_best_mean(stagnation.window) {
            Some(mean) => best - mean <= stagnation.relative_margin * mean.abs().max(1e-6),
            None => false,
        }
    }

    fn cycle_params(&self, stagnating: bool) -> CycleParams {
        let mutation = &self.config.mutation;
        let base = CycleParams {
            rate: mutation.rate,
            strength: mutation.strength,
            radical_chance: mutation.radical_chance,
        };
        if !stagnating {
            return base;
        }
        let boost = &self.config.stagnation;
        CycleParams {
            rate: (base.rate * boost.rate_factor).min(1.0),
            strength: base.strength * boost.strength_factor,
            radical_chance: (base.radical_chance * boost.radical_factor).min(1.0),
        }
    }

    /// Build the next generation from the ranked current one.
    fn reproduce(&mut self, params: CycleParams, tournament_size: usize) -> Vec<NetworkGenome> {
        let target = self.config.population_size;
        let parents = &self.population;
        let rng = &mut self.rng;
        let config = &self.config;
        let network = &self.network;

        let mut next = Vec::with_capacity(target);
        let elite = config.elite_count.min(parents.len()).min(target);
        next.extend(parents[..elite].iter().map(NetworkGenome::fresh_clone));

        let crossover_share = config.reproduction.crossover_share;
        let clone_share = config.reproduction.clone_share;
        let clone_factor = config.reproduction.clone_mutation_factor;

        while next.len() < target {
            let roll = rng.unit();
            let mut child = if roll < crossover_share {
                match (
                    rng.tournament_index(parents, tournament_size),
                    rng.tournament_index(parents, tournament_size),
                ) {
                    (Some(i), Some(j)) => {
                        let mut child = rng.crossover(&parents[i], &parents[j], &config.crossover);
                        rng.mutate(&mut child, params.rate, params.strength, &config.mutation);
                        child
                    }
                    _ => random_or_minimal(network, rng),
                }
            } else if roll < crossover_share + clone_share {
                match rng.tournament_index(parents, tournament_size) {
                    Some(i) => {
                        let mut child = parents[i].fresh_clone();
                        rng.mutate(
                            &mut child,
                            (params.rate * clone_factor).min(1.0),
                            params.strength * clone_factor,
                            &config.mutation,
                        );
                        child
                    }
                    None => random_or_minimal(network, rng),
                }
            } else {
                random_or_minimal(network, rng)
            };

            if rng.chance(params.radical_chance) {
                rng.mutate(
                    &mut child,
                    config.mutation.radical_rate,
                    config.mutation.radical_strength,
                    &config.mutation,
                );
            }
            child.fitness = 0.0;
            next.push(child);
        }
        next
    }

    /// Replace the lowest-ranked non-elite genomes with random ones.
    fn rerandomize_tail(&mut self, next: &mut [NetworkGenome]) -> usize {
        let elite = self.config.elite_count.min(next.len());
        let non_elite = next.len() - elite;
        let count = ((self.config.diversity.replace_fraction * non_elite as f32).ceil() as usize)
            .min(non_elite);
        let start = next.len() - count;
        for slot in &mut next[start..] {
            *slot = random_or_minimal(&self.network, &mut self.rng);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DiversityConfig, FitnessGuardConfig, StagnationConfig};

    fn engine_config(size: usize, layers: &[usize]) -> EngineConfig {
        let mut config = EngineConfig {
            random_seed: Some(42),
            ..Default::default()
        };
        config.network = NetworkConfig::with_layers(layers.to_vec());
        config.evolution.population_size = size;
        config
    }

    /// No stagnation boost and no diversity repair.
    fn quiet_config(size: usize, elite: usize) -> EngineConfig {
        let mut config = engine_config(size, &[4, 8, 2]);
        config.evolution.elite_count = elite;
        config.evolution.stagnation = StagnationConfig {
            enabled: false,
            ..Default::default()
        };
        config.evolution.diversity = DiversityConfig {
            floor: 0.0,
            ..Default::default()
        };
        config
    }

    fn assign_fitness(manager: &mut PopulationManager, values: impl Fn(usize) -> f32) {
        manager.begin_evaluation();
        let records: Vec<EvaluationRecord> = (0..manager.len())
            .map(|i| EvaluationRecord {
                genome_index: i,
                fitness: values(i),
                succeeded: false,
                lifetime: 1.0,
            })
            .collect();
        manager.apply_evaluations(&records);
    }

    #[test]
    fn test_initial_population() {
        let manager = PopulationManager::new(&engine_config(10, &[3, 4, 2]));
        assert_eq!(manager.len(), 10);
        assert_eq!(manager.generation(), 0);
        assert_eq!(manager.phase(), PopulationPhase::Idle);
        assert!(manager.genomes().iter().all(|g| g.layer_sizes() == [3, 4, 2]));
    }

    #[test]
    fn test_fresh_population_scenario() {
        let config = engine_config(20, &[4, 8, 2]);
        let mut manager = PopulationManager::new(&config);
        manager.begin_evaluation();
        let before: Vec<NetworkGenome> = manager.genomes().to_vec();

        let report = manager.evolve();
        assert_eq!(report.generation, 0);

        let after = manager.genomes();
        assert_eq!(after.len(), 20);
        assert!(after.iter().all(|g| g.layer_sizes() == [4, 8, 2]));
        assert!(after.iter().all(|g| g.fitness == 0.0));

        let elite = config.evolution.elite_count;
        let novel = after[elite..]
            .iter()
            .filter(|g| !before.iter().any(|b| b.genes().eq(g.genes())))
            .count();
        assert!(novel > 0);
        assert_eq!(manager.generation(), 1);
    }

    #[test]
    fn test_elitism_invariance() {
        let mut manager = PopulationManager::new(&quiet_config(12, 3));
        assign_fitness(&mut manager, |i| (i * 7 % 12) as f32);

        let mut ranked: Vec<NetworkGenome> = manager.genomes().to_vec();
        ranked.sort_by(|a, b| b.fitness.total_cmp(&a.fitness));

        manager.evolve();
        for k in 0..3 {
            let elite = &manager.genomes()[k];
            assert_eq!(elite.fitness, 0.0);
            assert!(elite.genes().eq(ranked[k].genes()));
            assert_eq!(elite.layer_sizes(), ranked[k].layer_sizes());
        }
    }

    #[test]
    fn test_population_size_invariant_over_generations() {
        let mut manager = PopulationManager::new(&engine_config(15, &[3, 5, 2]));
        for generation in 0..25 {
            assign_fitness(&mut manager, |i| ((i + generation) % 5) as f32);
            manager.evolve();
            assert_eq!(manager.len(), 15);
            assert!(manager.genomes().iter().all(|g| g.fitness == 0.0));
        }
        assert_eq!(manager.generation(), 25);
        assert_eq!(manager.history().len(), 25);
    }

    #[test]
    fn test_best_ever_only_strictly_improves() {
        let mut manager = PopulationManager::new(&quiet_config(6, 1));
        assign_fitness(&mut manager, |i| i as f32);
        let report = manager.evolve();
        assert_eq!(report.best_fitness, 5.0);
        assert_eq!(manager.best_ever().unwrap().fitness, 5.0);
        let first_best = manager.best_ever().unwrap().clone();
        assert!(matches!(
            report.checkpoint.as_ref().map(|c| c.reason),
            Some(CheckpointReason::Improved)
        ));

        assign_fitness(&mut manager, |_| 5.0);
        let report = manager.evolve();
        assert!(report.checkpoint.is_none());
        assert!(manager.best_ever().unwrap().genes().eq(first_best.genes()));

        assign_fitness(&mut manager, |i| if i == 2 { 9.0 } else { 1.0 });
        let report = manager.evolve();
        assert_eq!(report.best_ever_fitness, Some(9.0));
        assert_eq!(report.checkpoint.unwrap().fitness, 9.0);
    }

    #[test]
    fn test_periodic_checkpoint() {
        let mut config = quiet_config(6, 1);
        config.checkpoint.interval = 2;
        let mut manager = PopulationManager::new(&config);
        assign_fitness(&mut manager, |_| 1.0);
        let first = manager.evolve();
        assert_eq!(first.checkpoint.unwrap().reason, CheckpointReason::Improved);

        assign_fitness(&mut manager, |_| 0.5);
        let second = manager.evolve();
        assert_eq!(second.checkpoint.unwrap().reason, CheckpointReason::Periodic);

        assign_fitness(&mut manager, |_| 0.5);
        assert!(manager.evolve().checkpoint.is_none());
    }

    #[test]
    fn test_corrupt_fitness_reset_before_ranking() {
        let mut manager = PopulationManager::new(&quiet_config(8, 1));
        assign_fitness(&mut manager, |i| match i {
            0 => f32::NAN,
            1 => f32::INFINITY,
            2 => 1e12,
            3 => 2.0,
            _ => 1.0,
        });
        let report = manager.evolve();
        assert_eq!(report.corrupt_fitness, 3);
        assert!(!report.batch_corrupt);
        assert_eq!(report.best_fitness, 2.0);
    }

    #[test]
    fn test_sentinel_triggers_batch_reset() {
        let mut config = quiet_config(10, 2);
        config.evolution.fitness_guard = FitnessGuardConfig {
            sentinels: vec![1234.5],
            ..Default::default()
        };
        let mut manager = PopulationManager::new(&config);
        assign_fitness(&mut manager, |i| if i == 4 { 1234.5 } else { i as f32 });
        let report = manager.evolve();
        assert!(report.batch_corrupt);
        assert_eq!(report.best_fitness, 0.0);
        assert!(report.repaired > 0);
        assert!(manager.best_ever().is_none());
        assert_eq!(manager.len(), 10);
    }

    #[test]
    fn test_marked_batch_is_reset() {
        let mut manager = PopulationManager::new(&quiet_config(10, 2));
        assign_fitness(&mut manager, |_| 3.0);
        manager.mark_batch_corrupt();
        let report = manager.evolve();
        assert!(report.batch_corrupt);
        assert_eq!(report.mean_fitness, 0.0);
        // ceil(0.2 * 8)
        assert_eq!(report.repaired, 2);
    }

    #[test]
    fn test_stagnation_detected() {
        let mut config = engine_config(8, &[3, 4, 2]);
        config.evolution.stagnation.window = 3;
        let mut manager = PopulationManager::new(&config);
        let mut reports = Vec::new();
        for _ in 0..5 {
            assign_fitness(&mut manager, |i| i as f32);
            reports.push(manager.evolve());
        }
        assert!(!reports[0].stagnating);
        assert!(!reports[2].stagnating);
        assert!(reports[3].stagnating);
        assert!(reports[4].stagnating);

        assign_fitness(&mut manager, |i| 10.0 * i as f32);
        assert!(!manager.evolve().stagnating);
    }

    #[test]
    fn test_stagnation_boost_is_temporary() {
        let manager = PopulationManager::new(&engine_config(4, &[2, 2]));
        let boosted = manager.cycle_params(true);
        let normal = manager.cycle_params(false);
        assert!(boosted.rate > normal.rate);
        assert!(boosted.strength > normal.strength);
        assert!(boosted.radical_chance > normal.radical_chance);
        assert_eq!(normal.rate, manager.config.mutation.rate);
    }

    #[test]
    fn test_diversity_repair_replaces_tail() {
        let mut config = engine_config(10, &[3, 4, 2]);
        config.evolution.elite_count = 2;
        config.evolution.diversity.floor = 1.0;
        config.evolution.stagnation.enabled = false;
        let mut manager = PopulationManager::new(&config);
        assign_fitness(&mut manager, |i| i as f32);
        let mut ranked: Vec<NetworkGenome> = manager.genomes().to_vec();
        ranked.sort_by(|a, b| b.fitness.total_cmp(&a.fitness));

        let report = manager.evolve();
        assert!(report.diversity < 1.0);
        assert_eq!(report.repaired, 2);
        assert_eq!(manager.len(), 10);
        for (elite, parent) in manager.genomes()[..2].iter().zip(&ranked) {
            assert!(elite.genes().eq(parent.genes()));
        }
    }

    /// Children are unmutated clones unless the radical pass fires.
    fn clone_only_config(radical_chance: f32) -> EngineConfig {
        let mut config = quiet_config(12, 2);
        config.evolution.reproduction.crossover_share = 0.0;
        config.evolution.reproduction.clone_share = 1.0;
        config.evolution.mutation.rate = 0.0;
        config.evolution.mutation.major_chance = 0.0;
        config.evolution.mutation.radical_chance = radical_chance;
        config.evolution.mutation.radical_rate = 1.0;
        config.evolution.mutation.radical_strength = 2.0;
        config
    }

    #[test]
    fn test_radical_mutation_rewrites_children() {
        let differing = |a: &NetworkGenome, b: &NetworkGenome| {
            a.genes().zip(b.genes()).filter(|(x, y)| x != y).count()
        };

        let mut manager = PopulationManager::new(&clone_only_config(0.0));
        assign_fitness(&mut manager, |i| i as f32);
        let parents: Vec<NetworkGenome> = manager.genomes().to_vec();
        manager.evolve();
        for child in &manager.genomes()[2..] {
            assert!(parents.iter().any(|p| differing(child, p) == 0));
        }

        let mut manager = PopulationManager::new(&clone_only_config(1.0));
        assign_fitness(&mut manager, |i| i as f32);
        let parents: Vec<NetworkGenome> = manager.genomes().to_vec();
        manager.evolve();
        for child in &manager.genomes()[2..] {
            let genes = child.gene_count();
            assert!(parents.iter().all(|p| differing(child, p) > genes / 2));
            assert!(child.genes().all(|g| g.abs() <= 5.0));
        }
        for elite in &manager.genomes()[..2] {
            assert!(parents.iter().any(|p| differing(elite, p) == 0));
        }
    }

    #[test]
    fn test_seed_with() {
        let mut config = engine_config(10, &[3, 4, 2]);
        config.evolution.seed_fraction = 0.3;
        let mut manager = PopulationManager::new(&config);
        let mut stored = manager.genomes()[7].clone();
        stored.fitness = 8.0;
        manager.seed_with(&stored);
        assert!(manager.genomes()[0].genes().eq(stored.genes()));
        assert_eq!(manager.genomes()[0].fitness, 0.0);
        assert_eq!(manager.len(), 10);
    }

    #[test]
    fn test_seed_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path(), "best").unwrap();
        let config = engine_config(6, &[3, 4, 2]);
        let mut manager = PopulationManager::new(&config);
        assert!(matches!(
            manager.seed_from_store(&store, LoadStrategy::MostRecent),
            Err(ArchiveError::NoCheckpoint { .. })
        ));

        let mut stored = manager.genomes()[4].clone();
        stored.fitness = 3.0;
        store.save_best(&stored, 12).unwrap();
        manager.initialize();
        manager
            .seed_from_store(&store, LoadStrategy::HighestFitness)
            .unwrap();
        assert!(manager.genomes()[0].genes().eq(stored.genes()));
    }

    #[test]
    fn test_out_of_range_records_skipped() {
        let mut manager = PopulationManager::new(&engine_config(4, &[2, 2]));
        manager.begin_evaluation();
        let applied = manager.apply_evaluations(&[
            EvaluationRecord {
                genome_index: 1,
                fitness: 2.0,
                succeeded: true,
                lifetime: 1.0,
            },
            EvaluationRecord {
                genome_index: 99,
                fitness: 5.0,
                succeeded: true,
                lifetime: 1.0,
            },
        ]);
        assert_eq!(applied, 1);
        assert_eq!(manager.genomes()[1].fitness, 2.0);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut manager = PopulationManager::new(&engine_config(4, &[2, 2]));
        assign_fitness(&mut manager, |i| i as f32);
        let snapshot = manager.snapshot();
        assert_eq!(snapshot.phase, PopulationPhase::Evaluating);
        assert_eq!(snapshot.fitness, vec![0.0, 1.0, 2.0, 3.0]);
        manager.evolve();
        assert_eq!(snapshot.fitness.len(), 4);
        assert_eq!(manager.snapshot().history.len(), 1);
    }
}
