//! Evolution configuration types for neuroevolution of agent controllers.
//!
//! Every tunable of the genetic operators and the population cycle lives in
//! one of the structs below and is passed by reference into the operators.

use serde::{Deserialize, Serialize};

use super::{CheckpointConfig, ConfigError, EvaluationConfig, NetworkConfig};

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Network shape and initialization.
    #[serde(default)]
    pub network: NetworkConfig,
    /// Population and genetic operator settings.
    #[serde(default)]
    pub evolution: EvolutionConfig,
    /// Evaluation timing and early termination.
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    /// Persistence of evolved genomes.
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

/// Population and genetic operator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Number of genomes in the population.
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    /// Top genomes copied unchanged into the next generation.
    #[serde(default = "default_elite_count")]
    pub elite_count: usize,
    /// Fraction of the population filled with mutated clones of a resumed genome.
    #[serde(default = "default_seed_fraction")]
    pub seed_fraction: f32,
    #[serde(default)]
    pub mutation: MutationConfig,
    #[serde(default)]
    pub crossover: CrossoverConfig,
    #[serde(default)]
    pub reproduction: ReproductionConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub stagnation: StagnationConfig,
    #[serde(default)]
    pub diversity: DiversityConfig,
    #[serde(default)]
    pub fitness_guard: FitnessGuardConfig,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: default_population_size(),
            elite_count: default_elite_count(),
            seed_fraction: default_seed_fraction(),
            mutation: MutationConfig::default(),
            crossover: CrossoverConfig::default(),
            reproduction: ReproductionConfig::default(),
            selection: SelectionConfig::default(),
            stagnation: StagnationConfig::default(),
            diversity: DiversityConfig::default(),
            fitness_guard: FitnessGuardConfig::default(),
        }
    }
}

fn default_population_size() -> usize {
    50
}
fn default_elite_count() -> usize {
    2
}
fn default_seed_fraction() -> f32 {
    0.5
}

/// Gaussian mutation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationConfig {
    /// Per-gene mutation probability (0.0-1.0).
    #[serde(default = "default_mutation_rate")]
    pub rate: f32,
    /// Standard deviation of the Gaussian perturbation.
    #[serde(default = "default_mutation_strength")]
    pub strength: f32,
    /// Genes are clamped to ±`weight_bound` after mutation.
    #[serde(default = "default_weight_bound")]
    pub weight_bound: f32,
    /// Per-call probability of a major mutation.
    #[serde(default = "default_major_chance")]
    pub major_chance: f32,
    /// Rate multiplier during a major mutation.
    #[serde(default = "default_major_rate_factor")]
    pub major_rate_factor: f32,
    /// Strength multiplier during a major mutation.
    #[serde(default = "default_major_strength_factor")]
    pub major_strength_factor: f32,
    /// Per-child probability of an extra radical mutation pass.
    #[serde(default = "default_radical_chance")]
    pub radical_chance: f32,
    /// Mutation rate of the radical pass.
    #[serde(default = "default_radical_rate")]
    pub radical_rate: f32,
    /// Mutation strength of the radical pass.
    #[serde(default = "default_radical_strength")]
    pub radical_strength: f32,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            rate: default_mutation_rate(),
            strength: default_mutation_strength(),
            weight_bound: default_weight_bound(),
            major_chance: default_major_chance(),
            major_rate_factor: default_major_rate_factor(),
            major_strength_factor: default_major_strength_factor(),
            radical_chance: default_radical_chance(),
            radical_rate: default_radical_rate(),
            radical_strength: default_radical_strength(),
        }
    }
}

fn default_mutation_rate() -> f32 {
    0.1
}
fn default_mutation_strength() -> f32 {
    0.3
}
fn default_weight_bound() -> f32 {
    5.0
}
fn default_major_chance() -> f32 {
    0.05
}
fn default_major_rate_factor() -> f32 {
    2.0
}
fn default_major_strength_factor() -> f32 {
    5.0
}
fn default_radical_chance() -> f32 {
    0.05
}
fn default_radical_rate() -> f32 {
    0.5
}
fn default_radical_strength() -> f32 {
    1.0
}

/// Crossover settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossoverConfig {
    /// Probability that a neuron inherits its whole incoming row from one parent.
    #[serde(default = "default_neuron_wise_probability")]
    pub neuron_wise_probability: f32,
    /// Per-gene probability of interpolating instead of picking a parent.
    #[serde(default = "default_blend_probability")]
    pub blend_probability: f32,
    /// Probability of picking the fitter parent in a coin flip.
    #[serde(default = "default_fitter_parent_bias")]
    pub fitter_parent_bias: f32,
}

impl Default for CrossoverConfig {
    fn default() -> Self {
        Self {
            neuron_wise_probability: default_neuron_wise_probability(),
            blend_probability: default_blend_probability(),
            fitter_parent_bias: default_fitter_parent_bias(),
        }
    }
}

fn default_neuron_wise_probability() -> f32 {
    0.7
}
fn default_blend_probability() -> f32 {
    0.1
}
fn default_fitter_parent_bias() -> f32 {
    0.6
}

/// Mix of reproduction recipes. Fresh random genomes fill the remainder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReproductionConfig {
    /// Share of children produced by crossover + mutation.
    #[serde(default = "default_crossover_share")]
    pub crossover_share: f32,
    /// Share of children produced by cloning + stronger mutation.
    #[serde(default = "default_clone_share")]
    pub clone_share: f32,
    /// Rate and strength multiplier for cloned children.
    #[serde(default = "default_clone_mutation_factor")]
    pub clone_mutation_factor: f32,
}

impl Default for ReproductionConfig {
    fn default() -> Self {
        Self {
            crossover_share: default_crossover_share(),
            clone_share: default_clone_share(),
            clone_mutation_factor: default_clone_mutation_factor(),
        }
    }
}

fn default_crossover_share() -> f32 {
    0.7
}
fn default_clone_share() -> f32 {
    0.2
}
fn default_clone_mutation_factor() -> f32 {
    2.0
}

/// Tournament selection schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Tournament size at generation 0.
    #[serde(default = "default_tournament_size")]
    pub initial_size: usize,
    /// Generations between size increases (0 keeps the size fixed).
    #[serde(default = "default_growth_interval")]
    pub growth_interval: usize,
    /// Size increase per interval.
    #[serde(default = "default_growth_step")]
    pub growth_step: usize,
    /// Hard cap on the tournament size.
    #[serde(default = "default_max_tournament_size")]
    pub max_size: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            initial_size: default_tournament_size(),
            growth_interval: default_growth_interval(),
            growth_step: default_growth_step(),
            max_size: default_max_tournament_size(),
        }
    }
}

impl SelectionConfig {
    /// Tournament size to use for the given generation.
    pub fn tournament_size(&self, generation: usize) -> usize {
        let grown = if self.growth_interval == 0 {
            self.initial_size
        } else {
            let steps = generation / self.growth_interval;
            self.initial_size
                .saturating_add(steps.saturating_mul(self.growth_step))
        };
        grown.min(self.max_size).max(1)
    }
}

fn default_tournament_size() -> usize {
    3
}
fn default_growth_interval() -> usize {
    10
}
fn default_growth_step() -> usize {
    1
}
fn default_max_tournament_size() -> usize {
    7
}

/// Stagnation detection and mutation boost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagnationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Number of past generations the current best is compared against.
    #[serde(default = "default_stagnation_window")]
    pub window: usize,
    /// Improvement below this fraction of the window mean counts as stagnation.
    #[serde(default = "default_relative_margin")]
    pub relative_margin: f32,
    #[serde(default = "default_boost_factor")]
    pub rate_factor: f32,
    #[serde(default = "default_boost_factor")]
    pub strength_factor: f32,
    #[serde(default = "default_radical_factor")]
    pub radical_factor: f32,
}

impl Default for StagnationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: default_stagnation_window(),
            relative_margin: default_relative_margin(),
            rate_factor: default_boost_factor(),
            strength_factor: default_boost_factor(),
            radical_factor: default_radical_factor(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_stagnation_window() -> usize {
    10
}
fn default_relative_margin() -> f32 {
    0.01
}
fn default_boost_factor() -> f32 {
    1.5
}
fn default_radical_factor() -> f32 {
    2.0
}

/// Diversity estimate and repair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiversityConfig {
    /// Repair triggers when the estimated diversity falls below this (0 disables).
    #[serde(default = "default_diversity_floor")]
    pub floor: f32,
    /// Fraction of non-elite genomes replaced by random ones on repair.
    #[serde(default = "default_replace_fraction")]
    pub replace_fraction: f32,
    /// Maximum genome pairs sampled for the estimate.
    #[serde(default = "default_sample_pairs")]
    pub sample_pairs: usize,
    /// Genes differing by more than this count as different.
    #[serde(default = "default_gene_threshold")]
    pub gene_threshold: f32,
}

impl Default for DiversityConfig {
    fn default() -> Self {
        Self {
            floor: default_diversity_floor(),
            replace_fraction: default_replace_fraction(),
            sample_pairs: default_sample_pairs(),
            gene_threshold: default_gene_threshold(),
        }
    }
}

fn default_diversity_floor() -> f32 {
    0.1
}
fn default_replace_fraction() -> f32 {
    0.2
}
fn default_sample_pairs() -> usize {
    20
}
fn default_gene_threshold() -> f32 {
    0.1
}

/// Detection of corrupt fitness telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitnessGuardConfig {
    /// Known poisoned fitness values.
    #[serde(default)]
    pub sentinels: Vec<f32>,
    /// Absolute tolerance when matching sentinels.
    #[serde(default = "default_sentinel_tolerance")]
    pub sentinel_tolerance: f32,
    /// Fitness magnitudes above this are treated as corrupt.
    #[serde(default = "default_absurd_limit")]
    pub absurd_limit: f32,
    /// A non-zero batch whose values all lie within this of each other is suspect.
    #[serde(default = "default_uniform_tolerance")]
    pub uniform_tolerance: f32,
}

impl Default for FitnessGuardConfig {
    fn default() -> Self {
        Self {
            sentinels: Vec::new(),
            sentinel_tolerance: default_sentinel_tolerance(),
            absurd_limit: default_absurd_limit(),
            uniform_tolerance: default_uniform_tolerance(),
        }
    }
}

fn default_sentinel_tolerance() -> f32 {
    1e-3
}
fn default_absurd_limit() -> f32 {
    1e6
}
fn default_uniform_tolerance() -> f32 {
    1e-6
}

// ============================================================================
// Progress Reporting
// ============================================================================

/// Phase of the population cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PopulationPhase {
    /// Between generations.
    #[default]
    Idle,
    /// Fitness is being accumulated by the environment.
    Evaluating,
    /// Fitness sanitized and population sorted.
    Ranked,
    /// Next generation under construction.
    Reproducing,
}

/// State of the generation orchestrator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum OrchestratorState {
    #[default]
    Spawning,
    Evaluating,
    Scoring,
    Evolving,
    /// A stop request was honoured; `resume` re-enters `Spawning`.
    Stopped,
}

/// Why an evaluation phase ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GenerationEnd {
    /// The full generation time elapsed.
    TimeBudget,
    /// Too many agents failed after warm-up.
    MostlyFailed,
    /// Enough agents succeeded after warm-up.
    MostlySucceeded,
    /// An operator forced the next generation.
    Forced,
}

/// Per-generation history for plotting and stagnation detection.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EvolutionHistory {
    /// Best fitness per generation.
    pub best_fitness: Vec<f32>,
    /// Average fitness per generation.
    pub avg_fitness: Vec<f32>,
    /// Diversity estimate per generation (after reproduction).
    pub diversity: Vec<f32>,
}

impl EvolutionHistory {
    /// Number of completed generations recorded.
    pub fn len(&self) -> usize {
        self.best_fitness.len()
    }

    pub fn is_empty(&self) -> bool {
        self.best_fitness.is_empty()
    }

    /// Mean of the last `window` best-fitness values, if that many exist.
    pub fn recent_best_mean(&self, window: usize) -> Option<f32> {
        if window == 0 || self.best_fitness.len() < window {
            return None;
        }
        let recent = &self.best_fitness[self.best_fitness.len() - window..];
        Some(recent.iter().sum::<f32>() / window as f32)
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Evolution configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum EvolutionConfigError {
    #[error("Population size must be at least 2")]
    PopulationTooSmall,
    #[error("Elite count {elite} must be smaller than population size {population}")]
    TooManyElites { elite: usize, population: usize },
    #[error("Probability {name} must lie in [0, 1], got {value}")]
    InvalidProbability { name: &'static str, value: f32 },
    #[error("Parameter {name} must be non-negative and finite, got {value}")]
    InvalidMagnitude { name: &'static str, value: f32 },
    #[error("Reproduction shares sum to {0}, must not exceed 1")]
    InvalidShares(f32),
    #[error("Tournament sizes must be at least 1 and initial <= max")]
    InvalidTournament,
    #[error("Base config validation failed: {0}")]
    BaseConfigError(#[from] ConfigError),
}

impl EvolutionConfig {
    /// Validate evolution configuration.
    pub fn validate(&self) -> Result<(), EvolutionConfigError> {
        if self.population_size < 2 {
            return Err(EvolutionConfigError::PopulationTooSmall);
        }
        if self.elite_count >= self.population_size {
            return Err(EvolutionConfigError::TooManyElites {
                elite: self.elite_count,
                population: self.population_size,
            });
        }

        let check_probability = |name: &'static str, value: f32| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(EvolutionConfigError::InvalidProbability { name, value })
            }
        };
        let check_magnitude = |name: &'static str, value: f32| {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(EvolutionConfigError::InvalidMagnitude { name, value })
            }
        };

        check_probability("seed_fraction", self.seed_fraction)?;
        check_probability("mutation.rate", self.mutation.rate)?;
        check_probability("mutation.major_chance", self.mutation.major_chance)?;
        check_probability("mutation.radical_chance", self.mutation.radical_chance)?;
        check_probability("mutation.radical_rate", self.mutation.radical_rate)?;
        check_probability(
            "crossover.neuron_wise_probability",
            self.crossover.neuron_wise_probability,
        )?;
        check_probability("crossover.blend_probability", self.crossover.blend_probability)?;
        check_probability(
            "crossover.fitter_parent_bias",
            self.crossover.fitter_parent_bias,
        )?;
        check_probability("diversity.floor", self.diversity.floor)?;
        check_probability("diversity.replace_fraction", self.diversity.replace_fraction)?;

        check_magnitude("mutation.strength", self.mutation.strength)?;
        check_magnitude("mutation.weight_bound", self.mutation.weight_bound)?;
        check_magnitude("mutation.major_rate_factor", self.mutation.major_rate_factor)?;
        check_magnitude(
            "mutation.major_strength_factor",
            self.mutation.major_strength_factor,
        )?;
        check_magnitude("mutation.radical_strength", self.mutation.radical_strength)?;
        check_magnitude(
            "reproduction.clone_mutation_factor",
            self.reproduction.clone_mutation_factor,
        )?;
        check_magnitude("stagnation.relative_margin", self.stagnation.relative_margin)?;
        check_magnitude("stagnation.rate_factor", self.stagnation.rate_factor)?;
        check_magnitude("stagnation.strength_factor", self.stagnation.strength_factor)?;
        check_magnitude("stagnation.radical_factor", self.stagnation.radical_factor)?;
        check_magnitude("diversity.gene_threshold", self.diversity.gene_threshold)?;
        check_magnitude(
            "fitness_guard.sentinel_tolerance",
            self.fitness_guard.sentinel_tolerance,
        )?;
        check_magnitude("fitness_guard.absurd_limit", self.fitness_guard.absurd_limit)?;
        check_magnitude(
            "fitness_guard.uniform_tolerance",
            self.fitness_guard.uniform_tolerance,
        )?;

        check_probability("reproduction.crossover_share", self.reproduction.crossover_share)?;
        check_probability("reproduction.clone_share", self.reproduction.clone_share)?;
        let shares = self.reproduction.crossover_share + self.reproduction.clone_share;
        if shares > 1.0 + f32::EPSILON {
            return Err(EvolutionConfigError::InvalidShares(shares));
        }

        if self.selection.initial_size == 0
            || self.selection.max_size == 0
            || self.selection.initial_size > self.selection.max_size
        {
            return Err(EvolutionConfigError::InvalidTournament);
        }

        Ok(())
    }
}

impl EngineConfig {
    /// Validate every configuration section.
    pub fn validate(&self) -> Result<(), EvolutionConfigError> {
        self.network.validate()?;
        self.evaluation.validate()?;
        self.checkpoint.validate()?;
        self.evolution.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serialization() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(
            parsed.evolution.population_size,
            config.evolution.population_size
        );
        assert_eq!(parsed.network.layer_sizes, config.network.layer_sizes);
    }

    #[test]
    fn test_empty_json_is_default() {
        let parsed: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.evolution.elite_count, 2);
        assert_eq!(parsed.evolution.mutation.weight_bound, 5.0);
        assert!(parsed.checkpoint.directory.is_none());
    }

    #[test]
    fn test_tournament_schedule() {
        let selection = SelectionConfig::default();
        assert_eq!(selection.tournament_size(0), 3);
        assert_eq!(selection.tournament_size(9), 3);
        assert_eq!(selection.tournament_size(10), 4);
        assert_eq!(selection.tournament_size(35), 6);
        assert_eq!(selection.tournament_size(1000), 7);

        let fixed = SelectionConfig {
            growth_interval: 0,
            ..Default::default()
        };
        assert_eq!(fixed.tournament_size(1000), 3);
    }

    #[test]
    fn test_invalid_elites() {
        let config = EvolutionConfig {
            population_size: 4,
            elite_count: 4,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EvolutionConfigError::TooManyElites { .. })
        ));
    }

    #[test]
    fn test_invalid_shares() {
        let mut config = EvolutionConfig::default();
        config.reproduction.crossover_share = 0.8;
        config.reproduction.clone_share = 0.5;
        assert!(matches!(
            config.validate(),
            Err(EvolutionConfigError::InvalidShares(_))
        ));
    }

    #[test]
    fn test_base_config_error_propagates() {
        let config = EngineConfig {
            network: NetworkConfig::with_layers(vec![3]),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EvolutionConfigError::BaseConfigError(_))
        ));
    }

    #[test]
    fn test_recent_best_mean() {
        let history = EvolutionHistory {
            best_fitness: vec![1.0, 2.0, 3.0, 5.0],
            ..Default::default()
        };
        assert_eq!(history.recent_best_mean(2), Some(4.0));
        assert_eq!(history.recent_best_mean(5), None);
        assert_eq!(history.recent_best_mean(0), None);
    }
}
