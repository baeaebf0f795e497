//! Fitness telemetry from the environment and its sanity checks.
//!
//! Fitness comes from an external simulation and can be poisoned by bugs
//! there: non-finite values, absurd magnitudes, a known sentinel constant
//! leaking across agents, or the same number reported for everyone.

use serde::{Deserialize, Serialize};

use crate::schema::FitnessGuardConfig;

/// Outcome of one agent's evaluation, produced once per generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    /// Index of the genome driving the agent.
    pub genome_index: usize,
    /// Fitness accumulated during the generation.
    pub fitness: f32,
    /// Whether the agent reached its goal.
    pub succeeded: bool,
    /// Simulated seconds the agent was active.
    pub lifetime: f32,
}

/// Classification of a single fitness value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitnessVerdict {
    Valid,
    /// `NaN` or infinite.
    NonFinite,
    /// Matches a configured poisoned sentinel.
    Sentinel,
    /// Magnitude above the configured limit.
    Absurd,
}

impl FitnessVerdict {
    #[inline]
    pub fn is_corrupt(self) -> bool {
        self != FitnessVerdict::Valid
    }
}

/// Classify a fitness value against the guard configuration.
pub fn classify_fitness(value: f32, config: &FitnessGuardConfig) -> FitnessVerdict {
    if !value.is_finite() {
        return FitnessVerdict::NonFinite;
    }
    if config
        .sentinels
        .iter()
        .any(|s| (value - s).abs() <= config.sentinel_tolerance)
    {
        return FitnessVerdict::Sentinel;
    }
    if value.abs() > config.absurd_limit {
        return FitnessVerdict::Absurd;
    }
    FitnessVerdict::Valid
}

/// Whether every record reports the same non-zero fitness.
///
/// An all-zero batch is legitimate (nothing moved); an identical non-zero
/// value across the whole batch points at a shared upstream bug.
pub fn is_uniform_batch(records: &[EvaluationRecord], tolerance: f32) -> bool {
    if records.len() < 2 {
        return false;
    }
    let first = records[0].fitness;
    if !first.is_finite() || first == 0.0 {
        return false;
    }
    records
        .iter()
        .all(|r| r.fitness.is_finite() && (r.fitness - first).abs() <= tolerance)
}

/// Aggregate statistics over a batch of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    pub agents: usize,
    pub successes: usize,
    pub mean_fitness: f32,
    pub mean_lifetime: f32,
}

impl BatchStats {
    pub fn from_records(records: &[EvaluationRecord]) -> Self {
        if records.is_empty() {
            return Self::default();
        }
        let n = records.len() as f32;
        let finite = |v: f32| if v.is_finite() { v } else { 0.0 };
        Self {
            agents: records.len(),
            successes: records.iter().filter(|r| r.succeeded).count(),
            mean_fitness: records.iter().map(|r| finite(r.fitness)).sum::<f32>() / n,
            mean_lifetime: records.iter().map(|r| finite(r.lifetime)).sum::<f32>() / n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(genome_index: usize, fitness: f32) -> EvaluationRecord {
        EvaluationRecord {
            genome_index,
            fitness,
            succeeded: false,
            lifetime: 1.0,
        }
    }

    #[test]
    fn test_classify_fitness() {
        let config = FitnessGuardConfig {
            sentinels: vec![4242.42],
            ..Default::default()
        };
        assert_eq!(classify_fitness(3.5, &config), FitnessVerdict::Valid);
        assert_eq!(classify_fitness(-3.5, &config), FitnessVerdict::Valid);
        assert_eq!(classify_fitness(f32::NAN, &config), FitnessVerdict::NonFinite);
        assert_eq!(
            classify_fitness(f32::NEG_INFINITY, &config),
            FitnessVerdict::NonFinite
        );
        assert_eq!(classify_fitness(4242.4204, &config), FitnessVerdict::Sentinel);
        assert_eq!(classify_fitness(5e7, &config), FitnessVerdict::Absurd);
        assert!(!FitnessVerdict::Valid.is_corrupt());
        assert!(FitnessVerdict::Absurd.is_corrupt());
    }

    #[test]
    fn test_uniform_batch() {
        let uniform: Vec<_> = (0..5).map(|i| record(i, 7.25)).collect();
        assert!(is_uniform_batch(&uniform, 1e-6));

        let zeros: Vec<_> = (0..5).map(|i| record(i, 0.0)).collect();
        assert!(!is_uniform_batch(&zeros, 1e-6));

        let mut varied = uniform.clone();
        varied[3].fitness = 7.5;
        assert!(!is_uniform_batch(&varied, 1e-6));

        assert!(!is_uniform_batch(&uniform[..1], 1e-6));
    }

    #[test]
    fn test_batch_stats() {
        let records = vec![
            EvaluationRecord {
                genome_index: 0,
                fitness: 2.0,
                succeeded: true,
                lifetime: 4.0,
            },
            EvaluationRecord {
                genome_index: 1,
                fitness: f32::NAN,
                succeeded: false,
                lifetime: 2.0,
            },
        ];
        let stats = BatchStats::from_records(&records);
        assert_eq!(stats.agents, 2);
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.mean_fitness, 1.0);
        assert_eq!(stats.mean_lifetime, 3.0);
        assert_eq!(BatchStats::from_records(&[]), BatchStats::default());
    }
}
