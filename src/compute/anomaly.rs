//! Rate-limited reporting of recovered numeric and structural anomalies.
//!
//! Anomalies are fixed at the point of detection (clamp, zero, fallback) and
//! only reported here. Each kind is logged on its first occurrence and then at
//! power-of-two counts, so a persistent upstream fault shows up in the log
//! without burying everything else.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Category of a recovered anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyKind {
    /// Observation length differs from the network input layer.
    InputShape,
    /// `NaN` or infinite network input.
    NonFiniteInput,
    /// `NaN` or infinite weight, bias or product inside the forward pass.
    NonFiniteTerm,
    /// `NaN` or infinite network output.
    NonFiniteOutput,
    /// Forward pass failed and returned zeros.
    ForwardFailure,
    /// Operation on genomes with incompatible shapes.
    StructuralMismatch,
    /// `NaN` or infinite gene found in a loaded or mutated genome.
    NonFiniteGene,
    /// Fitness value classified as corrupt.
    CorruptFitness,
}

impl AnomalyKind {
    const ALL: [AnomalyKind; 8] = [
        AnomalyKind::InputShape,
        AnomalyKind::NonFiniteInput,
        AnomalyKind::NonFiniteTerm,
        AnomalyKind::NonFiniteOutput,
        AnomalyKind::ForwardFailure,
        AnomalyKind::StructuralMismatch,
        AnomalyKind::NonFiniteGene,
        AnomalyKind::CorruptFitness,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnomalyKind::InputShape => "input shape mismatch",
            AnomalyKind::NonFiniteInput => "non-finite network input",
            AnomalyKind::NonFiniteTerm => "non-finite forward-pass term",
            AnomalyKind::NonFiniteOutput => "non-finite network output",
            AnomalyKind::ForwardFailure => "forward pass failure",
            AnomalyKind::StructuralMismatch => "structural mismatch",
            AnomalyKind::NonFiniteGene => "non-finite gene",
            AnomalyKind::CorruptFitness => "corrupt fitness",
        };
        f.write_str(name)
    }
}

static COUNTS: [AtomicU64; AnomalyKind::ALL.len()] =
    [const { AtomicU64::new(0) }; AnomalyKind::ALL.len()];

/// Record one occurrence of `kind`.
///
/// `detail` is only formatted when the occurrence is actually logged.
pub fn report<D: fmt::Display>(kind: AnomalyKind, detail: D) {
    let seen = COUNTS[kind.index()].fetch_add(1, Ordering::Relaxed) + 1;
    if seen.is_power_of_two() {
        log::warn!("{kind} (occurrence {seen}): {detail}");
    }
}

/// Total occurrences of `kind` since process start.
pub fn count(kind: AnomalyKind) -> u64 {
    COUNTS[kind.index()].load(Ordering::Relaxed)
}

/// Occurrence totals for every kind, for summaries.
pub fn totals() -> Vec<(AnomalyKind, u64)> {
    AnomalyKind::ALL.iter().map(|&k| (k, count(k))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts() {
        let before = count(AnomalyKind::ForwardFailure);
        report(AnomalyKind::ForwardFailure, "test");
        report(AnomalyKind::ForwardFailure, "test");
        // Other tests may report concurrently; counts only grow.
        assert!(count(AnomalyKind::ForwardFailure) >= before + 2);
    }

    #[test]
    fn test_totals_cover_every_kind() {
        let totals = totals();
        assert_eq!(totals.len(), AnomalyKind::ALL.len());
        for (i, (kind, _)) in totals.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }
}
