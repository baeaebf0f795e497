//! Textual genome format.
//!
//! ```text
//! {
//!   "layers":  [L0, L1, ..., Ln],
//!   "fitness": f,
//!   "weights": [ [ [w, ...], ... ], ... ],   // per transition, per neuron, per input
//!   "biases":  [ [b, ...], ... ]             // per transition, per neuron
//! }
//! ```
//!
//! Decoding validates the layer list and every array shape. Values that do
//! not fit a finite `f32` are replaced by 0 with a warning.

use serde::{Deserialize, Serialize};

use crate::compute::anomaly::{self, AnomalyKind};
use crate::compute::network::{GenomeError, NetworkGenome};
use crate::schema::{Activation, NetworkConfig};

use super::genome::GenomeRng;

/// Serialized form of a genome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenomeRecord {
    pub layers: Vec<usize>,
    #[serde(default)]
    pub fitness: f32,
    pub weights: Vec<Vec<Vec<f32>>>,
    pub biases: Vec<Vec<f32>>,
}

/// Genome encoding and decoding errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Malformed genome JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid genome structure: {0}")]
    Genome(#[from] GenomeError),
}

impl GenomeRecord {
    /// Capture a genome. Non-finite values are written as 0 since JSON
    /// cannot carry them.
    pub fn from_genome(genome: &NetworkGenome) -> Self {
        let finite = |v: f32| if v.is_finite() { v } else { 0.0 };
        let weights = genome
            .layers()
            .iter()
            .map(|layer| {
                (0..layer.outputs())
                    .map(|n| layer.row(n).iter().map(|&w| finite(w)).collect())
                    .collect()
            })
            .collect();
        let biases = genome
            .layers()
            .iter()
            .map(|layer| layer.biases().iter().map(|&b| finite(b)).collect())
            .collect();
        Self {
            layers: genome.layer_sizes().to_vec(),
            fitness: finite(genome.fitness),
            weights,
            biases,
        }
    }

    /// Rebuild a genome, validating every shape.
    pub fn into_genome(self, activation: Activation) -> Result<NetworkGenome, GenomeError> {
        crate::compute::network::validate_layer_sizes(&self.layers)?;
        let transitions = self.layers.len() - 1;
        if self.weights.len() != transitions {
            return Err(GenomeError::TransitionCount {
                expected: transitions,
                found: self.weights.len(),
            });
        }

        let mut flat_weights = Vec::with_capacity(transitions);
        for (t, rows) in self.weights.into_iter().enumerate() {
            let inputs = self.layers[t];
            let outputs = self.layers[t + 1];
            if rows.len() != outputs || rows.iter().any(|row| row.len() != inputs) {
                return Err(GenomeError::WeightShape {
                    transition: t,
                    expected: inputs * outputs,
                    found: rows.iter().map(Vec::len).sum(),
                });
            }
            flat_weights.push(rows.into_iter().flatten().collect());
        }

        let mut genome =
            NetworkGenome::from_parts(self.layers, flat_weights, self.biases, activation)?;
        let replaced = genome.sanitize_genes();
        if replaced > 0 {
            anomaly::report(
                AnomalyKind::NonFiniteGene,
                format_args!("{replaced} non-finite genes replaced on load"),
            );
        }
        genome.fitness = if self.fitness.is_finite() {
            self.fitness
        } else {
            0.0
        };
        Ok(genome)
    }
}

/// Encode a genome as pretty-printed JSON.
pub fn encode(genome: &NetworkGenome) -> Result<String, CodecError> {
    Ok(serde_json::to_string_pretty(&GenomeRecord::from_genome(genome))?)
}

/// Encode several genomes as a JSON array.
pub fn encode_population(genomes: &[NetworkGenome]) -> Result<String, CodecError> {
    let records: Vec<GenomeRecord> = genomes.iter().map(GenomeRecord::from_genome).collect();
    Ok(serde_json::to_string_pretty(&records)?)
}

/// Decode a genome, failing on any structural problem.
pub fn decode(text: &str, activation: Activation) -> Result<NetworkGenome, CodecError> {
    let record: GenomeRecord = serde_json::from_str(text)?;
    Ok(record.into_genome(activation)?)
}

/// Decode a JSON array of genomes.
pub fn decode_population(
    text: &str,
    activation: Activation,
) -> Result<Vec<NetworkGenome>, CodecError> {
    let records: Vec<GenomeRecord> = serde_json::from_str(text)?;
    records
        .into_iter()
        .map(|r| r.into_genome(activation).map_err(CodecError::from))
        .collect()
}

/// Decode a genome for use with `network`, never failing.
///
/// A malformed document or one whose hidden or output layers do not match
/// the configuration yields a fresh random genome. A differing input layer
/// is adapted with [`NetworkGenome::resize_inputs`].
pub fn decode_or_random(text: &str, network: &NetworkConfig, rng: &mut GenomeRng) -> NetworkGenome {
    match decode(text, network.activation).and_then(|g| conform(g, network).map_err(Into::into)) {
        Ok(genome) => genome,
        Err(e) => {
            log::warn!("Discarding stored genome, using a random one: {e}");
            random_or_minimal(network, rng)
        }
    }
}

/// Adapt a decoded genome to the configured shape.
///
/// Only the input layer may differ; every later layer must match exactly.
pub fn conform(genome: NetworkGenome, network: &NetworkConfig) -> Result<NetworkGenome, GenomeError> {
    if genome.layer_sizes().get(1..) != network.layer_sizes.get(1..) {
        return Err(GenomeError::ShapeMismatch {
            left: genome.layer_sizes().to_vec(),
            right: network.layer_sizes.clone(),
        });
    }
    if genome.input_size() != network.input_size() {
        return genome.resize_inputs(network.input_size());
    }
    Ok(genome)
}

/// A random genome of the configured shape, or a single-weight network if
/// the configuration itself is unusable.
pub(crate) fn random_or_minimal(network: &NetworkConfig, rng: &mut GenomeRng) -> NetworkGenome {
    match rng.random_genome(network) {
        Ok(genome) => genome,
        Err(e) => {
            log::warn!("Network configuration unusable ({e}); falling back to a 1x1 network");
            NetworkGenome::minimal(network.input_size(), network.output_size(), network.activation)
        }
    }
}
