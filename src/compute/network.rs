//! Fixed-shape feedforward network genome and its forward pass.
//!
//! A genome is a stack of dense transitions. Transition `t` maps
//! `layer_sizes[t]` inputs to `layer_sizes[t + 1]` outputs with a row-major
//! weight matrix (one row per output neuron) and a bias vector.
//!
//! The forward pass never fails: mis-sized inputs are adapted, non-finite
//! values are zeroed, pre-activations are clamped, and any internal shape
//! fault yields a zero vector of the declared output size.

use std::borrow::Cow;

use crate::schema::Activation;

use super::anomaly::{self, AnomalyKind};

/// Inputs are clamped to ±this before the first layer.
pub const INPUT_CLAMP: f32 = 10.0;

/// Pre-activation sums are clamped to ±this.
pub const PREACTIVATION_CLAMP: f32 = 20.0;

/// Upper bound on weights plus biases in one genome.
pub const MAX_GENES: usize = 1 << 24;

/// Structural errors in genome construction or combination.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenomeError {
    #[error("Network needs at least 2 layers, got {0}")]
    TooFewLayers(usize),
    #[error("Layer {0} has size zero")]
    EmptyLayer(usize),
    #[error("Expected {expected} transitions, found {found}")]
    TransitionCount { expected: usize, found: usize },
    #[error("Transition {transition}: expected {expected} weights, found {found}")]
    WeightShape {
        transition: usize,
        expected: usize,
        found: usize,
    },
    #[error("Transition {transition}: expected {expected} biases, found {found}")]
    BiasShape {
        transition: usize,
        expected: usize,
        found: usize,
    },
    #[error("Layer shapes differ: {left:?} vs {right:?}")]
    ShapeMismatch {
        left: Vec<usize>,
        right: Vec<usize>,
    },
    #[error("Network too large: gene count exceeds the limit at transition {transition}")]
    TooLarge { transition: usize },
}

/// Validate a layer size sequence.
pub fn validate_layer_sizes(layer_sizes: &[usize]) -> Result<(), GenomeError> {
    if layer_sizes.len() < 2 {
        return Err(GenomeError::TooFewLayers(layer_sizes.len()));
    }
    if let Some(index) = layer_sizes.iter().position(|&s| s == 0) {
        return Err(GenomeError::EmptyLayer(index));
    }
    layer_gene_count(layer_sizes)?;
    Ok(())
}

/// Weights plus biases for a layer size sequence, without allocating.
///
/// Fails with [`GenomeError::TooLarge`] on overflow or past [`MAX_GENES`].
pub fn layer_gene_count(layer_sizes: &[usize]) -> Result<usize, GenomeError> {
    let mut total = 0usize;
    for (transition, pair) in layer_sizes.windows(2).enumerate() {
        total = pair[0]
            .checked_mul(pair[1])
            .and_then(|weights| weights.checked_add(pair[1]))
            .and_then(|genes| genes.checked_add(total))
            .filter(|&genes| genes <= MAX_GENES)
            .ok_or(GenomeError::TooLarge { transition })?;
    }
    Ok(total)
}

/// One dense transition between consecutive layers.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    inputs: usize,
    outputs: usize,
    /// Row-major `[outputs][inputs]`.
    weights: Vec<f32>,
    biases: Vec<f32>,
}

impl Layer {
    /// All-zero transition.
    pub fn zeros(inputs: usize, outputs: usize) -> Self {
        Self {
            inputs,
            outputs,
            weights: vec![0.0; inputs * outputs],
            biases: vec![0.0; outputs],
        }
    }

    #[inline]
    pub fn inputs(&self) -> usize {
        self.inputs
    }

    #[inline]
    pub fn outputs(&self) -> usize {
        self.outputs
    }

    #[inline]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    #[inline]
    pub fn weights_mut(&mut self) -> &mut [f32] {
        &mut self.weights
    }

    #[inline]
    pub fn biases(&self) -> &[f32] {
        &self.biases
    }

    #[inline]
    pub fn biases_mut(&mut self) -> &mut [f32] {
        &mut self.biases
    }

    /// Incoming weights of output neuron `neuron`.
    #[inline]
    pub fn row(&self, neuron: usize) -> &[f32] {
        &self.weights[neuron * self.inputs..(neuron + 1) * self.inputs]
    }

    #[inline]
    pub fn row_mut(&mut self, neuron: usize) -> &mut [f32] {
        &mut self.weights[neuron * self.inputs..(neuron + 1) * self.inputs]
    }

    fn is_consistent(&self) -> bool {
        self.weights.len() == self.inputs * self.outputs && self.biases.len() == self.outputs
    }
}

/// Network parameters plus the fitness they earned this generation.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkGenome {
    layer_sizes: Vec<usize>,
    layers: Vec<Layer>,
    activation: Activation,
    /// Accumulated by the evaluation side only; reset every generation.
    pub fitness: f32,
}

impl NetworkGenome {
    /// All-zero genome of the given shape.
    pub fn zeros(layer_sizes: &[usize], activation: Activation) -> Result<Self, GenomeError> {
        validate_layer_sizes(layer_sizes)?;
        let layers = layer_sizes
            .windows(2)
            .map(|pair| Layer::zeros(pair[0], pair[1]))
            .collect();
        Ok(Self {
            layer_sizes: layer_sizes.to_vec(),
            layers,
            activation,
            fitness: 0.0,
        })
    }

    /// Smallest valid genome: one all-zero transition. Zero sizes become 1,
    /// and a pair too large to allocate becomes `1 -> 1`.
    pub fn minimal(inputs: usize, outputs: usize, activation: Activation) -> Self {
        let (inputs, outputs) = match (inputs.max(1), outputs.max(1)) {
            (i, o) if layer_gene_count(&[i, o]).is_ok() => (i, o),
            _ => (1, 1),
        };
        Self {
            layer_sizes: vec![inputs, outputs],
            layers: vec![Layer::zeros(inputs, outputs)],
            activation,
            fitness: 0.0,
        }
    }

    /// Build from flattened per-transition parameters, validating every shape.
    ///
    /// `weights[t]` is row-major `[layer_sizes[t + 1]][layer_sizes[t]]`.
    pub fn from_parts(
        layer_sizes: Vec<usize>,
        weights: Vec<Vec<f32>>,
        biases: Vec<Vec<f32>>,
        activation: Activation,
    ) -> Result<Self, GenomeError> {
        validate_layer_sizes(&layer_sizes)?;
        let transitions = layer_sizes.len() - 1;
        if weights.len() != transitions {
            return Err(GenomeError::TransitionCount {
                expected: transitions,
                found: weights.len(),
            });
        }
        if biases.len() != transitions {
            return Err(GenomeError::TransitionCount {
                expected: transitions,
                found: biases.len(),
            });
        }

        let mut layers = Vec::with_capacity(transitions);
        for (t, (w, b)) in weights.into_iter().zip(biases).enumerate() {
            let inputs = layer_sizes[t];
            let outputs = layer_sizes[t + 1];
            if w.len() != inputs * outputs {
                return Err(GenomeError::WeightShape {
                    transition: t,
                    expected: inputs * outputs,
                    found: w.len(),
                });
            }
            if b.len() != outputs {
                return Err(GenomeError::BiasShape {
                    transition: t,
                    expected: outputs,
                    found: b.len(),
                });
            }
            layers.push(Layer {
                inputs,
                outputs,
                weights: w,
                biases: b,
            });
        }

        Ok(Self {
            layer_sizes,
            layers,
            activation,
            fitness: 0.0,
        })
    }

    #[inline]
    pub fn layer_sizes(&self) -> &[usize] {
        &self.layer_sizes
    }

    #[inline]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    #[inline]
    pub fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    #[inline]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// Change the hidden nonlinearity. Parameters are untouched.
    pub fn set_activation(&mut self, activation: Activation) {
        self.activation = activation;
    }

    #[inline]
    pub fn input_size(&self) -> usize {
        self.layer_sizes[0]
    }

    #[inline]
    pub fn output_size(&self) -> usize {
        self.layer_sizes[self.layer_sizes.len() - 1]
    }

    /// Total number of weights and biases.
    pub fn gene_count(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.weights.len() + l.biases.len())
            .sum()
    }

    /// All genes in a fixed order: per transition, weights then biases.
    pub fn genes(&self) -> impl Iterator<Item = f32> + '_ {
        self.layers
            .iter()
            .flat_map(|l| l.weights.iter().chain(l.biases.iter()).copied())
    }

    /// Mutable view of all genes in the same order as [`genes`](Self::genes).
    pub fn genes_mut(&mut self) -> impl Iterator<Item = &mut f32> + '_ {
        self.layers
            .iter_mut()
            .flat_map(|l| l.weights.iter_mut().chain(l.biases.iter_mut()))
    }

    /// Whether two genomes can be combined gene by gene.
    pub fn same_shape(&self, other: &NetworkGenome) -> bool {
        self.layer_sizes == other.layer_sizes
    }

    /// Deep copy with fitness reset to 0.
    pub fn fresh_clone(&self) -> Self {
        Self {
            fitness: 0.0,
            ..self.clone()
        }
    }

    /// Replace every non-finite gene with 0. Returns how many were replaced.
    pub fn sanitize_genes(&mut self) -> usize {
        let mut replaced = 0;
        for gene in self.genes_mut() {
            if !gene.is_finite() {
                *gene = 0.0;
                replaced += 1;
            }
        }
        replaced
    }

    /// New genome with a different input layer size.
    ///
    /// First-layer columns are copied where they overlap; new columns are
    /// zero. Everything else is copied unchanged. Logs a warning because
    /// this changes what the network sees.
    pub fn resize_inputs(&self, new_inputs: usize) -> Result<Self, GenomeError> {
        let mut layer_sizes = self.layer_sizes.clone();
        layer_sizes[0] = new_inputs;
        let mut resized = Self::zeros(&layer_sizes, self.activation)?;

        let old_first = &self.layers[0];
        let overlap = old_first.inputs.min(new_inputs);
        {
            let new_first = &mut resized.layers[0];
            for neuron in 0..old_first.outputs {
                new_first.row_mut(neuron)[..overlap]
                    .copy_from_slice(&old_first.row(neuron)[..overlap]);
            }
            new_first.biases.copy_from_slice(&old_first.biases);
        }
        for (dst, src) in resized.layers.iter_mut().zip(&self.layers).skip(1) {
            dst.clone_from(src);
        }
        resized.fitness = self.fitness;

        log::warn!(
            "Resized network input layer from {} to {} (columns kept: {})",
            self.input_size(),
            new_inputs,
            overlap
        );
        Ok(resized)
    }

    /// Evaluate the network. Never fails; see the module docs.
    pub fn forward(&self, inputs: &[f32]) -> Vec<f32> {
        match self.try_forward(inputs) {
            Ok(outputs) => outputs,
            Err(e) => {
                anomaly::report(AnomalyKind::ForwardFailure, &e);
                vec![0.0; self.output_size()]
            }
        }
    }

    /// Evaluate the network, reporting internal shape faults as errors.
    pub fn try_forward(&self, inputs: &[f32]) -> Result<Vec<f32>, GenomeError> {
        if let Some(t) = self.layers.iter().position(|l| !l.is_consistent()) {
            let layer = &self.layers[t];
            return Err(GenomeError::WeightShape {
                transition: t,
                expected: layer.inputs * layer.outputs,
                found: layer.weights.len(),
            });
        }

        let adapted = adapt_inputs(inputs, self.input_size());
        let mut current: Vec<f32> = adapted.iter().map(|&x| sanitize_input(x)).collect();

        let last = self.layers.len() - 1;
        for (t, layer) in self.layers.iter().enumerate() {
            if current.len() != layer.inputs {
                return Err(GenomeError::WeightShape {
                    transition: t,
                    expected: layer.inputs,
                    found: current.len(),
                });
            }
            let mut next = Vec::with_capacity(layer.outputs);
            for neuron in 0..layer.outputs {
                let sum = neuron_sum(layer.biases[neuron], layer.row(neuron), &current);
                let value = if t == last {
                    sum.clamp(-1.0, 1.0)
                } else {
                    self.activation.apply(sum)
                };
                next.push(value);
            }
            current = next;
        }

        for value in current.iter_mut() {
            if !value.is_finite() {
                anomaly::report(AnomalyKind::NonFiniteOutput, *value);
                *value = 0.0;
            }
        }
        Ok(current)
    }
}

/// Adapt an observation to `len` entries: truncate or zero-pad.
///
/// This is the only place vector lengths are reconciled.
pub fn adapt_inputs(inputs: &[f32], len: usize) -> Cow<'_, [f32]> {
    if inputs.len() == len {
        return Cow::Borrowed(inputs);
    }
    anomaly::report(
        AnomalyKind::InputShape,
        format_args!("got {} inputs, network expects {}", inputs.len(), len),
    );
    let mut adapted = vec![0.0; len];
    let overlap = inputs.len().min(len);
    adapted[..overlap].copy_from_slice(&inputs[..overlap]);
    Cow::Owned(adapted)
}

#[inline]
fn sanitize_input(x: f32) -> f32 {
    if x.is_finite() {
        x.clamp(-INPUT_CLAMP, INPUT_CLAMP)
    } else {
        anomaly::report(AnomalyKind::NonFiniteInput, x);
        0.0
    }
}

/// Bias plus weighted inputs, skipping non-finite terms, clamped.
#[inline]
fn neuron_sum(bias: f32, row: &[f32], inputs: &[f32]) -> f32 {
    let mut sum = if bias.is_finite() {
        bias
    } else {
        anomaly::report(AnomalyKind::NonFiniteTerm, "bias");
        0.0
    };
    for (&w, &x) in row.iter().zip(inputs) {
        let term = w * x;
        if term.is_finite() {
            sum += term;
        } else {
            anomaly::report(AnomalyKind::NonFiniteTerm, "weight product");
        }
    }
    if sum.is_nan() {
        0.0
    } else {
        sum.clamp(-PREACTIVATION_CLAMP, PREACTIVATION_CLAMP)
    }
}
