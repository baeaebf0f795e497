//! Configuration types for networks, evaluation and checkpointing.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Nonlinearity applied to hidden layers.
///
/// Both variants operate on a pre-activation already clamped to ±20, so the
/// hidden outputs stay bounded either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// Hyperbolic tangent, saturating in [-1, 1].
    #[default]
    Tanh,
    /// Smooth gated-linear unit: `x * sigmoid(x)`.
    Swish,
}

impl Activation {
    #[inline]
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Activation::Tanh => x.tanh(),
            Activation::Swish => x / (1.0 + (-x).exp()),
        }
    }
}

fn default_layer_sizes() -> Vec<usize> {
    vec![8, 16, 4]
}

fn default_init_scale() -> f32 {
    1.0
}

/// Network shape and initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Layer sizes: input, hidden..., output.
    #[serde(default = "default_layer_sizes")]
    pub layer_sizes: Vec<usize>,
    /// Hidden layer nonlinearity.
    #[serde(default)]
    pub activation: Activation,
    /// Initial weights are uniform in ±`init_scale / sqrt(fan_in)`.
    #[serde(default = "default_init_scale")]
    pub init_scale: f32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            layer_sizes: default_layer_sizes(),
            activation: Activation::default(),
            init_scale: default_init_scale(),
        }
    }
}

impl NetworkConfig {
    /// Create a config with the given shape and default initialization.
    pub fn with_layers(layer_sizes: Vec<usize>) -> Self {
        Self {
            layer_sizes,
            ..Default::default()
        }
    }

    /// Number of network inputs.
    #[inline]
    pub fn input_size(&self) -> usize {
        self.layer_sizes.first().copied().unwrap_or(0)
    }

    /// Number of network outputs.
    #[inline]
    pub fn output_size(&self) -> usize {
        self.layer_sizes.last().copied().unwrap_or(0)
    }

    /// Validate network parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.layer_sizes.len() < 2 {
            return Err(ConfigError::TooFewLayers(self.layer_sizes.len()));
        }
        if let Some(index) = self.layer_sizes.iter().position(|&s| s == 0) {
            return Err(ConfigError::EmptyLayer(index));
        }
        if crate::compute::layer_gene_count(&self.layer_sizes).is_err() {
            return Err(ConfigError::NetworkTooLarge(self.layer_sizes.clone()));
        }
        if !(self.init_scale.is_finite() && self.init_scale > 0.0) {
            return Err(ConfigError::InvalidInitScale(self.init_scale));
        }
        Ok(())
    }
}

fn default_generation_time() -> f32 {
    20.0
}
fn default_time_step() -> f32 {
    1.0 / 50.0
}
fn default_warmup_time() -> f32 {
    2.0
}
fn default_failure_fraction() -> f32 {
    0.8
}
fn default_success_fraction() -> f32 {
    0.5
}
fn default_time_scale() -> f32 {
    1.0
}
fn default_max_time_scale() -> f32 {
    20.0
}

/// Evaluation phase timing and early-termination thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Simulated seconds per generation.
    #[serde(default = "default_generation_time")]
    pub generation_time: f32,
    /// Simulated seconds per tick before time scaling.
    #[serde(default = "default_time_step")]
    pub time_step: f32,
    /// Early termination is not considered before this much simulated time.
    #[serde(default = "default_warmup_time")]
    pub warmup_time: f32,
    /// End early when more than this fraction of agents has failed.
    #[serde(default = "default_failure_fraction")]
    pub failure_fraction: f32,
    /// End early when more than this fraction of agents has succeeded.
    #[serde(default = "default_success_fraction")]
    pub success_fraction: f32,
    /// Initial time-acceleration factor.
    #[serde(default = "default_time_scale")]
    pub time_scale: f32,
    /// Upper bound for runtime time-scale adjustments.
    #[serde(default = "default_max_time_scale")]
    pub max_time_scale: f32,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            generation_time: default_generation_time(),
            time_step: default_time_step(),
            warmup_time: default_warmup_time(),
            failure_fraction: default_failure_fraction(),
            success_fraction: default_success_fraction(),
            time_scale: default_time_scale(),
            max_time_scale: default_max_time_scale(),
        }
    }
}

impl EvaluationConfig {
    /// Validate evaluation parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.generation_time.is_finite() && self.generation_time > 0.0) {
            return Err(ConfigError::InvalidDuration("generation_time"));
        }
        if !(self.time_step.is_finite() && self.time_step > 0.0) {
            return Err(ConfigError::InvalidDuration("time_step"));
        }
        if !(self.warmup_time.is_finite() && self.warmup_time >= 0.0) {
            return Err(ConfigError::InvalidDuration("warmup_time"));
        }
        for (name, value) in [
            ("failure_fraction", self.failure_fraction),
            ("success_fraction", self.success_fraction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidFraction { name, value });
            }
        }
        if !(self.max_time_scale.is_finite() && self.max_time_scale > 0.0) {
            return Err(ConfigError::InvalidTimeScale(self.max_time_scale));
        }
        if !(self.time_scale > 0.0 && self.time_scale <= self.max_time_scale) {
            return Err(ConfigError::InvalidTimeScale(self.time_scale));
        }
        Ok(())
    }
}

/// Which checkpoint to pick when several match the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LoadStrategy {
    /// Most recently modified file.
    #[default]
    MostRecent,
    /// Highest fitness encoded in the filename.
    HighestFitness,
}

fn default_tag() -> String {
    "best".to_string()
}
fn default_checkpoint_interval() -> usize {
    10
}

/// Best-genome checkpointing and population snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Output directory. `None` disables persistence.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Filename tag for best-genome checkpoints.
    #[serde(default = "default_tag")]
    pub tag: String,
    /// Save the best genome every this many generations (0 disables the
    /// periodic save; improvements are still saved).
    #[serde(default = "default_checkpoint_interval")]
    pub interval: usize,
    /// Write the whole population every this many generations (0 disables).
    #[serde(default)]
    pub snapshot_interval: usize,
    /// Seed the initial population from an existing checkpoint.
    #[serde(default)]
    pub resume: bool,
    /// Checkpoint selection when resuming.
    #[serde(default)]
    pub load_strategy: LoadStrategy,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            directory: None,
            tag: default_tag(),
            interval: default_checkpoint_interval(),
            snapshot_interval: 0,
            resume: false,
            load_strategy: LoadStrategy::default(),
        }
    }
}

impl CheckpointConfig {
    /// Validate checkpoint parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let tag_ok = !self.tag.is_empty()
            && self
                .tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !tag_ok {
            return Err(ConfigError::InvalidTag(self.tag.clone()));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Network needs at least 2 layers, got {0}")]
    TooFewLayers(usize),
    #[error("Layer {0} has size zero")]
    EmptyLayer(usize),
    #[error("Network {0:?} has too many genes")]
    NetworkTooLarge(Vec<usize>),
    #[error("Initial weight scale must be positive and finite, got {0}")]
    InvalidInitScale(f32),
    #[error("Duration {0} must be positive and finite")]
    InvalidDuration(&'static str),
    #[error("Fraction {name} must lie in [0, 1], got {value}")]
    InvalidFraction { name: &'static str, value: f32 },
    #[error("Invalid time scale: {0}")]
    InvalidTimeScale(f32),
    #[error("Checkpoint tag must be non-empty ASCII alphanumeric, '-' or '_': {0:?}")]
    InvalidTag(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configs_valid() {
        assert!(NetworkConfig::default().validate().is_ok());
        assert!(EvaluationConfig::default().validate().is_ok());
        assert!(CheckpointConfig::default().validate().is_ok());
    }

    #[test]
    fn test_network_validation() {
        let config = NetworkConfig::with_layers(vec![4]);
        assert!(matches!(config.validate(), Err(ConfigError::TooFewLayers(1))));

        let config = NetworkConfig::with_layers(vec![4, 0, 2]);
        assert!(matches!(config.validate(), Err(ConfigError::EmptyLayer(1))));

        let config = NetworkConfig::with_layers(vec![usize::MAX, 2]);
        assert!(matches!(config.validate(), Err(ConfigError::NetworkTooLarge(_))));
    }

    #[test]
    fn test_tag_validation() {
        let config = CheckpointConfig {
            tag: "bad/tag".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_activation_bounded_on_clamped_range() {
        for x in [-20.0f32, -1.0, 0.0, 1.0, 20.0] {
            assert!(Activation::Tanh.apply(x).abs() <= 1.0);
            let s = Activation::Swish.apply(x);
            assert!(s.is_finite() && s <= 20.0 && s >= -0.3);
        }
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: NetworkConfig = serde_json::from_str(r#"{"layer_sizes": [3, 2]}"#).unwrap();
        assert_eq!(config.layer_sizes, vec![3, 2]);
        assert_eq!(config.activation, Activation::Tanh);
    }
}
