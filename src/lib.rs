//! Neuroevolution engine - Evolving neural network controllers for simulated agents.
//!
//! A population of fixed-topology feed-forward networks drives one agent
//! each in an external simulation. After every generation the population
//! is ranked by fitness and rebuilt with elitism, tournament selection,
//! crossover and mutation. The best genomes are checkpointed to disk.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: Configuration types and per-generation bookkeeping
//! - `compute`: Forward pass, genetic operators, population management and
//!   the generation orchestrator
//!
//! # Example
//!
//! ```rust,no_run
//! use neuroevo::{
//!     compute::{ReachTargetConfig, ReachTargetEnvironment, evolution::GenerationOrchestrator},
//!     schema::{EngineConfig, NetworkConfig},
//! };
//!
//! let mut config = EngineConfig::default();
//! config.network = NetworkConfig::with_layers(vec![4, 16, 2]);
//! config.checkpoint.directory = Some("checkpoints".into());
//!
//! let environment = ReachTargetEnvironment::new(ReachTargetConfig::default(), Some(7));
//! let mut orchestrator = GenerationOrchestrator::new(config, environment).unwrap();
//! let summary = orchestrator.run(100);
//!
//! println!("Best fitness after {} generations: {:?}", summary.generations, summary.best_fitness);
//! ```

pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use compute::evolution::{GenerationOrchestrator, PopulationManager};
pub use compute::{Environment, NetworkGenome, Observation};
pub use schema::{EngineConfig, NetworkConfig};
