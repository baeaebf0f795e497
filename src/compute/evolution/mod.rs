//! Evolutionary search over neural network controllers.
//!
//! # Overview
//!
//! - **Genome Operations** (`genome`): random generation, mutation, crossover,
//!   tournament selection and diversity estimates
//! - **Codec** (`codec`): the JSON genome format with shape validation
//! - **Fitness** (`fitness`): evaluation records and fitness sanity checks
//! - **Population** (`population`): ranking, elitism and reproduction
//! - **Archive** (`archive`): checkpoint files and the background writer
//! - **Orchestrator** (`orchestrator`): the spawn / evaluate / score /
//!   evolve loop around an [`Environment`](crate::compute::Environment)
//!
//! # Example
//!
//! ```rust,no_run
//! use neuroevo::compute::{ReachTargetConfig, ReachTargetEnvironment};
//! use neuroevo::compute::evolution::GenerationOrchestrator;
//! use neuroevo::schema::{EngineConfig, NetworkConfig};
//!
//! let mut config = EngineConfig::default();
//! config.network = NetworkConfig::with_layers(vec![4, 12, 2]);
//!
//! let environment = ReachTargetEnvironment::new(ReachTargetConfig::default(), None);
//! let mut orchestrator = GenerationOrchestrator::new(config, environment).unwrap();
//! let summary = orchestrator.run_with_callback(50, |outcome| {
//!     println!("Generation {}: best fitness = {:.3}",
//!         outcome.report.generation, outcome.report.best_fitness);
//! });
//! println!("Best ever: {:?}", summary.best_fitness);
//! ```

mod archive;
mod codec;
mod fitness;
mod genome;
mod orchestrator;
mod population;

pub use archive::{
    ArchiveError, CheckpointEntry, CheckpointStore, CheckpointWriter, checkpoint_filename,
    parse_checkpoint_filename, population_filename,
};
pub use codec::{
    CodecError, GenomeRecord, conform, decode, decode_or_random, decode_population, encode,
    encode_population,
};
pub use fitness::{
    BatchStats, EvaluationRecord, FitnessVerdict, classify_fitness, is_uniform_batch,
};
pub use genome::{GenomeRng, gene_difference};
pub use orchestrator::{
    GenerationOrchestrator, GenerationOutcome, OrchestratorControl, OrchestratorError,
    RunSummary, StopReason,
};
pub use population::{
    CheckpointReason, CheckpointRequest, GenerationReport, PopulationManager, PopulationSnapshot,
};
