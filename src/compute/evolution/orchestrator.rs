//! Generation lifecycle: spawn, evaluate, score, evolve, repeat.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use rayon::prelude::*;

use crate::compute::anomaly::{self, AnomalyKind};
use crate::compute::environment::{AgentStatus, Environment, Observation};
use crate::schema::{
    EngineConfig, EvaluationConfig, EvolutionConfigError, EvolutionHistory, GenerationEnd,
    OrchestratorState,
};

use super::archive::{ArchiveError, CheckpointStore, CheckpointWriter};
use super::fitness::{BatchStats, EvaluationRecord, is_uniform_batch};
use super::population::{CheckpointReason, CheckpointRequest, GenerationReport, PopulationManager};

/// Errors raised while setting up an orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] EvolutionConfigError),
    #[error("Checkpoint setup failed: {0}")]
    Archive(#[from] ArchiveError),
}

#[derive(Debug)]
struct ControlFlags {
    stop: AtomicBool,
    advance: AtomicBool,
    checkpoint: AtomicBool,
    time_scale: AtomicU32,
    max_time_scale: f32,
}

/// Thread-safe handle for steering a running orchestrator.
///
/// Requests are picked up between ticks.
#[derive(Debug, Clone)]
pub struct OrchestratorControl {
    flags: Arc<ControlFlags>,
}

impl OrchestratorControl {
    fn new(config: &EvaluationConfig) -> Self {
        let control = Self {
            flags: Arc::new(ControlFlags {
                stop: AtomicBool::new(false),
                advance: AtomicBool::new(false),
                checkpoint: AtomicBool::new(false),
                time_scale: AtomicU32::new(1.0f32.to_bits()),
                max_time_scale: config.max_time_scale,
            }),
        };
        control.set_time_scale(config.time_scale);
        control
    }

    /// Pause at the next Spawning or Evaluating boundary.
    pub fn stop(&self) {
        self.flags.stop.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.flags.stop.store(false, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.flags.stop.load(Ordering::Relaxed)
    }

    /// End the current evaluation early.
    pub fn advance(&self) {
        self.flags.advance.store(true, Ordering::Relaxed);
    }

    /// Save the current best genome as soon as possible.
    pub fn request_checkpoint(&self) {
        self.flags.checkpoint.store(true, Ordering::Relaxed);
    }

    /// Set the simulation speed multiplier, clamped to
    /// `(0, max_time_scale]`. Returns the applied value.
    pub fn set_time_scale(&self, scale: f32) -> f32 {
        if !(scale.is_finite() && scale > 0.0) {
            log::warn!("Ignoring time scale {scale}");
            return self.time_scale();
        }
        let applied = scale.min(self.flags.max_time_scale);
        self.flags
            .time_scale
            .store(applied.to_bits(), Ordering::Relaxed);
        applied
    }

    pub fn time_scale(&self) -> f32 {
        f32::from_bits(self.flags.time_scale.load(Ordering::Relaxed))
    }

    fn take_advance(&self) -> bool {
        self.flags.advance.swap(false, Ordering::Relaxed)
    }

    fn take_checkpoint(&self) -> bool {
        self.flags.checkpoint.swap(false, Ordering::Relaxed)
    }
}

/// Everything known about one finished generation.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub end: GenerationEnd,
    /// Simulated seconds spent evaluating.
    pub simulated: f32,
    pub stats: BatchStats,
    pub report: GenerationReport,
}

/// Reason for stopping the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    MaxGenerations,
    Cancelled,
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub generations: usize,
    pub best_fitness: Option<f32>,
    pub stop_reason: StopReason,
    pub history: EvolutionHistory,
}

/// Drives an [`Environment`] through repeated generations.
pub struct GenerationOrchestrator<E: Environment> {
    evaluation: EvaluationConfig,
    snapshot_interval: usize,
    environment: E,
    population: PopulationManager,
    writer: Option<CheckpointWriter>,
    control: OrchestratorControl,
    state: OrchestratorState,
    paused_in: Option<OrchestratorState>,
    elapsed: f32,
    pending_end: Option<GenerationEnd>,
    records: Vec<EvaluationRecord>,
}

impl<E: Environment> GenerationOrchestrator<E> {
    /// Validate `config`, open the checkpoint directory if one is set, and
    /// seed from a stored checkpoint when resuming.
    pub fn new(config: EngineConfig, environment: E) -> Result<Self, OrchestratorError> {
        config.validate()?;
        let mut population = PopulationManager::new(&config);

        let writer = match &config.checkpoint.directory {
            Some(dir) => {
                let store = CheckpointStore::new(dir, config.checkpoint.tag.clone())?;
                if config.checkpoint.resume {
                    match population.seed_from_store(&store, config.checkpoint.load_strategy) {
                        Ok(()) => {}
                        Err(ArchiveError::NoCheckpoint { .. }) => {
                            log::info!("No checkpoint in {}; starting fresh", dir.display());
                        }
                        Err(e) => log::warn!("Could not resume ({e}); starting fresh"),
                    }
                }
                Some(CheckpointWriter::new(store)?)
            }
            None => None,
        };

        Ok(Self {
            control: OrchestratorControl::new(&config.evaluation),
            evaluation: config.evaluation,
            snapshot_interval: config.checkpoint.snapshot_interval,
            environment,
            population,
            writer,
            state: OrchestratorState::Spawning,
            paused_in: None,
            elapsed: 0.0,
            pending_end: None,
            records: Vec::new(),
        })
    }

    pub fn control(&self) -> OrchestratorControl {
        self.control.clone()
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn population(&self) -> &PopulationManager {
        &self.population
    }

    pub fn environment(&self) -> &E {
        &self.environment
    }

    pub fn environment_mut(&mut self) -> &mut E {
        &mut self.environment
    }

    /// Simulated seconds elapsed in the current evaluation.
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Advance the state machine by one step.
    ///
    /// Returns the outcome when this tick completed a generation.
    pub fn tick(&mut self) -> Option<GenerationOutcome> {
        if self.control.take_checkpoint() {
            self.save_best_now();
        }

        match self.state {
            OrchestratorState::Stopped => {
                if !self.control.is_stopped() {
                    self.state = self.paused_in.take().unwrap_or(OrchestratorState::Spawning);
                    log::info!("Resumed in {:?}", self.state);
                }
                None
            }
            OrchestratorState::Spawning | OrchestratorState::Evaluating
                if self.control.is_stopped() =>
            {
                log::info!("Stopped in {:?}", self.state);
                self.paused_in = Some(self.state);
                self.state = OrchestratorState::Stopped;
                None
            }
            OrchestratorState::Spawning => {
                self.spawn();
                None
            }
            OrchestratorState::Evaluating => {
                self.evaluate_tick();
                None
            }
            OrchestratorState::Scoring => {
                self.score();
                None
            }
            OrchestratorState::Evolving => Some(self.evolve()),
        }
    }

    /// Tick until the current generation completes.
    ///
    /// Returns `None` if the orchestrator is stopped first.
    pub fn run_generation(&mut self) -> Option<GenerationOutcome> {
        loop {
            if self.state == OrchestratorState::Stopped && self.control.is_stopped() {
                return None;
            }
            if let Some(outcome) = self.tick() {
                return Some(outcome);
            }
        }
    }

    /// Run up to `max_generations` generations.
    pub fn run(&mut self, max_generations: usize) -> RunSummary {
        self.run_with_callback(max_generations, |_| {})
    }

    /// Run up to `max_generations` generations, reporting each one.
    pub fn run_with_callback<F>(&mut self, max_generations: usize, mut callback: F) -> RunSummary
    where
        F: FnMut(&GenerationOutcome),
    {
        let mut generations = 0;
        let stop_reason = loop {
            if generations >= max_generations {
                break StopReason::MaxGenerations;
            }
            match self.run_generation() {
                Some(outcome) => {
                    generations += 1;
                    callback(&outcome);
                }
                None => break StopReason::Cancelled,
            }
        };

        if let Some(writer) = &self.writer
            && let Err(e) = writer.flush()
        {
            log::error!("Failed to flush checkpoints: {e}");
        }

        RunSummary {
            generations,
            best_fitness: self.population.best_ever().map(|g| g.fitness),
            stop_reason,
            history: self.population.history().clone(),
        }
    }

    fn spawn(&mut self) {
        self.environment.spawn(self.population.len());
        self.population.begin_evaluation();
        self.elapsed = 0.0;
        self.pending_end = None;
        self.state = OrchestratorState::Evaluating;
        log::debug!(
            "Generation {}: spawned {} agents",
            self.population.generation(),
            self.population.len()
        );
    }

    fn evaluate_tick(&mut self) {
        if self.control.take_advance() {
            self.finish_evaluation(GenerationEnd::Forced);
            return;
        }

        let observations = self.environment.observe();
        if let Some(end) = self.early_end(&observations) {
            self.finish_evaluation(end);
            return;
        }

        let genomes = self.population.genomes();
        if observations.len() != genomes.len() {
            anomaly::report(
                AnomalyKind::StructuralMismatch,
                format_args!(
                    "{} observations for {} genomes",
                    observations.len(),
                    genomes.len()
                ),
            );
        }
        let actions: Vec<Vec<f32>> = genomes
            .par_iter()
            .zip(observations.par_iter())
            .map(|(genome, observation)| genome.forward(&observation.inputs))
            .collect();
        self.environment.act(&actions);

        let dt = self.evaluation.time_step * self.control.time_scale();
        self.environment.step(dt);
        self.elapsed += dt;

        if self.elapsed >= self.evaluation.generation_time {
            self.finish_evaluation(GenerationEnd::TimeBudget);
        }
    }

    /// Early termination once warm-up has passed.
    fn early_end(&self, observations: &[Observation]) -> Option<GenerationEnd> {
        if self.elapsed < self.evaluation.warmup_time || observations.is_empty() {
            return None;
        }
        let total = observations.len() as f32;
        let failed = observations.iter().filter(|o| o.is_failing()).count() as f32;
        let succeeded = observations
            .iter()
            .filter(|o| o.status == AgentStatus::Succeeded)
            .count() as f32;
        if failed / total > self.evaluation.failure_fraction {
            Some(GenerationEnd::MostlyFailed)
        } else if succeeded / total > self.evaluation.success_fraction {
            Some(GenerationEnd::MostlySucceeded)
        } else {
            None
        }
    }

    fn finish_evaluation(&mut self, end: GenerationEnd) {
        log::debug!(
            "Generation {}: evaluation ended ({end:?}) after {:.2}s",
            self.population.generation(),
            self.elapsed
        );
        self.pending_end = Some(end);
        self.state = OrchestratorState::Scoring;
    }

    fn score(&mut self) {
        let mut records = self.environment.harvest();
        let tolerance = self.population.config().fitness_guard.uniform_tolerance;
        if is_uniform_batch(&records, tolerance) {
            anomaly::report(
                AnomalyKind::CorruptFitness,
                format_args!(
                    "all {} agents reported fitness {}",
                    records.len(),
                    records[0].fitness
                ),
            );
            for record in &mut records {
                record.fitness = 0.0;
            }
            self.population.mark_batch_corrupt();
        }
        self.population.apply_evaluations(&records);
        self.records = records;
        self.state = OrchestratorState::Evolving;
    }

    fn evolve(&mut self) -> GenerationOutcome {
        let stats = BatchStats::from_records(&self.records);
        let report = self.population.evolve();

        if let Some(request) = report.checkpoint.clone() {
            self.submit(request);
        }
        if self.snapshot_interval > 0 && self.population.generation() % self.snapshot_interval == 0 {
            self.submit_population();
        }

        let outcome = GenerationOutcome {
            end: self.pending_end.take().unwrap_or(GenerationEnd::TimeBudget),
            simulated: self.elapsed,
            stats,
            report,
        };
        log::info!(
            "Generation {} ({:?}, {:.1}s): best {:.2}, mean {:.2}, {} of {} succeeded",
            outcome.report.generation,
            outcome.end,
            outcome.simulated,
            outcome.report.best_fitness,
            outcome.report.mean_fitness,
            outcome.stats.successes,
            outcome.stats.agents
        );
        self.state = OrchestratorState::Spawning;
        outcome
    }

    fn save_best_now(&mut self) {
        let Some(genome) = self.population.best_ever().cloned() else {
            log::info!("Checkpoint requested before any generation was ranked; skipping");
            return;
        };
        let generation = self.population.generation();
        self.submit(CheckpointRequest {
            fitness: genome.fitness,
            genome,
            generation,
            reason: CheckpointReason::Manual,
        });
    }

    fn submit(&self, request: CheckpointRequest) {
        let Some(writer) = &self.writer else {
            log::debug!(
                "No checkpoint directory; skipping {:?} checkpoint",
                request.reason
            );
            return;
        };
        if let Err(e) = writer.submit(request) {
            log::error!("Failed to queue checkpoint: {e}");
        }
    }

    fn submit_population(&self) {
        let Some(writer) = &self.writer else {
            return;
        };
        let genomes = self.population.genomes().to_vec();
        if let Err(e) = writer.submit_population(genomes, self.population.generation()) {
            log::error!("Failed to queue population snapshot: {e}");
        }
    }
}
