//! Simulation contract driven by the generation orchestrator, plus a small
//! point-mass environment used by the CLI, benchmarks and tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::evolution::EvaluationRecord;

/// Lifecycle of one agent within a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AgentStatus {
    #[default]
    Active,
    Failed,
    Succeeded,
}

/// What an agent reports each tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub inputs: Vec<f32>,
    pub fitness: f32,
    pub status: AgentStatus,
}

impl Observation {
    /// Counted as failed for early termination: explicit failure or a
    /// negative or non-finite fitness.
    pub fn is_failing(&self) -> bool {
        self.status == AgentStatus::Failed || !self.fitness.is_finite() || self.fitness < 0.0
    }
}

/// A simulation hosting one agent per genome.
///
/// Agent `i` is driven by genome `i` for the whole generation.
pub trait Environment {
    /// Reset the world and create `agents` agents.
    fn spawn(&mut self, agents: usize);

    /// Current observation of every agent, in agent order.
    fn observe(&mut self) -> Vec<Observation>;

    /// Apply one action vector per agent. Values are in `[-1, 1]`.
    fn act(&mut self, actions: &[Vec<f32>]);

    /// Advance simulated time by `dt` seconds.
    fn step(&mut self, dt: f32);

    /// Final outcome of every agent. Called once per generation.
    fn harvest(&mut self) -> Vec<EvaluationRecord>;
}

/// Parameters of [`ReachTargetEnvironment`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReachTargetConfig {
    /// Distance from the origin at which targets are placed.
    pub target_distance: f32,
    /// Reaching within this distance counts as success.
    pub success_radius: f32,
    /// Leaving this radius counts as failure.
    pub arena_radius: f32,
    /// Acceleration produced by an action of magnitude 1.
    pub max_acceleration: f32,
    /// Fraction of velocity retained per second.
    pub damping: f32,
    /// Fitness added on success.
    pub success_bonus: f32,
}

impl Default for ReachTargetConfig {
    fn default() -> Self {
        Self {
            target_distance: 5.0,
            success_radius: 0.5,
            arena_radius: 12.0,
            max_acceleration: 4.0,
            damping: 0.5,
            success_bonus: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct PointMass {
    position: [f32; 2],
    velocity: [f32; 2],
    thrust: [f32; 2],
    closest: f32,
    lifetime: f32,
    status: AgentStatus,
}

/// Steer a point mass from the origin to a target.
///
/// Observations are `[dx, dy, vx, vy]` (offset to the target and
/// velocity); actions are `[ax, ay]`. Fitness is the progress made towards
/// the target, plus a bonus on arrival. Leaving the arena fails the agent.
pub struct ReachTargetEnvironment {
    config: ReachTargetConfig,
    rng: StdRng,
    target: [f32; 2],
    agents: Vec<PointMass>,
}

impl ReachTargetEnvironment {
    pub const INPUTS: usize = 4;
    pub const OUTPUTS: usize = 2;

    pub fn new(config: ReachTargetConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            rng,
            target: [0.0, 0.0],
            agents: Vec::new(),
        }
    }

    pub fn target(&self) -> [f32; 2] {
        self.target
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    fn fitness(&self, agent: &PointMass) -> f32 {
        let progress = self.config.target_distance - agent.closest;
        match agent.status {
            AgentStatus::Succeeded => progress + self.config.success_bonus,
            AgentStatus::Failed => -1.0,
            AgentStatus::Active => progress,
        }
    }

    fn distance(&self, position: [f32; 2]) -> f32 {
        (self.target[0] - position[0]).hypot(self.target[1] - position[1])
    }
}

impl Environment for ReachTargetEnvironment {
    fn spawn(&mut self, agents: usize) {
        let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
        self.target = [
            self.config.target_distance * angle.cos(),
            self.config.target_distance * angle.sin(),
        ];
        let start = PointMass {
            closest: self.config.target_distance,
            ..Default::default()
        };
        self.agents = vec![start; agents];
    }

    fn observe(&mut self) -> Vec<Observation> {
        self.agents
            .iter()
            .map(|agent| Observation {
                inputs: vec![
                    self.target[0] - agent.position[0],
                    self.target[1] - agent.position[1],
                    agent.velocity[0],
                    agent.velocity[1],
                ],
                fitness: self.fitness(agent),
                status: agent.status,
            })
            .collect()
    }

    fn act(&mut self, actions: &[Vec<f32>]) {
        for (agent, action) in self.agents.iter_mut().zip(actions) {
            let component = |i: usize| {
                let v = action.get(i).copied().unwrap_or(0.0);
                if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 }
            };
            agent.thrust = [component(0), component(1)];
        }
    }

    fn step(&mut self, dt: f32) {
        if !(dt.is_finite() && dt > 0.0) {
            return;
        }
        let retain = self.config.damping.clamp(0.0, 1.0).powf(dt);
        let accel = self.config.max_acceleration;
        let target = self.target;
        for agent in &mut self.agents {
            if agent.status != AgentStatus::Active {
                continue;
            }
            for axis in 0..2 {
                agent.velocity[axis] = (agent.velocity[axis] + agent.thrust[axis] * accel * dt) * retain;
                agent.position[axis] += agent.velocity[axis] * dt;
            }
            agent.lifetime += dt;

            let distance = (target[0] - agent.position[0]).hypot(target[1] - agent.position[1]);
            agent.closest = agent.closest.min(distance);
            if distance <= self.config.success_radius {
                agent.status = AgentStatus::Succeeded;
            } else if agent.position[0].hypot(agent.position[1]) > self.config.arena_radius {
                agent.status = AgentStatus::Failed;
            }
        }
    }

    fn harvest(&mut self) -> Vec<EvaluationRecord> {
        let agents = std::mem::take(&mut self.agents);
        agents
            .iter()
            .enumerate()
            .map(|(genome_index, agent)| EvaluationRecord {
                genome_index,
                fitness: self.fitness(agent),
                succeeded: agent.status == AgentStatus::Succeeded,
                lifetime: agent.lifetime,
            })
            .collect()
    }
}
