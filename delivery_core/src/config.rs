//! Simulation settings.
//!
//! Every section deserializes with defaults, so a TOML file only needs the
//! keys it wants to change.

use serde::{Deserialize, Serialize};

use crate::{
    environment::DEFAULT_HORIZON,
    error::{PlanError, PlanResult},
    planner::{Algorithm, AnnealingConfig, Heuristic, Planner},
    terrain::Connectivity,
};

/// How the agent is allowed to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// Default: four-connected.
    pub connectivity: Connectivity,
    /// When true, water is an ordinary cost-10 cell instead of a wall.
    /// Default: false
    pub water_passable: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Default: a_star
    pub algorithm: Algorithm,
    /// Only used by A*. Default: manhattan
    pub heuristic: Heuristic,
    pub annealing: AnnealingConfig,
}

impl PlannerConfig {
    pub fn new(algorithm: Algorithm) -> Self {
        PlannerConfig {
            algorithm,
            ..Self::default()
        }
    }

    pub fn with_heuristic(mut self, heuristic: Heuristic) -> Self {
        self.heuristic = heuristic;
        self
    }

    /// Builds the planner for a movement model, rejecting unusable settings.
    pub fn build(&self, connectivity: Connectivity) -> PlanResult<Planner> {
        Ok(match self.algorithm {
            Algorithm::Bfs => Planner::Bfs,
            Algorithm::Ucs => Planner::Ucs,
            Algorithm::AStar => {
                self.heuristic.check_admissible(connectivity)?;
                Planner::AStar(self.heuristic)
            }
            Algorithm::SimulatedAnnealing => {
                self.annealing.validate()?;
                Planner::Annealing(self.annealing.clone())
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Consecutive replans allowed before giving up.
    /// Default: 5
    pub max_replans: usize,
    /// Hard cap on simulation ticks for one run.
    /// Default: 10_000
    pub max_ticks: u64,
    /// Seeds the controller's random number generator.
    /// Default: 42
    pub seed: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            max_replans: 5,
            max_ticks: 10_000,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Ticks of exact obstacle prediction.
    /// Default: 64
    pub horizon: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            horizon: DEFAULT_HORIZON,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub movement: MovementConfig,
    pub planner: PlannerConfig,
    pub controller: ControllerConfig,
    pub tracker: TrackerConfig,
}

impl SimulationConfig {
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.planner.algorithm = algorithm;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.controller.seed = seed;
        self
    }

    /// Checks the settings before any run starts.
    pub fn validate(&self) -> PlanResult<()> {
        if self.controller.max_ticks == 0 {
            return Err(PlanError::InvalidConfig("max_ticks must be at least 1".to_string()));
        }
        self.planner.build(self.movement.connectivity).map(|_| ())
    }
}
