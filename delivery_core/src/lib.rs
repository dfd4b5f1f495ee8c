use std::fmt;

use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub mod agent;
pub mod benchmark;
pub mod config;
pub mod controller;
pub mod environment;
pub mod error;
pub mod map;
pub mod obstacles;
pub mod path;
pub mod planner;
pub mod terrain;

use crate::{
    agent::Agent,
    config::{PlannerConfig, SimulationConfig},
    controller::{Controller, DeliveryOutcome},
    environment::World,
    error::PlanError,
    path::Path,
    planner::PlanRequest,
};

/// Represents a 2D grid coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// Returns the position offset by `(dx, dy)`, or `None` on underflow.
    pub fn offset(self, dx: isize, dy: isize) -> Option<Position> {
        Some(Position {
            x: self.x.checked_add_signed(dx)?,
            y: self.y.checked_add_signed(dy)?,
        })
    }

    pub fn manhattan(self, other: Position) -> usize {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    pub fn euclidean(self, other: Position) -> f64 {
        let dx = self.x.abs_diff(other.x) as f64;
        let dy = self.y.abs_diff(other.y) as f64;
        dx.hypot(dy)
    }

    /// True when the two cells differ by one step in both axes.
    pub fn is_diagonal_to(self, other: Position) -> bool {
        self.x.abs_diff(other.x) == 1 && self.y.abs_diff(other.y) == 1
    }
}

impl From<(usize, usize)> for Position {
    fn from((x, y): (usize, usize)) -> Self {
        Position { x, y }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Plans a single path on the current state of `world`.
///
/// Simulated annealing falls back to A* when it cannot produce a valid path.
pub fn plan_path<R: rand::Rng + ?Sized>(
    world: &World,
    start: Position,
    goal: Position,
    config: &PlannerConfig,
    rng: &mut R,
) -> Result<Path, PlanError> {
    let planner = config.build(world.grid().connectivity())?;
    let request = PlanRequest::new(start, goal);
    planner::plan_with_fallback(&planner, &request, &world.snapshot(), None, rng)
}

/// Runs a full delivery mission to completion and reports the terminal outcome.
pub fn run_delivery(world: World, agent: Agent, config: &SimulationConfig) -> DeliveryOutcome {
    let rng = StdRng::seed_from_u64(config.controller.seed);
    let initial = agent.clone();
    match Controller::new(world, agent, config.clone(), rng) {
        Ok(mut controller) => controller.run(),
        Err(err) => {
            warn!(%err, "delivery rejected before start");
            DeliveryOutcome::rejected(&initial, err)
        }
    }
}
