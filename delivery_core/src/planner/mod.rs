//! Path planning strategies over a world [`Snapshot`].
//!
//! Every strategy shares one contract: given a [`PlanRequest`] and a frozen
//! snapshot, return a [`Path`] or a [`PlanError`]. Strategies are variants of
//! the [`Planner`] enum and selected by plain `match` dispatch.

use std::{fmt, str::FromStr};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    Position,
    environment::Snapshot,
    error::{PlanError, PlanResult},
    path::Path,
    terrain::Connectivity,
};

pub mod annealing;
mod best_first;
mod bfs;

pub use annealing::AnnealingConfig;

/// Planning algorithm selector used in configuration and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "bfs")]
    Bfs,
    #[serde(rename = "ucs")]
    Ucs,
    #[default]
    #[serde(rename = "a_star")]
    AStar,
    #[serde(rename = "sa")]
    SimulatedAnnealing,
}

impl Algorithm {
    pub const ALL: [Algorithm; 4] = [
        Algorithm::Bfs,
        Algorithm::Ucs,
        Algorithm::AStar,
        Algorithm::SimulatedAnnealing,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Algorithm::Bfs => "bfs",
            Algorithm::Ucs => "ucs",
            Algorithm::AStar => "a_star",
            Algorithm::SimulatedAnnealing => "sa",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseNameError {
    pub(crate) kind: &'static str,
    pub(crate) value: String,
}

impl FromStr for Algorithm {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Algorithm::ALL
            .into_iter()
            .find(|algorithm| algorithm.name() == s)
            .ok_or_else(|| ParseNameError {
                kind: "algorithm",
                value: s.to_string(),
            })
    }
}

/// Distance estimate used by A*, scaled by the cheapest passable terrain cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Heuristic {
    #[default]
    Manhattan,
    Euclidean,
}

impl Heuristic {
    pub const fn name(self) -> &'static str {
        match self {
            Heuristic::Manhattan => "manhattan",
            Heuristic::Euclidean => "euclidean",
        }
    }

    pub fn estimate(self, from: Position, goal: Position, min_cost: u32) -> f64 {
        let distance = match self {
            Heuristic::Manhattan => from.manhattan(goal) as f64,
            Heuristic::Euclidean => from.euclidean(goal),
        };
        distance * f64::from(min_cost)
    }

    /// Manhattan overestimates once diagonal moves are allowed.
    pub fn check_admissible(self, connectivity: Connectivity) -> PlanResult<()> {
        match (self, connectivity) {
            (Heuristic::Manhattan, Connectivity::Eight) => Err(PlanError::InadmissibleHeuristic {
                heuristic: self.name(),
                connectivity: "eight-connected",
            }),
            _ => Ok(()),
        }
    }

    /// The admissible default for a movement model.
    pub fn default_for(connectivity: Connectivity) -> Self {
        match connectivity {
            Connectivity::Four => Heuristic::Manhattan,
            Connectivity::Eight => Heuristic::Euclidean,
        }
    }
}

impl FromStr for Heuristic {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Heuristic::Manhattan, Heuristic::Euclidean]
            .into_iter()
            .find(|heuristic| heuristic.name() == s)
            .ok_or_else(|| ParseNameError {
                kind: "heuristic",
                value: s.to_string(),
            })
    }
}

/// Pure planner input; the world comes in separately as a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanRequest {
    pub start: Position,
    pub goal: Position,
    /// Paths costing more than this are rejected.
    pub fuel_ceiling: Option<u32>,
}

impl PlanRequest {
    pub fn new(start: Position, goal: Position) -> Self {
        PlanRequest {
            start,
            goal,
            fuel_ceiling: None,
        }
    }

    pub fn with_fuel_ceiling(mut self, fuel: u32) -> Self {
        self.fuel_ceiling = Some(fuel);
        self
    }

    fn within_budget(&self, cost: u32) -> bool {
        self.fuel_ceiling.is_none_or(|ceiling| cost <= ceiling)
    }

    fn no_path(&self) -> PlanError {
        PlanError::NoPathFound {
            start: self.start,
            goal: self.goal,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Planner {
    Bfs,
    Ucs,
    AStar(Heuristic),
    Annealing(AnnealingConfig),
}

impl Planner {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Planner::Bfs => Algorithm::Bfs,
            Planner::Ucs => Algorithm::Ucs,
            Planner::AStar(_) => Algorithm::AStar,
            Planner::Annealing(_) => Algorithm::SimulatedAnnealing,
        }
    }

    pub fn plan<R: Rng + ?Sized>(
        &self,
        request: &PlanRequest,
        snapshot: &Snapshot<'_>,
        rng: &mut R,
    ) -> PlanResult<Path> {
        self.plan_seeded(request, snapshot, None, rng)
    }

    /// Plans with an optional candidate path; only annealing makes use of it.
    pub fn plan_seeded<R: Rng + ?Sized>(
        &self,
        request: &PlanRequest,
        snapshot: &Snapshot<'_>,
        seed: Option<&[Position]>,
        rng: &mut R,
    ) -> PlanResult<Path> {
        validate_request(request, snapshot)?;
        if request.start == request.goal {
            return Ok(Path::single(request.start));
        }
        let result = match self {
            Planner::Bfs => bfs::search(request, snapshot),
            Planner::Ucs => best_first::search(request, snapshot, best_first::Priority::Cost),
            Planner::AStar(heuristic) => {
                heuristic.check_admissible(snapshot.grid.connectivity())?;
                best_first::search(
                    request,
                    snapshot,
                    best_first::Priority::CostPlusHeuristic(*heuristic),
                )
            }
            Planner::Annealing(config) => annealing::search(request, snapshot, config, seed, rng),
        };
        match &result {
            Ok(path) => debug!(
                algorithm = %self.algorithm(),
                cost = path.cost(),
                cells = path.len(),
                "path found"
            ),
            Err(err) => debug!(algorithm = %self.algorithm(), %err, "planning failed"),
        }
        result
    }
}

/// Rejects requests that could never succeed, before any search starts.
fn validate_request(request: &PlanRequest, snapshot: &Snapshot<'_>) -> PlanResult<()> {
    let grid = snapshot.grid;
    grid.check_cell(request.start)?;
    grid.check_cell(request.goal)?;
    if grid.is_blocked(request.start) {
        return Err(PlanError::InvalidRequest {
            reason: format!("start {} is blocked", request.start),
        });
    }
    if grid.is_blocked(request.goal) {
        return Err(PlanError::InvalidRequest {
            reason: format!("goal {} is blocked", request.goal),
        });
    }
    Ok(())
}

/// Runs `planner`; when simulated annealing finds nothing, retries with A*.
pub fn plan_with_fallback<R: Rng + ?Sized>(
    planner: &Planner,
    request: &PlanRequest,
    snapshot: &Snapshot<'_>,
    seed: Option<&[Position]>,
    rng: &mut R,
) -> PlanResult<Path> {
    match planner.plan_seeded(request, snapshot, seed, rng) {
        Err(err) if err.is_no_path() && matches!(planner, Planner::Annealing(_)) => {
            warn!(start = %request.start, goal = %request.goal, "annealing failed, falling back to A*");
            Planner::AStar(Heuristic::Euclidean).plan(request, snapshot, rng)
        }
        other => other,
    }
}
