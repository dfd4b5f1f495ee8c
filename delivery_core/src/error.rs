//! Error types shared across the delivery core.

use thiserror::Error;

use crate::Position;

/// Errors raised by grid queries and mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("Coordinates ({x}, {y}) are out of bounds for grid size ({width}, {height})")]
    InvalidCell {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },

    #[error("Invalid terrain cost {0}; expected one of 1 (road), 3 (grass), 5 (mud), 10 (water)")]
    InvalidTerrain(i64),
}

/// Errors produced by a planner before or during search.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error(transparent)]
    InvalidCell(#[from] GridError),

    #[error("Invalid plan request: {reason}")]
    InvalidRequest { reason: String },

    /// The frontier was exhausted without reaching the goal.
    #[error("No path found from {start:?} to {goal:?}")]
    NoPathFound { start: Position, goal: Position },

    #[error("Heuristic {heuristic} is not admissible with {connectivity} movement")]
    InadmissibleHeuristic {
        heuristic: &'static str,
        connectivity: &'static str,
    },

    #[error("Invalid planner configuration: {0}")]
    InvalidConfig(String),
}

impl PlanError {
    pub fn is_no_path(&self) -> bool {
        matches!(self, PlanError::NoPathFound { .. })
    }
}

/// Rejected agent step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    #[error("Step costs {required} fuel but only {remaining} remains")]
    FuelExhausted { required: u32, remaining: u32 },
}

/// Rejected moving obstacle definition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ObstacleError {
    #[error("Moving obstacle needs at least one waypoint")]
    EmptyRoute,

    #[error("Moving obstacle speed must be at least 1")]
    ZeroSpeed,

    #[error("Stall chance {0} must lie in [0, 1)")]
    InvalidStallChance(f64),

    #[error("Start cell {0} is not on the obstacle's route")]
    StartOffRoute(Position),
}

/// Failures while parsing the map text format.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    #[error("Unexpected end of map data: expected {expected}")]
    UnexpectedEof { expected: &'static str },

    #[error("Line {line}: {message}")]
    Malformed { line: usize, message: String },

    #[error("Line {line}: {source}")]
    Grid {
        line: usize,
        #[source]
        source: GridError,
    },
}

pub type PlanResult<T> = Result<T, PlanError>;
