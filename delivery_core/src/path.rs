use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Position, environment::Snapshot, error::GridError, terrain::TerrainGrid};

/// Reason a candidate path cannot be executed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathViolation {
    #[error("path is empty")]
    Empty,

    #[error("path runs {found_start} -> {found_goal}, expected {start} -> {goal}")]
    WrongEndpoints {
        start: Position,
        goal: Position,
        found_start: Position,
        found_goal: Position,
    },

    #[error("step {index} joins cells that are not adjacent")]
    Disconnected { index: usize },

    #[error("cell {cell} at step {index} is blocked")]
    Blocked { index: usize, cell: Position },

    #[error("cell {cell} is occupied at tick {index}")]
    Occupied { index: usize, cell: Position },

    #[error("path costs {cost}, more than the {ceiling} fuel available")]
    OverBudget { cost: u32, ceiling: u32 },
}

/// Sum of step costs along `cells`; the first cell is free.
pub fn path_cost(grid: &TerrainGrid, cells: &[Position]) -> Result<u32, GridError> {
    cells
        .windows(2)
        .map(|pair| grid.step_cost(pair[0], pair[1]))
        .sum()
}

/// An ordered sequence of cells from a start to a goal.
///
/// Cell `i` is scheduled to be occupied `i` ticks after the path was planned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    cells: Vec<Position>,
    cost: u32,
}

impl Path {
    /// The trivial path of a planner asked to go where it already is.
    pub fn single(cell: Position) -> Self {
        Path {
            cells: vec![cell],
            cost: 0,
        }
    }

    /// Builds a path and computes its cost from the grid.
    pub fn from_cells(grid: &TerrainGrid, cells: Vec<Position>) -> Result<Self, GridError> {
        let cost = path_cost(grid, &cells)?;
        Ok(Path { cells, cost })
    }

    pub fn cells(&self) -> &[Position] {
        &self.cells
    }

    pub fn into_cells(self) -> Vec<Position> {
        self.cells
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Number of cells, start included.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Number of moves along the path.
    pub fn moves(&self) -> usize {
        self.cells.len().saturating_sub(1)
    }

    pub fn start(&self) -> Option<Position> {
        self.cells.first().copied()
    }

    pub fn goal(&self) -> Option<Position> {
        self.cells.last().copied()
    }

    /// Checks connectivity, endpoints, obstacles at each scheduled tick and fuel.
    pub fn validate(
        &self,
        snapshot: &Snapshot<'_>,
        start: Position,
        goal: Position,
        fuel_ceiling: Option<u32>,
    ) -> Result<(), PathViolation> {
        validate_cells(&self.cells, snapshot, start, goal)?;
        match fuel_ceiling {
            Some(ceiling) if self.cost > ceiling => Err(PathViolation::OverBudget {
                cost: self.cost,
                ceiling,
            }),
            _ => Ok(()),
        }
    }
}

/// Shared validity check for committed paths and annealing candidates.
pub fn validate_cells(
    cells: &[Position],
    snapshot: &Snapshot<'_>,
    start: Position,
    goal: Position,
) -> Result<(), PathViolation> {
    let (Some(&first), Some(&last)) = (cells.first(), cells.last()) else {
        return Err(PathViolation::Empty);
    };
    if first != start || last != goal {
        return Err(PathViolation::WrongEndpoints {
            start,
            goal,
            found_start: first,
            found_goal: last,
        });
    }
    let connectivity = snapshot.grid.connectivity();
    for (index, pair) in cells.windows(2).enumerate() {
        if !connectivity.are_adjacent(pair[0], pair[1]) {
            return Err(PathViolation::Disconnected { index });
        }
    }
    for (index, &cell) in cells.iter().enumerate().skip(1) {
        if snapshot.grid.is_blocked(cell) {
            return Err(PathViolation::Blocked { index, cell });
        }
        if snapshot.obstacles.occupied_at(cell, index) {
            return Err(PathViolation::Occupied { index, cell });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        environment::World,
        obstacles::{Motion, MovingObstacle},
        terrain::{Connectivity, Terrain},
    };

    fn p(x: usize, y: usize) -> Position {
        Position { x, y }
    }

    #[test]
    fn cost_counts_destination_cells_only() {
        let mut world = World::open(3, 1, Connectivity::Four);
        world.grid_mut().set_terrain(p(0, 0), Terrain::Mud).unwrap();
        world.grid_mut().set_terrain(p(2, 0), Terrain::Grass).unwrap();
        let path = Path::from_cells(world.grid(), vec![p(0, 0), p(1, 0), p(2, 0)]).unwrap();
        assert_eq!(path.cost(), 4);
        assert_eq!(path.len(), 3);
        assert_eq!(path.moves(), 2);
    }

    #[test]
    fn validation_catches_each_violation() {
        let mut world = World::open(3, 3, Connectivity::Four);
        world.grid_mut().add_obstacle(p(1, 1)).unwrap();
        let route = vec![p(2, 0), p(2, 1)];
        world
            .tracker_mut()
            .add(MovingObstacle::new(route, 1, Motion::Cyclic).unwrap());
        let snapshot = world.snapshot();

        let good = vec![p(0, 0), p(0, 1), p(0, 2)];
        assert_eq!(validate_cells(&good, &snapshot, p(0, 0), p(0, 2)), Ok(()));
        assert_eq!(
            validate_cells(&[], &snapshot, p(0, 0), p(0, 2)),
            Err(PathViolation::Empty)
        );
        assert!(matches!(
            validate_cells(&good, &snapshot, p(0, 0), p(2, 2)),
            Err(PathViolation::WrongEndpoints { .. })
        ));
        assert_eq!(
            validate_cells(&[p(0, 0), p(0, 2)], &snapshot, p(0, 0), p(0, 2)),
            Err(PathViolation::Disconnected { index: 0 })
        );
        assert_eq!(
            validate_cells(&[p(0, 1), p(1, 1), p(2, 1)], &snapshot, p(0, 1), p(2, 1)),
            Err(PathViolation::Blocked {
                index: 1,
                cell: p(1, 1)
            })
        );
        // The obstacle alternates between (2, 0) and (2, 1); it is on (2, 1) at tick 1.
        assert_eq!(
            validate_cells(&[p(2, 2), p(2, 1)], &snapshot, p(2, 2), p(2, 1)),
            Err(PathViolation::Occupied {
                index: 1,
                cell: p(2, 1)
            })
        );
        assert_eq!(
            validate_cells(&[p(2, 2), p(2, 2), p(2, 1)], &snapshot, p(2, 2), p(2, 1)),
            Err(PathViolation::Disconnected { index: 0 })
        );
    }

    #[test]
    fn fuel_ceiling_is_enforced() {
        let world = World::open(4, 1, Connectivity::Four);
        let path = Path::from_cells(world.grid(), vec![p(0, 0), p(1, 0), p(2, 0), p(3, 0)]).unwrap();
        let snapshot = world.snapshot();
        assert_eq!(path.validate(&snapshot, p(0, 0), p(3, 0), Some(3)), Ok(()));
        assert_eq!(
            path.validate(&snapshot, p(0, 0), p(3, 0), Some(2)),
            Err(PathViolation::OverBudget {
                cost: 3,
                ceiling: 2
            })
        );
    }
}
