//! Terrain classes and the cost/occupancy model planners search over.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Position, error::GridError, map::Grid};

/// Terrain class of a cell. The discriminant is the traversal cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terrain {
    #[default]
    Road,
    Grass,
    Mud,
    /// Impassable unless the movement configuration allows wading.
    Water,
}

impl Terrain {
    pub const ALL: [Terrain; 4] = [Terrain::Road, Terrain::Grass, Terrain::Mud, Terrain::Water];

    pub const fn cost(self) -> u32 {
        match self {
            Terrain::Road => 1,
            Terrain::Grass => 3,
            Terrain::Mud => 5,
            Terrain::Water => 10,
        }
    }

    pub fn from_cost(cost: i64) -> Result<Self, GridError> {
        Terrain::ALL
            .into_iter()
            .find(|terrain| i64::from(terrain.cost()) == cost)
            .ok_or(GridError::InvalidTerrain(cost))
    }

    pub const fn name(self) -> &'static str {
        match self {
            Terrain::Road => "road",
            Terrain::Grass => "grass",
            Terrain::Mud => "mud",
            Terrain::Water => "water",
        }
    }
}

/// Movement model: which cells count as adjacent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    #[default]
    Four,
    Eight,
}

impl Connectivity {
    const CARDINAL: [(isize, isize); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];
    const DIAGONAL: [(isize, isize); 4] = [(1, -1), (1, 1), (-1, 1), (-1, -1)];

    /// Neighbor offsets in expansion order: N, E, S, W, then NE, SE, SW, NW.
    pub fn offsets(self) -> impl Iterator<Item = (isize, isize)> {
        let cardinal: &'static [(isize, isize)] = &Self::CARDINAL;
        let diagonals: &'static [(isize, isize)] = match self {
            Connectivity::Four => &[],
            Connectivity::Eight => &Self::DIAGONAL,
        };
        cardinal.iter().chain(diagonals).copied()
    }

    pub fn are_adjacent(self, a: Position, b: Position) -> bool {
        match self {
            Connectivity::Four => a.manhattan(b) == 1,
            Connectivity::Eight => a != b && a.x.abs_diff(b.x) <= 1 && a.y.abs_diff(b.y) <= 1,
        }
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connectivity::Four => f.write_str("four-connected"),
            Connectivity::Eight => f.write_str("eight-connected"),
        }
    }
}

/// Cost of a diagonal step: the entered cell's cost scaled by sqrt(2), rounded up.
pub const fn diagonal_cost(cost: u32) -> u32 {
    (cost * 1414).div_ceil(1000)
}

/// Terrain costs plus static obstacles for one map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainGrid {
    terrain: Grid<Terrain>,
    obstacles: Grid<bool>,
    connectivity: Connectivity,
    water_passable: bool,
}

impl TerrainGrid {
    /// Creates an all-road grid without obstacles.
    pub fn new(width: usize, height: usize, connectivity: Connectivity) -> Self {
        TerrainGrid {
            terrain: Grid::filled(width, height, Terrain::Road),
            obstacles: Grid::filled(width, height, false),
            connectivity,
            water_passable: false,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.terrain.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.terrain.height()
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    pub fn set_connectivity(&mut self, connectivity: Connectivity) {
        self.connectivity = connectivity;
    }

    pub fn set_water_passable(&mut self, water_passable: bool) {
        self.water_passable = water_passable;
    }

    pub fn water_passable(&self) -> bool {
        self.water_passable
    }

    #[inline]
    pub fn in_bounds(&self, cell: Position) -> bool {
        self.terrain.in_bounds(cell)
    }

    /// Fails with `InvalidCell` when `cell` lies outside the grid.
    pub fn check_cell(&self, cell: Position) -> Result<(), GridError> {
        if self.in_bounds(cell) {
            Ok(())
        } else {
            Err(self.terrain.invalid_cell(cell))
        }
    }

    pub fn terrain(&self, cell: Position) -> Result<Terrain, GridError> {
        self.terrain
            .get(cell)
            .copied()
            .ok_or_else(|| self.terrain.invalid_cell(cell))
    }

    /// Traversal cost of entering `cell`.
    pub fn cost(&self, cell: Position) -> Result<u32, GridError> {
        self.terrain(cell).map(Terrain::cost)
    }

    /// Cost of moving from `from` into the adjacent cell `to`.
    pub fn step_cost(&self, from: Position, to: Position) -> Result<u32, GridError> {
        let cost = self.cost(to)?;
        if from.is_diagonal_to(to) {
            Ok(diagonal_cost(cost))
        } else {
            Ok(cost)
        }
    }

    pub fn has_obstacle(&self, cell: Position) -> bool {
        self.obstacles.get(cell).copied().unwrap_or(false)
    }

    /// Whether the cell can never be entered. Out-of-bounds cells are blocked.
    pub fn is_blocked(&self, cell: Position) -> bool {
        match self.terrain.get(cell) {
            None => true,
            Some(Terrain::Water) if !self.water_passable => true,
            Some(_) => self.has_obstacle(cell),
        }
    }

    /// In-bounds adjacent cells of `cell`, blocked or not.
    pub fn neighbors(&self, cell: Position) -> Vec<Position> {
        self.connectivity
            .offsets()
            .filter_map(|(dx, dy)| cell.offset(dx, dy))
            .filter(|next| self.in_bounds(*next))
            .collect()
    }

    /// The cheapest cost of any enterable cell, the floor used by heuristics.
    pub fn min_passable_cost(&self) -> Option<u32> {
        self.terrain
            .enumerate()
            .filter(|(pos, _)| !self.is_blocked(*pos))
            .map(|(_, terrain)| terrain.cost())
            .min()
    }

    pub fn set_terrain(&mut self, cell: Position, terrain: Terrain) -> Result<(), GridError> {
        self.terrain.set(cell, terrain)
    }

    pub fn add_obstacle(&mut self, cell: Position) -> Result<(), GridError> {
        self.obstacles.set(cell, true)
    }

    pub fn remove_obstacle(&mut self, cell: Position) -> Result<(), GridError> {
        self.obstacles.set(cell, false)
    }

    pub fn static_obstacles(&self) -> impl Iterator<Item = Position> + '_ {
        self.obstacles
            .enumerate()
            .filter_map(|(pos, blocked)| blocked.then_some(pos))
    }

    pub fn static_obstacle_count(&self) -> usize {
        self.obstacles.iter().filter(|blocked| **blocked).count()
    }

    /// Number of cells of each terrain class, in [`Terrain::ALL`] order.
    pub fn terrain_histogram(&self) -> [(Terrain, usize); 4] {
        Terrain::ALL.map(|class| {
            let count = self.terrain.iter().filter(|t| **t == class).count();
            (class, count)
        })
    }
}
