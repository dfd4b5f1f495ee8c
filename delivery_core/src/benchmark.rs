//! Built-in maps for comparing planners on the same deliveries.
//!
//! Each map comes with the delivery it is meant to be run with. The agent
//! starts at the origin, which lies in water on the medium and large maps,
//! so these maps are meant to be run with water passable.

use std::{fmt, str::FromStr};

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    Position,
    agent::Agent,
    environment::World,
    error::{GridError, ObstacleError},
    obstacles::{Motion, MovingObstacle},
    planner::ParseNameError,
    terrain::{Connectivity, Terrain},
};

/// Fuel every benchmark delivery starts with.
pub const BENCHMARK_FUEL: u32 = 1000;

const RANDOM_WALLS: usize = 100;

#[derive(Debug, Error)]
pub enum BenchmarkError {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Obstacle(#[from] ObstacleError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkMap {
    /// 10x10 with a short wall between grass and mud bands.
    Small,
    /// 20x20 with a walled cross and a water strip on the left.
    Medium,
    /// 50x50 with randomly scattered walls.
    Large,
    /// 15x15 with a wall and one obstacle circling a square.
    Dynamic,
}

impl BenchmarkMap {
    pub const ALL: [BenchmarkMap; 4] = [
        BenchmarkMap::Small,
        BenchmarkMap::Medium,
        BenchmarkMap::Large,
        BenchmarkMap::Dynamic,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BenchmarkMap::Small => "small",
            BenchmarkMap::Medium => "medium",
            BenchmarkMap::Large => "large",
            BenchmarkMap::Dynamic => "dynamic",
        }
    }

    /// The pickup and dropoff visited on this map, in that order.
    pub fn stops(self) -> (Position, Position) {
        match self {
            BenchmarkMap::Small => (Position::new(9, 9), Position::new(5, 2)),
            BenchmarkMap::Medium => (Position::new(19, 19), Position::new(10, 5)),
            BenchmarkMap::Large => (Position::new(45, 45), Position::new(10, 10)),
            BenchmarkMap::Dynamic => (Position::new(12, 12), Position::new(7, 3)),
        }
    }

    pub fn agent(self) -> Agent {
        let (pickup, dropoff) = self.stops();
        Agent::new(Position::new(0, 0), BENCHMARK_FUEL)
            .with_pickups([pickup])
            .with_destinations([dropoff])
    }

    /// Builds the map. Only the large map draws from `rng`.
    ///
    /// Walls never cover the start, pickup or dropoff cell.
    pub fn world<R: Rng + ?Sized>(self, rng: &mut R) -> Result<World, BenchmarkError> {
        let mut world = match self {
            BenchmarkMap::Small => {
                let mut world = World::open(10, 10, Connectivity::Four);
                let grid = world.grid_mut();
                for x in 3..7 {
                    grid.add_obstacle(Position::new(x, 5))?;
                }
                paint(&mut world, 0..10, 0..3, Terrain::Grass)?;
                paint(&mut world, 0..10, 7..10, Terrain::Mud)?;
                world
            }
            BenchmarkMap::Medium => {
                let mut world = World::open(20, 20, Connectivity::Four);
                let grid = world.grid_mut();
                for i in 5..15 {
                    grid.add_obstacle(Position::new(i, 10))?;
                    grid.add_obstacle(Position::new(10, i))?;
                }
                paint(&mut world, 0..20, 0..5, Terrain::Grass)?;
                paint(&mut world, 0..20, 15..20, Terrain::Mud)?;
                paint(&mut world, 0..5, 0..20, Terrain::Water)?;
                world
            }
            BenchmarkMap::Large => {
                let mut world = World::open(50, 50, Connectivity::Four);
                let grid = world.grid_mut();
                for _ in 0..RANDOM_WALLS {
                    let cell = Position::new(rng.random_range(0..50), rng.random_range(0..50));
                    grid.add_obstacle(cell)?;
                }
                paint(&mut world, 0..50, 0..10, Terrain::Grass)?;
                paint(&mut world, 0..50, 40..50, Terrain::Mud)?;
                paint(&mut world, 0..10, 0..50, Terrain::Water)?;
                world
            }
            BenchmarkMap::Dynamic => {
                let mut world = World::open(15, 15, Connectivity::Four);
                for x in 5..10 {
                    world.grid_mut().add_obstacle(Position::new(x, 7))?;
                }
                let square = [(3, 3), (3, 4), (3, 5), (4, 5), (5, 5), (5, 4), (5, 3), (4, 3)]
                    .map(Position::from)
                    .to_vec();
                world
                    .tracker_mut()
                    .add(MovingObstacle::new(square, 2, Motion::Cyclic)?);
                paint(&mut world, 0..15, 0..5, Terrain::Grass)?;
                world
            }
        };

        let (pickup, dropoff) = self.stops();
        let grid = world.grid_mut();
        for cell in [Position::new(0, 0), pickup, dropoff] {
            grid.remove_obstacle(cell)?;
        }
        Ok(world)
    }
}

fn paint(
    world: &mut World,
    xs: std::ops::Range<usize>,
    ys: std::ops::Range<usize>,
    terrain: Terrain,
) -> Result<(), GridError> {
    let grid = world.grid_mut();
    for y in ys {
        for x in xs.clone() {
            grid.set_terrain(Position::new(x, y), terrain)?;
        }
    }
    Ok(())
}

impl fmt::Display for BenchmarkMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BenchmarkMap {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BenchmarkMap::ALL
            .into_iter()
            .find(|map| map.name() == s)
            .ok_or_else(|| ParseNameError {
                kind: "benchmark map",
                value: s.to_string(),
            })
    }
}
