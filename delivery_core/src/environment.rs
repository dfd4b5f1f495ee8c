use std::fmt::Write as _;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    Position,
    error::MapError,
    obstacles::{Motion, MovingObstacle, ObstacleTracker},
    terrain::{Connectivity, Terrain, TerrainGrid},
};

/// Default number of ticks the tracker predicts exactly.
pub const DEFAULT_HORIZON: usize = 64;

/// Read-only view of the world at one tick, handed to planners.
///
/// Holding a snapshot borrows the world immutably, so nothing can mutate the
/// grid or the obstacles while a search is running.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    pub grid: &'a TerrainGrid,
    pub obstacles: &'a ObstacleTracker,
}

impl<'a> Snapshot<'a> {
    /// Whether `cell` can be entered `tick` ticks from now.
    pub fn is_enterable(&self, cell: Position, tick: usize) -> bool {
        !self.grid.is_blocked(cell) && !self.obstacles.occupied_at(cell, tick)
    }

    /// Adjacent cells that can be entered at `tick`.
    pub fn enterable_neighbors(&self, cell: Position, tick: usize) -> impl Iterator<Item = Position> + 'a {
        let snapshot = *self;
        self.grid
            .neighbors(cell)
            .into_iter()
            .filter(move |next| snapshot.is_enterable(*next, tick))
    }
}

/// The live environment: terrain plus moving obstacles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct World {
    grid: TerrainGrid,
    tracker: ObstacleTracker,
}

impl World {
    pub fn new(grid: TerrainGrid, tracker: ObstacleTracker) -> Self {
        World { grid, tracker }
    }

    /// An all-road world without obstacles.
    pub fn open(width: usize, height: usize, connectivity: Connectivity) -> Self {
        World::new(
            TerrainGrid::new(width, height, connectivity),
            ObstacleTracker::new(DEFAULT_HORIZON),
        )
    }

    pub fn grid(&self) -> &TerrainGrid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut TerrainGrid {
        &mut self.grid
    }

    pub fn tracker(&self) -> &ObstacleTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut ObstacleTracker {
        &mut self.tracker
    }

    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            grid: &self.grid,
            obstacles: &self.tracker,
        }
    }

    /// Advances the simulation clock by one tick.
    pub fn advance<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.tracker.advance(rng);
    }
}

/// Line-oriented reader over the map text that skips blank lines.
struct MapLines<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
}

impl<'a> MapLines<'a> {
    fn new(text: &'a str) -> Self {
        MapLines {
            lines: text.lines().enumerate(),
        }
    }

    /// Returns the next non-empty line as `(line number, integers)`.
    fn next_numbers(&mut self, expected: &'static str) -> Result<(usize, Vec<i64>), MapError> {
        for (index, line) in self.lines.by_ref() {
            let line_no = index + 1;
            if line.trim().is_empty() {
                continue;
            }
            let numbers = line
                .split_whitespace()
                .map(|token| {
                    token.parse::<i64>().map_err(|_| MapError::Malformed {
                        line: line_no,
                        message: format!("'{token}' is not an integer"),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            return Ok((line_no, numbers));
        }
        Err(MapError::UnexpectedEof { expected })
    }

    fn next_count(&mut self, expected: &'static str) -> Result<usize, MapError> {
        let (line, numbers) = self.next_numbers(expected)?;
        match numbers.as_slice() {
            [count] => to_usize(*count, line),
            _ => Err(MapError::Malformed {
                line,
                message: format!("expected a single {expected}"),
            }),
        }
    }
}

fn to_usize(value: i64, line: usize) -> Result<usize, MapError> {
    usize::try_from(value).map_err(|_| MapError::Malformed {
        line,
        message: format!("{value} must not be negative"),
    })
}

fn to_position(x: i64, y: i64, line: usize, grid: &TerrainGrid) -> Result<Position, MapError> {
    let pos = Position::new(to_usize(x, line)?, to_usize(y, line)?);
    grid.check_cell(pos)
        .map_err(|source| MapError::Grid { line, source })?;
    Ok(pos)
}

/// Parses the map text format into a [`World`].
///
/// ```text
/// width height
/// num_static_obstacles
/// x y                                    (num_static_obstacles lines)
/// <height> rows of <width> terrain costs
/// num_moving_obstacles
/// x y path_length x1 y1 ... speed        (num_moving_obstacles lines)
/// ```
///
/// Moving obstacles loaded from a map are cyclic and start on the waypoint
/// equal to their `x y` prefix.
pub fn load_world_from_string(
    map_string: &str,
    connectivity: Connectivity,
) -> Result<World, MapError> {
    let mut lines = MapLines::new(map_string);

    let (line, dims) = lines.next_numbers("grid dimensions")?;
    let (width, height) = match dims.as_slice() {
        [w, h] => (to_usize(*w, line)?, to_usize(*h, line)?),
        _ => {
            return Err(MapError::Malformed {
                line,
                message: "expected 'width height'".to_string(),
            });
        }
    };
    if width == 0 || height == 0 {
        return Err(MapError::Malformed {
            line,
            message: "map has zero width or height".to_string(),
        });
    }
    let mut grid = TerrainGrid::new(width, height, connectivity);

    let static_count = lines.next_count("static obstacle count")?;
    for _ in 0..static_count {
        let (line, numbers) = lines.next_numbers("static obstacle")?;
        let [x, y] = numbers.as_slice() else {
            return Err(MapError::Malformed {
                line,
                message: "expected 'x y' for a static obstacle".to_string(),
            });
        };
        let pos = to_position(*x, *y, line, &grid)?;
        grid.add_obstacle(pos)
            .map_err(|source| MapError::Grid { line, source })?;
    }

    for y in 0..height {
        let (line, row) = lines.next_numbers("terrain row")?;
        if row.len() != width {
            return Err(MapError::Malformed {
                line,
                message: format!(
                    "inconsistent width at row {}: expected {}, found {}",
                    y,
                    width,
                    row.len()
                ),
            });
        }
        for (x, cost) in row.into_iter().enumerate() {
            let terrain =
                Terrain::from_cost(cost).map_err(|source| MapError::Grid { line, source })?;
            grid.set_terrain(Position::new(x, y), terrain)
                .map_err(|source| MapError::Grid { line, source })?;
        }
    }

    let mut tracker = ObstacleTracker::new(DEFAULT_HORIZON);
    let moving_count = lines.next_count("moving obstacle count")?;
    for _ in 0..moving_count {
        let (line, numbers) = lines.next_numbers("moving obstacle")?;
        tracker.add(parse_moving_obstacle(&numbers, line, &grid)?);
    }

    Ok(World::new(grid, tracker))
}

fn parse_moving_obstacle(
    numbers: &[i64],
    line: usize,
    grid: &TerrainGrid,
) -> Result<MovingObstacle, MapError> {
    let malformed = |message: String| MapError::Malformed { line, message };
    let [x, y, path_length, rest @ ..] = numbers else {
        return Err(malformed(
            "expected 'x y path_length x1 y1 ... speed'".to_string(),
        ));
    };
    let path_length = to_usize(*path_length, line)?;
    let Some(coord_count) = path_length.checked_mul(2) else {
        return Err(malformed(format!("path length {path_length} is too large")));
    };
    if rest.len() != coord_count + 1 {
        return Err(malformed(format!(
            "path of length {} needs {} numbers followed by a speed, found {}",
            path_length,
            coord_count,
            rest.len()
        )));
    }
    let (coords, speed) = rest.split_at(coord_count);
    let waypoints = coords
        .chunks_exact(2)
        .map(|pair| to_position(pair[0], pair[1], line, grid))
        .collect::<Result<Vec<_>, _>>()?;
    let start = to_position(*x, *y, line, grid)?;
    let speed = to_usize(speed[0], line)?;

    MovingObstacle::new(waypoints, speed, Motion::Cyclic)
        .and_then(|obstacle| obstacle.starting_at(start))
        .map_err(|err| malformed(err.to_string()))
}

/// Writes `world` in the map text format accepted by [`load_world_from_string`].
///
/// Each moving obstacle is written with its route starting at its current
/// position, so a route that revisits a cell resumes from the right waypoint.
/// The format has no field for motion: everything reloads as cyclic, and a
/// one-shot obstacle keeps only the waypoints it has not passed yet.
pub fn world_to_map_string(world: &World) -> String {
    let grid = world.grid();
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = writeln!(out, "{} {}", grid.width(), grid.height());

    let obstacles: Vec<Position> = grid.static_obstacles().collect();
    let _ = writeln!(out, "{}", obstacles.len());
    for pos in obstacles {
        let _ = writeln!(out, "{} {}", pos.x, pos.y);
    }

    for y in 0..grid.height() {
        let row: Vec<String> = (0..grid.width())
            .map(|x| {
                grid.cost(Position::new(x, y))
                    .map_or_else(|_| "?".to_string(), |cost| cost.to_string())
            })
            .collect();
        let _ = writeln!(out, "{}", row.join(" "));
    }

    let moving = world.tracker().obstacles();
    let _ = writeln!(out, "{}", moving.len());
    for obstacle in moving {
        let pos = obstacle.position();
        let route = obstacle.route_from_here();
        let _ = write!(out, "{} {} {}", pos.x, pos.y, route.len());
        for waypoint in &route {
            let _ = write!(out, " {} {}", waypoint.x, waypoint.y);
        }
        let _ = writeln!(out, " {}", obstacle.speed());
    }
    out
}
