//! Simulated annealing over whole paths.
//!
//! A candidate is always a connected cell sequence from start to goal; it may
//! cross blocked or occupied cells, which the energy function penalises.
//! Perturbations keep the sequence connected, so only blocked cells, occupied
//! cells and the fuel ceiling separate a candidate from a valid path.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Heuristic, PlanRequest, best_first};
use crate::{
    Position,
    environment::Snapshot,
    error::{PlanError, PlanResult},
    path::{Path, path_cost, validate_cells},
    terrain::TerrainGrid,
};

/// Energy added for every cell a candidate may not enter.
const INVALID_CELL_PENALTY: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnealingConfig {
    pub max_iterations: usize,
    pub initial_temperature: f64,
    /// Multiplier applied to the temperature after every iteration.
    pub cooling_rate: f64,
    /// The search stops once the temperature falls below this.
    pub min_temperature: f64,
}

impl Default for AnnealingConfig {
    fn default() -> Self {
        AnnealingConfig {
            max_iterations: 1000,
            initial_temperature: 100.0,
            cooling_rate: 0.95,
            min_temperature: 0.01,
        }
    }
}

impl AnnealingConfig {
    pub fn validate(&self) -> PlanResult<()> {
        if !(self.cooling_rate > 0.0 && self.cooling_rate < 1.0) {
            return Err(PlanError::InvalidConfig(format!(
                "cooling_rate must lie in (0, 1), got {}",
                self.cooling_rate
            )));
        }
        if !(self.initial_temperature > 0.0) {
            return Err(PlanError::InvalidConfig(format!(
                "initial_temperature must be positive, got {}",
                self.initial_temperature
            )));
        }
        if !(self.min_temperature >= 0.0) {
            return Err(PlanError::InvalidConfig(format!(
                "min_temperature must not be negative, got {}",
                self.min_temperature
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Evaluation {
    cost: u32,
    invalid: usize,
}

impl Evaluation {
    fn energy(self) -> f64 {
        f64::from(self.cost) + INVALID_CELL_PENALTY * self.invalid as f64
    }

    fn is_valid(self) -> bool {
        self.invalid == 0
    }
}

fn evaluate(cells: &[Position], snapshot: &Snapshot<'_>, request: &PlanRequest) -> PlanResult<Evaluation> {
    let cost = path_cost(snapshot.grid, cells)?;
    let mut invalid = cells
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(tick, cell)| !snapshot.is_enterable(**cell, *tick))
        .count();
    if !request.within_budget(cost) {
        invalid += 1;
    }
    Ok(Evaluation { cost, invalid })
}

pub(super) fn search<R: Rng + ?Sized>(
    request: &PlanRequest,
    snapshot: &Snapshot<'_>,
    config: &AnnealingConfig,
    seed: Option<&[Position]>,
    rng: &mut R,
) -> PlanResult<Path> {
    config.validate()?;
    let grid = snapshot.grid;
    let max_len = grid.width() * grid.height();

    let mut current = initial_candidate(request, snapshot, seed)?;
    let mut current_eval = evaluate(&current, snapshot, request)?;
    let mut best = current_eval.is_valid().then(|| (current.clone(), current_eval.cost));

    let mut temperature = config.initial_temperature;
    let mut iterations = 0;
    let mut accepted = 0;
    while iterations < config.max_iterations && temperature >= config.min_temperature {
        iterations += 1;
        if let Some(candidate) = perturb(&current, grid, max_len, rng) {
            let eval = evaluate(&candidate, snapshot, request)?;
            let delta = eval.energy() - current_eval.energy();
            if delta <= 0.0 || rng.random::<f64>() < (-delta / temperature).exp() {
                accepted += 1;
                current = candidate;
                current_eval = eval;
                if eval.is_valid() && best.as_ref().is_none_or(|(_, cost)| eval.cost < *cost) {
                    best = Some((current.clone(), eval.cost));
                }
            }
        }
        temperature *= config.cooling_rate;
    }

    debug!(
        iterations,
        accepted,
        best_cost = best.as_ref().map(|(_, cost)| *cost),
        "annealing finished"
    );

    let Some((cells, _)) = best else {
        return Err(request.no_path());
    };
    if validate_cells(&cells, snapshot, request.start, request.goal).is_err() {
        return Err(request.no_path());
    }
    let path = Path::from_cells(grid, cells)?;
    if !request.within_budget(path.cost()) {
        return Err(request.no_path());
    }
    Ok(path)
}

/// The supplied seed when it is a connected start-to-goal sequence,
/// otherwise a greedy best-first path planned without the fuel ceiling.
fn initial_candidate(
    request: &PlanRequest,
    snapshot: &Snapshot<'_>,
    seed: Option<&[Position]>,
) -> PlanResult<Vec<Position>> {
    if let Some(seed) = seed.filter(|cells| is_connected_route(cells, snapshot.grid, request)) {
        return Ok(seed.to_vec());
    }
    let unconstrained = PlanRequest::new(request.start, request.goal);
    let heuristic = Heuristic::default_for(snapshot.grid.connectivity());
    best_first::greedy(&unconstrained, snapshot, heuristic).map(Path::into_cells)
}

fn is_connected_route(cells: &[Position], grid: &TerrainGrid, request: &PlanRequest) -> bool {
    let connectivity = grid.connectivity();
    cells.first() == Some(&request.start)
        && cells.last() == Some(&request.goal)
        && cells.iter().all(|cell| grid.in_bounds(*cell))
        && cells
            .windows(2)
            .all(|pair| connectivity.are_adjacent(pair[0], pair[1]))
}

/// Applies one random perturbation. `None` when the drawn move does not apply.
fn perturb<R: Rng + ?Sized>(
    cells: &[Position],
    grid: &TerrainGrid,
    max_len: usize,
    rng: &mut R,
) -> Option<Vec<Position>> {
    match rng.random_range(0..3) {
        0 => corner_flip(cells, rng),
        1 => detour(cells, grid, max_len, rng),
        _ => shortcut(cells, grid, rng),
    }
}

/// Swaps a cell that turns a corner for the opposite corner of the same square.
fn corner_flip<R: Rng + ?Sized>(cells: &[Position], rng: &mut R) -> Option<Vec<Position>> {
    if cells.len() < 3 {
        return None;
    }
    let corners: Vec<usize> = (1..cells.len() - 1)
        .filter(|&i| cells[i - 1].is_diagonal_to(cells[i + 1]))
        .collect();
    if corners.is_empty() {
        return None;
    }
    let i = corners[rng.random_range(0..corners.len())];
    let (a, b) = (cells[i - 1], cells[i + 1]);
    let first = Position::new(a.x, b.y);
    let flipped = if cells[i] == first {
        Position::new(b.x, a.y)
    } else {
        first
    };
    let mut next = cells.to_vec();
    next[i] = flipped;
    Some(next)
}

/// Pushes one edge sideways by a cell, lengthening the path by two cells
/// (one for diagonal edges, which gain a corner instead).
fn detour<R: Rng + ?Sized>(
    cells: &[Position],
    grid: &TerrainGrid,
    max_len: usize,
    rng: &mut R,
) -> Option<Vec<Position>> {
    if cells.len() < 2 || cells.len() + 2 > max_len {
        return None;
    }
    let i = rng.random_range(0..cells.len() - 1);
    let (a, b) = (cells[i], cells[i + 1]);

    let inserted = if a.is_diagonal_to(b) {
        let corner = if rng.random_bool(0.5) {
            Position::new(a.x, b.y)
        } else {
            Position::new(b.x, a.y)
        };
        vec![corner]
    } else {
        let sign = if rng.random_bool(0.5) { 1 } else { -1 };
        let (dx, dy) = if a.x == b.x { (sign, 0) } else { (0, sign) };
        let shifted_a = a.offset(dx, dy).filter(|cell| grid.in_bounds(*cell))?;
        let shifted_b = b.offset(dx, dy).filter(|cell| grid.in_bounds(*cell))?;
        vec![shifted_a, shifted_b]
    };

    let mut next = Vec::with_capacity(cells.len() + inserted.len());
    next.extend_from_slice(&cells[..=i]);
    next.extend(inserted);
    next.extend_from_slice(&cells[i + 1..]);
    Some(next)
}

/// Splices out everything between a cell and the furthest later cell that is
/// equal or adjacent to it.
fn shortcut<R: Rng + ?Sized>(cells: &[Position], grid: &TerrainGrid, rng: &mut R) -> Option<Vec<Position>> {
    if cells.len() < 3 {
        return None;
    }
    let connectivity = grid.connectivity();
    let i = rng.random_range(0..cells.len() - 2);
    let anchor = cells[i];
    let j = (i + 2..cells.len())
        .rev()
        .find(|&j| cells[j] == anchor || connectivity.are_adjacent(anchor, cells[j]))?;

    let mut next = cells.to_vec();
    if cells[j] == anchor {
        next.drain(i + 1..=j);
    } else {
        next.drain(i + 1..j);
    }
    Some(next)
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{
        environment::World,
        terrain::{Connectivity, Terrain},
    };

    fn p(x: usize, y: usize) -> Position {
        Position { x, y }
    }

    fn snake(world: &World) -> Vec<Position> {
        // A long connected route across a 5x5 grid.
        let mut cells = Vec::new();
        for y in 0..world.grid().height() {
            let row: Vec<usize> = if y % 2 == 0 {
                (0..world.grid().width()).collect()
            } else {
                (0..world.grid().width()).rev().collect()
            };
            cells.extend(row.into_iter().map(|x| p(x, y)));
        }
        cells
    }

    #[test]
    fn config_validation() {
        assert!(AnnealingConfig::default().validate().is_ok());
        for bad in [
            AnnealingConfig { cooling_rate: 1.0, ..Default::default() },
            AnnealingConfig { cooling_rate: 0.0, ..Default::default() },
            AnnealingConfig { initial_temperature: 0.0, ..Default::default() },
            AnnealingConfig { min_temperature: -1.0, ..Default::default() },
            AnnealingConfig { cooling_rate: f64::NAN, ..Default::default() },
        ] {
            assert!(matches!(bad.validate(), Err(PlanError::InvalidConfig(_))), "{bad:?}");
        }
    }

    #[test]
    fn perturbations_keep_routes_connected() {
        for connectivity in [Connectivity::Four, Connectivity::Eight] {
            let world = World::open(5, 5, connectivity);
            let grid = world.grid();
            let mut rng = StdRng::seed_from_u64(11);
            let start = snake(&world);
            let request = PlanRequest::new(start[0], *start.last().unwrap());
            let mut cells = start.clone();
            for _ in 0..500 {
                if let Some(next) = perturb(&cells, grid, 25, &mut rng) {
                    assert!(is_connected_route(&next, grid, &request), "{next:?}");
                    assert!(next.len() <= 25);
                    cells = next;
                }
            }
        }
    }

    #[test]
    fn shortcut_removes_loops() {
        let world = World::open(3, 3, Connectivity::Four);
        let mut rng = StdRng::seed_from_u64(0);
        let cells = vec![p(0, 0), p(1, 0), p(1, 1), p(0, 1), p(0, 0), p(0, 1), p(0, 2)];
        // Whatever anchor is drawn, the result is never longer than the input.
        for _ in 0..20 {
            if let Some(next) = shortcut(&cells, world.grid(), &mut rng) {
                assert!(next.len() < cells.len());
                assert_eq!(next.last(), Some(&p(0, 2)));
            }
        }
    }

    #[test]
    fn repairs_seed_through_obstacle() {
        let mut world = World::open(2, 2, Connectivity::Four);
        world.grid_mut().add_obstacle(p(1, 0)).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let request = PlanRequest::new(p(0, 0), p(1, 1));
        let seed = [p(0, 0), p(1, 0), p(1, 1)];
        let path = search(
            &request,
            &world.snapshot(),
            &AnnealingConfig::default(),
            Some(&seed),
            &mut rng,
        )
        .unwrap();
        assert_eq!(path.cells(), &[p(0, 0), p(0, 1), p(1, 1)]);
        assert_eq!(path.cost(), 2);
    }

    #[test]
    fn result_is_always_valid() {
        let mut world = World::open(6, 6, Connectivity::Four);
        for y in 1..6 {
            world.grid_mut().set_terrain(p(2, y), Terrain::Mud).unwrap();
        }
        world.grid_mut().add_obstacle(p(4, 3)).unwrap();
        let request = PlanRequest::new(p(0, 5), p(5, 5));
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let result = search(&request, &world.snapshot(), &AnnealingConfig::default(), None, &mut rng);
            let path = result.unwrap();
            assert_eq!(validate_cells(path.cells(), &world.snapshot(), request.start, request.goal), Ok(()));
        }
    }

    #[test]
    fn ignores_disconnected_seed() {
        let world = World::open(4, 1, Connectivity::Four);
        let mut rng = StdRng::seed_from_u64(3);
        let request = PlanRequest::new(p(0, 0), p(3, 0));
        let path = search(
            &request,
            &world.snapshot(),
            &AnnealingConfig::default(),
            Some(&[p(0, 0), p(3, 0)]),
            &mut rng,
        )
        .unwrap();
        assert_eq!(path.cost(), 3);
    }
}
