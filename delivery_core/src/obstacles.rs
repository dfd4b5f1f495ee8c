//! Moving obstacles and the tracker that predicts where they will be.

use std::collections::HashSet;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{Position, error::ObstacleError};

/// How an obstacle progresses along its waypoint list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Motion {
    /// Wraps to the first waypoint after the last.
    Cyclic,
    /// Idles on the last waypoint once reached.
    OneShot,
    /// Cyclic, but stalls for a tick with probability `stall_chance`.
    Stochastic { stall_chance: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovingObstacle {
    waypoints: Vec<Position>,
    speed: usize,
    index: usize,
    motion: Motion,
}

impl MovingObstacle {
    pub fn new(waypoints: Vec<Position>, speed: usize, motion: Motion) -> Result<Self, ObstacleError> {
        if waypoints.is_empty() {
            return Err(ObstacleError::EmptyRoute);
        }
        if speed == 0 {
            return Err(ObstacleError::ZeroSpeed);
        }
        if let Motion::Stochastic { stall_chance } = motion {
            if !(0.0..1.0).contains(&stall_chance) {
                return Err(ObstacleError::InvalidStallChance(stall_chance));
            }
        }
        Ok(MovingObstacle {
            waypoints,
            speed,
            index: 0,
            motion,
        })
    }

    /// Starts the obstacle at the first waypoint equal to `start`.
    pub fn starting_at(mut self, start: Position) -> Result<Self, ObstacleError> {
        self.index = self
            .waypoints
            .iter()
            .position(|waypoint| *waypoint == start)
            .ok_or(ObstacleError::StartOffRoute(start))?;
        Ok(self)
    }

    pub fn position(&self) -> Position {
        self.waypoints[self.index]
    }

    pub fn waypoints(&self) -> &[Position] {
        &self.waypoints
    }

    pub fn speed(&self) -> usize {
        self.speed
    }

    pub fn motion(&self) -> Motion {
        self.motion
    }

    /// The route as seen from the current position, which comes first.
    ///
    /// Cyclic routes are rotated; a one-shot route keeps only the waypoints still ahead.
    pub fn route_from_here(&self) -> Vec<Position> {
        match self.motion {
            Motion::OneShot => self.waypoints[self.index..].to_vec(),
            Motion::Cyclic | Motion::Stochastic { .. } => {
                let (behind, ahead) = self.waypoints.split_at(self.index);
                ahead.iter().chain(behind).copied().collect()
            }
        }
    }

    fn index_after(&self, advances: usize) -> usize {
        let len = self.waypoints.len();
        let offset = advances.saturating_mul(self.speed);
        match self.motion {
            Motion::OneShot => self.index.saturating_add(offset).min(len - 1),
            Motion::Cyclic | Motion::Stochastic { .. } => (self.index + offset % len) % len,
        }
    }

    /// Moves the obstacle one tick along its route.
    fn advance<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if let Motion::Stochastic { stall_chance } = self.motion {
            if rng.random_bool(stall_chance) {
                return;
            }
        }
        self.index = self.index_after(1);
    }

    /// Whether the obstacle may stand on `cell` exactly `tick` ticks from now.
    fn may_occupy(&self, cell: Position, tick: usize) -> bool {
        match self.motion {
            Motion::Cyclic | Motion::OneShot => self.waypoints[self.index_after(tick)] == cell,
            Motion::Stochastic { .. } => {
                // Any number of stalls in 0..=tick is possible.
                let advances = tick.min(self.waypoints.len());
                (0..=advances).any(|m| self.waypoints[self.index_after(m)] == cell)
            }
        }
    }

    /// Every cell the obstacle can still visit.
    fn may_ever_occupy(&self, cell: Position) -> bool {
        match self.motion {
            Motion::OneShot => self.waypoints[self.index..].contains(&cell),
            Motion::Cyclic | Motion::Stochastic { .. } => self.waypoints.contains(&cell),
        }
    }
}

/// Advances moving obstacles and answers occupancy queries over a bounded horizon.
///
/// Within the horizon predictions are exact for deterministic obstacles and
/// cover every reachable cell for stochastic ones. Beyond it a cell counts as
/// occupied if any obstacle could still reach it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleTracker {
    obstacles: Vec<MovingObstacle>,
    horizon: usize,
    tick: u64,
}

impl ObstacleTracker {
    pub fn new(horizon: usize) -> Self {
        ObstacleTracker {
            obstacles: Vec::new(),
            horizon,
            tick: 0,
        }
    }

    pub fn add(&mut self, obstacle: MovingObstacle) {
        self.obstacles.push(obstacle);
    }

    pub fn obstacles(&self) -> &[MovingObstacle] {
        &self.obstacles
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn set_horizon(&mut self, horizon: usize) {
        self.horizon = horizon;
    }

    /// Ticks elapsed since the tracker was created.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }

    /// Moves every obstacle one tick along its waypoint sequence.
    pub fn advance<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for obstacle in &mut self.obstacles {
            obstacle.advance(rng);
        }
        self.tick += 1;
        trace!(tick = self.tick, "obstacles advanced");
    }

    /// Whether `cell` may be occupied `tick` ticks from now (0 is the current tick).
    pub fn occupied_at(&self, cell: Position, tick: usize) -> bool {
        if tick > self.horizon {
            return self.obstacles.iter().any(|o| o.may_ever_occupy(cell));
        }
        self.obstacles.iter().any(|o| o.may_occupy(cell, tick))
    }

    pub fn occupied_now(&self, cell: Position) -> bool {
        self.occupied_at(cell, 0)
    }

    /// Current cells of all obstacles.
    pub fn positions(&self) -> HashSet<Position> {
        self.obstacles.iter().map(MovingObstacle::position).collect()
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn p(x: usize, y: usize) -> Position {
        Position { x, y }
    }

    fn square_route() -> Vec<Position> {
        vec![p(0, 0), p(0, 1), p(1, 1), p(1, 0)]
    }

    #[test]
    fn rejects_bad_definitions() {
        assert_eq!(
            MovingObstacle::new(vec![], 1, Motion::Cyclic),
            Err(ObstacleError::EmptyRoute)
        );
        assert_eq!(
            MovingObstacle::new(square_route(), 0, Motion::Cyclic),
            Err(ObstacleError::ZeroSpeed)
        );
        assert_eq!(
            MovingObstacle::new(square_route(), 1, Motion::Stochastic { stall_chance: 1.0 }),
            Err(ObstacleError::InvalidStallChance(1.0))
        );
        let obstacle = MovingObstacle::new(square_route(), 1, Motion::Cyclic).unwrap();
        assert_eq!(
            obstacle.starting_at(p(5, 5)),
            Err(ObstacleError::StartOffRoute(p(5, 5)))
        );
    }

    #[test]
    fn cyclic_obstacle_wraps() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut tracker = ObstacleTracker::new(10);
        tracker.add(MovingObstacle::new(square_route(), 1, Motion::Cyclic).unwrap());

        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(tracker.obstacles()[0].position());
            tracker.advance(&mut rng);
        }
        assert_eq!(seen, vec![p(0, 0), p(0, 1), p(1, 1), p(1, 0), p(0, 0)]);
        assert_eq!(tracker.tick(), 5);
    }

    #[test]
    fn speed_skips_waypoints() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut tracker = ObstacleTracker::new(10);
        tracker.add(MovingObstacle::new(square_route(), 3, Motion::Cyclic).unwrap());
        tracker.advance(&mut rng);
        assert_eq!(tracker.obstacles()[0].position(), p(1, 0));
        tracker.advance(&mut rng);
        assert_eq!(tracker.obstacles()[0].position(), p(1, 1));
    }

    #[test]
    fn one_shot_obstacle_idles_at_end() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut tracker = ObstacleTracker::new(10);
        tracker.add(MovingObstacle::new(square_route(), 2, Motion::OneShot).unwrap());
        for _ in 0..4 {
            tracker.advance(&mut rng);
        }
        assert_eq!(tracker.obstacles()[0].position(), p(1, 0));
        assert!(tracker.occupied_at(p(1, 0), 7));
        assert!(!tracker.occupied_at(p(0, 0), 7));
    }

    #[test]
    fn predictions_match_future_positions() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut tracker = ObstacleTracker::new(16);
        tracker.add(MovingObstacle::new(square_route(), 1, Motion::Cyclic).unwrap());
        let predicted: Vec<bool> = (0..6).map(|t| tracker.occupied_at(p(1, 1), t)).collect();
        assert_eq!(predicted, vec![false, false, true, false, false, false]);

        let mut live = tracker.clone();
        live.advance(&mut rng);
        live.advance(&mut rng);
        assert!(live.occupied_now(p(1, 1)));
    }

    #[test]
    fn beyond_horizon_fails_closed() {
        let mut tracker = ObstacleTracker::new(2);
        tracker.add(MovingObstacle::new(square_route(), 1, Motion::Cyclic).unwrap());
        // Exact prediction says (0, 1) is free at tick 3, but 3 is past the horizon.
        assert!(tracker.occupied_at(p(0, 1), 3));
        assert!(!tracker.occupied_at(p(2, 2), 3));
    }

    #[test]
    fn stochastic_obstacle_covers_every_reachable_cell() {
        let mut tracker = ObstacleTracker::new(10);
        let route = vec![p(0, 0), p(1, 0), p(2, 0), p(3, 0), p(4, 0)];
        tracker.add(MovingObstacle::new(route, 1, Motion::Stochastic { stall_chance: 0.5 }).unwrap());
        assert!(tracker.occupied_at(p(0, 0), 2));
        assert!(tracker.occupied_at(p(1, 0), 2));
        assert!(tracker.occupied_at(p(2, 0), 2));
        assert!(!tracker.occupied_at(p(3, 0), 2));
    }

    #[test]
    fn stochastic_obstacle_stays_on_route() {
        let mut rng = StdRng::seed_from_u64(3);
        let route = square_route();
        let mut tracker = ObstacleTracker::new(4);
        tracker.add(MovingObstacle::new(route.clone(), 1, Motion::Stochastic { stall_chance: 0.3 }).unwrap());
        for _ in 0..50 {
            let before = tracker.clone();
            tracker.advance(&mut rng);
            let now = tracker.obstacles()[0].position();
            assert!(route.contains(&now));
            assert!(before.occupied_at(now, 1));
        }
    }

    #[test]
    fn out_of_route_cells_are_free() {
        let tracker = ObstacleTracker::new(4);
        assert!(!tracker.occupied_at(p(0, 0), 100));
        assert!(tracker.positions().is_empty());
    }
}
