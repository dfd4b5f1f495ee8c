use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::{Position, error::StepError, path::Path};

/// What happened when the agent reached its current goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arrival {
    PickedUp(Position),
    Delivered(Position),
}

/// The delivery vehicle: where it is, what fuel it has and where it still has to go.
///
/// Pickups are visited first, then destinations, each in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    position: Position,
    fuel: u32,
    initial_fuel: u32,
    pickups: VecDeque<Position>,
    destinations: VecDeque<Position>,
    /// Committed cells still ahead, excluding the current position.
    path: VecDeque<Position>,
    picked_up: usize,
    delivered: usize,
    steps: usize,
    cost_travelled: u32,
    visited: Vec<Position>,
}

impl Agent {
    pub fn new(position: Position, fuel: u32) -> Self {
        Agent {
            position,
            fuel,
            initial_fuel: fuel,
            pickups: VecDeque::new(),
            destinations: VecDeque::new(),
            path: VecDeque::new(),
            picked_up: 0,
            delivered: 0,
            steps: 0,
            cost_travelled: 0,
            visited: vec![position],
        }
    }

    pub fn with_pickups(mut self, pickups: impl IntoIterator<Item = Position>) -> Self {
        self.pickups.extend(pickups);
        self
    }

    pub fn with_destinations(mut self, destinations: impl IntoIterator<Item = Position>) -> Self {
        self.destinations.extend(destinations);
        self
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn fuel(&self) -> u32 {
        self.fuel
    }

    pub fn fuel_used(&self) -> u32 {
        self.initial_fuel - self.fuel
    }

    pub fn pickups(&self) -> impl Iterator<Item = Position> + '_ {
        self.pickups.iter().copied()
    }

    pub fn destinations(&self) -> impl Iterator<Item = Position> + '_ {
        self.destinations.iter().copied()
    }

    pub fn picked_up(&self) -> usize {
        self.picked_up
    }

    pub fn delivered(&self) -> usize {
        self.delivered
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn cost_travelled(&self) -> u32 {
        self.cost_travelled
    }

    /// Every cell the agent has stood on, starting cell first.
    pub fn visited(&self) -> &[Position] {
        &self.visited
    }

    /// The next pickup, or the next destination once all pickups are done.
    pub fn current_goal(&self) -> Option<Position> {
        self.pickups.front().or(self.destinations.front()).copied()
    }

    pub fn goals_remaining(&self) -> usize {
        self.pickups.len() + self.destinations.len()
    }

    /// Replaces the committed path. A leading cell equal to the current position is dropped.
    pub fn commit(&mut self, path: &Path) {
        let cells = path.cells();
        let skip = usize::from(cells.first() == Some(&self.position));
        self.path = cells[skip..].iter().copied().collect();
    }

    pub fn clear_path(&mut self) {
        self.path.clear();
    }

    pub fn next_step(&self) -> Option<Position> {
        self.path.front().copied()
    }

    /// The committed path including the current position, as handed to planners as a seed.
    pub fn remaining_path(&self) -> Vec<Position> {
        std::iter::once(self.position)
            .chain(self.path.iter().copied())
            .collect()
    }

    /// Moves onto `cell`, paying `cost` fuel.
    ///
    /// Leaves the agent untouched when the fuel does not cover the cost.
    pub fn try_step(&mut self, cell: Position, cost: u32) -> Result<(), StepError> {
        if cost > self.fuel {
            return Err(StepError::FuelExhausted {
                required: cost,
                remaining: self.fuel,
            });
        }
        self.fuel -= cost;
        self.cost_travelled += cost;
        self.steps += 1;
        self.position = cell;
        self.visited.push(cell);
        if self.path.front() == Some(&cell) {
            self.path.pop_front();
        } else {
            self.path.clear();
        }
        Ok(())
    }

    /// Records a pickup or delivery when standing on the current goal.
    pub fn arrive(&mut self) -> Option<Arrival> {
        if self.pickups.front() == Some(&self.position) {
            self.pickups.pop_front();
            self.picked_up += 1;
            Some(Arrival::PickedUp(self.position))
        } else if self.pickups.is_empty() && self.destinations.front() == Some(&self.position) {
            self.destinations.pop_front();
            self.delivered += 1;
            Some(Arrival::Delivered(self.position))
        } else {
            None
        }
    }
}
