//! Priority-queue searches: uniform-cost, A* and greedy best-first.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, HashSet},
};

use tracing::trace;

use super::{Heuristic, PlanRequest};
use crate::{Position, environment::Snapshot, error::PlanResult, path::Path};

/// How frontier entries are ranked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Priority {
    /// Uniform-cost: cumulative cost only.
    Cost,
    /// A*: cumulative cost plus heuristic.
    CostPlusHeuristic(Heuristic),
    /// Greedy best-first: heuristic only. Cheap, not optimal.
    Heuristic(Heuristic),
}

impl Priority {
    fn heuristic(self) -> Option<Heuristic> {
        match self {
            Priority::Cost => None,
            Priority::CostPlusHeuristic(h) | Priority::Heuristic(h) => Some(h),
        }
    }

    fn score(self, g: u32, h: f64) -> f64 {
        match self {
            Priority::Cost | Priority::CostPlusHeuristic(_) => f64::from(g) + h,
            Priority::Heuristic(_) => h,
        }
    }
}

/// Frontier entry. Ordered so the max-heap pops the lowest score first,
/// then the lowest heuristic, then the earliest insertion.
#[derive(Debug, Clone, Copy)]
struct Entry {
    score: f64,
    h: f64,
    seq: u64,
    g: u32,
    steps: usize,
    cell: Position,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| other.h.total_cmp(&self.h))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

pub(super) fn search(
    request: &PlanRequest,
    snapshot: &Snapshot<'_>,
    priority: Priority,
) -> PlanResult<Path> {
    let goal = request.goal;
    let min_cost = snapshot.grid.min_passable_cost().unwrap_or(1);
    let estimate = |cell: Position| {
        priority
            .heuristic()
            .map_or(0.0, |h| h.estimate(cell, goal, min_cost))
    };

    let mut frontier = BinaryHeap::new();
    let mut best_cost: HashMap<Position, u32> = HashMap::new();
    let mut came_from: HashMap<Position, Position> = HashMap::new();
    let mut closed: HashSet<Position> = HashSet::new();
    let mut seq = 0u64;

    let h = estimate(request.start);
    frontier.push(Entry {
        score: priority.score(0, h),
        h,
        seq,
        g: 0,
        steps: 0,
        cell: request.start,
    });
    best_cost.insert(request.start, 0);

    while let Some(entry) = frontier.pop() {
        if closed.contains(&entry.cell) {
            continue;
        }
        // Superseded by a cheaper entry pushed later.
        if best_cost.get(&entry.cell).is_some_and(|best| entry.g > *best) {
            continue;
        }
        closed.insert(entry.cell);

        if entry.cell == goal {
            trace!(expanded = closed.len(), ?priority, "goal reached");
            let cells = reconstruct(&came_from, request.start, goal);
            return Ok(Path::from_cells(snapshot.grid, cells)?);
        }

        for next in snapshot.enterable_neighbors(entry.cell, entry.steps + 1) {
            if closed.contains(&next) {
                continue;
            }
            let g = entry.g + snapshot.grid.step_cost(entry.cell, next)?;
            if !request.within_budget(g) {
                continue;
            }
            if best_cost.get(&next).is_none_or(|best| g < *best) {
                best_cost.insert(next, g);
                came_from.insert(next, entry.cell);
                seq += 1;
                let h = estimate(next);
                frontier.push(Entry {
                    score: priority.score(g, h),
                    h,
                    seq,
                    g,
                    steps: entry.steps + 1,
                    cell: next,
                });
            }
        }
    }

    Err(request.no_path())
}

/// Greedy best-first search, used to seed local search.
pub(super) fn greedy(
    request: &PlanRequest,
    snapshot: &Snapshot<'_>,
    heuristic: Heuristic,
) -> PlanResult<Path> {
    search(request, snapshot, Priority::Heuristic(heuristic))
}

/// Walks `came_from` back from `goal` and returns the cells start-first.
fn reconstruct(
    came_from: &HashMap<Position, Position>,
    start: Position,
    goal: Position,
) -> Vec<Position> {
    let mut cells = vec![goal];
    let mut current = goal;
    while current != start {
        match came_from.get(&current) {
            Some(previous) => {
                current = *previous;
                cells.push(current);
            }
            None => break,
        }
    }
    cells.reverse();
    cells
}
