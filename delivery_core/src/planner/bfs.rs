use std::collections::{HashMap, VecDeque};

use tracing::trace;

use super::PlanRequest;
use crate::{Position, environment::Snapshot, error::PlanResult, path::Path};

struct Node {
    cell: Position,
    parent: Option<usize>,
    steps: usize,
    cost: u32,
}

/// Breadth-first search: fewest moves, terrain cost ignored for ordering.
///
/// Without a fuel ceiling each cell is enqueued once, on first discovery.
/// With one, a cell is enqueued again whenever it is reached more cheaply, so a
/// costly short prefix cannot shut out a longer route that fits the budget.
/// The search stops at the first dequeue of the goal.
pub(super) fn search(request: &PlanRequest, snapshot: &Snapshot<'_>) -> PlanResult<Path> {
    let mut nodes = vec![Node {
        cell: request.start,
        parent: None,
        steps: 0,
        cost: 0,
    }];
    let mut frontier = VecDeque::from([0usize]);
    let mut cheapest = HashMap::from([(request.start, 0u32)]);

    while let Some(index) = frontier.pop_front() {
        let (current, steps, cost) = {
            let node = &nodes[index];
            (node.cell, node.steps, node.cost)
        };
        if current == request.goal {
            trace!(nodes = nodes.len(), "bfs reached goal");
            return Ok(Path::from_cells(snapshot.grid, trace_back(&nodes, index))?);
        }

        for next in snapshot.enterable_neighbors(current, steps + 1) {
            let next_cost = cost + snapshot.grid.step_cost(current, next)?;
            if !request.within_budget(next_cost) {
                continue;
            }
            let improves = match cheapest.get(&next) {
                None => true,
                Some(&seen) => request.fuel_ceiling.is_some() && next_cost < seen,
            };
            if !improves {
                continue;
            }
            cheapest.insert(next, next_cost);
            nodes.push(Node {
                cell: next,
                parent: Some(index),
                steps: steps + 1,
                cost: next_cost,
            });
            frontier.push_back(nodes.len() - 1);
        }
    }

    Err(request.no_path())
}

fn trace_back(nodes: &[Node], mut index: usize) -> Vec<Position> {
    let mut cells = vec![nodes[index].cell];
    while let Some(parent) = nodes[index].parent {
        cells.push(nodes[parent].cell);
        index = parent;
    }
    cells.reverse();
    cells
}
