//! The replanning state machine that drives one delivery run.
//!
//! Every call to [`Controller::tick`] performs one transition. Transitions
//! that move the agent, or make it wait, advance the world by one tick.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    Position,
    agent::{Agent, Arrival},
    config::SimulationConfig,
    environment::{Snapshot, World},
    error::{PlanError, PlanResult},
    obstacles::ObstacleTracker,
    path::{Path, path_cost, validate_cells},
    planner::{self, PlanRequest, Planner},
};

/// Why a run ended without completing every delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StuckReason {
    /// A start or goal cell is out of bounds or blocked, or the settings are unusable.
    InvalidRequest,
    NoPathFound,
    /// A route exists but the remaining fuel does not cover it.
    FuelExhausted,
    ReplanLimitExceeded,
    TickLimitExceeded,
}

impl StuckReason {
    fn from_plan_error(err: &PlanError) -> Self {
        match err {
            PlanError::NoPathFound { .. } => StuckReason::NoPathFound,
            PlanError::InvalidCell(_)
            | PlanError::InvalidRequest { .. }
            | PlanError::InadmissibleHeuristic { .. }
            | PlanError::InvalidConfig(_) => StuckReason::InvalidRequest,
        }
    }
}

impl fmt::Display for StuckReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StuckReason::InvalidRequest => "invalid request",
            StuckReason::NoPathFound => "no path found",
            StuckReason::FuelExhausted => "fuel exhausted",
            StuckReason::ReplanLimitExceeded => "replan limit exceeded",
            StuckReason::TickLimitExceeded => "tick limit exceeded",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Planning,
    Executing,
    Replanning,
    Arrived,
    Stuck(StuckReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Arrived,
    Stuck,
}

/// Terminal report of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub status: DeliveryStatus,
    pub stuck_reason: Option<StuckReason>,
    /// Error message behind a stuck outcome, when there was one.
    pub detail: Option<String>,
    pub final_position: Position,
    pub cost_travelled: u32,
    pub fuel_used: u32,
    pub fuel_remaining: u32,
    pub steps: usize,
    pub replans: usize,
    pub ticks: u64,
    pub picked_up: usize,
    pub delivered: usize,
    pub visited: Vec<Position>,
}

impl DeliveryOutcome {
    /// Outcome of a run that never started because its settings or agent were rejected.
    pub fn rejected(agent: &Agent, err: PlanError) -> Self {
        DeliveryOutcome {
            status: DeliveryStatus::Stuck,
            stuck_reason: Some(StuckReason::from_plan_error(&err)),
            detail: Some(err.to_string()),
            final_position: agent.position(),
            cost_travelled: agent.cost_travelled(),
            fuel_used: agent.fuel_used(),
            fuel_remaining: agent.fuel(),
            steps: agent.steps(),
            replans: 0,
            ticks: 0,
            picked_up: agent.picked_up(),
            delivered: agent.delivered(),
            visited: agent.visited().to_vec(),
        }
    }

    pub fn is_arrived(&self) -> bool {
        self.status == DeliveryStatus::Arrived
    }
}

pub struct Controller<R> {
    world: World,
    agent: Agent,
    config: SimulationConfig,
    planner: Planner,
    rng: R,
    state: ControllerState,
    /// Replans since the last successful step.
    consecutive_replans: usize,
    replans: usize,
    ticks: u64,
    detail: Option<String>,
    /// Cost of the committed path still ahead, as priced when it was planned.
    remaining_cost: u32,
    /// Set by `world_mut`; the committed path is rechecked before the next step.
    world_changed: bool,
}

impl<R: Rng> Controller<R> {
    /// Applies the movement and tracker settings to `world` and checks the agent's start cell.
    pub fn new(mut world: World, agent: Agent, config: SimulationConfig, rng: R) -> PlanResult<Self> {
        config.validate()?;
        let grid = world.grid_mut();
        grid.set_connectivity(config.movement.connectivity);
        grid.set_water_passable(config.movement.water_passable);
        world.tracker_mut().set_horizon(config.tracker.horizon);

        world.grid().check_cell(agent.position())?;
        for goal in agent.pickups().chain(agent.destinations()) {
            world.grid().check_cell(goal)?;
        }
        let planner = config.planner.build(config.movement.connectivity)?;

        Ok(Controller {
            world,
            agent,
            config,
            planner,
            rng,
            state: ControllerState::Planning,
            consecutive_replans: 0,
            replans: 0,
            ticks: 0,
            detail: None,
            remaining_cost: 0,
            world_changed: false,
        })
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable access between ticks, for injecting obstacles or terrain changes.
    /// The next execution step validates against the changed world.
    pub fn world_mut(&mut self) -> &mut World {
        self.world_changed = true;
        &mut self.world
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn replans(&self) -> usize {
        self.replans
    }

    /// True once the run is over: stuck, or arrived with no goals left.
    pub fn is_finished(&self) -> bool {
        match self.state {
            ControllerState::Stuck(_) => true,
            ControllerState::Arrived => self.agent.current_goal().is_none(),
            _ => false,
        }
    }

    /// Performs one state transition and returns the new state.
    pub fn tick(&mut self) -> ControllerState {
        if self.is_finished() {
            return self.state;
        }
        if self.ticks >= self.config.controller.max_ticks {
            self.stuck(StuckReason::TickLimitExceeded, None);
            return self.state;
        }
        match self.state {
            ControllerState::Planning => self.plan(),
            ControllerState::Executing => self.execute(),
            ControllerState::Replanning => self.replan(),
            ControllerState::Arrived => self.transition(ControllerState::Planning),
            ControllerState::Stuck(_) => {}
        }
        self.state
    }

    /// Ticks until the run finishes.
    pub fn run(&mut self) -> DeliveryOutcome {
        while !self.is_finished() {
            self.tick();
        }
        self.outcome()
    }

    pub fn outcome(&self) -> DeliveryOutcome {
        let (status, stuck_reason) = match self.state {
            ControllerState::Stuck(reason) => (DeliveryStatus::Stuck, Some(reason)),
            _ if self.is_finished() => (DeliveryStatus::Arrived, None),
            // Still running; reported as stuck without a reason.
            _ => (DeliveryStatus::Stuck, None),
        };
        let agent = &self.agent;
        DeliveryOutcome {
            status,
            stuck_reason,
            detail: self.detail.clone(),
            final_position: agent.position(),
            cost_travelled: agent.cost_travelled(),
            fuel_used: agent.fuel_used(),
            fuel_remaining: agent.fuel(),
            steps: agent.steps(),
            replans: self.replans,
            ticks: self.ticks,
            picked_up: agent.picked_up(),
            delivered: agent.delivered(),
            visited: agent.visited().to_vec(),
        }
    }

    fn transition(&mut self, next: ControllerState) {
        if next != self.state {
            info!(from = ?self.state, to = ?next, tick = self.ticks, "controller transition");
        }
        self.state = next;
    }

    fn stuck(&mut self, reason: StuckReason, detail: Option<String>) {
        warn!(
            %reason,
            position = %self.agent.position(),
            fuel = self.agent.fuel(),
            tick = self.ticks,
            "delivery stuck"
        );
        self.detail = detail;
        self.agent.clear_path();
        self.transition(ControllerState::Stuck(reason));
    }

    fn advance_world(&mut self) {
        self.world.advance(&mut self.rng);
        self.ticks += 1;
    }

    /// Records a pickup or delivery when standing on the current goal.
    fn arrive(&mut self) {
        match self.agent.arrive() {
            Some(Arrival::PickedUp(cell)) => info!(%cell, "package picked up"),
            Some(Arrival::Delivered(cell)) => info!(%cell, "package delivered"),
            None => {}
        }
        self.agent.clear_path();
        self.transition(ControllerState::Arrived);
    }

    fn plan(&mut self) {
        let Some(goal) = self.agent.current_goal() else {
            self.transition(ControllerState::Arrived);
            return;
        };
        if self.agent.position() == goal {
            self.arrive();
            return;
        }
        match self.plan_to(goal, None) {
            Ok(path) => self.commit(path),
            Err(err) => self.fail(err, goal),
        }
    }

    fn execute(&mut self) {
        let Some(goal) = self.agent.current_goal() else {
            self.transition(ControllerState::Arrived);
            return;
        };
        let Some(next) = self.agent.next_step() else {
            if self.agent.position() == goal {
                self.arrive();
            } else {
                self.transition(ControllerState::Planning);
            }
            return;
        };
        if std::mem::take(&mut self.world_changed) && !self.committed_path_holds(goal) {
            warn!(tick = self.ticks, "world changed under the committed path, replanning");
            self.transition(ControllerState::Replanning);
            return;
        }

        let snapshot = self.world.snapshot();
        let here = self.agent.position();
        let step_cost = snapshot
            .grid
            .step_cost(here, next)
            .ok()
            .filter(|_| snapshot.grid.connectivity().are_adjacent(here, next))
            .filter(|_| snapshot.is_enterable(next, 1));
        let Some(cost) = step_cost else {
            warn!(%next, tick = self.ticks, "next cell no longer enterable, replanning");
            self.transition(ControllerState::Replanning);
            return;
        };
        if let Err(err) = self.agent.try_step(next, cost) {
            warn!(%err, %next, "step unaffordable, replanning");
            self.transition(ControllerState::Replanning);
            return;
        }

        self.remaining_cost = self.remaining_cost.saturating_sub(cost);
        self.advance_world();
        self.consecutive_replans = 0;
        debug!(cell = %next, fuel = self.agent.fuel(), tick = self.ticks, "stepped");
        if next == goal {
            self.arrive();
        }
    }

    fn replan(&mut self) {
        let Some(goal) = self.agent.current_goal() else {
            self.transition(ControllerState::Arrived);
            return;
        };
        self.consecutive_replans += 1;
        self.replans += 1;
        if self.consecutive_replans > self.config.controller.max_replans {
            self.stuck(StuckReason::ReplanLimitExceeded, None);
            return;
        }
        warn!(
            attempt = self.consecutive_replans,
            position = %self.agent.position(),
            %goal,
            "replanning"
        );

        let seed = matches!(self.planner, Planner::Annealing(_)).then(|| self.agent.remaining_path());
        match self.plan_to(goal, seed.as_deref()) {
            Ok(path) => self.commit(path),
            Err(err) if err.is_no_path() => {
                if self.fuel_rules_out(goal) {
                    self.stuck(StuckReason::FuelExhausted, Some(err.to_string()));
                } else {
                    // Blocked for now; obstacles may clear.
                    debug!(tick = self.ticks, "no route this tick, waiting");
                    self.advance_world();
                }
            }
            Err(err) => self.stuck(StuckReason::from_plan_error(&err), Some(err.to_string())),
        }
    }

    fn plan_to(&mut self, goal: Position, seed: Option<&[Position]>) -> PlanResult<Path> {
        let request = PlanRequest::new(self.agent.position(), goal).with_fuel_ceiling(self.agent.fuel());
        planner::plan_with_fallback(&self.planner, &request, &self.world.snapshot(), seed, &mut self.rng)
    }

    /// True when even the cheapest route on the static grid costs more than the fuel left.
    /// Moving obstacles are ignored; they can hold the agent up but never make a route dearer.
    fn fuel_rules_out(&mut self, goal: Position) -> bool {
        let no_traffic = ObstacleTracker::new(0);
        let snapshot = Snapshot {
            grid: self.world.grid(),
            obstacles: &no_traffic,
        };
        let request = PlanRequest::new(self.agent.position(), goal);
        Planner::Ucs
            .plan(&request, &snapshot, &mut self.rng)
            .is_ok_and(|path| path.cost() > self.agent.fuel())
    }

    /// Whether the rest of the committed path is still valid and priced as planned.
    fn committed_path_holds(&self, goal: Position) -> bool {
        let cells = self.agent.remaining_path();
        let snapshot = self.world.snapshot();
        validate_cells(&cells, &snapshot, self.agent.position(), goal).is_ok()
            && path_cost(snapshot.grid, &cells).is_ok_and(|cost| cost == self.remaining_cost)
    }

    fn commit(&mut self, path: Path) {
        debug!(cost = path.cost(), cells = path.len(), "committing path");
        self.agent.commit(&path);
        self.remaining_cost = path.cost();
        self.world_changed = false;
        self.transition(ControllerState::Executing);
    }

    fn fail(&mut self, err: PlanError, goal: Position) {
        let reason = if err.is_no_path() && self.fuel_rules_out(goal) {
            StuckReason::FuelExhausted
        } else {
            StuckReason::from_plan_error(&err)
        };
        self.stuck(reason, Some(err.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{
        obstacles::{Motion, MovingObstacle},
        terrain::{Connectivity, Terrain},
    };

    fn p(x: usize, y: usize) -> Position {
        Position { x, y }
    }

    fn controller(world: World, agent: Agent) -> Controller<StdRng> {
        Controller::new(world, agent, SimulationConfig::default(), StdRng::seed_from_u64(1)).unwrap()
    }

    #[test]
    fn delivers_pickup_then_destination() {
        let world = World::open(5, 5, Connectivity::Four);
        let agent = Agent::new(p(0, 0), 100)
            .with_pickups([p(4, 0)])
            .with_destinations([p(4, 4)]);
        let outcome = controller(world, agent).run();
        assert!(outcome.is_arrived());
        assert_eq!(outcome.final_position, p(4, 4));
        assert_eq!((outcome.picked_up, outcome.delivered), (1, 1));
        assert_eq!(outcome.cost_travelled, 8);
        assert_eq!(outcome.fuel_remaining, 92);
        assert_eq!(outcome.steps, 8);
        assert_eq!(outcome.ticks, 8);
        assert_eq!(outcome.replans, 0);
    }

    #[test]
    fn starts_in_planning_and_executes() {
        let world = World::open(3, 1, Connectivity::Four);
        let mut controller = controller(world, Agent::new(p(0, 0), 10).with_destinations([p(2, 0)]));
        assert_eq!(controller.state(), ControllerState::Planning);
        assert_eq!(controller.tick(), ControllerState::Executing);
        assert_eq!(controller.tick(), ControllerState::Executing);
        assert_eq!(controller.agent().position(), p(1, 0));
        assert_eq!(controller.tick(), ControllerState::Arrived);
        assert!(controller.is_finished());
    }

    #[test]
    fn insufficient_fuel_is_reported() {
        let world = World::open(5, 1, Connectivity::Four);
        let outcome = controller(world, Agent::new(p(0, 0), 3).with_destinations([p(4, 0)])).run();
        assert_eq!(outcome.stuck_reason, Some(StuckReason::FuelExhausted));
        assert_eq!(outcome.final_position, p(0, 0));
        assert_eq!(outcome.fuel_remaining, 3);
    }

    #[test]
    fn walled_goal_is_no_path() {
        let mut world = World::open(3, 3, Connectivity::Four);
        for y in 0..3 {
            world.grid_mut().set_terrain(p(1, y), Terrain::Water).unwrap();
        }
        let outcome = controller(world, Agent::new(p(0, 0), 100).with_destinations([p(2, 2)])).run();
        assert_eq!(outcome.stuck_reason, Some(StuckReason::NoPathFound));
        assert_eq!(outcome.steps, 0);
    }

    #[test]
    fn water_passable_setting_opens_the_wall() {
        let mut world = World::open(3, 1, Connectivity::Four);
        world.grid_mut().set_terrain(p(1, 0), Terrain::Water).unwrap();
        let mut config = SimulationConfig::default();
        config.movement.water_passable = true;
        let agent = Agent::new(p(0, 0), 100).with_destinations([p(2, 0)]);
        let mut controller = Controller::new(world, agent, config, StdRng::seed_from_u64(0)).unwrap();
        let outcome = controller.run();
        assert!(outcome.is_arrived());
        assert_eq!(outcome.cost_travelled, 11);
    }

    #[test]
    fn out_of_bounds_goal_is_rejected() {
        let world = World::open(3, 3, Connectivity::Four);
        let agent = Agent::new(p(0, 0), 10).with_destinations([p(5, 5)]);
        let result = Controller::new(world, agent, SimulationConfig::default(), StdRng::seed_from_u64(0));
        assert!(matches!(result, Err(PlanError::InvalidCell(_))));
    }

    #[test]
    fn injected_obstacle_triggers_replan() {
        let world = World::open(3, 3, Connectivity::Four);
        let mut controller = controller(world, Agent::new(p(0, 0), 100).with_destinations([p(2, 0)]));
        assert_eq!(controller.tick(), ControllerState::Executing);
        let next = controller.agent().next_step().unwrap();
        controller.world_mut().grid_mut().add_obstacle(next).unwrap();

        assert_eq!(controller.tick(), ControllerState::Replanning);
        assert_eq!(controller.tick(), ControllerState::Executing);
        let outcome = controller.run();
        assert!(outcome.is_arrived());
        assert_eq!(outcome.replans, 1);
        assert!(!outcome.visited.contains(&next));
    }

    #[test]
    fn changes_off_the_path_keep_the_plan() {
        let world = World::open(3, 3, Connectivity::Four);
        let mut controller = controller(world, Agent::new(p(0, 0), 100).with_destinations([p(2, 0)]));
        controller.tick();
        controller.world_mut().grid_mut().set_terrain(p(2, 2), Terrain::Mud).unwrap();
        assert_eq!(controller.tick(), ControllerState::Executing);
        assert_eq!(controller.run().replans, 0);
    }

    #[test]
    fn cost_change_on_the_path_triggers_replan() {
        let world = World::open(5, 1, Connectivity::Four);
        let mut controller = controller(world, Agent::new(p(0, 0), 100).with_destinations([p(4, 0)]));
        controller.tick();
        controller.world_mut().grid_mut().set_terrain(p(2, 0), Terrain::Mud).unwrap();
        assert_eq!(controller.tick(), ControllerState::Replanning);
        let outcome = controller.run();
        assert!(outcome.is_arrived());
        assert_eq!(outcome.replans, 1);
        assert_eq!(outcome.cost_travelled, 8);
    }

    #[test]
    fn blocked_goal_after_injection_is_invalid_request() {
        let world = World::open(3, 1, Connectivity::Four);
        let mut controller = controller(world, Agent::new(p(0, 0), 100).with_destinations([p(2, 0)]));
        controller.tick();
        controller.world_mut().grid_mut().add_obstacle(p(1, 0)).unwrap();
        controller.world_mut().grid_mut().add_obstacle(p(2, 0)).unwrap();
        let outcome = controller.run();
        assert_eq!(outcome.stuck_reason, Some(StuckReason::InvalidRequest));
    }

    #[test]
    fn waits_for_crossing_obstacle() {
        // One-cell corridor in column 0; column 1 is water.
        let mut world = World::open(2, 3, Connectivity::Four);
        for y in 0..3 {
            world.grid_mut().set_terrain(p(1, y), Terrain::Water).unwrap();
        }
        let mut controller = controller(world, Agent::new(p(0, 0), 100).with_destinations([p(0, 2)]));
        assert_eq!(controller.tick(), ControllerState::Executing);

        // Sits in the corridor for two ticks, then leaves for good.
        let route = vec![p(0, 1), p(0, 1), p(1, 1)];
        let obstacle = MovingObstacle::new(route, 1, Motion::OneShot).unwrap();
        controller.world_mut().tracker_mut().add(obstacle);

        assert_eq!(controller.tick(), ControllerState::Replanning);
        assert_eq!(controller.tick(), ControllerState::Replanning);
        assert_eq!(controller.ticks(), 1);
        assert_eq!(controller.agent().position(), p(0, 0));
        assert_eq!(controller.tick(), ControllerState::Executing);

        let outcome = controller.run();
        assert!(outcome.is_arrived(), "{outcome:?}");
        assert_eq!(outcome.replans, 2);
        assert_eq!(outcome.steps, 2);
        assert_eq!(outcome.ticks, 3);
    }

    #[test]
    fn passing_obstacle_is_waited_out_not_blamed_on_fuel() {
        // The only affordable route runs down column 0; the mud detour costs more than the fuel.
        let mut world = World::open(3, 3, Connectivity::Four);
        for y in 0..3 {
            world.grid_mut().set_terrain(p(1, y), Terrain::Mud).unwrap();
        }
        let mut controller = controller(world, Agent::new(p(0, 0), 10).with_destinations([p(0, 2)]));
        assert_eq!(controller.tick(), ControllerState::Executing);

        let route = vec![p(0, 1), p(0, 1), p(1, 1)];
        let obstacle = MovingObstacle::new(route, 1, Motion::OneShot).unwrap();
        controller.world_mut().tracker_mut().add(obstacle);

        let outcome = controller.run();
        assert!(outcome.is_arrived(), "{outcome:?}");
        assert_eq!(outcome.cost_travelled, 2);
        assert_eq!(outcome.fuel_remaining, 8);
        assert_eq!(outcome.replans, 2);
    }

    #[test]
    fn tick_limit_ends_the_run() {
        let world = World::open(10, 1, Connectivity::Four);
        let mut config = SimulationConfig::default();
        config.controller.max_ticks = 3;
        let agent = Agent::new(p(0, 0), 100).with_destinations([p(9, 0)]);
        let outcome = Controller::new(world, agent, config, StdRng::seed_from_u64(0))
            .unwrap()
            .run();
        assert_eq!(outcome.stuck_reason, Some(StuckReason::TickLimitExceeded));
        assert_eq!(outcome.ticks, 3);
        assert_eq!(outcome.final_position, p(3, 0));
    }

    #[test]
    fn unreachable_goal_at_start_is_no_path() {
        let mut world = World::open(3, 1, Connectivity::Four);
        world
            .tracker_mut()
            .add(MovingObstacle::new(vec![p(1, 0)], 1, Motion::Cyclic).unwrap());
        let outcome = controller(world, Agent::new(p(0, 0), 100).with_destinations([p(2, 0)])).run();
        assert_eq!(outcome.stuck_reason, Some(StuckReason::NoPathFound));
        assert_eq!(outcome.replans, 0);
    }

    #[test]
    fn replan_limit_ends_the_run() {
        let world = World::open(3, 1, Connectivity::Four);
        let mut controller = controller(world, Agent::new(p(0, 0), 100).with_destinations([p(2, 0)]));
        controller.tick();
        // A parked obstacle closes the only route after the plan was committed.
        controller
            .world_mut()
            .tracker_mut()
            .add(MovingObstacle::new(vec![p(1, 0)], 1, Motion::Cyclic).unwrap());
        let outcome = controller.run();
        assert_eq!(outcome.stuck_reason, Some(StuckReason::ReplanLimitExceeded));
        assert_eq!(outcome.replans, 6);
        assert_eq!(outcome.ticks, 5);
        assert_eq!(outcome.final_position, p(0, 0));
    }

    #[test]
    fn rejected_outcome_reports_agent() {
        let agent = Agent::new(p(1, 1), 7);
        let outcome = DeliveryOutcome::rejected(
            &agent,
            PlanError::InvalidConfig("cooling_rate".to_string()),
        );
        assert_eq!(outcome.status, DeliveryStatus::Stuck);
        assert_eq!(outcome.stuck_reason, Some(StuckReason::InvalidRequest));
        assert_eq!(outcome.final_position, p(1, 1));
        assert_eq!(outcome.fuel_remaining, 7);
    }
}
