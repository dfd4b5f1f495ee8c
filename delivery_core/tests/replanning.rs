use delivery_core::{
    Position,
    agent::Agent,
    config::SimulationConfig,
    controller::{Controller, ControllerState, StuckReason},
    environment::World,
    obstacles::{Motion, MovingObstacle},
    planner::Algorithm,
    terrain::{Connectivity, Terrain},
};
use rand::{SeedableRng, rngs::StdRng};

fn p(x: usize, y: usize) -> Position {
    Position::new(x, y)
}

fn start(world: World, agent: Agent, config: SimulationConfig) -> Controller<StdRng> {
    let mut controller = Controller::new(world, agent, config, StdRng::seed_from_u64(17)).unwrap();
    assert_eq!(controller.tick(), ControllerState::Executing);
    controller
}

/// Parks a moving obstacle on the agent's next cell.
fn block_next_cell(controller: &mut Controller<StdRng>) -> Position {
    let next = controller.agent().next_step().unwrap();
    let obstacle = MovingObstacle::new(vec![next], 1, Motion::Cyclic).unwrap();
    controller.world_mut().tracker_mut().add(obstacle);
    next
}

#[test]
fn obstacle_moving_onto_next_cell_forces_a_replan() {
    for algorithm in Algorithm::ALL {
        let world = World::open(5, 5, Connectivity::Four);
        let agent = Agent::new(p(0, 0), 100).with_destinations([p(4, 0)]);
        let mut controller = start(world, agent, SimulationConfig::default().with_algorithm(algorithm));
        let blocked = block_next_cell(&mut controller);

        assert_eq!(controller.tick(), ControllerState::Replanning, "{algorithm}");
        let outcome = controller.run();
        assert!(outcome.is_arrived(), "{algorithm}: {outcome:?}");
        assert!(outcome.replans >= 1);
        assert!(!outcome.visited.contains(&blocked));
    }
}

#[test]
fn replan_that_cannot_be_afforded_reports_fuel() {
    let world = World::open(5, 1, Connectivity::Four);
    let agent = Agent::new(p(0, 0), 4).with_destinations([p(4, 0)]);
    let mut controller = start(world, agent, SimulationConfig::default());
    controller
        .world_mut()
        .grid_mut()
        .set_terrain(p(1, 0), Terrain::Mud)
        .unwrap();

    let outcome = controller.run();
    assert_eq!(outcome.stuck_reason, Some(StuckReason::FuelExhausted));
    assert_eq!(outcome.final_position, p(0, 0));
    assert_eq!(outcome.fuel_remaining, 4);
}

#[test]
fn fuel_runs_out_mid_route() {
    // Enough fuel for the original plan; mud appears two cells ahead after the first step.
    let world = World::open(6, 1, Connectivity::Four);
    let agent = Agent::new(p(0, 0), 5).with_destinations([p(5, 0)]);
    let mut controller = start(world, agent, SimulationConfig::default());
    assert_eq!(controller.tick(), ControllerState::Executing);
    controller
        .world_mut()
        .grid_mut()
        .set_terrain(p(3, 0), Terrain::Mud)
        .unwrap();

    let outcome = controller.run();
    assert_eq!(outcome.stuck_reason, Some(StuckReason::FuelExhausted));
    assert_eq!(outcome.final_position, p(1, 0));
    assert_eq!(outcome.fuel_remaining, 4);
    assert_eq!(outcome.fuel_used, 1);
}

#[test]
fn replan_counter_resets_after_progress() {
    // Two separate blockages, each cleared by one replan; the limit of one is never exceeded.
    let world = World::open(5, 3, Connectivity::Four);
    let agent = Agent::new(p(0, 1), 100).with_destinations([p(4, 1)]);
    let mut config = SimulationConfig::default();
    config.controller.max_replans = 1;
    let mut controller = start(world, agent, config);

    block_next_cell(&mut controller);
    assert_eq!(controller.tick(), ControllerState::Replanning);
    assert_eq!(controller.tick(), ControllerState::Executing);
    assert_eq!(controller.tick(), ControllerState::Executing);

    block_next_cell(&mut controller);
    assert_eq!(controller.tick(), ControllerState::Replanning);
    let outcome = controller.run();
    assert!(outcome.is_arrived(), "{outcome:?}");
    assert_eq!(outcome.replans, 2);
}

#[test]
fn stochastic_obstacles_are_avoided_conservatively() {
    let mut world = World::open(5, 3, Connectivity::Four);
    // Patrols the top two cells of column 2; (2, 2) stays free.
    let route = vec![p(2, 0), p(2, 1)];
    let obstacle = MovingObstacle::new(route, 1, Motion::Stochastic { stall_chance: 0.4 }).unwrap();
    world.tracker_mut().add(obstacle);
    let agent = Agent::new(p(0, 1), 100).with_destinations([p(4, 1)]);
    let mut controller =
        Controller::new(world, agent, SimulationConfig::default(), StdRng::seed_from_u64(99)).unwrap();

    while !controller.is_finished() {
        let before = controller.agent().position();
        controller.tick();
        let after = controller.agent().position();
        if before != after {
            assert!(!controller.world().tracker().positions().contains(&after));
        }
    }
    let outcome = controller.outcome();
    assert!(outcome.is_arrived(), "{outcome:?}");
    assert!(!outcome.visited.contains(&p(2, 1)));
    // Predictions only narrow as the obstacle moves, so the first plan holds.
    assert_eq!(outcome.replans, 0);
}

#[test]
fn annealing_replans_from_the_old_path() {
    let world = World::open(6, 4, Connectivity::Four);
    let agent = Agent::new(p(0, 0), 100).with_destinations([p(5, 3)]);
    let config = SimulationConfig::default().with_algorithm(Algorithm::SimulatedAnnealing);
    let mut controller = start(world, agent, config);
    controller.tick();
    let blocked = block_next_cell(&mut controller);

    let outcome = controller.run();
    assert!(outcome.is_arrived(), "{outcome:?}");
    assert!(!outcome.visited.contains(&blocked));
    assert_eq!(outcome.fuel_used, outcome.cost_travelled);
}
