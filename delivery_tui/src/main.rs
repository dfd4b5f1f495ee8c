mod viewer;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use delivery_core::{
    Position,
    agent::Agent,
    benchmark::BenchmarkMap,
    config::{PlannerConfig, SimulationConfig},
    controller::{Controller, DeliveryOutcome},
    environment::{World, load_world_from_string},
    plan_path,
    planner::{Algorithm, Heuristic},
    run_delivery,
    terrain::Connectivity,
};
use rand::{SeedableRng, rngs::StdRng};
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
    time::Instant,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Delivery path planning on a weighted grid", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plan one path on the map as loaded and print it as JSON
    Plan(PlanArgs),
    /// Run a delivery to completion and print the outcome as JSON
    Run(RunArgs),
    /// Run a delivery in the terminal viewer
    Watch {
        #[command(flatten)]
        run: RunArgs,
        /// Milliseconds between simulation ticks
        #[arg(long, default_value_t = 250)]
        tick_ms: u64,
    },
    /// Run every algorithm on the same deliveries and print the outcomes as a JSON array
    Compare(CompareArgs),
}

#[derive(clap::Args, Debug)]
struct PlanArgs {
    /// Map file to load
    #[arg(short, long, value_name = "MAP_FILE")]
    map: PathBuf,
    #[arg(long, value_parser = parse_position, value_name = "X,Y")]
    start: Position,
    #[arg(long, value_parser = parse_position, value_name = "X,Y")]
    goal: Position,
    /// bfs, ucs, a_star or sa
    #[arg(short, long, default_value = "a_star")]
    algorithm: Algorithm,
    /// manhattan or euclidean; defaults to whichever is admissible
    #[arg(long)]
    heuristic: Option<Heuristic>,
    /// Seed for simulated annealing
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Allow diagonal moves
    #[arg(long)]
    diagonal: bool,
    /// Treat water as passable
    #[arg(long)]
    water_passable: bool,
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Map file to load
    #[arg(short, long, value_name = "MAP_FILE")]
    map: PathBuf,
    #[arg(long, value_parser = parse_position, value_name = "X,Y")]
    start: Position,
    #[arg(long)]
    fuel: u32,
    /// Pickup cell, visited before any dropoff (repeatable)
    #[arg(long = "pickup", value_parser = parse_position, value_name = "X,Y")]
    pickups: Vec<Position>,
    /// Dropoff cell (repeatable)
    #[arg(long = "dropoff", value_parser = parse_position, value_name = "X,Y", required = true)]
    dropoffs: Vec<Position>,
    /// Overrides the configured algorithm
    #[arg(short, long)]
    algorithm: Option<Algorithm>,
    /// Overrides the configured seed
    #[arg(long)]
    seed: Option<u64>,
    /// Simulation settings in TOML
    #[arg(short, long, value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,
    /// Also write the outcome JSON to this file
    #[arg(long, value_name = "REPORT_FILE")]
    report: Option<PathBuf>,
}

impl RunArgs {
    fn settings(&self) -> Result<SimulationConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => SimulationConfig::default(),
        };
        if let Some(algorithm) = self.algorithm {
            config = config.with_algorithm(algorithm);
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        config.validate().context("invalid simulation settings")?;
        Ok(config)
    }

    fn agent(&self) -> Agent {
        Agent::new(self.start, self.fuel)
            .with_pickups(self.pickups.iter().copied())
            .with_destinations(self.dropoffs.iter().copied())
    }
}

#[derive(clap::Args, Debug)]
struct CompareArgs {
    /// Map file to include (repeatable); needs --start, --fuel and --dropoff
    #[arg(short, long = "map", value_name = "MAP_FILE")]
    maps: Vec<PathBuf>,
    /// Built-in map to include (repeatable); all of them when no map file is given
    #[arg(long = "benchmark", value_name = "NAME")]
    benchmarks: Vec<BenchmarkMap>,
    #[arg(long, value_parser = parse_position, value_name = "X,Y")]
    start: Option<Position>,
    #[arg(long)]
    fuel: Option<u32>,
    #[arg(long = "pickup", value_parser = parse_position, value_name = "X,Y")]
    pickups: Vec<Position>,
    #[arg(long = "dropoff", value_parser = parse_position, value_name = "X,Y")]
    dropoffs: Vec<Position>,
    /// Overrides the configured seed
    #[arg(long)]
    seed: Option<u64>,
    /// Simulation settings in TOML; the algorithm setting is ignored
    #[arg(short, long, value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,
    /// Also write the JSON array to this file
    #[arg(long, value_name = "REPORT_FILE")]
    report: Option<PathBuf>,
}

impl CompareArgs {
    fn settings(&self) -> Result<SimulationConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => SimulationConfig::default(),
        };
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        config.validate().context("invalid simulation settings")?;
        Ok(config)
    }

    /// The agent driven across every map file.
    fn agent(&self) -> Result<Agent> {
        let (Some(start), Some(fuel)) = (self.start, self.fuel) else {
            bail!("map files need --start and --fuel");
        };
        if self.dropoffs.is_empty() {
            bail!("map files need at least one --dropoff");
        }
        Ok(Agent::new(start, fuel)
            .with_pickups(self.pickups.iter().copied())
            .with_destinations(self.dropoffs.iter().copied()))
    }

    fn benchmark_maps(&self) -> Vec<BenchmarkMap> {
        if self.maps.is_empty() && self.benchmarks.is_empty() {
            BenchmarkMap::ALL.to_vec()
        } else {
            self.benchmarks.clone()
        }
    }
}

/// One algorithm's delivery on one map.
#[derive(Serialize)]
struct ComparisonRow {
    map: String,
    algorithm: Algorithm,
    elapsed_ms: f64,
    #[serde(flatten)]
    outcome: DeliveryOutcome,
}

#[derive(Serialize)]
struct PlanReport<'a> {
    algorithm: Algorithm,
    start: Position,
    goal: Position,
    cost: u32,
    moves: usize,
    cells: &'a [Position],
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    match args.command {
        Command::Plan(plan) => {
            init_logging();
            plan_command(&plan)
        }
        Command::Run(run) => {
            init_logging();
            run_command(&run)
        }
        // The viewer owns the terminal, so nothing logs to stderr.
        Command::Watch { run, tick_ms } => watch_command(&run, tick_ms),
        Command::Compare(compare) => {
            init_logging();
            compare_command(&compare)
        }
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}

fn plan_command(args: &PlanArgs) -> Result<ExitCode> {
    let connectivity = if args.diagonal {
        Connectivity::Eight
    } else {
        Connectivity::Four
    };
    let mut world = load_world(&args.map, connectivity)?;
    world.grid_mut().set_water_passable(args.water_passable);

    let heuristic = args
        .heuristic
        .unwrap_or_else(|| Heuristic::default_for(connectivity));
    let config = PlannerConfig::new(args.algorithm).with_heuristic(heuristic);
    let mut rng = StdRng::seed_from_u64(args.seed);

    let path = plan_path(&world, args.start, args.goal, &config, &mut rng)
        .with_context(|| format!("planning from {} to {} failed", args.start, args.goal))?;
    info!(algorithm = %args.algorithm, cost = path.cost(), moves = path.moves(), "planned");

    let report = PlanReport {
        algorithm: args.algorithm,
        start: args.start,
        goal: args.goal,
        cost: path.cost(),
        moves: path.moves(),
        cells: path.cells(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::SUCCESS)
}

fn run_command(args: &RunArgs) -> Result<ExitCode> {
    let config = args.settings()?;
    let world = load_world(&args.map, config.movement.connectivity)?;
    info!(
        algorithm = %config.planner.algorithm,
        fuel = args.fuel,
        goals = args.pickups.len() + args.dropoffs.len(),
        "starting delivery"
    );

    let outcome = run_delivery(world, args.agent(), &config);
    report_outcome(&outcome, args.report.as_deref())
}

fn watch_command(args: &RunArgs, tick_ms: u64) -> Result<ExitCode> {
    let config = args.settings()?;
    let world = load_world(&args.map, config.movement.connectivity)?;
    let rng = StdRng::seed_from_u64(config.controller.seed);
    let controller =
        Controller::new(world, args.agent(), config, rng).context("delivery rejected before start")?;

    let outcome = viewer::watch(controller, tick_ms)?;
    report_outcome(&outcome, args.report.as_deref())
}

fn compare_command(args: &CompareArgs) -> Result<ExitCode> {
    let config = args.settings()?;
    let mut rows = Vec::new();

    if !args.maps.is_empty() {
        let agent = args.agent()?;
        for path in &args.maps {
            let world = load_world(path, config.movement.connectivity)?;
            rows.extend(compare_on(&path.display().to_string(), &world, &agent, &config));
        }
    }

    // Built-in maps start the agent in water.
    let mut benchmark_config = config.clone();
    benchmark_config.movement.water_passable = true;
    for map in args.benchmark_maps() {
        let mut rng = StdRng::seed_from_u64(config.controller.seed);
        let world = map
            .world(&mut rng)
            .with_context(|| format!("failed to build benchmark map {map}"))?;
        rows.extend(compare_on(map.name(), &world, &map.agent(), &benchmark_config));
    }

    let arrived = rows.iter().filter(|row| row.outcome.is_arrived()).count();
    info!(arrived, runs = rows.len(), "comparison finished");

    let json = serde_json::to_string_pretty(&rows)?;
    println!("{json}");
    if let Some(path) = &args.report {
        fs::write(path, &json)
            .with_context(|| format!("failed to write report {}", path.display()))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Runs the delivery once per algorithm on fresh copies of `world` and `agent`.
fn compare_on(map: &str, world: &World, agent: &Agent, config: &SimulationConfig) -> Vec<ComparisonRow> {
    Algorithm::ALL
        .into_iter()
        .map(|algorithm| {
            let settings = config.clone().with_algorithm(algorithm);
            let started = Instant::now();
            let outcome = run_delivery(world.clone(), agent.clone(), &settings);
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            info!(
                map,
                %algorithm,
                status = ?outcome.status,
                cost = outcome.cost_travelled,
                elapsed_ms,
                "compared"
            );
            ComparisonRow {
                map: map.to_string(),
                algorithm,
                elapsed_ms,
                outcome,
            }
        })
        .collect()
}

fn report_outcome(outcome: &DeliveryOutcome, report: Option<&Path>) -> Result<ExitCode> {
    let json = serde_json::to_string_pretty(outcome)?;
    println!("{json}");
    if let Some(path) = report {
        fs::write(path, &json)
            .with_context(|| format!("failed to write report {}", path.display()))?;
    }
    Ok(if outcome.is_arrived() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn load_world(path: &Path, connectivity: Connectivity) -> Result<World> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read map file {}", path.display()))?;
    let world = load_world_from_string(&text, connectivity)
        .with_context(|| format!("failed to load map {}", path.display()))?;
    let grid = world.grid();
    let terrain = grid
        .terrain_histogram()
        .map(|(class, count)| format!("{class:?}={count}"))
        .join(" ");
    info!(
        map = %path.display(),
        width = grid.width(),
        height = grid.height(),
        walls = grid.static_obstacle_count(),
        moving = world.tracker().obstacles().len(),
        %terrain,
        "loaded map"
    );
    Ok(world)
}

fn load_config(path: &Path) -> Result<SimulationConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("failed to parse config {}", path.display()))
}

fn parse_position(s: &str) -> Result<Position, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected 'x,y', got '{s}'"))?;
    let coordinate = |part: &str| {
        part.trim()
            .parse::<usize>()
            .map_err(|_| format!("'{}' is not a grid coordinate", part.trim()))
    };
    Ok(Position::new(coordinate(x)?, coordinate(y)?))
}
