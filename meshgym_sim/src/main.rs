//! meshgym Simulator CLI
//!
//! Run the mesh scenario standalone (`adhoc`) or as an agent-driven
//! environment (`gym`).

use clap::{Args, Parser, Subcommand, ValueEnum};
use meshgym_env::zmq_transport::DEFAULT_PORT;
use meshgym_sim::config::{GridLayout, RandomVariable, Rectangle, RoutingProtocol};
use meshgym_sim::{
    run_adhoc, run_gym_with, AdhocConfig, AgentPolicy, AgentSource, EnvConfig, GymConfig,
    RunReport, ScenarioConfig, SeedStreams, SimError,
};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
#[cfg(not(feature = "zmq"))]
use tracing::warn;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// meshgym deterministic mesh simulator
#[derive(Parser, Debug)]
#[command(name = "meshgym-sim")]
#[command(about = "Run a wireless mesh simulation, optionally stepped by an RL agent", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print the run report as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Step-synchronized environment driven by an agent
    Gym(GymArgs),

    /// Standalone ad-hoc mesh
    Adhoc(AdhocArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum AgentArg {
    /// External agent on the ZeroMQ port
    Zmq,
    /// In-process random agent
    Random,
    /// In-process agent that always picks action 0
    First,
}

#[derive(Args, Debug)]
struct GymArgs {
    /// Port the agent listens on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    open_gym_port: u16,

    /// Run number of the random stream
    #[arg(long, default_value = "1")]
    sim_seed: u64,

    /// Global seed of the random stream
    #[arg(long, default_value = "1")]
    global_seed: u64,

    /// Simulation time in seconds
    #[arg(long, default_value = "1")]
    sim_time: f64,

    /// Seconds between environment steps
    #[arg(long, default_value = "0.1")]
    env_step_time: f64,

    /// Number of mesh nodes
    #[arg(long, default_value = "2")]
    nodes: usize,

    /// Report game over after this many steps
    #[arg(long)]
    max_steps: Option<u64>,

    /// Abort if the agent does not answer within this many milliseconds
    #[arg(long)]
    action_timeout_ms: Option<u64>,

    /// Which agent drives the environment
    #[arg(long, value_enum, default_value_t = AgentArg::Zmq)]
    agent: AgentArg,

    /// Extra argument, logged only
    #[arg(long, default_value = "0")]
    test_arg: u32,

    #[command(flatten)]
    scenario: ScenarioArgs,
}

#[derive(Args, Debug)]
struct AdhocArgs {
    /// Number of backbone nodes
    #[arg(long, default_value = "25")]
    backbone_nodes: usize,

    /// Simulation stop time in seconds (at least 10)
    #[arg(long, default_value = "20")]
    stop_time: f64,

    /// Log every course change
    #[arg(long)]
    use_course_change_callback: bool,

    /// Run number of the random stream
    #[arg(long, default_value = "1")]
    run: u64,

    /// Global seed of the random stream
    #[arg(long, default_value = "1")]
    global_seed: u64,

    #[command(flatten)]
    scenario: ScenarioArgs,
}

/// Flags shared by both programs.
#[derive(Args, Debug)]
struct ScenarioArgs {
    /// Node speed in m/s (constant:V, uniform:MIN,MAX, exponential:MEAN)
    #[arg(long, default_value = "constant:2")]
    speed: RandomVariable,

    /// Pause at the boundary in seconds
    #[arg(long, default_value = "constant:0.2")]
    pause: RandomVariable,

    /// Mobility bounds x_min,x_max,y_min,y_max
    #[arg(long, default_value = "-500,500,-500,500", allow_hyphen_values = true)]
    bounds: Rectangle,

    /// Nodes per grid row (or column)
    #[arg(long, default_value = "5")]
    grid_width: u32,

    /// Grid spacing in meters
    #[arg(long, default_value = "20")]
    grid_delta: f64,

    /// Grid fill order (row-first, column-first)
    #[arg(long, default_value = "row-first")]
    layout: GridLayout,

    /// Link range in meters
    #[arg(long, default_value = "100")]
    radio_range: f64,

    /// Routing protocol (olsr, none)
    #[arg(long, default_value = "olsr")]
    routing: RoutingProtocol,

    /// Number of CBR flows
    #[arg(long, default_value = "1")]
    flows: usize,

    /// Mobility update period in milliseconds
    #[arg(long, default_value = "100")]
    mobility_interval_ms: u64,
}

impl ScenarioArgs {
    fn into_config(self, node_count: usize, trace_course_changes: bool) -> ScenarioConfig {
        let mut config = ScenarioConfig::with_nodes(node_count);
        config.grid.grid_width = self.grid_width;
        config.grid.delta_x = self.grid_delta;
        config.grid.delta_y = self.grid_delta;
        config.grid.layout = self.layout;
        config.mobility.bounds = self.bounds;
        config.mobility.speed = self.speed;
        config.mobility.pause = self.pause;
        config.mobility.update_interval = Duration::from_millis(self.mobility_interval_ms);
        config.mobility.trace_course_changes = trace_course_changes;
        config.routing.protocol = self.routing;
        config.routing.radio_range = self.radio_range;
        config.traffic.flows = self.flows;
        config
    }
}

fn run_gym_command(args: GymArgs) -> Result<RunReport, SimError> {
    info!(test_arg = args.test_arg, "Test argument");

    let config = GymConfig {
        scenario: args.scenario.into_config(args.nodes, false),
        env: EnvConfig {
            step_interval_secs: args.env_step_time,
            max_steps: args.max_steps,
            action_timeout: args.action_timeout_ms.map(Duration::from_millis),
            ..Default::default()
        },
        sim_time_secs: args.sim_time,
        seeds: SeedStreams::new(args.global_seed, args.sim_seed),
    };
    info!(
        port = args.open_gym_port,
        sim_time = config.sim_time_secs,
        step = config.env.step_interval_secs,
        seed = args.global_seed,
        run = args.sim_seed,
        "Gym configuration"
    );

    #[cfg(not(feature = "zmq"))]
    if args.agent == AgentArg::Zmq {
        warn!("Built without the `zmq` feature: use --agent random|first or rebuild with --features zmq");
    }

    let source = match args.agent {
        AgentArg::Zmq => AgentSource::Zmq {
            port: args.open_gym_port,
        },
        AgentArg::Random => AgentSource::Local(AgentPolicy::Random),
        AgentArg::First => AgentSource::Local(AgentPolicy::First),
    };
    run_gym_with(&config, source)
}

fn run_adhoc_command(args: AdhocArgs) -> Result<RunReport, SimError> {
    let config = AdhocConfig {
        scenario: args
            .scenario
            .into_config(args.backbone_nodes, args.use_course_change_callback),
        stop_time_secs: args.stop_time,
        seeds: SeedStreams::new(args.global_seed, args.run),
    };
    run_adhoc(&config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging (RUST_LOG overrides --verbose)
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if !cli.json {
        info!("meshgym simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let result = match cli.command {
        Command::Gym(args) => run_gym_command(args),
        Command::Adhoc(args) => run_adhoc_command(args),
    };

    match result {
        Ok(report) => {
            if cli.json {
                match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        error!("Could not serialize report: {}", e);
                        return ExitCode::FAILURE;
                    }
                }
            }
            ExitCode::SUCCESS
        }
        Err(SimError::Config(e)) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("❌ Simulation failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gym_defaults_to_socket_agent() {
        let cli = Cli::try_parse_from(["meshgym-sim", "gym"]).unwrap();
        let Command::Gym(args) = cli.command else {
            panic!("expected gym");
        };
        assert_eq!(args.agent, AgentArg::Zmq);
        assert_eq!(args.open_gym_port, 5555);
        assert_eq!(args.nodes, 2);
    }

    #[test]
    fn test_adhoc_flags() {
        let cli = Cli::try_parse_from([
            "meshgym-sim",
            "--json",
            "adhoc",
            "--stop-time",
            "12",
            "--bounds",
            "-50,50,-50,50",
            "--routing",
            "none",
        ])
        .unwrap();
        assert!(cli.json);
        let Command::Adhoc(args) = cli.command else {
            panic!("expected adhoc");
        };
        assert_eq!(args.stop_time, 12.0);
        assert_eq!(args.scenario.routing, RoutingProtocol::None);
        assert_eq!(args.scenario.bounds.x_min, -50.0);
    }
}
