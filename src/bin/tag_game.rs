//! Tag game learner binary.
//!
//! Plays against a running tag game server and learns with tabular TD
//! control. Q values are resumed from and saved to the output directory, so
//! repeated runs keep improving the same table.
//!
//! Usage:
//!   cargo run --release --bin tag_game -- [OPTIONS]
//!
//! Options:
//!   --host <HOST>          Server host (default: 127.0.0.1)
//!   --port <PORT>          Server port (default: 12345)
//!   --episodes <N>         Training episodes (default: 50000)
//!   --epsilon <E>          Exploration rate (default: 0.12)
//!   --step-size <A>        Step size α (default: 0.28)
//!   --discount <G>         Discount rate γ (default: 1.0)
//!   --distance-unit <PX>   Width of one distance band (default: 100)
//!   --output <DIR>         Output directory (default: output)
//!   --seed <N>             Random seed (optional)
//!   --verbose              Debug logging

use std::env;
use std::path::PathBuf;
use std::process;

use gpi_solver::envs::tag_game::{TagGame, TcpConnector, DEFAULT_HOST, DEFAULT_PORT};
use gpi_solver::gpi::{
    persistence, Algorithm, DeterministicPolicy, GpiSolver, Result, SolverConfig,
    StochasticPolicy, ValueStrategy,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const Q_FILE: &str = "taggame_q_function.json";
const POLICY_FILE: &str = "taggame_optimal_policy.json";

#[derive(Debug)]
struct Options {
    host: String,
    port: u16,
    episodes: u64,
    epsilon: f64,
    step_size: f64,
    discount: f64,
    distance_unit: f64,
    output_dir: PathBuf,
    seed: Option<u64>,
    verbose: bool,
}

fn main() {
    let args: Vec<String> = env::args().collect();

    let mut options = Options {
        host: DEFAULT_HOST.to_string(),
        port: DEFAULT_PORT,
        episodes: 50_000,
        epsilon: 0.12,
        step_size: 0.28,
        discount: 1.0,
        distance_unit: 100.0,
        output_dir: PathBuf::from("output"),
        seed: None,
        verbose: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                i += 1;
                if i < args.len() {
                    options.host = args[i].clone();
                }
            }
            "--port" | "-p" => {
                i += 1;
                if i < args.len() {
                    options.port = args[i].parse().unwrap_or(options.port);
                }
            }
            "--episodes" | "-e" => {
                i += 1;
                if i < args.len() {
                    options.episodes = args[i].parse().unwrap_or(options.episodes);
                }
            }
            "--epsilon" => {
                i += 1;
                if i < args.len() {
                    options.epsilon = args[i].parse().unwrap_or(options.epsilon);
                }
            }
            "--step-size" => {
                i += 1;
                if i < args.len() {
                    options.step_size = args[i].parse().unwrap_or(options.step_size);
                }
            }
            "--discount" => {
                i += 1;
                if i < args.len() {
                    options.discount = args[i].parse().unwrap_or(options.discount);
                }
            }
            "--distance-unit" => {
                i += 1;
                if i < args.len() {
                    options.distance_unit = args[i].parse().unwrap_or(options.distance_unit);
                }
            }
            "--output" | "-o" => {
                i += 1;
                if i < args.len() {
                    options.output_dir = PathBuf::from(&args[i]);
                }
            }
            "--seed" | "-s" => {
                i += 1;
                if i < args.len() {
                    options.seed = args[i].parse().ok();
                }
            }
            "--verbose" | "-v" => {
                options.verbose = true;
            }
            "--help" | "-h" => {
                print_help();
                return;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                process::exit(2);
            }
        }
        i += 1;
    }

    let level = if options.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Logging was already initialized");
    }

    println!("=================================================");
    println!("  Tag Game Learner");
    println!("=================================================");
    println!();

    if let Err(e) = run(&options) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(options: &Options) -> Result<()> {
    let connector = TcpConnector::new(options.host.clone(), options.port);
    println!("Server: {}", connector.address());
    println!("Episodes: {}", options.episodes);
    println!("Epsilon: {}", options.epsilon);
    println!("Step size: {}", options.step_size);
    println!("Output: {}", options.output_dir.display());
    println!();

    let mut env = TagGame::new(Box::new(connector)).with_distance_unit(options.distance_unit)?;
    env.connect().map_err(|e| {
        eprintln!("Failed to connect to the tag game. Start the game first, then the learner.");
        e
    })?;

    let mut values = ValueStrategy::tabular();
    values.initialize(&env)?;
    let q_path = options.output_dir.join(Q_FILE);
    if persistence::load_q_values(values.tabular_values_mut()?, &q_path)? {
        println!("Resumed Q values from {}", q_path.display());
    }

    let mut policy = StochasticPolicy::new(options.epsilon, options.seed)?;
    let mut config = SolverConfig::default()
        .with_algorithm(Algorithm::TdControl)
        .with_episodes(options.episodes)
        .with_step_size(options.step_size)
        .with_discount(options.discount)
        .with_log_interval(100);
    if let Some(s) = options.seed {
        config = config.with_seed(s);
    }

    let greedy = {
        let mut solver = GpiSolver::new(&mut env, &mut policy, &mut values, config)?;

        let pb = ProgressBar::new(options.episodes);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .map(|style| style.progress_chars("#>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        let outcome = solver.train_with_callback(1, |stats| {
            pb.set_position(stats.episodes);
            pb.set_message(format!("survived {} steps", stats.last_episode_steps));
        });
        pb.finish_and_clear();

        // A dropped connection ends the run but keeps what was learned.
        match outcome {
            Ok(stats) => println!(
                "Training complete: {} episodes in {:.2}s",
                stats.episodes, stats.elapsed_seconds
            ),
            Err(e) => warn!(error = %e, "training interrupted, saving progress"),
        }

        DeterministicPolicy::from_mapping(solver.greedy_policy()?)
    };

    env.disconnect()?;

    persistence::save_q_values(values.tabular_values()?, &q_path)?;
    persistence::save_policy(&greedy, options.output_dir.join(POLICY_FILE))?;
    info!(dir = %options.output_dir.display(), "results saved");
    println!("Done!");
    Ok(())
}

fn print_help() {
    println!("Tag Game Learner");
    println!();
    println!("Usage: tag_game [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --host <HOST>            Server host (default: 127.0.0.1)");
    println!("  -p, --port <PORT>        Server port (default: 12345)");
    println!("  -e, --episodes <N>       Training episodes (default: 50000)");
    println!("  --epsilon <E>            Exploration rate (default: 0.12)");
    println!("  --step-size <A>          Step size α (default: 0.28)");
    println!("  --discount <G>           Discount rate γ (default: 1.0)");
    println!("  --distance-unit <PX>     Width of one distance band (default: 100)");
    println!("  -o, --output <DIR>       Output directory (default: output)");
    println!("  -s, --seed <N>           Random seed");
    println!("  -v, --verbose            Debug logging");
    println!("  -h, --help               Show this help");
    println!();
    println!("Examples:");
    println!("  # Start the game server, then:");
    println!("  tag_game --episodes 1000 --output runs/tag");
}
