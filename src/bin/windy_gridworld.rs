//! Windy gridworld solver binary.
//!
//! Usage:
//!   cargo run --release --bin windy_gridworld -- [OPTIONS]
//!
//! Options:
//!   --algorithm <NAME>   td_control (default), monte_carlo_control,
//!                        approx_q_learning, approx_sarsa, approx_state_td,
//!                        n_step_td, value_iteration, policy_iteration
//!   --n-steps <N>        Horizon of n_step_td (default: 3)
//!   --episodes <N>       Training episodes
//!   --epsilon <E>        Exploration rate of the ε-greedy policy
//!   --step-size <A>      Step size α
//!   --discount <G>       Discount rate γ
//!   --config <FILE>      Solver configuration JSON file (optional)
//!   --output <DIR>       Output directory (default: output)
//!   --seed <N>           Random seed (optional)
//!   --verbose            Debug logging

use std::env;
use std::path::PathBuf;
use std::process;

use gpi_solver::envs::windy_gridworld::{Cell, GridAction, WindyGridworld};
use gpi_solver::gpi::{
    greedy_policy, one_hot, persistence, Algorithm, DeterministicPolicy, Environment,
    EpsilonGreedyPolicy, GpiSolver, LinearFunctionApproximator, PlanningConfig, PolicyIteration,
    Result, SolverConfig, ValueIteration, ValueStrategy,
};
use indicatif::{ProgressBar, ProgressStyle};
use rustc_hash::FxHashMap;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

const CELLS: usize = 70;
const MAX_ROLLOUT_STEPS: u64 = 200;

#[derive(Debug, Clone, Copy)]
enum Mode {
    Learn(Algorithm),
    ValueIteration,
    PolicyIteration,
}

#[derive(Debug)]
struct Options {
    mode: Mode,
    episodes: Option<u64>,
    epsilon: f64,
    step_size: Option<f64>,
    discount: Option<f64>,
    n_steps: Option<usize>,
    config_file: Option<String>,
    output_dir: PathBuf,
    seed: Option<u64>,
    verbose: bool,
}

fn main() {
    let args: Vec<String> = env::args().collect();

    let mut options = Options {
        mode: Mode::Learn(Algorithm::TdControl),
        episodes: None,
        epsilon: 0.1,
        step_size: None,
        discount: None,
        n_steps: None,
        config_file: None,
        output_dir: PathBuf::from("output"),
        seed: None,
        verbose: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--algorithm" | "-a" => {
                i += 1;
                if i < args.len() {
                    match parse_mode(&args[i]) {
                        Some(mode) => options.mode = mode,
                        None => {
                            eprintln!("Unsupported algorithm: {}", args[i]);
                            print_help();
                            process::exit(2);
                        }
                    }
                }
            }
            "--episodes" | "-e" => {
                i += 1;
                if i < args.len() {
                    options.episodes = args[i].parse().ok();
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
                    options.step_size = args[i].parse().ok();
                }
            }
            "--discount" => {
                i += 1;
                if i < args.len() {
                    options.discount = args[i].parse().ok();
                }
            }
            "--n-steps" | "-n" => {
                i += 1;
                if i < args.len() {
                    options.n_steps = args[i].parse().ok();
                }
            }
            "--config" | "-c" => {
                i += 1;
                if i < args.len() {
                    options.config_file = Some(args[i].clone());
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

    init_logging(options.verbose);

    println!("=================================================");
    println!("  Windy Gridworld");
    println!("=================================================");
    println!();

    let result = match options.mode {
        Mode::Learn(algorithm) => learn(algorithm, &options),
        Mode::ValueIteration | Mode::PolicyIteration => plan(&options),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn parse_mode(name: &str) -> Option<Mode> {
    match name {
        "td_control" => Some(Mode::Learn(Algorithm::TdControl)),
        "monte_carlo_control" => Some(Mode::Learn(Algorithm::MonteCarloControl)),
        "approx_q_learning" => Some(Mode::Learn(Algorithm::ApproxQLearning)),
        "approx_sarsa" => Some(Mode::Learn(Algorithm::ApproxSarsa)),
        "approx_state_td" => Some(Mode::Learn(Algorithm::ApproxStateTd)),
        "n_step_td" => Some(Mode::Learn(Algorithm::NStepTd)),
        "value_iteration" => Some(Mode::ValueIteration),
        "policy_iteration" => Some(Mode::PolicyIteration),
        _ => None,
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Logging was already initialized");
    }
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

fn solver_config(algorithm: Algorithm, options: &Options) -> Result<SolverConfig> {
    let mut config = match &options.config_file {
        Some(path) => {
            println!("Loading configuration from: {}", path);
            SolverConfig::from_json_file(path)?
        }
        None => SolverConfig::default().with_episodes(6000),
    };
    config = config.with_algorithm(algorithm);
    if let Some(episodes) = options.episodes {
        config = config.with_episodes(episodes);
    }
    if let Some(alpha) = options.step_size {
        config = config.with_step_size(alpha);
    }
    if let Some(gamma) = options.discount {
        config = config.with_discount(gamma);
    }
    if let Some(n) = options.n_steps {
        config = config.with_n_steps(n);
    }
    if let Some(seed) = options.seed {
        config = config.with_seed(seed);
    }
    Ok(config)
}

fn cell_index((row, col): Cell) -> usize {
    row * 10 + col
}

fn learn(algorithm: Algorithm, options: &Options) -> Result<()> {
    let config = solver_config(algorithm, options)?;
    let mut env = WindyGridworld::new();
    let mut policy = EpsilonGreedyPolicy::new(options.epsilon, config.seed)?;
    let mut values = match algorithm {
        Algorithm::ApproxQLearning | Algorithm::ApproxSarsa => {
            ValueStrategy::action_value(LinearFunctionApproximator::new(
                CELLS * 4,
                |&(cell, action): &(Cell, GridAction)| {
                    one_hot(cell_index(cell) * 4 + action.index(), CELLS * 4)
                },
            ))
        }
        // One weight per cell; the policy scores moves by their afterstates.
        Algorithm::ApproxStateTd | Algorithm::NStepTd => {
            ValueStrategy::state_value(LinearFunctionApproximator::new(
                CELLS,
                |&cell: &Cell| one_hot(cell_index(cell), CELLS),
            ))
        }
        _ => ValueStrategy::tabular(),
    };
    values.initialize(&env)?;

    println!("Algorithm: {}", algorithm.name());
    println!("Episodes: {}", config.episodes);
    println!("Epsilon: {}", options.epsilon);
    println!("Step size: {}", config.step_size);
    println!("Discount: {}", config.discount);
    if algorithm == Algorithm::NStepTd {
        println!("n: {}", config.n_steps);
    }
    if let Some(s) = config.seed {
        println!("Seed: {}", s);
    }
    println!();

    let episodes = config.episodes;
    {
        let mut solver = GpiSolver::new(&mut env, &mut policy, &mut values, config)?;

        let pb = progress_bar(episodes);
        let interval = (episodes / 100).max(1);
        let stats = solver
            .train_with_callback(interval, |stats| {
                pb.set_position(stats.episodes);
                pb.set_message(format!("last episode {} steps", stats.last_episode_steps));
            })?
            .clone();
        pb.finish_and_clear();

        println!("Training complete!");
        println!("Total time: {:.2}s", stats.elapsed_seconds);
        println!("Average speed: {:.0} episodes/second", stats.episodes_per_second);
        println!();

        let greedy = solver.greedy_policy()?;
        println!("=== Greedy Policy ===");
        println!("{}", solver.env().render_policy(&greedy));

        let rollout = solver.greedy_rollout(MAX_ROLLOUT_STEPS)?;
        println!("=== Greedy Trajectory ===");
        println!("{}", solver.env().render_path(&rollout.path));
        if rollout.reached_terminal {
            println!("Reached the goal in {} moves", rollout.steps());
        } else {
            println!("Gave up after {} moves", rollout.steps());
        }
        println!();

        persistence::save_policy(
            &DeterministicPolicy::from_mapping(greedy),
            options.output_dir.join("windy_policy.json"),
        )?;
    }

    match algorithm {
        Algorithm::ApproxQLearning | Algorithm::ApproxSarsa => {
            persistence::save_weights::<(Cell, GridAction), _, _>(
                values.action_approximator()?,
                options.output_dir.join("windy_fa_q_weights.json"),
            )?
        }
        Algorithm::ApproxStateTd | Algorithm::NStepTd => persistence::save_weights::<Cell, _, _>(
            values.state_approximator()?,
            options.output_dir.join("windy_fa_v_weights.json"),
        )?,
        _ => persistence::save_q_values(
            values.tabular_values()?,
            options.output_dir.join("windy_q.json"),
        )?,
    }

    info!(dir = %options.output_dir.display(), "results saved");
    println!("Done!");
    Ok(())
}

fn plan(options: &Options) -> Result<()> {
    let env = WindyGridworld::new();
    let mut planning = PlanningConfig::default();
    if let Some(gamma) = options.discount {
        planning = planning.with_discount(gamma);
    }
    let mut values = ValueStrategy::tabular();

    let greedy = match options.mode {
        Mode::PolicyIteration => {
            println!("Algorithm: policy iteration");
            let mut policy = DeterministicPolicy::new();
            let report = PolicyIteration::new(&env, planning)?.solve(&mut values, &mut policy)?;
            println!(
                "Converged: {} after {} improvements ({} sweeps)",
                report.converged, report.improvements, report.sweeps
            );
            policy.mapping().clone()
        }
        _ => {
            println!("Algorithm: value iteration");
            let report = ValueIteration::new(&env, planning.with_parallel(true))?.solve(&mut values)?;
            println!(
                "Converged: {} after {} sweeps (max delta {:.2e})",
                report.converged, report.sweeps, report.max_delta
            );
            greedy_policy(&env, &values)?
        }
    };
    println!();

    println!("=== Optimal Policy ===");
    println!("{}", env.render_policy(&greedy));

    let path = follow(&env, &greedy)?;
    println!("=== Optimal Trajectory ===");
    println!("{}", env.render_path(&path));
    println!("Reached the goal in {} moves", path.len());
    println!();

    let table = values.tabular_values()?;
    persistence::save_v_values(table, options.output_dir.join("windy_v.json"))?;
    persistence::save_q_values(table, options.output_dir.join("windy_q.json"))?;
    persistence::save_policy(
        &DeterministicPolicy::from_mapping(greedy),
        options.output_dir.join("windy_policy.json"),
    )?;

    println!("Done!");
    Ok(())
}

/// Walk the known dynamics from the start cell along `policy`.
fn follow(
    env: &WindyGridworld,
    policy: &FxHashMap<Cell, GridAction>,
) -> Result<Vec<(Cell, GridAction)>> {
    let mut state = env.start();
    let mut path = Vec::new();
    while !env.is_terminal(&state) && (path.len() as u64) < MAX_ROLLOUT_STEPS {
        let Some(&action) = policy.get(&state) else {
            break;
        };
        let (next, _) = env.simulate(&state, &action)?;
        path.push((state, action));
        state = next;
    }
    Ok(path)
}

fn print_help() {
    println!("Windy Gridworld Solver");
    println!();
    println!("Usage: windy_gridworld [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -a, --algorithm <NAME>   td_control (default), monte_carlo_control,");
    println!("                           approx_q_learning, approx_sarsa, approx_state_td,");
    println!("                           n_step_td, value_iteration, policy_iteration");
    println!("  -n, --n-steps <N>        Horizon of n_step_td (default: 3)");
    println!("  -e, --episodes <N>       Training episodes (default: 6000)");
    println!("  --epsilon <E>            Exploration rate (default: 0.1)");
    println!("  --step-size <A>          Step size α (default: 0.1)");
    println!("  --discount <G>           Discount rate γ (default: 0.9)");
    println!("  -c, --config <FILE>      Solver configuration JSON file");
    println!("  -o, --output <DIR>       Output directory (default: output)");
    println!("  -s, --seed <N>           Random seed");
    println!("  -v, --verbose            Debug logging");
    println!("  -h, --help               Show this help");
    println!();
    println!("Examples:");
    println!("  # Tabular TD control, reproducible");
    println!("  windy_gridworld --episodes 6000 --seed 42");
    println!();
    println!("  # Linear action-value approximation");
    println!("  windy_gridworld --algorithm approx_q_learning --episodes 3000");
    println!();
    println!("  # Exact solution from the known dynamics");
    println!("  windy_gridworld --algorithm value_iteration");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode() {
        assert!(matches!(
            parse_mode("n_step_td"),
            Some(Mode::Learn(Algorithm::NStepTd))
        ));
        assert!(matches!(
            parse_mode("approx_sarsa"),
            Some(Mode::Learn(Algorithm::ApproxSarsa))
        ));
        assert!(matches!(parse_mode("policy_iteration"), Some(Mode::PolicyIteration)));
        assert!(parse_mode("sarsa_lambda").is_none());
    }

    #[test]
    fn test_n_step_td_learns_grid_through_afterstates() {
        let options = Options {
            mode: Mode::Learn(Algorithm::NStepTd),
            episodes: Some(3),
            epsilon: 0.1,
            step_size: None,
            discount: None,
            n_steps: Some(4),
            config_file: None,
            output_dir: PathBuf::from("output"),
            seed: Some(5),
            verbose: false,
        };
        let config = solver_config(Algorithm::NStepTd, &options).unwrap();
        assert_eq!(config.n_steps, 4);
        assert_eq!(config.episodes, 3);

        let mut env = WindyGridworld::new();
        let mut policy = EpsilonGreedyPolicy::new(options.epsilon, config.seed).unwrap();
        let mut values = ValueStrategy::state_value(LinearFunctionApproximator::new(
            CELLS,
            |&cell: &Cell| one_hot(cell_index(cell), CELLS),
        ));
        let mut solver = GpiSolver::new(&mut env, &mut policy, &mut values, config).unwrap();
        assert_eq!(solver.train().unwrap().episodes, 3);
        let start = solver.env().start();
        assert!(solver.values().v(&start).unwrap() < 0.0);
    }
}
