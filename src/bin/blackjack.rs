//! Blackjack solver binary.
//!
//! Usage:
//!   cargo run --release --bin blackjack -- [OPTIONS]
//!
//! Options:
//!   --mode <MODE>        predict (default): Monte Carlo values of the
//!                        stick-on-20 policy; control: Monte Carlo control
//!   --episodes <N>       Training episodes (default: 500000)
//!   --epsilon <E>        Exploration rate in control mode (default: 0.1)
//!   --threshold <N>      Stick threshold in predict mode (default: 20)
//!   --output <DIR>       Output directory (default: output)
//!   --seed <N>           Random seed (optional)
//!   --verbose            Debug logging

use std::env;
use std::path::{Path, PathBuf};
use std::process;

use gpi_solver::envs::blackjack::{Blackjack, BlackjackState, Play};
use gpi_solver::gpi::{
    persistence, Algorithm, DeterministicPolicy, EpsilonGreedyPolicy, GpiSolver, Policy, Result,
    SolverConfig, ValueStrategy,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Predict,
    Control,
}

fn main() {
    let args: Vec<String> = env::args().collect();

    let mut mode = Mode::Predict;
    let mut episodes: u64 = 500_000;
    let mut epsilon = 0.1;
    let mut threshold: u8 = 20;
    let mut output_dir = PathBuf::from("output");
    let mut seed: Option<u64> = None;
    let mut verbose = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--mode" | "-m" => {
                i += 1;
                if i < args.len() {
                    mode = match args[i].as_str() {
                        "predict" => Mode::Predict,
                        "control" => Mode::Control,
                        other => {
                            eprintln!("Unknown mode: {}", other);
                            print_help();
                            process::exit(2);
                        }
                    };
                }
            }
            "--episodes" | "-e" => {
                i += 1;
                if i < args.len() {
                    episodes = args[i].parse().unwrap_or(episodes);
                }
            }
            "--epsilon" => {
                i += 1;
                if i < args.len() {
                    epsilon = args[i].parse().unwrap_or(epsilon);
                }
            }
            "--threshold" => {
                i += 1;
                if i < args.len() {
                    threshold = args[i].parse().unwrap_or(threshold);
                }
            }
            "--output" | "-o" => {
                i += 1;
                if i < args.len() {
                    output_dir = PathBuf::from(&args[i]);
                }
            }
            "--seed" | "-s" => {
                i += 1;
                if i < args.len() {
                    seed = args[i].parse().ok();
                }
            }
            "--verbose" | "-v" => {
                verbose = true;
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

    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Logging was already initialized");
    }

    println!("=================================================");
    println!("  Blackjack");
    println!("=================================================");
    println!();
    println!("Mode: {:?}", mode);
    println!("Episodes: {}", episodes);
    if let Some(s) = seed {
        println!("Seed: {}", s);
    }
    println!("Output: {}", output_dir.display());
    println!();

    let mut config = SolverConfig::default()
        .with_discount(1.0)
        .with_episodes(episodes)
        .with_log_interval(episodes / 10);
    if let Some(s) = seed {
        config = config.with_seed(s);
    }

    let result = match mode {
        Mode::Predict => predict(threshold, config, &output_dir),
        Mode::Control => control(epsilon, config, &output_dir),
    };
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

/// Train with a progress bar and print the closing summary.
fn run<P: Policy<Blackjack>>(solver: &mut GpiSolver<'_, Blackjack, P>, episodes: u64) -> Result<()> {
    let pb = progress_bar(episodes);
    let interval = (episodes / 200).max(1);
    let stats = solver
        .train_with_callback(interval, |stats| pb.set_position(stats.episodes))?
        .clone();
    pb.finish_and_clear();

    println!("Training complete!");
    println!("Total time: {:.2}s", stats.elapsed_seconds);
    println!("Average speed: {:.0} episodes/second", stats.episodes_per_second);
    println!();
    Ok(())
}

fn render_values(values: &ValueStrategy<BlackjackState, Play>, usable_ace: bool) -> Result<String> {
    let mut out = String::from("       A     2     3     4     5     6     7     8     9    10\n");
    for sum in (12..=21u8).rev() {
        out.push_str(&format!("{:>3} ", sum));
        for dealer in 1..=10u8 {
            out.push_str(&format!("{:>6.2}", values.v(&(sum, dealer, usable_ace))?));
        }
        out.push('\n');
    }
    Ok(out)
}

fn predict(threshold: u8, config: SolverConfig, output_dir: &Path) -> Result<()> {
    let mut env = Blackjack::new(config.seed);
    let mut policy = env.threshold_policy(threshold);
    let mut values = ValueStrategy::tabular();
    values.initialize(&env)?;

    let config = config.with_algorithm(Algorithm::MonteCarloPrediction);
    let episodes = config.episodes;
    run(&mut GpiSolver::new(&mut env, &mut policy, &mut values, config)?, episodes)?;

    println!("=== V, stick on {} (usable ace) ===", threshold);
    println!("{}", render_values(&values, true)?);
    println!("=== V, stick on {} (no usable ace) ===", threshold);
    println!("{}", render_values(&values, false)?);

    persistence::save_v_values(values.tabular_values()?, output_dir.join("blackjack_v.json"))?;
    persistence::save_policy(&policy, output_dir.join("blackjack_threshold_policy.json"))?;
    info!(dir = %output_dir.display(), "results saved");
    Ok(())
}

fn control(epsilon: f64, config: SolverConfig, output_dir: &Path) -> Result<()> {
    let mut env = Blackjack::new(config.seed);
    let mut policy = EpsilonGreedyPolicy::new(epsilon, config.seed)?;
    let mut values = ValueStrategy::tabular();
    values.initialize(&env)?;

    let config = config.with_algorithm(Algorithm::MonteCarloControl);
    let episodes = config.episodes;
    let greedy = {
        let mut solver = GpiSolver::new(&mut env, &mut policy, &mut values, config)?;
        run(&mut solver, episodes)?;
        DeterministicPolicy::from_mapping(solver.greedy_policy()?)
    };

    println!("=== Greedy policy (usable ace) ===");
    println!("{}", env.render_policy(&greedy, true));
    println!("=== Greedy policy (no usable ace) ===");
    println!("{}", env.render_policy(&greedy, false));

    persistence::save_q_values(values.tabular_values()?, output_dir.join("blackjack_q.json"))?;
    persistence::save_policy(&greedy, output_dir.join("blackjack_policy.json"))?;
    info!(dir = %output_dir.display(), "results saved");
    Ok(())
}

fn print_help() {
    println!("Blackjack Solver");
    println!();
    println!("Usage: blackjack [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -m, --mode <MODE>        predict (default) or control");
    println!("  -e, --episodes <N>       Training episodes (default: 500000)");
    println!("  --epsilon <E>            Exploration rate in control mode (default: 0.1)");
    println!("  --threshold <N>          Stick threshold in predict mode (default: 20)");
    println!("  -o, --output <DIR>       Output directory (default: output)");
    println!("  -s, --seed <N>           Random seed");
    println!("  -v, --verbose            Debug logging");
    println!("  -h, --help               Show this help");
    println!();
    println!("Examples:");
    println!("  # Values of the stick-on-20 policy");
    println!("  blackjack --episodes 500000");
    println!();
    println!("  # Learn a policy");
    println!("  blackjack --mode control --episodes 2000000 --epsilon 0.1");
}
