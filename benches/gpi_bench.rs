//! Benchmarks for the GPI solvers.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gpi_solver::envs::{GridAction, WindyGridworld};
use gpi_solver::gpi::{
    one_hot, Algorithm, EpsilonGreedyPolicy, GpiSolver, LinearFunctionApproximator,
    PlanningConfig, SolverConfig, ValueIteration, ValueStrategy,
};

fn td_control_episode_benchmark(c: &mut Criterion) {
    let mut env = WindyGridworld::new();
    let mut policy = EpsilonGreedyPolicy::new(0.1, Some(42)).unwrap();
    let mut values = ValueStrategy::tabular();
    values.initialize(&env).unwrap();
    let config = SolverConfig::default().with_strict_lookups(false);
    let mut solver = GpiSolver::new(&mut env, &mut policy, &mut values, config).unwrap();

    c.bench_function("windy_td_control_single_episode", |b| {
        b.iter(|| {
            solver.run_episode().unwrap();
            black_box(solver.stats().total_steps)
        })
    });
}

fn td_control_500_episodes_benchmark(c: &mut Criterion) {
    c.bench_function("windy_td_control_500_episodes", |b| {
        b.iter(|| {
            let mut env = WindyGridworld::new();
            let mut policy = EpsilonGreedyPolicy::new(0.1, Some(42)).unwrap();
            let mut values = ValueStrategy::tabular();
            values.initialize(&env).unwrap();
            let config = SolverConfig::default()
                .with_episodes(black_box(500))
                .with_strict_lookups(false);
            let mut solver = GpiSolver::new(&mut env, &mut policy, &mut values, config).unwrap();
            let steps = solver.train().unwrap().total_steps;
            steps
        })
    });
}

fn approx_q_learning_episode_benchmark(c: &mut Criterion) {
    let mut env = WindyGridworld::new();
    let mut policy = EpsilonGreedyPolicy::new(0.1, Some(42)).unwrap();
    let mut values = ValueStrategy::action_value(LinearFunctionApproximator::new(
        280,
        |&((row, col), action): &((usize, usize), GridAction)| {
            one_hot((row * 10 + col) * 4 + action.index(), 280)
        },
    ));
    let config = SolverConfig::default().with_algorithm(Algorithm::ApproxQLearning);
    let mut solver = GpiSolver::new(&mut env, &mut policy, &mut values, config).unwrap();

    c.bench_function("windy_fa_q_single_episode", |b| {
        b.iter(|| {
            solver.run_episode().unwrap();
            black_box(solver.stats().total_steps)
        })
    });
}

fn value_iteration_benchmark(c: &mut Criterion) {
    let env = WindyGridworld::new();
    let mut group = c.benchmark_group("windy_value_iteration");
    for parallel in [false, true] {
        let name = if parallel { "parallel" } else { "serial" };
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut values = ValueStrategy::tabular();
                let config = PlanningConfig::default().with_parallel(parallel);
                let solver = ValueIteration::new(&env, config).unwrap();
                black_box(solver.solve(&mut values).unwrap().sweeps)
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    td_control_episode_benchmark,
    td_control_500_episodes_benchmark,
    approx_q_learning_episode_benchmark,
    value_iteration_benchmark
);
criterion_main!(benches);
