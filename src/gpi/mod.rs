//! GPI (Generalized Policy Iteration) Solver Module.
//!
//! This module provides generic reinforcement-learning solvers for Markov
//! decision processes, built around four pieces:
//!
//! 1. an [`Environment`] describing states, actions and transitions
//! 2. a [`ValueStrategy`] holding value estimates (tables or a model)
//! 3. a [`Policy`] choosing actions from those estimates
//! 4. a solver that drives episodes and updates the estimates
//!
//! # Overview
//!
//! Every algorithm alternates the two halves of GPI: evaluation moves the
//! value estimates toward the returns the current policy earns, and
//! improvement happens implicitly because the policy reads the updated
//! estimates on its next sample.
//!
//! # Supported Algorithms
//!
//! Learning from sampled episodes ([`GpiSolver`]):
//! - **First-visit Monte Carlo**: control (incremental Q averages) and V estimation
//! - **TD(0)**: tabular V prediction and on-policy Q control
//! - **n-step TD**: V estimation through a state-value approximator
//! - **Approximate TD**: state-value TD, plus action-value TD bootstrapping
//!   with either the greedy next action or the sampled one (SARSA)
//!
//! Planning over known dynamics:
//! - **Value iteration** ([`ValueIteration`]), optionally with parallel sweeps
//! - **Policy iteration** ([`PolicyIteration`]) in Q form
//!
//! # Example
//!
//! ```ignore
//! use gpi_solver::envs::WindyGridworld;
//! use gpi_solver::gpi::{Algorithm, EpsilonGreedyPolicy, GpiSolver, SolverConfig, ValueStrategy};
//!
//! let mut env = WindyGridworld::new();
//! let mut policy = EpsilonGreedyPolicy::new(0.1, Some(42))?;
//! let mut values = ValueStrategy::tabular();
//! values.initialize(&env)?;
//!
//! let config = SolverConfig::default()
//!     .with_algorithm(Algorithm::TdControl)
//!     .with_episodes(6000);
//! let mut solver = GpiSolver::new(&mut env, &mut policy, &mut values, config)?;
//! let stats = solver.train()?;
//! println!("{} episodes in {:.2}s", stats.episodes, stats.elapsed_seconds);
//!
//! let rollout = solver.greedy_rollout(100)?;
//! println!("goal reached in {} moves", rollout.steps());
//! ```
//!
//! # Theory
//!
//! **TD(0) control** bootstraps with the action the policy will take next:
//! ```text
//! Q(s,a) += α·(r + γ·Q(s',a') − Q(s,a))
//! ```
//!
//! **Approximate action-value TD** bootstraps with the greedy next action:
//! ```text
//! w += α·(r + γ·Q(s', argmax_a Q(s',a)) − Q(s,a; w))·∇Q(s,a; w)
//! ```
//!
//! **Approximate SARSA** keeps the on-policy target of TD(0) control:
//! ```text
//! w += α·(r + γ·Q(s',a'; w) − Q(s,a; w))·∇Q(s,a; w)
//! ```
//!
//! **n-step return**:
//! ```text
//! G = r_{τ+1} + γ·r_{τ+2} + … + γ^{n−1}·r_{τ+n} + γ^n·V(s_{τ+n})
//! ```
//!
//! # References
//!
//! - Sutton, R., Barto, A. "Reinforcement Learning: An Introduction", 2nd ed. (2018)

pub mod approximator;
pub mod config;
pub mod error;
pub mod mdp;
pub mod persistence;
pub mod planning;
pub mod policy;
pub mod solver;
pub mod storage;
pub mod strategy;

// Re-export main types for convenient access
pub use approximator::{one_hot, FunctionApproximator, LinearFunctionApproximator};
pub use config::{Algorithm, ConfigError, PlanningConfig, SolverConfig, TrainingStats};
pub use error::{GpiError, Result};
pub use mdp::{Action, Environment, Return, Reward, State, Transition};
pub use planning::{PlanningReport, PolicyIteration, ValueIteration};
pub use policy::{
    greedy_policy, DeterministicPolicy, EpsilonGreedyPolicy, Policy, StochasticPolicy, ValuesOf,
};
pub use solver::{GpiSolver, Rollout};
pub use storage::TabularValues;
pub use strategy::{Approximation, ValueStrategy};
