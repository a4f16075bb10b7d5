//! # GPI Solver
//!
//! Generalized policy iteration for Markov decision processes: tabular and
//! linear-approximation reinforcement learning plus dynamic-programming
//! planners, generic over the environment's state and action types.
//!
//! ## Features
//!
//! - **Generic Engine**: Works with any environment implementing [`Environment`]
//! - **Interchangeable Backends**: Q/V tables or linear function approximation
//! - **Learning Algorithms**: Monte Carlo, TD(0), n-step TD, approximate TD
//! - **Planning**: Value iteration (serial or parallel sweeps) and policy iteration
//! - **Persistence**: JSON save/load of tables, weights and policies
//!
//! ## Quick Start
//!
//! ```ignore
//! use gpi_solver::envs::WindyGridworld;
//! use gpi_solver::gpi::{EpsilonGreedyPolicy, GpiSolver, SolverConfig, ValueStrategy};
//!
//! let mut env = WindyGridworld::new();
//! let mut policy = EpsilonGreedyPolicy::new(0.1, None)?;
//! let mut values = ValueStrategy::tabular();
//! values.initialize(&env)?;
//!
//! let mut solver = GpiSolver::new(&mut env, &mut policy, &mut values, SolverConfig::default())?;
//! solver.train()?;
//! let policy_map = solver.greedy_policy()?;
//! ```
//!
//! ## Modules
//!
//! - [`gpi`]: Core contracts, value strategies, policies and solvers
//! - [`envs`]: Reference environments (windy gridworld, random walk, blackjack, tag game)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    GpiSolver (Generic)                          │
//! │  - Episode generation     - MC / TD / n-step / FA updates       │
//! │  - Greedy extraction      - Training statistics                 │
//! └─────────────────────────────────────────────────────────────────┘
//!          │ samples via                      │ writes
//!          ▼                                  ▼
//!    ┌───────────┐   reads    ┌──────────────────────────────┐
//!    │  Policy   │ ─────────► │ ValueStrategy (table | model) │
//!    └───────────┘            └──────────────────────────────┘
//!          │ reset / step
//!          ▼
//!         ┌─────────────┬──────────────┬─────────────┬──────────┐
//!         │ Windy grid  │ Random walk  │  Blackjack  │ Tag game │
//!         └─────────────┴──────────────┴─────────────┴──────────┘
//! ```

#![warn(missing_docs)]

/// Generalized policy iteration module.
///
/// This is the core module containing the environment contract and the
/// learning and planning algorithms.
pub mod gpi;

/// Environment implementations module.
///
/// Contains reference environments used for testing, benchmarks and the
/// command-line drivers.
pub mod envs;

// Re-export commonly used types at crate root for convenience
pub use gpi::{
    Algorithm, Environment, GpiError, GpiSolver, Policy, SolverConfig, TrainingStats,
    ValueStrategy,
};
