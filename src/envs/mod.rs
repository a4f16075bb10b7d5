//! Environment implementations for the GPI solvers.
//!
//! These environments serve as:
//!
//! 1. **Validation**: Tasks with known answers (windy gridworld's 15-move
//!    optimum, the random walk's analytic values) verify that the learning
//!    and planning algorithms are correct.
//!
//! 2. **Examples**: Demonstrate how to implement the `Environment` trait for
//!    sampled, fully known and networked tasks.
//!
//! 3. **Benchmarks**: Provide standardized tasks for performance testing.
//!
//! ## Available Environments
//!
//! - [`windy_gridworld`]: Shortest path under a crosswind, with known dynamics
//! - [`random_walk`]: Five-state Markov reward process with analytic values
//! - [`blackjack`]: Sampled card game, no dynamics model
//! - [`tag_game`]: Remote game of tag reached through a [`tag_game::Connector`]
//!
//! ## Adding New Environments
//!
//! 1. Create a new module under `src/envs/`
//! 2. Define state and action types (serde-serializable, hashable)
//! 3. Implement `Environment`: `reset`/`step` for learning, `dynamics` for
//!    planning, `simulate` for afterstate scoring
//! 4. Add tests that verify expected behavior

pub mod blackjack;
pub mod random_walk;
pub mod tag_game;
pub mod windy_gridworld;

pub use blackjack::{Blackjack, BlackjackState, Play};
pub use random_walk::{Drift, RandomWalk};
pub use tag_game::{Connector, TagGame, TagState, TcpConnector, Velocity};
pub use windy_gridworld::{Cell, GridAction, WindyGridworld};
