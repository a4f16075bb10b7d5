//! Environment trait definition for GPI solvers.
//!
//! Any Markov decision process that implements the `Environment` trait can be
//! driven by the learning solvers (through `reset`/`step`) or the planning
//! solvers (through `dynamics`). This keeps the update rules independent of
//! how states and actions are represented.

use std::fmt::Debug;
use std::hash::Hash;

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::gpi::error::{GpiError, Result};

/// Immediate reward of a single transition.
pub type Reward = f64;

/// Discounted cumulative reward.
pub type Return = f64;

/// Probability of a transition.
pub type Probability = f64;

/// Trait for environment states.
///
/// States are used as table keys, so they need structural equality and
/// hashing. Serialization provides the deterministic string encoding used
/// by persisted value tables. Composite states (tuples, structs deriving
/// `Hash`) combine their component hashes automatically.
pub trait State: Clone + Eq + Hash + Debug + Serialize + DeserializeOwned {}

impl<T> State for T where T: Clone + Eq + Hash + Debug + Serialize + DeserializeOwned {}

/// Trait for actions. Same requirements as [`State`].
pub trait Action: Clone + Eq + Hash + Debug + Serialize + DeserializeOwned {}

impl<T> Action for T where T: Clone + Eq + Hash + Debug + Serialize + DeserializeOwned {}

/// One outcome of applying an action under known dynamics.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition<S> {
    /// Resulting state.
    pub next_state: S,
    /// Reward collected on the way.
    pub reward: Reward,
    /// Probability of this outcome.
    pub probability: Probability,
}

impl<S> Transition<S> {
    /// Create a transition.
    pub fn new(next_state: S, reward: Reward, probability: Probability) -> Self {
        Self {
            next_state,
            reward,
            probability,
        }
    }
}

/// The Markov decision process contract.
///
/// Learning solvers need `reset`, `step`, `is_terminal` and `actions`.
/// Planning solvers need `state_space`, `actions` and `dynamics`. Operations
/// an environment cannot provide keep their default implementation, which
/// fails with [`GpiError::Unimplemented`].
///
/// # Example
/// ```ignore
/// struct Corridor;
///
/// impl Environment for Corridor {
///     type State = u8;
///     type Action = bool;
///
///     // ... implement required methods
/// }
/// ```
pub trait Environment {
    /// The type representing a state.
    type State: State;

    /// The type representing an action.
    type Action: Action;

    /// Every non-terminal state of the process.
    fn state_space(&self) -> Vec<Self::State>;

    /// Every terminal state of the process.
    fn terminal_states(&self) -> Vec<Self::State>;

    /// Actions available in `state`.
    ///
    /// # Errors
    /// [`GpiError::OutOfRange`] if the state is unknown to the environment.
    fn actions(&self, state: &Self::State) -> Result<Vec<Self::Action>>;

    /// Check whether `state` ends an episode.
    fn is_terminal(&self, state: &Self::State) -> bool;

    /// Start a new episode and return its first state.
    ///
    /// May mutate internal simulation state (shuffle a deck, ask a remote
    /// game to restart).
    fn reset(&mut self) -> Result<Self::State> {
        Err(GpiError::Unimplemented("reset"))
    }

    /// Apply `action` in `state` and observe the next state and reward.
    fn step(
        &mut self,
        _state: &Self::State,
        _action: &Self::Action,
    ) -> Result<(Self::State, Reward)> {
        Err(GpiError::Unimplemented("step"))
    }

    /// Full transition distribution of `(state, action)`, for planning.
    fn dynamics(
        &self,
        _state: &Self::State,
        _action: &Self::Action,
    ) -> Result<Vec<Transition<Self::State>>> {
        Err(GpiError::Unimplemented("dynamics"))
    }

    /// Hypothetical step that leaves the environment untouched.
    ///
    /// Used to score afterstates with a state-value approximator.
    fn simulate(
        &self,
        _state: &Self::State,
        _action: &Self::Action,
    ) -> Result<(Self::State, Reward)> {
        Err(GpiError::Unimplemented("simulate"))
    }

    /// Continuing tasks never terminate and are rejected by learning solvers.
    fn is_continuing(&self) -> bool {
        false
    }

    /// Sample uniformly from `actions(state)`.
    ///
    /// # Errors
    /// [`GpiError::NoActions`] if the state has no actions.
    fn random_action<R: Rng>(&self, state: &Self::State, rng: &mut R) -> Result<Self::Action> {
        let actions = self.actions(state)?;
        if actions.is_empty() {
            return Err(GpiError::NoActions(format!("{:?}", state)));
        }
        let idx = rng.gen_range(0..actions.len());
        Ok(actions[idx].clone())
    }
}

/// Encode a state or action into its deterministic persisted form.
pub fn encode_key<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Decode a persisted key back into a state, action or pair.
///
/// # Errors
/// [`GpiError::MalformedKey`] when the key does not decode into `T`.
pub fn decode_key<T: DeserializeOwned>(key: &str) -> Result<T> {
    serde_json::from_str(key).map_err(|e| GpiError::MalformedKey {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
