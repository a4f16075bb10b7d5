//! Action-selection policies.
//!
//! A policy turns a state into the action the agent takes. Policies read the
//! environment and the value strategy they are given on every call, so a
//! policy can never be consulted before it has something to read.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;

use crate::gpi::error::{GpiError, Result};
use crate::gpi::mdp::{Action, Environment, State};
use crate::gpi::strategy::ValueStrategy;

/// Shorthand for the value strategy matching an environment.
pub type ValuesOf<E> = ValueStrategy<<E as Environment>::State, <E as Environment>::Action>;

/// Picks actions for states of environment `E`.
pub trait Policy<E: Environment> {
    /// The action actually taken in `state`, possibly exploratory.
    fn sample(&mut self, env: &E, values: &ValuesOf<E>, state: &E::State) -> Result<E::Action>;

    /// The exploitative action in `state` and its value.
    fn greedy_action(
        &self,
        env: &E,
        values: &ValuesOf<E>,
        state: &E::State,
    ) -> Result<(E::Action, f64)> {
        values.best_action(env, state)
    }
}

/// Fixed state-to-action mapping that falls back to the greedy action.
#[derive(Debug, Clone)]
pub struct DeterministicPolicy<S: State, A: Action> {
    mapping: FxHashMap<S, A>,
}

impl<S: State, A: Action> Default for DeterministicPolicy<S, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: State, A: Action> DeterministicPolicy<S, A> {
    /// Empty mapping: every call is greedy.
    pub fn new() -> Self {
        Self {
            mapping: FxHashMap::default(),
        }
    }

    /// Policy following `mapping`.
    pub fn from_mapping(mapping: FxHashMap<S, A>) -> Self {
        Self { mapping }
    }

    /// Freeze the current greedy choices of `values` into a mapping.
    pub fn greedy<E>(env: &E, values: &ValueStrategy<S, A>) -> Result<Self>
    where
        E: Environment<State = S, Action = A>,
    {
        Ok(Self::from_mapping(greedy_policy(env, values)?))
    }

    /// Fix the action for `state`.
    pub fn set(&mut self, state: S, action: A) {
        self.mapping.insert(state, action);
    }

    /// Mapped action for `state`, if any.
    pub fn get(&self, state: &S) -> Option<&A> {
        self.mapping.get(state)
    }

    /// The underlying mapping.
    pub fn mapping(&self) -> &FxHashMap<S, A> {
        &self.mapping
    }

    /// Number of mapped states.
    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    /// Whether no state is mapped.
    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}

impl<E: Environment> Policy<E> for DeterministicPolicy<E::State, E::Action> {
    fn sample(&mut self, env: &E, values: &ValuesOf<E>, state: &E::State) -> Result<E::Action> {
        match self.mapping.get(state) {
            Some(action) => Ok(action.clone()),
            None => Ok(values.best_action(env, state)?.0),
        }
    }
}

fn check_epsilon(epsilon: f64) -> Result<()> {
    // NaN fails the range check as well.
    if !(0.0..=1.0).contains(&epsilon) {
        return Err(GpiError::InvalidArgument(format!(
            "epsilon {} is out of range [0, 1]",
            epsilon
        )));
    }
    Ok(())
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

/// With probability ε a uniformly random legal action, otherwise greedy.
#[derive(Debug, Clone)]
pub struct EpsilonGreedyPolicy {
    epsilon: f64,
    rng: StdRng,
}

impl EpsilonGreedyPolicy {
    /// Create an ε-greedy policy; `seed` fixes the exploration sequence.
    ///
    /// # Errors
    /// [`GpiError::InvalidArgument`] unless `0 <= epsilon <= 1`.
    pub fn new(epsilon: f64, seed: Option<u64>) -> Result<Self> {
        check_epsilon(epsilon)?;
        Ok(Self {
            epsilon,
            rng: seeded_rng(seed),
        })
    }

    /// Exploration rate.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Change the exploration rate, e.g. to decay it between runs.
    pub fn set_epsilon(&mut self, epsilon: f64) -> Result<()> {
        check_epsilon(epsilon)?;
        self.epsilon = epsilon;
        Ok(())
    }
}

impl<E: Environment> Policy<E> for EpsilonGreedyPolicy {
    fn sample(&mut self, env: &E, values: &ValuesOf<E>, state: &E::State) -> Result<E::Action> {
        if self.rng.gen::<f64>() < self.epsilon {
            let actions = env.actions(state)?;
            return actions
                .choose(&mut self.rng)
                .cloned()
                .ok_or_else(|| GpiError::NoActions(format!("{:?}", state)));
        }
        Ok(values.best_action(env, state)?.0)
    }
}

/// ε-greedy that explores through [`Environment::random_action`].
///
/// Useful when the environment can sample an action more cheaply than it can
/// enumerate them.
#[derive(Debug, Clone)]
pub struct StochasticPolicy {
    epsilon: f64,
    rng: StdRng,
}

impl StochasticPolicy {
    /// Create the policy.
    ///
    /// # Errors
    /// [`GpiError::InvalidArgument`] unless `0 <= epsilon <= 1`.
    pub fn new(epsilon: f64, seed: Option<u64>) -> Result<Self> {
        check_epsilon(epsilon)?;
        Ok(Self {
            epsilon,
            rng: seeded_rng(seed),
        })
    }

    /// Exploration rate.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }
}

impl<E: Environment> Policy<E> for StochasticPolicy {
    fn sample(&mut self, env: &E, values: &ValuesOf<E>, state: &E::State) -> Result<E::Action> {
        if self.rng.gen::<f64>() < self.epsilon {
            return env.random_action(state, &mut self.rng);
        }
        Ok(values.best_action(env, state)?.0)
    }
}

/// Greedy action of every non-terminal state in `env.state_space()`.
pub fn greedy_policy<E>(env: &E, values: &ValuesOf<E>) -> Result<FxHashMap<E::State, E::Action>>
where
    E: Environment,
{
    let mut mapping = FxHashMap::default();
    for state in env.state_space() {
        if env.is_terminal(&state) {
            continue;
        }
        let (action, _) = values.best_action(env, &state)?;
        mapping.insert(state, action);
    }
    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One state with three actions, action 2 has the highest value.
    struct Bandit;

    impl Environment for Bandit {
        type State = u8;
        type Action = u8;

        fn state_space(&self) -> Vec<u8> {
            vec![0]
        }

        fn terminal_states(&self) -> Vec<u8> {
            vec![1]
        }

        fn actions(&self, state: &u8) -> Result<Vec<u8>> {
            match state {
                0 => Ok(vec![0, 1, 2]),
                1 => Ok(vec![]),
                _ => Err(GpiError::OutOfRange(state.to_string())),
            }
        }

        fn is_terminal(&self, state: &u8) -> bool {
            *state == 1
        }
    }

    fn bandit_values() -> ValueStrategy<u8, u8> {
        let mut values = ValueStrategy::tabular();
        values.initialize(&Bandit).unwrap();
        values.tabular_values_mut().unwrap().set_q(0, 2, 1.0);
        values
    }

    #[test]
    fn test_epsilon_range() {
        assert!(EpsilonGreedyPolicy::new(0.0, Some(1)).is_ok());
        assert!(EpsilonGreedyPolicy::new(1.0, Some(1)).is_ok());
        assert!(matches!(
            EpsilonGreedyPolicy::new(-0.1, Some(1)),
            Err(GpiError::InvalidArgument(_))
        ));
        assert!(matches!(
            EpsilonGreedyPolicy::new(1.1, Some(1)),
            Err(GpiError::InvalidArgument(_))
        ));
        assert!(EpsilonGreedyPolicy::new(f64::NAN, Some(1)).is_err());
        assert!(StochasticPolicy::new(2.0, Some(1)).is_err());

        let mut policy = EpsilonGreedyPolicy::new(0.5, Some(1)).unwrap();
        assert!(policy.set_epsilon(3.0).is_err());
        assert_eq!(policy.epsilon(), 0.5);
    }

    #[test]
    fn test_zero_epsilon_never_explores() {
        let values = bandit_values();
        let mut policy = EpsilonGreedyPolicy::new(0.0, Some(3)).unwrap();
        for _ in 0..1000 {
            assert_eq!(policy.sample(&Bandit, &values, &0).unwrap(), 2);
        }
    }

    #[test]
    fn test_full_epsilon_always_explores() {
        let values = bandit_values();
        let mut policy = EpsilonGreedyPolicy::new(1.0, Some(3)).unwrap();
        let mut counts = [0u32; 3];
        for _ in 0..3000 {
            counts[policy.sample(&Bandit, &values, &0).unwrap() as usize] += 1;
        }
        println!("epsilon=1 counts: {:?}", counts);
        // Uniform over three actions: the greedy one gets about a third.
        assert!(counts.iter().all(|&c| c > 800 && c < 1200), "counts {:?}", counts);

        let mut stochastic = StochasticPolicy::new(1.0, Some(3)).unwrap();
        let mut counts = [0u32; 3];
        for _ in 0..3000 {
            counts[stochastic.sample(&Bandit, &values, &0).unwrap() as usize] += 1;
        }
        assert!(counts.iter().all(|&c| c > 800 && c < 1200), "counts {:?}", counts);
    }

    #[test]
    fn test_greedy_action_ignores_epsilon() {
        let values = bandit_values();
        let policy = EpsilonGreedyPolicy::new(1.0, Some(5)).unwrap();
        for _ in 0..10 {
            assert_eq!(policy.greedy_action(&Bandit, &values, &0).unwrap(), (2, 1.0));
        }
    }

    #[test]
    fn test_deterministic_mapping_and_fallback() {
        let values = bandit_values();
        let mut policy: DeterministicPolicy<u8, u8> = DeterministicPolicy::new();
        assert_eq!(policy.sample(&Bandit, &values, &0).unwrap(), 2);

        policy.set(0, 1);
        assert_eq!(policy.sample(&Bandit, &values, &0).unwrap(), 1);
        assert_eq!(policy.len(), 1);
    }

    #[test]
    fn test_greedy_policy_skips_terminals() {
        let values = bandit_values();
        let mapping = greedy_policy(&Bandit, &values).unwrap();
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.get(&0), Some(&2));

        let frozen = DeterministicPolicy::greedy(&Bandit, &values).unwrap();
        assert_eq!(frozen.get(&0), Some(&2));
    }
}
