//! Value strategies: one contract over tabular and approximated backends.
//!
//! Solvers and policies only ask a [`ValueStrategy`] for the best action in a
//! state and its value. Whether that value comes from a Q table, a Q
//! approximator or a V approximator scoring afterstates is decided by the
//! variant.

use std::fmt;

use crate::gpi::approximator::FunctionApproximator;
use crate::gpi::error::{GpiError, Result};
use crate::gpi::mdp::{Action, Environment, State};
use crate::gpi::storage::TabularValues;

/// Boxed approximator of state values.
pub type StateApproximator<S> = Box<dyn FunctionApproximator<S>>;

/// Boxed approximator of action values over `(state, action)` pairs.
pub type ActionApproximator<S, A> = Box<dyn FunctionApproximator<(S, A)>>;

/// The approximated backends.
pub enum Approximation<S: State, A: Action> {
    /// V(s); actions are scored by the value of the afterstate.
    StateValue(StateApproximator<S>),
    /// Q(s, a).
    ActionValue(ActionApproximator<S, A>),
}

/// Where value estimates live.
pub enum ValueStrategy<S: State, A: Action> {
    /// Explicit V and Q tables.
    Tabular(TabularValues<S, A>),
    /// A parametric model.
    Approximated(Approximation<S, A>),
}

impl<S: State, A: Action> ValueStrategy<S, A> {
    /// Empty tabular strategy.
    pub fn tabular() -> Self {
        ValueStrategy::Tabular(TabularValues::new())
    }

    /// Strategy backed by a state-value approximator.
    pub fn state_value<F>(approximator: F) -> Self
    where
        F: FunctionApproximator<S> + 'static,
    {
        ValueStrategy::Approximated(Approximation::StateValue(Box::new(approximator)))
    }

    /// Strategy backed by an action-value approximator.
    pub fn action_value<F>(approximator: F) -> Self
    where
        F: FunctionApproximator<(S, A)> + 'static,
    {
        ValueStrategy::Approximated(Approximation::ActionValue(Box::new(approximator)))
    }

    /// Prepare the backend for `env`.
    ///
    /// Tables get a zero entry for every state and legal pair. Approximators
    /// keep the weights they were constructed or restored with.
    pub fn initialize<E>(&mut self, env: &E) -> Result<()>
    where
        E: Environment<State = S, Action = A>,
    {
        match self {
            ValueStrategy::Tabular(table) => table.initialize(env),
            ValueStrategy::Approximated(_) => Ok(()),
        }
    }

    /// Best action in `state` and its value.
    ///
    /// Actions are scanned in the order `env.actions` returns them and a later
    /// action only wins on a strictly greater value, so ties go to the first.
    ///
    /// # Errors
    /// [`GpiError::NoActions`] if the state has no actions, plus any lookup or
    /// simulation error of the backend.
    pub fn best_action<E>(&self, env: &E, state: &S) -> Result<(A, f64)>
    where
        E: Environment<State = S, Action = A>,
    {
        let mut best: Option<(A, f64)> = None;

        for action in env.actions(state)? {
            let value = self.score(env, state, &action)?;
            let better = match &best {
                Some((_, best_value)) => value > *best_value,
                None => true,
            };
            if better {
                best = Some((action, value));
            }
        }

        best.ok_or_else(|| GpiError::NoActions(format!("{:?}", state)))
    }

    fn score<E>(&self, env: &E, state: &S, action: &A) -> Result<f64>
    where
        E: Environment<State = S, Action = A>,
    {
        match self {
            ValueStrategy::Tabular(table) => table.get_q(state, action),
            ValueStrategy::Approximated(Approximation::ActionValue(fa)) => {
                Ok(fa.predict(&(state.clone(), action.clone())))
            }
            ValueStrategy::Approximated(Approximation::StateValue(fa)) => {
                let (afterstate, _) = env.simulate(state, action)?;
                Ok(fa.predict(&afterstate))
            }
        }
    }

    /// Q(s, a) from a table or an action-value approximator.
    pub fn q(&self, state: &S, action: &A) -> Result<f64> {
        match self {
            ValueStrategy::Tabular(table) => table.get_q(state, action),
            ValueStrategy::Approximated(Approximation::ActionValue(fa)) => {
                Ok(fa.predict(&(state.clone(), action.clone())))
            }
            ValueStrategy::Approximated(Approximation::StateValue(_)) => Err(
                GpiError::InvalidArgument("state-value backend has no action values".into()),
            ),
        }
    }

    /// V(s) from a table or a state-value approximator.
    pub fn v(&self, state: &S) -> Result<f64> {
        match self {
            ValueStrategy::Tabular(table) => table.get_v(state),
            ValueStrategy::Approximated(Approximation::StateValue(fa)) => Ok(fa.predict(state)),
            ValueStrategy::Approximated(Approximation::ActionValue(_)) => Err(
                GpiError::InvalidArgument("action-value backend has no state values".into()),
            ),
        }
    }

    /// Whether this is the tabular backend.
    pub fn is_tabular(&self) -> bool {
        matches!(self, ValueStrategy::Tabular(_))
    }

    /// The tables, if tabular.
    pub fn tabular_values(&self) -> Result<&TabularValues<S, A>> {
        match self {
            ValueStrategy::Tabular(table) => Ok(table),
            _ => Err(GpiError::InvalidArgument("value strategy is not tabular".into())),
        }
    }

    /// Mutable tables, if tabular.
    pub fn tabular_values_mut(&mut self) -> Result<&mut TabularValues<S, A>> {
        match self {
            ValueStrategy::Tabular(table) => Ok(table),
            _ => Err(GpiError::InvalidArgument("value strategy is not tabular".into())),
        }
    }

    /// The state-value approximator, if present.
    pub fn state_approximator(&self) -> Result<&dyn FunctionApproximator<S>> {
        match self {
            ValueStrategy::Approximated(Approximation::StateValue(fa)) => Ok(fa.as_ref()),
            _ => Err(GpiError::InvalidArgument("missing state-value approximator".into())),
        }
    }

    /// Mutable state-value approximator, if present.
    pub fn state_approximator_mut(&mut self) -> Result<&mut StateApproximator<S>> {
        match self {
            ValueStrategy::Approximated(Approximation::StateValue(fa)) => Ok(fa),
            _ => Err(GpiError::InvalidArgument("missing state-value approximator".into())),
        }
    }

    /// The action-value approximator, if present.
    pub fn action_approximator(&self) -> Result<&dyn FunctionApproximator<(S, A)>> {
        match self {
            ValueStrategy::Approximated(Approximation::ActionValue(fa)) => Ok(fa.as_ref()),
            _ => Err(GpiError::InvalidArgument("missing action-value approximator".into())),
        }
    }

    /// Mutable action-value approximator, if present.
    pub fn action_approximator_mut(&mut self) -> Result<&mut ActionApproximator<S, A>> {
        match self {
            ValueStrategy::Approximated(Approximation::ActionValue(fa)) => Ok(fa),
            _ => Err(GpiError::InvalidArgument("missing action-value approximator".into())),
        }
    }

    /// Backend name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ValueStrategy::Tabular(_) => "tabular",
            ValueStrategy::Approximated(Approximation::StateValue(_)) => "state-value approximator",
            ValueStrategy::Approximated(Approximation::ActionValue(_)) => {
                "action-value approximator"
            }
        }
    }
}

impl<S: State, A: Action> fmt::Debug for ValueStrategy<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueStrategy::Tabular(table) => f
                .debug_struct("Tabular")
                .field("states", &table.num_states())
                .field("pairs", &table.num_pairs())
                .finish(),
            ValueStrategy::Approximated(Approximation::StateValue(fa)) => f
                .debug_struct("StateValue")
                .field("weights", &fa.weights().len())
                .finish(),
            ValueStrategy::Approximated(Approximation::ActionValue(fa)) => f
                .debug_struct("ActionValue")
                .field("weights", &fa.weights().len())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpi::approximator::{one_hot, LinearFunctionApproximator};
    use crate::gpi::mdp::Reward;

    /// States 0..=4 on a line, actions move by -1 or +1, 4 is terminal.
    struct Line;

    impl Environment for Line {
        type State = i32;
        type Action = i32;

        fn state_space(&self) -> Vec<i32> {
            (0..4).collect()
        }

        fn terminal_states(&self) -> Vec<i32> {
            vec![4]
        }

        fn actions(&self, state: &i32) -> Result<Vec<i32>> {
            match state {
                0 => Ok(vec![1]),
                1..=3 => Ok(vec![-1, 1]),
                4 => Ok(vec![]),
                _ => Err(GpiError::OutOfRange(state.to_string())),
            }
        }

        fn is_terminal(&self, state: &i32) -> bool {
            *state == 4
        }

        fn simulate(&self, state: &i32, action: &i32) -> Result<(i32, Reward)> {
            Ok((state + action, -1.0))
        }
    }

    #[test]
    fn test_single_action_always_returned() {
        let mut values = ValueStrategy::tabular();
        values.initialize(&Line).unwrap();
        values.tabular_values_mut().unwrap().set_q(0, 1, -1e9);

        let (action, value) = values.best_action(&Line, &0).unwrap();
        assert_eq!(action, 1);
        assert_eq!(value, -1e9);
    }

    #[test]
    fn test_ties_go_to_first_action() {
        let mut values = ValueStrategy::tabular();
        values.initialize(&Line).unwrap();
        assert_eq!(values.best_action(&Line, &2).unwrap().0, -1);

        values.tabular_values_mut().unwrap().set_q(2, 1, 0.5);
        assert_eq!(values.best_action(&Line, &2).unwrap(), (1, 0.5));
    }

    #[test]
    fn test_no_actions() {
        let values: ValueStrategy<i32, i32> = ValueStrategy::tabular();
        assert!(matches!(values.best_action(&Line, &4), Err(GpiError::NoActions(_))));
        assert!(matches!(values.best_action(&Line, &9), Err(GpiError::OutOfRange(_))));
    }

    #[test]
    fn test_state_value_scores_afterstates() {
        let mut fa = LinearFunctionApproximator::new(5, |s: &i32| one_hot(*s as usize, 5));
        fa.set_weights(vec![0.0, 0.0, 1.0, 0.0, 3.0]).unwrap();
        let values: ValueStrategy<i32, i32> = ValueStrategy::state_value(fa);

        // From 3: left lands on 2 (1.0), right lands on 4 (3.0).
        assert_eq!(values.best_action(&Line, &3).unwrap(), (1, 3.0));
        // From 1: left lands on 0 (0.0), right lands on 2 (1.0).
        assert_eq!(values.best_action(&Line, &1).unwrap(), (1, 1.0));
        assert!(values.q(&1, &1).is_err());
        assert_eq!(values.v(&2).unwrap(), 1.0);
    }

    #[test]
    fn test_action_value_scores_pairs() {
        let fa = LinearFunctionApproximator::new(2, |(_, a): &(i32, i32)| {
            vec![if *a < 0 { 1.0 } else { 0.0 }, if *a > 0 { 1.0 } else { 0.0 }]
        });
        let mut values: ValueStrategy<i32, i32> = ValueStrategy::action_value(fa);
        values
            .action_approximator_mut()
            .unwrap()
            .set_weights(vec![2.0, 1.0])
            .unwrap();

        assert_eq!(values.best_action(&Line, &2).unwrap(), (-1, 2.0));
        assert_eq!(values.q(&2, &1).unwrap(), 1.0);
        assert!(values.tabular_values().is_err());
        assert!(values.state_approximator().is_err());
    }
}
