//! Tabular storage for state values and action values.
//!
//! This module provides the lookup tables used by the tabular algorithms:
//! - **V**: value of each state
//! - **Q**: value of each state-action pair
//!
//! Entries are created lazily by `set_*` or eagerly by [`TabularValues::initialize`]
//! and are never removed.

use rustc_hash::FxHashMap;

use crate::gpi::error::{GpiError, Result};
use crate::gpi::mdp::{Action, Environment, State};

/// Value tables keyed by state and by state-action pair.
///
/// In strict mode a lookup of a missing entry fails with
/// [`GpiError::OutOfRange`]; otherwise it reads as 0.
#[derive(Debug, Clone)]
pub struct TabularValues<S: State, A: Action> {
    /// State values: state -> V(s)
    v: FxHashMap<S, f64>,

    /// Action values: (state, action) -> Q(s, a)
    q: FxHashMap<(S, A), f64>,

    strict: bool,
}

impl<S: State, A: Action> Default for TabularValues<S, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: State, A: Action> TabularValues<S, A> {
    /// Create empty, non-strict tables.
    pub fn new() -> Self {
        Self {
            v: FxHashMap::default(),
            q: FxHashMap::default(),
            strict: false,
        }
    }

    /// Whether missing lookups fail.
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Switch between strict and non-strict lookups.
    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    /// Create a zero entry for every state and every legal state-action pair.
    ///
    /// Terminal states get a V entry only. Existing entries are reset to 0.
    pub fn initialize<E>(&mut self, env: &E) -> Result<()>
    where
        E: Environment<State = S, Action = A>,
    {
        for state in env.state_space() {
            for action in env.actions(&state)? {
                self.q.insert((state.clone(), action), 0.0);
            }
            self.v.insert(state, 0.0);
        }
        for state in env.terminal_states() {
            self.v.insert(state, 0.0);
        }
        Ok(())
    }

    /// Look up V(s).
    pub fn get_v(&self, state: &S) -> Result<f64> {
        match self.v.get(state) {
            Some(&value) => Ok(value),
            None if self.strict => Err(GpiError::OutOfRange(format!("V{:?}", state))),
            None => Ok(0.0),
        }
    }

    /// Look up Q(s, a).
    pub fn get_q(&self, state: &S, action: &A) -> Result<f64> {
        // Borrowed tuple lookup needs an owned key.
        match self.q.get(&(state.clone(), action.clone())) {
            Some(&value) => Ok(value),
            None if self.strict => Err(GpiError::OutOfRange(format!(
                "Q({:?}, {:?})",
                state, action
            ))),
            None => Ok(0.0),
        }
    }

    /// Store V(s), creating the entry if needed.
    pub fn set_v(&mut self, state: S, value: f64) {
        self.v.insert(state, value);
    }

    /// Store Q(s, a), creating the entry if needed.
    pub fn set_q(&mut self, state: S, action: A, value: f64) {
        self.q.insert((state, action), value);
    }

    /// Number of stored state values.
    pub fn num_states(&self) -> usize {
        self.v.len()
    }

    /// Number of stored action values.
    pub fn num_pairs(&self) -> usize {
        self.q.len()
    }

    /// Read-only view of the V table.
    pub fn v_table(&self) -> &FxHashMap<S, f64> {
        &self.v
    }

    /// Read-only view of the Q table.
    pub fn q_table(&self) -> &FxHashMap<(S, A), f64> {
        &self.q
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Line;

    impl Environment for Line {
        type State = i32;
        type Action = i32;

        fn state_space(&self) -> Vec<i32> {
            vec![0, 1, 2]
        }

        fn terminal_states(&self) -> Vec<i32> {
            vec![3]
        }

        fn actions(&self, state: &i32) -> Result<Vec<i32>> {
            match state {
                0..=2 => Ok(vec![-1, 1]),
                3 => Ok(vec![]),
                _ => Err(GpiError::OutOfRange(format!("{}", state))),
            }
        }

        fn is_terminal(&self, state: &i32) -> bool {
            *state == 3
        }
    }

    #[test]
    fn test_initialize_covers_space() {
        let mut table = TabularValues::new();
        table.initialize(&Line).unwrap();

        assert_eq!(table.num_states(), 4);
        assert_eq!(table.num_pairs(), 6);
        assert_eq!(table.get_v(&3).unwrap(), 0.0);
        assert_eq!(table.get_q(&2, &1).unwrap(), 0.0);
    }

    #[test]
    fn test_strict_and_lenient_lookups() {
        let mut table: TabularValues<i32, i32> = TabularValues::new();
        assert_eq!(table.get_v(&42).unwrap(), 0.0);
        assert_eq!(table.get_q(&42, &1).unwrap(), 0.0);

        table.set_strict(true);
        assert!(matches!(table.get_v(&42), Err(GpiError::OutOfRange(_))));
        assert!(matches!(table.get_q(&42, &1), Err(GpiError::OutOfRange(_))));

        table.set_q(42, 1, 2.5);
        table.set_v(42, -1.0);
        assert_eq!(table.get_q(&42, &1).unwrap(), 2.5);
        assert_eq!(table.get_v(&42).unwrap(), -1.0);
    }

    #[test]
    fn test_overwrite_in_place() {
        let mut table: TabularValues<i32, i32> = TabularValues::new();
        table.set_q(0, 1, 1.0);
        table.set_q(0, 1, 3.0);
        assert_eq!(table.num_pairs(), 1);
        assert_eq!(table.get_q(&0, &1).unwrap(), 3.0);
    }

    #[test]
    fn test_initialize_keeps_learned_entries() {
        let mut table: TabularValues<i32, i32> = TabularValues::new();
        table.set_q(42, 1, 2.5);
        table.set_v(42, -1.0);
        table.initialize(&Line).unwrap();

        assert_eq!(table.num_states(), 5);
        assert_eq!(table.num_pairs(), 7);
        assert_eq!(table.get_q(&42, &1).unwrap(), 2.5);
        assert_eq!(table.get_v(&42).unwrap(), -1.0);
    }
}
