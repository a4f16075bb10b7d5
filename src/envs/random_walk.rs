//! Random walk Markov reward process (Sutton & Barto, example 6.2).
//!
//! States `1..=n` lie on a line between terminals `0` and `n + 1`. The only
//! action drifts one step left or right with equal probability. Reaching the
//! right end pays 1, everything else pays 0, so the undiscounted value of
//! state `i` is `i / (n + 1)`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::gpi::error::{GpiError, Result};
use crate::gpi::mdp::{Environment, Reward, Transition};

/// The single action of the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Drift {
    /// Move one step in a random direction.
    Drift,
}

/// Random walk over `n` non-terminal states.
#[derive(Debug, Clone)]
pub struct RandomWalk {
    n: i32,
    rng: StdRng,
}

impl RandomWalk {
    /// Walk with `n` non-terminal states, starting in the middle.
    pub fn new(n: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self { n: n as i32, rng }
    }

    /// Start state.
    pub fn start(&self) -> i32 {
        (self.n + 1) / 2
    }

    /// Analytic undiscounted value of `state`.
    pub fn true_value(&self, state: i32) -> f64 {
        state as f64 / (self.n + 1) as f64
    }

    fn reward_for(&self, next: i32) -> Reward {
        if next == self.n + 1 {
            1.0
        } else {
            0.0
        }
    }
}

impl Environment for RandomWalk {
    type State = i32;
    type Action = Drift;

    fn state_space(&self) -> Vec<i32> {
        (1..=self.n).collect()
    }

    fn terminal_states(&self) -> Vec<i32> {
        vec![0, self.n + 1]
    }

    fn actions(&self, state: &i32) -> Result<Vec<Drift>> {
        match *state {
            s if s < 0 || s > self.n + 1 => Err(GpiError::OutOfRange(format!("state {}", s))),
            s if self.is_terminal(&s) => Ok(Vec::new()),
            _ => Ok(vec![Drift::Drift]),
        }
    }

    fn is_terminal(&self, state: &i32) -> bool {
        *state == 0 || *state == self.n + 1
    }

    fn reset(&mut self) -> Result<i32> {
        Ok(self.start())
    }

    fn step(&mut self, state: &i32, _action: &Drift) -> Result<(i32, Reward)> {
        if self.actions(state)?.is_empty() {
            return Err(GpiError::NoActions(format!("state {}", state)));
        }
        let next = if self.rng.gen_bool(0.5) {
            state + 1
        } else {
            state - 1
        };
        Ok((next, self.reward_for(next)))
    }

    fn dynamics(&self, state: &i32, _action: &Drift) -> Result<Vec<Transition<i32>>> {
        if self.actions(state)?.is_empty() {
            return Err(GpiError::NoActions(format!("state {}", state)));
        }
        Ok([state - 1, state + 1]
            .into_iter()
            .map(|next| Transition::new(next, self.reward_for(next), 0.5))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpi::config::PlanningConfig;
    use crate::gpi::planning::ValueIteration;
    use crate::gpi::strategy::ValueStrategy;
    use float_eq::assert_float_eq;

    #[test]
    fn test_walk_moves_one_step() {
        let mut env = RandomWalk::new(5, Some(1));
        assert_eq!(env.reset().unwrap(), 3);

        let mut left = 0;
        for _ in 0..1000 {
            let (next, reward) = env.step(&3, &Drift::Drift).unwrap();
            assert!(next == 2 || next == 4);
            assert_eq!(reward, 0.0);
            if next == 2 {
                left += 1;
            }
        }
        assert!(left > 400 && left < 600, "left moves: {}", left);

        let (next, reward) = env.step(&5, &Drift::Drift).unwrap();
        assert_eq!(reward, if next == 6 { 1.0 } else { 0.0 });
    }

    #[test]
    fn test_terminals() {
        let env = RandomWalk::new(5, Some(1));
        assert!(env.is_terminal(&0) && env.is_terminal(&6));
        assert!(env.actions(&0).unwrap().is_empty());
        assert!(matches!(env.actions(&9), Err(GpiError::OutOfRange(_))));
        assert_eq!(env.state_space(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_dynamics_give_analytic_values() {
        let env = RandomWalk::new(5, Some(1));
        let probability: f64 = env
            .dynamics(&2, &Drift::Drift)
            .unwrap()
            .iter()
            .map(|t| t.probability)
            .sum();
        assert_eq!(probability, 1.0);

        let mut values = ValueStrategy::tabular();
        let config = PlanningConfig::default().with_discount(1.0).with_theta(1e-12);
        ValueIteration::new(&env, config)
            .unwrap()
            .solve(&mut values)
            .unwrap();

        for s in env.state_space() {
            assert_float_eq!(values.v(&s).unwrap(), env.true_value(s), abs <= 1e-9);
        }
    }
}
