//! Dynamic-programming solvers for environments with known dynamics.
//!
//! [`ValueIteration`] sweeps Bellman optimality backups over V until the
//! largest change falls below θ. [`PolicyIteration`] alternates Q-form policy
//! evaluation with greedy improvement of a [`DeterministicPolicy`].
//!
//! A parallel value-iteration sweep computes every backup from a frozen copy
//! of the previous sweep and then writes the results back serially.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::gpi::config::PlanningConfig;
use crate::gpi::error::{GpiError, Result};
use crate::gpi::mdp::Environment;
use crate::gpi::policy::{DeterministicPolicy, ValuesOf};
use crate::gpi::storage::TabularValues;

/// Outcome of a planning run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanningReport {
    /// Evaluation sweeps performed.
    pub sweeps: u64,
    /// Policy improvement rounds (always 0 for value iteration).
    pub improvements: u64,
    /// Largest value change in the final sweep.
    pub max_delta: f64,
    /// Whether the run stopped on θ rather than on `max_sweeps`.
    pub converged: bool,
}

/// Expected one-step return of `(state, action)` under `lookup`.
fn expected_return<E, F>(
    env: &E,
    discount: f64,
    state: &E::State,
    action: &E::Action,
    lookup: F,
) -> Result<f64>
where
    E: Environment,
    F: Fn(&E::State) -> Result<f64>,
{
    let mut total = 0.0;
    for t in env.dynamics(state, action)? {
        let next_value = if env.is_terminal(&t.next_state) {
            0.0
        } else {
            lookup(&t.next_state)?
        };
        total += t.probability * (t.reward + discount * next_value);
    }
    Ok(total)
}

fn non_terminal_states<E: Environment>(env: &E) -> Vec<E::State> {
    env.state_space()
        .into_iter()
        .filter(|s| !env.is_terminal(s))
        .collect()
}

/// Value iteration over V.
pub struct ValueIteration<'a, E: Environment> {
    env: &'a E,
    config: PlanningConfig,
}

impl<'a, E> ValueIteration<'a, E>
where
    E: Environment + Sync,
    E::State: Send + Sync,
    E::Action: Send + Sync,
{
    /// Create the solver.
    pub fn new(env: &'a E, config: PlanningConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { env, config })
    }

    /// max over actions of the expected return of `state`.
    fn backup(&self, state: &E::State, table: &TabularValues<E::State, E::Action>) -> Result<f64> {
        let mut best: Option<f64> = None;
        for action in self.env.actions(state)? {
            let value = expected_return(self.env, self.config.discount, state, &action, |s| {
                table.get_v(s)
            })?;
            best = Some(best.map_or(value, |b| b.max(value)));
        }
        best.ok_or_else(|| GpiError::NoActions(format!("{:?}", state)))
    }

    fn sweep(
        &self,
        states: &[E::State],
        table: &mut TabularValues<E::State, E::Action>,
    ) -> Result<f64> {
        let mut max_delta: f64 = 0.0;

        if self.config.parallel {
            let snapshot = table.clone();
            let updates = states
                .par_iter()
                .map(|s| self.backup(s, &snapshot).map(|v| (s.clone(), v)))
                .collect::<Result<Vec<_>>>()?;
            for (state, value) in updates {
                max_delta = max_delta.max((value - snapshot.get_v(&state)?).abs());
                table.set_v(state, value);
            }
        } else {
            for state in states {
                let value = self.backup(state, table)?;
                max_delta = max_delta.max((value - table.get_v(state)?).abs());
                table.set_v(state.clone(), value);
            }
        }

        Ok(max_delta)
    }

    /// Sweep until convergence, then fill Q from the converged V.
    ///
    /// # Errors
    /// [`GpiError::Unimplemented`] if the environment has no dynamics and
    /// [`GpiError::InvalidArgument`] if `values` is not tabular.
    pub fn solve(&self, values: &mut ValuesOf<E>) -> Result<PlanningReport> {
        let table = values.tabular_values_mut()?;
        if table.num_states() == 0 {
            table.initialize(self.env)?;
        }
        let states = non_terminal_states(self.env);

        info!(
            states = states.len(),
            discount = self.config.discount,
            parallel = self.config.parallel,
            "starting value iteration"
        );

        let mut report = PlanningReport {
            sweeps: 0,
            improvements: 0,
            max_delta: f64::INFINITY,
            converged: false,
        };

        while !report.converged {
            if self.config.max_sweeps.is_some_and(|cap| report.sweeps >= cap) {
                break;
            }
            report.max_delta = self.sweep(&states, table)?;
            report.sweeps += 1;
            report.converged = report.max_delta < self.config.theta;
            debug!(sweep = report.sweeps, max_delta = report.max_delta, "sweep done");
        }

        for state in &states {
            for action in self.env.actions(state)? {
                let q = expected_return(self.env, self.config.discount, state, &action, |s| {
                    table.get_v(s)
                })?;
                table.set_q(state.clone(), action, q);
            }
        }

        info!(
            sweeps = report.sweeps,
            max_delta = report.max_delta,
            converged = report.converged,
            "value iteration finished"
        );
        Ok(report)
    }
}

/// Policy iteration over Q.
pub struct PolicyIteration<'a, E: Environment> {
    env: &'a E,
    config: PlanningConfig,
}

impl<'a, E: Environment> PolicyIteration<'a, E> {
    /// Create the solver.
    pub fn new(env: &'a E, config: PlanningConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { env, config })
    }

    fn policy_action(
        &self,
        policy: &DeterministicPolicy<E::State, E::Action>,
        values: &ValuesOf<E>,
        state: &E::State,
    ) -> Result<E::Action> {
        match policy.get(state) {
            Some(action) => Ok(action.clone()),
            None => Ok(values.best_action(self.env, state)?.0),
        }
    }

    /// In-place sweeps of `Q(s,a) ← Σ p·(r + γ·Q(s', π(s')))`.
    fn evaluate(
        &self,
        states: &[E::State],
        policy: &DeterministicPolicy<E::State, E::Action>,
        values: &mut ValuesOf<E>,
        report: &mut PlanningReport,
    ) -> Result<()> {
        loop {
            if self.config.max_sweeps.is_some_and(|cap| report.sweeps >= cap) {
                return Ok(());
            }

            let mut max_delta: f64 = 0.0;
            for state in states {
                for action in self.env.actions(state)? {
                    let lookup = |s: &E::State| {
                        let next_action = self.policy_action(policy, values, s)?;
                        values.q(s, &next_action)
                    };
                    let new_value =
                        expected_return(self.env, self.config.discount, state, &action, lookup)?;

                    let table = values.tabular_values_mut()?;
                    let old_value = table.get_q(state, &action)?;
                    max_delta = max_delta.max((new_value - old_value).abs());
                    table.set_q(state.clone(), action, new_value);
                }
            }

            report.sweeps += 1;
            report.max_delta = max_delta;
            debug!(sweep = report.sweeps, max_delta, "evaluation sweep done");
            if max_delta < self.config.theta {
                return Ok(());
            }
        }
    }

    /// Make `policy` greedy in Q. Returns whether it was already stable.
    fn improve(
        &self,
        states: &[E::State],
        policy: &mut DeterministicPolicy<E::State, E::Action>,
        values: &ValuesOf<E>,
    ) -> Result<bool> {
        let mut stable = true;
        for state in states {
            let current = self.policy_action(policy, values, state)?;
            let current_value = values.q(state, &current)?;
            let (best, best_value) = values.best_action(self.env, state)?;

            // Ties within θ keep the current action.
            if best != current && best_value - current_value > self.config.theta {
                stable = false;
                policy.set(state.clone(), best);
            } else {
                policy.set(state.clone(), current);
            }
        }
        Ok(stable)
    }

    /// Alternate evaluation and improvement until the policy is stable.
    ///
    /// Evaluating a policy that never terminates only converges for a
    /// discount below 1; cap such runs with `max_sweeps`.
    ///
    /// # Errors
    /// [`GpiError::Unimplemented`] if the environment has no dynamics and
    /// [`GpiError::InvalidArgument`] if `values` is not tabular.
    pub fn solve(
        &self,
        values: &mut ValuesOf<E>,
        policy: &mut DeterministicPolicy<E::State, E::Action>,
    ) -> Result<PlanningReport> {
        let table = values.tabular_values_mut()?;
        if table.num_pairs() == 0 {
            table.initialize(self.env)?;
        }
        let states = non_terminal_states(self.env);

        // Unmapped states start on their first legal action.
        for state in &states {
            if policy.get(state).is_none() {
                let first = self.env.actions(state)?.into_iter().next();
                let action = first.ok_or_else(|| GpiError::NoActions(format!("{:?}", state)))?;
                policy.set(state.clone(), action);
            }
        }

        info!(
            states = states.len(),
            discount = self.config.discount,
            "starting policy iteration"
        );

        let mut report = PlanningReport {
            sweeps: 0,
            improvements: 0,
            max_delta: f64::INFINITY,
            converged: false,
        };

        loop {
            self.evaluate(&states, policy, values, &mut report)?;
            let stable = self.improve(&states, policy, values)?;
            report.improvements += 1;

            if stable && report.max_delta < self.config.theta {
                report.converged = true;
                break;
            }
            if self.config.max_sweeps.is_some_and(|cap| report.sweeps >= cap) {
                break;
            }
        }

        info!(
            sweeps = report.sweeps,
            improvements = report.improvements,
            converged = report.converged,
            "policy iteration finished"
        );
        Ok(report)
    }
}
