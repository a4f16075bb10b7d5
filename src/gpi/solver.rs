//! Generalized policy iteration engine.
//!
//! This module implements the episode-driven learning algorithms:
//! - **Monte Carlo**: first-visit control and value estimation
//! - **TD(0)**: tabular prediction and on-policy control
//! - **n-step TD**: value estimation through a state-value approximator
//! - **Approximate TD**: one-step updates of a state-value or action-value model,
//!   with an on-policy (SARSA) or greedy (Q-learning) action-value target
//!
//! The solver borrows an environment, a policy and a value strategy, drives
//! their interaction one episode at a time and applies the update rule the
//! configured [`Algorithm`] names. Updates from one episode are applied before
//! the next begins.

use std::time::Instant;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info, warn};

use crate::gpi::config::{Algorithm, SolverConfig, TrainingStats};
use crate::gpi::error::{GpiError, Result};
use crate::gpi::mdp::{Environment, Return, Reward};
use crate::gpi::policy::{greedy_policy, Policy, ValuesOf};
use crate::gpi::strategy::{Approximation, ValueStrategy};

/// One step of a recorded episode.
type Step<E> = (<E as Environment>::State, <E as Environment>::Action, Reward);

/// Length and undiscounted return of a finished episode.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct EpisodeSummary {
    steps: u64,
    total_reward: f64,
}

impl EpisodeSummary {
    fn record(&mut self, reward: Reward) {
        self.steps += 1;
        self.total_reward += reward;
    }

    fn of<S, A>(episode: &[(S, A, Reward)]) -> Self {
        Self {
            steps: episode.len() as u64,
            total_reward: episode.iter().map(|(_, _, r)| r).sum(),
        }
    }
}

/// A greedy walk through the environment.
#[derive(Debug, Clone)]
pub struct Rollout<S, A> {
    /// Visited states and the actions taken in them.
    pub path: Vec<(S, A)>,
    /// State the walk ended in.
    pub final_state: S,
    /// Undiscounted sum of rewards.
    pub total_reward: f64,
    /// False when the step cap stopped the walk.
    pub reached_terminal: bool,
}

impl<S, A> Rollout<S, A> {
    /// Number of actions taken.
    pub fn steps(&self) -> usize {
        self.path.len()
    }
}

/// Episode-driven GPI solver.
///
/// # Type Parameters
/// - `E`: the environment
/// - `P`: the behaviour policy
///
/// # Example
/// ```ignore
/// let mut env = WindyGridworld::new();
/// let mut policy = EpsilonGreedyPolicy::new(0.1, Some(7))?;
/// let mut values = ValueStrategy::tabular();
/// values.initialize(&env)?;
///
/// let config = SolverConfig::default().with_episodes(3000);
/// let mut solver = GpiSolver::new(&mut env, &mut policy, &mut values, config)?;
/// solver.train()?;
///
/// let rollout = solver.greedy_rollout(100)?;
/// println!("reached the goal in {} steps", rollout.steps());
/// ```
pub struct GpiSolver<'a, E, P>
where
    E: Environment,
    P: Policy<E>,
{
    /// The environment being solved.
    env: &'a mut E,

    /// Behaviour policy, reads `values` on every sample.
    policy: &'a mut P,

    /// Value estimates written by the update rules.
    values: &'a mut ValuesOf<E>,

    /// Configuration for the solver.
    config: SolverConfig,

    /// Statistics tracking.
    stats: TrainingStats,

    /// First-visit counts for Monte Carlo control, reset every run.
    visits: FxHashMap<(E::State, E::Action), u64>,

    /// Sum and count of first-visit returns per state, reset every run.
    returns: FxHashMap<E::State, (Return, u64)>,
}

impl<'a, E, P> GpiSolver<'a, E, P>
where
    E: Environment,
    P: Policy<E>,
{
    /// Create a solver.
    ///
    /// # Errors
    /// - [`GpiError::Config`] if the configuration does not validate
    /// - [`GpiError::InvalidArgument`] if the environment is continuing or the
    ///   value strategy lacks the backend the algorithm updates
    pub fn new(
        env: &'a mut E,
        policy: &'a mut P,
        values: &'a mut ValuesOf<E>,
        config: SolverConfig,
    ) -> Result<Self> {
        config.validate()?;

        if env.is_continuing() {
            return Err(GpiError::InvalidArgument(
                "learning solvers need an episodic environment".into(),
            ));
        }

        let backend_fits = match config.algorithm {
            Algorithm::MonteCarloControl
            | Algorithm::MonteCarloPrediction
            | Algorithm::TdPrediction
            | Algorithm::TdControl => values.is_tabular(),
            Algorithm::NStepTd | Algorithm::ApproxStateTd => matches!(
                values,
                ValueStrategy::Approximated(Approximation::StateValue(_))
            ),
            Algorithm::ApproxQLearning | Algorithm::ApproxSarsa => matches!(
                values,
                ValueStrategy::Approximated(Approximation::ActionValue(_))
            ),
        };
        if !backend_fits {
            return Err(GpiError::InvalidArgument(format!(
                "{} cannot run on a {} backend",
                config.algorithm.name(),
                values.kind()
            )));
        }

        if let ValueStrategy::Tabular(table) = &mut *values {
            table.set_strict(config.strict_lookups);
        }

        Ok(Self {
            env,
            policy,
            values,
            config,
            stats: TrainingStats::new(),
            visits: FxHashMap::default(),
            returns: FxHashMap::default(),
        })
    }

    /// Run `config.episodes` episodes.
    pub fn train(&mut self) -> Result<&TrainingStats> {
        self.train_with_callback(0, |_| {})
    }

    /// Train with a callback for progress tracking.
    ///
    /// # Arguments
    /// * `callback_interval` - How often to call the callback (0 never calls it)
    /// * `callback` - Function called every `callback_interval` episodes
    pub fn train_with_callback<F>(
        &mut self,
        callback_interval: u64,
        mut callback: F,
    ) -> Result<&TrainingStats>
    where
        F: FnMut(&TrainingStats),
    {
        let start_time = Instant::now();
        let elapsed_before = self.stats.elapsed_seconds;

        self.visits.clear();
        self.returns.clear();

        info!(
            algorithm = self.config.algorithm.name(),
            backend = self.values.kind(),
            episodes = self.config.episodes,
            "starting training"
        );

        for i in 0..self.config.episodes {
            self.run_episode()?;

            let log_interval = self.config.log_interval;
            if log_interval > 0 && (i + 1) % log_interval == 0 {
                debug!(
                    episode = self.stats.episodes,
                    steps = self.stats.last_episode_steps,
                    episode_return = self.stats.last_return,
                    "episode finished"
                );
            }

            if callback_interval > 0 && (i + 1) % callback_interval == 0 {
                self.stats.elapsed_seconds = elapsed_before + start_time.elapsed().as_secs_f64();
                self.stats.update_rate();
                callback(&self.stats);
            }
        }

        // Final stats update
        self.stats.elapsed_seconds = elapsed_before + start_time.elapsed().as_secs_f64();
        self.stats.update_rate();

        info!(
            episodes = self.stats.episodes,
            total_steps = self.stats.total_steps,
            elapsed_seconds = self.stats.elapsed_seconds,
            episodes_per_second = self.stats.episodes_per_second,
            "training finished"
        );

        Ok(&self.stats)
    }

    /// Generate one episode and apply the configured update rule.
    pub fn run_episode(&mut self) -> Result<()> {
        let summary = match self.config.algorithm {
            Algorithm::MonteCarloControl => self.monte_carlo_control_episode()?,
            Algorithm::MonteCarloPrediction => self.monte_carlo_prediction_episode()?,
            Algorithm::TdPrediction => self.td_prediction_episode()?,
            Algorithm::TdControl => self.td_control_episode()?,
            Algorithm::NStepTd => self.n_step_td_episode()?,
            Algorithm::ApproxStateTd => self.approx_state_td_episode()?,
            Algorithm::ApproxQLearning => self.approx_q_learning_episode()?,
            Algorithm::ApproxSarsa => self.approx_sarsa_episode()?,
        };
        self.stats
            .record_episode(summary.steps, summary.total_reward);
        Ok(())
    }

    fn check_step_cap(&self, steps: u64) -> Result<()> {
        match self.config.max_episode_steps {
            Some(cap) if steps >= cap => Err(GpiError::OutOfRange(format!(
                "episode exceeded {} steps",
                cap
            ))),
            _ => Ok(()),
        }
    }

    fn sample(&mut self, state: &E::State) -> Result<E::Action> {
        self.policy.sample(&*self.env, &*self.values, state)
    }

    /// Roll out one full episode under the behaviour policy.
    fn generate_episode(&mut self) -> Result<Vec<Step<E>>> {
        let mut state = self.env.reset()?;
        let mut episode = Vec::new();

        while !self.env.is_terminal(&state) {
            self.check_step_cap(episode.len() as u64)?;
            let action = self.sample(&state)?;
            let (next_state, reward) = self.env.step(&state, &action)?;
            episode.push((state, action, reward));
            state = next_state;
        }

        Ok(episode)
    }

    /// Returns at the first occurrence of each state-action pair, latest first.
    fn first_visit_returns(&self, episode: &[Step<E>]) -> Vec<(usize, Return)> {
        let mut seen = FxHashSet::default();
        let first: Vec<bool> = episode
            .iter()
            .map(|(s, a, _)| seen.insert((s.clone(), a.clone())))
            .collect();

        let mut g = 0.0;
        let mut out = Vec::new();
        for t in (0..episode.len()).rev() {
            g = self.config.discount * g + episode[t].2;
            if first[t] {
                out.push((t, g));
            }
        }
        out
    }

    fn monte_carlo_control_episode(&mut self) -> Result<EpisodeSummary> {
        let episode = self.generate_episode()?;
        let returns = self.first_visit_returns(&episode);

        let table = self.values.tabular_values_mut()?;
        for (t, g) in returns {
            let (s, a, _) = &episode[t];
            let n = self.visits.entry((s.clone(), a.clone())).or_insert(0);
            *n += 1;

            let q = table.get_q(s, a)?;
            table.set_q(s.clone(), a.clone(), q + (g - q) / *n as f64);
        }

        Ok(EpisodeSummary::of(&episode))
    }

    fn monte_carlo_prediction_episode(&mut self) -> Result<EpisodeSummary> {
        let episode = self.generate_episode()?;
        let returns = self.first_visit_returns(&episode);

        let table = self.values.tabular_values_mut()?;
        for (t, g) in returns {
            let s = &episode[t].0;
            let (sum, count) = self.returns.entry(s.clone()).or_insert((0.0, 0));
            *sum += g;
            *count += 1;
            table.set_v(s.clone(), *sum / *count as f64);
        }

        Ok(EpisodeSummary::of(&episode))
    }

    fn td_prediction_episode(&mut self) -> Result<EpisodeSummary> {
        let gamma = self.config.discount;
        let alpha = self.config.step_size;
        let mut summary = EpisodeSummary::default();
        let mut state = self.env.reset()?;

        while !self.env.is_terminal(&state) {
            self.check_step_cap(summary.steps)?;
            let action = self.sample(&state)?;
            let (next_state, reward) = self.env.step(&state, &action)?;
            summary.record(reward);

            let terminal = self.env.is_terminal(&next_state);
            let table = self.values.tabular_values_mut()?;
            let bootstrap = if terminal {
                0.0
            } else {
                table.get_v(&next_state)?
            };
            let v = table.get_v(&state)?;
            table.set_v(state, v + alpha * (reward + gamma * bootstrap - v));

            state = next_state;
        }

        Ok(summary)
    }

    /// On-policy TD control: the bootstrap uses the next action the policy
    /// actually samples, which is then taken.
    fn td_control_episode(&mut self) -> Result<EpisodeSummary> {
        let gamma = self.config.discount;
        let alpha = self.config.step_size;
        let mut summary = EpisodeSummary::default();

        let mut state = self.env.reset()?;
        if self.env.is_terminal(&state) {
            return Ok(summary);
        }
        let mut action = self.sample(&state)?;

        loop {
            self.check_step_cap(summary.steps)?;
            let (next_state, reward) = self.env.step(&state, &action)?;
            summary.record(reward);

            if self.env.is_terminal(&next_state) {
                let table = self.values.tabular_values_mut()?;
                let q = table.get_q(&state, &action)?;
                table.set_q(state, action, q + alpha * (reward - q));
                break;
            }

            let next_action = self.sample(&next_state)?;
            let table = self.values.tabular_values_mut()?;
            let q = table.get_q(&state, &action)?;
            let q_next = table.get_q(&next_state, &next_action)?;
            table.set_q(state, action, q + alpha * (reward + gamma * q_next - q));

            state = next_state;
            action = next_action;
        }

        Ok(summary)
    }

    /// n-step TD on a state-value approximator.
    ///
    /// The last `n + 1` states and rewards live in ring buffers indexed by
    /// time modulo `n + 1`.
    fn n_step_td_episode(&mut self) -> Result<EpisodeSummary> {
        let n = self.config.n_steps;
        let gamma = self.config.discount;
        let alpha = self.config.step_size;
        let len = n + 1;
        let mut summary = EpisodeSummary::default();

        let first = self.env.reset()?;
        if self.env.is_terminal(&first) {
            return Ok(summary);
        }
        let mut states = vec![first; len];
        let mut rewards = vec![0.0; len];
        let mut horizon = usize::MAX;
        let mut t = 0usize;

        loop {
            if t < horizon {
                self.check_step_cap(summary.steps)?;
                let action = self.sample(&states[t % len])?;
                let (next_state, reward) = self.env.step(&states[t % len], &action)?;
                summary.record(reward);

                if self.env.is_terminal(&next_state) {
                    horizon = t + 1;
                }
                rewards[(t + 1) % len] = reward;
                states[(t + 1) % len] = next_state;
            }

            // tau is the time whose estimate is updated this step.
            if t + 1 >= n {
                let tau = t + 1 - n;
                let mut g = 0.0;
                for i in (tau + 1)..=(tau + n).min(horizon) {
                    g += gamma.powi((i - tau - 1) as i32) * rewards[i % len];
                }

                let approximator = self.values.state_approximator_mut()?;
                if tau + n < horizon {
                    g += gamma.powi(n as i32) * approximator.predict(&states[(tau + n) % len]);
                }
                approximator.update(&states[tau % len], g, alpha);

                if tau + 1 == horizon {
                    break;
                }
            }

            t += 1;
        }

        Ok(summary)
    }

    fn approx_state_td_episode(&mut self) -> Result<EpisodeSummary> {
        let gamma = self.config.discount;
        let alpha = self.config.step_size;
        let mut summary = EpisodeSummary::default();
        let mut state = self.env.reset()?;

        while !self.env.is_terminal(&state) {
            self.check_step_cap(summary.steps)?;
            let action = self.sample(&state)?;
            let (next_state, reward) = self.env.step(&state, &action)?;
            summary.record(reward);

            let terminal = self.env.is_terminal(&next_state);
            let approximator = self.values.state_approximator_mut()?;
            let target = if terminal {
                reward
            } else {
                reward + gamma * approximator.predict(&next_state)
            };
            approximator.update(&state, target, alpha);

            state = next_state;
        }

        Ok(summary)
    }

    /// Approximate action-value TD that bootstraps with the greedy next
    /// action rather than the sampled one.
    fn approx_q_learning_episode(&mut self) -> Result<EpisodeSummary> {
        let gamma = self.config.discount;
        let alpha = self.config.step_size;
        let mut summary = EpisodeSummary::default();
        let mut state = self.env.reset()?;

        while !self.env.is_terminal(&state) {
            self.check_step_cap(summary.steps)?;
            let action = self.sample(&state)?;
            let (next_state, reward) = self.env.step(&state, &action)?;
            summary.record(reward);

            let target = if self.env.is_terminal(&next_state) {
                reward
            } else {
                let (best, _) = self
                    .policy
                    .greedy_action(&*self.env, &*self.values, &next_state)?;
                reward + gamma * self.values.q(&next_state, &best)?
            };
            self.values
                .action_approximator_mut()?
                .update(&(state, action), target, alpha);

            state = next_state;
        }

        Ok(summary)
    }

    /// Semi-gradient SARSA: like [`Algorithm::TdControl`] but on an
    /// action-value approximator.
    fn approx_sarsa_episode(&mut self) -> Result<EpisodeSummary> {
        let gamma = self.config.discount;
        let alpha = self.config.step_size;
        let mut summary = EpisodeSummary::default();

        let mut state = self.env.reset()?;
        if self.env.is_terminal(&state) {
            return Ok(summary);
        }
        let mut action = self.sample(&state)?;

        loop {
            self.check_step_cap(summary.steps)?;
            let (next_state, reward) = self.env.step(&state, &action)?;
            summary.record(reward);

            if self.env.is_terminal(&next_state) {
                self.values
                    .action_approximator_mut()?
                    .update(&(state, action), reward, alpha);
                break;
            }

            let next_action = self.sample(&next_state)?;
            let approximator = self.values.action_approximator_mut()?;
            let next_pair = (next_state.clone(), next_action.clone());
            let target = reward + gamma * approximator.predict(&next_pair);
            approximator.update(&(state, action), target, alpha);

            state = next_state;
            action = next_action;
        }

        Ok(summary)
    }

    /// Follow the greedy policy from `reset()` for at most `max_steps` steps.
    pub fn greedy_rollout(&mut self, max_steps: u64) -> Result<Rollout<E::State, E::Action>> {
        let mut state = self.env.reset()?;
        let mut path = Vec::new();
        let mut total_reward = 0.0;

        while !self.env.is_terminal(&state) {
            if path.len() as u64 >= max_steps {
                warn!(max_steps, "greedy rollout hit its step cap");
                return Ok(Rollout {
                    path,
                    final_state: state,
                    total_reward,
                    reached_terminal: false,
                });
            }
            let (action, _) = self
                .policy
                .greedy_action(&*self.env, &*self.values, &state)?;
            let (next_state, reward) = self.env.step(&state, &action)?;
            total_reward += reward;
            path.push((state, action));
            state = next_state;
        }

        Ok(Rollout {
            path,
            final_state: state,
            total_reward,
            reached_terminal: true,
        })
    }

    /// Greedy action of every non-terminal state.
    pub fn greedy_policy(&self) -> Result<FxHashMap<E::State, E::Action>> {
        greedy_policy(&*self.env, &*self.values)
    }

    /// The value estimates.
    pub fn values(&self) -> &ValuesOf<E> {
        &*self.values
    }

    /// Get training statistics.
    pub fn stats(&self) -> &TrainingStats {
        &self.stats
    }

    /// Get the configuration.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Get the environment.
    pub fn env(&self) -> &E {
        &*self.env
    }
}
