//! Configuration options for the GPI solvers.
//!
//! This module provides the configuration structs that select a learning
//! algorithm and its hyper-parameters, plus the statistics collected while
//! training.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The learning algorithm a [`GpiSolver`](crate::gpi::GpiSolver) runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// First-visit Monte Carlo control with incremental Q averaging.
    MonteCarloControl,
    /// First-visit Monte Carlo estimation of V for the policy being followed.
    MonteCarloPrediction,
    /// Tabular TD(0) estimation of V.
    TdPrediction,
    /// Tabular on-policy TD(0) control (bootstraps with the sampled action).
    TdControl,
    /// n-step TD estimation of V through a state-value approximator.
    NStepTd,
    /// One-step TD on a state-value approximator.
    ApproxStateTd,
    /// One-step TD on an action-value approximator, bootstrapping with the
    /// greedy next action.
    ApproxQLearning,
    /// On-policy one-step TD on an action-value approximator, bootstrapping
    /// with the sampled next action.
    ApproxSarsa,
}

impl Algorithm {
    /// Whether the algorithm reads and writes a tabular value strategy.
    pub fn is_tabular(&self) -> bool {
        matches!(
            self,
            Algorithm::MonteCarloControl
                | Algorithm::MonteCarloPrediction
                | Algorithm::TdPrediction
                | Algorithm::TdControl
        )
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::MonteCarloControl => "mc-control",
            Algorithm::MonteCarloPrediction => "mc-prediction",
            Algorithm::TdPrediction => "td-prediction",
            Algorithm::TdControl => "td-control",
            Algorithm::NStepTd => "n-step-td",
            Algorithm::ApproxStateTd => "fa-td",
            Algorithm::ApproxQLearning => "fa-q",
            Algorithm::ApproxSarsa => "fa-sarsa",
        }
    }
}

/// Configuration for a learning run.
///
/// # Example
/// ```
/// use gpi_solver::gpi::{Algorithm, SolverConfig};
///
/// let config = SolverConfig::default()
///     .with_algorithm(Algorithm::TdControl)
///     .with_episodes(500);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Which update rule `train` applies.
    pub algorithm: Algorithm,

    /// Discount rate γ in [0, 1].
    pub discount: f64,

    /// Step size α in (0, 1]. Unused by the Monte Carlo variants.
    pub step_size: f64,

    /// Number of episodes one call to `train` runs.
    pub episodes: u64,

    /// Horizon of n-step TD.
    pub n_steps: usize,

    /// Fail on table lookups of unseen states instead of reading 0.
    ///
    /// Defaults to strict in test builds and lenient otherwise, where online
    /// learning meets freshly seen states.
    pub strict_lookups: bool,

    /// Emit a debug log line every this many episodes (0 disables).
    pub log_interval: u64,

    /// Optional cap on episode length. Exceeding it is an error.
    pub max_episode_steps: Option<u64>,

    /// Random seed for drivers that build seeded policies and environments.
    pub seed: Option<u64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::TdControl,
            discount: 0.9,
            step_size: 0.1,
            episodes: 1000,
            n_steps: 3,
            strict_lookups: cfg!(test),
            log_interval: 1000,
            max_episode_steps: None,
            seed: None,
        }
    }
}

impl SolverConfig {
    /// Create a new config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the algorithm.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Builder method: set the discount rate.
    pub fn with_discount(mut self, discount: f64) -> Self {
        self.discount = discount;
        self
    }

    /// Builder method: set the step size.
    pub fn with_step_size(mut self, step_size: f64) -> Self {
        self.step_size = step_size;
        self
    }

    /// Builder method: set the episode count.
    pub fn with_episodes(mut self, episodes: u64) -> Self {
        self.episodes = episodes;
        self
    }

    /// Builder method: set n for n-step TD.
    pub fn with_n_steps(mut self, n: usize) -> Self {
        self.n_steps = n;
        self
    }

    /// Builder method: set strict lookups.
    pub fn with_strict_lookups(mut self, strict: bool) -> Self {
        self.strict_lookups = strict;
        self
    }

    /// Builder method: set the episode length cap.
    pub fn with_max_episode_steps(mut self, steps: u64) -> Self {
        self.max_episode_steps = Some(steps);
        self
    }

    /// Builder method: set the debug log cadence.
    pub fn with_log_interval(mut self, interval: u64) -> Self {
        self.log_interval = interval;
        self
    }

    /// Builder method: set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate the configuration and return any errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.discount) {
            return Err(ConfigError::InvalidDiscount(self.discount));
        }

        if !(self.step_size > 0.0 && self.step_size <= 1.0) {
            return Err(ConfigError::InvalidStepSize(self.step_size));
        }

        if self.episodes == 0 {
            return Err(ConfigError::ZeroEpisodes);
        }

        if self.n_steps == 0 {
            return Err(ConfigError::ZeroHorizon);
        }

        Ok(())
    }

    /// Load and validate a configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_json_str(&content)
    }

    /// Parse and validate a configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

/// Configuration for the planning solvers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningConfig {
    /// Discount rate γ in [0, 1].
    pub discount: f64,

    /// Sweeps stop once the largest value change falls below this.
    pub theta: f64,

    /// Hard limit on sweeps, `None` for unbounded.
    pub max_sweeps: Option<u64>,

    /// Compute each value-iteration sweep in parallel from a frozen snapshot.
    pub parallel: bool,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            discount: 0.9,
            theta: 1e-8,
            max_sweeps: None,
            parallel: false,
        }
    }
}

impl PlanningConfig {
    /// Builder method: set the discount rate.
    pub fn with_discount(mut self, discount: f64) -> Self {
        self.discount = discount;
        self
    }

    /// Builder method: set the convergence threshold.
    pub fn with_theta(mut self, theta: f64) -> Self {
        self.theta = theta;
        self
    }

    /// Builder method: cap the number of sweeps.
    pub fn with_max_sweeps(mut self, sweeps: u64) -> Self {
        self.max_sweeps = Some(sweeps);
        self
    }

    /// Builder method: enable parallel sweeps.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.discount) {
            return Err(ConfigError::InvalidDiscount(self.discount));
        }
        if !(self.theta > 0.0) {
            return Err(ConfigError::InvalidThreshold(self.theta));
        }
        Ok(())
    }
}

/// Errors that can occur when validating a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Discount rate outside [0, 1].
    #[error("discount {0} is out of range [0, 1]")]
    InvalidDiscount(f64),
    /// Step size outside (0, 1].
    #[error("step size {0} is out of range (0, 1]")]
    InvalidStepSize(f64),
    /// Convergence threshold is not positive.
    #[error("threshold {0} must be positive")]
    InvalidThreshold(f64),
    /// Zero episodes requested.
    #[error("episode count must be positive")]
    ZeroEpisodes,
    /// n-step horizon of zero.
    #[error("n-step horizon must be at least 1")]
    ZeroHorizon,
    /// Config file could not be read.
    #[error("failed to read config: {0}")]
    IoError(String),
    /// Config file is not valid JSON.
    #[error("failed to parse config: {0}")]
    ParseError(String),
}

/// Statistics tracked during training.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingStats {
    /// Total number of episodes completed.
    pub episodes: u64,

    /// Total number of environment steps taken.
    pub total_steps: u64,

    /// Length of the most recent episode.
    pub last_episode_steps: u64,

    /// Undiscounted return of the most recent episode.
    pub last_return: f64,

    /// Total time spent training (in seconds).
    pub elapsed_seconds: f64,

    /// Episodes per second.
    pub episodes_per_second: f64,
}

impl TrainingStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update episodes per second based on elapsed time.
    pub fn update_rate(&mut self) {
        if self.elapsed_seconds > 0.0 {
            self.episodes_per_second = self.episodes as f64 / self.elapsed_seconds;
        }
    }

    /// Record one finished episode.
    pub fn record_episode(&mut self, steps: u64, episode_return: f64) {
        self.episodes += 1;
        self.total_steps += steps;
        self.last_episode_steps = steps;
        self.last_return = episode_return;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SolverConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.strict_lookups, "test builds default to strict lookups");
        assert!(PlanningConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let bad = SolverConfig::default().with_discount(1.5);
        assert_eq!(bad.validate(), Err(ConfigError::InvalidDiscount(1.5)));

        let bad = SolverConfig::default().with_step_size(0.0);
        assert_eq!(bad.validate(), Err(ConfigError::InvalidStepSize(0.0)));

        let bad = SolverConfig::default().with_episodes(0);
        assert_eq!(bad.validate(), Err(ConfigError::ZeroEpisodes));

        let bad = SolverConfig::default().with_n_steps(0);
        assert_eq!(bad.validate(), Err(ConfigError::ZeroHorizon));

        let bad = PlanningConfig::default().with_theta(0.0);
        assert_eq!(bad.validate(), Err(ConfigError::InvalidThreshold(0.0)));
    }

    #[test]
    fn test_config_from_json() {
        let config = SolverConfig::from_json_str(
            r#"{"algorithm": "approx_q_learning", "episodes": 6000, "step_size": 0.1}"#,
        )
        .unwrap();
        assert_eq!(config.algorithm, Algorithm::ApproxQLearning);
        assert_eq!(config.episodes, 6000);
        assert_eq!(config.discount, 0.9);

        let config = SolverConfig::from_json_str(r#"{"algorithm": "approx_sarsa"}"#).unwrap();
        assert_eq!(config.algorithm, Algorithm::ApproxSarsa);
        assert!(!config.algorithm.is_tabular());

        let err = SolverConfig::from_json_str(r#"{"discount": -0.1}"#).unwrap_err();
        assert_eq!(err, ConfigError::InvalidDiscount(-0.1));

        let err = SolverConfig::from_json_str("not json").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_stats_rate() {
        let mut stats = TrainingStats::new();
        stats.record_episode(10, -9.0);
        stats.record_episode(20, -19.0);
        stats.elapsed_seconds = 2.0;
        stats.update_rate();

        assert_eq!(stats.episodes, 2);
        assert_eq!(stats.total_steps, 30);
        assert_eq!(stats.last_episode_steps, 20);
        assert_eq!(stats.episodes_per_second, 1.0);
    }
}
