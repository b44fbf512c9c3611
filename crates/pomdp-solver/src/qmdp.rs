//! QMDP: value iteration on the fully observable MDP underlying a POMDP.
//!
//! Observations are ignored while computing values, so the resulting alpha-vectors assume
//! all uncertainty disappears after one step. The policy built from them never pays to
//! gather information for its own sake, but it is cheap to compute.

use std::time::{Duration, Instant};

use pomdp_core::model::Pomdp;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cancel::CancelFlag;
use crate::policy::AlphaVectorPolicy;

const DEFAULT_MAX_ITERATIONS: usize = 100;
const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Stopping rules for value iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverConfig {
    /// Upper bound on Bellman sweeps.
    pub max_iterations: usize,
    /// Early stop once `max_s |V_k(s) - V_{k-1}(s)|` drops below this.
    pub tolerance: f64,
    /// Wall-clock budget, checked before every sweep.
    pub time_cap: Option<Duration>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
            time_cap: None,
        }
    }
}

impl SolverConfig {
    /// Defaults overridden by `QMDP_MAX_ITERATIONS`, `QMDP_TOLERANCE` and `QMDP_TIME_CAP_MS`.
    pub fn from_env() -> Self {
        Self::from_reader(|key| std::env::var(key).ok())
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_time_cap(mut self, time_cap: Duration) -> Self {
        self.time_cap = Some(time_cap);
        self
    }

    /// Rejects settings that would skip every sweep or never stop early.
    pub fn validate(&self) -> Result<(), SolverError> {
        if self.max_iterations == 0 {
            return Err(SolverError::InvalidConfig {
                field: "max_iterations",
                value: self.max_iterations.to_string(),
            });
        }
        if !valid_tolerance(self.tolerance) {
            return Err(SolverError::InvalidConfig {
                field: "tolerance",
                value: self.tolerance.to_string(),
            });
        }
        Ok(())
    }

    fn from_reader<F>(mut read: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let base = Self::default();

        let max_iterations = read("QMDP_MAX_ITERATIONS")
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .filter(|value| *value >= 1)
            .unwrap_or(base.max_iterations);

        let tolerance = read("QMDP_TOLERANCE")
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .filter(|value| valid_tolerance(*value))
            .unwrap_or(base.tolerance);

        let time_cap = read("QMDP_TIME_CAP_MS")
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .map(Duration::from_millis);

        Self {
            max_iterations,
            tolerance,
            time_cap,
        }
    }
}

fn valid_tolerance(tolerance: f64) -> bool {
    tolerance.is_finite() && tolerance > 0.0
}

/// Why value iteration stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    Converged,
    IterationCap,
    TimeCap,
    Cancelled,
}

impl SolveStatus {
    pub const fn is_converged(self) -> bool {
        matches!(self, SolveStatus::Converged)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SolveReport {
    /// Completed Bellman sweeps.
    pub iterations: usize,
    /// Largest value change in the last completed sweep (infinite if none ran).
    pub residual: f64,
    pub status: SolveStatus,
    pub elapsed_ms: f64,
}

/// QMDP solver over any [`Pomdp`] with enumerable spaces.
#[derive(Debug, Clone, Default)]
pub struct QmdpSolver {
    config: SolverConfig,
    cancel: Option<CancelFlag>,
}

/// Convenience wrapper for `QmdpSolver::new(config).solve(model)`.
pub fn solve<M: Pomdp>(
    model: &M,
    config: SolverConfig,
) -> Result<AlphaVectorPolicy<M::Action>, SolverError> {
    QmdpSolver::new(config).solve(model)
}

/// Precomputed `(next_state, probability, reward)` triples with nonzero probability.
type Backup = Vec<(usize, f64, f64)>;

impl QmdpSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Runs value iteration and returns one alpha-vector per action (the final `Q(·, a)`).
    ///
    /// Hitting the iteration cap, the time cap, or a cancellation is not an error: the
    /// vectors from the last completed sweep are returned and the report says why.
    pub fn solve<M: Pomdp>(&self, model: &M) -> Result<AlphaVectorPolicy<M::Action>, SolverError> {
        self.config.validate()?;
        let states = model.states();
        let actions = model.actions();
        if states.is_empty() {
            return Err(SolverError::EmptyStateSpace);
        }
        if actions.is_empty() {
            return Err(SolverError::EmptyActionSpace);
        }

        let start = Instant::now();
        let gamma = model.discount();
        let terminal: Vec<bool> = states.iter().map(|s| model.is_terminal(s)).collect();
        let backups = build_backups(model, &terminal)?;

        let mut values = vec![0.0_f64; states.len()];
        let mut next_values = vec![0.0_f64; states.len()];
        let mut alphas = vec![vec![0.0_f64; states.len()]; actions.len()];
        let mut iterations = 0usize;
        let mut residual = f64::INFINITY;
        let mut status = SolveStatus::IterationCap;

        for iteration in 1..=self.config.max_iterations {
            if self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
                status = SolveStatus::Cancelled;
                break;
            }
            if let Some(cap) = self.config.time_cap {
                if start.elapsed() >= cap {
                    status = SolveStatus::TimeCap;
                    break;
                }
            }

            for (s, is_terminal) in terminal.iter().enumerate() {
                if *is_terminal {
                    next_values[s] = 0.0;
                    continue;
                }

                let mut best = f64::NEG_INFINITY;
                for (a, alpha) in alphas.iter_mut().enumerate() {
                    let mut q = 0.0_f64;
                    for &(next, prob, reward) in &backups[s][a] {
                        q += prob * (reward + gamma * values[next]);
                    }
                    if !q.is_finite() {
                        return Err(SolverError::DivergentValue {
                            state: format!("{:?}", states[s]),
                            action: format!("{:?}", actions[a]),
                            iteration,
                        });
                    }
                    alpha[s] = q;
                    if q > best {
                        best = q;
                    }
                }
                next_values[s] = best;
            }

            residual = values
                .iter()
                .zip(&next_values)
                .map(|(old, new)| (new - old).abs())
                .fold(0.0, f64::max);
            std::mem::swap(&mut values, &mut next_values);
            iterations = iteration;
            debug!(iteration, residual, "qmdp sweep");

            if residual < self.config.tolerance {
                status = SolveStatus::Converged;
                break;
            }
        }

        let report = SolveReport {
            iterations,
            residual,
            status,
            elapsed_ms: start.elapsed().as_secs_f64() * 1_000.0,
        };

        if status.is_converged() {
            info!(
                iterations,
                residual,
                elapsed_ms = report.elapsed_ms,
                "qmdp converged"
            );
        } else {
            warn!(
                iterations,
                residual,
                tolerance = self.config.tolerance,
                ?status,
                "qmdp stopped before convergence; returning best available vectors"
            );
        }

        Ok(AlphaVectorPolicy::new(actions.to_vec(), alphas, report))
    }
}

fn build_backups<M: Pomdp>(model: &M, terminal: &[bool]) -> Result<Vec<Vec<Backup>>, SolverError> {
    let states = model.states();
    let actions = model.actions();
    let mut backups = Vec::with_capacity(states.len());

    for (state, is_terminal) in states.iter().zip(terminal) {
        let mut per_action = Vec::with_capacity(actions.len());
        for action in actions {
            let mut entries = Backup::new();
            if !*is_terminal {
                for (next, prob) in model.transition(state, action).iter() {
                    if prob == 0.0 {
                        continue;
                    }
                    let index =
                        model
                            .state_index(next)
                            .ok_or_else(|| SolverError::UndeclaredState {
                                state: format!("{next:?}"),
                            })?;
                    let reward = model.reward(state, action, next);
                    entries.push((index, prob, reward));
                }
            }
            per_action.push(entries);
        }
        backups.push(per_action);
    }

    Ok(backups)
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("invalid solver setting {field}: {value}")]
    InvalidConfig { field: &'static str, value: String },
    #[error("model declares no states")]
    EmptyStateSpace,
    #[error("model declares no actions")]
    EmptyActionSpace,
    #[error("value for state {state} under action {action} became non-finite at sweep {iteration}")]
    DivergentValue {
        state: String,
        action: String,
        iteration: usize,
    },
    #[error("transition produced undeclared state {state}")]
    UndeclaredState { state: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pomdp_core::distribution::Distribution;
    use pomdp_core::model::QuickPomdp;
    use pomdp_core::problems::{TigerAction, TigerConfig, TigerPomdp};
    use std::collections::HashMap;

    fn single_state(reward: f64, discount: f64) -> QuickPomdp<u8, u8, u8> {
        QuickPomdp::builder()
            .states([0u8])
            .actions([0u8])
            .observations([0u8])
            .discount(discount)
            .transition(|_, _| Distribution::deterministic(0u8))
            .observation(|_, _, _| Distribution::deterministic(0u8))
            .reward(move |_, _, _| reward)
            .initial_state(Distribution::deterministic(0u8))
            .build()
            .expect("valid model")
    }

    #[test]
    fn single_state_converges_to_geometric_sum() {
        let model = single_state(2.0, 0.9);
        let config = SolverConfig::default()
            .with_max_iterations(10_000)
            .with_tolerance(1e-10);
        let policy = solve(&model, config).expect("solves");
        let value = policy.value_vectors()[0][0];
        assert!((value - 2.0 / (1.0 - 0.9)).abs() < 1e-6, "value {value}");
        assert_eq!(policy.report().status, SolveStatus::Converged);
    }

    #[test]
    fn iteration_cap_is_a_warning_not_an_error() {
        let model = single_state(1.0, 0.99);
        let config = SolverConfig::default().with_max_iterations(5);
        let policy = solve(&model, config).expect("returns best vectors");
        let report = policy.report();
        assert_eq!(report.status, SolveStatus::IterationCap);
        assert_eq!(report.iterations, 5);
        // V_5 = 1 + 0.99 + ... + 0.99^4
        let expected: f64 = (0..5).map(|k| 0.99f64.powi(k)).sum();
        assert!((policy.value_vectors()[0][0] - expected).abs() < 1e-12);
    }

    #[test]
    fn cancelled_before_first_sweep_returns_zero_vectors() {
        let model = single_state(1.0, 0.5);
        let flag = CancelFlag::new();
        flag.cancel();
        let policy = QmdpSolver::new(SolverConfig::default())
            .with_cancel(flag)
            .solve(&model)
            .expect("cancellation is not an error");
        assert_eq!(policy.report().status, SolveStatus::Cancelled);
        assert_eq!(policy.report().iterations, 0);
        assert_eq!(policy.value_vectors()[0][0], 0.0);
    }

    #[test]
    fn zero_time_cap_stops_immediately() {
        let model = single_state(1.0, 0.5);
        let config = SolverConfig::default().with_time_cap(Duration::ZERO);
        let policy = solve(&model, config).expect("time cap is not an error");
        assert_eq!(policy.report().status, SolveStatus::TimeCap);
    }

    struct NoStates;

    impl Pomdp for NoStates {
        type State = u8;
        type Action = u8;
        type Observation = u8;

        fn states(&self) -> &[u8] {
            &[]
        }

        fn actions(&self) -> &[u8] {
            &[0]
        }

        fn observations(&self) -> &[u8] {
            &[0]
        }

        fn discount(&self) -> f64 {
            0.9
        }

        fn transition(&self, state: &u8, _: &u8) -> Distribution<u8> {
            Distribution::deterministic(*state)
        }

        fn observation(&self, _: &u8, _: &u8, _: &u8) -> Distribution<u8> {
            Distribution::deterministic(0)
        }

        fn reward(&self, _: &u8, _: &u8, _: &u8) -> f64 {
            0.0
        }

        fn initial_state(&self) -> Distribution<u8> {
            Distribution::deterministic(0)
        }
    }

    #[test]
    fn empty_state_space_is_rejected() {
        let err = solve(&NoStates, SolverConfig::default()).expect_err("no states");
        assert_eq!(err, SolverError::EmptyStateSpace);
    }

    #[test]
    fn infinite_reward_is_divergent() {
        let model = single_state(f64::INFINITY, 0.9);
        let err = solve(&model, SolverConfig::default()).expect_err("diverges");
        assert!(matches!(
            err,
            SolverError::DivergentValue { iteration: 1, .. }
        ));
    }

    #[test]
    fn terminal_states_keep_zero_value() {
        // 0 -> 1 with reward 5; state 1 is absorbing and terminal.
        let model: QuickPomdp<u8, u8, u8> = QuickPomdp::builder()
            .states([0u8, 1])
            .actions([0u8])
            .observations([0u8])
            .discount(0.9)
            .transition(|_, _| Distribution::deterministic(1u8))
            .observation(|_, _, _| Distribution::deterministic(0u8))
            .reward(|_, _, _| 5.0)
            .terminal(|s: &u8| *s == 1)
            .initial_state(Distribution::deterministic(0u8))
            .build()
            .expect("valid");
        let policy = solve(&model, SolverConfig::default()).expect("solves");
        assert_eq!(policy.value_vectors()[0], vec![5.0, 0.0]);
        assert!(policy.report().status.is_converged());
    }

    #[test]
    fn tiger_alpha_vectors_match_closed_form() {
        let model = TigerPomdp::new(TigerConfig::default()).expect("valid");
        let config = SolverConfig::default()
            .with_max_iterations(5_000)
            .with_tolerance(1e-9);
        let policy = solve(&model, config).expect("solves");
        // V* = 10 / (1 - 0.95) = 200 in both states.
        let expected: HashMap<TigerAction, [f64; 2]> = [
            (TigerAction::Left, [90.0, 200.0]),
            (TigerAction::Right, [200.0, 90.0]),
            (TigerAction::Listen, [189.0, 189.0]),
        ]
        .into_iter()
        .collect();
        for (action, alpha) in policy.actions().iter().zip(policy.value_vectors()) {
            for (got, want) in alpha.iter().zip(expected[action]) {
                assert!((got - want).abs() < 1e-5, "{action}: {got} vs {want}");
            }
        }
    }

    #[test]
    fn hand_built_config_is_checked_before_solving() {
        let model = single_state(1.0, 0.5);
        let no_sweeps = SolverConfig {
            max_iterations: 0,
            ..SolverConfig::default()
        };
        assert_eq!(
            solve(&model, no_sweeps).expect_err("zero sweeps"),
            SolverError::InvalidConfig {
                field: "max_iterations",
                value: "0".to_string(),
            }
        );

        for tolerance in [f64::NAN, 0.0, -1e-3, f64::INFINITY] {
            let config = SolverConfig::default().with_tolerance(tolerance);
            assert!(matches!(
                solve(&model, config),
                Err(SolverError::InvalidConfig {
                    field: "tolerance",
                    ..
                })
            ));
        }
    }

    #[test]
    fn config_reader_falls_back_on_invalid_values() {
        let env: HashMap<&str, &str> = [
            ("QMDP_MAX_ITERATIONS", "0"),
            ("QMDP_TOLERANCE", "-1"),
            ("QMDP_TIME_CAP_MS", "250"),
        ]
        .into_iter()
        .collect();
        let config = SolverConfig::from_reader(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.max_iterations, DEFAULT_MAX_ITERATIONS);
        assert_eq!(config.tolerance, DEFAULT_TOLERANCE);
        assert_eq!(config.time_cap, Some(Duration::from_millis(250)));
    }

    #[test]
    fn config_reader_accepts_valid_values() {
        let config = SolverConfig::from_reader(|key| match key {
            "QMDP_MAX_ITERATIONS" => Some("400".to_string()),
            "QMDP_TOLERANCE" => Some("1e-3".to_string()),
            _ => None,
        });
        assert_eq!(config.max_iterations, 400);
        assert_eq!(config.tolerance, 1e-3);
        assert_eq!(config.time_cap, None);
    }
}
