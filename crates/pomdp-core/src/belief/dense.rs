//! Dense belief vectors and the discrete Bayesian filter.

use crate::distribution::{Distribution, WEIGHT_TOLERANCE};
use crate::model::Pomdp;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Probability of each model state, aligned with [`Pomdp::states`] order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Belief {
    probs: Vec<f64>,
}

impl Belief {
    /// Projects a state distribution onto the model's state indices.
    pub fn from_distribution<M: Pomdp>(
        model: &M,
        dist: &Distribution<M::State>,
    ) -> Result<Self, BeliefError> {
        let mut probs = vec![0.0; model.states().len()];
        for (state, weight) in dist.iter() {
            let index = model
                .state_index(state)
                .ok_or_else(|| BeliefError::UndeclaredState {
                    state: format!("{state:?}"),
                })?;
            probs[index] += weight;
        }
        Ok(Self { probs })
    }

    /// Builds a belief from raw weights, which must be non-negative and sum to one.
    pub fn from_weights(probs: Vec<f64>) -> Result<Self, BeliefError> {
        if probs.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(BeliefError::InvalidWeights {
                total: probs.iter().sum(),
            });
        }
        let total: f64 = probs.iter().sum();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(BeliefError::InvalidWeights { total });
        }
        Ok(Self { probs })
    }

    pub fn uniform(len: usize) -> Option<Self> {
        if len == 0 {
            return None;
        }
        Some(Self {
            probs: vec![1.0 / len as f64; len],
        })
    }

    /// All mass on the state at `index`.
    pub fn point(len: usize, index: usize) -> Option<Self> {
        if index >= len {
            return None;
        }
        let mut probs = vec![0.0; len];
        probs[index] = 1.0;
        Some(Self { probs })
    }

    pub fn len(&self) -> usize {
        self.probs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probs.is_empty()
    }

    pub fn probability(&self, index: usize) -> f64 {
        self.probs.get(index).copied().unwrap_or(0.0)
    }

    pub fn probability_of<M: Pomdp>(&self, model: &M, state: &M::State) -> f64 {
        model
            .state_index(state)
            .map(|index| self.probability(index))
            .unwrap_or(0.0)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.probs
    }

    pub fn total_mass(&self) -> f64 {
        self.probs.iter().sum()
    }

    pub fn is_normalized(&self, tolerance: f64) -> bool {
        (self.total_mass() - 1.0).abs() <= tolerance
    }

    /// Index and probability of the most likely state; ties resolve to the lowest index.
    pub fn most_likely(&self) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (index, prob) in self.probs.iter().copied().enumerate() {
            if best.is_none_or(|(_, top)| prob > top) {
                best = Some((index, prob));
            }
        }
        best
    }

    /// Posterior after taking `action` and receiving `observation`:
    /// `b'(s') ∝ Σ_s b(s) · T(s, a, s') · O(s, a, s')(o)`.
    ///
    /// Fails with [`BeliefError::Collapse`] when the observation has zero likelihood
    /// under the current belief.
    pub fn update<M: Pomdp>(
        &self,
        model: &M,
        action: &M::Action,
        observation: &M::Observation,
    ) -> Result<Self, BeliefError> {
        let states = model.states();
        if self.probs.len() != states.len() {
            return Err(BeliefError::DimensionMismatch {
                expected: states.len(),
                found: self.probs.len(),
            });
        }

        let mut next = vec![0.0; states.len()];
        for (state, prior) in states.iter().zip(&self.probs) {
            if *prior == 0.0 {
                continue;
            }
            for (next_state, transition_prob) in model.transition(state, action).iter() {
                let likelihood = model
                    .observation(state, action, next_state)
                    .probability_of(observation);
                if likelihood == 0.0 {
                    continue;
                }
                let index =
                    model
                        .state_index(next_state)
                        .ok_or_else(|| BeliefError::UndeclaredState {
                            state: format!("{next_state:?}"),
                        })?;
                next[index] += prior * transition_prob * likelihood;
            }
        }

        let total: f64 = next.iter().sum();
        if !(total.is_finite() && total > 0.0) {
            return Err(BeliefError::Collapse {
                action: format!("{action:?}"),
                observation: format!("{observation:?}"),
            });
        }
        for prob in &mut next {
            *prob /= total;
        }
        Ok(Self { probs: next })
    }

    /// Coarse hash of the belief (probabilities quantised to 1e-3) for log correlation.
    pub fn summary_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.probs.len().hash(&mut hasher);
        for prob in &self.probs {
            let q = ((prob * 1000.0).round() as i64).clamp(0, 1000);
            q.hash(&mut hasher);
        }
        hasher.finish()
    }
}

/// Failures raised while building or filtering a belief.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BeliefError {
    #[error("observation {observation} after action {action} is impossible under the current belief")]
    Collapse { action: String, observation: String },
    #[error("belief has {found} entries but the model declares {expected} states")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("state {state} is not declared by the model")]
    UndeclaredState { state: String },
    #[error("belief weights sum to {total} or contain invalid entries")]
    InvalidWeights { total: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QuickPomdp;

    // Two doors, a noisy sensor that is right 80% of the time, nothing ever moves.
    fn sensor_model() -> QuickPomdp<u8, &'static str, u8> {
        QuickPomdp::builder()
            .states([0u8, 1])
            .actions(["sense"])
            .observations([0u8, 1])
            .transition(|s: &u8, _| Distribution::deterministic(*s))
            .observation(|_, _, sp: &u8| {
                Distribution::sparse_cat([*sp, 1 - *sp], [0.8, 0.2]).expect("valid weights")
            })
            .reward(|_, _, _| 0.0)
            .initial_state(Distribution::uniform([0u8, 1]).expect("uniform"))
            .build()
            .expect("valid model")
    }

    #[test]
    fn from_distribution_aligns_with_state_order() {
        let model = sensor_model();
        let dist = Distribution::sparse_cat([1u8, 0], [0.3, 0.7]).expect("valid");
        let belief = Belief::from_distribution(&model, &dist).expect("declared");
        assert_eq!(belief.as_slice(), &[0.7, 0.3]);
        assert_eq!(belief.probability_of(&model, &1), 0.3);
    }

    #[test]
    fn from_distribution_rejects_undeclared_states() {
        let model = sensor_model();
        let dist = Distribution::deterministic(9u8);
        let err = Belief::from_distribution(&model, &dist).expect_err("9 is undeclared");
        assert_eq!(
            err,
            BeliefError::UndeclaredState {
                state: "9".to_string()
            }
        );
    }

    #[test]
    fn update_applies_bayes_rule() {
        let model = sensor_model();
        let belief = Belief::uniform(2).expect("non-empty");
        let posterior = belief.update(&model, &"sense", &0).expect("consistent");
        assert!((posterior.probability(0) - 0.8).abs() < 1e-12);
        assert!((posterior.probability(1) - 0.2).abs() < 1e-12);

        let again = posterior.update(&model, &"sense", &0).expect("consistent");
        let expected = 0.64 / (0.64 + 0.04);
        assert!((again.probability(0) - expected).abs() < 1e-12);
        assert!(again.is_normalized(1e-12));
    }

    #[test]
    fn update_detects_collapse() {
        let model: QuickPomdp<u8, &'static str, u8> = QuickPomdp::builder()
            .states([0u8, 1])
            .actions(["sense"])
            .observations([0u8, 1])
            .transition(|s: &u8, _| Distribution::deterministic(*s))
            .observation(|_, _, sp: &u8| Distribution::deterministic(*sp))
            .reward(|_, _, _| 0.0)
            .initial_state(Distribution::deterministic(0))
            .build()
            .expect("valid model");
        let belief = Belief::point(2, 0).expect("in range");
        let err = belief.update(&model, &"sense", &1).expect_err("collapse");
        assert_eq!(
            err,
            BeliefError::Collapse {
                action: "\"sense\"".to_string(),
                observation: "1".to_string(),
            }
        );
    }

    #[test]
    fn update_rejects_mismatched_dimensions() {
        let model = sensor_model();
        let belief = Belief::uniform(3).expect("non-empty");
        let err = belief.update(&model, &"sense", &0).expect_err("wrong size");
        assert_eq!(
            err,
            BeliefError::DimensionMismatch {
                expected: 2,
                found: 3
            }
        );
    }

    #[test]
    fn from_weights_validates_mass() {
        assert!(Belief::from_weights(vec![0.25, 0.75]).is_ok());
        assert!(matches!(
            Belief::from_weights(vec![0.5, 0.6]),
            Err(BeliefError::InvalidWeights { .. })
        ));
        assert!(Belief::from_weights(vec![1.5, -0.5]).is_err());
    }

    #[test]
    fn most_likely_prefers_lowest_index_on_ties() {
        let belief = Belief::from_weights(vec![0.4, 0.4, 0.2]).expect("valid");
        assert_eq!(belief.most_likely(), Some((0, 0.4)));
    }

    #[test]
    fn summary_hash_ignores_sub_quantum_noise() {
        let a = Belief::from_weights(vec![0.5, 0.5]).expect("valid");
        let b = Belief::from_weights(vec![0.50001, 0.49999]).expect("valid");
        assert_eq!(a.summary_hash(), b.summary_hash());
    }
}
