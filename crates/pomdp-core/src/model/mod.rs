//! Discrete POMDP model contract and validation.
//!
//! - [`Pomdp`]: the trait every problem implements (finite, enumerable spaces).
//! - [`QuickPomdp`]: closure-backed model assembled through [`QuickPomdpBuilder`].
//! - [`validate`]: totality and range checks run before solving.

mod quick;

pub use quick::{QuickPomdp, QuickPomdpBuilder};

use crate::distribution::{Distribution, DistributionError};
use core::fmt;
use std::collections::HashSet;
use std::hash::Hash;
use thiserror::Error;
use tracing::warn;

/// A finite partially observable Markov decision process.
///
/// The declared order of [`Pomdp::states`] is the index order used by beliefs and
/// alpha-vectors; the declared order of [`Pomdp::actions`] is the policy tie-break order.
pub trait Pomdp {
    type State: Clone + Eq + Hash + fmt::Debug;
    type Action: Clone + Eq + fmt::Debug;
    type Observation: Clone + Eq + fmt::Debug;

    fn states(&self) -> &[Self::State];

    fn actions(&self) -> &[Self::Action];

    fn observations(&self) -> &[Self::Observation];

    /// Per-step discount factor in (0, 1].
    fn discount(&self) -> f64;

    fn transition(&self, state: &Self::State, action: &Self::Action)
    -> Distribution<Self::State>;

    fn observation(
        &self,
        state: &Self::State,
        action: &Self::Action,
        next_state: &Self::State,
    ) -> Distribution<Self::Observation>;

    fn reward(&self, state: &Self::State, action: &Self::Action, next_state: &Self::State) -> f64;

    fn is_terminal(&self, _state: &Self::State) -> bool {
        false
    }

    fn initial_state(&self) -> Distribution<Self::State>;

    /// Position of `state` in [`Pomdp::states`].
    fn state_index(&self, state: &Self::State) -> Option<usize> {
        self.states().iter().position(|candidate| candidate == state)
    }
}

/// Checks that a model is well formed: non-empty action/observation sets, a discount in
/// (0, 1], distinct states, and transition/observation/initial supports that stay inside
/// the declared sets.
///
/// An empty state set is accepted here; the solver reports it.
pub fn validate<M: Pomdp>(model: &M) -> Result<(), ModelError> {
    if model.actions().is_empty() {
        return Err(ModelError::EmptyActionSpace);
    }
    if model.observations().is_empty() {
        return Err(ModelError::EmptyObservationSpace);
    }
    check_discount(model.discount())?;

    let mut seen = HashSet::with_capacity(model.states().len());
    for state in model.states() {
        if !seen.insert(state) {
            return Err(ModelError::DuplicateState {
                state: format!("{state:?}"),
            });
        }
    }

    for next in model.initial_state().support() {
        if model.state_index(next).is_none() {
            return Err(ModelError::UndeclaredState {
                state: format!("{next:?}"),
                context: "initial state distribution".to_string(),
            });
        }
    }

    for state in model.states() {
        for action in model.actions() {
            let transition = model.transition(state, action);
            for next in transition.support() {
                if model.state_index(next).is_none() {
                    return Err(ModelError::UndeclaredState {
                        state: format!("{next:?}"),
                        context: format!("transition({state:?}, {action:?})"),
                    });
                }
                let observation = model.observation(state, action, next);
                for obs in observation.support() {
                    if !model.observations().contains(obs) {
                        return Err(ModelError::UndeclaredObservation {
                            observation: format!("{obs:?}"),
                            context: format!("observation({state:?}, {action:?}, {next:?})"),
                        });
                    }
                }
            }
        }
    }

    Ok(())
}

pub(crate) fn check_discount(discount: f64) -> Result<(), ModelError> {
    if !discount.is_finite() || discount <= 0.0 || discount > 1.0 {
        return Err(ModelError::InvalidDiscount { discount });
    }
    if discount == 1.0 {
        warn!(
            discount,
            "undiscounted model: value iteration converges only if termination is guaranteed"
        );
    }
    Ok(())
}

/// Structural problems detected while assembling or validating a model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("discount {discount} must lie in (0, 1]")]
    InvalidDiscount { discount: f64 },
    #[error("action set is empty")]
    EmptyActionSpace,
    #[error("observation set is empty")]
    EmptyObservationSpace,
    #[error("state {state} is declared more than once")]
    DuplicateState { state: String },
    #[error("{context} produced undeclared state {state}")]
    UndeclaredState { state: String, context: String },
    #[error("{context} produced undeclared observation {observation}")]
    UndeclaredObservation {
        observation: String,
        context: String,
    },
    #[error("model is missing its {0}")]
    MissingComponent(&'static str),
    #[error("{field} = {value} is out of range")]
    InvalidParameter { field: &'static str, value: f64 },
    #[error(transparent)]
    Distribution(#[from] DistributionError),
}
