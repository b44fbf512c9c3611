use core::fmt;

use pomdp_core::belief::Belief;
use thiserror::Error;

use crate::qmdp::SolveReport;

/// Maps a belief to an action. Implementations are read-only after construction, so one
/// policy can drive many simulations on separate threads.
pub trait Policy: Send + Sync {
    type Action;

    fn action(&self, belief: &Belief) -> Self::Action;
}

/// Piecewise-linear value function: one alpha-vector per action, indexed by state.
#[derive(Debug, Clone, PartialEq)]
pub struct AlphaVectorPolicy<A> {
    actions: Vec<A>,
    alphas: Vec<Vec<f64>>,
    report: SolveReport,
}

impl<A> AlphaVectorPolicy<A> {
    pub(crate) fn new(actions: Vec<A>, alphas: Vec<Vec<f64>>, report: SolveReport) -> Self {
        debug_assert_eq!(actions.len(), alphas.len());
        Self {
            actions,
            alphas,
            report,
        }
    }

    /// Raw alpha-vectors in declared action order.
    pub fn value_vectors(&self) -> &[Vec<f64>] {
        &self.alphas
    }

    pub fn actions(&self) -> &[A] {
        &self.actions
    }

    pub fn report(&self) -> &SolveReport {
        &self.report
    }

    /// Number of states each alpha-vector covers.
    pub fn state_count(&self) -> usize {
        self.alphas.first().map_or(0, Vec::len)
    }

    /// Expected value of every action under `belief`, in declared action order.
    pub fn action_values(&self, belief: &Belief) -> Vec<f64> {
        self.alphas
            .iter()
            .map(|alpha| dot(alpha, belief.as_slice()))
            .collect()
    }

    /// `argmax_a Σ_s b(s) α_a(s)`; ties go to the earliest declared action.
    pub fn best_action(&self, belief: &Belief) -> &A {
        &self.actions[self.best_index(belief)]
    }

    pub fn try_best_action(&self, belief: &Belief) -> Result<&A, PolicyError> {
        if belief.len() != self.state_count() {
            return Err(PolicyError::DimensionMismatch {
                expected: self.state_count(),
                found: belief.len(),
            });
        }
        Ok(self.best_action(belief))
    }

    /// Value of the best action under `belief`.
    pub fn value(&self, belief: &Belief) -> f64 {
        self.action_values(belief)
            .into_iter()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    fn best_index(&self, belief: &Belief) -> usize {
        let mut best_index = 0;
        let mut best_value = f64::NEG_INFINITY;
        for (index, alpha) in self.alphas.iter().enumerate() {
            let value = dot(alpha, belief.as_slice());
            if value > best_value {
                best_value = value;
                best_index = index;
            }
        }
        best_index
    }
}

impl<A: PartialEq> AlphaVectorPolicy<A> {
    pub fn alpha_for(&self, action: &A) -> Option<&[f64]> {
        self.actions
            .iter()
            .position(|candidate| candidate == action)
            .map(|index| self.alphas[index].as_slice())
    }
}

impl<A> Policy for AlphaVectorPolicy<A>
where
    A: Clone + Send + Sync,
{
    type Action = A;

    fn action(&self, belief: &Belief) -> A {
        self.best_action(belief).clone()
    }
}

impl<A: fmt::Display> fmt::Display for AlphaVectorPolicy<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (action, alpha) in self.actions.iter().zip(&self.alphas) {
            write!(f, "{action}:")?;
            for value in alpha {
                write!(f, " {value:.3}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

fn dot(alpha: &[f64], probs: &[f64]) -> f64 {
    alpha
        .iter()
        .zip(probs)
        .filter(|(_, p)| **p != 0.0)
        .map(|(value, p)| value * p)
        .sum()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("belief has {found} entries but alpha-vectors cover {expected} states")]
    DimensionMismatch { expected: usize, found: usize },
}
