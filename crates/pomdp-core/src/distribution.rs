//! Finite discrete probability distributions over model outcomes.

use core::fmt;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum deviation from one tolerated when validating a weight vector.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Construction variant a [`Distribution`] was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionKind {
    Uniform,
    Deterministic,
    SparseCat,
}

impl fmt::Display for DistributionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DistributionKind::Uniform => "Uniform",
            DistributionKind::Deterministic => "Deterministic",
            DistributionKind::SparseCat => "SparseCat",
        };
        f.write_str(label)
    }
}

/// Immutable outcome → weight table. Only outcomes with nonzero weight are stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution<T> {
    kind: DistributionKind,
    entries: Vec<(T, f64)>,
}

impl<T: Clone + PartialEq> Distribution<T> {
    /// Equal weight over every distinct outcome. Repeated outcomes are collapsed.
    pub fn uniform<I>(outcomes: I) -> Result<Self, DistributionError>
    where
        I: IntoIterator<Item = T>,
    {
        let mut distinct: Vec<T> = Vec::new();
        for outcome in outcomes {
            if !distinct.contains(&outcome) {
                distinct.push(outcome);
            }
        }

        if distinct.is_empty() {
            return Err(DistributionError::Empty {
                kind: DistributionKind::Uniform,
            });
        }

        let weight = 1.0 / distinct.len() as f64;
        Ok(Self {
            kind: DistributionKind::Uniform,
            entries: distinct.into_iter().map(|o| (o, weight)).collect(),
        })
    }

    /// All mass on a single outcome.
    pub fn deterministic(outcome: T) -> Self {
        Self {
            kind: DistributionKind::Deterministic,
            entries: vec![(outcome, 1.0)],
        }
    }

    /// Explicit categorical distribution. Zero weights are dropped and repeated outcomes
    /// have their weights merged.
    pub fn sparse_cat<I, W>(outcomes: I, weights: W) -> Result<Self, DistributionError>
    where
        I: IntoIterator<Item = T>,
        W: IntoIterator<Item = f64>,
    {
        let outcomes: Vec<T> = outcomes.into_iter().collect();
        let weights: Vec<f64> = weights.into_iter().collect();
        if outcomes.len() != weights.len() {
            return Err(DistributionError::LengthMismatch {
                outcomes: outcomes.len(),
                weights: weights.len(),
            });
        }

        let mut entries: Vec<(T, f64)> = Vec::with_capacity(outcomes.len());
        let mut total = 0.0_f64;
        for (index, (outcome, weight)) in outcomes.into_iter().zip(weights).enumerate() {
            if !weight.is_finite() {
                return Err(DistributionError::NonFiniteWeight { index });
            }
            if weight < 0.0 {
                return Err(DistributionError::NegativeWeight { index, weight });
            }
            total += weight;
            if weight == 0.0 {
                continue;
            }
            match entries.iter_mut().find(|(existing, _)| *existing == outcome) {
                Some((_, merged)) => *merged += weight,
                None => entries.push((outcome, weight)),
            }
        }

        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(DistributionError::NotNormalized { total });
        }

        Ok(Self {
            kind: DistributionKind::SparseCat,
            entries,
        })
    }

    /// Stored weight of `outcome`, or exactly 0 when it lies outside the support.
    pub fn probability_of(&self, outcome: &T) -> f64 {
        self.entries
            .iter()
            .find(|(candidate, _)| candidate == outcome)
            .map(|(_, weight)| *weight)
            .unwrap_or(0.0)
    }
}

impl<T> Distribution<T> {
    /// Draws one outcome using `rng`.
    ///
    /// Consumes exactly one `f64` draw, except for [`DistributionKind::Deterministic`]
    /// which consumes none.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> &T {
        let last = self.entries.len() - 1;
        if self.kind == DistributionKind::Deterministic {
            return &self.entries[last].0;
        }

        let mut draw: f64 = rng.r#gen();
        for (outcome, weight) in &self.entries {
            if draw < *weight {
                return outcome;
            }
            draw -= weight;
        }
        // Rounding left a sliver of mass past the final bucket.
        &self.entries[last].0
    }

    /// Outcomes with nonzero weight, in construction order.
    pub fn support(&self) -> impl Iterator<Item = &T> + '_ {
        self.entries.iter().map(|(outcome, _)| outcome)
    }

    /// `(outcome, weight)` pairs in construction order.
    pub fn iter(&self) -> impl Iterator<Item = (&T, f64)> + '_ {
        self.entries.iter().map(|(outcome, weight)| (outcome, *weight))
    }

    pub fn kind(&self) -> DistributionKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Distributions can only be built with at least one outcome.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Malformed weights rejected at construction time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DistributionError {
    #[error("invalid distribution: {kind} over an empty outcome set")]
    Empty { kind: DistributionKind },
    #[error("invalid distribution: {outcomes} outcomes but {weights} weights")]
    LengthMismatch { outcomes: usize, weights: usize },
    #[error("invalid distribution: weight {weight} at index {index} is negative")]
    NegativeWeight { index: usize, weight: f64 },
    #[error("invalid distribution: weight at index {index} is not finite")]
    NonFiniteWeight { index: usize },
    #[error("invalid distribution: weights sum to {total}, expected 1")]
    NotNormalized { total: f64 },
}
