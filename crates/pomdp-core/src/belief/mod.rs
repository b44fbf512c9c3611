//! Belief tracking over a model's declared states.
//!
//! This module is composed of:
//! - `dense`: the probability vector (`Belief`) and its Bayesian filter update.
//! - `telemetry`: entropy and mode summaries for logging.

mod dense;
pub mod telemetry;

pub use dense::{Belief, BeliefError};
pub use telemetry::BeliefMetrics;
