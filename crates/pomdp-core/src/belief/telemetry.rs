use super::Belief;
use serde::Serialize;

/// Compact summary of a belief used in step logs.
#[derive(Debug, Clone, Serialize)]
pub struct BeliefMetrics {
    /// Shannon entropy in nats.
    pub entropy: f64,
    pub mode_index: usize,
    pub mode_probability: f64,
}

impl BeliefMetrics {
    pub fn from_belief(belief: &Belief) -> Self {
        let mut entropy = 0.0;
        for prob in belief.as_slice() {
            if *prob > 0.0 {
                entropy -= prob * prob.ln();
            }
        }

        let (mode_index, mode_probability) = belief.most_likely().unwrap_or((0, 0.0));
        Self {
            entropy,
            mode_index,
            mode_probability,
        }
    }
}
