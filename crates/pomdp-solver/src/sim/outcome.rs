use pomdp_core::belief::Belief;
use pomdp_core::model::Pomdp;
use rand::Rng;
use serde::Serialize;

use super::{Simulation, SimulationError};
use crate::policy::Policy;

/// How a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEnd {
    Terminated,
    StepLimitReached,
    Cancelled,
}

/// One transition of a run. `belief` is the belief after filtering on `observation`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step<S, A, O> {
    pub t: usize,
    pub state: S,
    pub action: A,
    pub observation: O,
    pub reward: f64,
    pub next_state: S,
    pub belief: Belief,
}

/// Everything a finished run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOutcome<S, A, O> {
    pub steps: Vec<Step<S, A, O>>,
    pub total_reward: f64,
    pub discounted_reward: f64,
    pub end: RunEnd,
}

impl<S, A, O> SimulationOutcome<S, A, O> {
    /// Drains `sim` and records how it ended. A run stopped by its cancel flag comes back
    /// with `end == RunEnd::Cancelled` and the steps taken so far.
    pub fn collect<M, P, R>(mut sim: Simulation<'_, M, P, R>) -> Result<Self, SimulationError>
    where
        M: Pomdp<State = S, Action = A, Observation = O>,
        P: Policy<Action = A>,
        R: Rng,
    {
        let steps = sim.by_ref().collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            steps,
            total_reward: sim.total_reward(),
            discounted_reward: sim.discounted_reward(),
            end: sim.end().unwrap_or(RunEnd::StepLimitReached),
        })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Runs one simulation of at most `max_steps` steps from the model's initial state and
/// collects it.
pub fn simulate<M, P, R>(
    model: &M,
    policy: &P,
    max_steps: usize,
    rng: R,
) -> Result<SimulationOutcome<M::State, M::Action, M::Observation>, SimulationError>
where
    M: Pomdp,
    P: Policy<Action = M::Action>,
    R: Rng,
{
    SimulationOutcome::collect(Simulation::new(model, policy, rng)?.max_steps(max_steps))
}
