//! Step-by-step simulation of a policy against a model.
//!
//! A [`Simulation`] owns the hidden true state, the agent's belief and the random source
//! for one run. Each call to `next` advances the run by one step:
//! act on the belief, sample the transition, sample the observation, collect the reward and
//! filter the belief. The run ends when the state becomes terminal, the step limit is hit, or
//! the cancel flag is raised.

mod outcome;

pub use outcome::{RunEnd, SimulationOutcome, Step, simulate};

use pomdp_core::belief::{Belief, BeliefError, BeliefMetrics};
use pomdp_core::model::Pomdp;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cancel::CancelFlag;
use crate::policy::Policy;

/// Step limit used by the reference scripts.
pub const DEFAULT_MAX_STEPS: usize = 10;

type StepOf<M> = Step<<M as Pomdp>::State, <M as Pomdp>::Action, <M as Pomdp>::Observation>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Stepping,
    Finished(RunEnd),
    Failed,
}

/// One simulation run. Yields `Ok(step)` until the run ends; after the run ends, or after
/// the first error, it yields `None`.
pub struct Simulation<'a, M: Pomdp, P, R> {
    model: &'a M,
    policy: &'a P,
    rng: R,
    state: M::State,
    belief: Belief,
    max_steps: usize,
    cancel: Option<CancelFlag>,
    phase: Phase,
    t: usize,
    discount_weight: f64,
    total_reward: f64,
    discounted_reward: f64,
}

impl<'a, M, P, R> Simulation<'a, M, P, R>
where
    M: Pomdp,
    P: Policy<Action = M::Action>,
    R: Rng,
{
    /// Starts a run from the model's initial-state distribution: the true state is sampled
    /// from it and the belief is set equal to it.
    pub fn new(model: &'a M, policy: &'a P, mut rng: R) -> Result<Self, SimulationError> {
        let initial = model.initial_state();
        let belief = Belief::from_distribution(model, &initial)?;
        let state = initial.sample(&mut rng).clone();
        Ok(Self::from_parts(model, policy, belief, state, rng))
    }

    /// Starts a run from an explicit belief and true state.
    pub fn from_state(
        model: &'a M,
        policy: &'a P,
        belief: Belief,
        state: M::State,
        rng: R,
    ) -> Result<Self, SimulationError> {
        let expected = model.states().len();
        if belief.len() != expected {
            return Err(BeliefError::DimensionMismatch {
                expected,
                found: belief.len(),
            }
            .into());
        }
        if model.state_index(&state).is_none() {
            return Err(BeliefError::UndeclaredState {
                state: format!("{state:?}"),
            }
            .into());
        }
        Ok(Self::from_parts(model, policy, belief, state, rng))
    }

    fn from_parts(model: &'a M, policy: &'a P, belief: Belief, state: M::State, rng: R) -> Self {
        let phase = if model.is_terminal(&state) {
            Phase::Finished(RunEnd::Terminated)
        } else {
            Phase::Stepping
        };
        Self {
            model,
            policy,
            rng,
            state,
            belief,
            max_steps: DEFAULT_MAX_STEPS,
            cancel: None,
            phase,
            t: 0,
            discount_weight: 1.0,
            total_reward: 0.0,
            discounted_reward: 0.0,
        }
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// True state the run is currently in.
    pub fn state(&self) -> &M::State {
        &self.state
    }

    pub fn belief(&self) -> &Belief {
        &self.belief
    }

    pub fn steps_taken(&self) -> usize {
        self.t
    }

    /// Undiscounted sum of rewards collected so far.
    pub fn total_reward(&self) -> f64 {
        self.total_reward
    }

    /// `Σ γ^t r_t` over the steps taken so far.
    pub fn discounted_reward(&self) -> f64 {
        self.discounted_reward
    }

    /// How the run ended, once it has.
    pub fn end(&self) -> Option<RunEnd> {
        match self.phase {
            Phase::Finished(end) => Some(end),
            Phase::Stepping | Phase::Failed => None,
        }
    }

    fn advance(&mut self) -> Result<StepOf<M>, SimulationError> {
        let action = self.policy.action(&self.belief);
        let next_state = self
            .model
            .transition(&self.state, &action)
            .sample(&mut self.rng)
            .clone();
        let observation = self
            .model
            .observation(&self.state, &action, &next_state)
            .sample(&mut self.rng)
            .clone();
        let reward = self.model.reward(&self.state, &action, &next_state);

        let belief = match self.belief.update(self.model, &action, &observation) {
            Ok(belief) => belief,
            Err(BeliefError::Collapse { .. }) => {
                return Err(SimulationError::BeliefCollapse {
                    state: format!("{next_state:?}"),
                    action: format!("{action:?}"),
                    observation: format!("{observation:?}"),
                    step: self.t,
                });
            }
            Err(other) => return Err(other.into()),
        };

        self.total_reward += reward;
        self.discounted_reward += self.discount_weight * reward;
        self.discount_weight *= self.model.discount();

        if tracing::enabled!(tracing::Level::DEBUG) {
            let metrics = BeliefMetrics::from_belief(&belief);
            debug!(
                t = self.t,
                state = ?self.state,
                action = ?action,
                observation = ?observation,
                reward,
                entropy = metrics.entropy,
                mode_index = metrics.mode_index,
                mode_probability = metrics.mode_probability,
                belief_hash = belief.summary_hash(),
                "simulation step"
            );
        }

        let step = Step {
            t: self.t,
            state: std::mem::replace(&mut self.state, next_state.clone()),
            action,
            observation,
            reward,
            next_state,
            belief: belief.clone(),
        };
        self.belief = belief;
        self.t += 1;
        Ok(step)
    }
}

impl<M, P, R> Iterator for Simulation<'_, M, P, R>
where
    M: Pomdp,
    P: Policy<Action = M::Action>,
    R: Rng,
{
    type Item = Result<StepOf<M>, SimulationError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.phase != Phase::Stepping {
            return None;
        }
        if self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
            warn!(t = self.t, "simulation cancelled");
            self.phase = Phase::Finished(RunEnd::Cancelled);
            return None;
        }
        if self.t >= self.max_steps {
            self.phase = Phase::Finished(RunEnd::StepLimitReached);
            return None;
        }

        match self.advance() {
            Ok(step) => {
                if self.model.is_terminal(&self.state) {
                    self.phase = Phase::Finished(RunEnd::Terminated);
                }
                Some(Ok(step))
            }
            Err(err) => {
                self.phase = Phase::Failed;
                Some(Err(err))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error(
        "belief collapsed at step {step}: observation {observation} after action {action} \
         (true state {state}) has zero probability under the current belief"
    )]
    BeliefCollapse {
        state: String,
        action: String,
        observation: String,
        step: usize,
    },
    #[error(transparent)]
    Belief(#[from] BeliefError),
}
