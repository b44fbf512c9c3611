use super::{ModelError, Pomdp, validate};
use crate::distribution::Distribution;
use core::fmt;
use std::collections::HashMap;
use std::hash::Hash;

type TransitionFn<S, A> = Box<dyn Fn(&S, &A) -> Distribution<S> + Send + Sync>;
type ObservationFn<S, A, O> = Box<dyn Fn(&S, &A, &S) -> Distribution<O> + Send + Sync>;
type RewardFn<S, A> = Box<dyn Fn(&S, &A, &S) -> f64 + Send + Sync>;
type TerminalFn<S> = Box<dyn Fn(&S) -> bool + Send + Sync>;

const DEFAULT_DISCOUNT: f64 = 0.95;

/// Model defined by plain closures over enumerated spaces.
pub struct QuickPomdp<S, A, O> {
    states: Vec<S>,
    actions: Vec<A>,
    observations: Vec<O>,
    discount: f64,
    transition: TransitionFn<S, A>,
    observation: ObservationFn<S, A, O>,
    reward: RewardFn<S, A>,
    terminal: Option<TerminalFn<S>>,
    initial_state: Distribution<S>,
    index: HashMap<S, usize>,
}

impl<S, A, O> QuickPomdp<S, A, O>
where
    S: Clone + Eq + Hash + fmt::Debug,
    A: Clone + Eq + fmt::Debug,
    O: Clone + Eq + fmt::Debug,
{
    pub fn builder() -> QuickPomdpBuilder<S, A, O> {
        QuickPomdpBuilder::default()
    }
}

impl<S, A, O> fmt::Debug for QuickPomdp<S, A, O>
where
    S: fmt::Debug,
    A: fmt::Debug,
    O: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuickPomdp")
            .field("states", &self.states)
            .field("actions", &self.actions)
            .field("observations", &self.observations)
            .field("discount", &self.discount)
            .field("terminal", &self.terminal.is_some())
            .finish_non_exhaustive()
    }
}

impl<S, A, O> Pomdp for QuickPomdp<S, A, O>
where
    S: Clone + Eq + Hash + fmt::Debug,
    A: Clone + Eq + fmt::Debug,
    O: Clone + Eq + fmt::Debug,
{
    type State = S;
    type Action = A;
    type Observation = O;

    fn states(&self) -> &[S] {
        &self.states
    }

    fn actions(&self) -> &[A] {
        &self.actions
    }

    fn observations(&self) -> &[O] {
        &self.observations
    }

    fn discount(&self) -> f64 {
        self.discount
    }

    fn transition(&self, state: &S, action: &A) -> Distribution<S> {
        (self.transition)(state, action)
    }

    fn observation(&self, state: &S, action: &A, next_state: &S) -> Distribution<O> {
        (self.observation)(state, action, next_state)
    }

    fn reward(&self, state: &S, action: &A, next_state: &S) -> f64 {
        (self.reward)(state, action, next_state)
    }

    fn is_terminal(&self, state: &S) -> bool {
        self.terminal.as_ref().is_some_and(|terminal| terminal(state))
    }

    fn initial_state(&self) -> Distribution<S> {
        self.initial_state.clone()
    }

    fn state_index(&self, state: &S) -> Option<usize> {
        self.index.get(state).copied()
    }
}

/// Collects the pieces of a [`QuickPomdp`]; [`QuickPomdpBuilder::build`] validates them.
pub struct QuickPomdpBuilder<S, A, O> {
    states: Vec<S>,
    actions: Vec<A>,
    observations: Vec<O>,
    discount: f64,
    transition: Option<TransitionFn<S, A>>,
    observation: Option<ObservationFn<S, A, O>>,
    reward: Option<RewardFn<S, A>>,
    terminal: Option<TerminalFn<S>>,
    initial_state: Option<Distribution<S>>,
}

impl<S, A, O> Default for QuickPomdpBuilder<S, A, O> {
    fn default() -> Self {
        Self {
            states: Vec::new(),
            actions: Vec::new(),
            observations: Vec::new(),
            discount: DEFAULT_DISCOUNT,
            transition: None,
            observation: None,
            reward: None,
            terminal: None,
            initial_state: None,
        }
    }
}

impl<S, A, O> QuickPomdpBuilder<S, A, O>
where
    S: Clone + Eq + Hash + fmt::Debug,
    A: Clone + Eq + fmt::Debug,
    O: Clone + Eq + fmt::Debug,
{
    pub fn states(mut self, states: impl IntoIterator<Item = S>) -> Self {
        self.states = states.into_iter().collect();
        self
    }

    pub fn actions(mut self, actions: impl IntoIterator<Item = A>) -> Self {
        self.actions = actions.into_iter().collect();
        self
    }

    pub fn observations(mut self, observations: impl IntoIterator<Item = O>) -> Self {
        self.observations = observations.into_iter().collect();
        self
    }

    pub fn discount(mut self, discount: f64) -> Self {
        self.discount = discount;
        self
    }

    pub fn transition<F>(mut self, transition: F) -> Self
    where
        F: Fn(&S, &A) -> Distribution<S> + Send + Sync + 'static,
    {
        self.transition = Some(Box::new(transition));
        self
    }

    pub fn observation<F>(mut self, observation: F) -> Self
    where
        F: Fn(&S, &A, &S) -> Distribution<O> + Send + Sync + 'static,
    {
        self.observation = Some(Box::new(observation));
        self
    }

    pub fn reward<F>(mut self, reward: F) -> Self
    where
        F: Fn(&S, &A, &S) -> f64 + Send + Sync + 'static,
    {
        self.reward = Some(Box::new(reward));
        self
    }

    pub fn terminal<F>(mut self, terminal: F) -> Self
    where
        F: Fn(&S) -> bool + Send + Sync + 'static,
    {
        self.terminal = Some(Box::new(terminal));
        self
    }

    pub fn initial_state(mut self, initial_state: Distribution<S>) -> Self {
        self.initial_state = Some(initial_state);
        self
    }

    pub fn build(self) -> Result<QuickPomdp<S, A, O>, ModelError> {
        let transition = self
            .transition
            .ok_or(ModelError::MissingComponent("transition function"))?;
        let observation = self
            .observation
            .ok_or(ModelError::MissingComponent("observation function"))?;
        let reward = self
            .reward
            .ok_or(ModelError::MissingComponent("reward function"))?;
        let initial_state = self
            .initial_state
            .ok_or(ModelError::MissingComponent("initial state distribution"))?;

        let mut index = HashMap::with_capacity(self.states.len());
        for (position, state) in self.states.iter().enumerate() {
            if index.insert(state.clone(), position).is_some() {
                return Err(ModelError::DuplicateState {
                    state: format!("{state:?}"),
                });
            }
        }

        let model = QuickPomdp {
            states: self.states,
            actions: self.actions,
            observations: self.observations,
            discount: self.discount,
            transition,
            observation,
            reward,
            terminal: self.terminal,
            initial_state,
            index,
        };
        validate(&model)?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coin() -> QuickPomdpBuilder<u8, &'static str, bool> {
        QuickPomdp::builder()
            .states([0u8, 1])
            .actions(["stay", "flip"])
            .observations([false, true])
            .transition(|s: &u8, a| match *a {
                "flip" => Distribution::deterministic(1 - *s),
                _ => Distribution::deterministic(*s),
            })
            .observation(|_, _, sp: &u8| Distribution::deterministic(*sp == 1))
            .reward(|_, _, sp: &u8| f64::from(*sp))
    }

    #[test]
    fn builds_with_defaults() {
        let model = coin()
            .initial_state(Distribution::deterministic(0))
            .build()
            .expect("valid model");
        assert_eq!(model.discount(), DEFAULT_DISCOUNT);
        assert!(!model.is_terminal(&1));
        assert_eq!(model.state_index(&1), Some(1));
        assert_eq!(model.state_index(&7), None);
    }

    #[test]
    fn missing_initial_state_is_reported() {
        let err = coin().build().expect_err("missing initial state");
        assert_eq!(
            err,
            ModelError::MissingComponent("initial state distribution")
        );
    }

    #[test]
    fn duplicate_states_are_rejected() {
        let err = coin()
            .states([0u8, 1, 0])
            .initial_state(Distribution::deterministic(0))
            .build()
            .expect_err("duplicate");
        assert!(matches!(err, ModelError::DuplicateState { .. }));
    }

    #[test]
    fn undeclared_transition_target_is_rejected() {
        let err = coin()
            .transition(|s: &u8, _| Distribution::deterministic(*s + 1))
            .initial_state(Distribution::deterministic(0))
            .build()
            .expect_err("state 2 is not declared");
        assert!(matches!(err, ModelError::UndeclaredState { ref state, .. } if state == "2"));
    }

    #[test]
    fn undeclared_observation_is_rejected() {
        let err = coin()
            .observations([false])
            .initial_state(Distribution::deterministic(0))
            .build()
            .expect_err("true is not declared");
        assert!(matches!(err, ModelError::UndeclaredObservation { .. }));
    }

    #[test]
    fn terminal_predicate_is_consulted() {
        let model = coin()
            .terminal(|s: &u8| *s == 1)
            .initial_state(Distribution::deterministic(0))
            .build()
            .expect("valid");
        assert!(model.is_terminal(&1));
        assert!(!model.is_terminal(&0));
    }
}
