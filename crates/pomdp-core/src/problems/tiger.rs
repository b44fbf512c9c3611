//! The tiger listening problem.
//!
//! A tiger hides behind one of two doors. The agent may listen (small cost, noisy report of
//! the tiger's side) or open a door: opening the tiger's door is heavily penalised, opening
//! the other door lets the agent escape. Either way the tiger is then re-hidden uniformly.

use crate::distribution::Distribution;
use crate::model::{ModelError, Pomdp, check_discount};
use core::fmt;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Left, Side::Right];

    pub const fn other(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Side::Left => "left",
            Side::Right => "right",
        };
        f.write_str(label)
    }
}

/// Hidden state: the door the tiger is behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TigerState {
    pub tiger: Side,
}

impl TigerState {
    pub const fn new(tiger: Side) -> Self {
        Self { tiger }
    }
}

impl fmt::Display for TigerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tiger-{}", self.tiger)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TigerAction {
    /// Open the left door.
    Left,
    /// Open the right door.
    Right,
    Listen,
}

impl TigerAction {
    /// Declared action order; the policy breaks value ties in this order.
    pub const ALL: [TigerAction; 3] = [TigerAction::Left, TigerAction::Right, TigerAction::Listen];

    pub const fn door(self) -> Option<Side> {
        match self {
            TigerAction::Left => Some(Side::Left),
            TigerAction::Right => Some(Side::Right),
            TigerAction::Listen => None,
        }
    }
}

impl fmt::Display for TigerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TigerAction::Left => "left",
            TigerAction::Right => "right",
            TigerAction::Listen => "listen",
        };
        f.write_str(label)
    }
}

/// Tunable constants of the tiger problem.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TigerConfig {
    pub discount: f64,
    /// Probability that listening reports the tiger's true side.
    pub listen_accuracy: f64,
    pub listen_cost: f64,
    /// Reward for opening the door the tiger is behind.
    pub tiger_penalty: f64,
    /// Reward for opening the other door.
    pub escape_reward: f64,
}

impl Default for TigerConfig {
    fn default() -> Self {
        Self {
            discount: 0.95,
            listen_accuracy: 0.85,
            listen_cost: -1.0,
            tiger_penalty: -100.0,
            escape_reward: 10.0,
        }
    }
}

impl TigerConfig {
    pub fn validate(&self) -> Result<(), ModelError> {
        check_discount(self.discount)?;
        if !(0.0..=1.0).contains(&self.listen_accuracy) {
            return Err(ModelError::InvalidParameter {
                field: "listen_accuracy",
                value: self.listen_accuracy,
            });
        }
        for (field, value) in [
            ("listen_cost", self.listen_cost),
            ("tiger_penalty", self.tiger_penalty),
            ("escape_reward", self.escape_reward),
        ] {
            if !value.is_finite() {
                return Err(ModelError::InvalidParameter { field, value });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct TigerPomdp {
    config: TigerConfig,
    states: [TigerState; 2],
    observations: [Side; 2],
    reset: Distribution<TigerState>,
    noise: Distribution<Side>,
    heard: [Distribution<Side>; 2],
}

impl TigerPomdp {
    pub fn new(config: TigerConfig) -> Result<Self, ModelError> {
        config.validate()?;
        let states = [TigerState::new(Side::Left), TigerState::new(Side::Right)];
        let accuracy = config.listen_accuracy;
        let heard_left =
            Distribution::sparse_cat([Side::Left, Side::Right], [accuracy, 1.0 - accuracy])?;
        let heard_right =
            Distribution::sparse_cat([Side::Right, Side::Left], [accuracy, 1.0 - accuracy])?;

        Ok(Self {
            config,
            states,
            observations: Side::ALL,
            reset: Distribution::uniform(states)?,
            noise: Distribution::uniform(Side::ALL)?,
            heard: [heard_left, heard_right],
        })
    }

    pub fn config(&self) -> &TigerConfig {
        &self.config
    }
}

impl Pomdp for TigerPomdp {
    type State = TigerState;
    type Action = TigerAction;
    type Observation = Side;

    fn states(&self) -> &[TigerState] {
        &self.states
    }

    fn actions(&self) -> &[TigerAction] {
        &TigerAction::ALL
    }

    fn observations(&self) -> &[Side] {
        &self.observations
    }

    fn discount(&self) -> f64 {
        self.config.discount
    }

    fn transition(&self, state: &TigerState, action: &TigerAction) -> Distribution<TigerState> {
        match action {
            // The tiger stays put while the agent listens.
            TigerAction::Listen => Distribution::deterministic(*state),
            TigerAction::Left | TigerAction::Right => self.reset.clone(),
        }
    }

    fn observation(
        &self,
        _state: &TigerState,
        action: &TigerAction,
        next_state: &TigerState,
    ) -> Distribution<Side> {
        match action {
            TigerAction::Listen => self.heard[next_state.tiger as usize].clone(),
            TigerAction::Left | TigerAction::Right => self.noise.clone(),
        }
    }

    fn reward(&self, state: &TigerState, action: &TigerAction, _next_state: &TigerState) -> f64 {
        match action.door() {
            None => self.config.listen_cost,
            Some(door) if door == state.tiger => self.config.tiger_penalty,
            Some(_) => self.config.escape_reward,
        }
    }

    fn initial_state(&self) -> Distribution<TigerState> {
        self.reset.clone()
    }

    fn state_index(&self, state: &TigerState) -> Option<usize> {
        Some(state.tiger as usize)
    }
}
