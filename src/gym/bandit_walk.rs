use strum::{EnumIter, IntoEnumIterator, IntoStaticStr};

use crate::{error::Result, model::TransitionModel};

#[derive(EnumIter, IntoStaticStr, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum WalkState {
    Hole = 0,
    Start = 1,
    Goal = 2,
}

#[derive(EnumIter, IntoStaticStr, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum WalkAction {
    Left = 0,
    Right = 1,
}

/// A three square corridor: `Hole | Start | Goal`
///
/// Stepping left from `Start` drops into the hole for nothing, stepping right reaches
/// the goal for a reward of 1. Both ends are terminal.
pub fn bandit_walk() -> Result<TransitionModel<WalkState, WalkAction>> {
    let mut builder = TransitionModel::builder();
    for s in WalkState::iter() {
        builder = match s {
            WalkState::Start => builder.state(s),
            _ => builder.terminal(s),
        }
        .state_name(s, <&str>::from(s));
    }
    for a in WalkAction::iter() {
        builder = builder.action(a).action_name(a, <&str>::from(a));
    }

    builder
        .deterministic(WalkState::Start, WalkAction::Left, WalkState::Hole, 0.0)
        .deterministic(WalkState::Start, WalkAction::Right, WalkState::Goal, 1.0)
        .initial(WalkState::Start)
        .build()
}
