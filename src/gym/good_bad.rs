use strum::{EnumIter, IntoEnumIterator, IntoStaticStr};

use crate::{error::Result, model::TransitionModel};

#[derive(EnumIter, IntoStaticStr, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum GBState {
    Good,
    Bad,
}

#[derive(EnumIter, IntoStaticStr, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum GBAction {
    Stay,
    Go,
}

/// Two states: staying in `Good` pays 1 per step, going pays 5 once and ends in the absorbing `Bad`
pub fn good_bad() -> Result<TransitionModel<GBState, GBAction>> {
    let mut builder = TransitionModel::builder()
        .state(GBState::Good)
        .terminal(GBState::Bad);
    for s in GBState::iter() {
        builder = builder.state_name(s, <&str>::from(s));
    }
    for a in GBAction::iter() {
        builder = builder.action(a).action_name(a, <&str>::from(a));
    }

    builder
        .deterministic(GBState::Good, GBAction::Stay, GBState::Good, 1.0)
        .deterministic(GBState::Good, GBAction::Go, GBState::Bad, 5.0)
        .initial(GBState::Good)
        .build()
}
