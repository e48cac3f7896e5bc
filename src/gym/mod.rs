//! Ready-made models, useful for demos and as fixtures
pub mod bandit_walk;
pub mod frozen_lake;
pub mod good_bad;

pub use bandit_walk::{bandit_walk, WalkAction, WalkState};
pub use frozen_lake::{frozen_lake, FLAction};
pub use good_bad::{good_bad, GBAction, GBState};
