use strum::{EnumIter, FromRepr, IntoEnumIterator, IntoStaticStr};

use crate::{error::Result, model::TransitionModel};

#[derive(PartialEq, Clone, Copy)]
enum Square {
    Frozen,
    Hole,
    Start,
    Goal,
}

#[derive(EnumIter, IntoStaticStr, FromRepr, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum FLAction {
    Left = 0,
    Down = 1,
    Right = 2,
    Up = 3,
}

impl FLAction {
    /// The two directions at right angles to `self`
    fn perpendicular(self) -> [FLAction; 2] {
        let i = self as usize;
        [(i + 3) % 4, (i + 1) % 4].map(|j| Self::from_repr(j).unwrap_or(self))
    }
}

const MAP: [Square; 16] = [
    Square::Start,
    Square::Frozen,
    Square::Frozen,
    Square::Frozen,
    Square::Frozen,
    Square::Hole,
    Square::Frozen,
    Square::Hole,
    Square::Frozen,
    Square::Frozen,
    Square::Frozen,
    Square::Hole,
    Square::Hole,
    Square::Frozen,
    Square::Frozen,
    Square::Goal,
];

/// Square reached by moving from `pos`, or `None` if the move leaves the grid
fn neighbor(pos: usize, action: FLAction) -> Option<usize> {
    match action {
        FLAction::Left => (pos % 4 != 0).then(|| pos - 1),
        FLAction::Down => (pos < 12).then(|| pos + 4),
        FLAction::Right => (pos % 4 != 3).then(|| pos + 1),
        FLAction::Up => (pos > 3).then(|| pos - 4),
    }
}

fn reward(pos: usize) -> f64 {
    match MAP[pos] {
        Square::Goal => 1.0,
        _ => 0.0,
    }
}

/// The 4x4 FrozenLake from Python [gymnasium](https://gymnasium.farama.org/) as a tabular model
///
/// States are square indices `0..16` in row-major order. Holes and the goal are terminal,
/// and reaching the goal pays 1.
///
/// When `slippery` is false moves are deterministic and only moves that stay on the grid
/// are legal. When `slippery` is true every action is legal, the agent moves in the
/// intended direction or one of the two perpendicular directions with probability 1/3
/// each, and a move off the grid leaves it in place.
pub fn frozen_lake(slippery: bool) -> Result<TransitionModel<usize, FLAction>> {
    let mut builder = TransitionModel::builder();
    for (pos, square) in MAP.iter().enumerate() {
        builder = match square {
            Square::Frozen | Square::Start => builder.state(pos),
            Square::Hole | Square::Goal => builder.terminal(pos),
        };
    }
    for a in FLAction::iter() {
        builder = builder.action(a).action_name(a, <&str>::from(a));
    }

    let active = (0..MAP.len()).filter(|&pos| matches!(MAP[pos], Square::Frozen | Square::Start));
    for pos in active {
        if slippery {
            for a in FLAction::iter() {
                let [l, r] = a.perpendicular();
                for dir in [l, a, r] {
                    let next = neighbor(pos, dir).unwrap_or(pos);
                    builder = builder.transition(pos, a, next, 1.0 / 3.0, reward(next));
                }
            }
        } else {
            let legal = FLAction::iter()
                .filter_map(|a| neighbor(pos, a).map(|next| (a, next)))
                .collect::<Vec<_>>();
            builder = builder.allow(pos, legal.iter().map(|&(a, _)| a));
            for (a, next) in legal {
                builder = builder.deterministic(pos, a, next, reward(next));
            }
        }
    }

    builder.initial(0).build()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use float_eq::assert_float_eq;

    use super::*;
    use crate::{
        algo::{extract, rollout, solve},
        env::MdpEnvironment,
    };

    #[test]
    fn edge_actions_are_restricted() {
        let model = frozen_lake(false).unwrap();
        assert_eq!(model.actions(0).unwrap(), [FLAction::Down, FLAction::Right]);
        assert_eq!(
            model.actions(14).unwrap(),
            [FLAction::Left, FLAction::Right, FLAction::Up]
        );
        assert_eq!(model.terminal_states().collect::<Vec<_>>(), [5, 7, 11, 12, 15]);
    }

    #[test]
    fn deterministic_lake_solves_shortest_path() {
        let model = frozen_lake(false).unwrap();
        let solution = solve(&model, 0.9, 1e-9, None).unwrap();
        assert!(solution.converged);
        assert_float_eq!(solution.values.get(0).unwrap(), 0.9f64.powi(5), abs <= 1e-9);

        let policy = extract(&model, &solution.values, 0.9).unwrap();
        let mut env = MdpEnvironment::seeded(Arc::new(model), 0);
        let episode = rollout(&mut env, &policy, 100).unwrap();
        assert!(episode.done);
        assert_eq!(episode.experiences.len(), 6);
        assert_eq!(episode.total_reward, 1.0);
    }

    #[test]
    fn slippery_lake() {
        let model = frozen_lake(true).unwrap();
        for a in FLAction::iter() {
            assert_eq!(model.outcomes(6, a).unwrap().len(), 3);
        }

        let solution = solve(&model, 0.99, 1e-6, None).unwrap();
        assert!(solution.converged);
        let start = solution.values.get(0).unwrap();
        assert!(start > 0.0 && start < 1.0, "V(start) = {start}");

        let policy = extract(&model, &solution.values, 0.99).unwrap();
        assert_eq!(policy.len(), 11, "one entry per non-terminal square");
    }
}
