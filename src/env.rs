use std::sync::Arc;

use log::trace;
use rand::{
    distributions::{Distribution, WeightedIndex},
    rngs::StdRng,
    Rng, SeedableRng,
};

use crate::{
    error::{MdpError, Result},
    model::{Hashable, TransitionModel},
};

/// Represents a Markov decision process that can be stepped one action at a time
///
/// This base trait represents the common case of a discrete-time MDP with one agent
/// and a finite state space and action space.
pub trait Environment {
    /// A representation of the state of the environment to be passed to an agent
    type State;

    /// A representation of an action that an agent can take to affect the environment
    type Action;

    /// Reset the environment to its initial state
    ///
    /// **Returns** the state
    fn reset(&mut self) -> Self::State;

    /// Update the environment in response to an action taken by an agent
    ///
    /// **Errors** if the action is not legal in the current state, in which case the
    /// environment is left unchanged
    fn step(&mut self, action: Self::Action) -> Result<Step<Self::State, Self::Action>>;

    /// Determine if the current state is terminal
    fn is_terminal(&self) -> bool;
}

/// An environment with a finite, enumerable set of legal actions in each state
pub trait DiscreteActionSpace: Environment {
    /// Get the legal actions for the current state
    ///
    /// The returned vector is never empty and follows the model's enumeration order.
    fn actions(&self) -> Vec<Self::Action>;
}

/// An environment with a finite, enumerable state space
pub trait DiscreteStateSpace: Environment {
    /// Get every state of the environment
    fn states(&self) -> Vec<Self::State>;
}

/// Result of a single [`Environment::step`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step<S, A> {
    pub next_state: S,
    pub reward: f64,
    /// Whether `next_state` is terminal
    pub done: bool,
    pub info: StepInfo<S, A>,
}

/// Diagnostic metadata attached to a [`Step`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepInfo<S, A> {
    pub previous_state: S,
    pub action: A,
    pub state: S,
    /// Probability of the outcome that was sampled
    pub prob: f64,
}

/// Represents a single experience or transition in the environment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Exp<S, A> {
    /// The state of the environment before taking the action
    pub state: S,
    /// The action taken in the given state
    pub action: A,
    /// The state of the environment after the action is taken
    pub next_state: S,
    /// The reward received after taking the action
    pub reward: f64,
}

impl<S: Copy, A: Copy> From<Step<S, A>> for Exp<S, A> {
    fn from(step: Step<S, A>) -> Self {
        Self {
            state: step.info.previous_state,
            action: step.info.action,
            next_state: step.next_state,
            reward: step.reward,
        }
    }
}

/// A stepping simulator over a shared [`TransitionModel`]
///
/// Stochastic outcomes are sampled from the injected random source `R`, so runs are
/// reproducible when the source is seeded. The model is shared read-only, any number
/// of environments may simulate the same model at once.
#[derive(Debug, Clone)]
pub struct MdpEnvironment<S: Hashable, A: Hashable, R = StdRng> {
    model: Arc<TransitionModel<S, A>>,
    current: S,
    rng: R,
}

impl<S: Hashable, A: Hashable> MdpEnvironment<S, A, StdRng> {
    /// Create an environment whose sampling is seeded with `seed`
    pub fn seeded(model: Arc<TransitionModel<S, A>>, seed: u64) -> Self {
        Self::new(model, StdRng::seed_from_u64(seed))
    }
}

impl<S: Hashable, A: Hashable, R: Rng> MdpEnvironment<S, A, R> {
    /// Create an environment positioned at the model's initial state
    pub fn new(model: Arc<TransitionModel<S, A>>, rng: R) -> Self {
        let current = model.initial_state();
        Self {
            model,
            current,
            rng,
        }
    }

    /// The state the last `reset` or `step` left the environment in
    pub fn current_state(&self) -> S {
        self.current
    }

    /// The shared model being simulated
    pub fn model(&self) -> &TransitionModel<S, A> {
        &self.model
    }

    /// Test whether `state` is terminal
    pub fn is_terminal_state(&self, state: S) -> Result<bool> {
        self.model.is_terminal(state)
    }
}

impl<S: Hashable, A: Hashable, R: Rng> Environment for MdpEnvironment<S, A, R> {
    type State = S;
    type Action = A;

    fn reset(&mut self) -> Self::State {
        self.current = self.model.initial_state();
        self.current
    }

    fn step(&mut self, action: Self::Action) -> Result<Step<Self::State, Self::Action>> {
        let previous_state = self.current;
        if !self.model.is_legal(previous_state, action) {
            return Err(MdpError::invalid_action(previous_state, action));
        }

        let outcomes = self.model.outcomes(previous_state, action)?;
        let ix = match outcomes.len() {
            1 => 0,
            _ => WeightedIndex::new(outcomes.iter().map(|o| o.prob))
                .map_err(|e| MdpError::MalformedModel(e.to_string()))?
                .sample(&mut self.rng),
        };
        let outcome = outcomes[ix];

        self.current = outcome.next_state;
        let done = self.model.is_terminal(self.current)?;

        trace!(
            "step {:?} --{:?}--> {:?} (p={}, r={}, done={})",
            previous_state,
            action,
            self.current,
            outcome.prob,
            outcome.reward,
            done
        );

        Ok(Step {
            next_state: self.current,
            reward: outcome.reward,
            done,
            info: StepInfo {
                previous_state,
                action,
                state: self.current,
                prob: outcome.prob,
            },
        })
    }

    fn is_terminal(&self) -> bool {
        // current is always a model state
        self.model.is_terminal(self.current).unwrap_or(false)
    }
}

impl<S: Hashable, A: Hashable, R: Rng> DiscreteActionSpace for MdpEnvironment<S, A, R> {
    fn actions(&self) -> Vec<Self::Action> {
        self.model.actions(self.current).unwrap_or_default()
    }
}

impl<S: Hashable, A: Hashable, R: Rng> DiscreteStateSpace for MdpEnvironment<S, A, R> {
    fn states(&self) -> Vec<Self::State> {
        self.model.states().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::walk;

    fn coin() -> Arc<TransitionModel<&'static str, &'static str>> {
        Arc::new(
            TransitionModel::builder()
                .state("flip")
                .terminal("heads")
                .terminal("tails")
                .action("toss")
                .transition("flip", "toss", "heads", 0.25, 1.0)
                .transition("flip", "toss", "tails", 0.75, 0.0)
                .initial("flip")
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn walk_right_reaches_goal() {
        let mut env = MdpEnvironment::seeded(Arc::new(walk()), 0);
        assert_eq!(env.reset(), 1, "reset returns Start");

        let step = env.step(1).unwrap();
        assert_eq!(step.next_state, 2);
        assert_eq!(step.reward, 1.0);
        assert!(step.done);
        assert_eq!(
            step.info,
            StepInfo {
                previous_state: 1,
                action: 1,
                state: 2,
                prob: 1.0
            }
        );
        assert!(env.is_terminal());
    }

    #[test]
    fn terminal_steps_are_absorbing() {
        let mut env = MdpEnvironment::seeded(Arc::new(walk()), 0);
        env.reset();
        env.step(0).unwrap();
        assert_eq!(env.current_state(), 0, "fell in the hole");

        for action in [0, 1, 1, 0] {
            assert!(env.is_terminal(), "terminal before step");
            let step = env.step(action).unwrap();
            assert_eq!((step.next_state, step.reward, step.done), (0, 0.0, true));
            assert!(env.is_terminal(), "terminal after step");
        }
    }

    #[test]
    fn invalid_action_leaves_state_unchanged() {
        let mut env = MdpEnvironment::seeded(Arc::new(walk()), 0);
        env.reset();
        assert_eq!(env.step(4), Err(MdpError::invalid_action(1u8, 4u8)));
        assert_eq!(env.current_state(), 1);
    }

    #[test]
    fn reset_is_idempotent() {
        let mut env = MdpEnvironment::seeded(Arc::new(walk()), 3);
        for trajectory in [vec![], vec![0], vec![1], vec![1, 0, 1]] {
            env.reset();
            for action in trajectory {
                env.step(action).unwrap();
            }
            assert_eq!(env.reset(), 1);
            assert_eq!(env.current_state(), 1);
        }
    }

    #[test]
    fn sampling_follows_probabilities() {
        let mut env = MdpEnvironment::seeded(coin(), 42);
        let n = 10_000;
        let mut heads = 0;
        for _ in 0..n {
            env.reset();
            let step = env.step("toss").unwrap();
            assert!(step.done);
            if step.next_state == "heads" {
                assert_eq!(step.info.prob, 0.25);
                heads += 1;
            }
        }
        let freq = heads as f64 / n as f64;
        assert!((freq - 0.25).abs() < 0.02, "heads frequency {freq}");
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let run = |seed| {
            let mut env = MdpEnvironment::seeded(coin(), seed);
            (0..50)
                .map(|_| {
                    env.reset();
                    env.step("toss").unwrap().next_state
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(run(7), run(7));
    }

    #[test]
    fn discrete_spaces() {
        let env = MdpEnvironment::seeded(Arc::new(walk()), 0);
        assert_eq!(env.actions(), [0, 1]);
        assert_eq!(env.states(), [0, 1, 2]);
        assert_eq!(env.is_terminal_state(2), Ok(true));
        assert_eq!(env.is_terminal_state(1), Ok(false));
        assert!(env.is_terminal_state(9).is_err());
    }
}
