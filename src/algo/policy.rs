use std::collections::HashMap;

use log::debug;

use crate::{
    env::{Environment, Exp},
    error::{MdpError, Result},
    model::{Edge, Hashable, TransitionModel},
    util::check_interval,
};

use super::value_iteration::{greedy, iterate, q_value, Solution, ValueFunction};

/// A deterministic policy mapping non-terminal states to actions
///
/// Terminal states have no entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy<S: Hashable, A> {
    entries: Vec<(S, A)>,
    index: HashMap<S, usize>,
}

impl<S: Hashable, A: Copy> Policy<S, A> {
    /// The action chosen in `state`, or `None` for terminal and unknown states
    pub fn get(&self, state: S) -> Option<A> {
        self.index.get(&state).map(|&i| self.entries[i].1)
    }

    /// Iterate `(state, action)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (S, A)> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Hashable, A> FromIterator<(S, A)> for Policy<S, A> {
    /// Later pairs override earlier ones for the same state
    fn from_iter<I: IntoIterator<Item = (S, A)>>(iter: I) -> Self {
        let mut policy = Self {
            entries: Vec::new(),
            index: HashMap::new(),
        };
        for (state, action) in iter {
            match policy.index.get(&state) {
                Some(&i) => policy.entries[i].1 = action,
                None => {
                    policy.index.insert(state, policy.entries.len());
                    policy.entries.push((state, action));
                }
            }
        }
        policy
    }
}

/// Derive the greedy policy of `values`
///
/// For every non-terminal state the action with the highest expected return
/// `sum P(s'|s,a) * (R(s,a,s') + gamma * V(s'))` is chosen. When several actions
/// attain exactly the same value, the one that comes first in the model's action
/// enumeration order wins.
///
/// **Errors** if `gamma` is not in `[0, 1]` or if `values` was not computed for `model`
pub fn extract<S: Hashable, A: Hashable>(
    model: &TransitionModel<S, A>,
    values: &ValueFunction<S>,
    gamma: f64,
) -> Result<Policy<S, A>> {
    check_interval("gamma", gamma, 0.0..=1.0)?;
    let v = values.aligned(model)?;

    Ok((0..model.n_states())
        .filter(|&ix| !model.is_terminal_at(ix))
        .filter_map(|ix| greedy(model, ix, v, gamma).map(|(a, _)| (model.state_at(ix), a)))
        .collect())
}

/// Expected return of every legal action in `state`, in enumeration order
pub fn q_values<S: Hashable, A: Hashable>(
    model: &TransitionModel<S, A>,
    values: &ValueFunction<S>,
    gamma: f64,
    state: S,
) -> Result<Vec<(A, f64)>> {
    check_interval("gamma", gamma, 0.0..=1.0)?;
    let v = values.aligned(model)?;
    let ix = model.index_of(state)?;
    Ok(model
        .edges_at(ix)
        .map(|(a, edges)| (a, q_value(edges, v, gamma)))
        .collect())
}

/// Iterative policy evaluation of a fixed policy
///
/// Uses the same synchronous sweeps and stopping rule as value iteration, with the
/// max over actions replaced by the policy's action.
///
/// **Errors** if a parameter is out of range, if the policy has no action for a
/// non-terminal state, or if a policy action is not legal in its state
pub fn evaluate<S: Hashable, A: Hashable>(
    model: &TransitionModel<S, A>,
    policy: &Policy<S, A>,
    gamma: f64,
    threshold: f64,
    max_iterations: Option<u32>,
) -> Result<Solution<S>> {
    check_interval("gamma", gamma, 0.0..1.0)?;
    if !(threshold.is_finite() && threshold > 0.0) {
        return Err(MdpError::InvalidParameter(format!(
            "Invalid value for `threshold`. Must be positive and finite, got {threshold}."
        )));
    }
    if max_iterations == Some(0) {
        return Err(MdpError::InvalidParameter(
            "`max_iterations` must be at least 1".into(),
        ));
    }

    let chosen = (0..model.n_states())
        .map(|ix| {
            if model.is_terminal_at(ix) {
                return Ok(None);
            }
            let state = model.state_at(ix);
            let action = policy.get(state).ok_or_else(|| {
                MdpError::InvalidParameter(format!("policy has no action for state {state:?}"))
            })?;
            model.edges_for(ix, action).map(Some)
        })
        .collect::<Result<Vec<Option<&[Edge]>>>>()?;

    let (values, iterations, converged, delta) = iterate(
        vec![0.0; model.n_states()],
        threshold,
        max_iterations,
        |prev| {
            let mut next = prev.to_vec();
            let mut delta: f64 = 0.0;
            for (ix, edges) in chosen.iter().enumerate() {
                if let Some(edges) = edges {
                    next[ix] = q_value(edges, prev, gamma);
                    delta = delta.max((next[ix] - prev[ix]).abs());
                }
            }
            (next, delta)
        },
    );

    Ok(Solution {
        values: ValueFunction::from_vec(model, values),
        iterations,
        converged,
        delta,
    })
}

/// A trajectory produced by [`rollout`]
#[derive(Debug, Clone, PartialEq)]
pub struct Episode<S, A> {
    pub experiences: Vec<Exp<S, A>>,
    pub total_reward: f64,
    /// Whether the episode ended in a terminal state rather than at the step limit
    pub done: bool,
}

/// Reset `env` and follow `policy` until a terminal state or `max_steps` steps
///
/// Any randomness comes from the environment's own random source.
pub fn rollout<E, S, A>(env: &mut E, policy: &Policy<S, A>, max_steps: usize) -> Result<Episode<S, A>>
where
    E: Environment<State = S, Action = A>,
    S: Hashable,
    A: Hashable,
{
    let mut state = env.reset();
    let mut episode = Episode {
        experiences: Vec::new(),
        total_reward: 0.0,
        done: env.is_terminal(),
    };

    while !episode.done && episode.experiences.len() < max_steps {
        let action = policy.get(state).ok_or_else(|| {
            MdpError::InvalidParameter(format!("policy has no action for state {state:?}"))
        })?;
        let step = env.step(action)?;
        state = step.next_state;
        episode.total_reward += step.reward;
        episode.done = step.done;
        episode.experiences.push(step.into());
    }

    debug!(
        "rollout finished after {} steps, return {}",
        episode.experiences.len(),
        episode.total_reward
    );
    Ok(episode)
}
