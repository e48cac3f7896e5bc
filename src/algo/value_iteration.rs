use std::collections::HashMap;

use log::{debug, info, warn};

use crate::{
    error::{MdpError, Result},
    model::{Edge, Hashable, TransitionModel},
    util::check_interval,
};

/// Configuration for [`ValueIteration`]
#[derive(Debug, Clone, PartialEq)]
pub struct ValueIterationConfig {
    /// Discount factor, must be in `[0, 1)`
    ///
    /// **Default**: `0.9`
    pub gamma: f64,
    /// Iteration stops once the largest per-sweep value change is strictly below this
    ///
    /// **Default**: `1e-3`
    pub threshold: f64,
    /// Maximum number of sweeps, `None` for no cap
    ///
    /// **Default**: `Some(10_000)`
    pub max_iterations: Option<u32>,
}

impl Default for ValueIterationConfig {
    fn default() -> Self {
        Self {
            gamma: 0.9,
            threshold: 1e-3,
            max_iterations: Some(10_000),
        }
    }
}

/// A state value function, defined for every state of the model it was computed for
#[derive(Debug, Clone, PartialEq)]
pub struct ValueFunction<S: Hashable> {
    states: Vec<S>,
    index: HashMap<S, usize>,
    values: Vec<f64>,
}

impl<S: Hashable> ValueFunction<S> {
    /// A value function that is zero everywhere
    pub fn zeros<A: Hashable>(model: &TransitionModel<S, A>) -> Self {
        Self::from_vec(model, vec![0.0; model.n_states()])
    }

    /// Build a value function from a closure, e.g. to seed an evaluation. Terminal states are forced to 0.
    pub fn from_fn<A: Hashable>(model: &TransitionModel<S, A>, mut f: impl FnMut(S) -> f64) -> Self {
        let values = model
            .states()
            .iter()
            .enumerate()
            .map(|(ix, &s)| if model.is_terminal_at(ix) { 0.0 } else { f(s) })
            .collect();
        Self::from_vec(model, values)
    }

    pub(crate) fn from_vec<A: Hashable>(model: &TransitionModel<S, A>, values: Vec<f64>) -> Self {
        let states = model.states().to_vec();
        let index = states.iter().enumerate().map(|(i, &s)| (s, i)).collect();
        Self {
            states,
            index,
            values,
        }
    }

    /// Value of `state`, or `None` if the state is unknown
    pub fn get(&self, state: S) -> Option<f64> {
        self.index.get(&state).map(|&i| self.values[i])
    }

    /// Iterate `(state, value)` pairs in the model's enumeration order
    pub fn iter(&self) -> impl Iterator<Item = (S, f64)> + '_ {
        self.states.iter().copied().zip(self.values.iter().copied())
    }

    /// Values in the model's enumeration order
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Check that this value function was computed for `model` and return its dense values
    pub(crate) fn aligned<A: Hashable>(&self, model: &TransitionModel<S, A>) -> Result<&[f64]> {
        if self.states.as_slice() == model.states() {
            Ok(&self.values)
        } else {
            Err(MdpError::InvalidParameter(
                "value function does not belong to this model".into(),
            ))
        }
    }
}

/// Output of [`ValueIteration::solve`]
#[derive(Debug, Clone, PartialEq)]
pub struct Solution<S: Hashable> {
    pub values: ValueFunction<S>,
    /// Number of sweeps performed
    pub iterations: u32,
    /// Whether the last sweep's delta fell below the threshold
    pub converged: bool,
    /// Largest value change of the last sweep
    pub delta: f64,
}

impl<S: Hashable> Solution<S> {
    /// Turn a capped, unconverged run into [`MdpError::NonConvergence`]
    pub fn converged_or_err(self) -> Result<Self> {
        if self.converged {
            Ok(self)
        } else {
            Err(MdpError::NonConvergence {
                iterations: self.iterations,
                delta: self.delta,
            })
        }
    }
}

/// Value iteration solver for the Bellman optimality equation
///
/// Each sweep is synchronous: every new value is computed from the previous sweep's
/// values only, so the result of a sweep does not depend on the order in which
/// states are visited. Terminal states keep value 0 and are never updated.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueIteration {
    gamma: f64,
    threshold: f64,
    max_iterations: Option<u32>,
}

impl ValueIteration {
    /// Initialize a solver
    ///
    /// **Errors** if `gamma` is not in `[0, 1)`, if `threshold` is not a positive finite
    /// number, or if `max_iterations` is `Some(0)`
    pub fn new(config: ValueIterationConfig) -> Result<Self> {
        check_interval("gamma", config.gamma, 0.0..1.0)?;
        if !(config.threshold.is_finite() && config.threshold > 0.0) {
            return Err(MdpError::InvalidParameter(format!(
                "Invalid value for `threshold`. Must be positive and finite, got {}.",
                config.threshold
            )));
        }
        if config.max_iterations == Some(0) {
            return Err(MdpError::InvalidParameter(
                "`max_iterations` must be at least 1".into(),
            ));
        }
        Ok(Self {
            gamma: config.gamma,
            threshold: config.threshold,
            max_iterations: config.max_iterations,
        })
    }

    /// Run value iteration on `model` until convergence or until the iteration cap is reached
    pub fn solve<S: Hashable, A: Hashable>(&self, model: &TransitionModel<S, A>) -> Solution<S> {
        let (values, iterations, converged, delta) = iterate(
            vec![0.0; model.n_states()],
            self.threshold,
            self.max_iterations,
            |prev| optimal_sweep(model, prev, self.gamma, 0..model.n_states()),
        );
        Solution {
            values: ValueFunction::from_vec(model, values),
            iterations,
            converged,
            delta,
        }
    }
}

/// Solve `model` by value iteration
///
/// Shorthand for [`ValueIteration::new`] followed by [`ValueIteration::solve`].
pub fn solve<S: Hashable, A: Hashable>(
    model: &TransitionModel<S, A>,
    gamma: f64,
    threshold: f64,
    max_iterations: Option<u32>,
) -> Result<Solution<S>> {
    let solver = ValueIteration::new(ValueIterationConfig {
        gamma,
        threshold,
        max_iterations,
    })?;
    Ok(solver.solve(model))
}

/// Expected return of a single action given successor values
pub(crate) fn q_value(edges: &[Edge], values: &[f64], gamma: f64) -> f64 {
    edges
        .iter()
        .map(|e| e.prob * (e.reward + gamma * values[e.next]))
        .sum()
}

/// The best action of the state at `ix` and its value
///
/// Ties go to the action that comes first in enumeration order: a later action
/// only wins if it is strictly better.
pub(crate) fn greedy<S: Hashable, A: Hashable>(
    model: &TransitionModel<S, A>,
    ix: usize,
    values: &[f64],
    gamma: f64,
) -> Option<(A, f64)> {
    let mut best: Option<(A, f64)> = None;
    for (action, edges) in model.edges_at(ix) {
        let q = q_value(edges, values, gamma);
        match best {
            Some((_, v)) if q <= v => {}
            _ => best = Some((action, q)),
        }
    }
    best
}

/// One synchronous Bellman optimality sweep over the states in `order`
///
/// **Returns** `(next_values, delta)` where delta is the sup norm of the change
pub(crate) fn optimal_sweep<S: Hashable, A: Hashable>(
    model: &TransitionModel<S, A>,
    prev: &[f64],
    gamma: f64,
    order: impl IntoIterator<Item = usize>,
) -> (Vec<f64>, f64) {
    let mut next = prev.to_vec();
    let mut delta: f64 = 0.0;
    for ix in order {
        if model.is_terminal_at(ix) {
            continue;
        }
        if let Some((_, v)) = greedy(model, ix, prev, gamma) {
            delta = delta.max((v - prev[ix]).abs());
            next[ix] = v;
        }
    }
    (next, delta)
}

/// Repeat `sweep` until its delta drops below `threshold` or `max_iterations` sweeps have run
///
/// **Returns** `(values, iterations, converged, last_delta)`
pub(crate) fn iterate(
    mut values: Vec<f64>,
    threshold: f64,
    max_iterations: Option<u32>,
    mut sweep: impl FnMut(&[f64]) -> (Vec<f64>, f64),
) -> (Vec<f64>, u32, bool, f64) {
    let mut iterations = 0;
    let mut delta = f64::INFINITY;
    loop {
        if max_iterations.is_some_and(|max| iterations >= max) {
            warn!("stopped after {iterations} sweeps without converging (delta {delta})");
            return (values, iterations, false, delta);
        }

        let (next, d) = sweep(&values);
        iterations += 1;

        // inf - inf is NaN, which f64::max swallows, so check the values themselves
        if d.is_nan() || next.iter().any(|v| !v.is_finite()) {
            warn!("values diverged to a non-finite number after {iterations} sweeps");
            return (next, iterations, false, f64::INFINITY);
        }

        values = next;
        delta = d;
        debug!("sweep {iterations}: delta = {delta}");

        if delta < threshold {
            info!("converged after {iterations} sweeps (delta {delta})");
            return (values, iterations, true, delta);
        }
    }
}
