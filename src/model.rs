use std::{collections::HashMap, fmt::Debug, hash::Hash, ops::Range};

use log::debug;

use crate::error::{MdpError, Result};

/// Maximum allowed deviation of an outcome distribution's total probability from 1
pub const PROBABILITY_TOLERANCE: f64 = 1e-9;

/// A trait for state and action ids that can be used as keys in a [`HashMap`]
pub trait Hashable: Copy + Eq + Hash + Debug {}

impl<T> Hashable for T where T: Copy + Eq + Hash + Debug {}

/// One possible result of taking an action in a state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome<S> {
    /// The state the environment moves to
    pub next_state: S,
    /// Probability of this outcome, in `(0, 1]`
    pub prob: f64,
    /// Reward received for this transition
    pub reward: f64,
}

/// Index-based mirror of an [`Outcome`], used by the solvers
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Edge {
    pub next: usize,
    pub prob: f64,
    pub reward: f64,
}

#[derive(Debug, Clone)]
struct StateEntry {
    terminal: bool,
    name: Option<String>,
    /// Legal action indices, in model enumeration order
    actions: Vec<usize>,
    /// Arena range for each legal action, parallel to `actions`
    spans: Vec<Range<usize>>,
}

/// An immutable transition and reward table for a finite MDP
///
/// States and actions keep the order they were declared in. That order is the
/// enumeration order used everywhere an ordering matters, most importantly for
/// breaking ties between equally valued actions during policy extraction.
///
/// Terminal states are absorbing: every legal action from a terminal state leads
/// back to the same state with probability 1 and reward 0.
///
/// ### Generics
/// - `S` - State id, e.g. a small integer, a `&'static str` label, or a fieldless enum
/// - `A` - Action id, same constraints as `S`
#[derive(Debug, Clone)]
pub struct TransitionModel<S: Hashable, A: Hashable> {
    states: Vec<S>,
    state_index: HashMap<S, usize>,
    actions: Vec<A>,
    action_index: HashMap<A, usize>,
    action_names: Vec<Option<String>>,
    entries: Vec<StateEntry>,
    outcomes: Vec<Outcome<S>>,
    edges: Vec<Edge>,
    initial: usize,
}

impl<S: Hashable, A: Hashable> TransitionModel<S, A> {
    /// Start building a model
    pub fn builder() -> TransitionModelBuilder<S, A> {
        TransitionModelBuilder::new()
    }

    /// Look up the outcome distribution of taking `action` in `state`
    ///
    /// **Errors** with [`MdpError::UnknownState`] or [`MdpError::UnknownAction`] if either id
    /// is not part of the model, and with [`MdpError::InvalidAction`] if the action exists but
    /// is not allowed in `state`
    pub fn outcomes(&self, state: S, action: A) -> Result<&[Outcome<S>]> {
        let s = self.index_of(state)?;
        let a = self
            .action_index
            .get(&action)
            .copied()
            .ok_or_else(|| MdpError::unknown_action(action))?;
        let entry = &self.entries[s];
        let slot = entry
            .actions
            .iter()
            .position(|&x| x == a)
            .ok_or_else(|| MdpError::invalid_action(state, action))?;
        Ok(&self.outcomes[entry.spans[slot].clone()])
    }

    /// Whether `state` is terminal
    pub fn is_terminal(&self, state: S) -> Result<bool> {
        Ok(self.entries[self.index_of(state)?].terminal)
    }

    /// Whether `action` is legal in `state`. Unknown ids are never legal.
    pub fn is_legal(&self, state: S, action: A) -> bool {
        match (self.state_index.get(&state), self.action_index.get(&action)) {
            (Some(&s), Some(a)) => self.entries[s].actions.contains(a),
            _ => false,
        }
    }

    /// Get the legal actions for `state`, in enumeration order
    pub fn actions(&self, state: S) -> Result<Vec<A>> {
        let s = self.index_of(state)?;
        Ok(self.entries[s]
            .actions
            .iter()
            .map(|&a| self.actions[a])
            .collect())
    }

    /// All states, in enumeration order
    pub fn states(&self) -> &[S] {
        &self.states
    }

    /// All actions, in enumeration order
    pub fn action_set(&self) -> &[A] {
        &self.actions
    }

    /// Terminal states, in enumeration order
    pub fn terminal_states(&self) -> impl Iterator<Item = S> + '_ {
        self.states
            .iter()
            .zip(&self.entries)
            .filter(|(_, e)| e.terminal)
            .map(|(&s, _)| s)
    }

    /// The state an environment starts from and resets to
    pub fn initial_state(&self) -> S {
        self.states[self.initial]
    }

    /// Number of states
    pub fn n_states(&self) -> usize {
        self.states.len()
    }

    /// Number of declared actions, legal or not in any particular state
    pub fn n_actions(&self) -> usize {
        self.actions.len()
    }

    /// Human-readable label of `state`, if one was configured
    pub fn state_name(&self, state: S) -> Option<&str> {
        let &s = self.state_index.get(&state)?;
        self.entries[s].name.as_deref()
    }

    /// Human-readable label of `action`, if one was configured
    pub fn action_name(&self, action: A) -> Option<&str> {
        let &a = self.action_index.get(&action)?;
        self.action_names[a].as_deref()
    }

    pub(crate) fn index_of(&self, state: S) -> Result<usize> {
        self.state_index
            .get(&state)
            .copied()
            .ok_or_else(|| MdpError::unknown_state(state))
    }

    pub(crate) fn state_at(&self, ix: usize) -> S {
        self.states[ix]
    }

    pub(crate) fn is_terminal_at(&self, ix: usize) -> bool {
        self.entries[ix].terminal
    }

    /// Iterate the legal actions of the state at `ix` together with their outcome edges
    pub(crate) fn edges_at(&self, ix: usize) -> impl Iterator<Item = (A, &[Edge])> + '_ {
        let entry = &self.entries[ix];
        entry
            .actions
            .iter()
            .zip(&entry.spans)
            .map(|(&a, span)| (self.actions[a], &self.edges[span.clone()]))
    }

    /// Outcome edges of a single legal action at `ix`
    pub(crate) fn edges_for(&self, ix: usize, action: A) -> Result<&[Edge]> {
        let a = self
            .action_index
            .get(&action)
            .copied()
            .ok_or_else(|| MdpError::unknown_action(action))?;
        let entry = &self.entries[ix];
        let slot = entry
            .actions
            .iter()
            .position(|&x| x == a)
            .ok_or_else(|| MdpError::invalid_action(self.states[ix], action))?;
        Ok(&self.edges[entry.spans[slot].clone()])
    }
}

/// Builder for a [`TransitionModel`]
///
/// Nothing is checked until [`build`](TransitionModelBuilder::build), which validates the
/// whole table eagerly so that simulation and solving can assume a well-formed model.
#[derive(Debug, Clone)]
pub struct TransitionModelBuilder<S, A> {
    states: Vec<(S, bool)>,
    actions: Vec<A>,
    state_names: Vec<(S, String)>,
    action_names: Vec<(A, String)>,
    allowed: Vec<(S, Vec<A>)>,
    transitions: Vec<(S, A, Outcome<S>)>,
    initial: Option<S>,
}

impl<S: Hashable, A: Hashable> Default for TransitionModelBuilder<S, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Hashable, A: Hashable> TransitionModelBuilder<S, A> {
    pub fn new() -> Self {
        Self {
            states: Vec::new(),
            actions: Vec::new(),
            state_names: Vec::new(),
            action_names: Vec::new(),
            allowed: Vec::new(),
            transitions: Vec::new(),
            initial: None,
        }
    }

    /// Declare a non-terminal state
    pub fn state(mut self, state: S) -> Self {
        self.states.push((state, false));
        self
    }

    /// Declare a terminal (absorbing) state
    pub fn terminal(mut self, state: S) -> Self {
        self.states.push((state, true));
        self
    }

    /// Declare an action. Declaration order is the enumeration order.
    pub fn action(mut self, action: A) -> Self {
        self.actions.push(action);
        self
    }

    /// Attach a human-readable label to a declared state
    pub fn state_name(mut self, state: S, name: impl Into<String>) -> Self {
        self.state_names.push((state, name.into()));
        self
    }

    /// Attach a human-readable label to a declared action
    pub fn action_name(mut self, action: A, name: impl Into<String>) -> Self {
        self.action_names.push((action, name.into()));
        self
    }

    /// Restrict the legal actions of `state`. Without a restriction every declared action is legal.
    pub fn allow(mut self, state: S, actions: impl IntoIterator<Item = A>) -> Self {
        self.allowed.push((state, actions.into_iter().collect()));
        self
    }

    /// Add an outcome to the distribution of `(state, action)`
    pub fn transition(mut self, state: S, action: A, next_state: S, prob: f64, reward: f64) -> Self {
        self.transitions.push((
            state,
            action,
            Outcome {
                next_state,
                prob,
                reward,
            },
        ));
        self
    }

    /// Shorthand for a single outcome with probability 1
    pub fn deterministic(self, state: S, action: A, next_state: S, reward: f64) -> Self {
        self.transition(state, action, next_state, 1.0, reward)
    }

    /// Set the state [`reset`](crate::env::Environment::reset) returns to
    pub fn initial(mut self, state: S) -> Self {
        self.initial = Some(state);
        self
    }

    /// Validate the table and freeze it into a [`TransitionModel`]
    ///
    /// **Errors** if a state or action is referenced without being declared, if an
    /// outcome distribution is not normalized, if a legal non-terminal pair has no
    /// outcomes, or if a terminal state's configured transitions are not absorbing
    pub fn build(self) -> Result<TransitionModel<S, A>> {
        if self.states.is_empty() {
            return Err(MdpError::MalformedModel("model has no states".into()));
        }
        if self.actions.is_empty() {
            return Err(MdpError::MalformedModel("model has no actions".into()));
        }

        let mut state_index = HashMap::with_capacity(self.states.len());
        for (i, &(s, _)) in self.states.iter().enumerate() {
            if state_index.insert(s, i).is_some() {
                return Err(MdpError::MalformedModel(format!(
                    "state {s:?} is declared twice"
                )));
            }
        }
        let mut action_index = HashMap::with_capacity(self.actions.len());
        for (i, &a) in self.actions.iter().enumerate() {
            if action_index.insert(a, i).is_some() {
                return Err(MdpError::MalformedModel(format!(
                    "action {a:?} is declared twice"
                )));
            }
        }

        let lookup_state = |s: S| {
            state_index
                .get(&s)
                .copied()
                .ok_or_else(|| MdpError::unknown_state(s))
        };
        let lookup_action = |a: A| {
            action_index
                .get(&a)
                .copied()
                .ok_or_else(|| MdpError::unknown_action(a))
        };

        let initial = match self.initial {
            Some(s) => lookup_state(s)?,
            None => return Err(MdpError::MalformedModel("no initial state".into())),
        };

        let mut entries: Vec<StateEntry> = self
            .states
            .iter()
            .map(|&(_, terminal)| StateEntry {
                terminal,
                name: None,
                actions: (0..self.actions.len()).collect(),
                spans: Vec::new(),
            })
            .collect();

        for (s, name) in self.state_names {
            entries[lookup_state(s)?].name = Some(name);
        }
        let mut action_names = vec![None; self.actions.len()];
        for (a, name) in self.action_names {
            action_names[lookup_action(a)?] = Some(name);
        }

        for (s, allowed) in &self.allowed {
            let ix = lookup_state(*s)?;
            let mut mask = vec![false; self.actions.len()];
            for &a in allowed {
                let a_ix = lookup_action(a)?;
                if mask[a_ix] {
                    return Err(MdpError::MalformedModel(format!(
                        "action {a:?} allowed twice in state {s:?}"
                    )));
                }
                mask[a_ix] = true;
            }
            // Enumeration order always follows action declaration order
            entries[ix].actions = (0..self.actions.len()).filter(|&a| mask[a]).collect();
        }

        let mut table: HashMap<(usize, usize), Vec<Outcome<S>>> = HashMap::new();
        for (s, a, outcome) in self.transitions {
            let s_ix = lookup_state(s)?;
            let a_ix = lookup_action(a)?;
            lookup_state(outcome.next_state)?;
            if !entries[s_ix].actions.contains(&a_ix) {
                return Err(MdpError::MalformedModel(format!(
                    "transition given for action {a:?} which is not legal in state {s:?}"
                )));
            }
            if !(outcome.prob > 0.0 && outcome.prob <= 1.0) {
                return Err(MdpError::MalformedModel(format!(
                    "probability {} of ({s:?}, {a:?}) -> {:?} is outside (0, 1]",
                    outcome.prob, outcome.next_state
                )));
            }
            if !outcome.reward.is_finite() {
                return Err(MdpError::MalformedModel(format!(
                    "reward of ({s:?}, {a:?}) -> {:?} is not finite",
                    outcome.next_state
                )));
            }
            table.entry((s_ix, a_ix)).or_default().push(outcome);
        }

        let mut outcomes = Vec::new();
        for (s_ix, entry) in entries.iter_mut().enumerate() {
            let s = self.states[s_ix].0;
            if entry.actions.is_empty() {
                return Err(MdpError::MalformedModel(format!(
                    "state {s:?} has no legal actions"
                )));
            }
            for &a_ix in &entry.actions {
                let a = self.actions[a_ix];
                let dist = match table.remove(&(s_ix, a_ix)) {
                    Some(dist) => dist,
                    None if entry.terminal => vec![Outcome {
                        next_state: s,
                        prob: 1.0,
                        reward: 0.0,
                    }],
                    None => {
                        return Err(MdpError::MalformedModel(format!(
                            "no outcomes for legal pair ({s:?}, {a:?})"
                        )))
                    }
                };

                if entry.terminal && dist.iter().any(|o| o.next_state != s || o.reward != 0.0) {
                    return Err(MdpError::MalformedModel(format!(
                        "terminal state {s:?} must self-transition with reward 0 under {a:?}"
                    )));
                }
                let total: f64 = dist.iter().map(|o| o.prob).sum();
                if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
                    return Err(MdpError::MalformedModel(format!(
                        "probabilities of ({s:?}, {a:?}) sum to {total}, expected 1"
                    )));
                }

                let start = outcomes.len();
                outcomes.extend(dist);
                entry.spans.push(start..outcomes.len());
            }
        }

        let edges = outcomes
            .iter()
            .map(|o| Edge {
                next: state_index[&o.next_state],
                prob: o.prob,
                reward: o.reward,
            })
            .collect();

        debug!(
            "built transition model: {} states, {} actions, {} outcomes",
            self.states.len(),
            self.actions.len(),
            outcomes.len()
        );

        Ok(TransitionModel {
            states: self.states.into_iter().map(|(s, _)| s).collect(),
            state_index,
            actions: self.actions,
            action_index,
            action_names,
            entries,
            outcomes,
            edges,
            initial,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Hole (0) <- Start (1) -> Goal (2), actions Left (0) and Right (1)
    pub(crate) fn walk() -> TransitionModel<u8, u8> {
        TransitionModel::builder()
            .terminal(0)
            .state(1)
            .terminal(2)
            .action(0)
            .action(1)
            .deterministic(1, 0, 0, 0.0)
            .deterministic(1, 1, 2, 1.0)
            .initial(1)
            .build()
            .unwrap()
    }

    /// Staying in Good pays 1 forever, going pays 5 once and ends in the absorbing Bad
    pub(crate) fn good_bad() -> TransitionModel<&'static str, &'static str> {
        TransitionModel::builder()
            .state("Good")
            .terminal("Bad")
            .action("Stay")
            .action("Go")
            .deterministic("Good", "Stay", "Good", 1.0)
            .deterministic("Good", "Go", "Bad", 5.0)
            .initial("Good")
            .build()
            .unwrap()
    }

    #[test]
    fn outcomes_lookup() {
        let model = walk();
        assert_eq!(
            model.outcomes(1, 1).unwrap(),
            [Outcome {
                next_state: 2,
                prob: 1.0,
                reward: 1.0
            }],
            "Right from Start reaches Goal"
        );
        assert_eq!((model.n_states(), model.n_actions()), (3, 2));
        assert_eq!(model.outcomes(7, 1), Err(MdpError::unknown_state(7u8)));
        assert_eq!(model.outcomes(1, 9), Err(MdpError::unknown_action(9u8)));
    }

    #[test]
    fn terminal_states_are_absorbing() {
        let model = walk();
        for s in model.terminal_states().collect::<Vec<_>>() {
            for a in model.actions(s).unwrap() {
                let outcomes = model.outcomes(s, a).unwrap();
                assert_eq!(outcomes.len(), 1);
                assert_eq!(outcomes[0].next_state, s, "self transition");
                assert_eq!(outcomes[0].reward, 0.0, "no reward");
            }
        }
        assert_eq!(model.terminal_states().collect::<Vec<_>>(), [0, 2]);
    }

    #[test]
    fn probabilities_are_normalized() {
        let model = TransitionModel::builder()
            .state("a")
            .state("b")
            .action("x")
            .transition("a", "x", "a", 0.1, 0.0)
            .transition("a", "x", "b", 0.2, 0.0)
            .transition("a", "x", "b", 0.7, 1.0)
            .deterministic("b", "x", "a", 0.0)
            .initial("a")
            .build()
            .unwrap();

        for &s in model.states() {
            for a in model.actions(s).unwrap() {
                let total: f64 = model.outcomes(s, a).unwrap().iter().map(|o| o.prob).sum();
                assert!((total - 1.0).abs() <= PROBABILITY_TOLERANCE, "sum is {total}");
            }
        }
    }

    #[test]
    fn rejects_bad_probability_sum() {
        let result = TransitionModel::builder()
            .state(0)
            .action(0)
            .transition(0, 0, 0, 0.5, 0.0)
            .transition(0, 0, 0, 0.4, 0.0)
            .initial(0)
            .build();
        assert!(matches!(result, Err(MdpError::MalformedModel(_))));
    }

    #[test]
    fn rejects_undefined_references() {
        let result = TransitionModel::<u8, u8>::builder()
            .state(0)
            .action(0)
            .deterministic(0, 0, 5, 0.0)
            .initial(0)
            .build();
        assert_eq!(result.unwrap_err(), MdpError::unknown_state(5u8));

        let result = TransitionModel::<u8, u8>::builder()
            .state(0)
            .action(0)
            .deterministic(0, 3, 0, 0.0)
            .initial(0)
            .build();
        assert_eq!(result.unwrap_err(), MdpError::unknown_action(3u8));

        let result = TransitionModel::<u8, u8>::builder()
            .state(0)
            .action(0)
            .deterministic(0, 0, 0, 0.0)
            .initial(4)
            .build();
        assert_eq!(result.unwrap_err(), MdpError::unknown_state(4u8));
    }

    #[test]
    fn rejects_missing_outcomes_and_non_absorbing_terminals() {
        let missing = TransitionModel::builder()
            .state(0)
            .terminal(1)
            .action(0)
            .action(1)
            .deterministic(0, 0, 1, 0.0)
            .initial(0)
            .build();
        assert!(matches!(missing, Err(MdpError::MalformedModel(_))));

        let leaky = TransitionModel::builder()
            .state(0)
            .terminal(1)
            .action(0)
            .deterministic(0, 0, 1, 0.0)
            .deterministic(1, 0, 1, 2.0)
            .initial(0)
            .build();
        assert!(matches!(leaky, Err(MdpError::MalformedModel(_))));
    }

    #[test]
    fn restricted_actions_follow_declaration_order() {
        let model = TransitionModel::builder()
            .state(0)
            .terminal(1)
            .action('a')
            .action('b')
            .action('c')
            .allow(0, ['c', 'a'])
            .deterministic(0, 'a', 1, 0.0)
            .deterministic(0, 'c', 1, 0.0)
            .initial(0)
            .build()
            .unwrap();

        assert_eq!(model.actions(0).unwrap(), ['a', 'c']);
        assert!(!model.is_legal(0, 'b'));
        assert_eq!(
            model.outcomes(0, 'b'),
            Err(MdpError::invalid_action(0, 'b')),
            "declared but disallowed action"
        );
        assert_eq!(model.actions(1).unwrap(), ['a', 'b', 'c']);
    }

    #[test]
    fn names() {
        let model = TransitionModel::builder()
            .state(0)
            .action(0)
            .deterministic(0, 0, 0, 1.0)
            .state_name(0, "Loop")
            .action_name(0, "Spin")
            .initial(0)
            .build()
            .unwrap();
        assert_eq!(model.state_name(0), Some("Loop"));
        assert_eq!(model.action_name(0), Some("Spin"));
        assert_eq!(model.state_name(1), None);
    }
}
