use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    error::{MdpError, Result},
    model::{Hashable, TransitionModel},
};

/// A model described as plain data
///
/// This is the serializable counterpart of [`TransitionModelBuilder`](crate::model::TransitionModelBuilder).
/// The order of `states` and `actions` is the enumeration order of the built model.
///
/// ### Example
/// ```
/// use mdp::{config::MdpConfig, model::TransitionModel};
///
/// let json = r#"{
///     "states": [{ "id": 0, "terminal": true, "name": "Hole" }, { "id": 1 }],
///     "actions": [{ "id": 0, "name": "Left" }],
///     "transitions": [
///         { "state": 1, "action": 0, "outcomes": [{ "next_state": 0, "prob": 1.0, "reward": 0.0 }] }
///     ],
///     "initial_state": 1
/// }"#;
/// let config = MdpConfig::<u32, u32>::from_json(json).unwrap();
/// let model = TransitionModel::from_config(config).unwrap();
/// assert_eq!(model.state_name(0), Some("Hole"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MdpConfig<S, A> {
    pub states: Vec<StateConfig<S>>,
    pub actions: Vec<ActionConfig<A>>,
    /// Per-state action restrictions, states not listed allow every action
    #[serde(default = "Vec::new")]
    pub allowed: Vec<AllowedConfig<S, A>>,
    pub transitions: Vec<TransitionConfig<S, A>>,
    pub initial_state: S,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateConfig<S> {
    pub id: S,
    #[serde(default)]
    pub terminal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionConfig<A> {
    pub id: A,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllowedConfig<S, A> {
    pub state: S,
    pub actions: Vec<A>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionConfig<S, A> {
    pub state: S,
    pub action: A,
    pub outcomes: Vec<OutcomeConfig<S>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeConfig<S> {
    pub next_state: S,
    pub prob: f64,
    pub reward: f64,
}

impl<S, A> MdpConfig<S, A>
where
    S: Hashable + DeserializeOwned,
    A: Hashable + DeserializeOwned,
{
    /// Parse a config from JSON
    ///
    /// **Errors** with [`MdpError::MalformedModel`] if the document does not have the expected shape
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| MdpError::MalformedModel(e.to_string()))
    }
}

impl<S: Hashable, A: Hashable> TransitionModel<S, A> {
    /// Build and validate a model from configuration data
    pub fn from_config(config: MdpConfig<S, A>) -> Result<Self> {
        let mut builder = Self::builder().initial(config.initial_state);

        for state in config.states {
            builder = if state.terminal {
                builder.terminal(state.id)
            } else {
                builder.state(state.id)
            };
            if let Some(name) = state.name {
                builder = builder.state_name(state.id, name);
            }
        }
        for action in config.actions {
            builder = builder.action(action.id);
            if let Some(name) = action.name {
                builder = builder.action_name(action.id, name);
            }
        }
        for allowed in config.allowed {
            builder = builder.allow(allowed.state, allowed.actions);
        }
        for t in config.transitions {
            for o in t.outcomes {
                builder = builder.transition(t.state, t.action, o.next_state, o.prob, o.reward);
            }
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    enum Move {
        Stay,
        Go,
    }

    const GOOD_BAD: &str = r#"{
        "states": [
            { "id": 0, "name": "Good" },
            { "id": 1, "terminal": true, "name": "Bad" }
        ],
        "actions": [{ "id": "Stay" }, { "id": "Go" }],
        "transitions": [
            { "state": 0, "action": "Stay", "outcomes": [{ "next_state": 0, "prob": 1.0, "reward": 1.0 }] },
            { "state": 0, "action": "Go", "outcomes": [{ "next_state": 1, "prob": 1.0, "reward": 5.0 }] }
        ],
        "initial_state": 0
    }"#;

    #[test]
    fn parse_and_build() {
        let config = MdpConfig::<u8, Move>::from_json(GOOD_BAD).unwrap();
        assert!(config.allowed.is_empty(), "allowed defaults to empty");

        let model = TransitionModel::from_config(config).unwrap();
        assert_eq!(model.states(), [0, 1]);
        assert_eq!(model.action_set(), [Move::Stay, Move::Go]);
        assert_eq!(model.is_terminal(1), Ok(true));
        assert_eq!(model.state_name(1), Some("Bad"));
        assert_eq!(model.initial_state(), 0);
        assert_eq!(model.outcomes(0, Move::Go).unwrap()[0].reward, 5.0);
    }

    #[test]
    fn serialize_roundtrip_preserves_order() {
        let config = MdpConfig::<u8, Move>::from_json(GOOD_BAD).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let again = MdpConfig::<u8, Move>::from_json(&json).unwrap();
        assert_eq!(config, again);
    }

    #[test]
    fn rejects_malformed_documents() {
        let err = MdpConfig::<u8, Move>::from_json(r#"{ "states": [] }"#).unwrap_err();
        assert!(matches!(err, MdpError::MalformedModel(_)));

        let mut config = MdpConfig::<u8, Move>::from_json(GOOD_BAD).unwrap();
        config.transitions[0].outcomes[0].prob = 0.6;
        assert!(matches!(
            TransitionModel::from_config(config),
            Err(MdpError::MalformedModel(_))
        ));
    }
}
