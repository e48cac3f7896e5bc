use thiserror::Error;

/// Errors produced while building, simulating, or solving an MDP
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MdpError {
    /// A state id that the model does not define
    #[error("unknown state {0}")]
    UnknownState(String),

    /// An action id that the model does not define
    #[error("unknown action {0}")]
    UnknownAction(String),

    /// An action that exists but is not legal in the given state
    #[error("action {action} is not legal in state {state}")]
    InvalidAction { state: String, action: String },

    /// The transition table failed validation
    #[error("malformed model: {0}")]
    MalformedModel(String),

    /// A solver or evaluation parameter is out of range
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The solver hit its iteration cap before the sweep delta fell below the threshold
    #[error("did not converge after {iterations} iterations (last delta {delta})")]
    NonConvergence { iterations: u32, delta: f64 },
}

impl MdpError {
    pub(crate) fn unknown_state(state: impl std::fmt::Debug) -> Self {
        Self::UnknownState(format!("{state:?}"))
    }

    pub(crate) fn unknown_action(action: impl std::fmt::Debug) -> Self {
        Self::UnknownAction(format!("{action:?}"))
    }

    pub(crate) fn invalid_action(state: impl std::fmt::Debug, action: impl std::fmt::Debug) -> Self {
        Self::InvalidAction {
            state: format!("{state:?}"),
            action: format!("{action:?}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, MdpError>;
