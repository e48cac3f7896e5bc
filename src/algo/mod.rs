//! Dynamic programming over a known [`TransitionModel`](crate::model::TransitionModel)
pub mod policy;
pub mod value_iteration;

pub use policy::{evaluate, extract, q_values, rollout, Episode, Policy};
pub use value_iteration::{solve, Solution, ValueFunction, ValueIteration, ValueIterationConfig};
