/// Dynamic programming algorithms
pub mod algo;

/// Model construction from configuration data
pub mod config;

/// Environment
pub mod env;

/// Error types
pub mod error;

/// Transition and reward tables
pub mod model;

/// Testing environments
#[cfg(feature = "gym")]
pub mod gym;

mod util;

pub use error::{MdpError, Result};
