//! Configuration errors
//!
//! Everything that can go wrong is caught when a solver, graph or simulation
//! is set up. Once running, the tick loop has no error path.

use std::fmt;

/// Errors raised while validating configuration or registering modules
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A grid axis is not a positive multiple of the dispatch block size
    InvalidResolution {
        /// Axis name (`'x'`, `'y'` or `'z'`)
        axis: char,
        /// Offending value
        value: u32,
    },
    /// A coefficient or threshold is non-finite or out of range
    InvalidParameter {
        /// Parameter name as it appears in the config struct
        name: &'static str,
        /// Human-readable constraint that was violated
        reason: String,
    },
    /// The simulation was started without any modules
    EmptyForest,
    /// A module referenced a parent index that does not exist
    UnknownParent {
        /// Index the module would have received
        module: usize,
        /// Parent index that was requested
        parent: usize,
    },
}

impl ConfigError {
    /// Shorthand for [`ConfigError::InvalidParameter`]
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidResolution { axis, value } => write!(
                f,
                "Invalid grid resolution on {axis} axis: {value} (must be a positive multiple of 8)"
            ),
            ConfigError::InvalidParameter { name, reason } => {
                write!(f, "Invalid parameter `{name}`: {reason}")
            }
            ConfigError::EmptyForest => write!(f, "Simulation has no modules"),
            ConfigError::UnknownParent { module, parent } => {
                write!(f, "Module {module} references unknown parent {parent}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Require `value` to be finite and non-negative.
pub(crate) fn require_non_negative(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            name,
            format!("must be finite and >= 0, got {value}"),
        ))
    }
}

/// Require `value` to be finite and strictly positive.
pub(crate) fn require_positive(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            name,
            format!("must be finite and > 0, got {value}"),
        ))
    }
}

/// Require `value` to lie in `[0, 1]`.
pub(crate) fn require_fraction(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            name,
            format!("must be within [0, 1], got {value}"),
        ))
    }
}
