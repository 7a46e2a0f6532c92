//! Error kinds shared across the crate.

use thiserror::Error;

/// Fatal errors raised at scenario construction or while driving the
/// power-flow oracle.
///
/// Non-convergence of the fixed-point iteration is deliberately *not* an
/// error: the engine records a warning event for the timestep and carries
/// the last computed set-points forward.
#[derive(Debug, Error)]
pub enum SimError {
    /// Invalid device or policy configuration, surfaced at construction.
    #[error("config error: {field} — {message}")]
    Configuration {
        /// Dotted field path (e.g. `"battery.capacity_kwh"`) or device label.
        field: String,
        /// Human-readable constraint description.
        message: String,
    },

    /// Exogenous input series shorter than the simulation horizon, or a
    /// reference to an undefined circuit label.
    #[error("input mismatch: {0}")]
    InputMismatch(String),

    /// Propagated from the power-flow oracle (singular system, unsolvable
    /// operating point).
    #[error("power-flow oracle: {0}")]
    Oracle(String),
}

impl SimError {
    /// Builds a [`SimError::Configuration`] from a field path and message.
    pub fn configuration(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }
}
