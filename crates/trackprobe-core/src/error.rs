//! Run-level error taxonomy.
//!
//! [`RunError::SessionStartFailure`] aborts the whole run. Every other variant
//! aborts only the scenario it occurred in; the next catalog entry still runs
//! and teardown always fires.

use thiserror::Error;

use crate::driver::DriverError;

/// Errors surfaced by bootstrap, scenario steps and teardown.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// The endpoint was unreachable or rejected the session request.
    #[error("session start failed: {0}")]
    SessionStartFailure(String),

    /// No element carried the expected text.
    #[error("element not found: {0}")]
    ElementNotFound(String),

    /// Several elements carried the expected text and the policy rejects that.
    #[error("{count} elements match {locator}")]
    AmbiguousElement {
        locator: String,
        count: usize,
    },

    /// A located element could not be interacted with.
    #[error("interaction failed: {0}")]
    InteractionFailure(String),

    /// An on-screen value did not satisfy its check.
    #[error("assertion failed: {0}")]
    AssertionFailed(String),

    /// Any other driver failure during a step.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Releasing the session failed. The handle is released regardless.
    #[error("teardown failed: {0}")]
    Teardown(String),
}

impl RunError {
    /// Returns true if the error ends the whole run rather than one scenario.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RunError::SessionStartFailure(_))
    }
}
