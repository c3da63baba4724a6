//! Error types for registration and dispatch.

use thiserror::Error;

/// Errors raised while registering listeners on a bus.
#[derive(Debug, Error)]
pub enum EventError {
    /// The declared member does not have the shape `fn(event) -> ()`.
    #[error("Invalid listener {listener}: {reason}")]
    InvalidListener { listener: String, reason: String },
    /// The bus was shut down and no longer accepts registrations.
    #[error("Event bus {0} is shut down")]
    BusShutdown(String),
}

impl EventError {
    pub(crate) fn invalid(listener: &str, reason: impl Into<String>) -> Self {
        Self::InvalidListener {
            listener: listener.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failure returned (or raised) by a single listener during a post.
///
/// Every variant is contained by the bus: sibling listeners still run and the
/// post returns normally. Only [`ListenerError::AbortStage`] additionally latches
/// the bus error flag that the lifecycle coordinator turns into a stage failure.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The listener failed; the cause is kept for reporting.
    #[error("listener failed: {0}")]
    Failed(#[source] anyhow::Error),
    /// The listener asks for the current stage to end in error.
    #[error("listener aborted the stage: {reason}")]
    AbortStage { reason: String },
    /// The listener panicked; the payload message is kept.
    #[error("listener panicked: {0}")]
    Panicked(String),
}

impl ListenerError {
    /// Wraps any error as a contained listener failure.
    pub fn failed(error: impl Into<anyhow::Error>) -> Self {
        Self::Failed(error.into())
    }

    /// Signals that the current stage must end in error.
    pub fn abort(reason: impl Into<String>) -> Self {
        Self::AbortStage {
            reason: reason.into(),
        }
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, Self::AbortStage { .. })
    }
}

/// Result type returned by listeners.
pub type ListenerResult = Result<(), ListenerError>;
