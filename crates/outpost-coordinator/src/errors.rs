//! Live Session Coordinator error types.
//!
//! Errors fall into four classes: transient network failures (REST, transport),
//! payment failures, invariant violations caught before any chain call, and
//! internal plumbing failures. User cancellation is never an error; it is a
//! `ReactionOutcome::Cancelled` value.
//!
//! Internal details are logged but `user_message()` only returns text that is
//! safe to show in a toast.

use thiserror::Error;

/// Coordinator error type.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// REST collaborator failed.
    #[error("REST error: {0}")]
    Rest(String),

    /// Real-time transport failed (send, connect, join handshake).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Blockchain collaborator failed or threw.
    #[error("Chain error: {0}")]
    Chain(String),

    /// Conference widget command failed.
    #[error("Widget error: {0}")]
    Widget(String),

    /// Confirmation dialog failed.
    #[error("Dialog error: {0}")]
    Dialog(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The local participant is not authenticated.
    #[error("Local participant is not authenticated")]
    NotAuthenticated,

    /// The reaction target has no payable chain address.
    #[error("Target has no payable address: {0}")]
    MissingPayableAddress(String),

    /// No session is loaded.
    #[error("Session unknown")]
    SessionUnknown,

    /// Self-exclusion left nobody to pay.
    #[error("No receivers left after excluding the actor")]
    NoReceivers,

    /// The session has no live data anymore; the local participant was forced out.
    #[error("Session has emptied")]
    SessionEmptied,

    /// Chain call returned failure or no transaction hash.
    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    /// Transport health check failed before prompting.
    #[error("Transport unavailable")]
    TransportUnavailable,

    /// A reaction on the same target is already being processed.
    #[error("Reaction already in progress for {0}")]
    ReactionInProgress(String),

    /// Actor channel closed or response dropped.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoordinatorError {
    /// Whether the error is a transient network failure that the watchdogs
    /// will recover from on their next scheduled check.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoordinatorError::Rest(_)
                | CoordinatorError::Transport(_)
                | CoordinatorError::TransportUnavailable
        )
    }

    /// Returns a user-safe error message (no internal details).
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            CoordinatorError::Rest(_)
            | CoordinatorError::Transport(_)
            | CoordinatorError::TransportUnavailable => {
                "Connection problem, please try again".to_string()
            }
            CoordinatorError::Chain(_) | CoordinatorError::PaymentFailed(_) => {
                "Payment failed, nothing was sent".to_string()
            }
            CoordinatorError::NotAuthenticated => "Please log in first".to_string(),
            CoordinatorError::MissingPayableAddress(_) => {
                "This user cannot receive reactions".to_string()
            }
            CoordinatorError::SessionUnknown => "Outpost not found".to_string(),
            CoordinatorError::NoReceivers => {
                "There is nobody else in the outpost to receive your cheer".to_string()
            }
            CoordinatorError::SessionEmptied => "The outpost has ended".to_string(),
            CoordinatorError::ReactionInProgress(_) => {
                "Please wait for the previous reaction to finish".to_string()
            }
            CoordinatorError::Widget(_)
            | CoordinatorError::Dialog(_)
            | CoordinatorError::Config(_)
            | CoordinatorError::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}
