//! Error taxonomy for the practice engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PracticeError {
    /// Session, deck, or card absent or not owned by the caller. Ownership
    /// mismatches surface as this variant too, so existence never leaks.
    #[error("not found")]
    NotFound,

    #[error("event {event} is not valid in state {state}")]
    InvalidTransition {
        event: &'static str,
        state: &'static str,
    },

    #[error("cannot navigate to position {to}")]
    InvalidNavigation { to: i64 },

    #[error("outcome override is only valid on the most recently answered item")]
    InvalidOverride,

    #[error("session is completed")]
    SessionCompleted,

    /// Optimistic concurrency check failed; re-fetch and retry.
    #[error("concurrent modification detected")]
    ConcurrencyConflict,

    /// Opaque failure in the persistence layer or a collaborator.
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl PracticeError {
    /// Whether re-fetching state and reapplying the request can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict)
    }
}

pub type Result<T> = std::result::Result<T, PracticeError>;
