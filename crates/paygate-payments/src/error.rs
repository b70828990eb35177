//! Issuance Error Types

use thiserror::Error;

use crate::redirect::Destination;

/// Result type alias
pub type Result<T> = std::result::Result<T, IssuanceError>;

/// Why a confirmation was treated as a replay attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplayKind {
    /// No purchase intent exists for the session.
    UnknownSession,
    /// The presented one-time token does not match the stored one.
    TokenMismatch,
    /// The intent was already claimed or issued.
    AlreadyIssued,
}

impl ReplayKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplayKind::UnknownSession => "unknown_session",
            ReplayKind::TokenMismatch => "token_mismatch",
            ReplayKind::AlreadyIssued => "already_issued",
        }
    }
}

impl std::fmt::Display for ReplayKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issuance-related errors
#[derive(Error, Debug)]
pub enum IssuanceError {
    /// Malformed or missing request input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Lookup key did not resolve to a price
    #[error("Price not found for lookup key: {0}")]
    PriceNotFound(String),

    /// Checkout session is not in the paid state
    #[error("Payment not confirmed")]
    PaymentNotConfirmed,

    /// Session is unpaid or has no billing customer, so no portal exists
    #[error("Billing portal unavailable for this session")]
    PortalUnavailable,

    /// Token mismatch, unknown session or already-consumed confirmation
    #[error("Replay detected: {0}")]
    ReplayDetected(ReplayKind),

    /// Authenticated identity differs from the purchasing identity
    #[error("Identity mismatch")]
    IdentityMismatch,

    /// Payment gateway or credential registry failed or timed out
    #[error("Upstream unavailable: {0}")]
    Upstream(String),

    /// Session or credential store failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A side effect was committed but the issuance could not be completed
    #[error("Issuance inconsistency for session {session_id} at {stage}: {reason}")]
    Inconsistency {
        session_id: String,
        stage: &'static str,
        reason: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl IssuanceError {
    /// Whether this error should be surfaced to fraud monitoring.
    pub fn is_suspicious(&self) -> bool {
        matches!(
            self,
            IssuanceError::ReplayDetected(_) | IssuanceError::IdentityMismatch
        )
    }

    /// Where the caller is sent when this error ends a request.
    pub fn destination(&self) -> Destination {
        match self {
            IssuanceError::PaymentNotConfirmed | IssuanceError::ReplayDetected(_) => {
                Destination::PaymentCancel
            }
            _ => Destination::GenericCancel,
        }
    }
}
