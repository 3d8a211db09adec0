//! Error types for skerry-contract.

use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in skerry-contract.
///
/// The per-domain enums carry the detail; this type exists so callers that
/// don't care which engine failed can hold one error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Payment construction or processing failed.
    #[error(transparent)]
    Payment(#[from] crate::payment::PaymentError),

    /// Withdrawal validation failed.
    #[error(transparent)]
    Withdrawal(#[from] crate::account::WithdrawalValidationError),

    /// A renewal proposal was rejected.
    #[error(transparent)]
    Renewal(#[from] crate::renewal::RenewalError),

    /// Deriving or adjusting a revision failed.
    #[error(transparent)]
    Revision(#[from] crate::contract::RevisionError),

    /// A wire message could not be encoded or decoded.
    #[error(transparent)]
    Wire(#[from] crate::payment::WireError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
