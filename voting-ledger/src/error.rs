//! Error types for the voting ledger

use crate::types::{CandidateId, Identity};
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed candidate name or voter identity
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Candidate id is not registered
    #[error("Candidate not found: {0}")]
    NotFound(CandidateId),

    /// Identity has already cast its vote
    #[error("Identity has already voted: {0}")]
    AlreadyVoted(Identity),

    /// Results requested on an empty candidate registry
    #[error("No candidates registered")]
    NoCandidates,

    /// Candidate registration attempted after voting started
    #[error("Candidate registration is closed once voting has started")]
    RegistrationClosed,

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Invariant violation (tally/voter mismatch, broken hash chain, etc.)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Signature verification failed
    #[error("Signature verification failed: {0}")]
    SignatureError(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for caller-facing rejections that left the ledger untouched.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::InvalidInput(_)
                | Error::NotFound(_)
                | Error::AlreadyVoted(_)
                | Error::NoCandidates
                | Error::RegistrationClosed
        )
    }

    /// Short label used for metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "invalid_input",
            Error::NotFound(_) => "not_found",
            Error::AlreadyVoted(_) => "already_voted",
            Error::NoCandidates => "no_candidates",
            Error::RegistrationClosed => "registration_closed",
            Error::Storage(_) => "storage",
            Error::Serialization(_) => "serialization",
            Error::InvariantViolation(_) => "invariant_violation",
            Error::SignatureError(_) => "signature",
            Error::Concurrency(_) => "concurrency",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
