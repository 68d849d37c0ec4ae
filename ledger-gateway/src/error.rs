//! Error types for the ledger gateway

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Marker the ledger places in the message of a transaction whose read set
/// went stale between endorsement and commit.
pub const MVCC_CONFLICT_MARKER: &str = "MVCC_READ_CONFLICT";

/// Business-rule rejection codes raised by chaincode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectCode {
    /// Malformed or out-of-range argument
    Validation,
    /// Batch is in a status that does not permit the transaction
    InvalidState,
    /// Batch has already been recalled
    AlreadyRecalled,
    /// Key already exists
    Duplicate,
}

impl RejectCode {
    /// Prefix used in chaincode error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectCode::Validation => "VALIDATION",
            RejectCode::InvalidState => "INVALID_STATE",
            RejectCode::AlreadyRecalled => "ALREADY_RECALLED",
            RejectCode::Duplicate => "DUPLICATE",
        }
    }
}

impl fmt::Display for RejectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger gateway errors
#[derive(Error, Debug)]
pub enum Error {
    /// MVCC read conflict: another transaction committed a newer version of a
    /// key this transaction read
    #[error("MVCC_READ_CONFLICT: {0}")]
    Conflict(String),

    /// Key not present in world state
    #[error("{0}")]
    NotFound(String),

    /// Chaincode rejected the transaction
    #[error("{code}: {message}")]
    Rejected {
        /// Rejection category
        code: RejectCode,
        /// Human readable reason
        message: String,
    },

    /// Transaction name not implemented by the chaincode
    #[error("Unknown transaction: {0}")]
    UnknownTransaction(String),

    /// Wrong number or shape of transaction arguments
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Evaluate round trip exceeded its deadline
    #[error("Timed out evaluating {tx_name} after {elapsed_ms}ms")]
    Timeout {
        /// Transaction name
        tx_name: String,
        /// Deadline that was exceeded
        elapsed_ms: u64,
    },

    /// Submit round trip exceeded its deadline; the transaction may or may not
    /// have been committed
    #[error("Outcome unknown for {tx_name}: submit timed out")]
    OutcomeUnknown {
        /// Transaction name
        tx_name: String,
    },

    /// No connection could be obtained
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a rejection
    pub fn rejected(code: RejectCode, message: impl Into<String>) -> Self {
        Error::Rejected {
            code,
            message: message.into(),
        }
    }

    /// Classify a raw error message returned by a remote peer.
    ///
    /// Peers report chaincode failures as plain strings, so the category has
    /// to be recovered from the text: the MVCC marker, the chaincode's
    /// `does not exist` phrasing, or a `CODE:` prefix.
    pub fn from_chaincode_message(message: &str) -> Self {
        if message.contains(MVCC_CONFLICT_MARKER) {
            return Error::Conflict(message.to_string());
        }
        if message.contains("does not exist") {
            return Error::NotFound(message.to_string());
        }
        for code in [
            RejectCode::Validation,
            RejectCode::InvalidState,
            RejectCode::AlreadyRecalled,
            RejectCode::Duplicate,
        ] {
            if let Some(rest) = message.strip_prefix(code.as_str()) {
                let rest = rest.trim_start_matches(':').trim();
                return Error::rejected(code, rest);
            }
        }
        if message.contains("already exists") {
            return Error::rejected(RejectCode::Duplicate, message);
        }
        Error::Other(message.to_string())
    }

    /// Whether this is an MVCC read conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// Whether the submit may have committed despite the error
    pub fn is_outcome_unknown(&self) -> bool {
        matches!(self, Error::OutcomeUnknown { .. })
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
