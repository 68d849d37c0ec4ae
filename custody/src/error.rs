//! Error types for the custody engine

use crate::mirror::MirrorError;
use ledger_gateway::RejectCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for custody operations
pub type Result<T> = std::result::Result<T, Error>;

/// Custody errors
#[derive(Error, Debug)]
pub enum Error {
    /// Batch (or other record) does not exist
    #[error("{0}")]
    NotFound(String),

    /// Malformed or out-of-range input
    #[error("Validation failed: {message}")]
    Validation {
        /// Offending input field
        field: Option<String>,
        /// What is wrong with it
        message: String,
    },

    /// Batch status does not permit the operation
    #[error("{0}")]
    InvalidState(String),

    /// Batch has already been recalled
    #[error("{0}")]
    AlreadyRecalled(String),

    /// Initiating actor may not perform the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// MVCC conflicts persisted through every retry
    #[error("Ledger conflict persisted after retries: {0}")]
    LedgerConflict(String),

    /// Permanent ledger failure
    #[error("Ledger error: {0}")]
    Ledger(#[source] ledger_gateway::Error),

    /// Relational mirror read failed
    #[error("Mirror error: {0}")]
    Mirror(#[from] MirrorError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Error category exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Record does not exist
    NotFound,
    /// Bad input
    Validation,
    /// Status forbids the operation
    InvalidState,
    /// Recall of a recalled batch
    AlreadyRecalled,
    /// Actor lacks authority
    Forbidden,
    /// Conflicts outlasted the retry budget
    LedgerConflict,
    /// Ledger failure
    Ledger,
    /// Mirror read failure
    Mirror,
    /// Configuration problem
    Config,
    /// Anything else
    Internal,
}

/// Serializable form of an error for the route layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    /// Category
    pub kind: ErrorKind,
    /// Human readable message
    pub message: String,
    /// Offending input field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl Error {
    /// Validation error tied to an input field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Category of the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Validation { .. } => ErrorKind::Validation,
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::AlreadyRecalled(_) => ErrorKind::AlreadyRecalled,
            Error::Forbidden(_) => ErrorKind::Forbidden,
            Error::LedgerConflict(_) => ErrorKind::LedgerConflict,
            Error::Ledger(_) => ErrorKind::Ledger,
            Error::Mirror(_) => ErrorKind::Mirror,
            Error::Config(_) => ErrorKind::Config,
            Error::Io(_) | Error::Other(_) => ErrorKind::Internal,
        }
    }

    /// Offending input field, where one applies
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::Validation { field, .. } => field.as_deref(),
            _ => None,
        }
    }

    /// Whether retrying the same operation may succeed.
    ///
    /// MVCC conflicts and unknown submit outcomes are transient; everything
    /// else is a caller mistake or a permanent failure.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::LedgerConflict(_) => true,
            Error::Ledger(e) => e.is_outcome_unknown(),
            _ => false,
        }
    }

    /// Serializable report
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
            field: self.field().map(str::to_string),
        }
    }
}

impl From<ledger_gateway::Error> for Error {
    fn from(err: ledger_gateway::Error) -> Self {
        use ledger_gateway::Error as L;
        match err {
            L::Conflict(message) => Error::LedgerConflict(message),
            L::NotFound(message) => Error::NotFound(message),
            L::Rejected { code, message } => match code {
                RejectCode::Validation => Error::Validation {
                    field: None,
                    message,
                },
                RejectCode::Duplicate => Error::validation("batchId", message),
                RejectCode::InvalidState => Error::InvalidState(message),
                RejectCode::AlreadyRecalled => Error::AlreadyRecalled(message),
            },
            L::InvalidArgument(message) => Error::Validation {
                field: None,
                message,
            },
            other => Error::Ledger(other),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Ledger(ledger_gateway::Error::Serialization(err))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_maps_to_transient() {
        let err: Error = ledger_gateway::Error::Conflict("BAT-001".into()).into();
        assert_eq!(err.kind(), ErrorKind::LedgerConflict);
        assert!(err.is_transient());
    }

    #[test]
    fn test_unknown_outcome_is_transient_but_timeout_is_not() {
        let unknown: Error = ledger_gateway::Error::OutcomeUnknown {
            tx_name: "transferBatch".into(),
        }
        .into();
        assert_eq!(unknown.kind(), ErrorKind::Ledger);
        assert!(unknown.is_transient());

        let timeout: Error = ledger_gateway::Error::Timeout {
            tx_name: "getBatch".into(),
            elapsed_ms: 10,
        }
        .into();
        assert!(!timeout.is_transient());
    }

    #[test]
    fn test_rejections_map_to_caller_errors() {
        let err: Error =
            ledger_gateway::Error::rejected(RejectCode::AlreadyRecalled, "BAT-001 recalled").into();
        assert_eq!(err.kind(), ErrorKind::AlreadyRecalled);
        assert!(!err.is_transient());

        let err: Error = ledger_gateway::Error::NotFound("Batch X does not exist".into()).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_report_carries_field() {
        let report = Error::validation("splitQuantity", "must be positive").report();
        assert_eq!(report.kind, ErrorKind::Validation);
        assert_eq!(report.field.as_deref(), Some("splitQuantity"));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "VALIDATION");
    }
}
