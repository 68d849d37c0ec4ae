//! Plancana Ledger Gateway
//!
//! Contract and record types for the batch-provenance ledger, plus an
//! in-process reference ledger that honours the same contract.
//!
//! # Architecture
//!
//! - **Gateway trait**: `submit` (ordered write) and `evaluate` (read), JSON in and out
//! - **Scoped connections**: a bounded pool hands out leases that release on drop
//! - **Deadlines**: timed-out submits are reported as unknown outcomes, not failures
//! - **Receipts**: writes carry a request id so unknown outcomes can be verified
//!
//! # Invariants
//!
//! - Append-only: history entries are never modified or deleted
//! - Serializable commits: stale read sets fail with `MVCC_READ_CONFLICT`
//! - Idempotent writes: a request id commits at most once

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod reference;
pub mod types;

// Re-exports
pub use config::{Config, GatewayConfig};
pub use error::{Error, RejectCode, Result};
pub use gateway::{tx, GatewayLease, GatewayPool, LedgerGateway};
pub use reference::ReferenceLedger;
pub use types::{
    ActorId, ActorRole, BatchId, BatchLineage, BatchStatus, Currency, Custodian, IntegrityReport,
    LedgerBatch, LedgerTransfer, RecallSeverity, Receipt,
};
