//! Plancana Custody Engine
//!
//! Custody state machine for agricultural batches: who holds a batch, which
//! status it is in, how it splits into child lots and how recalls reach every
//! lot cut from it.
//!
//! # Architecture
//!
//! The engine sits between the route layer and two stores:
//!
//! 1. **Ledger** (authoritative): reached through a [`GatewayPool`] of scoped
//!    leases; every write is validated against a fresh read and retried on
//!    MVCC conflicts
//! 2. **Mirror** (eventually consistent): a [`RelationalMirror`] written only
//!    after the ledger commits; failures become [`MirrorWarning`]s
//!
//! # Status graph
//!
//! ```text
//! REGISTERED -> PROCESSING -> PROCESSED -> IN_DISTRIBUTION -> RETAIL_READY -> IN_RETAIL -> SOLD
//!      \____________\______________\______________\________________\_____________\--> RECALLED
//! ```
//!
//! # Example
//!
//! ```no_run
//! use custody::{Actor, Config, CustodyEngine, MemoryMirror, RegisterRequest};
//! use ledger_gateway::{ActorRole, GatewayPool, ReferenceLedger};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> custody::Result<()> {
//!     let config = Config::default();
//!     let ledger = Arc::new(ReferenceLedger::start());
//!     let pool = GatewayPool::new(ledger, config.ledger.gateway.clone())?;
//!     let engine = CustodyEngine::new(config, pool, Arc::new(MemoryMirror::new()))?;
//!
//!     let request = RegisterRequest::new(
//!         Actor::new("farmer-1", ActorRole::Farmer),
//!         "Pineapple",
//!         rust_decimal::Decimal::new(500, 0),
//!         "kg",
//!         "Johor",
//!     );
//!     let registered = engine.register(request).await?;
//!     println!("Registered {}", registered.batch.batch_id);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod custodian;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod mirror;
pub mod queries;
pub mod recall;
pub mod records;
pub mod retry;
pub mod split;
pub mod transitions;
pub mod types;

// Re-exports
pub use config::Config;
pub use custodian::{resolve_custodian, CustodianSource, ResolvedCustodian};
pub use engine::CustodyEngine;
pub use error::{Error, ErrorKind, ErrorReport, Result};
pub use metrics::CustodyMetrics;
pub use mirror::{MemoryMirror, MirrorError, RelationalMirror, TransferRecord, TransferType};
pub use queries::{Lineage, OwnershipHistory, RecallStatus, ReconcileAction, ReconcileReport};
pub use retry::{RetryConfig, RetryStrategy};
pub use transitions::Transition;
pub use types::*;

pub use ledger_gateway::{
    ActorId, ActorRole, BatchId, BatchStatus, Currency, Custodian, GatewayPool, LedgerBatch,
    LedgerTransfer, RecallSeverity,
};
