//! In-process reference ledger
//!
//! Implements [`LedgerGateway`] with the batch chaincode semantics, MVCC
//! read-set validation and per-request receipts. It backs tests and the demo
//! binary; production deployments put a network gateway behind the same
//! trait.
//!
//! Faults can be scheduled per transaction name to exercise retry and
//! unknown-outcome handling:
//!
//! ```no_run
//! # async fn demo() {
//! use ledger_gateway::reference::{Fault, ReferenceLedger};
//!
//! let ledger = ReferenceLedger::start();
//! ledger.faults().inject("transferBatch", Fault::Conflict, 2);
//! # }
//! ```

mod actor;
mod chaincode;
mod state;

pub use state::WorldState;

use crate::gateway::LedgerGateway;
use crate::types::{BatchId, LedgerBatch};
use crate::{Error, Result};
use actor::{spawn_commit_actor, CommitHandle};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Fault applied to the next matching round trip
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// Fail the submit with an MVCC read conflict, committing nothing
    Conflict,
    /// Fail with a chaincode error message, classified like a remote peer's
    Fail(String),
    /// Sleep before endorsing
    Delay(Duration),
    /// Sleep between endorsement and commit, widening the MVCC window
    DelayCommit(Duration),
    /// Commit, then report an unknown outcome
    CommitAndLoseResponse,
    /// Never answer
    Hang,
}

#[derive(Debug)]
struct FaultRule {
    tx_name: Option<String>,
    fault: Fault,
    remaining: usize,
}

/// Scheduled faults, consumed in insertion order
#[derive(Debug, Default)]
pub struct FaultInjector {
    rules: Mutex<Vec<FaultRule>>,
}

impl FaultInjector {
    /// Apply `fault` to the next `times` round trips of `tx_name`
    pub fn inject(&self, tx_name: &str, fault: Fault, times: usize) {
        self.rules.lock().push(FaultRule {
            tx_name: Some(tx_name.to_string()),
            fault,
            remaining: times,
        });
    }

    /// Apply `fault` to the next `times` round trips of any transaction
    pub fn inject_any(&self, fault: Fault, times: usize) {
        self.rules.lock().push(FaultRule {
            tx_name: None,
            fault,
            remaining: times,
        });
    }

    /// Drop all scheduled faults
    pub fn clear(&self) {
        self.rules.lock().clear();
    }

    /// Round trips still scheduled to fail
    pub fn pending(&self) -> usize {
        self.rules.lock().iter().map(|r| r.remaining).sum()
    }

    fn take(&self, tx_name: &str) -> Option<Fault> {
        let mut rules = self.rules.lock();
        let index = rules.iter().position(|r| {
            r.remaining > 0 && r.tx_name.as_deref().map_or(true, |n| n == tx_name)
        })?;
        let rule = &mut rules[index];
        rule.remaining -= 1;
        let fault = rule.fault.clone();
        if rule.remaining == 0 {
            rules.remove(index);
        }
        Some(fault)
    }
}

/// In-process ledger honouring the gateway contract
pub struct ReferenceLedger {
    state: Arc<RwLock<WorldState>>,
    committer: CommitHandle,
    faults: FaultInjector,
    nonce: AtomicU64,
}

impl ReferenceLedger {
    /// Start a ledger with the default mailbox capacity.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start() -> Self {
        Self::with_mailbox_capacity(crate::config::GatewayConfig::default().commit_mailbox_capacity)
    }

    /// Start a ledger with a given commit mailbox capacity
    pub fn with_mailbox_capacity(capacity: usize) -> Self {
        let state = Arc::new(RwLock::new(WorldState::new()));
        let committer = spawn_commit_actor(state.clone(), capacity);
        Self {
            state,
            committer,
            faults: FaultInjector::default(),
            nonce: AtomicU64::new(0),
        }
    }

    /// Fault schedule
    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// Committed value of a batch key, bypassing the gateway
    pub fn batch(&self, id: &BatchId) -> Option<LedgerBatch> {
        self.state.read().batch(id).cloned()
    }

    /// Number of batch keys
    pub fn batch_count(&self) -> usize {
        self.state.read().len()
    }

    /// Transactions committed so far
    pub fn committed_transactions(&self) -> u64 {
        self.state.read().committed()
    }

    /// Stop the commit actor; later submits fail with a concurrency error
    pub async fn shutdown(&self) -> Result<()> {
        self.committer.shutdown().await
    }
}

impl std::fmt::Debug for ReferenceLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceLedger")
            .field("batches", &self.batch_count())
            .field("committed", &self.committed_transactions())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LedgerGateway for ReferenceLedger {
    async fn submit(&self, tx_name: &str, args: &[String]) -> Result<Vec<u8>> {
        let fault = self.faults.take(tx_name);
        match &fault {
            Some(Fault::Conflict) => {
                return Err(Error::Conflict(format!("injected conflict on {tx_name}")))
            }
            Some(Fault::Fail(message)) => return Err(Error::from_chaincode_message(message)),
            Some(Fault::Delay(delay)) => tokio::time::sleep(*delay).await,
            Some(Fault::Hang) => std::future::pending::<()>().await,
            _ => {}
        }

        let nonce = self.nonce.fetch_add(1, Ordering::Relaxed);
        let endorsement = {
            let state = self.state.read();
            chaincode::endorse(&state, tx_name, args, nonce)?
        };

        if let Some(Fault::DelayCommit(delay)) = &fault {
            tokio::time::sleep(*delay).await;
        }

        let response = self.committer.commit(endorsement).await?;

        if let Some(Fault::CommitAndLoseResponse) = fault {
            return Err(Error::OutcomeUnknown {
                tx_name: tx_name.to_string(),
            });
        }
        Ok(serde_json::to_vec(&response)?)
    }

    async fn evaluate(&self, tx_name: &str, args: &[String]) -> Result<Vec<u8>> {
        match self.faults.take(tx_name) {
            Some(Fault::Fail(message)) => return Err(Error::from_chaincode_message(&message)),
            Some(Fault::Delay(delay)) => tokio::time::sleep(delay).await,
            Some(Fault::Hang) => std::future::pending::<()>().await,
            _ => {}
        }

        let state = self.state.read();
        chaincode::query(&state, tx_name, args)
    }
}
