//! Single-writer commit actor
//!
//! Endorsement runs concurrently on the callers' tasks; ordering and
//! validation happen here, one transaction at a time:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │        ReferenceLedger::submit (many tasks)          │
//! │   endorse against a read snapshot -> Endorsement     │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               CommitActor (single task)              │
//! │  1. replay receipt if request id already committed   │
//! │  2. compare read-set versions -> MVCC_READ_CONFLICT  │
//! │  3. apply writes, bump versions, store receipt       │
//! └──────────────────────────────────────────────────────┘
//! ```

use super::chaincode::Endorsement;
use super::state::WorldState;
use crate::types::Receipt;
use crate::{Error, Result};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Message sent to the commit actor
pub(crate) enum CommitMessage {
    /// Validate and apply an endorsement
    Commit {
        endorsement: Endorsement,
        response: oneshot::Sender<Result<serde_json::Value>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that orders and commits transactions
pub(crate) struct CommitActor {
    state: Arc<RwLock<WorldState>>,
    mailbox: mpsc::Receiver<CommitMessage>,
}

impl CommitActor {
    fn new(state: Arc<RwLock<WorldState>>, mailbox: mpsc::Receiver<CommitMessage>) -> Self {
        Self { state, mailbox }
    }

    /// Run the actor event loop
    async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                CommitMessage::Commit {
                    endorsement,
                    response,
                } => {
                    let result = self.commit(endorsement);
                    let _ = response.send(result);
                }
                CommitMessage::Shutdown => break,
            }
        }
        tracing::debug!("Commit actor stopped");
    }

    fn commit(&self, endorsement: Endorsement) -> Result<serde_json::Value> {
        let mut state = self.state.write();

        if let Some(request_id) = &endorsement.request_id {
            if let Some(receipt) = state.receipt(request_id) {
                tracing::debug!(
                    request_id = %request_id,
                    tx_id = %receipt.tx_id,
                    "Replaying receipt for duplicate request"
                );
                return Ok(receipt.response.clone());
            }
        }

        for (key, read_version) in &endorsement.read_set {
            let current = state.version(key);
            if current != *read_version {
                tracing::debug!(
                    tx_id = %endorsement.tx_id,
                    key = %key,
                    read_version,
                    current,
                    "Stale read set"
                );
                return Err(Error::Conflict(format!(
                    "{} read {} at version {} but version {} is committed",
                    endorsement.tx_name, key, read_version, current
                )));
            }
        }

        let receipt = endorsement.request_id.map(|request_id| Receipt {
            request_id,
            tx_id: endorsement.tx_id.clone(),
            tx_name: endorsement.tx_name.clone(),
            response: endorsement.response.clone(),
            committed_at: endorsement.timestamp,
        });
        state.apply(endorsement.writes, receipt);

        tracing::debug!(
            tx_id = %endorsement.tx_id,
            tx_name = %endorsement.tx_name,
            "Transaction committed"
        );
        Ok(endorsement.response)
    }
}

/// Handle for sending endorsements to the actor
#[derive(Clone)]
pub(crate) struct CommitHandle {
    sender: mpsc::Sender<CommitMessage>,
}

impl CommitHandle {
    /// Order and commit an endorsement
    pub(crate) async fn commit(&self, endorsement: Endorsement) -> Result<serde_json::Value> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(CommitMessage::Commit {
                endorsement,
                response: tx,
            })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Shutdown actor
    pub(crate) async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(CommitMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))
    }
}

/// Spawn the commit actor on the current runtime
pub(crate) fn spawn_commit_actor(state: Arc<RwLock<WorldState>>, capacity: usize) -> CommitHandle {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let actor = CommitActor::new(state, receiver);
    tokio::spawn(actor.run());
    CommitHandle { sender }
}
