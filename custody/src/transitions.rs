//! Workflow edges of the custody state machine
//!
//! ```text
//! REGISTERED -process-> PROCESSING -complete-> PROCESSED -receive-> IN_DISTRIBUTION
//!   -transfer_to_retailer-> RETAIL_READY -receive_at_retail-> IN_RETAIL -mark_sold-> SOLD
//! ```
//!
//! Each edge names the role allowed to initiate it. `ADMIN` may initiate any
//! edge. Recall is not a workflow edge and is handled by the recall path.

use crate::types::Actor;
use crate::{Error, Result};
use ledger_gateway::{ActorRole, BatchStatus, LedgerBatch};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named workflow edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// Processor takes a registered batch in
    Process,
    /// Processor finishes processing
    Complete,
    /// Distributor takes a processed batch in
    Receive,
    /// Distributor hands over to a retailer
    TransferToRetailer,
    /// Retailer shelves the batch
    ReceiveAtRetail,
    /// Retailer sells the batch
    MarkSold,
}

impl Transition {
    /// Every edge, in workflow order
    pub const ALL: [Transition; 6] = [
        Transition::Process,
        Transition::Complete,
        Transition::Receive,
        Transition::TransferToRetailer,
        Transition::ReceiveAtRetail,
        Transition::MarkSold,
    ];

    /// Operation name used in logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            Transition::Process => "process",
            Transition::Complete => "complete",
            Transition::Receive => "receive",
            Transition::TransferToRetailer => "transfer_to_retailer",
            Transition::ReceiveAtRetail => "receive_at_retail",
            Transition::MarkSold => "mark_sold",
        }
    }

    /// Required status before the edge
    pub fn from_status(&self) -> BatchStatus {
        match self {
            Transition::Process => BatchStatus::Registered,
            Transition::Complete => BatchStatus::Processing,
            Transition::Receive => BatchStatus::Processed,
            Transition::TransferToRetailer => BatchStatus::InDistribution,
            Transition::ReceiveAtRetail => BatchStatus::RetailReady,
            Transition::MarkSold => BatchStatus::InRetail,
        }
    }

    /// Status after the edge
    pub fn to_status(&self) -> BatchStatus {
        match self {
            Transition::Process => BatchStatus::Processing,
            Transition::Complete => BatchStatus::Processed,
            Transition::Receive => BatchStatus::InDistribution,
            Transition::TransferToRetailer => BatchStatus::RetailReady,
            Transition::ReceiveAtRetail => BatchStatus::InRetail,
            Transition::MarkSold => BatchStatus::Sold,
        }
    }

    /// Role allowed to initiate the edge, besides `ADMIN`
    pub fn initiator_role(&self) -> ActorRole {
        match self {
            Transition::Process | Transition::Complete => ActorRole::Processor,
            Transition::Receive | Transition::TransferToRetailer => ActorRole::Distributor,
            Transition::ReceiveAtRetail | Transition::MarkSold => ActorRole::Retailer,
        }
    }

    /// Edge leaving `status`, if any
    pub fn leaving(status: BatchStatus) -> Option<Transition> {
        Self::ALL.into_iter().find(|t| t.from_status() == status)
    }

    /// Check that `actor` may initiate the edge
    pub fn authorize(&self, actor: &Actor) -> Result<()> {
        if actor.role == ActorRole::Admin || actor.role == self.initiator_role() {
            return Ok(());
        }
        Err(Error::Forbidden(format!(
            "{} requires role {}; {} acts as {}",
            self.name(),
            self.initiator_role(),
            actor.id,
            actor.role
        )))
    }

    /// Check that `batch` is where the edge starts
    pub fn check_status(&self, batch: &LedgerBatch) -> Result<()> {
        if batch.status == BatchStatus::Recalled {
            return Err(Error::InvalidState(format!(
                "Batch {} has been recalled",
                batch.batch_id
            )));
        }
        if batch.status != self.from_status() {
            return Err(Error::InvalidState(format!(
                "Batch {} is {}; {} requires {}",
                batch.batch_id,
                batch.status,
                self.name(),
                self.from_status()
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
