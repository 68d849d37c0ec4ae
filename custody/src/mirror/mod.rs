//! Relational mirror of ledger state
//!
//! The mirror holds query-friendly rows (batches, transfer records, activity
//! log) keyed by the same identifiers the ledger uses. It is written after
//! the ledger commits and may lag it; the ledger stays authoritative.

mod memory;

pub use memory::MemoryMirror;

use crate::custodian::resolve_custodian;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledger_gateway::crypto::{self, DataHashInput};
use ledger_gateway::{
    ActorId, ActorRole, BatchId, BatchStatus, Currency, Custodian, LedgerBatch, LedgerTransfer,
    RecallSeverity,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use uuid::Uuid;

/// Result type for mirror calls
pub type MirrorResult<T> = std::result::Result<T, MirrorError>;

/// Mirror failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MirrorError {
    /// Store cannot be reached
    #[error("Mirror unavailable: {0}")]
    Unavailable(String),

    /// Row violates a constraint
    #[error("Mirror constraint violated: {0}")]
    Constraint(String),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

/// Kind of a transfer record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferType {
    /// Custody moved between actors
    OwnershipTransfer,
    /// Child lot split from a parent
    BatchSplit,
}

/// Batch row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorBatch {
    /// Primary key
    pub batch_id: BatchId,
    /// Registering farmer
    pub farmer: ActorId,
    /// Crop / product type
    pub crop_type: String,
    /// Variety
    pub variety: Option<String>,
    /// Current quantity
    pub quantity: Decimal,
    /// Unit of quantity
    pub unit: String,
    /// Farm location
    pub location: String,
    /// Harvest date
    pub harvest_date: Option<DateTime<Utc>>,
    /// Quality grade
    pub quality_grade: Option<String>,
    /// Price per unit
    pub price_per_unit: Option<Decimal>,
    /// `quantity * price_per_unit`
    pub total_batch_value: Option<Decimal>,
    /// Pricing currency
    pub currency: Currency,
    /// Buyer the batch is earmarked for
    pub buyer_name: Option<String>,
    /// Certifications
    pub certifications: BTreeSet<String>,
    /// Lifecycle status
    pub status: BatchStatus,
    /// Effective custodian
    pub current_owner: Option<Custodian>,
    /// Batch this one was split from
    pub parent_batch_id: Option<BatchId>,
    /// Reason given when split from the parent
    pub split_reason: Option<String>,
    /// Recall reason once recalled
    pub recall_reason: Option<String>,
    /// Recall severity once recalled
    pub recall_severity: Option<RecallSeverity>,
    /// Recall notes
    pub recall_notes: Option<String>,
    /// Who recalled it
    pub recalled_by: Option<Custodian>,
    /// When it was recalled
    pub recalled_at: Option<DateTime<Utc>>,
    /// Ledger data hash at registration
    pub blockchain_hash: String,
    /// Row creation time
    pub created_at: DateTime<Utc>,
    /// Last row update
    pub updated_at: DateTime<Utc>,
}

impl MirrorBatch {
    /// Row reflecting a ledger batch
    pub fn from_ledger(batch: &LedgerBatch) -> Self {
        let recall = batch.recall.as_ref();
        Self {
            batch_id: batch.batch_id.clone(),
            farmer: batch.farmer.clone(),
            crop_type: batch.crop_type.clone(),
            variety: batch.variety.clone(),
            quantity: batch.quantity,
            unit: batch.unit.clone(),
            location: batch.location.clone(),
            harvest_date: batch.harvest_date,
            quality_grade: batch.quality_grade.clone(),
            price_per_unit: batch.price_per_unit,
            total_batch_value: batch.total_batch_value,
            currency: batch.currency,
            buyer_name: batch.buyer_name.clone(),
            certifications: batch.certifications.clone(),
            status: batch.status,
            current_owner: Some(resolve_custodian(batch, None).custodian),
            parent_batch_id: batch.parent_batch_id.clone(),
            split_reason: batch.split_reason.clone(),
            recall_reason: recall.map(|r| r.reason.clone()),
            recall_severity: recall.map(|r| r.severity),
            recall_notes: recall.and_then(|r| r.notes.clone()),
            recalled_by: recall.map(|r| r.recalled_by.clone()),
            recalled_at: recall.map(|r| r.recalled_at),
            blockchain_hash: batch.data_hash.clone(),
            created_at: batch.created_at,
            updated_at: batch.updated_at,
        }
    }

    /// Hash of the row's registration attributes, comparable with the ledger's
    pub fn data_hash(&self) -> String {
        crypto::data_hash(&DataHashInput {
            batch_id: &self.batch_id,
            farmer: &self.farmer,
            crop_type: &self.crop_type,
            variety: self.variety.as_deref(),
            unit: &self.unit,
            location: &self.location,
            harvest_date: self.harvest_date,
            certifications: &self.certifications,
        })
    }
}

/// Transfer record row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    /// Primary key
    pub id: Uuid,
    /// Batch transferred
    pub batch_id: BatchId,
    /// Releasing actor
    pub from: Custodian,
    /// Receiving actor
    pub to: Custodian,
    /// Record kind
    pub transfer_type: TransferType,
    /// Status before
    pub status_before: BatchStatus,
    /// Status after
    pub status_after: BatchStatus,
    /// Where the hand-over happened
    pub transfer_location: Option<String>,
    /// Latitude of the hand-over
    pub latitude: Option<f64>,
    /// Longitude of the hand-over
    pub longitude: Option<f64>,
    /// Free text
    pub notes: Option<String>,
    /// Condition of the goods
    pub conditions: Option<String>,
    /// Attached document references
    pub documents: Vec<String>,
    /// Signature of the receiving party
    pub signature: Option<String>,
    /// Ledger transaction that produced it
    pub blockchain_tx_id: String,
    /// Row creation time
    pub created_at: DateTime<Utc>,
}

impl TransferRecord {
    /// Row for a ledger ownership transfer
    pub fn ownership(record: &LedgerTransfer) -> Self {
        let details = &record.details;
        Self {
            id: Uuid::new_v4(),
            batch_id: record.batch_id.clone(),
            from: record.from.clone(),
            to: record.to.clone(),
            transfer_type: TransferType::OwnershipTransfer,
            status_before: record.status_before,
            status_after: record.status_after,
            transfer_location: details.transfer_location.clone(),
            latitude: details.latitude,
            longitude: details.longitude,
            notes: details.notes.clone(),
            conditions: details.conditions.clone(),
            documents: details.documents.clone(),
            signature: details.signature.clone(),
            blockchain_tx_id: record.tx_id.clone(),
            created_at: record.timestamp,
        }
    }

    /// Row for a custody change that is not a ledger transfer
    pub fn handover(
        batch_id: &BatchId,
        from: Custodian,
        to: Custodian,
        status_before: BatchStatus,
        status_after: BatchStatus,
        tx_id: &str,
        notes: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            batch_id: batch_id.clone(),
            from,
            to,
            transfer_type: TransferType::OwnershipTransfer,
            status_before,
            status_after,
            transfer_location: None,
            latitude: None,
            longitude: None,
            notes,
            conditions: None,
            documents: Vec::new(),
            signature: None,
            blockchain_tx_id: tx_id.to_string(),
            created_at: Utc::now(),
        }
    }

    /// `BATCH_SPLIT` row for a child lot; the splitter stays the holder
    pub fn split(child: &LedgerBatch, split_by: &Custodian, tx_id: &str) -> Self {
        let parent = child
            .parent_batch_id
            .as_ref()
            .map(BatchId::as_str)
            .unwrap_or_default();
        Self {
            id: Uuid::new_v4(),
            batch_id: child.batch_id.clone(),
            from: split_by.clone(),
            to: split_by.clone(),
            transfer_type: TransferType::BatchSplit,
            status_before: child.status,
            status_after: child.status,
            transfer_location: None,
            latitude: None,
            longitude: None,
            notes: Some(format!(
                "Split from parent batch {}: {} {}",
                parent, child.quantity, child.unit
            )),
            conditions: None,
            documents: Vec::new(),
            signature: None,
            blockchain_tx_id: tx_id.to_string(),
            created_at: child.created_at,
        }
    }
}

/// Status update applied by primary key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPatch {
    /// New status
    pub status: BatchStatus,
    /// New effective custodian, when custody moved
    pub current_owner: Option<Custodian>,
    /// New quality grade
    pub quality_grade: Option<String>,
}

impl StatusPatch {
    /// Status-only patch
    pub fn status(status: BatchStatus) -> Self {
        Self {
            status,
            current_owner: None,
            quality_grade: None,
        }
    }

    /// Patch that also moves custody
    pub fn with_owner(mut self, owner: Custodian) -> Self {
        self.current_owner = Some(owner);
        self
    }
}

/// Everything a split changes, applied as one relational transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitWrite {
    /// Parent batch
    pub parent_id: BatchId,
    /// Parent quantity after the split
    pub parent_quantity: Decimal,
    /// Parent value after the split
    pub parent_total_value: Option<Decimal>,
    /// New child row
    pub child: MirrorBatch,
    /// `BATCH_SPLIT` record for the child
    pub record: TransferRecord,
}

/// Recall fields written onto a batch row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallMark {
    /// Why
    pub reason: String,
    /// Severity
    pub severity: RecallSeverity,
    /// Free text
    pub notes: Option<String>,
    /// Who
    pub recalled_by: Custodian,
    /// When
    pub recalled_at: DateTime<Utc>,
}

/// Audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityAction {
    /// Batch registered
    RegisterBatch,
    /// Generic custody transfer
    TransferBatch,
    /// Processing started
    ProcessBatch,
    /// Processing finished
    CompleteProcessing,
    /// Distributor intake
    ReceiveBatch,
    /// Hand-over to a retailer
    TransferToRetailer,
    /// Retailer shelved the batch
    ReceiveAtRetail,
    /// Batch sold
    MarkSold,
    /// Child lot split off
    BatchSplit,
    /// Batch recalled
    BatchRecall,
    /// Warehouse intake recorded
    AddDistributionRecord,
    /// Transport leg recorded
    AddTransportRecord,
}

/// Activity log row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    /// Primary key
    pub id: Uuid,
    /// Acting user
    pub actor_id: ActorId,
    /// Acting user's role
    pub actor_role: ActorRole,
    /// What happened
    pub action: ActivityAction,
    /// Batch affected
    pub batch_id: BatchId,
    /// Ledger transaction, when one was committed
    pub blockchain_tx_id: Option<String>,
    /// Action specific details
    pub details: serde_json::Value,
    /// Row creation time
    pub created_at: DateTime<Utc>,
}

/// Relational mirror contract
#[async_trait]
pub trait RelationalMirror: Send + Sync {
    /// Insert a batch row
    async fn insert_batch(&self, batch: MirrorBatch) -> MirrorResult<()>;

    /// Look up a batch row
    async fn find_batch(&self, batch_id: &BatchId) -> MirrorResult<Option<MirrorBatch>>;

    /// Insert a transfer record
    async fn insert_transfer(&self, record: TransferRecord) -> MirrorResult<()>;

    /// Update a batch row by primary key; `false` when no row exists
    async fn update_batch_status(&self, batch_id: &BatchId, patch: StatusPatch)
        -> MirrorResult<bool>;

    /// Apply a split atomically
    async fn record_split(&self, write: SplitWrite) -> MirrorResult<()>;

    /// Mark a batch row recalled; `false` when no row exists
    async fn mark_recalled(&self, batch_id: &BatchId, mark: RecallMark) -> MirrorResult<bool>;

    /// Transfer records of a batch, oldest first
    async fn transfers_for(&self, batch_id: &BatchId) -> MirrorResult<Vec<TransferRecord>>;

    /// Append to the activity log
    async fn log_activity(&self, entry: ActivityEntry) -> MirrorResult<()>;
}
