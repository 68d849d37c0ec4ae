//! Request and result types
//!
//! Requests are validated at the boundary with [`validate`](TransferRequest::validate)
//! before any ledger round trip. Results keep the ledger outcome and the
//! mirror outcome apart: a committed ledger write is a success even when the
//! mirror could not follow it.

use crate::mirror::TransferRecord;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use ledger_gateway::types::{DistributionRecord, TransferDetails, TransportRecord};
use ledger_gateway::{
    ActorId, ActorRole, BatchId, BatchStatus, Currency, Custodian, LedgerBatch, LedgerTransfer,
    RecallSeverity,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Authenticated user initiating an operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    /// User identifier
    pub id: ActorId,
    /// Role the user acts in
    pub role: ActorRole,
}

impl Actor {
    /// Create new actor
    pub fn new(id: impl Into<String>, role: ActorRole) -> Self {
        Self {
            id: ActorId::new(id),
            role,
        }
    }

    /// The actor as a custody party
    pub fn custodian(&self) -> Custodian {
        Custodian {
            actor_id: self.id.clone(),
            actor_role: self.role,
        }
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(field, format!("{field} is required")));
    }
    Ok(())
}

fn positive(field: &str, value: Decimal) -> Result<()> {
    if value <= Decimal::ZERO {
        return Err(Error::validation(
            field,
            format!("{field} must be greater than 0"),
        ));
    }
    Ok(())
}

fn non_negative(field: &str, value: Option<Decimal>) -> Result<()> {
    match value {
        Some(v) if v < Decimal::ZERO => Err(Error::validation(
            field,
            format!("{field} must not be negative"),
        )),
        _ => Ok(()),
    }
}

fn optional_text(field: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(v) => require(field, v),
        None => Ok(()),
    }
}

/// Hand-over metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransferMetadata {
    /// Where the hand-over happened
    pub transfer_location: Option<String>,
    /// Latitude, degrees
    pub latitude: Option<f64>,
    /// Longitude, degrees
    pub longitude: Option<f64>,
    /// Free text
    pub notes: Option<String>,
    /// Condition of the goods
    pub conditions: Option<String>,
    /// Attached document references
    pub documents: Vec<String>,
    /// Signature of the receiving party
    pub signature: Option<String>,
}

impl TransferMetadata {
    /// Check coordinates
    pub fn validate(&self) -> Result<()> {
        if let Some(lat) = self.latitude {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(Error::validation("latitude", "latitude must be within [-90, 90]"));
            }
        }
        if let Some(lon) = self.longitude {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(Error::validation(
                    "longitude",
                    "longitude must be within [-180, 180]",
                ));
            }
        }
        Ok(())
    }

    /// Notes, or `default` when none were given
    pub fn with_default_notes(mut self, default: &str) -> Self {
        if self.notes.is_none() {
            self.notes = Some(default.to_string());
        }
        self
    }

    pub(crate) fn into_details(self, request_id: &str) -> TransferDetails {
        TransferDetails {
            transfer_location: self.transfer_location,
            latitude: self.latitude,
            longitude: self.longitude,
            notes: self.notes,
            conditions: self.conditions,
            documents: self.documents,
            signature: self.signature,
            request_id: Some(request_id.to_string()),
        }
    }
}

/// Register a new batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Identifier to use; generated when absent
    pub batch_id: Option<BatchId>,
    /// Registering farmer
    pub farmer: Actor,
    /// Crop / product type
    pub crop_type: String,
    /// Variety
    pub variety: Option<String>,
    /// Quantity
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
    /// Pricing currency
    #[serde(default)]
    pub currency: Currency,
    /// Buyer the batch is earmarked for
    pub buyer_name: Option<String>,
    /// Free text
    pub notes: Option<String>,
    /// Certifications
    #[serde(default)]
    pub certifications: BTreeSet<String>,
}

impl RegisterRequest {
    /// Request with the required attributes; everything else unset
    pub fn new(
        farmer: Actor,
        crop_type: impl Into<String>,
        quantity: Decimal,
        unit: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            batch_id: None,
            farmer,
            crop_type: crop_type.into(),
            variety: None,
            quantity,
            unit: unit.into(),
            location: location.into(),
            harvest_date: None,
            quality_grade: None,
            price_per_unit: None,
            currency: Currency::default(),
            buyer_name: None,
            notes: None,
            certifications: BTreeSet::new(),
        }
    }

    /// Use a caller-chosen batch id
    pub fn with_batch_id(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(BatchId::new(batch_id));
        self
    }

    /// Check input
    pub fn validate(&self) -> Result<()> {
        if let Some(id) = &self.batch_id {
            require("batchId", id.as_str())?;
        }
        require("cropType", &self.crop_type)?;
        require("unit", &self.unit)?;
        require("location", &self.location)?;
        positive("quantity", self.quantity)?;
        non_negative("pricePerUnit", self.price_per_unit)
    }
}

/// Generic custody transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    /// Batch to transfer
    pub batch_id: BatchId,
    /// Caller, recorded as the releasing party
    pub from: Actor,
    /// Receiving actor
    pub to_actor_id: ActorId,
    /// Role the receiver takes custody in
    pub to_actor_role: ActorRole,
    /// Hand-over metadata
    #[serde(default)]
    pub metadata: TransferMetadata,
}

impl TransferRequest {
    /// Check input
    pub fn validate(&self) -> Result<()> {
        require("batchId", self.batch_id.as_str())?;
        require("toActorId", self.to_actor_id.as_str())?;
        if !self.to_actor_role.is_custodial() {
            return Err(Error::validation(
                "toActorRole",
                format!(
                    "{} cannot hold custody; expected one of FARMER, PROCESSOR, DISTRIBUTOR, RETAILER",
                    self.to_actor_role
                ),
            ));
        }
        self.metadata.validate()
    }
}

/// Processor takes a registered batch in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    /// Batch to process
    pub batch_id: BatchId,
    /// Processor
    pub processor: Actor,
    /// Kind of processing; `initial_processing` when absent
    pub processing_type: Option<String>,
    /// Quantity entering processing
    pub input_quantity: Option<Decimal>,
    /// Expected output quantity
    pub output_quantity: Option<Decimal>,
    /// Processing facility
    pub facility: Option<String>,
    /// Free text
    pub notes: Option<String>,
}

impl ProcessRequest {
    /// Check input
    pub fn validate(&self) -> Result<()> {
        require("batchId", self.batch_id.as_str())?;
        optional_text("processingType", self.processing_type.as_deref())?;
        if let Some(q) = self.input_quantity {
            positive("inputQuantity", q)?;
        }
        if let Some(q) = self.output_quantity {
            positive("outputQuantity", q)?;
        }
        Ok(())
    }
}

/// Processor finishes processing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    /// Batch being processed
    pub batch_id: BatchId,
    /// Processor
    pub processor: Actor,
    /// Grade assigned on completion
    pub quality_grade: Option<String>,
    /// Free text
    pub notes: Option<String>,
}

impl CompleteRequest {
    /// Check input
    pub fn validate(&self) -> Result<()> {
        require("batchId", self.batch_id.as_str())?;
        optional_text("qualityGrade", self.quality_grade.as_deref())
    }
}

/// Distributor takes a processed batch in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveRequest {
    /// Batch to receive
    pub batch_id: BatchId,
    /// Receiving distributor
    pub distributor: Actor,
    /// Processor handing the batch over, when the caller knows it
    pub from_processor_id: Option<ActorId>,
    /// Hand-over metadata
    #[serde(default)]
    pub metadata: TransferMetadata,
}

impl ReceiveRequest {
    /// Check input
    pub fn validate(&self) -> Result<()> {
        require("batchId", self.batch_id.as_str())?;
        self.metadata.validate()
    }
}

/// Distributor hands a batch to a retailer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetailTransferRequest {
    /// Batch to hand over
    pub batch_id: BatchId,
    /// Releasing distributor
    pub distributor: Actor,
    /// Receiving retailer
    pub retailer_id: ActorId,
    /// Hand-over metadata
    #[serde(default)]
    pub metadata: TransferMetadata,
}

impl RetailTransferRequest {
    /// Check input
    pub fn validate(&self) -> Result<()> {
        require("batchId", self.batch_id.as_str())?;
        require("retailerId", self.retailer_id.as_str())?;
        self.metadata.validate()
    }
}

/// Retailer shelves a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetailReceiveRequest {
    /// Batch received
    pub batch_id: BatchId,
    /// Retailer
    pub retailer: Actor,
    /// Free text
    pub notes: Option<String>,
}

impl RetailReceiveRequest {
    /// Check input
    pub fn validate(&self) -> Result<()> {
        require("batchId", self.batch_id.as_str())
    }
}

/// Retailer sells a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleRequest {
    /// Batch sold
    pub batch_id: BatchId,
    /// Retailer
    pub retailer: Actor,
    /// Customer
    pub final_customer: Option<String>,
    /// Sale price per unit
    pub sale_price_per_unit: Option<Decimal>,
    /// Free text
    pub notes: Option<String>,
}

impl SaleRequest {
    /// Check input
    pub fn validate(&self) -> Result<()> {
        require("batchId", self.batch_id.as_str())?;
        optional_text("finalCustomer", self.final_customer.as_deref())?;
        non_negative("salePricePerUnit", self.sale_price_per_unit)
    }
}

/// Split a child lot off a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitRequest {
    /// Parent batch
    pub parent_batch_id: BatchId,
    /// Actor performing the split
    pub initiator: Actor,
    /// Quantity moved to the child
    pub split_quantity: Decimal,
    /// Why; defaults to a distribution split
    pub reason: Option<String>,
    /// Buyer of the child lot
    pub buyer_name: Option<String>,
    /// Price per unit of the child lot; parent's when absent
    pub price_per_unit: Option<Decimal>,
    /// Free text
    pub notes: Option<String>,
}

impl SplitRequest {
    /// Check input that does not depend on the parent
    pub fn validate(&self) -> Result<()> {
        require("batchId", self.parent_batch_id.as_str())?;
        positive("splitQuantity", self.split_quantity)?;
        optional_text("reason", self.reason.as_deref())?;
        non_negative("pricePerUnit", self.price_per_unit)
    }
}

/// Recall a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallRequest {
    /// Batch to recall
    pub batch_id: BatchId,
    /// Initiator
    pub initiator: Actor,
    /// Why
    pub reason: String,
    /// Severity; configured default when absent
    pub severity: Option<RecallSeverity>,
    /// Free text
    pub notes: Option<String>,
    /// Also recall every batch split from it, transitively
    pub recall_children: bool,
}

impl RecallRequest {
    /// Check input
    pub fn validate(&self) -> Result<()> {
        require("batchId", self.batch_id.as_str())?;
        require("reason", &self.reason)
    }
}

/// Record a warehouse intake
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionRequest {
    /// Batch received
    pub batch_id: BatchId,
    /// Distributor
    pub distributor: Actor,
    /// Warehouse location
    pub warehouse_location: String,
    /// Storage conditions
    pub storage_conditions: Option<String>,
    /// Quantity counted on intake
    pub quantity_received: Option<Decimal>,
    /// Free text
    pub notes: Option<String>,
}

impl DistributionRequest {
    /// Check input
    pub fn validate(&self) -> Result<()> {
        require("batchId", self.batch_id.as_str())?;
        require("warehouseLocation", &self.warehouse_location)?;
        if let Some(q) = self.quantity_received {
            positive("quantityReceived", q)?;
        }
        Ok(())
    }
}

/// Record a transport leg
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportRequest {
    /// Batch moved
    pub batch_id: BatchId,
    /// Carrier
    pub carrier: Actor,
    /// Departure site
    pub origin: String,
    /// Arrival site
    pub destination: String,
    /// Vehicle registration or type
    pub vehicle: Option<String>,
    /// Cargo temperature in Celsius
    pub temperature_celsius: Option<Decimal>,
    /// Free text
    pub notes: Option<String>,
}

impl TransportRequest {
    /// Check input
    pub fn validate(&self) -> Result<()> {
        require("batchId", self.batch_id.as_str())?;
        require("origin", &self.origin)?;
        require("destination", &self.destination)
    }
}

/// A mirror write that did not follow a committed ledger write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorWarning {
    /// Batch whose mirror rows are stale
    pub batch_id: BatchId,
    /// Operation that committed on the ledger
    pub operation: String,
    /// Ledger transaction the mirror missed
    pub ledger_tx_id: String,
    /// Mirror error text
    pub error: String,
    /// When the mirror write failed
    pub occurred_at: DateTime<Utc>,
}

/// Outcome of the mirror half of a dual write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MirrorOutcome {
    /// Every mirror write applied
    Written,
    /// The batch has no mirror row; status was not updated
    RowMissing,
    /// A mirror write failed after the ledger committed
    Failed(MirrorWarning),
}

impl MirrorOutcome {
    /// Whether the mirror now agrees with the ledger
    pub fn is_consistent(&self) -> bool {
        !matches!(self, MirrorOutcome::Failed(_))
    }

    /// Warning, when the mirror write failed
    pub fn warning(&self) -> Option<&MirrorWarning> {
        match self {
            MirrorOutcome::Failed(w) => Some(w),
            _ => None,
        }
    }
}

/// Result of registering a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResult {
    /// Batch as committed
    pub batch: LedgerBatch,
    /// Mirror outcome
    pub mirror: MirrorOutcome,
}

/// Result of a custody transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResult {
    /// Transfer record committed to the ledger
    pub ledger_record: LedgerTransfer,
    /// Transfer record written to the mirror
    pub mirror_record: Option<TransferRecord>,
    /// Mirror outcome
    pub mirror: MirrorOutcome,
}

/// Result of a status-only transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusTransitionResult {
    /// Batch after the transition
    pub batch: LedgerBatch,
    /// Status before
    pub status_before: BatchStatus,
    /// Status after
    pub status_after: BatchStatus,
    /// Ledger transaction id
    pub ledger_tx_id: String,
    /// Transfer record written to the mirror, for transitions that move custody
    pub mirror_record: Option<TransferRecord>,
    /// Mirror outcome
    pub mirror: MirrorOutcome,
}

/// Result of a split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitResult {
    /// Parent after the split
    pub parent: LedgerBatch,
    /// New child lot
    pub child: LedgerBatch,
    /// Ledger transaction id
    pub ledger_tx_id: String,
    /// `BATCH_SPLIT` record written to the mirror
    pub mirror_record: Option<TransferRecord>,
    /// Mirror outcome
    pub mirror: MirrorOutcome,
}

/// Result of a recall
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallResult {
    /// Root batch
    pub batch_id: BatchId,
    /// Severity
    pub severity: RecallSeverity,
    /// Reason given for the root
    pub reason: String,
    /// Batches this call moved to `RECALLED`
    pub total_affected_batches: usize,
    /// Their identifiers, root first, then breadth first
    pub affected_batch_ids: Vec<BatchId>,
    /// Descendants whose recall failed
    pub unrecalled_batch_ids: Vec<BatchId>,
    /// Mirror writes that did not follow
    pub mirror_warnings: Vec<MirrorWarning>,
}

/// Result of appending a distribution or transport record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordResult<T> {
    /// Record committed to the ledger
    pub record: T,
    /// Mirror outcome (activity log)
    pub mirror: MirrorOutcome,
}

/// Distribution record result
pub type DistributionResult = RecordResult<DistributionRecord>;

/// Transport record result
pub type TransportResult = RecordResult<TransportRecord>;
