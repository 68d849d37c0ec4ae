//! Core types for the batch ledger
//!
//! All types are designed for:
//! - Stable JSON encoding (the ledger speaks JSON payloads)
//! - Exact arithmetic (Decimal for quantities and prices)
//! - Immutable history (records are appended, never rewritten)

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Batch identifier (`BAT-2024-0001`, `BAT-2024-0001-A`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
    /// Create new batch ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identifier of the `index`-th child split from this batch.
    ///
    /// Suffixes run `A`..`Z`, then `AA`, `AB`, ... (bijective base 26).
    pub fn child(&self, index: usize) -> BatchId {
        let mut n = index + 1;
        let mut suffix = Vec::new();
        while n > 0 {
            let rem = (n - 1) % 26;
            suffix.push(b'A' + rem as u8);
            n = (n - 1) / 26;
        }
        suffix.reverse();
        BatchId(format!("{}-{}", self.0, String::from_utf8_lossy(&suffix)))
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BatchId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Supply-chain actor identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    /// Create new actor ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ActorId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Role an actor plays in the supply chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorRole {
    /// Grows and registers batches
    Farmer,
    /// Processes raw produce
    Processor,
    /// Warehouses and moves batches
    Distributor,
    /// Sells to the final customer
    Retailer,
    /// Platform administrator
    Admin,
    /// Food-safety regulator
    Regulator,
}

impl ActorRole {
    /// Roles that may hold custody of a batch
    pub const CUSTODIAL: [ActorRole; 4] = [
        ActorRole::Farmer,
        ActorRole::Processor,
        ActorRole::Distributor,
        ActorRole::Retailer,
    ];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Farmer => "FARMER",
            ActorRole::Processor => "PROCESSOR",
            ActorRole::Distributor => "DISTRIBUTOR",
            ActorRole::Retailer => "RETAILER",
            ActorRole::Admin => "ADMIN",
            ActorRole::Regulator => "REGULATOR",
        }
    }

    /// Whether the role may receive custody of a batch
    pub fn is_custodial(&self) -> bool {
        Self::CUSTODIAL.contains(self)
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "FARMER" => Ok(ActorRole::Farmer),
            "PROCESSOR" => Ok(ActorRole::Processor),
            "DISTRIBUTOR" => Ok(ActorRole::Distributor),
            "RETAILER" => Ok(ActorRole::Retailer),
            "ADMIN" => Ok(ActorRole::Admin),
            "REGULATOR" => Ok(ActorRole::Regulator),
            other => Err(Error::InvalidArgument(format!("unknown actor role {other}"))),
        }
    }
}

/// Batch lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum BatchStatus {
    /// Registered by the farmer
    Registered = 0,
    /// Being processed
    Processing = 1,
    /// Processing finished
    Processed = 2,
    /// Moving between sites
    InTransit = 3,
    /// Held by a distributor
    InDistribution = 4,
    /// Handed to a retailer, not yet shelved
    RetailReady = 5,
    /// On the retailer's shelf
    InRetail = 6,
    /// Sold (terminal)
    Sold = 7,
    /// Recalled (terminal)
    Recalled = 8,
}

impl BatchStatus {
    /// Whether the status admits no further custody transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Sold | BatchStatus::Recalled)
    }

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Registered => "REGISTERED",
            BatchStatus::Processing => "PROCESSING",
            BatchStatus::Processed => "PROCESSED",
            BatchStatus::InTransit => "IN_TRANSIT",
            BatchStatus::InDistribution => "IN_DISTRIBUTION",
            BatchStatus::RetailReady => "RETAIL_READY",
            BatchStatus::InRetail => "IN_RETAIL",
            BatchStatus::Sold => "SOLD",
            BatchStatus::Recalled => "RECALLED",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "REGISTERED" => Ok(BatchStatus::Registered),
            "PROCESSING" => Ok(BatchStatus::Processing),
            "PROCESSED" => Ok(BatchStatus::Processed),
            "IN_TRANSIT" => Ok(BatchStatus::InTransit),
            "IN_DISTRIBUTION" => Ok(BatchStatus::InDistribution),
            "RETAIL_READY" => Ok(BatchStatus::RetailReady),
            "IN_RETAIL" => Ok(BatchStatus::InRetail),
            "SOLD" => Ok(BatchStatus::Sold),
            "RECALLED" => Ok(BatchStatus::Recalled),
            other => Err(Error::InvalidArgument(format!("unknown batch status {other}"))),
        }
    }
}

/// ISO 4217 currency code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Currency {
    /// Malaysian Ringgit
    #[default]
    MYR,
    /// US Dollar
    USD,
    /// Euro
    EUR,
    /// Singapore Dollar
    SGD,
    /// Indonesian Rupiah
    IDR,
    /// Thai Baht
    THB,
}

impl Currency {
    /// ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::MYR => "MYR",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::SGD => "SGD",
            Currency::IDR => "IDR",
            Currency::THB => "THB",
        }
    }
}

impl FromStr for Currency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "MYR" => Ok(Currency::MYR),
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "SGD" => Ok(Currency::SGD),
            "IDR" => Ok(Currency::IDR),
            "THB" => Ok(Currency::THB),
            other => Err(Error::InvalidArgument(format!("unknown currency {other}"))),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Severity attached to a recall
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecallSeverity {
    /// Minor labelling or quality issue
    Low,
    /// Quality defect
    Medium,
    /// Health risk
    #[default]
    High,
    /// Immediate danger
    Critical,
}

impl fmt::Display for RecallSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecallSeverity::Low => "LOW",
            RecallSeverity::Medium => "MEDIUM",
            RecallSeverity::High => "HIGH",
            RecallSeverity::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// The actor holding a batch
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Custodian {
    /// Actor identifier
    pub actor_id: ActorId,
    /// Role the actor holds the batch in
    pub actor_role: ActorRole,
}

impl Custodian {
    /// Create new custodian
    pub fn new(actor_id: impl Into<String>, actor_role: ActorRole) -> Self {
        Self {
            actor_id: ActorId::new(actor_id),
            actor_role,
        }
    }
}

impl fmt::Display for Custodian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.actor_id, self.actor_role)
    }
}

/// Entry in a batch's status history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    /// New status
    pub status: BatchStatus,
    /// Status before the change
    pub previous_status: Option<BatchStatus>,
    /// Actor that made the change
    pub updated_by: ActorId,
    /// Commit time
    pub timestamp: DateTime<Utc>,
    /// Ledger transaction id
    pub tx_id: String,
    /// Idempotency key of the originating request
    pub request_id: Option<String>,
    /// Free text
    pub notes: Option<String>,
}

/// Processing step performed on a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingRecord {
    /// Processor that performed the step
    pub processor_id: ActorId,
    /// Kind of processing (`initial_processing`, `drying`, ...)
    pub processing_type: String,
    /// Quantity entering the step
    pub input_quantity: Option<Decimal>,
    /// Quantity leaving the step
    pub output_quantity: Option<Decimal>,
    /// Processing facility
    pub facility: Option<String>,
    /// Free text
    pub notes: Option<String>,
    /// Commit time
    pub timestamp: DateTime<Utc>,
    /// Ledger transaction id
    pub tx_id: String,
}

/// Transport leg of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportRecord {
    /// Carrier or distributor moving the batch
    pub carrier_id: ActorId,
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
    /// Commit time
    pub timestamp: DateTime<Utc>,
    /// Ledger transaction id
    pub tx_id: String,
}

/// Warehouse intake by a distributor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionRecord {
    /// Receiving distributor
    pub distributor_id: ActorId,
    /// Warehouse location
    pub warehouse_location: String,
    /// Storage conditions (`cold`, `ambient`, ...)
    pub storage_conditions: Option<String>,
    /// Quantity counted on intake
    pub quantity_received: Option<Decimal>,
    /// Free text
    pub notes: Option<String>,
    /// Commit time
    pub timestamp: DateTime<Utc>,
    /// Ledger transaction id
    pub tx_id: String,
}

/// Transfer metadata carried by `transferBatch`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferDetails {
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
    #[serde(default)]
    pub documents: Vec<String>,
    /// Signature of the receiving party
    pub signature: Option<String>,
    /// Idempotency key
    pub request_id: Option<String>,
}

/// Transfer record written by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTransfer {
    /// Ledger transaction id
    pub tx_id: String,
    /// Batch transferred
    pub batch_id: BatchId,
    /// Releasing custodian
    pub from: Custodian,
    /// Receiving custodian
    pub to: Custodian,
    /// Status before the transfer
    pub status_before: BatchStatus,
    /// Status after the transfer
    pub status_after: BatchStatus,
    /// Transfer metadata
    pub details: TransferDetails,
    /// Commit time
    pub timestamp: DateTime<Utc>,
}

/// Recall facts stored on a recalled batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallInfo {
    /// Why the batch was recalled
    pub reason: String,
    /// Severity
    pub severity: RecallSeverity,
    /// Free text
    pub notes: Option<String>,
    /// Who recalled it
    pub recalled_by: Custodian,
    /// Status at the moment of recall
    pub previous_status: BatchStatus,
    /// Ancestor whose recall cascaded here
    pub cascade_from: Option<BatchId>,
    /// Commit time
    pub recalled_at: DateTime<Utc>,
    /// Ledger transaction id
    pub tx_id: String,
}

/// World-state record of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerBatch {
    /// Identifier
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
    /// Customer the batch was sold to
    pub final_customer: Option<String>,
    /// Free text
    pub notes: Option<String>,
    /// Certifications (organic, GAP, ...)
    #[serde(default)]
    pub certifications: BTreeSet<String>,
    /// Lifecycle status
    pub status: BatchStatus,
    /// Custodian recorded by the last transfer
    pub current_owner: Option<Custodian>,
    /// Batch this one was split from
    pub parent_batch_id: Option<BatchId>,
    /// Batches split from this one, in split order
    #[serde(default)]
    pub child_batch_ids: Vec<BatchId>,
    /// Reason given when split from the parent
    pub split_reason: Option<String>,
    /// When split from the parent
    pub split_date: Option<DateTime<Utc>>,
    /// Status history, oldest first
    #[serde(default)]
    pub status_history: Vec<StatusChange>,
    /// Processing steps, oldest first
    #[serde(default)]
    pub processing_records: Vec<ProcessingRecord>,
    /// Transport legs, oldest first
    #[serde(default)]
    pub transport_records: Vec<TransportRecord>,
    /// Warehouse intakes, oldest first
    #[serde(default)]
    pub distribution_records: Vec<DistributionRecord>,
    /// Custody transfers, oldest first
    #[serde(default)]
    pub ownership_history: Vec<LedgerTransfer>,
    /// Recall facts once recalled
    pub recall: Option<RecallInfo>,
    /// Hash of the registration attributes
    pub data_hash: String,
    /// Registration commit time
    pub created_at: DateTime<Utc>,
    /// Last commit time
    pub updated_at: DateTime<Utc>,
    /// Committed revision of the batch key, bumped by every write
    #[serde(default)]
    pub version: u64,
}

impl LedgerBatch {
    /// Whether the batch admits no further custody transitions
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Processor named by the most recent processing record
    pub fn last_processor(&self) -> Option<&ActorId> {
        self.processing_records.last().map(|r| &r.processor_id)
    }

    /// Whether the batch was split from another batch
    pub fn is_split_child(&self) -> bool {
        self.parent_batch_id.is_some()
    }
}

/// Registration payload for `createBatch`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRegistration {
    /// Registering farmer
    pub farmer: ActorId,
    /// Crop / product type
    pub crop_type: String,
    /// Variety
    pub variety: Option<String>,
    /// Initial quantity
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
    /// Idempotency key
    pub request_id: Option<String>,
}

/// Processing facts attached to a status update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingData {
    /// Processor performing the step
    pub processor_id: ActorId,
    /// Kind of processing
    pub processing_type: String,
    /// Quantity entering the step
    pub input_quantity: Option<Decimal>,
    /// Quantity leaving the step
    pub output_quantity: Option<Decimal>,
    /// Facility
    pub facility: Option<String>,
}

/// Payload for `updateBatchStatus`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    /// Free text
    pub notes: Option<String>,
    /// Processing step to append
    pub processing: Option<ProcessingData>,
    /// Quality grade assigned on completion
    pub quality_grade: Option<String>,
    /// Final customer on sale
    pub final_customer: Option<String>,
    /// Sale price per unit
    pub sale_price_per_unit: Option<Decimal>,
    /// Idempotency key
    pub request_id: Option<String>,
}

/// Payload for `splitBatch`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitData {
    /// Why the batch is split
    pub reason: String,
    /// Buyer of the child lot
    pub buyer_name: Option<String>,
    /// Price per unit of the child lot
    pub price_per_unit: Option<Decimal>,
    /// Actor performing the split
    pub split_by: Custodian,
    /// Free text
    pub notes: Option<String>,
    /// Idempotency key
    pub request_id: Option<String>,
}

/// Response of `splitBatch`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitRecord {
    /// Ledger transaction id
    pub tx_id: String,
    /// Parent after the split
    pub parent: LedgerBatch,
    /// Newly created child
    pub child: LedgerBatch,
}

/// Payload for `recallBatch`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallData {
    /// Why the batch is recalled
    pub reason: String,
    /// Severity
    pub severity: RecallSeverity,
    /// Free text
    pub notes: Option<String>,
    /// Who recalls it
    pub recalled_by: Custodian,
    /// Ancestor whose recall cascades here
    pub cascade_from: Option<BatchId>,
    /// Idempotency key
    pub request_id: Option<String>,
}

/// Payload for `addTransportRecord`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportData {
    /// Carrier moving the batch
    pub carrier_id: ActorId,
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
    /// Idempotency key
    pub request_id: Option<String>,
}

/// Payload for `addDistributionRecord`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionData {
    /// Receiving distributor
    pub distributor_id: ActorId,
    /// Warehouse location
    pub warehouse_location: String,
    /// Storage conditions
    pub storage_conditions: Option<String>,
    /// Quantity counted on intake
    pub quantity_received: Option<Decimal>,
    /// Free text
    pub notes: Option<String>,
    /// Idempotency key
    pub request_id: Option<String>,
}

/// Parent and children of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchLineage {
    /// Batch queried
    pub batch_id: BatchId,
    /// Batch it was split from
    pub parent_batch_id: Option<BatchId>,
    /// Batches split from it
    pub child_batch_ids: Vec<BatchId>,
}

/// Outcome of comparing a mirror hash with the ledger's
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrityStatus {
    /// Hashes match
    Valid,
    /// Hashes differ
    Mismatch,
}

/// Response of `verifyBatchIntegrity`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    /// Batch checked
    pub batch_id: BatchId,
    /// Hash supplied by the caller
    pub database_hash: String,
    /// Hash stored on the ledger
    pub stored_hash: String,
    /// Whether they are equal
    pub hash_match: bool,
    /// Verdict
    pub integrity_status: IntegrityStatus,
    /// Evaluation time
    pub verified_at: DateTime<Utc>,
}

/// Durable record of a committed write, keyed by request id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    /// Idempotency key
    pub request_id: String,
    /// Ledger transaction id
    pub tx_id: String,
    /// Transaction name
    pub tx_name: String,
    /// Response the commit produced
    pub response: serde_json::Value,
    /// Commit time
    pub committed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_suffixes() {
        let parent = BatchId::new("BAT-001");
        assert_eq!(parent.child(0).as_str(), "BAT-001-A");
        assert_eq!(parent.child(1).as_str(), "BAT-001-B");
        assert_eq!(parent.child(25).as_str(), "BAT-001-Z");
        assert_eq!(parent.child(26).as_str(), "BAT-001-AA");
        assert_eq!(parent.child(27).as_str(), "BAT-001-AB");
        assert_eq!(parent.child(701).as_str(), "BAT-001-ZZ");
        assert_eq!(parent.child(702).as_str(), "BAT-001-AAA");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(BatchStatus::Sold.is_terminal());
        assert!(BatchStatus::Recalled.is_terminal());
        assert!(!BatchStatus::Registered.is_terminal());
        assert!(!BatchStatus::InRetail.is_terminal());
    }

    #[test]
    fn test_custodial_roles() {
        assert!(ActorRole::Farmer.is_custodial());
        assert!(ActorRole::Retailer.is_custodial());
        assert!(!ActorRole::Admin.is_custodial());
        assert!(!ActorRole::Regulator.is_custodial());
    }

    #[test]
    fn test_status_wire_names_round_trip() {
        let json = serde_json::to_string(&BatchStatus::InDistribution).unwrap();
        assert_eq!(json, "\"IN_DISTRIBUTION\"");
        assert_eq!(
            "RETAIL_READY".parse::<BatchStatus>().unwrap(),
            BatchStatus::RetailReady
        );
        assert!("SHIPPED".parse::<BatchStatus>().is_err());
    }
}
