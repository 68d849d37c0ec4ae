//! Batch chaincode
//!
//! Submits are endorsed against a read snapshot of the world state: the
//! transaction reads keys (recording their versions) and stages writes. The
//! resulting [`Endorsement`] is handed to the commit actor, which applies it
//! only if every version it read is still current.

use super::state::WorldState;
use crate::crypto::{self, DataHashInput};
use crate::error::RejectCode;
use crate::gateway::tx;
use crate::types::*;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Read/write set produced by executing a submit
#[derive(Debug, Clone)]
pub(crate) struct Endorsement {
    pub tx_id: String,
    pub tx_name: String,
    pub request_id: Option<String>,
    pub read_set: Vec<(BatchId, u64)>,
    pub writes: Vec<LedgerBatch>,
    pub response: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

struct TxContext<'a> {
    state: &'a WorldState,
    tx_id: String,
    now: DateTime<Utc>,
    reads: BTreeMap<BatchId, u64>,
    writes: BTreeMap<BatchId, LedgerBatch>,
}

impl<'a> TxContext<'a> {
    fn new(state: &'a WorldState, tx_id: String) -> Self {
        Self {
            state,
            tx_id,
            now: Utc::now(),
            reads: BTreeMap::new(),
            writes: BTreeMap::new(),
        }
    }

    fn record_read(&mut self, id: &BatchId) {
        if !self.writes.contains_key(id) {
            let version = self.state.version(id);
            self.reads.entry(id.clone()).or_insert(version);
        }
    }

    fn exists(&mut self, id: &BatchId) -> bool {
        self.record_read(id);
        self.writes.contains_key(id) || self.state.batch(id).is_some()
    }

    fn get(&mut self, id: &BatchId) -> Result<LedgerBatch> {
        self.record_read(id);
        if let Some(batch) = self.writes.get(id) {
            return Ok(batch.clone());
        }
        self.state
            .batch(id)
            .cloned()
            .ok_or_else(|| batch_missing(id))
    }

    fn put(&mut self, mut batch: LedgerBatch) {
        batch.updated_at = self.now;
        self.writes.insert(batch.batch_id.clone(), batch);
    }

    fn status_change(
        &self,
        status: BatchStatus,
        previous: Option<BatchStatus>,
        updated_by: &ActorId,
        request_id: Option<String>,
        notes: Option<String>,
    ) -> StatusChange {
        StatusChange {
            status,
            previous_status: previous,
            updated_by: updated_by.clone(),
            timestamp: self.now,
            tx_id: self.tx_id.clone(),
            request_id,
            notes,
        }
    }

    fn finish<T: Serialize>(
        self,
        tx_name: &str,
        request_id: Option<String>,
        response: &T,
    ) -> Result<Endorsement> {
        Ok(Endorsement {
            tx_id: self.tx_id,
            tx_name: tx_name.to_string(),
            request_id,
            read_set: self.reads.into_iter().collect(),
            writes: self.writes.into_values().collect(),
            response: serde_json::to_value(response)?,
            timestamp: self.now,
        })
    }
}

fn batch_missing(id: &BatchId) -> Error {
    Error::NotFound(format!("Batch {id} does not exist"))
}

fn arg<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| Error::InvalidArgument(format!("missing argument {name}")))
}

fn json_arg<T: DeserializeOwned>(args: &[String], index: usize, name: &str) -> Result<T> {
    let raw = arg(args, index, name)?;
    serde_json::from_str(raw).map_err(|e| Error::InvalidArgument(format!("{name}: {e}")))
}

fn reject_terminal(batch: &LedgerBatch) -> Result<()> {
    if batch.status == BatchStatus::Recalled {
        return Err(Error::rejected(
            RejectCode::InvalidState,
            format!("Batch {} has been recalled", batch.batch_id),
        ));
    }
    if batch.is_terminal() {
        return Err(Error::rejected(
            RejectCode::InvalidState,
            format!("Batch {} is {}", batch.batch_id, batch.status),
        ));
    }
    Ok(())
}

/// Reject a submit planned against an older revision of `batch`.
///
/// The optional argument at `index` carries the version the caller read when
/// it validated the transition. A mismatch means another writer committed in
/// between, so the caller's checks no longer hold.
fn expect_version(batch: &LedgerBatch, args: &[String], index: usize) -> Result<()> {
    if let Some(raw) = args.get(index) {
        let expected: u64 = raw
            .parse()
            .map_err(|e| Error::InvalidArgument(format!("expectedVersion: {e}")))?;
        if batch.version != expected {
            return Err(Error::Conflict(format!(
                "MVCC_READ_CONFLICT: batch {} is at version {}, submit was planned at {}",
                batch.batch_id, batch.version, expected
            )));
        }
    }
    Ok(())
}

fn data_hash(batch: &LedgerBatch) -> String {
    crypto::data_hash(&DataHashInput {
        batch_id: &batch.batch_id,
        farmer: &batch.farmer,
        crop_type: &batch.crop_type,
        variety: batch.variety.as_deref(),
        unit: &batch.unit,
        location: &batch.location,
        harvest_date: batch.harvest_date,
        certifications: &batch.certifications,
    })
}

fn value_of(quantity: Decimal, price: Option<Decimal>) -> Option<Decimal> {
    price.map(|p| quantity * p)
}

/// Execute a submit against a snapshot
pub(crate) fn endorse(
    state: &WorldState,
    tx_name: &str,
    args: &[String],
    nonce: u64,
) -> Result<Endorsement> {
    let ctx = TxContext::new(state, crypto::transaction_id(tx_name, args, nonce));
    match tx_name {
        tx::CREATE_BATCH => create_batch(ctx, args),
        tx::TRANSFER_BATCH => transfer_batch(ctx, args),
        tx::UPDATE_BATCH_STATUS => update_batch_status(ctx, args),
        tx::ADD_TRANSPORT_RECORD => add_transport_record(ctx, args),
        tx::ADD_DISTRIBUTION_RECORD => add_distribution_record(ctx, args),
        tx::SPLIT_BATCH => split_batch(ctx, args),
        tx::RECALL_BATCH => recall_batch(ctx, args),
        other => Err(Error::UnknownTransaction(other.to_string())),
    }
}

fn create_batch(mut ctx: TxContext<'_>, args: &[String]) -> Result<Endorsement> {
    let batch_id = BatchId::new(arg(args, 0, "batchId")?);
    let reg: BatchRegistration = json_arg(args, 1, "registration")?;

    if ctx.exists(&batch_id) {
        return Err(Error::rejected(
            RejectCode::Duplicate,
            format!("Batch {batch_id} already exists"),
        ));
    }

    let mut problems = Vec::new();
    if batch_id.as_str().trim().is_empty() {
        problems.push("batch id is required");
    }
    if reg.farmer.as_str().trim().is_empty() {
        problems.push("farmer is required");
    }
    if reg.crop_type.trim().is_empty() {
        problems.push("crop type is required");
    }
    if reg.quantity <= Decimal::ZERO {
        problems.push("quantity must be positive");
    }
    if reg.location.trim().is_empty() {
        problems.push("location is required");
    }
    if !problems.is_empty() {
        return Err(Error::rejected(
            RejectCode::Validation,
            format!("Validation failed: {}", problems.join(", ")),
        ));
    }

    let history = ctx.status_change(
        BatchStatus::Registered,
        None,
        &reg.farmer,
        reg.request_id.clone(),
        Some("Initial batch registration".to_string()),
    );
    let mut batch = LedgerBatch {
        batch_id,
        farmer: reg.farmer,
        crop_type: reg.crop_type,
        variety: reg.variety,
        quantity: reg.quantity,
        unit: reg.unit,
        location: reg.location,
        harvest_date: reg.harvest_date,
        quality_grade: reg.quality_grade,
        price_per_unit: reg.price_per_unit,
        total_batch_value: value_of(reg.quantity, reg.price_per_unit),
        currency: reg.currency,
        buyer_name: reg.buyer_name,
        final_customer: None,
        notes: reg.notes,
        certifications: reg.certifications,
        status: BatchStatus::Registered,
        current_owner: None,
        parent_batch_id: None,
        child_batch_ids: Vec::new(),
        split_reason: None,
        split_date: None,
        status_history: vec![history],
        processing_records: Vec::new(),
        transport_records: Vec::new(),
        distribution_records: Vec::new(),
        ownership_history: Vec::new(),
        recall: None,
        data_hash: String::new(),
        created_at: ctx.now,
        updated_at: ctx.now,
        version: 0,
    };
    batch.data_hash = data_hash(&batch);

    ctx.put(batch.clone());
    ctx.finish(tx::CREATE_BATCH, reg.request_id, &batch)
}

fn transfer_batch(mut ctx: TxContext<'_>, args: &[String]) -> Result<Endorsement> {
    let batch_id = BatchId::new(arg(args, 0, "batchId")?);
    let from = Custodian {
        actor_id: ActorId::new(arg(args, 1, "fromActorId")?),
        actor_role: ActorRole::from_str(arg(args, 2, "fromActorRole")?)?,
    };
    let to = Custodian {
        actor_id: ActorId::new(arg(args, 3, "toActorId")?),
        actor_role: ActorRole::from_str(arg(args, 4, "toActorRole")?)?,
    };
    let details: TransferDetails = json_arg(args, 5, "transferData")?;

    if !to.actor_role.is_custodial() {
        return Err(Error::rejected(
            RejectCode::Validation,
            format!("Invalid toActorRole {}", to.actor_role),
        ));
    }

    let mut batch = ctx.get(&batch_id)?;
    expect_version(&batch, args, 6)?;
    reject_terminal(&batch)?;

    let status_before = batch.status;
    let status_after = match to.actor_role {
        ActorRole::Distributor => BatchStatus::InDistribution,
        ActorRole::Retailer => BatchStatus::RetailReady,
        _ => status_before,
    };

    let record = LedgerTransfer {
        tx_id: ctx.tx_id.clone(),
        batch_id: batch_id.clone(),
        from,
        to: to.clone(),
        status_before,
        status_after,
        details: details.clone(),
        timestamp: ctx.now,
    };

    if status_after != status_before {
        let change = ctx.status_change(
            status_after,
            Some(status_before),
            &to.actor_id,
            details.request_id.clone(),
            details.notes.clone(),
        );
        batch.status_history.push(change);
    }
    batch.status = status_after;
    batch.current_owner = Some(to);
    batch.ownership_history.push(record.clone());

    ctx.put(batch);
    ctx.finish(tx::TRANSFER_BATCH, details.request_id, &record)
}

fn update_batch_status(mut ctx: TxContext<'_>, args: &[String]) -> Result<Endorsement> {
    let batch_id = BatchId::new(arg(args, 0, "batchId")?);
    let status = BatchStatus::from_str(arg(args, 1, "status")?)?;
    let updated_by = ActorId::new(arg(args, 2, "updatedBy")?);
    let update: StatusUpdate = json_arg(args, 3, "additionalData")?;

    if status == BatchStatus::Recalled {
        return Err(Error::rejected(
            RejectCode::Validation,
            "Use recallBatch to recall a batch",
        ));
    }

    let mut batch = ctx.get(&batch_id)?;
    expect_version(&batch, args, 4)?;
    reject_terminal(&batch)?;

    let previous = batch.status;
    let change = ctx.status_change(
        status,
        Some(previous),
        &updated_by,
        update.request_id.clone(),
        update.notes.clone(),
    );
    batch.status_history.push(change);
    batch.status = status;

    if let Some(processing) = update.processing.clone() {
        batch.processing_records.push(ProcessingRecord {
            processor_id: processing.processor_id,
            processing_type: processing.processing_type,
            input_quantity: processing.input_quantity,
            output_quantity: processing.output_quantity,
            facility: processing.facility,
            notes: update.notes.clone(),
            timestamp: ctx.now,
            tx_id: ctx.tx_id.clone(),
        });
    }
    if let Some(grade) = update.quality_grade.clone() {
        batch.quality_grade = Some(grade);
    }
    if status == BatchStatus::Sold {
        batch.final_customer = update.final_customer.clone();
        if let Some(price) = update.sale_price_per_unit {
            batch.price_per_unit = Some(price);
            batch.total_batch_value = value_of(batch.quantity, Some(price));
        }
    }

    ctx.put(batch.clone());
    ctx.finish(tx::UPDATE_BATCH_STATUS, update.request_id, &batch)
}

fn add_transport_record(mut ctx: TxContext<'_>, args: &[String]) -> Result<Endorsement> {
    let batch_id = BatchId::new(arg(args, 0, "batchId")?);
    let data: TransportData = json_arg(args, 1, "transportData")?;

    let mut batch = ctx.get(&batch_id)?;
    reject_terminal(&batch)?;

    let record = TransportRecord {
        carrier_id: data.carrier_id,
        origin: data.origin,
        destination: data.destination,
        vehicle: data.vehicle,
        temperature_celsius: data.temperature_celsius,
        notes: data.notes,
        timestamp: ctx.now,
        tx_id: ctx.tx_id.clone(),
    };
    batch.transport_records.push(record.clone());

    ctx.put(batch);
    ctx.finish(tx::ADD_TRANSPORT_RECORD, data.request_id, &record)
}

fn add_distribution_record(mut ctx: TxContext<'_>, args: &[String]) -> Result<Endorsement> {
    let batch_id = BatchId::new(arg(args, 0, "batchId")?);
    let data: DistributionData = json_arg(args, 1, "distributionData")?;

    let mut batch = ctx.get(&batch_id)?;
    reject_terminal(&batch)?;

    let record = DistributionRecord {
        distributor_id: data.distributor_id,
        warehouse_location: data.warehouse_location,
        storage_conditions: data.storage_conditions,
        quantity_received: data.quantity_received,
        notes: data.notes,
        timestamp: ctx.now,
        tx_id: ctx.tx_id.clone(),
    };
    batch.distribution_records.push(record.clone());

    ctx.put(batch);
    ctx.finish(tx::ADD_DISTRIBUTION_RECORD, data.request_id, &record)
}

fn split_batch(mut ctx: TxContext<'_>, args: &[String]) -> Result<Endorsement> {
    let parent_id = BatchId::new(arg(args, 0, "parentBatchId")?);
    let child_id = BatchId::new(arg(args, 1, "childBatchId")?);
    let quantity = Decimal::from_str(arg(args, 2, "splitQuantity")?).map_err(|e| {
        Error::rejected(RejectCode::Validation, format!("Invalid split quantity: {e}"))
    })?;
    let data: SplitData = json_arg(args, 3, "splitData")?;

    let mut parent = ctx.get(&parent_id)?;
    expect_version(&parent, args, 4)?;
    reject_terminal(&parent)?;

    if quantity <= Decimal::ZERO || quantity >= parent.quantity {
        return Err(Error::rejected(
            RejectCode::Validation,
            format!(
                "Split quantity {} must be greater than 0 and less than {} {}",
                quantity, parent.quantity, parent.unit
            ),
        ));
    }
    if ctx.exists(&child_id) {
        return Err(Error::rejected(
            RejectCode::Duplicate,
            format!("Batch {child_id} already exists"),
        ));
    }

    let price = data.price_per_unit.or(parent.price_per_unit);
    let note = format!(
        "Split from parent batch {}: {} {}",
        parent_id, quantity, parent.unit
    );
    let origin = ctx.status_change(
        parent.status,
        Some(parent.status),
        &data.split_by.actor_id,
        data.request_id.clone(),
        Some(note),
    );

    let mut child = LedgerBatch {
        batch_id: child_id.clone(),
        quantity,
        price_per_unit: price,
        total_batch_value: value_of(quantity, price),
        buyer_name: data.buyer_name.clone().or_else(|| parent.buyer_name.clone()),
        notes: data.notes.clone().or_else(|| parent.notes.clone()),
        parent_batch_id: Some(parent_id.clone()),
        child_batch_ids: Vec::new(),
        split_reason: Some(data.reason.clone()),
        split_date: Some(ctx.now),
        status_history: vec![origin],
        ownership_history: Vec::new(),
        recall: None,
        created_at: ctx.now,
        version: 0,
        ..parent.clone()
    };
    child.data_hash = data_hash(&child);

    parent.quantity -= quantity;
    parent.total_batch_value = value_of(parent.quantity, parent.price_per_unit);
    parent.child_batch_ids.push(child_id);

    ctx.put(parent.clone());
    ctx.put(child.clone());

    let record = SplitRecord {
        tx_id: ctx.tx_id.clone(),
        parent,
        child,
    };
    ctx.finish(tx::SPLIT_BATCH, data.request_id, &record)
}

fn recall_batch(mut ctx: TxContext<'_>, args: &[String]) -> Result<Endorsement> {
    let batch_id = BatchId::new(arg(args, 0, "batchId")?);
    let data: RecallData = json_arg(args, 1, "recallData")?;

    if data.reason.trim().is_empty() {
        return Err(Error::rejected(
            RejectCode::Validation,
            "Recall reason is required",
        ));
    }

    let mut batch = ctx.get(&batch_id)?;
    expect_version(&batch, args, 2)?;
    if batch.status == BatchStatus::Recalled {
        return Err(Error::rejected(
            RejectCode::AlreadyRecalled,
            format!("Batch {batch_id} is already recalled"),
        ));
    }

    let previous = batch.status;
    let change = ctx.status_change(
        BatchStatus::Recalled,
        Some(previous),
        &data.recalled_by.actor_id,
        data.request_id.clone(),
        Some(data.reason.clone()),
    );
    batch.status_history.push(change);
    batch.status = BatchStatus::Recalled;
    batch.recall = Some(RecallInfo {
        reason: data.reason,
        severity: data.severity,
        notes: data.notes,
        recalled_by: data.recalled_by,
        previous_status: previous,
        cascade_from: data.cascade_from,
        recalled_at: ctx.now,
        tx_id: ctx.tx_id.clone(),
    });

    ctx.put(batch.clone());
    ctx.finish(tx::RECALL_BATCH, data.request_id, &batch)
}

/// Execute a read-only query
pub(crate) fn query(state: &WorldState, tx_name: &str, args: &[String]) -> Result<Vec<u8>> {
    let get = |index: usize| get_batch(state, args, index);

    let bytes = match tx_name {
        tx::GET_BATCH => serde_json::to_vec(get(0)?)?,
        tx::GET_OWNERSHIP_HISTORY => serde_json::to_vec(&get(0)?.ownership_history)?,
        tx::GET_TRANSPORT_HISTORY => serde_json::to_vec(&get(0)?.transport_records)?,
        tx::GET_BATCH_HISTORY => serde_json::to_vec(&get(0)?.status_history)?,
        tx::GET_BATCH_LINEAGE => {
            let batch = get(0)?;
            serde_json::to_vec(&BatchLineage {
                batch_id: batch.batch_id.clone(),
                parent_batch_id: batch.parent_batch_id.clone(),
                child_batch_ids: batch.child_batch_ids.clone(),
            })?
        }
        tx::VERIFY_BATCH_INTEGRITY => {
            let batch = get(0)?;
            let database_hash = arg(args, 1, "databaseHash")?.to_string();
            let hash_match = batch.data_hash == database_hash;
            serde_json::to_vec(&IntegrityReport {
                batch_id: batch.batch_id.clone(),
                stored_hash: batch.data_hash.clone(),
                database_hash,
                hash_match,
                integrity_status: if hash_match {
                    IntegrityStatus::Valid
                } else {
                    IntegrityStatus::Mismatch
                },
                verified_at: Utc::now(),
            })?
        }
        tx::GET_AVAILABLE_BATCHES_FOR_DISTRIBUTOR => {
            let mut batches: Vec<&LedgerBatch> = state
                .batches()
                .filter(|b| b.status == BatchStatus::Processed)
                .collect();
            batches.sort_by(|a, b| a.batch_id.cmp(&b.batch_id));
            serde_json::to_vec(&batches)?
        }
        tx::GET_BATCHES_BY_DISTRIBUTOR => {
            let distributor = ActorId::new(arg(args, 0, "distributorId")?);
            let mut batches: Vec<&LedgerBatch> = state
                .batches()
                .filter(|b| handled_by_distributor(b, &distributor))
                .collect();
            batches.sort_by(|a, b| a.batch_id.cmp(&b.batch_id));
            serde_json::to_vec(&batches)?
        }
        tx::GET_RECEIPT => {
            let request_id = arg(args, 0, "requestId")?;
            let receipt = state
                .receipt(request_id)
                .ok_or_else(|| Error::NotFound(format!("Receipt {request_id} does not exist")))?;
            serde_json::to_vec(receipt)?
        }
        other => return Err(Error::UnknownTransaction(other.to_string())),
    };
    Ok(bytes)
}

fn get_batch<'a>(state: &'a WorldState, args: &[String], index: usize) -> Result<&'a LedgerBatch> {
    let id = BatchId::new(arg(args, index, "batchId")?);
    state.batch(&id).ok_or_else(|| batch_missing(&id))
}

fn handled_by_distributor(batch: &LedgerBatch, distributor: &ActorId) -> bool {
    let holds = batch.current_owner.as_ref().is_some_and(|o| {
        o.actor_role == ActorRole::Distributor && &o.actor_id == distributor
    });
    holds
        || batch
            .ownership_history
            .iter()
            .any(|t| t.to.actor_role == ActorRole::Distributor && &t.to.actor_id == distributor)
        || batch
            .distribution_records
            .iter()
            .any(|r| &r.distributor_id == distributor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(quantity: i64) -> String {
        serde_json::to_string(&BatchRegistration {
            farmer: ActorId::new("farmer-1"),
            crop_type: "Durian".into(),
            variety: Some("Musang King".into()),
            quantity: Decimal::new(quantity, 0),
            unit: "kg".into(),
            location: "Raub".into(),
            harvest_date: None,
            quality_grade: None,
            price_per_unit: Some(Decimal::new(45, 0)),
            currency: Currency::MYR,
            buyer_name: None,
            notes: None,
            certifications: Default::default(),
            request_id: None,
        })
        .unwrap()
    }

    fn commit(state: &mut WorldState, e: Endorsement) {
        state.apply(e.writes, None);
    }

    fn seeded(quantity: i64) -> WorldState {
        let mut state = WorldState::new();
        let e = endorse(
            &state,
            tx::CREATE_BATCH,
            &["BAT-001".into(), registration(quantity)],
            0,
        )
        .unwrap();
        commit(&mut state, e);
        state
    }

    fn split_args(child: &str, quantity: &str) -> Vec<String> {
        let data = SplitData {
            reason: "Export order".into(),
            buyer_name: None,
            price_per_unit: None,
            split_by: Custodian::new("farmer-1", ActorRole::Farmer),
            notes: None,
            request_id: None,
        };
        vec![
            "BAT-001".into(),
            child.into(),
            quantity.into(),
            serde_json::to_string(&data).unwrap(),
        ]
    }

    #[test]
    fn test_create_batch_registers_and_hashes() {
        let state = seeded(100);
        let batch = state.batch(&BatchId::new("BAT-001")).unwrap();
        assert_eq!(batch.status, BatchStatus::Registered);
        assert_eq!(batch.status_history.len(), 1);
        assert_eq!(batch.data_hash.len(), 64);
        assert_eq!(batch.total_batch_value, Some(Decimal::new(4500, 0)));
    }

    #[test]
    fn test_create_duplicate_rejected() {
        let state = seeded(100);
        let err = endorse(
            &state,
            tx::CREATE_BATCH,
            &["BAT-001".into(), registration(5)],
            1,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Rejected {
                code: RejectCode::Duplicate,
                ..
            }
        ));
    }

    #[test]
    fn test_split_moves_quantity_and_links_child() {
        let mut state = seeded(100);
        let e = endorse(&state, tx::SPLIT_BATCH, &split_args("BAT-001-A", "30"), 1).unwrap();
        assert_eq!(e.read_set.len(), 2);
        commit(&mut state, e);

        let parent = state.batch(&BatchId::new("BAT-001")).unwrap();
        let child = state.batch(&BatchId::new("BAT-001-A")).unwrap();
        assert_eq!(parent.quantity, Decimal::new(70, 0));
        assert_eq!(child.quantity, Decimal::new(30, 0));
        assert_eq!(child.parent_batch_id, Some(BatchId::new("BAT-001")));
        assert_eq!(parent.child_batch_ids, vec![BatchId::new("BAT-001-A")]);
        assert_eq!(child.total_batch_value, Some(Decimal::new(1350, 0)));
        assert_ne!(child.data_hash, parent.data_hash);
    }

    #[test]
    fn test_split_rejects_whole_quantity() {
        let state = seeded(100);
        let err = endorse(&state, tx::SPLIT_BATCH, &split_args("BAT-001-A", "100"), 1)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Rejected {
                code: RejectCode::Validation,
                ..
            }
        ));
    }

    #[test]
    fn test_transfer_to_distributor_moves_status() {
        let mut state = seeded(100);
        let args = vec![
            "BAT-001".to_string(),
            "farmer-1".into(),
            "FARMER".into(),
            "dist-1".into(),
            "DISTRIBUTOR".into(),
            "{}".into(),
        ];
        let e = endorse(&state, tx::TRANSFER_BATCH, &args, 1).unwrap();
        commit(&mut state, e);
        let batch = state.batch(&BatchId::new("BAT-001")).unwrap();
        assert_eq!(batch.status, BatchStatus::InDistribution);
        assert_eq!(
            batch.current_owner,
            Some(Custodian::new("dist-1", ActorRole::Distributor))
        );
        assert_eq!(batch.ownership_history.len(), 1);
    }

    #[test]
    fn test_transfer_planned_at_stale_version_conflicts() {
        let mut state = seeded(100);
        let id = BatchId::new("BAT-001");
        assert_eq!(state.batch(&id).unwrap().version, 1);
        let to = |actor: &str| {
            vec![
                "BAT-001".to_string(),
                "farmer-1".into(),
                "FARMER".into(),
                actor.into(),
                "DISTRIBUTOR".into(),
                "{}".into(),
                "1".into(),
            ]
        };

        let e = endorse(&state, tx::TRANSFER_BATCH, &to("dist-2"), 1).unwrap();
        commit(&mut state, e);
        assert_eq!(state.batch(&id).unwrap().version, 2);

        // Second hand-over was validated against version 1
        let err = endorse(&state, tx::TRANSFER_BATCH, &to("dist-1"), 2).unwrap_err();
        assert!(err.is_conflict());
        let batch = state.batch(&id).unwrap();
        assert_eq!(batch.ownership_history.len(), 1);
        assert_eq!(
            batch.current_owner,
            Some(Custodian::new("dist-2", ActorRole::Distributor))
        );
    }

    #[test]
    fn test_split_planned_at_stale_version_conflicts() {
        let mut state = seeded(100);
        let mut args = split_args("BAT-001-A", "30");
        args.push("1".into());
        let e = endorse(&state, tx::SPLIT_BATCH, &args, 1).unwrap();
        commit(&mut state, e);

        let mut stale = split_args("BAT-001-A", "20");
        stale.push("1".into());
        let err = endorse(&state, tx::SPLIT_BATCH, &stale, 2).unwrap_err();
        assert!(err.is_conflict());

        let mut fresh = split_args("BAT-001-B", "20");
        fresh.push("2".into());
        assert!(endorse(&state, tx::SPLIT_BATCH, &fresh, 3).is_ok());
    }

    #[test]
    fn test_transfer_to_admin_rejected() {
        let state = seeded(100);
        let args = vec![
            "BAT-001".to_string(),
            "farmer-1".into(),
            "FARMER".into(),
            "admin-1".into(),
            "ADMIN".into(),
            "{}".into(),
        ];
        assert!(endorse(&state, tx::TRANSFER_BATCH, &args, 1).is_err());
    }

    #[test]
    fn test_recall_twice_rejected() {
        let mut state = seeded(100);
        let data = serde_json::to_string(&RecallData {
            reason: "Aflatoxin".into(),
            severity: RecallSeverity::High,
            notes: None,
            recalled_by: Custodian::new("reg-1", ActorRole::Regulator),
            cascade_from: None,
            request_id: None,
        })
        .unwrap();
        let args = vec!["BAT-001".to_string(), data];
        let e = endorse(&state, tx::RECALL_BATCH, &args, 1).unwrap();
        commit(&mut state, e);

        let err = endorse(&state, tx::RECALL_BATCH, &args, 2).unwrap_err();
        assert!(matches!(
            err,
            Error::Rejected {
                code: RejectCode::AlreadyRecalled,
                ..
            }
        ));
    }

    #[test]
    fn test_query_missing_batch() {
        let state = WorldState::new();
        let err = query(&state, tx::GET_BATCH, &["BAT-404".into()]).unwrap_err();
        assert_eq!(err.to_string(), "Batch BAT-404 does not exist");
    }

    #[test]
    fn test_verify_integrity_mismatch() {
        let state = seeded(100);
        let bytes = query(
            &state,
            tx::VERIFY_BATCH_INTEGRITY,
            &["BAT-001".into(), "deadbeef".into()],
        )
        .unwrap();
        let report: IntegrityReport = serde_json::from_slice(&bytes).unwrap();
        assert!(!report.hash_match);
        assert_eq!(report.integrity_status, IntegrityStatus::Mismatch);
    }
}
