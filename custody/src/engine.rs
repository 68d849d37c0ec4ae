//! Custody engine
//!
//! Every write follows the same dual-write rule: the ledger commits first and
//! decides the outcome; the mirror is written afterwards on a best-effort
//! basis. A mirror failure never undoes or fails a committed ledger write.
//! It is logged, counted and queued as a [`MirrorWarning`] for
//! reconciliation.
//!
//! Ledger writes run inside the conflict retry wrapper. Each attempt takes a
//! fresh lease, re-reads the batch, re-validates against what it read and
//! submits under the request's idempotency key. From the second attempt on,
//! the receipt for that key is checked first so a write whose earlier
//! outcome was unknown is never applied twice.

use crate::config::Config;
use crate::custodian::{recorded_or_farmer, resolve_custodian};
use crate::metrics::CustodyMetrics;
use crate::mirror::{
    ActivityAction, ActivityEntry, MirrorBatch, MirrorError, RelationalMirror, StatusPatch,
    TransferRecord,
};
use crate::retry::RetryStrategy;
use crate::transitions::Transition;
use crate::types::{
    Actor, CompleteRequest, MirrorOutcome, MirrorWarning, ProcessRequest, RegisterRequest,
    RegistrationResult, RetailReceiveRequest, RetailTransferRequest, ReceiveRequest, SaleRequest,
    StatusTransitionResult, TransferMetadata, TransferRequest, TransferResult,
};
use crate::{Error, Result};
use chrono::Utc;
use ledger_gateway::types::{BatchRegistration, ProcessingData, StatusUpdate};
use ledger_gateway::{
    tx, ActorId, ActorRole, BatchId, Custodian, GatewayLease, GatewayPool, LedgerBatch,
    LedgerTransfer,
};
use parking_lot::Mutex;
use rand::Rng;
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Custody state machine over a ledger gateway and a relational mirror
pub struct CustodyEngine {
    pub(crate) pool: GatewayPool,
    pub(crate) mirror: Arc<dyn RelationalMirror>,
    pub(crate) retry: RetryStrategy,
    pub(crate) metrics: CustodyMetrics,
    pub(crate) config: Config,
    warnings: Mutex<VecDeque<MirrorWarning>>,
}

/// Party recorded as releasing custody in a transfer
enum Releasing<'a> {
    /// The calling actor, recorded verbatim
    Caller(Custodian),
    /// Whoever holds the batch, with an optional processor hint
    Holder(Option<&'a ActorId>),
}

impl CustodyEngine {
    /// Create engine over an injected pool and mirror
    pub fn new(config: Config, pool: GatewayPool, mirror: Arc<dyn RelationalMirror>) -> Result<Self> {
        config.validate()?;
        let metrics = CustodyMetrics::new()
            .map_err(|e| Error::Config(format!("Failed to register metrics: {}", e)))?;
        let retry = RetryStrategy::new(config.retry.clone()).with_metrics(metrics.clone());

        info!(
            service = %config.service_name,
            version = %config.service_version,
            max_attempts = config.retry.max_attempts,
            "Custody engine ready"
        );

        Ok(Self {
            pool,
            mirror,
            retry,
            metrics,
            config,
            warnings: Mutex::new(VecDeque::new()),
        })
    }

    /// Engine configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Engine metrics
    pub fn metrics(&self) -> &CustodyMetrics {
        &self.metrics
    }

    /// Ledger connection pool
    pub fn pool(&self) -> &GatewayPool {
        &self.pool
    }

    /// Mirror writes still waiting for reconciliation, oldest first
    pub fn pending_mirror_warnings(&self) -> Vec<MirrorWarning> {
        self.warnings.lock().iter().cloned().collect()
    }

    /// Take every queued mirror warning
    pub fn drain_mirror_warnings(&self) -> Vec<MirrorWarning> {
        self.warnings.lock().drain(..).collect()
    }

    /// Register a new batch
    pub async fn register(&self, request: RegisterRequest) -> Result<RegistrationResult> {
        request.validate()?;
        if !matches!(request.farmer.role, ActorRole::Farmer | ActorRole::Admin) {
            return Err(Error::Forbidden(format!(
                "register requires role FARMER; {} acts as {}",
                request.farmer.id, request.farmer.role
            )));
        }

        let batch_id = request.batch_id.clone().unwrap_or_else(generate_batch_id);
        let request_id = new_request_id();
        let registration = BatchRegistration {
            farmer: request.farmer.id.clone(),
            crop_type: request.crop_type,
            variety: request.variety,
            quantity: request.quantity,
            unit: request.unit,
            location: request.location,
            harvest_date: request.harvest_date,
            quality_grade: request.quality_grade,
            price_per_unit: request.price_per_unit,
            currency: request.currency,
            buyer_name: request.buyer_name,
            notes: request.notes,
            certifications: request.certifications,
            request_id: Some(request_id.clone()),
        };
        let args = vec![batch_id.to_string(), serde_json::to_string(&registration)?];

        let batch: LedgerBatch = self
            .submit_new("register", tx::CREATE_BATCH, &args, &request_id)
            .await?;
        self.metrics.committed("register");
        info!(
            batch_id = %batch.batch_id,
            farmer = %batch.farmer,
            quantity = %batch.quantity,
            "Batch registered"
        );

        let tx_id = last_tx_id(&batch);
        let outcome = match self.mirror.insert_batch(MirrorBatch::from_ledger(&batch)).await {
            Ok(()) => MirrorOutcome::Written,
            Err(e) => MirrorOutcome::Failed(self.mirror_failed(&batch.batch_id, "register", &tx_id, e)),
        };
        let activity = self
            .log_activity(
                &request.farmer,
                ActivityAction::RegisterBatch,
                &batch.batch_id,
                Some(&tx_id),
                serde_json::json!({
                    "cropType": batch.crop_type,
                    "quantity": batch.quantity,
                    "unit": batch.unit,
                }),
            )
            .await;

        Ok(RegistrationResult {
            batch,
            mirror: combine(outcome, activity),
        })
    }

    /// Generic custody transfer.
    ///
    /// The caller is recorded as the releasing party. The ledger moves the
    /// status to `IN_DISTRIBUTION` or `RETAIL_READY` when custody goes to a
    /// distributor or retailer and keeps it otherwise. Terminal batches are
    /// rejected; no workflow edge is enforced.
    pub async fn transfer(&self, request: TransferRequest) -> Result<TransferResult> {
        request.validate()?;
        if !(request.from.role.is_custodial() || request.from.role == ActorRole::Admin) {
            return Err(Error::Forbidden(format!(
                "{} cannot transfer custody",
                request.from.role
            )));
        }

        let to = Custodian {
            actor_id: request.to_actor_id.clone(),
            actor_role: request.to_actor_role,
        };
        self.transfer_custody(
            "transfer",
            ActivityAction::TransferBatch,
            &request.from,
            &request.batch_id,
            Releasing::Caller(request.from.custodian()),
            to,
            None,
            request.metadata,
        )
        .await
    }

    /// Distributor takes a `PROCESSED` batch in, moving it to `IN_DISTRIBUTION`.
    ///
    /// The releasing party is the batch's effective custodian, resolved with
    /// the caller's processor hint.
    pub async fn receive(&self, request: ReceiveRequest) -> Result<TransferResult> {
        request.validate()?;
        Transition::Receive.authorize(&request.distributor)?;

        let to = Custodian {
            actor_id: request.distributor.id.clone(),
            actor_role: ActorRole::Distributor,
        };
        self.transfer_custody(
            Transition::Receive.name(),
            ActivityAction::ReceiveBatch,
            &request.distributor,
            &request.batch_id,
            Releasing::Holder(request.from_processor_id.as_ref()),
            to,
            Some(Transition::Receive),
            request
                .metadata
                .with_default_notes("Batch received by distributor"),
        )
        .await
    }

    /// Distributor hands an `IN_DISTRIBUTION` batch to a retailer
    pub async fn transfer_to_retailer(
        &self,
        request: RetailTransferRequest,
    ) -> Result<TransferResult> {
        request.validate()?;
        Transition::TransferToRetailer.authorize(&request.distributor)?;

        let to = Custodian {
            actor_id: request.retailer_id.clone(),
            actor_role: ActorRole::Retailer,
        };
        let releasing = if request.distributor.role == ActorRole::Distributor {
            Releasing::Caller(request.distributor.custodian())
        } else {
            Releasing::Holder(None)
        };
        self.transfer_custody(
            Transition::TransferToRetailer.name(),
            ActivityAction::TransferToRetailer,
            &request.distributor,
            &request.batch_id,
            releasing,
            to,
            Some(Transition::TransferToRetailer),
            request.metadata.with_default_notes("Transfer to retailer"),
        )
        .await
    }

    /// Processor takes a `REGISTERED` batch in, moving it to `PROCESSING`
    pub async fn process(&self, request: ProcessRequest) -> Result<StatusTransitionResult> {
        request.validate()?;
        let edge = Transition::Process;
        edge.authorize(&request.processor)?;

        let processor = Custodian {
            actor_id: request.processor.id.clone(),
            actor_role: ActorRole::Processor,
        };
        let update = StatusUpdate {
            notes: request.notes.clone(),
            processing: Some(ProcessingData {
                processor_id: request.processor.id.clone(),
                processing_type: request
                    .processing_type
                    .clone()
                    .unwrap_or_else(|| "initial_processing".to_string()),
                input_quantity: request.input_quantity,
                output_quantity: request.output_quantity,
                facility: request.facility.clone(),
            }),
            ..Default::default()
        };
        self.advance(
            edge,
            ActivityAction::ProcessBatch,
            &request.processor,
            &request.batch_id,
            update,
            Some(processor),
        )
        .await
    }

    /// Processor finishes a `PROCESSING` batch, moving it to `PROCESSED`
    pub async fn complete(&self, request: CompleteRequest) -> Result<StatusTransitionResult> {
        request.validate()?;
        let edge = Transition::Complete;
        edge.authorize(&request.processor)?;

        let update = StatusUpdate {
            notes: request.notes.clone(),
            quality_grade: request.quality_grade.clone(),
            ..Default::default()
        };
        self.advance(
            edge,
            ActivityAction::CompleteProcessing,
            &request.processor,
            &request.batch_id,
            update,
            None,
        )
        .await
    }

    /// Retailer shelves a `RETAIL_READY` batch, moving it to `IN_RETAIL`
    pub async fn receive_at_retail(
        &self,
        request: RetailReceiveRequest,
    ) -> Result<StatusTransitionResult> {
        request.validate()?;
        let edge = Transition::ReceiveAtRetail;
        edge.authorize(&request.retailer)?;

        let update = StatusUpdate {
            notes: Some(
                request
                    .notes
                    .clone()
                    .unwrap_or_else(|| "Batch received at retail".to_string()),
            ),
            ..Default::default()
        };
        self.advance(
            edge,
            ActivityAction::ReceiveAtRetail,
            &request.retailer,
            &request.batch_id,
            update,
            None,
        )
        .await
    }

    /// Retailer sells an `IN_RETAIL` batch, moving it to `SOLD`
    pub async fn mark_sold(&self, request: SaleRequest) -> Result<StatusTransitionResult> {
        request.validate()?;
        let edge = Transition::MarkSold;
        edge.authorize(&request.retailer)?;

        let update = StatusUpdate {
            notes: request.notes.clone(),
            final_customer: request.final_customer.clone(),
            sale_price_per_unit: request.sale_price_per_unit,
            ..Default::default()
        };
        self.advance(
            edge,
            ActivityAction::MarkSold,
            &request.retailer,
            &request.batch_id,
            update,
            None,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn transfer_custody(
        &self,
        operation: &'static str,
        action: ActivityAction,
        actor: &Actor,
        batch_id: &BatchId,
        releasing: Releasing<'_>,
        to: Custodian,
        edge: Option<Transition>,
        metadata: TransferMetadata,
    ) -> Result<TransferResult> {
        let request_id = new_request_id();
        let details = serde_json::to_string(&metadata.into_details(&request_id))?;

        let record: LedgerTransfer = self
            .submit_planned(operation, batch_id, &request_id, |batch| {
                match edge {
                    Some(edge) => edge.check_status(batch)?,
                    None => reject_terminal(batch)?,
                }
                let from = match &releasing {
                    Releasing::Caller(caller) => {
                        if let Some(edge) = edge {
                            require_holder(edge.name(), batch, caller)?;
                        }
                        caller.clone()
                    }
                    Releasing::Holder(hint) => resolve_custodian(batch, *hint).custodian,
                };
                Ok((
                    tx::TRANSFER_BATCH,
                    vec![
                        batch_id.to_string(),
                        from.actor_id.to_string(),
                        from.actor_role.to_string(),
                        to.actor_id.to_string(),
                        to.actor_role.to_string(),
                        details.clone(),
                        batch.version.to_string(),
                    ],
                ))
            })
            .await?;

        self.metrics.committed(operation);
        info!(
            operation,
            batch_id = %batch_id,
            from = %record.from,
            to = %record.to,
            status_before = %record.status_before,
            status_after = %record.status_after,
            tx_id = %record.tx_id,
            "Custody transferred"
        );

        let patch = StatusPatch::status(record.status_after).with_owner(record.to.clone());
        let (mirror_record, outcome) = self
            .mirror_custody(operation, TransferRecord::ownership(&record), patch)
            .await;
        let activity = self
            .log_activity(
                actor,
                action,
                batch_id,
                Some(&record.tx_id),
                serde_json::json!({
                    "from": record.from,
                    "to": record.to,
                    "statusBefore": record.status_before,
                    "statusAfter": record.status_after,
                }),
            )
            .await;

        Ok(TransferResult {
            ledger_record: record,
            mirror_record,
            mirror: combine(outcome, activity),
        })
    }

    async fn advance(
        &self,
        edge: Transition,
        action: ActivityAction,
        actor: &Actor,
        batch_id: &BatchId,
        update: StatusUpdate,
        takes_custody: Option<Custodian>,
    ) -> Result<StatusTransitionResult> {
        let request_id = new_request_id();
        let grade = update.quality_grade.clone();
        let notes = update.notes.clone();
        let payload = serde_json::to_string(&StatusUpdate {
            request_id: Some(request_id.clone()),
            ..update
        })?;

        let batch: LedgerBatch = self
            .submit_planned(edge.name(), batch_id, &request_id, |batch| {
                edge.check_status(batch)?;
                Ok((
                    tx::UPDATE_BATCH_STATUS,
                    vec![
                        batch_id.to_string(),
                        edge.to_status().to_string(),
                        actor.id.to_string(),
                        payload.clone(),
                        batch.version.to_string(),
                    ],
                ))
            })
            .await?;

        let tx_id = last_tx_id(&batch);
        self.metrics.committed(edge.name());
        info!(
            operation = edge.name(),
            batch_id = %batch_id,
            actor = %actor.id,
            status_before = %edge.from_status(),
            status_after = %batch.status,
            tx_id = %tx_id,
            "Batch status advanced"
        );

        let mut patch = StatusPatch::status(batch.status);
        patch.quality_grade = grade;
        let (mirror_record, outcome) = match takes_custody {
            Some(holder) => {
                let record = TransferRecord::handover(
                    batch_id,
                    recorded_or_farmer(&batch),
                    holder.clone(),
                    edge.from_status(),
                    batch.status,
                    &tx_id,
                    notes,
                );
                self.mirror_custody(edge.name(), record, patch.with_owner(holder))
                    .await
            }
            None => (
                None,
                self.mirror_status(edge.name(), batch_id, &tx_id, patch).await,
            ),
        };
        let activity = self
            .log_activity(
                actor,
                action,
                batch_id,
                Some(&tx_id),
                serde_json::json!({
                    "statusBefore": edge.from_status(),
                    "statusAfter": batch.status,
                }),
            )
            .await;

        Ok(StatusTransitionResult {
            status_before: edge.from_status(),
            status_after: batch.status,
            ledger_tx_id: tx_id,
            batch,
            mirror_record,
            mirror: combine(outcome, activity),
        })
    }

    /// Submit a write planned against a fresh read of `batch_id`, retrying
    /// transient failures.
    ///
    /// `plan` validates the batch it is given and returns the transaction
    /// to submit; its errors are permanent and end the call. Plans pass the
    /// batch version they validated, so a write that lands in between turns
    /// the submit into a conflict and the next attempt plans again.
    pub(crate) async fn submit_planned<T, F>(
        &self,
        operation: &str,
        batch_id: &BatchId,
        request_id: &str,
        plan: F,
    ) -> Result<T>
    where
        T: DeserializeOwned + Send,
        F: Fn(&LedgerBatch) -> Result<(&'static str, Vec<String>)> + Sync,
    {
        let plan = &plan;
        let started = Instant::now();
        let result = self
            .retry
            .execute(operation, move |attempt| async move {
                let lease = self.pool.acquire().await?;
                if let Some(replayed) = replay(&lease, operation, request_id, attempt).await? {
                    return Ok(replayed);
                }
                let batch = fetch_batch(&lease, batch_id).await?;
                let (tx_name, args) = plan(&batch)?;
                debug!(operation, batch_id = %batch_id, attempt, tx_name, "Submitting");
                let bytes = lease.submit_idempotent(tx_name, &args, request_id).await?;
                Ok(serde_json::from_slice(&bytes)?)
            })
            .await;
        self.metrics
            .submit_duration
            .observe(started.elapsed().as_secs_f64());
        result
    }

    /// Submit a write that reads nothing first, retrying transient failures
    pub(crate) async fn submit_new<T>(
        &self,
        operation: &str,
        tx_name: &str,
        args: &[String],
        request_id: &str,
    ) -> Result<T>
    where
        T: DeserializeOwned + Send,
    {
        let started = Instant::now();
        let result = self
            .retry
            .execute(operation, move |attempt| async move {
                let lease = self.pool.acquire().await?;
                if let Some(replayed) = replay(&lease, operation, request_id, attempt).await? {
                    return Ok(replayed);
                }
                let bytes = lease.submit_idempotent(tx_name, args, request_id).await?;
                Ok(serde_json::from_slice(&bytes)?)
            })
            .await;
        self.metrics
            .submit_duration
            .observe(started.elapsed().as_secs_f64());
        result
    }

    /// Read-only ledger query
    pub(crate) async fn evaluate<T: DeserializeOwned>(
        &self,
        tx_name: &str,
        args: &[String],
    ) -> Result<T> {
        let lease = self.pool.acquire().await?;
        Ok(lease.evaluate_json(tx_name, args).await?)
    }

    async fn mirror_custody(
        &self,
        operation: &str,
        record: TransferRecord,
        patch: StatusPatch,
    ) -> (Option<TransferRecord>, MirrorOutcome) {
        let batch_id = record.batch_id.clone();
        let tx_id = record.blockchain_tx_id.clone();
        if let Err(e) = self.mirror.insert_transfer(record.clone()).await {
            let warning = self.mirror_failed(&batch_id, operation, &tx_id, e);
            return (None, MirrorOutcome::Failed(warning));
        }
        let outcome = self.mirror_status(operation, &batch_id, &tx_id, patch).await;
        (Some(record), outcome)
    }

    pub(crate) async fn mirror_status(
        &self,
        operation: &str,
        batch_id: &BatchId,
        tx_id: &str,
        patch: StatusPatch,
    ) -> MirrorOutcome {
        match self.mirror.update_batch_status(batch_id, patch).await {
            Ok(true) => MirrorOutcome::Written,
            Ok(false) => {
                debug!(operation, batch_id = %batch_id, "No mirror row, status not mirrored");
                MirrorOutcome::RowMissing
            }
            Err(e) => MirrorOutcome::Failed(self.mirror_failed(batch_id, operation, tx_id, e)),
        }
    }

    /// Record a mirror write lost after a ledger commit
    pub(crate) fn mirror_failed(
        &self,
        batch_id: &BatchId,
        operation: &str,
        ledger_tx_id: &str,
        error: MirrorError,
    ) -> MirrorWarning {
        let warning = MirrorWarning {
            batch_id: batch_id.clone(),
            operation: operation.to_string(),
            ledger_tx_id: ledger_tx_id.to_string(),
            error: error.to_string(),
            occurred_at: Utc::now(),
        };
        warn!(
            batch_id = %batch_id,
            operation,
            tx_id = ledger_tx_id,
            error = %error,
            "Mirror write failed after ledger commit, mirror is stale until reconciled"
        );
        self.metrics.mirror_inconsistencies_total.inc();

        let limit = self.config.mirror.max_pending_warnings;
        if self.config.mirror.queue_warnings && limit > 0 {
            let mut queue = self.warnings.lock();
            while queue.len() >= limit {
                queue.pop_front();
            }
            queue.push_back(warning.clone());
        }
        warning
    }

    /// Drop queued warnings for a batch that has been reconciled
    pub(crate) fn clear_warnings_for(&self, batch_id: &BatchId) -> usize {
        let mut queue = self.warnings.lock();
        let before = queue.len();
        queue.retain(|w| &w.batch_id != batch_id);
        before - queue.len()
    }

    pub(crate) async fn log_activity(
        &self,
        actor: &Actor,
        action: ActivityAction,
        batch_id: &BatchId,
        tx_id: Option<&str>,
        details: serde_json::Value,
    ) -> std::result::Result<(), MirrorWarning> {
        let entry = ActivityEntry {
            id: Uuid::new_v4(),
            actor_id: actor.id.clone(),
            actor_role: actor.role,
            action,
            batch_id: batch_id.clone(),
            blockchain_tx_id: tx_id.map(str::to_string),
            details,
            created_at: Utc::now(),
        };
        self.mirror.log_activity(entry).await.map_err(|e| {
            self.mirror_failed(batch_id, "log_activity", tx_id.unwrap_or_default(), e)
        })
    }
}

impl fmt::Debug for CustodyEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustodyEngine")
            .field("service", &self.config.service_name)
            .field("pool", &self.pool)
            .field("pending_warnings", &self.warnings.lock().len())
            .finish_non_exhaustive()
    }
}

/// Fold an activity-log result into the mirror outcome; the first failure wins
pub(crate) fn combine(
    outcome: MirrorOutcome,
    activity: std::result::Result<(), MirrorWarning>,
) -> MirrorOutcome {
    match (outcome, activity) {
        (MirrorOutcome::Failed(w), _) => MirrorOutcome::Failed(w),
        (_, Err(w)) => MirrorOutcome::Failed(w),
        (outcome, Ok(())) => outcome,
    }
}

/// Response committed by an earlier attempt of the same request, if any
async fn replay<T: DeserializeOwned>(
    lease: &GatewayLease,
    operation: &str,
    request_id: &str,
    attempt: u32,
) -> Result<Option<T>> {
    if attempt <= 1 {
        return Ok(None);
    }
    match lease.receipt(request_id).await? {
        Some(receipt) => {
            info!(
                operation,
                request_id,
                tx_id = %receipt.tx_id,
                "Earlier attempt committed, reusing its receipt"
            );
            Ok(Some(serde_json::from_value(receipt.response)?))
        }
        None => Ok(None),
    }
}

pub(crate) async fn fetch_batch(lease: &GatewayLease, batch_id: &BatchId) -> Result<LedgerBatch> {
    Ok(lease
        .evaluate_json(tx::GET_BATCH, &[batch_id.to_string()])
        .await?)
}

/// Reject writes to `SOLD` and `RECALLED` batches
pub(crate) fn reject_terminal(batch: &LedgerBatch) -> Result<()> {
    if batch.is_terminal() {
        return Err(Error::InvalidState(format!(
            "Batch {} is {} and admits no further changes",
            batch.batch_id, batch.status
        )));
    }
    Ok(())
}

/// Require `caller` to hold `batch` (admins excepted)
pub(crate) fn require_holder(operation: &str, batch: &LedgerBatch, caller: &Custodian) -> Result<()> {
    if caller.actor_role == ActorRole::Admin {
        return Ok(());
    }
    let holder = resolve_custodian(batch, None).custodian;
    if holder.actor_id != caller.actor_id {
        return Err(Error::Forbidden(format!(
            "{operation}: batch {} is held by {}, not {}",
            batch.batch_id, holder, caller.actor_id
        )));
    }
    Ok(())
}

/// Transaction id of the latest status change
pub(crate) fn last_tx_id(batch: &LedgerBatch) -> String {
    batch
        .status_history
        .last()
        .map(|change| change.tx_id.clone())
        .unwrap_or_default()
}

pub(crate) fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// `BATCH{epoch millis}{3 random digits}`
fn generate_batch_id() -> BatchId {
    let suffix: u16 = rand::thread_rng().gen_range(0..1000);
    BatchId::new(format!("BATCH{}{:03}", Utc::now().timestamp_millis(), suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::MemoryMirror;
    use ledger_gateway::{BatchStatus, GatewayConfig, ReferenceLedger};
    use rust_decimal::Decimal;

    async fn engine() -> (Arc<ReferenceLedger>, Arc<MemoryMirror>, CustodyEngine) {
        let ledger = Arc::new(ReferenceLedger::start());
        let pool = GatewayPool::new(ledger.clone(), GatewayConfig::default()).unwrap();
        let mirror = Arc::new(MemoryMirror::new());
        let engine = CustodyEngine::new(Config::default(), pool, mirror.clone()).unwrap();
        (ledger, mirror, engine)
    }

    fn registration(id: &str) -> RegisterRequest {
        RegisterRequest {
            batch_id: Some(BatchId::new(id)),
            farmer: Actor::new("F1", ActorRole::Farmer),
            crop_type: "Pineapple".into(),
            variety: Some("MD2".into()),
            quantity: Decimal::new(200, 0),
            unit: "kg".into(),
            location: "Johor".into(),
            harvest_date: None,
            quality_grade: None,
            price_per_unit: Some(Decimal::new(3, 0)),
            currency: Default::default(),
            buyer_name: None,
            notes: None,
            certifications: Default::default(),
        }
    }

    #[test]
    fn test_generated_batch_ids_have_prefix() {
        let id = generate_batch_id();
        assert!(id.as_str().starts_with("BATCH"));
        assert!(id.as_str().len() > "BATCH".len() + 3);
    }

    #[test]
    fn test_combine_keeps_first_failure() {
        let warning = |op: &str| MirrorWarning {
            batch_id: BatchId::new("B"),
            operation: op.into(),
            ledger_tx_id: "tx".into(),
            error: "down".into(),
            occurred_at: Utc::now(),
        };
        let combined = combine(MirrorOutcome::Failed(warning("transfer")), Err(warning("log")));
        assert_eq!(combined.warning().unwrap().operation, "transfer");
        assert_eq!(combine(MirrorOutcome::RowMissing, Ok(())), MirrorOutcome::RowMissing);
        assert!(!combine(MirrorOutcome::Written, Err(warning("log"))).is_consistent());
    }

    #[tokio::test]
    async fn test_register_writes_ledger_then_mirror() {
        let (ledger, mirror, engine) = engine().await;

        let result = engine.register(registration("BAT-ENG-1")).await.unwrap();
        assert_eq!(result.mirror, MirrorOutcome::Written);
        assert_eq!(result.batch.status, BatchStatus::Registered);

        let id = BatchId::new("BAT-ENG-1");
        assert!(ledger.batch(&id).is_some());
        let row = mirror.batch(&id).unwrap();
        assert_eq!(row.current_owner, Some(Custodian::new("F1", ActorRole::Farmer)));
        assert_eq!(row.blockchain_hash, result.batch.data_hash);
        assert_eq!(engine.metrics().committed_count("register"), 1);
    }

    #[tokio::test]
    async fn test_register_requires_farmer() {
        let (_ledger, _mirror, engine) = engine().await;
        let mut request = registration("BAT-ENG-2");
        request.farmer = Actor::new("R1", ActorRole::Retailer);

        let err = engine.register(request).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_validation_error() {
        let (_ledger, _mirror, engine) = engine().await;
        engine.register(registration("BAT-ENG-3")).await.unwrap();

        let err = engine.register(registration("BAT-ENG-3")).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
        assert_eq!(err.field(), Some("batchId"));
    }

    #[tokio::test]
    async fn test_warning_queue_is_bounded() {
        let ledger = Arc::new(ReferenceLedger::start());
        let pool = GatewayPool::new(ledger, GatewayConfig::default()).unwrap();
        let mirror = Arc::new(MemoryMirror::new());
        let mut config = Config::default();
        config.mirror.max_pending_warnings = 2;
        let engine = CustodyEngine::new(config, pool, mirror).unwrap();

        for i in 0..3 {
            engine.mirror_failed(
                &BatchId::new(format!("B{i}")),
                "transfer",
                "tx",
                MirrorError::Unavailable("down".into()),
            );
        }

        let pending = engine.pending_mirror_warnings();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].batch_id, BatchId::new("B1"));
        assert_eq!(engine.drain_mirror_warnings().len(), 2);
        assert!(engine.pending_mirror_warnings().is_empty());
        assert_eq!(engine.metrics().mirror_inconsistencies_total.get(), 3);
    }
}
