//! Batch splitting
//!
//! A split moves part of a batch into a new child lot. The parent keeps
//! `quantity - split_quantity`, the child gets `split_quantity`, and the
//! split quantity must lie strictly between zero and the parent's quantity.
//! The ledger applies both sides in a single transaction.

use crate::engine::{combine, new_request_id, require_holder, reject_terminal, CustodyEngine};
use crate::mirror::{ActivityAction, MirrorBatch, SplitWrite, TransferRecord};
use crate::types::{MirrorOutcome, SplitRequest, SplitResult};
use crate::{Error, Result};
use ledger_gateway::types::{SplitData, SplitRecord};
use ledger_gateway::{tx, ActorRole};
use tracing::info;

/// Reason recorded when the caller gives none
pub const DEFAULT_SPLIT_REASON: &str = "Batch split for distribution";

impl CustodyEngine {
    /// Split a child lot off a batch.
    ///
    /// The child is named `{parent}-A`, `{parent}-B`, ... in split order and
    /// inherits the parent's attributes, status and custodian. Its price
    /// defaults to the parent's.
    pub async fn split(&self, request: SplitRequest) -> Result<SplitResult> {
        request.validate()?;
        let initiator = &request.initiator;
        if !(initiator.role.is_custodial() || initiator.role == ActorRole::Admin) {
            return Err(Error::Forbidden(format!(
                "{} cannot split batches",
                initiator.role
            )));
        }

        let request_id = new_request_id();
        let splitter = initiator.custodian();
        let data = SplitData {
            reason: request
                .reason
                .clone()
                .unwrap_or_else(|| DEFAULT_SPLIT_REASON.to_string()),
            buyer_name: request.buyer_name.clone(),
            price_per_unit: request.price_per_unit,
            split_by: splitter.clone(),
            notes: request.notes.clone(),
            request_id: Some(request_id.clone()),
        };
        let payload = serde_json::to_string(&data)?;
        let quantity = request.split_quantity;

        let record: SplitRecord = self
            .submit_planned("split", &request.parent_batch_id, &request_id, |parent| {
                reject_terminal(parent)?;
                require_holder("split", parent, &splitter)?;
                if quantity >= parent.quantity {
                    return Err(Error::validation(
                        "splitQuantity",
                        format!(
                            "Split quantity {} must be less than the batch quantity {} {}",
                            quantity, parent.quantity, parent.unit
                        ),
                    ));
                }
                let child_id = parent.batch_id.child(parent.child_batch_ids.len());
                Ok((
                    tx::SPLIT_BATCH,
                    vec![
                        parent.batch_id.to_string(),
                        child_id.to_string(),
                        quantity.to_string(),
                        payload.clone(),
                        parent.version.to_string(),
                    ],
                ))
            })
            .await?;

        self.metrics.committed("split");
        info!(
            parent = %record.parent.batch_id,
            child = %record.child.batch_id,
            split_quantity = %quantity,
            remaining = %record.parent.quantity,
            tx_id = %record.tx_id,
            "Batch split"
        );

        let split_record = TransferRecord::split(&record.child, &splitter, &record.tx_id);
        let write = SplitWrite {
            parent_id: record.parent.batch_id.clone(),
            parent_quantity: record.parent.quantity,
            parent_total_value: record.parent.total_batch_value,
            child: MirrorBatch::from_ledger(&record.child),
            record: split_record.clone(),
        };
        let (mirror_record, outcome) = match self.mirror.record_split(write).await {
            Ok(()) => (Some(split_record), MirrorOutcome::Written),
            Err(e) => (
                None,
                MirrorOutcome::Failed(self.mirror_failed(
                    &record.child.batch_id,
                    "split",
                    &record.tx_id,
                    e,
                )),
            ),
        };
        let activity = self
            .log_activity(
                initiator,
                ActivityAction::BatchSplit,
                &record.parent.batch_id,
                Some(&record.tx_id),
                serde_json::json!({
                    "childBatchId": record.child.batch_id,
                    "splitQuantity": quantity,
                    "remainingQuantity": record.parent.quantity,
                    "reason": data.reason,
                }),
            )
            .await;

        Ok(SplitResult {
            ledger_tx_id: record.tx_id,
            parent: record.parent,
            child: record.child,
            mirror_record,
            mirror: combine(outcome, activity),
        })
    }
}
