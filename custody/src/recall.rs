//! Recall propagation
//!
//! Recalling a batch moves it to `RECALLED` from any other status. With
//! `recall_children` the recall follows the split forest breadth first and
//! recalls every descendant. Descendants that are already recalled are not
//! counted again, but their own children are still visited.

use crate::custodian::resolve_custodian;
use crate::engine::{new_request_id, CustodyEngine};
use crate::mirror::{ActivityAction, RecallMark};
use crate::types::{Actor, MirrorWarning, RecallRequest, RecallResult};
use crate::{Error, Result};
use ledger_gateway::types::RecallData;
use ledger_gateway::{
    tx, ActorRole, BatchId, BatchLineage, BatchStatus, LedgerBatch, RecallSeverity,
};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, error, info, warn};

/// Whether `actor` may recall `batch`: admins, regulators, the registering
/// farmer and the current custodian may.
pub fn may_recall(actor: &Actor, batch: &LedgerBatch) -> bool {
    match actor.role {
        ActorRole::Admin | ActorRole::Regulator => true,
        _ => {
            actor.id == batch.farmer
                || resolve_custodian(batch, None).custodian.actor_id == actor.id
        }
    }
}

impl CustodyEngine {
    /// Recall a batch, and with `recall_children` every batch split from it.
    ///
    /// The root's failure fails the call. A descendant whose recall fails is
    /// logged and listed in `unrecalled_batch_ids`; the rest of the cascade
    /// continues.
    pub async fn recall(&self, request: RecallRequest) -> Result<RecallResult> {
        request.validate()?;
        let severity = request
            .severity
            .unwrap_or(self.config.recall.default_severity);
        let root_id = request.batch_id.clone();

        let root = self
            .recall_one(
                "recall",
                &root_id,
                RecallData {
                    reason: request.reason.clone(),
                    severity,
                    notes: request.notes.clone(),
                    recalled_by: request.initiator.custodian(),
                    cascade_from: None,
                    request_id: None,
                },
                Some(&request.initiator),
            )
            .await?;
        info!(
            batch_id = %root_id,
            severity = %severity,
            initiator = %request.initiator.id,
            "Batch recalled"
        );

        let mut affected = vec![root_id.clone()];
        let mut unrecalled = Vec::new();
        let mut warnings = Vec::new();
        warnings.extend(self.mirror_recall(&root).await);

        if request.recall_children {
            self.cascade(
                &request,
                severity,
                &root,
                &mut affected,
                &mut unrecalled,
                &mut warnings,
            )
            .await;
        }

        self.metrics
            .recall_cascade_size
            .observe(affected.len() as f64);
        let activity = self
            .log_activity(
                &request.initiator,
                ActivityAction::BatchRecall,
                &root_id,
                root.recall.as_ref().map(|r| r.tx_id.as_str()),
                serde_json::json!({
                    "reason": request.reason,
                    "severity": severity,
                    "recallChildren": request.recall_children,
                    "affectedBatchIds": affected,
                    "unrecalledBatchIds": unrecalled,
                }),
            )
            .await;
        if let Err(w) = activity {
            warnings.push(w);
        }

        if !unrecalled.is_empty() {
            warn!(
                batch_id = %root_id,
                unrecalled = unrecalled.len(),
                "Recall cascade incomplete"
            );
        }

        Ok(RecallResult {
            batch_id: root_id,
            severity,
            reason: request.reason,
            total_affected_batches: affected.len(),
            affected_batch_ids: affected,
            unrecalled_batch_ids: unrecalled,
            mirror_warnings: warnings,
        })
    }

    async fn cascade(
        &self,
        request: &RecallRequest,
        severity: RecallSeverity,
        root: &LedgerBatch,
        affected: &mut Vec<BatchId>,
        unrecalled: &mut Vec<BatchId>,
        warnings: &mut Vec<MirrorWarning>,
    ) {
        let max_depth = self.config.recall.max_cascade_depth;
        let mut visited: HashSet<BatchId> = HashSet::from([root.batch_id.clone()]);
        let mut queue: VecDeque<(BatchId, BatchId, usize)> = root
            .child_batch_ids
            .iter()
            .map(|child| (child.clone(), root.batch_id.clone(), 1))
            .collect();

        while let Some((batch_id, parent_id, depth)) = queue.pop_front() {
            if !visited.insert(batch_id.clone()) {
                continue;
            }
            if depth > max_depth {
                warn!(
                    batch_id = %batch_id,
                    depth,
                    max_depth,
                    "Recall cascade depth exceeded"
                );
                unrecalled.push(batch_id);
                continue;
            }

            let data = RecallData {
                reason: format!(
                    "Cascade recall from parent batch {}: {}",
                    parent_id, request.reason
                ),
                severity,
                notes: request.notes.clone(),
                recalled_by: request.initiator.custodian(),
                cascade_from: Some(parent_id.clone()),
                request_id: None,
            };
            match self.recall_one("recall_cascade", &batch_id, data, None).await {
                Ok(batch) => {
                    debug!(batch_id = %batch_id, parent = %parent_id, "Descendant recalled");
                    affected.push(batch_id.clone());
                    warnings.extend(self.mirror_recall(&batch).await);
                }
                Err(Error::AlreadyRecalled(_)) => {
                    debug!(batch_id = %batch_id, "Descendant already recalled");
                }
                Err(e) => {
                    error!(
                        batch_id = %batch_id,
                        parent = %parent_id,
                        error = %e,
                        "Descendant recall failed"
                    );
                    unrecalled.push(batch_id.clone());
                }
            }

            match self
                .evaluate::<BatchLineage>(tx::GET_BATCH_LINEAGE, &[batch_id.to_string()])
                .await
            {
                Ok(lineage) => queue.extend(
                    lineage
                        .child_batch_ids
                        .into_iter()
                        .map(|child| (child, batch_id.clone(), depth + 1)),
                ),
                Err(e) => {
                    error!(batch_id = %batch_id, error = %e, "Could not read lineage");
                }
            }
        }
    }

    /// Recall one batch on the ledger; `initiator` is checked when given
    async fn recall_one(
        &self,
        operation: &str,
        batch_id: &BatchId,
        mut data: RecallData,
        initiator: Option<&Actor>,
    ) -> Result<LedgerBatch> {
        let request_id = new_request_id();
        data.request_id = Some(request_id.clone());
        let payload = serde_json::to_string(&data)?;

        let batch: LedgerBatch = self
            .submit_planned(operation, batch_id, &request_id, |batch| {
                if batch.status == BatchStatus::Recalled {
                    return Err(Error::AlreadyRecalled(format!(
                        "Batch {} is already recalled",
                        batch.batch_id
                    )));
                }
                if let Some(actor) = initiator {
                    if !may_recall(actor, batch) {
                        return Err(Error::Forbidden(format!(
                            "{} ({}) may not recall batch {}",
                            actor.id, actor.role, batch.batch_id
                        )));
                    }
                }
                Ok((
                    tx::RECALL_BATCH,
                    vec![
                        batch_id.to_string(),
                        payload.clone(),
                        batch.version.to_string(),
                    ],
                ))
            })
            .await?;
        self.metrics.committed(operation);
        Ok(batch)
    }

    async fn mirror_recall(&self, batch: &LedgerBatch) -> Option<MirrorWarning> {
        let recall = batch.recall.as_ref()?;
        let mark = RecallMark {
            reason: recall.reason.clone(),
            severity: recall.severity,
            notes: recall.notes.clone(),
            recalled_by: recall.recalled_by.clone(),
            recalled_at: recall.recalled_at,
        };
        match self.mirror.mark_recalled(&batch.batch_id, mark).await {
            Ok(true) => None,
            Ok(false) => {
                debug!(batch_id = %batch.batch_id, "No mirror row, recall not mirrored");
                None
            }
            Err(e) => Some(self.mirror_failed(&batch.batch_id, "recall", &recall.tx_id, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ledger_gateway::{ActorId, Currency, Custodian};
    use rust_decimal::Decimal;

    fn batch(owner: Option<Custodian>) -> LedgerBatch {
        LedgerBatch {
            batch_id: BatchId::new("BAT-9"),
            farmer: ActorId::new("F1"),
            crop_type: "Chili".into(),
            variety: None,
            quantity: Decimal::new(50, 0),
            unit: "kg".into(),
            location: "Cameron Highlands".into(),
            harvest_date: None,
            quality_grade: None,
            price_per_unit: None,
            total_batch_value: None,
            currency: Currency::MYR,
            buyer_name: None,
            final_customer: None,
            notes: None,
            certifications: Default::default(),
            status: BatchStatus::InDistribution,
            current_owner: owner,
            parent_batch_id: None,
            child_batch_ids: Vec::new(),
            split_reason: None,
            split_date: None,
            status_history: Vec::new(),
            processing_records: Vec::new(),
            transport_records: Vec::new(),
            distribution_records: Vec::new(),
            ownership_history: Vec::new(),
            recall: None,
            data_hash: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 1,
        }
    }

    #[test]
    fn test_recall_authority() {
        let held = batch(Some(Custodian::new("D1", ActorRole::Distributor)));

        assert!(may_recall(&Actor::new("ADM", ActorRole::Admin), &held));
        assert!(may_recall(&Actor::new("REG", ActorRole::Regulator), &held));
        assert!(may_recall(&Actor::new("F1", ActorRole::Farmer), &held));
        assert!(may_recall(&Actor::new("D1", ActorRole::Distributor), &held));
        assert!(!may_recall(&Actor::new("D2", ActorRole::Distributor), &held));
        assert!(!may_recall(&Actor::new("R1", ActorRole::Retailer), &held));
    }
}
