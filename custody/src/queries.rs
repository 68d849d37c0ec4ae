//! Read-side queries and mirror reconciliation
//!
//! Reads go to the ledger, which is authoritative. The mirror is consulted
//! where it holds something the ledger does not (integrity hashes, mirror
//! transfer rows); a failed mirror read degrades the answer rather than
//! failing it, except where the mirror row is the subject of the query.

use crate::custodian::{resolve_custodian, ResolvedCustodian};
use crate::engine::CustodyEngine;
use crate::mirror::{MirrorBatch, RecallMark, StatusPatch, TransferRecord};
use crate::{Error, Result};
use ledger_gateway::types::{RecallInfo, StatusChange, TransportRecord};
use ledger_gateway::{
    tx, ActorId, BatchId, BatchLineage, BatchStatus, IntegrityReport, LedgerBatch, LedgerTransfer,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info, warn};

/// Custody chain of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipHistory {
    /// Batch queried
    pub batch_id: BatchId,
    /// Ledger transfer records, oldest first
    pub ledger: Vec<LedgerTransfer>,
    /// Mirror transfer records, or `None` when the mirror could not be read
    pub mirror_records: Option<Vec<TransferRecord>>,
    /// Effective custodian now
    pub current_custodian: ResolvedCustodian,
}

/// Split ancestry and descendants of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lineage {
    /// Batch queried
    pub batch_id: BatchId,
    /// Parent first, root of the split tree last
    pub ancestors: Vec<BatchId>,
    /// Direct children in split order
    pub children: Vec<BatchId>,
    /// Every descendant, breadth first
    pub descendants: Vec<BatchId>,
}

/// Recall state of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallStatus {
    /// Batch queried
    pub batch_id: BatchId,
    /// Current status
    pub status: BatchStatus,
    /// Whether the batch is recalled
    pub is_recalled: bool,
    /// Recall details
    pub recall: Option<RecallInfo>,
}

/// What reconciliation did to the mirror row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconcileAction {
    /// Row already agreed with the ledger
    InSync,
    /// Row status or custodian rewritten
    Updated,
    /// Row was missing and has been inserted
    Inserted,
}

/// Outcome of reconciling one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Batch reconciled
    pub batch_id: BatchId,
    /// Ledger status
    pub ledger_status: BatchStatus,
    /// Mirror status before reconciliation, `None` when the row was missing
    pub mirror_status_before: Option<BatchStatus>,
    /// Row change applied
    pub action: ReconcileAction,
    /// Ledger transfers copied into the mirror
    pub backfilled_transfers: usize,
    /// Queued warnings cleared for this batch
    pub cleared_warnings: usize,
}

impl CustodyEngine {
    /// Read a batch from the ledger
    pub async fn batch(&self, batch_id: &BatchId) -> Result<LedgerBatch> {
        self.evaluate(tx::GET_BATCH, &[batch_id.to_string()]).await
    }

    /// Effective custodian of a batch
    pub async fn current_custodian(
        &self,
        batch_id: &BatchId,
        processor_hint: Option<&ActorId>,
    ) -> Result<ResolvedCustodian> {
        let batch = self.batch(batch_id).await?;
        Ok(resolve_custodian(&batch, processor_hint))
    }

    /// Custody chain from the ledger, with the mirror's rows alongside
    pub async fn ownership_history(&self, batch_id: &BatchId) -> Result<OwnershipHistory> {
        let batch = self.batch(batch_id).await?;
        let ledger: Vec<LedgerTransfer> = self
            .evaluate(tx::GET_OWNERSHIP_HISTORY, &[batch_id.to_string()])
            .await?;
        let mirror_records = match self.mirror.transfers_for(batch_id).await {
            Ok(records) => Some(records),
            Err(e) => {
                warn!(batch_id = %batch_id, error = %e, "Mirror transfer history unavailable");
                None
            }
        };

        Ok(OwnershipHistory {
            batch_id: batch_id.clone(),
            ledger,
            mirror_records,
            current_custodian: resolve_custodian(&batch, None),
        })
    }

    /// Transport legs, oldest first
    pub async fn transport_history(&self, batch_id: &BatchId) -> Result<Vec<TransportRecord>> {
        self.evaluate(tx::GET_TRANSPORT_HISTORY, &[batch_id.to_string()])
            .await
    }

    /// Status changes, oldest first
    pub async fn status_history(&self, batch_id: &BatchId) -> Result<Vec<StatusChange>> {
        self.evaluate(tx::GET_BATCH_HISTORY, &[batch_id.to_string()])
            .await
    }

    /// Ancestors and descendants in the split forest
    pub async fn lineage(&self, batch_id: &BatchId) -> Result<Lineage> {
        let own: BatchLineage = self
            .evaluate(tx::GET_BATCH_LINEAGE, &[batch_id.to_string()])
            .await?;

        let mut ancestors = Vec::new();
        let mut seen: HashSet<BatchId> = HashSet::from([batch_id.clone()]);
        let mut parent = own.parent_batch_id.clone();
        while let Some(id) = parent {
            if !seen.insert(id.clone()) {
                break;
            }
            let lineage: BatchLineage = self
                .evaluate(tx::GET_BATCH_LINEAGE, &[id.to_string()])
                .await?;
            ancestors.push(id);
            parent = lineage.parent_batch_id;
        }

        let mut descendants = Vec::new();
        let mut visited: HashSet<BatchId> = HashSet::from([batch_id.clone()]);
        let mut queue: VecDeque<BatchId> = own.child_batch_ids.iter().cloned().collect();
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id.clone()) {
                continue;
            }
            let lineage: BatchLineage = self
                .evaluate(tx::GET_BATCH_LINEAGE, &[id.to_string()])
                .await?;
            queue.extend(lineage.child_batch_ids);
            descendants.push(id);
        }

        Ok(Lineage {
            batch_id: own.batch_id,
            ancestors,
            children: own.child_batch_ids,
            descendants,
        })
    }

    /// `PROCESSED` batches waiting for a distributor
    pub async fn available_for_distributor(&self) -> Result<Vec<LedgerBatch>> {
        self.evaluate(tx::GET_AVAILABLE_BATCHES_FOR_DISTRIBUTOR, &[])
            .await
    }

    /// Batches a distributor holds or has received
    pub async fn batches_by_distributor(&self, distributor: &ActorId) -> Result<Vec<LedgerBatch>> {
        self.evaluate(tx::GET_BATCHES_BY_DISTRIBUTOR, &[distributor.to_string()])
            .await
    }

    /// Compare the mirror row's attribute hash with the ledger's
    pub async fn verify_integrity(&self, batch_id: &BatchId) -> Result<IntegrityReport> {
        let row = self
            .mirror
            .find_batch(batch_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Batch {} has no mirror row", batch_id)))?;
        let report: IntegrityReport = self
            .evaluate(
                tx::VERIFY_BATCH_INTEGRITY,
                &[batch_id.to_string(), row.data_hash()],
            )
            .await?;

        if !report.hash_match {
            warn!(
                batch_id = %batch_id,
                stored = %report.stored_hash,
                mirror = %report.database_hash,
                "Mirror row does not match ledger hash"
            );
        }
        Ok(report)
    }

    /// Whether a batch is recalled, with the recall details
    pub async fn recall_status(&self, batch_id: &BatchId) -> Result<RecallStatus> {
        let batch = self.batch(batch_id).await?;
        Ok(RecallStatus {
            batch_id: batch.batch_id,
            is_recalled: batch.status == BatchStatus::Recalled,
            status: batch.status,
            recall: batch.recall,
        })
    }

    /// Bring a batch's mirror row and transfer rows in line with the ledger.
    ///
    /// Mirror failures here are returned as errors; queued warnings for the
    /// batch are cleared only once the repair went through.
    pub async fn reconcile_batch(&self, batch_id: &BatchId) -> Result<ReconcileReport> {
        let batch = self.batch(batch_id).await?;
        let expected_owner = resolve_custodian(&batch, None).custodian;
        let row = self.mirror.find_batch(batch_id).await?;
        let mirror_status_before = row.as_ref().map(|r| r.status);

        let action = match row {
            None => {
                self.mirror.insert_batch(MirrorBatch::from_ledger(&batch)).await?;
                ReconcileAction::Inserted
            }
            Some(row)
                if row.status == batch.status
                    && row.current_owner.as_ref() == Some(&expected_owner) =>
            {
                ReconcileAction::InSync
            }
            Some(_) => {
                if let (Some(recall), BatchStatus::Recalled) = (&batch.recall, batch.status) {
                    let mark = RecallMark {
                        reason: recall.reason.clone(),
                        severity: recall.severity,
                        notes: recall.notes.clone(),
                        recalled_by: recall.recalled_by.clone(),
                        recalled_at: recall.recalled_at,
                    };
                    self.mirror.mark_recalled(batch_id, mark).await?;
                }
                let patch = StatusPatch::status(batch.status).with_owner(expected_owner);
                self.mirror.update_batch_status(batch_id, patch).await?;
                ReconcileAction::Updated
            }
        };

        let known: HashSet<String> = self
            .mirror
            .transfers_for(batch_id)
            .await?
            .into_iter()
            .map(|r| r.blockchain_tx_id)
            .collect();
        let mut backfilled_transfers = 0;
        for transfer in &batch.ownership_history {
            if known.contains(&transfer.tx_id) {
                continue;
            }
            self.mirror
                .insert_transfer(TransferRecord::ownership(transfer))
                .await?;
            backfilled_transfers += 1;
        }

        let cleared_warnings = self.clear_warnings_for(batch_id);
        if action == ReconcileAction::InSync && backfilled_transfers == 0 {
            debug!(batch_id = %batch_id, cleared_warnings, "Mirror already in sync");
        } else {
            info!(
                batch_id = %batch_id,
                action = ?action,
                backfilled_transfers,
                cleared_warnings,
                "Mirror reconciled"
            );
        }

        Ok(ReconcileReport {
            batch_id: batch_id.clone(),
            ledger_status: batch.status,
            mirror_status_before,
            action,
            backfilled_transfers,
            cleared_warnings,
        })
    }
}
