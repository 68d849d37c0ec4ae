//! In-memory mirror

use super::{
    ActivityEntry, MirrorBatch, MirrorError, MirrorResult, RecallMark, RelationalMirror,
    SplitWrite, StatusPatch, TransferRecord,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use ledger_gateway::{BatchId, BatchStatus};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// DashMap-backed mirror with failure injection
#[derive(Debug, Default)]
pub struct MemoryMirror {
    batches: DashMap<BatchId, MirrorBatch>,
    transfers: DashMap<BatchId, Vec<TransferRecord>>,
    activity: Mutex<Vec<ActivityEntry>>,
    failing_writes: AtomicUsize,
    down: AtomicBool,
}

impl MemoryMirror {
    /// Create empty mirror
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` writes with [`MirrorError::Unavailable`]
    pub fn fail_next_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Take the whole store down (reads and writes) or bring it back
    pub fn set_available(&self, available: bool) {
        self.down.store(!available, Ordering::SeqCst);
    }

    /// Batch row, bypassing failure injection
    pub fn batch(&self, batch_id: &BatchId) -> Option<MirrorBatch> {
        self.batches.get(batch_id).map(|row| row.clone())
    }

    /// Number of batch rows
    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Transfer records of a batch, bypassing failure injection
    pub fn transfers(&self, batch_id: &BatchId) -> Vec<TransferRecord> {
        self.transfers
            .get(batch_id)
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }

    /// Activity log snapshot
    pub fn activity(&self) -> Vec<ActivityEntry> {
        self.activity.lock().clone()
    }

    fn check_read(&self) -> MirrorResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(MirrorError::Unavailable("mirror is down".to_string()));
        }
        Ok(())
    }

    fn check_write(&self, operation: &str) -> MirrorResult<()> {
        self.check_read()?;
        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(MirrorError::Unavailable(format!(
                "injected failure during {operation}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RelationalMirror for MemoryMirror {
    async fn insert_batch(&self, batch: MirrorBatch) -> MirrorResult<()> {
        self.check_write("insert_batch")?;
        if self.batches.contains_key(&batch.batch_id) {
            return Err(MirrorError::Constraint(format!(
                "batch {} already exists",
                batch.batch_id
            )));
        }
        self.batches.insert(batch.batch_id.clone(), batch);
        Ok(())
    }

    async fn find_batch(&self, batch_id: &BatchId) -> MirrorResult<Option<MirrorBatch>> {
        self.check_read()?;
        Ok(self.batch(batch_id))
    }

    async fn insert_transfer(&self, record: TransferRecord) -> MirrorResult<()> {
        self.check_write("insert_transfer")?;
        self.transfers
            .entry(record.batch_id.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn update_batch_status(
        &self,
        batch_id: &BatchId,
        patch: StatusPatch,
    ) -> MirrorResult<bool> {
        self.check_write("update_batch_status")?;
        let Some(mut row) = self.batches.get_mut(batch_id) else {
            return Ok(false);
        };
        row.status = patch.status;
        if let Some(owner) = patch.current_owner {
            row.current_owner = Some(owner);
        }
        if let Some(grade) = patch.quality_grade {
            row.quality_grade = Some(grade);
        }
        row.updated_at = Utc::now();
        Ok(true)
    }

    async fn record_split(&self, write: SplitWrite) -> MirrorResult<()> {
        self.check_write("record_split")?;
        if self.batches.contains_key(&write.child.batch_id) {
            return Err(MirrorError::Constraint(format!(
                "batch {} already exists",
                write.child.batch_id
            )));
        }
        let Some(mut parent) = self.batches.get_mut(&write.parent_id) else {
            return Err(MirrorError::Constraint(format!(
                "parent batch {} has no row",
                write.parent_id
            )));
        };
        parent.quantity = write.parent_quantity;
        parent.total_batch_value = write.parent_total_value;
        parent.updated_at = Utc::now();
        drop(parent);

        self.batches
            .insert(write.child.batch_id.clone(), write.child);
        self.transfers
            .entry(write.record.batch_id.clone())
            .or_default()
            .push(write.record);
        Ok(())
    }

    async fn mark_recalled(&self, batch_id: &BatchId, mark: RecallMark) -> MirrorResult<bool> {
        self.check_write("mark_recalled")?;
        let Some(mut row) = self.batches.get_mut(batch_id) else {
            return Ok(false);
        };
        row.status = BatchStatus::Recalled;
        row.recall_reason = Some(mark.reason);
        row.recall_severity = Some(mark.severity);
        row.recall_notes = mark.notes;
        row.recalled_by = Some(mark.recalled_by);
        row.recalled_at = Some(mark.recalled_at);
        row.updated_at = Utc::now();
        Ok(true)
    }

    async fn transfers_for(&self, batch_id: &BatchId) -> MirrorResult<Vec<TransferRecord>> {
        self.check_read()?;
        Ok(self.transfers(batch_id))
    }

    async fn log_activity(&self, entry: ActivityEntry) -> MirrorResult<()> {
        self.check_write("log_activity")?;
        self.activity.lock().push(entry);
        Ok(())
    }
}
