//! Versioned world state
//!
//! Every key carries a version that is bumped on each committed write. A
//! transaction's read set records the versions it saw; the commit actor
//! compares them with the current versions to detect MVCC conflicts.

use crate::types::{BatchId, LedgerBatch, Receipt};
use std::collections::HashMap;

/// A value and the version it was committed at
#[derive(Debug, Clone)]
struct Versioned<T> {
    value: T,
    version: u64,
}

/// Key-value world state of the batch chaincode
#[derive(Debug, Default)]
pub struct WorldState {
    batches: HashMap<BatchId, Versioned<LedgerBatch>>,
    receipts: HashMap<String, Receipt>,
    committed: u64,
}

impl WorldState {
    /// Empty world state
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a batch key
    pub fn batch(&self, id: &BatchId) -> Option<&LedgerBatch> {
        self.batches.get(id).map(|v| &v.value)
    }

    /// Current version of a batch key (0 when absent)
    pub fn version(&self, id: &BatchId) -> u64 {
        self.batches.get(id).map(|v| v.version).unwrap_or(0)
    }

    /// Receipt stored for a request id
    pub fn receipt(&self, request_id: &str) -> Option<&Receipt> {
        self.receipts.get(request_id)
    }

    /// All batches, in no particular order
    pub fn batches(&self) -> impl Iterator<Item = &LedgerBatch> {
        self.batches.values().map(|v| &v.value)
    }

    /// Number of batch keys
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// Whether no batch has been written
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Transactions committed so far
    pub fn committed(&self) -> u64 {
        self.committed
    }

    /// Apply a validated write set
    pub(crate) fn apply(&mut self, writes: Vec<LedgerBatch>, receipt: Option<Receipt>) {
        for batch in writes {
            let entry = self
                .batches
                .entry(batch.batch_id.clone())
                .or_insert_with(|| Versioned {
                    value: batch.clone(),
                    version: 0,
                });
            entry.version += 1;
            entry.value = batch;
            entry.value.version = entry.version;
        }
        if let Some(receipt) = receipt {
            self.receipts.insert(receipt.request_id.clone(), receipt);
        }
        self.committed += 1;
    }
}
