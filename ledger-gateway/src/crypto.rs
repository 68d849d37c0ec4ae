//! Hashing for the ledger
//!
//! This module provides:
//! - Transaction ids (hex SHA-256 over the proposal)
//! - Registration data hashes shared by the ledger and the relational mirror

use crate::types::{ActorId, BatchId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Hash arbitrary bytes using SHA-256
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Derive a transaction id from a proposal.
///
/// The nonce makes ids unique across resubmissions of identical arguments.
pub fn transaction_id(tx_name: &str, args: &[String], nonce: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tx_name.as_bytes());
    for arg in args {
        hasher.update([0u8]);
        hasher.update(arg.as_bytes());
    }
    hasher.update(nonce.to_be_bytes());
    hex::encode(hasher.finalize())
}

/// Registration attributes that never change after a batch is created.
///
/// Both sides of the dual write can build this from their own copy of the
/// batch, which is what makes the hashes comparable.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataHashInput<'a> {
    /// Batch identifier
    pub batch_id: &'a BatchId,
    /// Registering farmer
    pub farmer: &'a ActorId,
    /// Crop / product type
    pub crop_type: &'a str,
    /// Variety
    pub variety: Option<&'a str>,
    /// Unit of quantity
    pub unit: &'a str,
    /// Farm location
    pub location: &'a str,
    /// Harvest date
    pub harvest_date: Option<DateTime<Utc>>,
    /// Certifications
    pub certifications: &'a BTreeSet<String>,
}

/// Hex SHA-256 of the canonical JSON encoding of the registration attributes
pub fn data_hash(input: &DataHashInput<'_>) -> String {
    // Struct field order is fixed and BTreeSet iterates sorted, so the
    // encoding is canonical.
    let encoded = serde_json::to_vec(input).unwrap_or_default();
    hex::encode(hash_bytes(&encoded))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(
        batch_id: &'a BatchId,
        farmer: &'a ActorId,
        certs: &'a BTreeSet<String>,
    ) -> DataHashInput<'a> {
        DataHashInput {
            batch_id,
            farmer,
            crop_type: "Durian",
            variety: Some("Musang King"),
            unit: "kg",
            location: "Raub, Pahang",
            harvest_date: None,
            certifications: certs,
        }
    }

    #[test]
    fn test_hash_bytes_deterministic() {
        assert_eq!(hash_bytes(b"batch"), hash_bytes(b"batch"));
        assert_ne!(hash_bytes(b"batch"), hash_bytes(b"batch2"));
    }

    #[test]
    fn test_transaction_id_depends_on_nonce() {
        let args = vec!["BAT-001".to_string()];
        let a = transaction_id("getBatch", &args, 1);
        let b = transaction_id("getBatch", &args, 2);
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_transaction_id_separates_arguments() {
        let a = transaction_id("tx", &["ab".into(), "c".into()], 0);
        let b = transaction_id("tx", &["a".into(), "bc".into()], 0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_data_hash_ignores_certification_insertion_order() {
        let id = BatchId::new("BAT-001");
        let farmer = ActorId::new("farmer-1");
        let mut a = BTreeSet::new();
        a.insert("organic".to_string());
        a.insert("gap".to_string());
        let mut b = BTreeSet::new();
        b.insert("gap".to_string());
        b.insert("organic".to_string());
        assert_eq!(
            data_hash(&input(&id, &farmer, &a)),
            data_hash(&input(&id, &farmer, &b))
        );
    }
}
