//! Effective custodian of a batch
//!
//! The ledger only records a custodian once a batch has been transferred.
//! Before that, custody is inferred in a fixed priority order:
//!
//! 1. the custodian recorded by the last transfer
//! 2. a processor named by the caller
//! 3. the processor of the most recent processing record
//! 4. the registering farmer
//!
//! Resolution always yields exactly one custodian.

use ledger_gateway::{ActorId, ActorRole, Custodian, LedgerBatch};
use serde::{Deserialize, Serialize};

/// Where the resolved custodian came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CustodianSource {
    /// Recorded on the ledger by a transfer
    Recorded,
    /// Processor named by the caller
    CallerHint,
    /// Most recent processing record
    LastProcessor,
    /// Registering farmer
    RegisteringFarmer,
}

/// Custodian plus its provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedCustodian {
    /// Effective custodian
    pub custodian: Custodian,
    /// Rule that produced it
    pub source: CustodianSource,
}

/// Resolve the effective custodian of `batch`
pub fn resolve_custodian(batch: &LedgerBatch, processor_hint: Option<&ActorId>) -> ResolvedCustodian {
    if let Some(owner) = &batch.current_owner {
        return ResolvedCustodian {
            custodian: owner.clone(),
            source: CustodianSource::Recorded,
        };
    }

    if let Some(hint) = processor_hint.filter(|id| !id.as_str().trim().is_empty()) {
        return ResolvedCustodian {
            custodian: Custodian {
                actor_id: hint.clone(),
                actor_role: ActorRole::Processor,
            },
            source: CustodianSource::CallerHint,
        };
    }

    if let Some(processor) = batch.last_processor() {
        return ResolvedCustodian {
            custodian: Custodian {
                actor_id: processor.clone(),
                actor_role: ActorRole::Processor,
            },
            source: CustodianSource::LastProcessor,
        };
    }

    ResolvedCustodian {
        custodian: Custodian {
            actor_id: batch.farmer.clone(),
            actor_role: ActorRole::Farmer,
        },
        source: CustodianSource::RegisteringFarmer,
    }
}

/// Custodian recorded on the ledger, or the farmer when none is.
///
/// Processing records do not count here; this is the holder before a
/// processor takes a batch in.
pub fn recorded_or_farmer(batch: &LedgerBatch) -> Custodian {
    batch.current_owner.clone().unwrap_or_else(|| Custodian {
        actor_id: batch.farmer.clone(),
        actor_role: ActorRole::Farmer,
    })
}
