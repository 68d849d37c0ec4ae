//! Distribution and transport records
//!
//! Append-only facts about a batch's journey. They do not move custody or
//! change status.

use crate::engine::{new_request_id, reject_terminal, CustodyEngine};
use crate::mirror::ActivityAction;
use crate::types::{DistributionRequest, DistributionResult, MirrorOutcome, TransportRequest, TransportResult};
use crate::{Error, Result};
use ledger_gateway::types::{DistributionData, DistributionRecord, TransportData, TransportRecord};
use ledger_gateway::{tx, ActorRole};
use tracing::info;

impl CustodyEngine {
    /// Record a warehouse intake by a distributor
    pub async fn add_distribution_record(
        &self,
        request: DistributionRequest,
    ) -> Result<DistributionResult> {
        request.validate()?;
        if !matches!(
            request.distributor.role,
            ActorRole::Distributor | ActorRole::Admin
        ) {
            return Err(Error::Forbidden(format!(
                "distribution records require role DISTRIBUTOR; {} acts as {}",
                request.distributor.id, request.distributor.role
            )));
        }

        let request_id = new_request_id();
        let payload = serde_json::to_string(&DistributionData {
            distributor_id: request.distributor.id.clone(),
            warehouse_location: request.warehouse_location.clone(),
            storage_conditions: request.storage_conditions.clone(),
            quantity_received: request.quantity_received,
            notes: request.notes.clone(),
            request_id: Some(request_id.clone()),
        })?;

        let record: DistributionRecord = self
            .submit_planned(
                "add_distribution_record",
                &request.batch_id,
                &request_id,
                |batch| {
                    reject_terminal(batch)?;
                    Ok((
                        tx::ADD_DISTRIBUTION_RECORD,
                        vec![batch.batch_id.to_string(), payload.clone()],
                    ))
                },
            )
            .await?;

        self.metrics.committed("add_distribution_record");
        info!(
            batch_id = %request.batch_id,
            distributor = %record.distributor_id,
            warehouse = %record.warehouse_location,
            tx_id = %record.tx_id,
            "Distribution record added"
        );

        let activity = self
            .log_activity(
                &request.distributor,
                ActivityAction::AddDistributionRecord,
                &request.batch_id,
                Some(&record.tx_id),
                serde_json::json!({
                    "warehouseLocation": record.warehouse_location,
                    "quantityReceived": record.quantity_received,
                }),
            )
            .await;

        Ok(DistributionResult {
            record,
            mirror: outcome_of(activity),
        })
    }

    /// Record a transport leg
    pub async fn add_transport_record(&self, request: TransportRequest) -> Result<TransportResult> {
        request.validate()?;
        if !(request.carrier.role.is_custodial() || request.carrier.role == ActorRole::Admin) {
            return Err(Error::Forbidden(format!(
                "{} cannot record transport",
                request.carrier.role
            )));
        }

        let request_id = new_request_id();
        let payload = serde_json::to_string(&TransportData {
            carrier_id: request.carrier.id.clone(),
            origin: request.origin.clone(),
            destination: request.destination.clone(),
            vehicle: request.vehicle.clone(),
            temperature_celsius: request.temperature_celsius,
            notes: request.notes.clone(),
            request_id: Some(request_id.clone()),
        })?;

        let record: TransportRecord = self
            .submit_planned("add_transport_record", &request.batch_id, &request_id, |batch| {
                reject_terminal(batch)?;
                Ok((
                    tx::ADD_TRANSPORT_RECORD,
                    vec![batch.batch_id.to_string(), payload.clone()],
                ))
            })
            .await?;

        self.metrics.committed("add_transport_record");
        info!(
            batch_id = %request.batch_id,
            origin = %record.origin,
            destination = %record.destination,
            tx_id = %record.tx_id,
            "Transport record added"
        );

        let activity = self
            .log_activity(
                &request.carrier,
                ActivityAction::AddTransportRecord,
                &request.batch_id,
                Some(&record.tx_id),
                serde_json::json!({
                    "origin": record.origin,
                    "destination": record.destination,
                }),
            )
            .await;

        Ok(TransportResult {
            record,
            mirror: outcome_of(activity),
        })
    }
}

fn outcome_of(activity: std::result::Result<(), crate::types::MirrorWarning>) -> MirrorOutcome {
    match activity {
        Ok(()) => MirrorOutcome::Written,
        Err(w) => MirrorOutcome::Failed(w),
    }
}
