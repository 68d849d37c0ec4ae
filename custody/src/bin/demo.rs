//! Custody walkthrough against the reference ledger and in-memory mirror

use anyhow::Context;
use custody::{
    Actor, CompleteRequest, Config, CustodyEngine, MemoryMirror, ProcessRequest, RecallRequest,
    ReceiveRequest, RegisterRequest, SplitRequest, TransferMetadata, TransferRequest,
};
use ledger_gateway::{ActorId, ActorRole, BatchId, GatewayPool, RecallSeverity, ReferenceLedger};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

fn show<T: Serialize>(title: &str, value: &T) -> anyhow::Result<()> {
    println!("=== {title} ===");
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting custody demo");

    let config = Config::from_env().context("loading configuration")?;
    let ledger = Arc::new(ReferenceLedger::start());
    let pool = GatewayPool::new(ledger.clone(), config.ledger.gateway.clone())?;
    let mirror = Arc::new(MemoryMirror::new());
    let engine = CustodyEngine::new(config, pool, mirror.clone())?;

    let farmer = Actor::new("F1", ActorRole::Farmer);
    let processor = Actor::new("P1", ActorRole::Processor);
    let distributor = Actor::new("D1", ActorRole::Distributor);
    let regulator = Actor::new("REG1", ActorRole::Regulator);
    let batch_id = BatchId::new("BAT-001");

    // Scenario A: register, hand to the processor, process, complete
    let registered = engine
        .register(
            RegisterRequest::new(
                farmer.clone(),
                "Tomato",
                Decimal::new(1000, 0),
                "kg",
                "Cameron Highlands",
            )
            .with_batch_id("BAT-001"),
        )
        .await?;
    show("A: registered", &registered)?;

    let handed = engine
        .transfer(TransferRequest {
            batch_id: batch_id.clone(),
            from: farmer.clone(),
            to_actor_id: processor.id.clone(),
            to_actor_role: ActorRole::Processor,
            metadata: TransferMetadata {
                transfer_location: Some("Farm gate".into()),
                ..Default::default()
            },
        })
        .await?;
    show("A: transferred to processor", &handed)?;

    let processing = engine
        .process(ProcessRequest {
            batch_id: batch_id.clone(),
            processor: processor.clone(),
            processing_type: Some("washing".into()),
            input_quantity: Some(Decimal::new(1000, 0)),
            output_quantity: Some(Decimal::new(1000, 0)),
            facility: Some("Plant 3".into()),
            notes: None,
        })
        .await?;
    show("A: processing", &processing)?;

    let processed = engine
        .complete(CompleteRequest {
            batch_id: batch_id.clone(),
            processor: processor.clone(),
            quality_grade: Some("A".into()),
            notes: None,
        })
        .await?;
    show("A: processed", &processed)?;

    // Scenario B: split 300 kg off
    let split = engine
        .split(SplitRequest {
            parent_batch_id: batch_id.clone(),
            initiator: processor.clone(),
            split_quantity: Decimal::new(300, 0),
            reason: None,
            buyer_name: Some("Pasar Borong".into()),
            price_per_unit: None,
            notes: None,
        })
        .await?;
    show("B: split", &split)?;

    // Scenario C: a split that would leave nothing behind
    let rejected = engine
        .split(SplitRequest {
            parent_batch_id: batch_id.clone(),
            initiator: processor.clone(),
            split_quantity: Decimal::new(700, 0),
            reason: None,
            buyer_name: None,
            price_per_unit: None,
            notes: None,
        })
        .await;
    match rejected {
        Ok(_) => anyhow::bail!("split of the whole remaining quantity was accepted"),
        Err(e) => show("C: rejected split", &e.report())?,
    }

    // Scenario D: distributor receives from the processor
    let received = engine
        .receive(ReceiveRequest {
            batch_id: batch_id.clone(),
            distributor: distributor.clone(),
            from_processor_id: None,
            metadata: TransferMetadata::default(),
        })
        .await?;
    show("D: received by distributor", &received)?;
    show(
        "D: distributor holdings",
        &engine
            .batches_by_distributor(&ActorId::new("D1"))
            .await?
            .iter()
            .map(|b| b.batch_id.clone())
            .collect::<Vec<_>>(),
    )?;

    // Scenario E: recall with children
    let recall = engine
        .recall(RecallRequest {
            batch_id: batch_id.clone(),
            initiator: regulator,
            reason: "Pesticide residue above limit".into(),
            severity: Some(RecallSeverity::Critical),
            notes: None,
            recall_children: true,
        })
        .await?;
    show("E: recall", &recall)?;

    show("Lineage", &engine.lineage(&batch_id).await?)?;
    show("Ownership history", &engine.ownership_history(&batch_id).await?)?;
    show("Integrity", &engine.verify_integrity(&batch_id).await?)?;

    tracing::info!(
        ledger_batches = ledger.batch_count(),
        mirror_batches = mirror.batch_count(),
        pending_warnings = engine.pending_mirror_warnings().len(),
        "Demo finished"
    );
    ledger.shutdown().await?;
    Ok(())
}
