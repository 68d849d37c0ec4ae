//! Shared fixtures for custody integration tests

#![allow(dead_code)]

use custody::{
    Actor, CompleteRequest, Config, CustodyEngine, MemoryMirror, ProcessRequest, RegisterRequest,
    RetryConfig, SplitRequest, TransferMetadata, TransferRequest,
};
use ledger_gateway::{ActorRole, BatchId, GatewayConfig, GatewayPool, ReferenceLedger};
use rust_decimal::Decimal;
use std::sync::Arc;

pub struct Harness {
    pub ledger: Arc<ReferenceLedger>,
    pub mirror: Arc<MemoryMirror>,
    pub engine: Arc<CustodyEngine>,
}

/// Retry budget that keeps tests fast
pub fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay_ms: 1,
        max_delay_ms: 10,
        backoff_multiplier: 2.0,
        jitter_factor: 0.0,
    }
}

pub fn harness() -> Harness {
    harness_with(fast_retry(3), GatewayConfig::default())
}

pub fn harness_with(retry: RetryConfig, gateway: GatewayConfig) -> Harness {
    let ledger = Arc::new(ReferenceLedger::start());
    let pool = GatewayPool::new(ledger.clone(), gateway).unwrap();
    let mirror = Arc::new(MemoryMirror::new());
    let config = Config {
        retry,
        ..Config::default()
    };
    let engine = Arc::new(CustodyEngine::new(config, pool, mirror.clone()).unwrap());
    Harness {
        ledger,
        mirror,
        engine,
    }
}

pub fn farmer() -> Actor {
    Actor::new("F1", ActorRole::Farmer)
}

pub fn processor() -> Actor {
    Actor::new("P1", ActorRole::Processor)
}

pub fn distributor() -> Actor {
    Actor::new("D1", ActorRole::Distributor)
}

pub fn retailer() -> Actor {
    Actor::new("R1", ActorRole::Retailer)
}

pub fn admin() -> Actor {
    Actor::new("ADM", ActorRole::Admin)
}

pub fn regulator() -> Actor {
    Actor::new("REG1", ActorRole::Regulator)
}

pub fn kg(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

pub async fn register(engine: &CustodyEngine, id: &str, quantity: Decimal) -> BatchId {
    let request = RegisterRequest {
        price_per_unit: Some(Decimal::new(250, 2)),
        ..RegisterRequest::new(farmer(), "Tomato", quantity, "kg", "Cameron Highlands")
            .with_batch_id(id)
    };
    engine.register(request).await.unwrap().batch.batch_id
}

pub async fn transfer(engine: &CustodyEngine, id: &BatchId, from: &Actor, to: &Actor) {
    engine
        .transfer(TransferRequest {
            batch_id: id.clone(),
            from: from.clone(),
            to_actor_id: to.id.clone(),
            to_actor_role: to.role,
            metadata: TransferMetadata::default(),
        })
        .await
        .unwrap();
}

pub fn process_request(id: &BatchId) -> ProcessRequest {
    ProcessRequest {
        batch_id: id.clone(),
        processor: processor(),
        processing_type: None,
        input_quantity: None,
        output_quantity: None,
        facility: None,
        notes: None,
    }
}

pub fn complete_request(id: &BatchId) -> CompleteRequest {
    CompleteRequest {
        batch_id: id.clone(),
        processor: processor(),
        quality_grade: None,
        notes: None,
    }
}

/// Registered batch taken through processing to `PROCESSED`
pub async fn processed(engine: &CustodyEngine, id: &str, quantity: Decimal) -> BatchId {
    let batch_id = register(engine, id, quantity).await;
    engine.process(process_request(&batch_id)).await.unwrap();
    engine.complete(complete_request(&batch_id)).await.unwrap();
    batch_id
}

pub fn split_request(parent: &BatchId, by: Actor, quantity: Decimal) -> SplitRequest {
    SplitRequest {
        parent_batch_id: parent.clone(),
        initiator: by,
        split_quantity: quantity,
        reason: None,
        buyer_name: None,
        price_per_unit: None,
        notes: None,
    }
}
