//! Contract tests for the reference ledger behind a gateway pool
//!
//! These exercise the behaviours callers rely on:
//! - Ordered commits with MVCC read-set validation
//! - Receipts and idempotent replay per request id
//! - Unknown outcomes on submit deadlines, verified through receipts

use ledger_gateway::reference::Fault;
use ledger_gateway::types::{BatchRegistration, TransferDetails};
use ledger_gateway::{
    tx, ActorId, BatchId, BatchStatus, Currency, Error, GatewayConfig, GatewayPool, LedgerBatch,
    LedgerTransfer, ReferenceLedger,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

fn pool_over(ledger: Arc<ReferenceLedger>, config: GatewayConfig) -> GatewayPool {
    GatewayPool::new(ledger, config).unwrap()
}

fn registration(request_id: Option<&str>) -> String {
    serde_json::to_string(&BatchRegistration {
        farmer: ActorId::new("farmer-1"),
        crop_type: "Cocoa".into(),
        variety: None,
        quantity: Decimal::new(500, 0),
        unit: "kg".into(),
        location: "Tawau, Sabah".into(),
        harvest_date: None,
        quality_grade: Some("A".into()),
        price_per_unit: None,
        currency: Currency::MYR,
        buyer_name: None,
        notes: None,
        certifications: Default::default(),
        request_id: request_id.map(str::to_string),
    })
    .unwrap()
}

fn transfer_args(to: &str, request_id: &str) -> Vec<String> {
    let details = TransferDetails {
        notes: Some("hand-over".into()),
        request_id: Some(request_id.to_string()),
        ..Default::default()
    };
    vec![
        "BAT-100".into(),
        "farmer-1".into(),
        "FARMER".into(),
        to.into(),
        "PROCESSOR".into(),
        serde_json::to_string(&details).unwrap(),
    ]
}

async fn seeded() -> (Arc<ReferenceLedger>, GatewayPool) {
    let ledger = Arc::new(ReferenceLedger::start());
    let pool = pool_over(ledger.clone(), GatewayConfig::default());
    let lease = pool.acquire().await.unwrap();
    lease
        .submit(tx::CREATE_BATCH, &["BAT-100".into(), registration(None)])
        .await
        .unwrap();
    (ledger, pool)
}

#[tokio::test]
async fn test_submit_then_evaluate() {
    let (_ledger, pool) = seeded().await;
    let lease = pool.acquire().await.unwrap();

    let batch: LedgerBatch = lease
        .evaluate_json(tx::GET_BATCH, &["BAT-100".into()])
        .await
        .unwrap();
    assert_eq!(batch.status, BatchStatus::Registered);
    assert_eq!(batch.quantity, Decimal::new(500, 0));
}

#[tokio::test]
async fn test_missing_batch_is_not_found() {
    let (_ledger, pool) = seeded().await;
    let lease = pool.acquire().await.unwrap();

    let err = lease
        .evaluate(tx::GET_BATCH, &["BAT-404".into()])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_stale_read_set_conflicts() {
    let (ledger, pool) = seeded().await;
    ledger.faults().inject(
        tx::TRANSFER_BATCH,
        Fault::DelayCommit(Duration::from_millis(100)),
        1,
    );

    let slow_pool = pool.clone();
    let slow = tokio::spawn(async move {
        let lease = slow_pool.acquire().await.unwrap();
        lease
            .submit(tx::TRANSFER_BATCH, &transfer_args("proc-slow", "req-slow"))
            .await
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    let lease = pool.acquire().await.unwrap();
    lease
        .submit(tx::TRANSFER_BATCH, &transfer_args("proc-fast", "req-fast"))
        .await
        .unwrap();

    let err = slow.await.unwrap().unwrap_err();
    assert!(err.is_conflict(), "expected conflict, got {err}");
    assert!(err.to_string().contains("MVCC_READ_CONFLICT"));

    let batch = ledger.batch(&BatchId::new("BAT-100")).unwrap();
    assert_eq!(batch.ownership_history.len(), 1);
    assert_eq!(
        batch.current_owner.unwrap().actor_id,
        ActorId::new("proc-fast")
    );
    assert_eq!(pool.metrics().conflicts_total.get(), 1);
}

#[tokio::test]
async fn test_duplicate_request_replays_receipt() {
    let (ledger, pool) = seeded().await;
    let lease = pool.acquire().await.unwrap();

    let first = lease
        .submit(tx::TRANSFER_BATCH, &transfer_args("proc-1", "req-1"))
        .await
        .unwrap();
    let committed = ledger.committed_transactions();

    let second = lease
        .submit(tx::TRANSFER_BATCH, &transfer_args("proc-1", "req-1"))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(ledger.committed_transactions(), committed);
    let batch = ledger.batch(&BatchId::new("BAT-100")).unwrap();
    assert_eq!(batch.ownership_history.len(), 1);
}

#[tokio::test]
async fn test_lost_response_verified_through_receipt() {
    let (ledger, pool) = seeded().await;
    ledger
        .faults()
        .inject(tx::TRANSFER_BATCH, Fault::CommitAndLoseResponse, 1);
    let lease = pool.acquire().await.unwrap();

    let bytes = lease
        .submit_idempotent(tx::TRANSFER_BATCH, &transfer_args("proc-1", "req-lost"), "req-lost")
        .await
        .unwrap();
    let record: LedgerTransfer = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(record.to.actor_id, ActorId::new("proc-1"));

    let receipt = lease.receipt("req-lost").await.unwrap().unwrap();
    assert_eq!(receipt.tx_id, record.tx_id);
}

#[tokio::test]
async fn test_hung_submit_stays_unknown_without_receipt() {
    let (ledger, pool) = seeded().await;
    let pool = pool_over(
        ledger.clone(),
        GatewayConfig {
            submit_timeout_ms: 30,
            ..Default::default()
        },
    );
    ledger.faults().inject(tx::TRANSFER_BATCH, Fault::Hang, 1);
    let lease = pool.acquire().await.unwrap();

    let err = lease
        .submit_idempotent(tx::TRANSFER_BATCH, &transfer_args("proc-1", "req-hang"), "req-hang")
        .await
        .unwrap_err();
    assert!(err.is_outcome_unknown());
    assert!(lease.receipt("req-hang").await.unwrap().is_none());
}

#[tokio::test]
async fn test_injected_failure_is_classified() {
    let (ledger, pool) = seeded().await;
    ledger.faults().inject(
        tx::TRANSFER_BATCH,
        Fault::Fail("peer returned MVCC_READ_CONFLICT for BAT-100".into()),
        1,
    );
    let lease = pool.acquire().await.unwrap();

    let err = lease
        .submit(tx::TRANSFER_BATCH, &transfer_args("proc-1", "req-x"))
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_shutdown_closes_commit_path() {
    let (ledger, pool) = seeded().await;
    ledger.shutdown().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let lease = pool.acquire().await.unwrap();
    let err = lease
        .submit(tx::TRANSFER_BATCH, &transfer_args("proc-1", "req-late"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Concurrency(_)));

    // Reads are served from world state and keep working
    let batch: LedgerBatch = lease
        .evaluate_json(tx::GET_BATCH, &["BAT-100".into()])
        .await
        .unwrap();
    assert_eq!(batch.batch_id, BatchId::new("BAT-100"));
}
