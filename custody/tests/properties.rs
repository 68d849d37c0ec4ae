//! Property tests for the custody engine
//!
//! These tests use proptest to verify:
//! - A batch always has exactly one custodian
//! - Status changes only ever walk the workflow graph
//! - Splits conserve quantity and reject out-of-range quantities untouched
//! - Recalls reject a second recall and reach every descendant
//! - Conflict retries are invisible in the outcome

mod common;

use common::*;
use custody::{
    CustodyEngine, ErrorKind, RecallRequest, ReceiveRequest, RetailReceiveRequest,
    RetailTransferRequest, SaleRequest, TransferMetadata, TransferRequest, Transition,
};
use ledger_gateway::reference::Fault;
use ledger_gateway::{tx, ActorId, ActorRole, BatchId, BatchStatus, GatewayConfig, RecallSeverity};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn recall_request(id: &BatchId, recall_children: bool) -> RecallRequest {
    RecallRequest {
        batch_id: id.clone(),
        initiator: admin(),
        reason: "Listeria found in sample".into(),
        severity: Some(RecallSeverity::High),
        notes: None,
        recall_children,
    }
}

async fn attempt(engine: &CustodyEngine, edge: Transition, id: &BatchId) -> custody::Result<()> {
    match edge {
        Transition::Process => engine.process(process_request(id)).await.map(|_| ()),
        Transition::Complete => engine.complete(complete_request(id)).await.map(|_| ()),
        Transition::Receive => engine
            .receive(ReceiveRequest {
                batch_id: id.clone(),
                distributor: distributor(),
                from_processor_id: None,
                metadata: TransferMetadata::default(),
            })
            .await
            .map(|_| ()),
        Transition::TransferToRetailer => engine
            .transfer_to_retailer(RetailTransferRequest {
                batch_id: id.clone(),
                distributor: distributor(),
                retailer_id: ActorId::new("R1"),
                metadata: TransferMetadata::default(),
            })
            .await
            .map(|_| ()),
        Transition::ReceiveAtRetail => engine
            .receive_at_retail(RetailReceiveRequest {
                batch_id: id.clone(),
                retailer: retailer(),
                notes: None,
            })
            .await
            .map(|_| ()),
        Transition::MarkSold => engine
            .mark_sold(SaleRequest {
                batch_id: id.clone(),
                retailer: retailer(),
                final_customer: None,
                sale_price_per_unit: None,
                notes: None,
            })
            .await
            .map(|_| ()),
    }
}

fn edge_strategy() -> impl Strategy<Value = Transition> {
    prop::sample::select(Transition::ALL.to_vec())
}

fn custodial_actor() -> impl Strategy<Value = custody::Actor> {
    (
        prop::sample::select(vec![
            ActorRole::Farmer,
            ActorRole::Processor,
            ActorRole::Distributor,
            ActorRole::Retailer,
        ]),
        0u8..3,
    )
        .prop_map(|(role, n)| custody::Actor::new(format!("{}-{}", role, n), role))
}

fn legal_successor(from: BatchStatus, to: BatchStatus) -> bool {
    to == BatchStatus::Recalled
        || Transition::ALL
            .iter()
            .any(|edge| edge.from_status() == from && edge.to_status() == to)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Exactly one custodian, tracked through arbitrary hand-overs
    #[test]
    fn prop_single_custodian(hops in prop::collection::vec(custodial_actor(), 1..8)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let h = harness();
            let id = register(&h.engine, "BAT-P1", kg(100)).await;
            let mut holder = farmer();

            for next in hops {
                h.engine
                    .transfer(TransferRequest {
                        batch_id: id.clone(),
                        from: holder.clone(),
                        to_actor_id: next.id.clone(),
                        to_actor_role: next.role,
                        metadata: TransferMetadata::default(),
                    })
                    .await
                    .unwrap();
                holder = next;

                let resolved = h.engine.current_custodian(&id, None).await.unwrap();
                prop_assert_eq!(&resolved.custodian, &holder.custodian());
                prop_assert_eq!(
                    h.mirror.batch(&id).unwrap().current_owner,
                    Some(holder.custodian())
                );
            }
            Ok(())
        })?;
    }

    /// Wrapper transitions succeed exactly on their own edge
    #[test]
    fn prop_status_walk_follows_graph(edges in prop::collection::vec(edge_strategy(), 1..12)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let h = harness();
            let id = register(&h.engine, "BAT-P2", kg(100)).await;

            for edge in edges {
                let before = h.ledger.batch(&id).unwrap();
                match attempt(&h.engine, edge, &id).await {
                    Ok(()) => {
                        prop_assert_eq!(before.status, edge.from_status());
                        prop_assert_eq!(h.ledger.batch(&id).unwrap().status, edge.to_status());
                    }
                    Err(e) => {
                        prop_assert_ne!(before.status, edge.from_status());
                        prop_assert_eq!(e.kind(), ErrorKind::InvalidState);
                        prop_assert_eq!(h.ledger.batch(&id).unwrap(), before);
                    }
                }
            }

            let history = h.engine.status_history(&id).await.unwrap();
            for pair in history.windows(2) {
                prop_assert!(legal_successor(pair[0].status, pair[1].status));
            }
            Ok(())
        })?;
    }

    /// Child plus remaining parent equals the parent before the split
    #[test]
    fn prop_split_conserves_quantity(total in 2i64..10_000, cut in 1i64..10_000) {
        prop_assume!(cut < total);
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let h = harness();
            let id = register(&h.engine, "BAT-P3", kg(total)).await;

            let split = h.engine.split(split_request(&id, farmer(), kg(cut))).await.unwrap();
            prop_assert_eq!(split.child.quantity + split.parent.quantity, kg(total));
            prop_assert!(split.parent.quantity > Decimal::ZERO);
            prop_assert_eq!(
                h.mirror.batch(&split.child.batch_id).unwrap().quantity,
                kg(cut)
            );
            prop_assert_eq!(h.mirror.batch(&id).unwrap().quantity, kg(total - cut));
            Ok(())
        })?;
    }

    /// Out-of-range split quantities leave every store untouched
    #[test]
    fn prop_split_boundary_rejected(
        total in 1i64..10_000,
        over in 0i64..1_000,
        negative in any::<bool>(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let h = harness();
            let id = register(&h.engine, "BAT-P4", kg(total)).await;
            let before = h.ledger.batch(&id).unwrap();
            let quantity = if negative { -kg(over) } else { kg(total + over) };

            let err = h.engine.split(split_request(&id, farmer(), quantity)).await.unwrap_err();
            prop_assert_eq!(err.kind(), ErrorKind::Validation);
            prop_assert_eq!(err.field(), Some("splitQuantity"));
            prop_assert_eq!(h.ledger.batch(&id).unwrap(), before);
            prop_assert_eq!(h.ledger.batch_count(), 1);
            prop_assert_eq!(h.mirror.batch_count(), 1);
            Ok(())
        })?;
    }

    /// Retried conflicts produce the same outcome as a clean first attempt
    #[test]
    fn prop_conflict_retry_is_transparent(conflicts in 0usize..3) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let clean = harness();
            let noisy = harness();
            let clean_id = register(&clean.engine, "BAT-P7", kg(100)).await;
            let noisy_id = register(&noisy.engine, "BAT-P7", kg(100)).await;
            noisy.ledger.faults().inject(tx::TRANSFER_BATCH, Fault::Conflict, conflicts);

            let request = |id: &BatchId| TransferRequest {
                batch_id: id.clone(),
                from: farmer(),
                to_actor_id: ActorId::new("D1"),
                to_actor_role: ActorRole::Distributor,
                metadata: TransferMetadata::default(),
            };
            let a = clean.engine.transfer(request(&clean_id)).await.unwrap();
            let b = noisy.engine.transfer(request(&noisy_id)).await.unwrap();

            prop_assert_eq!(&a.ledger_record.from, &b.ledger_record.from);
            prop_assert_eq!(&a.ledger_record.to, &b.ledger_record.to);
            prop_assert_eq!(a.ledger_record.status_before, b.ledger_record.status_before);
            prop_assert_eq!(a.ledger_record.status_after, b.ledger_record.status_after);
            prop_assert_eq!(&a.mirror, &b.mirror);

            let clean_batch = clean.ledger.batch(&clean_id).unwrap();
            let noisy_batch = noisy.ledger.batch(&noisy_id).unwrap();
            prop_assert_eq!(noisy_batch.ownership_history.len(), 1);
            prop_assert_eq!(clean_batch.status, noisy_batch.status);
            prop_assert_eq!(clean_batch.current_owner, noisy_batch.current_owner);
            prop_assert_eq!(noisy.mirror.transfers(&noisy_id).len(), 1);
            prop_assert_eq!(noisy.engine.metrics().retries_total.get(), conflicts as u64);
            Ok(())
        })?;
    }
}

#[tokio::test]
async fn test_second_recall_rejected_and_first_kept() {
    let h = harness();
    let id = register(&h.engine, "BAT-P5", kg(50)).await;

    h.engine.recall(recall_request(&id, false)).await.unwrap();
    let first = h.ledger.batch(&id).unwrap();
    assert_eq!(first.status, BatchStatus::Recalled);

    let mut again = recall_request(&id, false);
    again.reason = "Different reason".into();
    let err = h.engine.recall(again).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyRecalled);

    let after = h.ledger.batch(&id).unwrap();
    assert_eq!(after, first);
    assert_eq!(after.recall.unwrap().reason, "Listeria found in sample");
}

#[tokio::test]
async fn test_recall_reaches_grandchildren() {
    let h = harness();
    let p = register(&h.engine, "BAT-P6", kg(1000)).await;
    let a = h
        .engine
        .split(split_request(&p, farmer(), kg(300)))
        .await
        .unwrap()
        .child
        .batch_id;
    let b = h
        .engine
        .split(split_request(&p, farmer(), kg(200)))
        .await
        .unwrap()
        .child
        .batch_id;
    let c = h
        .engine
        .split(split_request(&a, farmer(), kg(100)))
        .await
        .unwrap()
        .child
        .batch_id;

    let result = h.engine.recall(recall_request(&p, true)).await.unwrap();
    assert_eq!(result.total_affected_batches, 4);
    assert_eq!(
        result.affected_batch_ids,
        vec![p.clone(), a.clone(), b.clone(), c.clone()]
    );
    for id in [&p, &a, &b, &c] {
        assert_eq!(h.ledger.batch(id).unwrap().status, BatchStatus::Recalled);
    }
    assert_eq!(h.engine.metrics().committed_count("recall_cascade"), 3);
}

#[tokio::test]
async fn test_recall_skips_recalled_descendant_but_visits_its_children() {
    let h = harness();
    let p = register(&h.engine, "BAT-P6B", kg(1000)).await;
    let a = h
        .engine
        .split(split_request(&p, farmer(), kg(300)))
        .await
        .unwrap()
        .child
        .batch_id;
    let c = h
        .engine
        .split(split_request(&a, farmer(), kg(100)))
        .await
        .unwrap()
        .child
        .batch_id;
    h.engine.recall(recall_request(&a, false)).await.unwrap();

    let result = h.engine.recall(recall_request(&p, true)).await.unwrap();
    assert_eq!(result.affected_batch_ids, vec![p, c.clone()]);
    assert_eq!(result.total_affected_batches, 2);
    assert_eq!(h.ledger.batch(&c).unwrap().status, BatchStatus::Recalled);
}

#[tokio::test]
async fn test_recall_without_children_leaves_them() {
    let h = harness();
    let p = register(&h.engine, "BAT-P6C", kg(1000)).await;
    let a = h
        .engine
        .split(split_request(&p, farmer(), kg(300)))
        .await
        .unwrap()
        .child
        .batch_id;

    let result = h.engine.recall(recall_request(&p, false)).await.unwrap();
    assert_eq!(result.total_affected_batches, 1);
    assert_eq!(h.ledger.batch(&a).unwrap().status, BatchStatus::Registered);
}

#[tokio::test]
async fn test_conflicts_beyond_budget_surface() {
    let h = harness_with(fast_retry(3), GatewayConfig::default());
    let id = register(&h.engine, "BAT-P7X", kg(100)).await;
    h.ledger
        .faults()
        .inject(tx::TRANSFER_BATCH, Fault::Conflict, 3);

    let err = h
        .engine
        .transfer(TransferRequest {
            batch_id: id.clone(),
            from: farmer(),
            to_actor_id: ActorId::new("P1"),
            to_actor_role: ActorRole::Processor,
            metadata: TransferMetadata::default(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LedgerConflict);
    assert!(err.is_transient());

    let batch = h.ledger.batch(&id).unwrap();
    assert!(batch.ownership_history.is_empty());
    assert!(h.mirror.transfers(&id).is_empty());
    assert_eq!(h.engine.metrics().conflicts_total.get(), 3);
}

#[tokio::test]
async fn test_lost_response_is_not_applied_twice() {
    let h = harness();
    let id = register(&h.engine, "BAT-P7L", kg(100)).await;
    h.ledger
        .faults()
        .inject(tx::TRANSFER_BATCH, Fault::CommitAndLoseResponse, 1);

    let result = h
        .engine
        .transfer(TransferRequest {
            batch_id: id.clone(),
            from: farmer(),
            to_actor_id: ActorId::new("P1"),
            to_actor_role: ActorRole::Processor,
            metadata: TransferMetadata::default(),
        })
        .await
        .unwrap();
    assert_eq!(result.ledger_record.to.actor_id, ActorId::new("P1"));
    assert_eq!(h.ledger.batch(&id).unwrap().ownership_history.len(), 1);
}
