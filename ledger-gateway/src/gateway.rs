//! Ledger gateway contract and scoped connections
//!
//! Callers never hold a process-wide connection. A [`GatewayPool`] is built
//! once and injected; each operation acquires a [`GatewayLease`] for its
//! duration. The lease returns its slot when dropped, on every exit path,
//! including early returns through `?`.

use crate::config::GatewayConfig;
use crate::metrics::GatewayMetrics;
use crate::types::Receipt;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Transaction names understood by the batch chaincode
pub mod tx {
    /// Register a new batch
    pub const CREATE_BATCH: &str = "createBatch";
    /// Read a batch
    pub const GET_BATCH: &str = "getBatch";
    /// Reassign custody
    pub const TRANSFER_BATCH: &str = "transferBatch";
    /// Move a batch along its status graph
    pub const UPDATE_BATCH_STATUS: &str = "updateBatchStatus";
    /// Append a transport record
    pub const ADD_TRANSPORT_RECORD: &str = "addTransportRecord";
    /// Append a distribution record
    pub const ADD_DISTRIBUTION_RECORD: &str = "addDistributionRecord";
    /// Split a child lot from a batch
    pub const SPLIT_BATCH: &str = "splitBatch";
    /// Recall a batch
    pub const RECALL_BATCH: &str = "recallBatch";
    /// Custody transfers of a batch
    pub const GET_OWNERSHIP_HISTORY: &str = "getOwnershipHistory";
    /// Transport legs of a batch
    pub const GET_TRANSPORT_HISTORY: &str = "getTransportHistory";
    /// Processed batches awaiting a distributor
    pub const GET_AVAILABLE_BATCHES_FOR_DISTRIBUTOR: &str = "getAvailableBatchesForDistributor";
    /// Batches held or received by a distributor
    pub const GET_BATCHES_BY_DISTRIBUTOR: &str = "getBatchesByDistributor";
    /// Compare a mirror hash with the ledger's
    pub const VERIFY_BATCH_INTEGRITY: &str = "verifyBatchIntegrity";
    /// Parent and children of a batch
    pub const GET_BATCH_LINEAGE: &str = "getBatchLineage";
    /// Status history of a batch
    pub const GET_BATCH_HISTORY: &str = "getBatchHistory";
    /// Receipt of a committed request
    pub const GET_RECEIPT: &str = "getReceipt";
}

/// Connection to an ordered, append-only ledger.
///
/// `submit` is ordered and strongly consistent within a channel; `evaluate`
/// is a read that any peer may answer. Both return the chaincode's JSON
/// response bytes.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Endorse, order and commit a transaction
    async fn submit(&self, tx_name: &str, args: &[String]) -> Result<Vec<u8>>;

    /// Run a read-only query
    async fn evaluate(&self, tx_name: &str, args: &[String]) -> Result<Vec<u8>>;
}

/// Bounded pool of ledger connections
#[derive(Clone)]
pub struct GatewayPool {
    gateway: Arc<dyn LedgerGateway>,
    permits: Arc<Semaphore>,
    config: GatewayConfig,
    metrics: GatewayMetrics,
}

impl GatewayPool {
    /// Create a pool over a gateway
    pub fn new(gateway: Arc<dyn LedgerGateway>, config: GatewayConfig) -> Result<Self> {
        if config.max_connections == 0 {
            return Err(Error::Config(
                "gateway.max_connections must be at least 1".to_string(),
            ));
        }
        let metrics = GatewayMetrics::new()
            .map_err(|e| Error::Config(format!("Failed to register metrics: {}", e)))?;
        Ok(Self {
            permits: Arc::new(Semaphore::new(config.max_connections)),
            gateway,
            config,
            metrics,
        })
    }

    /// Acquire a lease, waiting at most `acquire_timeout_ms`
    pub async fn acquire(&self) -> Result<GatewayLease> {
        let permit = tokio::time::timeout(
            self.config.acquire_timeout(),
            self.permits.clone().acquire_owned(),
        )
        .await
        .map_err(|_| {
            Error::Unavailable(format!(
                "no ledger connection free after {}ms",
                self.config.acquire_timeout_ms
            ))
        })?
        .map_err(|_| Error::Unavailable("connection pool closed".to_string()))?;

        self.metrics.connections_in_use.inc();
        tracing::trace!(
            available = self.permits.available_permits(),
            "Ledger connection acquired"
        );

        Ok(GatewayLease {
            gateway: self.gateway.clone(),
            config: self.config.clone(),
            metrics: self.metrics.clone(),
            _permit: permit,
        })
    }

    /// Leases that can be acquired without waiting
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Stop handing out leases; held leases stay valid
    pub fn close(&self) {
        self.permits.close();
    }

    /// Round-trip metrics
    pub fn metrics(&self) -> &GatewayMetrics {
        &self.metrics
    }
}

impl fmt::Debug for GatewayPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayPool")
            .field("available", &self.permits.available_permits())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A connection held for the duration of one operation
pub struct GatewayLease {
    gateway: Arc<dyn LedgerGateway>,
    config: GatewayConfig,
    metrics: GatewayMetrics,
    _permit: OwnedSemaphorePermit,
}

impl GatewayLease {
    /// Submit with the configured deadline.
    ///
    /// A deadline overrun yields [`Error::OutcomeUnknown`]: the transaction
    /// may still commit.
    pub async fn submit(&self, tx_name: &str, args: &[String]) -> Result<Vec<u8>> {
        self.metrics.submits_total.inc();
        let start = Instant::now();
        let result =
            match tokio::time::timeout(self.config.submit_timeout(), self.gateway.submit(tx_name, args))
                .await
            {
                Ok(result) => result,
                Err(_) => {
                    self.metrics.timeouts_total.inc();
                    Err(Error::OutcomeUnknown {
                        tx_name: tx_name.to_string(),
                    })
                }
            };
        self.metrics
            .submit_duration
            .observe(start.elapsed().as_secs_f64());

        if let Err(e) = &result {
            if e.is_conflict() {
                self.metrics.conflicts_total.inc();
            }
            tracing::debug!(tx_name, error = %e, "Ledger submit failed");
        } else {
            tracing::debug!(tx_name, "Ledger submit committed");
        }
        result
    }

    /// Evaluate with the configured deadline; overruns fail with [`Error::Timeout`]
    pub async fn evaluate(&self, tx_name: &str, args: &[String]) -> Result<Vec<u8>> {
        self.metrics.evaluates_total.inc();
        match tokio::time::timeout(
            self.config.evaluate_timeout(),
            self.gateway.evaluate(tx_name, args),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                self.metrics.timeouts_total.inc();
                Err(Error::Timeout {
                    tx_name: tx_name.to_string(),
                    elapsed_ms: self.config.evaluate_timeout_ms,
                })
            }
        }
    }

    /// Submit a write tagged with `request_id`, verifying unknown outcomes.
    ///
    /// When the submit times out the receipt for `request_id` is read back.
    /// A receipt means the write committed and its response is returned;
    /// no receipt leaves the outcome unknown.
    pub async fn submit_idempotent(
        &self,
        tx_name: &str,
        args: &[String],
        request_id: &str,
    ) -> Result<Vec<u8>> {
        match self.submit(tx_name, args).await {
            Err(e) if e.is_outcome_unknown() => match self.receipt(request_id).await {
                Ok(Some(receipt)) => {
                    tracing::info!(
                        tx_name,
                        request_id,
                        tx_id = %receipt.tx_id,
                        "Timed-out submit verified as committed"
                    );
                    Ok(serde_json::to_vec(&receipt.response)?)
                }
                Ok(None) => Err(e),
                Err(verify_err) => {
                    tracing::warn!(
                        tx_name,
                        request_id,
                        error = %verify_err,
                        "Could not verify timed-out submit"
                    );
                    Err(e)
                }
            },
            other => other,
        }
    }

    /// Receipt of a committed request, if any
    pub async fn receipt(&self, request_id: &str) -> Result<Option<Receipt>> {
        match self
            .evaluate_json::<Receipt>(crate::gateway::tx::GET_RECEIPT, &[request_id.to_string()])
            .await
        {
            Ok(receipt) => Ok(Some(receipt)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Evaluate and decode a JSON response
    pub async fn evaluate_json<T: DeserializeOwned>(
        &self,
        tx_name: &str,
        args: &[String],
    ) -> Result<T> {
        let bytes = self.evaluate(tx_name, args).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl Drop for GatewayLease {
    fn drop(&mut self) {
        self.metrics.connections_in_use.dec();
        tracing::trace!("Ledger connection released");
    }
}

impl fmt::Debug for GatewayLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayLease")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Gateway that sleeps before answering
    struct SlowGateway {
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LedgerGateway for SlowGateway {
        async fn submit(&self, _tx_name: &str, _args: &[String]) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(b"{}".to_vec())
        }

        async fn evaluate(&self, tx_name: &str, _args: &[String]) -> Result<Vec<u8>> {
            tokio::time::sleep(self.delay).await;
            Err(Error::NotFound(format!("{tx_name}: nothing here")))
        }
    }

    fn pool(delay_ms: u64, config: GatewayConfig) -> GatewayPool {
        let gateway = Arc::new(SlowGateway {
            delay: Duration::from_millis(delay_ms),
            calls: AtomicUsize::new(0),
        });
        GatewayPool::new(gateway, config).unwrap()
    }

    #[tokio::test]
    async fn test_lease_released_on_drop() {
        let pool = pool(0, GatewayConfig {
            max_connections: 2,
            ..Default::default()
        });

        let lease = pool.acquire().await.unwrap();
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.metrics().connections_in_use.get(), 1);
        drop(lease);
        assert_eq!(pool.available(), 2);
        assert_eq!(pool.metrics().connections_in_use.get(), 0);
    }

    #[tokio::test]
    async fn test_lease_released_on_error_path() {
        let pool = pool(0, GatewayConfig {
            max_connections: 1,
            ..Default::default()
        });

        async fn failing(pool: &GatewayPool) -> Result<()> {
            let lease = pool.acquire().await?;
            lease.evaluate("getBatch", &["BAT-404".to_string()]).await?;
            Ok(())
        }

        assert!(failing(&pool).await.is_err());
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn test_acquire_times_out_when_exhausted() {
        let pool = pool(0, GatewayConfig {
            max_connections: 1,
            acquire_timeout_ms: 20,
            ..Default::default()
        });

        let _held = pool.acquire().await.unwrap();
        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_submit_timeout_is_outcome_unknown() {
        let pool = pool(200, GatewayConfig {
            submit_timeout_ms: 10,
            ..Default::default()
        });

        let lease = pool.acquire().await.unwrap();
        let err = lease.submit("transferBatch", &[]).await.unwrap_err();
        assert!(err.is_outcome_unknown());
        assert_eq!(pool.metrics().timeouts_total.get(), 1);
    }

    #[tokio::test]
    async fn test_evaluate_timeout_fails() {
        let pool = pool(200, GatewayConfig {
            evaluate_timeout_ms: 10,
            ..Default::default()
        });

        let lease = pool.acquire().await.unwrap();
        let err = lease.evaluate("getBatch", &[]).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }
}
