use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, B256, Bytes, TxHash, keccak256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use ciro_common::error::AppError;
use parking_lot::Mutex;

use crate::rate_limiter::RateLimiter;

/// Distinguishes retriable RPC failures from ones that should surface
/// immediately (§4.1: timeouts/429/5xx/connection-reset retry; malformed
/// requests and "block not found past finality" do not).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcErrorKind {
    Transient,
    Permanent,
}

fn classify(err: &alloy::transports::RpcError<alloy::transports::TransportErrorKind>) -> RpcErrorKind {
    use alloy::transports::TransportErrorKind as K;
    match err {
        alloy::transports::RpcError::Transport(
            K::Custom(_) | K::BackendGone | K::HttpError(_) | K::MissingBatchResponse(_),
        ) => RpcErrorKind::Transient,
        _ => RpcErrorKind::Permanent,
    }
}

/// Standalone RPC client wrapping `alloy`'s provider, used by both the
/// indexer (reads) and the job distributor (refund transactions writes) —
/// promoted out of the poller because more than one caller needs `call`
/// and `submit_transaction`.
///
/// Never caches mutable chain state (§4.1): every method call reaches the
/// underlying provider. The only adapter-local state is the rate limiter
/// bucket and the idempotency-key dedup set for submitted transactions.
pub struct RpcAdapter {
    primary: Box<dyn Provider>,
    fallback: Option<Box<dyn Provider>>,
    rate_limiter: RateLimiter,
    max_retries: u32,
    base_backoff: Duration,
    max_backoff: Duration,
    submitted: Arc<Mutex<HashSet<B256>>>,
}

impl RpcAdapter {
    pub fn new(
        rpc_url: &str,
        fallback_url: Option<&str>,
        max_retries: u32,
        base_backoff_ms: u64,
        max_backoff_ms: u64,
        rate_limit_per_sec: u32,
    ) -> anyhow::Result<Self> {
        let primary = Box::new(ProviderBuilder::new().connect_http(rpc_url.parse()?)) as Box<dyn Provider>;
        let fallback = fallback_url
            .map(|url| -> anyhow::Result<Box<dyn Provider>> {
                Ok(Box::new(ProviderBuilder::new().connect_http(url.parse()?)))
            })
            .transpose()?;

        Ok(Self {
            primary,
            fallback,
            rate_limiter: RateLimiter::new(rate_limit_per_sec),
            max_retries,
            base_backoff: Duration::from_millis(base_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms),
            submitted: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    /// Runs `op` against the primary provider with exponential backoff on
    /// transient failure, falling back to the secondary endpoint (if
    /// configured) once retries on the primary are exhausted.
    async fn with_retry<F, Fut, T>(&self, op: F) -> Result<T, AppError>
    where
        F: Fn(&dyn Provider) -> Fut,
        Fut: std::future::Future<Output = Result<T, alloy::transports::RpcError<alloy::transports::TransportErrorKind>>>,
    {
        self.rate_limiter.acquire().await;

        let mut delay = self.base_backoff;
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            match op(self.primary.as_ref()).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let kind = classify(&err);
                    if kind == RpcErrorKind::Permanent {
                        return Err(AppError::Input(format!("rpc call failed: {err}")));
                    }
                    tracing::warn!(attempt, error = %err, "transient rpc error, retrying");
                    last_err = Some(err);
                    if attempt < self.max_retries {
                        tokio::time::sleep(delay).await;
                        delay = (delay * 2).min(self.max_backoff);
                    }
                }
            }
        }

        if let Some(fallback) = &self.fallback {
            tracing::warn!("primary rpc exhausted retries, trying fallback endpoint");
            if let Ok(value) = op(fallback.as_ref()).await {
                return Ok(value);
            }
        }

        Err(AppError::Transient {
            message: format!(
                "rpc call failed after {} retries: {}",
                self.max_retries,
                last_err.map(|e| e.to_string()).unwrap_or_default()
            ),
            retry_after: Some(self.max_backoff),
        })
    }

    pub async fn latest_block_number(&self) -> Result<u64, AppError> {
        self.with_retry(|p| async move { p.get_block_number().await }).await
    }

    pub async fn block_by_number(
        &self,
        number: u64,
    ) -> Result<alloy::rpc::types::Block, AppError> {
        self.with_retry(|p| async move { p.get_block_by_number(number.into()).await })
            .await?
            .ok_or_else(|| AppError::Input(format!("block {number} not found")))
    }

    pub async fn events_in_range(
        &self,
        contracts: &[Address],
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, AppError> {
        let mut filter = Filter::new().from_block(from_block).to_block(to_block);
        if !contracts.is_empty() {
            filter = filter.address(contracts.to_vec());
        }
        self.with_retry(move |p| {
            let filter = filter.clone();
            async move { p.get_logs(&filter).await }
        })
        .await
    }

    pub async fn call(&self, contract: Address, calldata: Bytes) -> Result<Bytes, AppError> {
        let tx = TransactionRequest::default()
            .with_to(contract)
            .with_input(calldata);
        self.with_retry(move |p| {
            let tx = tx.clone();
            async move { p.call(tx).await }
        })
        .await
    }

    /// Submits a signed transaction, keyed by a caller-supplied idempotency
    /// key (nonce + content hash of the payload) so a retry after an
    /// uncertain network failure does not double-submit (Design Notes §9).
    pub async fn submit_transaction(
        &self,
        signed_payload: Bytes,
        idempotency_key: B256,
    ) -> Result<TxHash, AppError> {
        {
            let mut seen = self.submitted.lock();
            if !seen.insert(idempotency_key) {
                return Err(AppError::Consistency(format!(
                    "transaction with idempotency key {idempotency_key:#x} already submitted"
                )));
            }
        }

        let result = self
            .with_retry(move |p| {
                let payload = signed_payload.clone();
                async move {
                    p.send_raw_transaction(&payload)
                        .await
                        .map(|pending| *pending.tx_hash())
                }
            })
            .await;

        if result.is_err() {
            self.submitted.lock().remove(&idempotency_key);
        }

        result
    }

    /// Computes the idempotency key for a submission from its nonce and
    /// payload content hash.
    pub fn idempotency_key(nonce: u64, payload: &[u8]) -> B256 {
        let mut buf = Vec::with_capacity(8 + payload.len());
        buf.extend_from_slice(&nonce.to_be_bytes());
        buf.extend_from_slice(payload);
        keccak256(buf)
    }
}
