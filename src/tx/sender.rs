//! Transaction sender with retry logic and inclusion tracking

use super::gas::GasEstimator;
use super::nonce::NonceManager;
use crate::chain::{ChainClient, TransactionSigner, TxReceipt, TxRequest, UnsignedTransaction};
use crate::config::EngineConfig;
use crate::error::{BridgeError, BridgeResult, ChainError};
use crate::metrics;
use crate::tracker::{Backoff, PollConfig};

use alloy_primitives::{Address, B256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Signs and broadcasts transactions for one signer on one chain
pub struct TransactionSender {
    client: Arc<dyn ChainClient>,
    signer: Arc<dyn TransactionSigner>,
    /// Shared with every other sender of the same signer
    nonces: Arc<NonceManager>,
    gas: GasEstimator,
    max_retries: u32,
    retry_delay: Duration,
    poll: PollConfig,
}

impl TransactionSender {
    pub fn new(
        client: Arc<dyn ChainClient>,
        signer: Arc<dyn TransactionSigner>,
        nonces: Arc<NonceManager>,
        gas: GasEstimator,
        engine: &EngineConfig,
    ) -> Self {
        info!(
            "Transaction sender for {} on chain {}",
            signer.address(),
            client.chain_id()
        );

        Self {
            client,
            signer,
            nonces,
            gas,
            max_retries: engine.max_retries.max(1),
            retry_delay: Duration::from_millis(engine.retry_delay_ms),
            poll: engine.poll_config(),
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.client.chain_id()
    }

    pub fn client(&self) -> &Arc<dyn ChainClient> {
        &self.client
    }

    /// Sign and broadcast `request`, returning its hash.
    ///
    /// The signer's nonce lease is held from allocation until the node accepts
    /// the transaction. Transport errors, including those while fetching the
    /// nonce, are retried with the same nonce; a "nonce too low" rejection
    /// resyncs the nonce first. Anything else is
    /// returned at once.
    pub async fn submit(&self, request: &TxRequest) -> BridgeResult<B256> {
        let chain_id = self.chain_id();
        let from = self.address();
        let gas = self.gas.fill(self.client.as_ref(), from, request).await?;

        let mut lease = self.nonces.lease(chain_id, from).await;
        let mut attempts = 0;
        let mut last_error = None;

        while attempts < self.max_retries {
            attempts += 1;

            let nonce = match lease.current(self.client.as_ref()).await {
                Ok(nonce) => nonce,
                Err(e) if e.is_transient() => {
                    warn!(
                        "Nonce lookup failed on chain {} (attempt {}/{}): {}",
                        chain_id, attempts, self.max_retries, e
                    );
                    last_error = Some(e);
                    if attempts < self.max_retries {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let tx = UnsignedTransaction {
                chain_id,
                from,
                to: request.to,
                value: request.value,
                data: request.data.clone(),
                nonce,
                gas_limit: gas.gas_limit,
                max_fee_per_gas: gas.max_fee_per_gas,
                max_priority_fee_per_gas: gas.max_priority_fee_per_gas,
            };
            let raw = self.signer.sign_transaction(&tx).await?;

            match self.client.send_raw_transaction(raw).await {
                Ok(tx_hash) => {
                    lease.consume(nonce);
                    info!(
                        "Transaction sent: {} nonce {} on chain {} (attempt {}/{})",
                        tx_hash, nonce, chain_id, attempts, self.max_retries
                    );
                    metrics::record_tx_submitted(chain_id);
                    return Ok(tx_hash);
                }
                Err(ChainError::NonceTooLow(message)) => {
                    warn!("Nonce {} too low on chain {}, syncing: {}", nonce, chain_id, message);
                    lease.resync();
                    last_error = Some(ChainError::NonceTooLow(message));
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        "Send failed on chain {} (attempt {}/{}): {}",
                        chain_id, attempts, self.max_retries, e
                    );
                    last_error = Some(e);
                }
                Err(e) => {
                    error!("Transaction to {} rejected on chain {}: {}", request.to, chain_id, e);
                    metrics::record_tx_failed(chain_id);
                    return Err(e.into());
                }
            }

            // Wait before retry
            if attempts < self.max_retries {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        metrics::record_tx_failed(chain_id);
        Err(last_error
            .map(BridgeError::from)
            .unwrap_or_else(|| BridgeError::Internal("send loop made no attempt".to_string())))
    }

    /// Poll for the receipt of `tx_hash` until `timeout` elapses
    pub async fn await_inclusion(&self, tx_hash: B256, timeout: Duration) -> BridgeResult<TxReceipt> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut backoff = Backoff::new(self.poll.initial_interval, self.poll.max_interval);
        let mut errors = 0u32;

        loop {
            match self.client.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    metrics::record_tx_latency(self.chain_id(), started.elapsed().as_secs_f64());
                    debug!(
                        "Transaction {} included in block {} (success: {})",
                        tx_hash, receipt.block_number, receipt.success
                    );
                    return Ok(receipt);
                }
                Ok(None) => {}
                Err(e) if e.is_transient() => {
                    errors += 1;
                    if errors > self.poll.error_budget {
                        return Err(BridgeError::PollingUnavailable {
                            message: tx_hash.to_string(),
                            errors,
                            last_error: e.to_string(),
                        });
                    }
                    warn!("Receipt lookup for {} failed: {}", tx_hash, e);
                }
                Err(e) => return Err(e.into()),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(BridgeError::TimedOut {
                    operation: format!("inclusion of {}", tx_hash),
                });
            }
            tokio::time::sleep(backoff.next_delay().min(deadline - now)).await;
        }
    }

    /// Submit and wait for the receipt. A mined revert is still `Ok`.
    pub async fn send_and_confirm(&self, request: &TxRequest, timeout: Duration) -> BridgeResult<TxReceipt> {
        let tx_hash = self.submit(request).await?;
        self.await_inclusion(tx_hash, timeout).await
    }
}
