//! Chain client with multi-RPC support and automatic failover

use super::{BlockHeader, BlockRef, CallRequest, ChainClient, LogEntry, LogFilter, TxReceipt};
use crate::config::ChainConfig;
use crate::error::{BridgeError, BridgeResult, ChainError};

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use ethers::prelude::{
    BlockId, BlockNumber, Eip1559TransactionRequest, Filter, Http, Middleware, Provider,
    ProviderError, RpcError,
};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{H160, H256};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Multi-provider [`ChainClient`] with automatic failover
pub struct EthersChainClient {
    /// Chain configuration
    config: ChainConfig,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl EthersChainClient {
    /// Create a new client and check the endpoint serves the configured chain
    pub async fn new(config: ChainConfig) -> BridgeResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(100));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for chain {}: {}", config.chain_id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(ChainError::Transport {
                chain_id: config.chain_id,
                message: "No valid RPC providers".to_string(),
            }
            .into());
        }

        let client = Self {
            config,
            http_providers,
            current_provider: AtomicUsize::new(0),
        };

        let remote_chain_id = client
            .with_failover("eth_chainId", |p| async move { p.get_chainid().await })
            .await?;
        if remote_chain_id.as_u64() != client.config.chain_id {
            return Err(BridgeError::Config(format!(
                "RPC for {} reports chain id {}, expected {}",
                client.config.name, remote_chain_id, client.config.chain_id
            )));
        }

        info!(
            "Connected to {} (chain {})",
            client.config.name, client.config.chain_id
        );
        Ok(client)
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.config.chain_id, next);
    }

    /// Health check
    pub async fn health_check(&self) -> bool {
        match self.get_block_number().await {
            Ok(_) => true,
            Err(e) => {
                error!("Health check failed for chain {}: {}", self.config.chain_id, e);
                false
            }
        }
    }

    /// Run `op` against each provider in turn until one answers.
    ///
    /// Only transport failures move on to the next provider; reverts and
    /// nonce errors are answers, not outages.
    async fn with_failover<T, F, Fut>(&self, method: &str, op: F) -> Result<T, ChainError>
    where
        F: Fn(Provider<Http>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut last_error = None;

        for _ in 0..self.http_providers.len() {
            match op(self.http().clone()).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let err = classify(self.config.chain_id, e);
                    if !err.is_transient() {
                        return Err(err);
                    }
                    warn!(
                        "{} failed on chain {}: {}",
                        method, self.config.chain_id, err
                    );
                    last_error = Some(err);
                    self.failover();
                }
            }
        }

        Err(last_error.unwrap_or(ChainError::Transport {
            chain_id: self.config.chain_id,
            message: format!("All providers failed for {}", method),
        }))
    }
}

#[async_trait]
impl ChainClient for EthersChainClient {
    fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    async fn get_block_number(&self) -> Result<u64, ChainError> {
        self.with_failover("eth_blockNumber", |p| async move { p.get_block_number().await })
            .await
            .map(|b| b.as_u64())
    }

    async fn get_base_fee(&self) -> Result<U256, ChainError> {
        let header = self
            .get_block(BlockRef::Latest)
            .await?
            .ok_or_else(|| ChainError::InvalidResponse("No latest block".to_string()))?;

        header
            .base_fee_per_gas
            .ok_or_else(|| ChainError::InvalidResponse("No base fee in block".to_string()))
    }

    async fn get_gas_price(&self) -> Result<U256, ChainError> {
        self.with_failover("eth_gasPrice", |p| async move { p.get_gas_price().await })
            .await
            .map(from_ethers_u256)
    }

    async fn get_block(&self, block: BlockRef) -> Result<Option<BlockHeader>, ChainError> {
        let id: BlockId = match block {
            BlockRef::Number(n) => BlockNumber::Number(n.into()).into(),
            BlockRef::Hash(h) => BlockId::Hash(H256::from(h.0)),
            BlockRef::Latest => BlockNumber::Latest.into(),
        };

        let block = self
            .with_failover("eth_getBlock", |p| async move { p.get_block(id).await })
            .await?;

        Ok(block.and_then(|b| {
            Some(BlockHeader {
                number: b.number?.as_u64(),
                hash: B256::from(b.hash?.0),
                timestamp: b.timestamp.as_u64(),
                base_fee_per_gas: b.base_fee_per_gas.map(from_ethers_u256),
                mix_hash: b.mix_hash.map(|h| B256::from(h.0)).unwrap_or_default(),
            })
        }))
    }

    async fn get_transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, ChainError> {
        let tx_hash = H256::from(hash.0);
        let receipt = self
            .with_failover("eth_getTransactionReceipt", |p| async move {
                p.get_transaction_receipt(tx_hash).await
            })
            .await?;

        // A receipt without a block is still pending
        Ok(receipt.and_then(|r| {
            let block_number = r.block_number?.as_u64();
            Some(TxReceipt {
                transaction_hash: B256::from(r.transaction_hash.0),
                block_number,
                success: r.status.map(|s| s.as_u64() == 1).unwrap_or(false),
                logs: r.logs.into_iter().map(from_ethers_log).collect(),
            })
        }))
    }

    async fn get_transaction_count(&self, address: Address) -> Result<u64, ChainError> {
        let address = to_h160(address);
        self.with_failover("eth_getTransactionCount", |p| async move {
            p.get_transaction_count(address, Some(BlockNumber::Pending.into()))
                .await
        })
        .await
        .map(|n| n.as_u64())
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, ChainError> {
        let mut query = Filter::new();
        if let Some(address) = filter.address {
            query = query.address(to_h160(address));
        }
        for (i, topic) in filter.topics.iter().enumerate() {
            if let Some(topic) = topic {
                let topic = H256::from(topic.0);
                query = match i {
                    0 => query.topic0(topic),
                    1 => query.topic1(topic),
                    2 => query.topic2(topic),
                    3 => query.topic3(topic),
                    _ => query,
                };
            }
        }
        query = match filter.from_block {
            Some(from) => query.from_block(from),
            None => query.from_block(BlockNumber::Earliest),
        };
        query = match filter.to_block {
            Some(to) => query.to_block(to),
            None => query.to_block(BlockNumber::Latest),
        };

        let logs = self
            .with_failover("eth_getLogs", |p| {
                let query = query.clone();
                async move { p.get_logs(&query).await }
            })
            .await?;

        Ok(logs.into_iter().map(from_ethers_log).collect())
    }

    async fn call(&self, request: &CallRequest) -> Result<Bytes, ChainError> {
        let tx = to_typed_transaction(request);
        self.with_failover("eth_call", |p| {
            let tx = tx.clone();
            async move { p.call(&tx, None).await }
        })
        .await
        .map(|b| Bytes::from(b.to_vec()))
    }

    async fn estimate_gas(&self, request: &CallRequest) -> Result<U256, ChainError> {
        let tx = to_typed_transaction(request);
        self.with_failover("eth_estimateGas", |p| {
            let tx = tx.clone();
            async move { p.estimate_gas(&tx, None).await }
        })
        .await
        .map(from_ethers_u256)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, ChainError> {
        let raw = ethers::types::Bytes::from(raw.to_vec());
        self.with_failover("eth_sendRawTransaction", |p| {
            let raw = raw.clone();
            async move { p.send_raw_transaction(raw).await.map(|pending| pending.tx_hash()) }
        })
        .await
        .map(|h| B256::from(h.0))
    }
}

/// Map an ethers provider error onto the engine's error classes
fn classify(chain_id: u64, err: ProviderError) -> ChainError {
    if let Some(response) = err.as_error_response() {
        let message = response.message.clone();
        let lowered = message.to_lowercase();

        if lowered.contains("nonce too low") {
            return ChainError::NonceTooLow(message);
        }
        if response.code == 3 || lowered.contains("revert") {
            let reason = response
                .as_revert_data()
                .and_then(|data| alloy_sol_types::decode_revert_reason(&data))
                .unwrap_or(message);
            return ChainError::Reverted { reason };
        }
        return ChainError::Transport { chain_id, message };
    }

    if err.as_serde_error().is_some() {
        return ChainError::InvalidResponse(err.to_string());
    }

    ChainError::Transport {
        chain_id,
        message: err.to_string(),
    }
}

fn to_typed_transaction(request: &CallRequest) -> TypedTransaction {
    let mut tx = Eip1559TransactionRequest::new()
        .to(to_h160(request.to))
        .value(to_ethers_u256(request.value))
        .data(request.data.to_vec());
    if let Some(from) = request.from {
        tx = tx.from(to_h160(from));
    }
    TypedTransaction::Eip1559(tx)
}

pub(crate) fn to_h160(address: Address) -> H160 {
    H160::from_slice(address.as_slice())
}

pub(crate) fn to_ethers_u256(value: U256) -> ethers::types::U256 {
    ethers::types::U256::from_big_endian(&value.to_be_bytes::<32>())
}

pub(crate) fn from_ethers_u256(value: ethers::types::U256) -> U256 {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    U256::from_be_bytes(buf)
}

fn from_ethers_log(log: ethers::types::Log) -> LogEntry {
    LogEntry {
        address: Address::from(log.address.0),
        topics: log.topics.iter().map(|t| B256::from(t.0)).collect(),
        data: Bytes::from(log.data.to_vec()),
        block_number: log.block_number.map(|b| b.as_u64()),
        transaction_hash: log.transaction_hash.map(|h| B256::from(h.0)),
        log_index: log.log_index.map(|i| i.as_u64()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u256_conversion_roundtrip() {
        let value = U256::from(123_456_789_000_000_000_000u128);
        assert_eq!(from_ethers_u256(to_ethers_u256(value)), value);
        assert_eq!(
            to_ethers_u256(value),
            ethers::types::U256::from(123_456_789_000_000_000_000u128)
        );
    }

    #[test]
    fn test_address_conversion() {
        let address = Address::repeat_byte(0x42);
        assert_eq!(Address::from(to_h160(address).0), address);
    }
}
