//! Chain module - the RPC and signing boundary of the engine
//!
//! This module provides:
//! - The [`ChainClient`] trait every chain access goes through
//! - An ethers-based client with multi-RPC failover
//! - The [`TransactionSigner`] capability used for submissions

pub mod provider;
pub mod signer;

pub use provider::EthersChainClient;
pub use signer::{TransactionSigner, WalletSigner};

use crate::error::ChainError;

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::Serialize;

/// Block selector for header lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRef {
    Number(u64),
    Hash(B256),
    Latest,
}

/// The subset of a block header the engine reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: B256,
    pub timestamp: u64,
    pub base_fee_per_gas: Option<U256>,
    pub mix_hash: B256,
}

/// A log entry as emitted in a receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: Option<u64>,
    pub transaction_hash: Option<B256>,
    pub log_index: Option<u64>,
}

/// Mined transaction receipt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub transaction_hash: B256,
    pub block_number: u64,
    pub success: bool,
    pub logs: Vec<LogEntry>,
}

/// Log query; `topics[i] == None` matches anything at position `i`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Option<Address>,
    pub topics: Vec<Option<B256>>,
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
}

impl LogFilter {
    pub fn matches(&self, log: &LogEntry) -> bool {
        if let Some(address) = self.address {
            if log.address != address {
                return false;
            }
        }
        if let Some(block) = log.block_number {
            if self.from_block.is_some_and(|from| block < from)
                || self.to_block.is_some_and(|to| block > to)
            {
                return false;
            }
        }
        self.topics.iter().enumerate().all(|(i, wanted)| match wanted {
            Some(topic) => log.topics.get(i) == Some(topic),
            None => true,
        })
    }
}

/// Read-only call or gas estimation request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Option<Address>,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

/// Transaction the engine wants sent; gas fields left empty are filled by the sender
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxRequest {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub gas_limit: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
}

/// Fully populated EIP-1559 transaction handed to a signer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub chain_id: u64,
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub nonce: u64,
    pub gas_limit: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

/// Read/write access to a single chain's RPC endpoint.
///
/// Implementations are shared across every tracked message, so they must be
/// cheap to call concurrently. Reads are idempotent; the only mutation is
/// [`ChainClient::send_raw_transaction`].
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn chain_id(&self) -> u64;

    async fn get_block_number(&self) -> Result<u64, ChainError>;

    /// Base fee of the latest block
    async fn get_base_fee(&self) -> Result<U256, ChainError>;

    async fn get_gas_price(&self) -> Result<U256, ChainError>;

    async fn get_block(&self, block: BlockRef) -> Result<Option<BlockHeader>, ChainError>;

    async fn get_transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, ChainError>;

    /// Pending nonce of `address`
    async fn get_transaction_count(&self, address: Address) -> Result<u64, ChainError>;

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, ChainError>;

    async fn call(&self, request: &CallRequest) -> Result<Bytes, ChainError>;

    async fn estimate_gas(&self, request: &CallRequest) -> Result<U256, ChainError>;

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, ChainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_at(block: u64, topics: Vec<B256>) -> LogEntry {
        LogEntry {
            address: Address::repeat_byte(0x11),
            topics,
            data: Bytes::new(),
            block_number: Some(block),
            transaction_hash: None,
            log_index: None,
        }
    }

    #[test]
    fn test_log_filter_matching() {
        let topic = B256::repeat_byte(0xaa);
        let other = B256::repeat_byte(0xbb);
        let log = log_at(10, vec![topic, other]);

        let filter = LogFilter {
            address: Some(Address::repeat_byte(0x11)),
            topics: vec![Some(topic), None],
            from_block: Some(5),
            to_block: None,
        };
        assert!(filter.matches(&log));

        let wrong_topic = LogFilter {
            topics: vec![None, Some(topic)],
            ..Default::default()
        };
        assert!(!wrong_topic.matches(&log));

        let out_of_range = LogFilter {
            from_block: Some(11),
            ..Default::default()
        };
        assert!(!out_of_range.matches(&log));
    }
}
