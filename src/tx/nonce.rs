//! Nonce management for reliable transaction submission
//!
//! Handles:
//! - Local nonce tracking per signer and chain
//! - Serializing submissions from the same signer
//! - Resync after the node rejects a nonce

use crate::chain::ChainClient;
use crate::error::ChainError;

use alloy_primitives::Address;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Next nonce to use, `None` until fetched from the chain
type NonceSlot = Arc<Mutex<Option<u64>>>;

/// Manages nonces for every (chain, signer) pair
#[derive(Default)]
pub struct NonceManager {
    slots: DashMap<(u64, Address), NonceSlot>,
}

impl NonceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take exclusive use of `address`'s nonce on `chain_id`.
    ///
    /// Holding the returned lease serializes every other submission from the
    /// same signer on the same chain.
    pub async fn lease(&self, chain_id: u64, address: Address) -> NonceLease {
        // Clone out of the map so no shard lock is held across the await
        let slot = self
            .slots
            .entry((chain_id, address))
            .or_default()
            .value()
            .clone();

        NonceLease {
            chain_id,
            address,
            next: slot.lock_owned().await,
        }
    }
}

/// Exclusive handle on one signer's nonce
pub struct NonceLease {
    chain_id: u64,
    address: Address,
    next: OwnedMutexGuard<Option<u64>>,
}

impl NonceLease {
    /// Nonce for the next transaction; fetches the pending count when unknown
    pub async fn current(&mut self, client: &dyn ChainClient) -> Result<u64, ChainError> {
        if let Some(nonce) = *self.next {
            return Ok(nonce);
        }

        let nonce = client.get_transaction_count(self.address).await?;
        debug!(
            "Synced nonce for {} on chain {}: {}",
            self.address, self.chain_id, nonce
        );
        *self.next = Some(nonce);
        Ok(nonce)
    }

    /// Record that `nonce` was accepted by the node
    pub fn consume(&mut self, nonce: u64) {
        *self.next = Some(nonce + 1);
        debug!(
            "Allocated nonce {} for {} on chain {}",
            nonce, self.address, self.chain_id
        );
    }

    /// Forget the local nonce; the next `current` asks the chain again
    pub fn resync(&mut self) {
        *self.next = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChain;

    #[tokio::test]
    async fn test_lease_fetches_once_then_counts_locally() {
        let manager = NonceManager::new();
        let chain = MockChain::new(1);
        let signer = Address::repeat_byte(0x01);
        chain.set_nonce(signer, 7);

        {
            let mut lease = manager.lease(1, signer).await;
            let nonce = lease.current(&chain).await.unwrap();
            assert_eq!(nonce, 7);
            lease.consume(nonce);
        }

        let queries = chain.query_count();
        let mut lease = manager.lease(1, signer).await;
        assert_eq!(lease.current(&chain).await.unwrap(), 8);
        assert_eq!(chain.query_count(), queries);
    }

    #[tokio::test]
    async fn test_resync_refetches() {
        let manager = NonceManager::new();
        let chain = MockChain::new(1);
        let signer = Address::repeat_byte(0x01);

        let mut lease = manager.lease(1, signer).await;
        let nonce = lease.current(&chain).await.unwrap();
        lease.consume(nonce);
        chain.set_nonce(signer, 12);
        lease.resync();
        assert_eq!(lease.current(&chain).await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_signers_and_chains_are_independent() {
        let manager = NonceManager::new();
        let chain = MockChain::new(1);
        let (a, b) = (Address::repeat_byte(0x0a), Address::repeat_byte(0x0b));
        chain.set_nonce(a, 3);

        // Holding a's lease must not block b's or a's lease on another chain
        let _held = manager.lease(1, a).await;
        let mut other = manager.lease(1, b).await;
        assert_eq!(other.current(&chain).await.unwrap(), 0);
        let mut other_chain = manager.lease(2, a).await;
        assert_eq!(other_chain.current(&chain).await.unwrap(), 3);
    }
}
