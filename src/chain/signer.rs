//! Transaction signing capability

use super::UnsignedTransaction;
use crate::chain::provider::{to_ethers_u256, to_h160};
use crate::error::{BridgeError, BridgeResult, ChainError};

use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;
use ethers::prelude::{Eip1559TransactionRequest, LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;

/// Signs fully populated transactions for a single account.
///
/// The engine never holds key material directly; everything that needs to
/// send goes through this trait.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Account the signer signs for
    fn address(&self) -> Address;

    /// Return the RLP encoded, signed transaction ready for broadcast
    async fn sign_transaction(&self, tx: &UnsignedTransaction) -> Result<Bytes, ChainError>;
}

/// Local private key signer
pub struct WalletSigner {
    wallet: LocalWallet,
}

impl WalletSigner {
    /// Build from a hex private key, with or without `0x`
    pub fn from_private_key(key: &str) -> BridgeResult<Self> {
        let wallet = key
            .trim()
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| BridgeError::Wallet(e.to_string()))?;
        Ok(Self { wallet })
    }

    /// Build from the private key stored in environment variable `var`
    pub fn from_env(var: &str) -> BridgeResult<Self> {
        let key = std::env::var(var)
            .map_err(|_| BridgeError::Wallet(format!("environment variable {} is not set", var)))?;
        Self::from_private_key(&key)
    }
}

#[async_trait]
impl TransactionSigner for WalletSigner {
    fn address(&self) -> Address {
        Address::from(self.wallet.address().0)
    }

    async fn sign_transaction(&self, tx: &UnsignedTransaction) -> Result<Bytes, ChainError> {
        let request = Eip1559TransactionRequest::new()
            .from(to_h160(tx.from))
            .to(to_h160(tx.to))
            .value(to_ethers_u256(tx.value))
            .data(tx.data.to_vec())
            .nonce(tx.nonce)
            .gas(to_ethers_u256(tx.gas_limit))
            .max_fee_per_gas(to_ethers_u256(tx.max_fee_per_gas))
            .max_priority_fee_per_gas(to_ethers_u256(tx.max_priority_fee_per_gas))
            .chain_id(tx.chain_id);
        let typed = TypedTransaction::Eip1559(request);

        let signature = self
            .wallet
            .clone()
            .with_chain_id(tx.chain_id)
            .sign_transaction(&typed)
            .await
            .map_err(|e| ChainError::InvalidResponse(format!("signing failed: {}", e)))?;

        Ok(Bytes::from(typed.rlp_signed(&signature).to_vec()))
    }
}
