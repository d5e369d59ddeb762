//! Gas limit and EIP-1559 fee filling

use crate::chain::{CallRequest, ChainClient, TxRequest};
use crate::config::{ChainConfig, EngineConfig};
use crate::error::ChainError;

use alloy_primitives::{Address, U256};
use tracing::{debug, warn};

const GWEI: u64 = 1_000_000_000;

/// Gas settings for one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasSettings {
    pub gas_limit: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

/// Gas estimator for transactions
#[derive(Debug, Clone)]
pub struct GasEstimator {
    /// Buffer percentage for gas limit (e.g., 20 = 20% buffer)
    gas_limit_buffer_percent: u64,
    max_priority_fee: U256,
    /// Hard cap on `max_fee_per_gas`
    max_gas_price: Option<U256>,
}

impl GasEstimator {
    pub fn new(gas_limit_buffer_percent: u64, max_priority_fee: U256, max_gas_price: Option<U256>) -> Self {
        Self {
            gas_limit_buffer_percent,
            max_priority_fee,
            max_gas_price,
        }
    }

    pub fn from_config(engine: &EngineConfig, chain: &ChainConfig) -> Self {
        Self::new(
            engine.gas_limit_buffer_percent,
            U256::from(engine.max_priority_fee_gwei) * U256::from(GWEI),
            Some(U256::from(chain.max_gas_price_gwei) * U256::from(GWEI)),
        )
    }

    /// Fill the gas fields `request` leaves empty.
    ///
    /// Limits come from `eth_estimateGas` plus the buffer. Fees follow the
    /// usual `2 * base fee + tip` rule, capped at the configured maximum.
    pub async fn fill(
        &self,
        client: &dyn ChainClient,
        from: Address,
        request: &TxRequest,
    ) -> Result<GasSettings, ChainError> {
        let gas_limit = match request.gas_limit {
            Some(limit) => limit,
            None => {
                let estimate = client
                    .estimate_gas(&CallRequest {
                        from: Some(from),
                        to: request.to,
                        value: request.value,
                        data: request.data.clone(),
                    })
                    .await?;
                estimate + estimate * U256::from(self.gas_limit_buffer_percent) / U256::from(100u64)
            }
        };

        let max_fee_per_gas = match request.max_fee_per_gas {
            Some(fee) => fee,
            None => {
                let base_fee = client.get_base_fee().await?;
                let fee = base_fee
                    .saturating_mul(U256::from(2u64))
                    .saturating_add(self.max_priority_fee);
                self.cap(client.chain_id(), fee)
            }
        };

        let settings = GasSettings {
            gas_limit,
            max_fee_per_gas,
            max_priority_fee_per_gas: self.max_priority_fee.min(max_fee_per_gas),
        };
        debug!(
            "Gas for chain {}: limit {} max fee {} tip {}",
            client.chain_id(),
            settings.gas_limit,
            settings.max_fee_per_gas,
            settings.max_priority_fee_per_gas
        );
        Ok(settings)
    }

    fn cap(&self, chain_id: u64, fee: U256) -> U256 {
        match self.max_gas_price {
            Some(max) if fee > max => {
                warn!(
                    "Max fee {} on chain {} exceeds cap {}, capping",
                    fee, chain_id, max
                );
                max
            }
            _ => fee,
        }
    }
}

impl Default for GasEstimator {
    fn default() -> Self {
        Self::new(20, U256::from(2 * GWEI), None)
    }
}
