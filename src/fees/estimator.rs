//! Fee estimation against live chain data

use super::policy::{
    FeeOverride, GasOverridePolicy, DEFAULT_GAS_LIMIT_PERCENT_INCREASE,
    DEFAULT_GAS_PRICE_PERCENT_INCREASE, DEFAULT_SUBMISSION_FEE_PERCENT_INCREASE,
};
use super::RetryableTicketParams;
use crate::chain::{CallRequest, ChainClient};
use crate::contracts::{INodeInterface, NODE_INTERFACE};
use crate::error::{BridgeError, BridgeResult, ChainError, FeeField};
use crate::metrics;

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use std::sync::Arc;
use tracing::{debug, warn};

/// Fixed per-ticket byte overhead charged by the inbox
const SUBMISSION_BASE_BYTES: u64 = 1400;

/// Per-calldata-byte multiplier charged by the inbox
const SUBMISSION_BYTE_MULTIPLIER: u64 = 6;

/// What a retryable ticket should do on L2
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryableRequest {
    pub from: Address,
    pub to: Address,
    pub l2_call_value: U256,
    pub excess_fee_refund_address: Address,
    pub call_value_refund_address: Address,
    pub data: Bytes,
}

/// Gas parameters for a plain L2 transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L2CallPricing {
    pub gas_limit: U256,
    pub max_fee_per_gas: U256,
}

/// Submission fee the inbox charges to keep `data_len` bytes redeemable.
///
/// Mirrors `Inbox.calculateRetryableSubmissionFee`:
/// `(1400 + 6 * dataLength) * baseFee`.
pub fn submission_fee(data_len: usize, l1_base_fee: U256) -> U256 {
    let bytes = U256::from(SUBMISSION_BASE_BYTES)
        + U256::from(SUBMISSION_BYTE_MULTIPLIER) * U256::from(data_len);
    bytes.saturating_mul(l1_base_fee)
}

/// Prices retryable tickets from L1 and L2 fee data.
///
/// The estimator never retries: every failure is returned to the caller as
/// [`BridgeError::EstimationFailed`] naming the component that failed.
pub struct FeeEstimator {
    l1: Arc<dyn ChainClient>,
    l2: Arc<dyn ChainClient>,
}

impl FeeEstimator {
    pub fn new(l1: Arc<dyn ChainClient>, l2: Arc<dyn ChainClient>) -> Self {
        Self { l1, l2 }
    }

    /// Estimate every ticket parameter, resolving each through `policy`
    pub async fn estimate(
        &self,
        request: &RetryableRequest,
        policy: &GasOverridePolicy,
    ) -> BridgeResult<RetryableTicketParams> {
        let result = self.estimate_inner(request, policy).await;
        metrics::record_fee_estimate(result.is_ok());
        if let Err(e) = &result {
            warn!("Retryable fee estimation to {} failed: {}", request.to, e);
        }
        result
    }

    async fn estimate_inner(
        &self,
        request: &RetryableRequest,
        policy: &GasOverridePolicy,
    ) -> BridgeResult<RetryableTicketParams> {
        let max_submission_cost = self
            .max_submission_cost(request.data.len(), &policy.max_submission_fee)
            .await?;
        let gas_limit = self.gas_limit(request, &policy.gas_limit).await?;
        let max_fee_per_gas = self.max_fee_per_gas(&policy.max_fee_per_gas).await?;

        let params = RetryableTicketParams::new(
            max_submission_cost,
            gas_limit,
            max_fee_per_gas,
            request.l2_call_value,
        )?;

        debug!(
            "Estimated retryable to {}: submission {} gas {} @ {} deposit {}",
            request.to,
            params.max_submission_cost(),
            params.gas_limit(),
            params.max_fee_per_gas(),
            params.deposit()
        );
        Ok(params)
    }

    /// Price a plain L2 transaction such as a manual redeem
    pub async fn price_l2_call(
        &self,
        request: &CallRequest,
        policy: &GasOverridePolicy,
    ) -> BridgeResult<L2CallPricing> {
        let gas_limit = match policy.gas_limit.fixed(DEFAULT_GAS_LIMIT_PERCENT_INCREASE) {
            Some(value) => value,
            None => {
                let estimate = self
                    .l2
                    .estimate_gas(request)
                    .await
                    .map_err(|e| rpc_failure(FeeField::GasLimit, e))?;
                nonzero(FeeField::GasLimit, estimate, "zero gas estimate")?;
                policy
                    .gas_limit
                    .apply(estimate, DEFAULT_GAS_LIMIT_PERCENT_INCREASE)
            }
        };

        let max_fee_per_gas = self.max_fee_per_gas(&policy.max_fee_per_gas).await?;

        Ok(L2CallPricing {
            gas_limit,
            max_fee_per_gas,
        })
    }

    async fn max_submission_cost(&self, data_len: usize, over: &FeeOverride) -> BridgeResult<U256> {
        if let Some(value) = over.fixed(DEFAULT_SUBMISSION_FEE_PERCENT_INCREASE) {
            return Ok(value);
        }

        let base_fee = self
            .l1
            .get_base_fee()
            .await
            .map_err(|e| rpc_failure(FeeField::MaxSubmissionCost, e))?;
        nonzero(FeeField::MaxSubmissionCost, base_fee, "L1 base fee is zero")?;

        Ok(over.apply(
            submission_fee(data_len, base_fee),
            DEFAULT_SUBMISSION_FEE_PERCENT_INCREASE,
        ))
    }

    async fn gas_limit(&self, request: &RetryableRequest, over: &FeeOverride) -> BridgeResult<U256> {
        if let Some(value) = over.fixed(DEFAULT_GAS_LIMIT_PERCENT_INCREASE) {
            return Ok(value);
        }

        // NodeInterface needs a sender deposit large enough to cover the call value
        let sender_deposit = U256::from(10u64)
            .pow(U256::from(18u64))
            .saturating_add(request.l2_call_value);
        let call = INodeInterface::estimateRetryableTicketCall {
            sender: request.from,
            deposit: sender_deposit,
            to: request.to,
            l2_call_value: request.l2_call_value,
            excess_fee_refund_address: request.excess_fee_refund_address,
            call_value_refund_address: request.call_value_refund_address,
            data: request.data.clone(),
        };

        let estimate = self
            .l2
            .estimate_gas(&CallRequest {
                to: NODE_INTERFACE,
                data: Bytes::from(call.abi_encode()),
                ..Default::default()
            })
            .await
            .map_err(|e| rpc_failure(FeeField::GasLimit, e))?;
        nonzero(FeeField::GasLimit, estimate, "zero gas estimate")?;

        Ok(over.apply(estimate, DEFAULT_GAS_LIMIT_PERCENT_INCREASE))
    }

    async fn max_fee_per_gas(&self, over: &FeeOverride) -> BridgeResult<U256> {
        if let Some(value) = over.fixed(DEFAULT_GAS_PRICE_PERCENT_INCREASE) {
            return Ok(value);
        }

        let gas_price = self
            .l2
            .get_gas_price()
            .await
            .map_err(|e| rpc_failure(FeeField::MaxFeePerGas, e))?;
        nonzero(FeeField::MaxFeePerGas, gas_price, "L2 gas price is zero")?;

        Ok(over.apply(gas_price, DEFAULT_GAS_PRICE_PERCENT_INCREASE))
    }
}

fn rpc_failure(field: FeeField, err: ChainError) -> BridgeError {
    BridgeError::EstimationFailed {
        field,
        reason: err.to_string(),
    }
}

fn nonzero(field: FeeField, value: U256, reason: &str) -> BridgeResult<()> {
    if value.is_zero() {
        return Err(BridgeError::EstimationFailed {
            field,
            reason: reason.to_string(),
        });
    }
    Ok(())
}
