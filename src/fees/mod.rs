//! Retryable ticket fee estimation
//!
//! This module provides:
//! - [`RetryableTicketParams`], whose deposit is always derived from its parts
//! - [`GasOverridePolicy`] for caller supplied bases, floors and buffers
//! - [`FeeEstimator`], which prices tickets from live L1/L2 fee data

mod estimator;
mod policy;

pub use estimator::{submission_fee, FeeEstimator, L2CallPricing, RetryableRequest};
pub use policy::{
    percent_increase, FeeOverride, GasOverridePolicy, DEFAULT_GAS_LIMIT_PERCENT_INCREASE,
    DEFAULT_GAS_PRICE_PERCENT_INCREASE, DEFAULT_SUBMISSION_FEE_PERCENT_INCREASE,
};

use crate::error::{BridgeError, BridgeResult, FeeField};

use alloy_primitives::U256;
use serde::Serialize;

/// Cost parameters of a retryable ticket.
///
/// `deposit` has no setter: it is computed once, from the other fields, when
/// the params are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetryableTicketParams {
    max_submission_cost: U256,
    gas_limit: U256,
    max_fee_per_gas: U256,
    l2_call_value: U256,
    deposit: U256,
}

impl RetryableTicketParams {
    /// Build params, deriving
    /// `deposit = max_submission_cost + gas_limit * max_fee_per_gas + l2_call_value`.
    pub fn new(
        max_submission_cost: U256,
        gas_limit: U256,
        max_fee_per_gas: U256,
        l2_call_value: U256,
    ) -> BridgeResult<Self> {
        let deposit = gas_limit
            .checked_mul(max_fee_per_gas)
            .and_then(|execution| execution.checked_add(max_submission_cost))
            .and_then(|total| total.checked_add(l2_call_value))
            .ok_or_else(|| BridgeError::EstimationFailed {
                field: FeeField::Deposit,
                reason: "deposit overflows uint256".to_string(),
            })?;

        Ok(Self {
            max_submission_cost,
            gas_limit,
            max_fee_per_gas,
            l2_call_value,
            deposit,
        })
    }

    pub fn max_submission_cost(&self) -> U256 {
        self.max_submission_cost
    }

    pub fn gas_limit(&self) -> U256 {
        self.gas_limit
    }

    pub fn max_fee_per_gas(&self) -> U256 {
        self.max_fee_per_gas
    }

    pub fn l2_call_value(&self) -> U256 {
        self.l2_call_value
    }

    /// Total L1 value to attach to the ticket creation
    pub fn deposit(&self) -> U256 {
        self.deposit
    }
}
