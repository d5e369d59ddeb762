//! Caller overrides for retryable fee components

use alloy_primitives::U256;
use serde::Deserialize;

/// Buffer applied to the estimated submission fee when the caller sets none
pub const DEFAULT_SUBMISSION_FEE_PERCENT_INCREASE: u64 = 300;

/// Buffer applied to the L2 gas price when the caller sets none
pub const DEFAULT_GAS_PRICE_PERCENT_INCREASE: u64 = 500;

/// Gas estimates from NodeInterface already include the ticket overhead
pub const DEFAULT_GAS_LIMIT_PERCENT_INCREASE: u64 = 0;

/// Override for a single fee component
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FeeOverride {
    /// Explicit value; skips estimation entirely
    pub base: Option<U256>,
    /// Floor applied to estimated values
    pub min: Option<U256>,
    pub percent_increase: Option<u64>,
}

impl FeeOverride {
    pub fn with_base(base: U256) -> Self {
        Self {
            base: Some(base),
            ..Default::default()
        }
    }

    pub fn with_min(min: U256) -> Self {
        Self {
            min: Some(min),
            ..Default::default()
        }
    }

    /// The resolved value when `base` is set. No estimate is needed in that case.
    pub fn fixed(&self, default_percent: u64) -> Option<U256> {
        self.base
            .map(|base| percent_increase(base, self.percent_increase.unwrap_or(default_percent)))
    }

    /// Resolve a network estimate: buffer it, then clamp up to `min`
    pub fn apply(&self, estimate: U256, default_percent: u64) -> U256 {
        let increased =
            percent_increase(estimate, self.percent_increase.unwrap_or(default_percent));
        match self.min {
            Some(min) => increased.max(min),
            None => increased,
        }
    }
}

/// Per-component overrides for retryable ticket parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GasOverridePolicy {
    pub gas_limit: FeeOverride,
    pub max_submission_fee: FeeOverride,
    pub max_fee_per_gas: FeeOverride,
}

/// `value + value * percent / 100`
pub fn percent_increase(value: U256, percent: u64) -> U256 {
    value.saturating_add(value.saturating_mul(U256::from(percent)) / U256::from(100u64))
}
