//! Error types for the cross-domain relayer

use std::fmt;

use thiserror::Error;

/// Errors raised at the RPC boundary by a [`crate::chain::ChainClient`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    #[error("Transport error on chain {chain_id}: {message}")]
    Transport { chain_id: u64, message: String },

    #[error("Execution reverted: {reason}")]
    Reverted { reason: String },

    #[error("Nonce too low: {0}")]
    NonceTooLow(String),

    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),
}

impl ChainError {
    /// Transport failures are the only class worth retrying blindly
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Transport { .. })
    }
}

/// The fee component an estimation failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeField {
    MaxSubmissionCost,
    GasLimit,
    MaxFeePerGas,
    Deposit,
}

impl fmt::Display for FeeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeeField::MaxSubmissionCost => "maxSubmissionCost",
            FeeField::GasLimit => "gasLimit",
            FeeField::MaxFeePerGas => "maxFeePerGas",
            FeeField::Deposit => "deposit",
        };
        f.write_str(name)
    }
}

/// Main error type for the lifecycle engine
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("Fee estimation failed for {field}: {reason}")]
    EstimationFailed { field: FeeField, reason: String },

    #[error("Status polling unavailable for {message} after {errors} errors: {last_error}")]
    PollingUnavailable {
        message: String,
        errors: u32,
        last_error: String,
    },

    #[error("Timeout waiting for {operation}")]
    TimedOut { operation: String },

    #[error("Execution of {message} reverted: {reason}")]
    ExecutionReverted { message: String, reason: String },

    #[error("Outbox proof for {message} has root {actual}, confirmed send root is {expected}")]
    ProofMismatch {
        message: String,
        expected: String,
        actual: String,
    },

    #[error("Status {target} does not apply to {message}")]
    DirectionMismatch { message: String, target: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Transaction {tx_hash} not found")]
    TransactionNotFound { tx_hash: String },

    #[error("Message decoding error: {0}")]
    Codec(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Check if error is retryable by the caller
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::EstimationFailed { .. }
            | BridgeError::PollingUnavailable { .. }
            | BridgeError::TimedOut { .. } => true,
            BridgeError::Chain(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Errors that point at a logic or data problem rather than a flaky network
    pub fn needs_investigation(&self) -> bool {
        matches!(
            self,
            BridgeError::ExecutionReverted { .. }
                | BridgeError::ProofMismatch { .. }
                | BridgeError::Codec(_)
        )
    }
}

impl From<alloy_sol_types::Error> for BridgeError {
    fn from(e: alloy_sol_types::Error) -> Self {
        BridgeError::Codec(e.to_string())
    }
}

/// Result type for engine operations
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let transport = BridgeError::Chain(ChainError::Transport {
            chain_id: 1,
            message: "connection reset".to_string(),
        });
        assert!(transport.is_retryable());

        let reverted = BridgeError::ExecutionReverted {
            message: "l2_to_l1:0x00#0".to_string(),
            reason: "ProofNotFound".to_string(),
        };
        assert!(!reverted.is_retryable());
        assert!(reverted.needs_investigation());

        let estimation = BridgeError::EstimationFailed {
            field: FeeField::GasLimit,
            reason: "zero estimate".to_string(),
        };
        assert!(estimation.is_retryable());
        assert_eq!(
            estimation.to_string(),
            "Fee estimation failed for gasLimit: zero estimate"
        );
    }
}
