//! Cross-domain relayer - L1/L2 message lifecycle for an optimistic rollup
//!
//! Estimates retryable ticket fees, decodes the messages an origin
//! transaction creates, tracks them to a terminal status and finishes them
//! on the destination chain.

pub mod api;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod coordination;
pub mod error;
pub mod events;
pub mod fees;
pub mod message;
pub mod metrics;
pub mod tracker;
pub mod tx;

#[cfg(test)]
mod testing;

pub use chain::{ChainClient, EthersChainClient, TransactionSigner, WalletSigner};
pub use coordination::{
    ExecutionReceipt, MessageSubmitter, OutboxCoordinator, RetryableRedeemer, Submission,
};
pub use error::{BridgeError, BridgeResult, ChainError};
pub use fees::{FeeEstimator, GasOverridePolicy, RetryableRequest, RetryableTicketParams};
pub use message::{CrossDomainMessage, Direction, MessageCodec, MessageStatus};
pub use tracker::{StatusTracker, WaitOutcome};
