//! Coordination of the transactions that start or finish a message's lifecycle
//!
//! The coordinators:
//! 1. Execute confirmed withdrawals through the L1 outbox
//! 2. Re-redeem retryable tickets whose automatic redeem failed
//! 3. Submit new retryables, ETH deposits and ETH withdrawals

pub mod outbox;
pub mod redeem;
pub mod submit;

pub use outbox::OutboxCoordinator;
pub use redeem::RetryableRedeemer;
pub use submit::{MessageSubmitter, Submission};

use crate::chain::{LogEntry, TxReceipt};

use alloy_primitives::B256;
use serde::Serialize;

/// Outcome of finishing a message on its destination chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionReceipt {
    /// Our transaction was mined successfully
    Submitted {
        tx_hash: B256,
        block_number: u64,
        logs: Vec<LogEntry>,
    },
    /// Nothing left to do; no transaction was sent
    AlreadyExecuted,
}

impl From<TxReceipt> for ExecutionReceipt {
    fn from(receipt: TxReceipt) -> Self {
        ExecutionReceipt::Submitted {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            logs: receipt.logs,
        }
    }
}
