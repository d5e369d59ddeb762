//! Withdrawal execution through the L1 outbox
//!
//! Execution is confirm-then-execute: nothing is sent until the tracker has
//! observed a confirmed send root covering the withdrawal, the proof L2 hands
//! back matches that root, and an `eth_call` of the execution succeeds.

use super::ExecutionReceipt;
use crate::chain::{CallRequest, TxRequest};
use crate::contracts::IOutbox;
use crate::error::{BridgeError, BridgeResult, ChainError};
use crate::message::{CrossDomainMessage, MessageCodec, MessageStatus, WithdrawalMessage, WithdrawalStatus};
use crate::metrics;
use crate::tracker::{StatusTracker, WaitOutcome};
use crate::tx::TransactionSender;

use alloy_primitives::{Bytes, U256};
use alloy_sol_types::SolCall;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

const CONFIRMED: MessageStatus = MessageStatus::L2ToL1(WithdrawalStatus::Confirmed);
const EXECUTED: MessageStatus = MessageStatus::L2ToL1(WithdrawalStatus::Executed);

/// Executes L2 to L1 withdrawals once the rollup has confirmed them
pub struct OutboxCoordinator {
    tracker: Arc<StatusTracker>,
    codec: MessageCodec,
    /// Sender on L1
    sender: Arc<TransactionSender>,
    inclusion_timeout: Duration,
    /// One in-flight execution per message key
    executions: DashMap<String, Arc<Mutex<()>>>,
}

impl OutboxCoordinator {
    pub fn new(
        tracker: Arc<StatusTracker>,
        sender: Arc<TransactionSender>,
        inclusion_timeout: Duration,
    ) -> Self {
        let codec = MessageCodec::new(tracker.network());
        Self {
            tracker,
            codec,
            sender,
            inclusion_timeout,
            executions: DashMap::new(),
        }
    }

    /// Execute `msg` on L1, waiting up to `confirm_timeout` for confirmation.
    ///
    /// Executing an already executed withdrawal is a no-op success. Reverts
    /// are reported, never retried. Concurrent calls for the same message run
    /// one after the other, so only the first one sends.
    pub async fn execute(
        &self,
        msg: &CrossDomainMessage,
        confirm_timeout: Duration,
    ) -> BridgeResult<ExecutionReceipt> {
        let withdrawal = msg
            .as_withdrawal()
            .ok_or_else(|| BridgeError::DirectionMismatch {
                message: msg.key(),
                target: EXECUTED.to_string(),
            })?;

        let key = msg.key();
        // Clone out of the map so no shard lock is held across the await
        let slot = self.executions.entry(key.clone()).or_default().value().clone();
        let _running = slot.lock().await;

        let status = self.tracker.status(msg).await?;
        if status == EXECUTED {
            return Ok(self.already_executed(msg));
        }

        if status != CONFIRMED {
            info!(
                "Waiting for {} to be confirmed (expected around L1 block {:?})",
                msg.key(),
                self.tracker.estimated_confirmation_block(msg)
            );
            match self.tracker.await_status(msg, CONFIRMED, confirm_timeout).await? {
                WaitOutcome::Reached(snapshot) if snapshot.status() == EXECUTED => {
                    return Ok(self.already_executed(msg));
                }
                WaitOutcome::Reached(_) => {}
                WaitOutcome::TimedOut { last } => {
                    debug!("{} still {:?} after {:?}", msg.key(), last, confirm_timeout);
                    return Err(BridgeError::TimedOut {
                        operation: format!("confirmation of {}", msg.key()),
                    });
                }
            }
        }

        let root = self
            .tracker
            .confirmed_send_root()
            .await?
            .filter(|root| root.covers(withdrawal))
            .ok_or_else(|| BridgeError::InvalidStateTransition {
                from: status.to_string(),
                to: EXECUTED.to_string(),
            })?;

        let proof = self
            .tracker
            .with_retry(&key, || {
                self.codec
                    .outbox_proof(self.tracker.l2().as_ref(), withdrawal, root.send_count)
            })
            .await?;
        if proof.root != root.send_root {
            error!(
                "Proof root {} for {} does not match confirmed send root {}",
                proof.root,
                msg.key(),
                root.send_root
            );
            return Err(BridgeError::ProofMismatch {
                message: msg.key(),
                expected: root.send_root.to_string(),
                actual: proof.root.to_string(),
            });
        }

        let data = Bytes::from(
            IOutbox::executeTransactionCall {
                proof: proof.proof,
                index: U256::from(withdrawal.position),
                l2_sender: withdrawal.caller,
                to: withdrawal.destination,
                l2_block: U256::from(withdrawal.l2_block),
                l1_block: U256::from(withdrawal.l1_block),
                l2_timestamp: U256::from(withdrawal.l2_timestamp),
                value: withdrawal.call_value,
                data: withdrawal.data.clone(),
            }
            .abi_encode(),
        );
        let outbox = self.tracker.network().outbox;

        // Simulate first so a doomed execution costs nothing
        let simulation = CallRequest {
            from: Some(self.sender.address()),
            to: outbox,
            value: U256::ZERO,
            data: data.clone(),
        };
        match self
            .tracker
            .with_retry(&key, || self.tracker.l1().call(&simulation))
            .await
        {
            Ok(_) => {}
            Err(BridgeError::Chain(ChainError::Reverted { reason })) => {
                return self.on_revert(msg, withdrawal, reason).await;
            }
            Err(e) => return Err(e),
        }

        let receipt = self
            .sender
            .send_and_confirm(
                &TxRequest {
                    to: outbox,
                    data,
                    ..Default::default()
                },
                self.inclusion_timeout,
            )
            .await?;

        if !receipt.success {
            let reason = format!("transaction {} reverted", receipt.transaction_hash);
            return self.on_revert(msg, withdrawal, reason).await;
        }

        info!(
            "Executed {} in L1 tx {} (block {})",
            msg.key(),
            receipt.transaction_hash,
            receipt.block_number
        );
        metrics::record_execution("withdrawal", "submitted");
        Ok(receipt.into())
    }

    /// A revert is only a failure if the leaf is still unspent
    async fn on_revert(
        &self,
        msg: &CrossDomainMessage,
        withdrawal: &WithdrawalMessage,
        reason: String,
    ) -> BridgeResult<ExecutionReceipt> {
        match self.tracker.is_spent(withdrawal.position).await {
            Ok(true) => return Ok(self.already_executed(msg)),
            Ok(false) => {}
            Err(e) => warn!("Cannot tell whether {} was executed elsewhere: {}", msg.key(), e),
        }

        error!("Execution of {} reverted: {}", msg.key(), reason);
        metrics::record_execution("withdrawal", "reverted");
        Err(BridgeError::ExecutionReverted {
            message: msg.key(),
            reason,
        })
    }

    fn already_executed(&self, msg: &CrossDomainMessage) -> ExecutionReceipt {
        info!("{} already executed, nothing to send", msg.key());
        metrics::record_execution("withdrawal", "already_executed");
        ExecutionReceipt::AlreadyExecuted
    }
}
