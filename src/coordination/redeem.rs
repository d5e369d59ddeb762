//! Manual redemption of retryable tickets whose automatic redeem failed

use super::ExecutionReceipt;
use crate::chain::{CallRequest, TxRequest};
use crate::contracts::{IArbRetryableTx, ARB_RETRYABLE_TX};
use crate::error::{BridgeError, BridgeResult};
use crate::fees::{FeeEstimator, GasOverridePolicy};
use crate::message::{CrossDomainMessage, MessageStatus, RetryableStatus};
use crate::metrics;
use crate::tracker::StatusTracker;
use crate::tx::TransactionSender;

use alloy_primitives::{Bytes, U256};
use alloy_sol_types::SolCall;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const REDEEMED: MessageStatus = MessageStatus::L1ToL2(RetryableStatus::Redeemed);

/// Calls `ArbRetryableTx.redeem` for FAILED tickets
pub struct RetryableRedeemer {
    tracker: Arc<StatusTracker>,
    fees: Arc<FeeEstimator>,
    /// Sender on L2
    sender: Arc<TransactionSender>,
    inclusion_timeout: Duration,
}

impl RetryableRedeemer {
    pub fn new(
        tracker: Arc<StatusTracker>,
        fees: Arc<FeeEstimator>,
        sender: Arc<TransactionSender>,
        inclusion_timeout: Duration,
    ) -> Self {
        Self {
            tracker,
            fees,
            sender,
            inclusion_timeout,
        }
    }

    /// Schedule a new redeem of `msg`'s ticket.
    ///
    /// A successful receipt means the retry was scheduled; whether it
    /// succeeded shows up as the ticket moving to REDEEMED.
    pub async fn redeem(
        &self,
        msg: &CrossDomainMessage,
        policy: &GasOverridePolicy,
    ) -> BridgeResult<ExecutionReceipt> {
        let ticket = msg.as_retryable().ok_or_else(|| BridgeError::DirectionMismatch {
            message: msg.key(),
            target: REDEEMED.to_string(),
        })?;

        // Never behind what `msg` already records, so an expired ticket stays expired
        match self.tracker.status(msg).await? {
            MessageStatus::L1ToL2(RetryableStatus::Redeemed) => {
                info!("Ticket {} already redeemed", ticket.ticket_id);
                metrics::record_execution("redeem", "already_executed");
                return Ok(ExecutionReceipt::AlreadyExecuted);
            }
            MessageStatus::L1ToL2(RetryableStatus::Failed) => {}
            other => {
                return Err(BridgeError::InvalidStateTransition {
                    from: other.to_string(),
                    to: REDEEMED.to_string(),
                });
            }
        }

        let data = Bytes::from(
            IArbRetryableTx::redeemCall {
                ticket_id: ticket.ticket_id,
            }
            .abi_encode(),
        );
        let pricing = self
            .fees
            .price_l2_call(
                &CallRequest {
                    from: Some(self.sender.address()),
                    to: ARB_RETRYABLE_TX,
                    value: U256::ZERO,
                    data: data.clone(),
                },
                policy,
            )
            .await?;

        info!(
            "Redeeming ticket {} with gas {} at {}",
            ticket.ticket_id, pricing.gas_limit, pricing.max_fee_per_gas
        );
        let receipt = self
            .sender
            .send_and_confirm(
                &TxRequest {
                    to: ARB_RETRYABLE_TX,
                    value: U256::ZERO,
                    data,
                    gas_limit: Some(pricing.gas_limit),
                    max_fee_per_gas: Some(pricing.max_fee_per_gas),
                },
                self.inclusion_timeout,
            )
            .await?;

        if !receipt.success {
            error!("Redeem of {} reverted in {}", ticket.ticket_id, receipt.transaction_hash);
            metrics::record_execution("redeem", "reverted");
            return Err(BridgeError::ExecutionReverted {
                message: msg.key(),
                reason: format!("redeem {} reverted", receipt.transaction_hash),
            });
        }

        metrics::record_execution("redeem", "submitted");
        Ok(receipt.into())
    }
}
