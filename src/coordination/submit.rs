//! Submission of new cross-domain messages

use crate::chain::{TxReceipt, TxRequest};
use crate::config::NetworkConfig;
use crate::contracts::{IArbSys, IInbox, ARB_SYS};
use crate::error::{BridgeError, BridgeResult};
use crate::fees::{FeeEstimator, GasOverridePolicy, RetryableRequest, RetryableTicketParams};
use crate::message::{CrossDomainMessage, Direction, MessageCodec};
use crate::tx::TransactionSender;

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// A mined origin transaction and the messages it created
#[derive(Debug, Clone)]
pub struct Submission {
    pub receipt: TxReceipt,
    pub messages: Vec<CrossDomainMessage>,
}

/// Creates retryable tickets, ETH deposits and ETH withdrawals
pub struct MessageSubmitter {
    network: NetworkConfig,
    codec: MessageCodec,
    fees: Arc<FeeEstimator>,
    l1: Arc<TransactionSender>,
    l2: Arc<TransactionSender>,
    inclusion_timeout: Duration,
}

impl MessageSubmitter {
    pub fn new(
        network: NetworkConfig,
        fees: Arc<FeeEstimator>,
        l1: Arc<TransactionSender>,
        l2: Arc<TransactionSender>,
        inclusion_timeout: Duration,
    ) -> Self {
        let codec = MessageCodec::new(&network);
        Self {
            network,
            codec,
            fees,
            l1,
            l2,
            inclusion_timeout,
        }
    }

    /// Price a retryable ticket and encode the inbox call that creates it,
    /// without sending anything. Send the bytes to the inbox with a value of
    /// exactly `params.deposit()`.
    pub async fn retryable_calldata(
        &self,
        request: &RetryableRequest,
        policy: &GasOverridePolicy,
    ) -> BridgeResult<(RetryableTicketParams, Bytes)> {
        let params = self.fees.estimate(request, policy).await?;

        let call = IInbox::createRetryableTicketCall {
            to: request.to,
            l2_call_value: request.l2_call_value,
            max_submission_cost: params.max_submission_cost(),
            excess_fee_refund_address: request.excess_fee_refund_address,
            call_value_refund_address: request.call_value_refund_address,
            gas_limit: params.gas_limit(),
            max_fee_per_gas: params.max_fee_per_gas(),
            data: request.data.clone(),
        };

        Ok((params, Bytes::from(call.abi_encode())))
    }

    /// Price and submit a retryable ticket, funding it with exactly `deposit`
    pub async fn create_retryable(
        &self,
        request: &RetryableRequest,
        policy: &GasOverridePolicy,
    ) -> BridgeResult<(RetryableTicketParams, Submission)> {
        let (params, data) = self.retryable_calldata(request, policy).await?;

        info!(
            "Creating retryable to {} with deposit {}",
            request.to,
            params.deposit()
        );
        let submission = self
            .send(
                &self.l1,
                self.network.inbox,
                params.deposit(),
                data,
                Direction::L1ToL2,
            )
            .await?;

        Ok((params, submission))
    }

    /// Deposit `amount` ETH to the sender's own address on L2
    pub async fn deposit_eth(&self, amount: U256) -> BridgeResult<Submission> {
        info!("Depositing {} wei to L2", amount);
        self.send(
            &self.l1,
            self.network.inbox,
            amount,
            Bytes::from(IInbox::depositEthCall {}.abi_encode()),
            Direction::L1ToL2,
        )
        .await
    }

    /// Start withdrawing `amount` ETH from L2 to `destination` on L1
    pub async fn withdraw_eth(&self, destination: Address, amount: U256) -> BridgeResult<Submission> {
        info!("Withdrawing {} wei to {}", amount, destination);
        self.send(
            &self.l2,
            ARB_SYS,
            amount,
            Bytes::from(IArbSys::withdrawEthCall { destination }.abi_encode()),
            Direction::L2ToL1,
        )
        .await
    }

    async fn send(
        &self,
        sender: &TransactionSender,
        to: Address,
        value: U256,
        data: Bytes,
        direction: Direction,
    ) -> BridgeResult<Submission> {
        let receipt = sender
            .send_and_confirm(
                &TxRequest {
                    to,
                    value,
                    data,
                    ..Default::default()
                },
                self.inclusion_timeout,
            )
            .await?;

        if !receipt.success {
            error!("Origin transaction {} reverted", receipt.transaction_hash);
            return Err(BridgeError::ExecutionReverted {
                message: format!("{}:{}", direction, receipt.transaction_hash),
                reason: format!("call to {} reverted", to),
            });
        }

        let messages = self.codec.decode(&receipt, direction)?;
        info!(
            "Origin tx {} created {} message(s)",
            receipt.transaction_hash,
            messages.len()
        );
        Ok(Submission { receipt, messages })
    }
}
