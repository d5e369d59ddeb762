//! Status reads for L1 to L2 messages

use super::Observation;
use crate::chain::{CallRequest, ChainClient, LogFilter};
use crate::contracts::{IArbRetryableTx, ARB_RETRYABLE_TX};
use crate::error::ChainError;
use crate::message::{EthDeposit, RetryableStatus, RetryableTicket};

use alloy_primitives::{Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolEvent};
use tracing::debug;

/// Derive a retryable ticket's status from L2 state.
///
/// The ticket id is the hash of the L2 transaction that creates the ticket;
/// every redeem attempt after that shows up as a `RedeemScheduled` log.
pub(crate) async fn ticket_status(
    l2: &dyn ChainClient,
    ticket: &RetryableTicket,
) -> Result<Observation, ChainError> {
    let Some(creation) = l2.get_transaction_receipt(ticket.ticket_id).await? else {
        return Ok(Observation::new(RetryableStatus::Submitted));
    };

    if !creation.success {
        debug!("Ticket {} creation reverted", ticket.ticket_id);
        return Ok(Observation::new(RetryableStatus::Failed));
    }

    let filter = LogFilter {
        address: Some(ARB_RETRYABLE_TX),
        topics: vec![
            Some(IArbRetryableTx::RedeemScheduled::SIGNATURE_HASH),
            Some(ticket.ticket_id),
        ],
        from_block: Some(creation.block_number),
        to_block: None,
    };

    let mut retries: Vec<B256> = Vec::new();
    for log in creation.logs.iter().chain(l2.get_logs(&filter).await?.iter()) {
        if !filter.matches(log) {
            continue;
        }
        // topics: signature, ticket id, retry tx hash, sequence number
        if let Some(retry) = log.topics.get(2) {
            if !retries.contains(retry) {
                retries.push(*retry);
            }
        }
    }

    let mut pending = false;
    for retry in &retries {
        match l2.get_transaction_receipt(*retry).await? {
            Some(receipt) if receipt.success => {
                return Ok(Observation::resolved(RetryableStatus::Redeemed, *retry));
            }
            Some(_) => debug!("Redeem {} of ticket {} reverted", retry, ticket.ticket_id),
            None => pending = true,
        }
    }

    if pending {
        return Ok(Observation::new(RetryableStatus::AwaitingL2Inclusion));
    }

    // No successful redeem: the ticket is either still redeemable or gone
    match ticket_timeout(l2, ticket.ticket_id).await? {
        Some(_) => Ok(Observation::new(RetryableStatus::Failed)),
        None => Ok(Observation::new(RetryableStatus::Expired)),
    }
}

/// Deposits execute as their own L2 transaction, so a receipt means done
pub(crate) async fn deposit_status(
    l2: &dyn ChainClient,
    deposit: &EthDeposit,
) -> Result<Observation, ChainError> {
    match l2.get_transaction_receipt(deposit.deposit_tx_hash).await? {
        Some(_) => Ok(Observation::resolved(
            RetryableStatus::Redeemed,
            deposit.deposit_tx_hash,
        )),
        None => Ok(Observation::new(RetryableStatus::Submitted)),
    }
}

/// Expiry timestamp of a live ticket; `None` once the ticket no longer exists
pub(crate) async fn ticket_timeout(
    l2: &dyn ChainClient,
    ticket_id: B256,
) -> Result<Option<U256>, ChainError> {
    let call = IArbRetryableTx::getTimeoutCall { ticket_id };
    let result = l2
        .call(&CallRequest {
            to: ARB_RETRYABLE_TX,
            data: Bytes::from(call.abi_encode()),
            ..Default::default()
        })
        .await;

    match result {
        Ok(output) => {
            let decoded = IArbRetryableTx::getTimeoutCall::abi_decode_returns(&output, true)
                .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;
            Ok(Some(decoded.timeout))
        }
        Err(ChainError::Reverted { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}
