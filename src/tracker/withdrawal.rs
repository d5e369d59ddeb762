//! Status reads for L2 to L1 withdrawals
//!
//! Confirmation is read, never computed: the rollup's latest confirmed node
//! names an L2 block, and that block's header says how many L2 to L1 sends it
//! contains. A withdrawal at `position` is confirmed once that count exceeds it.

use super::{Observation, OutboxEntry};
use crate::chain::{BlockRef, CallRequest, ChainClient, LogFilter};
use crate::config::NetworkConfig;
use crate::contracts::{IOutbox, IRollup};
use crate::error::ChainError;
use crate::events::u256_topic;
use crate::message::{WithdrawalMessage, WithdrawalStatus};

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolEvent};
use serde::Serialize;
use tracing::trace;

/// The latest send root the rollup has confirmed on L1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConfirmedSendRoot {
    pub node_num: u64,
    pub l2_block_hash: B256,
    pub send_root: B256,
    /// Number of L2 to L1 messages covered by `send_root`
    pub send_count: u64,
}

impl ConfirmedSendRoot {
    pub fn covers(&self, withdrawal: &WithdrawalMessage) -> bool {
        self.send_count > withdrawal.position
    }
}

/// Nitro stores the send count in the first 8 bytes of the mix hash
pub(crate) fn send_count_from_mix_hash(mix_hash: B256) -> u64 {
    let mut count = [0u8; 8];
    count.copy_from_slice(&mix_hash[..8]);
    u64::from_be_bytes(count)
}

async fn read_call<C: SolCall + Send>(
    client: &dyn ChainClient,
    to: Address,
    call: C,
) -> Result<C::Return, ChainError> {
    let output = client
        .call(&CallRequest {
            to,
            data: Bytes::from(call.abi_encode()),
            ..Default::default()
        })
        .await?;
    C::abi_decode_returns(&output, true).map_err(|e| ChainError::InvalidResponse(e.to_string()))
}

/// Read the latest confirmed send root. `None` while only genesis is confirmed.
pub(crate) async fn confirmed_send_root(
    l1: &dyn ChainClient,
    l2: &dyn ChainClient,
    network: &NetworkConfig,
) -> Result<Option<ConfirmedSendRoot>, ChainError> {
    let node_num = read_call(l1, network.rollup, IRollup::latestConfirmedCall {})
        .await?
        .node_num;
    if node_num == 0 {
        return Ok(None);
    }

    let node = read_call(l1, network.rollup, IRollup::getNodeCall { node_num })
        .await?
        .node;

    let filter = LogFilter {
        address: Some(network.rollup),
        topics: vec![
            Some(IRollup::NodeCreated::SIGNATURE_HASH),
            Some(u256_topic(U256::from(node_num))),
        ],
        from_block: Some(node.created_at_block),
        to_block: Some(node.created_at_block),
    };
    let log = l1
        .get_logs(&filter)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| {
            ChainError::InvalidResponse(format!(
                "no NodeCreated log for node {} at block {}",
                node_num, node.created_at_block
            ))
        })?;

    let created = IRollup::NodeCreated::decode_raw_log(log.topics.iter().copied(), &log.data, true)
        .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;
    let [l2_block_hash, send_root] = created.assertion.after_state.global_state.bytes32_vals;

    let block = l2
        .get_block(BlockRef::Hash(l2_block_hash))
        .await?
        .ok_or_else(|| {
            ChainError::InvalidResponse(format!(
                "confirmed L2 block {} is unknown to L2",
                l2_block_hash
            ))
        })?;

    let root = ConfirmedSendRoot {
        node_num,
        l2_block_hash,
        send_root,
        send_count: send_count_from_mix_hash(block.mix_hash),
    };
    trace!(
        "Confirmed node {} covers {} sends",
        root.node_num,
        root.send_count
    );
    Ok(Some(root))
}

pub(crate) async fn is_spent(
    l1: &dyn ChainClient,
    network: &NetworkConfig,
    position: u64,
) -> Result<bool, ChainError> {
    Ok(read_call(
        l1,
        network.outbox,
        IOutbox::isSpentCall {
            index: U256::from(position),
        },
    )
    .await?
    .spent)
}

/// Read the outbox entry of `withdrawal`.
///
/// `isSpent` is only consulted after confirmation was established in the same
/// read, which is what keeps EXECUTED from ever preceding CONFIRMED.
pub(crate) async fn outbox_entry(
    l1: &dyn ChainClient,
    l2: &dyn ChainClient,
    network: &NetworkConfig,
    withdrawal: &WithdrawalMessage,
) -> Result<OutboxEntry, ChainError> {
    let confirmed = confirmed_send_root(l1, l2, network)
        .await?
        .is_some_and(|root| root.covers(withdrawal));

    if !confirmed {
        return Ok(OutboxEntry::new(false, false));
    }

    let executed = is_spent(l1, network, withdrawal.position).await?;
    Ok(OutboxEntry::new(true, executed))
}

pub(crate) async fn withdrawal_status(
    l1: &dyn ChainClient,
    l2: &dyn ChainClient,
    network: &NetworkConfig,
    withdrawal: &WithdrawalMessage,
) -> Result<Observation, ChainError> {
    let entry = outbox_entry(l1, l2, network, withdrawal).await?;
    let status = if entry.executed() {
        WithdrawalStatus::Executed
    } else if entry.confirmed() {
        WithdrawalStatus::Confirmed
    } else {
        WithdrawalStatus::Unconfirmed
    };
    Ok(Observation::new(status))
}
