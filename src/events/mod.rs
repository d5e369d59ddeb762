//! Bridge event types and parsing
//!
//! Recognizes the handful of logs the engine cares about:
//! - `MessageDelivered` from the L1 bridge
//! - `InboxMessageDelivered` from the L1 inbox
//! - `NodeCreated` from the rollup
//! - `L2ToL1Tx` from ArbSys and `RedeemScheduled` from ArbRetryableTx on L2

use crate::chain::LogEntry;
use crate::config::NetworkConfig;
use crate::contracts::{
    IArbRetryableTx, IArbSys, IBridge, IInbox, IRollup, ARB_RETRYABLE_TX, ARB_SYS,
};
use crate::error::BridgeResult;

use alloy_primitives::{Address, B256};
use alloy_sol_types::SolEvent;
use tracing::trace;

/// Decoded bridge-relevant log
#[derive(Debug, PartialEq, Eq)]
pub enum BridgeEvent {
    MessageDelivered(IBridge::MessageDelivered),
    InboxMessageDelivered(IInbox::InboxMessageDelivered),
    NodeCreated(IRollup::NodeCreated),
    L2ToL1Tx(IArbSys::L2ToL1Tx),
    RedeemScheduled(IArbRetryableTx::RedeemScheduled),
}

impl BridgeEvent {
    /// Get event name for metrics
    pub fn name(&self) -> &'static str {
        match self {
            BridgeEvent::MessageDelivered(_) => "message_delivered",
            BridgeEvent::InboxMessageDelivered(_) => "inbox_message_delivered",
            BridgeEvent::NodeCreated(_) => "node_created",
            BridgeEvent::L2ToL1Tx(_) => "l2_to_l1_tx",
            BridgeEvent::RedeemScheduled(_) => "redeem_scheduled",
        }
    }
}

/// Event parser bound to one rollup deployment
#[derive(Debug, Clone)]
pub struct EventParser {
    bridge: Address,
    inbox: Address,
    rollup: Address,
}

impl EventParser {
    /// Create a new event parser
    pub fn new(network: &NetworkConfig) -> Self {
        Self {
            bridge: network.bridge,
            inbox: network.inbox,
            rollup: network.rollup,
        }
    }

    /// Parse a log entry.
    ///
    /// Returns `Ok(None)` for logs from other contracts or with other
    /// signatures. A recognized signature with undecodable data is an error.
    pub fn parse_log(&self, log: &LogEntry) -> BridgeResult<Option<BridgeEvent>> {
        let Some(topic0) = log.topics.first().copied() else {
            return Ok(None);
        };

        let event = if log.address == self.bridge
            && topic0 == IBridge::MessageDelivered::SIGNATURE_HASH
        {
            BridgeEvent::MessageDelivered(decode(log)?)
        } else if log.address == self.inbox
            && topic0 == IInbox::InboxMessageDelivered::SIGNATURE_HASH
        {
            BridgeEvent::InboxMessageDelivered(decode(log)?)
        } else if log.address == self.rollup && topic0 == IRollup::NodeCreated::SIGNATURE_HASH {
            BridgeEvent::NodeCreated(decode(log)?)
        } else if log.address == ARB_SYS && topic0 == IArbSys::L2ToL1Tx::SIGNATURE_HASH {
            BridgeEvent::L2ToL1Tx(decode(log)?)
        } else if log.address == ARB_RETRYABLE_TX
            && topic0 == IArbRetryableTx::RedeemScheduled::SIGNATURE_HASH
        {
            BridgeEvent::RedeemScheduled(decode(log)?)
        } else {
            trace!("Skipping log from {} with topic {}", log.address, topic0);
            return Ok(None);
        };

        Ok(Some(event))
    }

    /// Parse every recognized log, preserving emission order
    pub fn parse_logs<'a>(
        &self,
        logs: impl IntoIterator<Item = &'a LogEntry>,
    ) -> BridgeResult<Vec<BridgeEvent>> {
        let mut events = Vec::new();
        for log in logs {
            if let Some(event) = self.parse_log(log)? {
                events.push(event);
            }
        }
        Ok(events)
    }
}

fn decode<E: SolEvent>(log: &LogEntry) -> BridgeResult<E> {
    Ok(E::decode_raw_log(log.topics.iter().copied(), &log.data, true)?)
}

/// Topic for an indexed integer parameter
pub fn u256_topic(value: alloy_primitives::U256) -> B256 {
    B256::from(value.to_be_bytes::<32>())
}
