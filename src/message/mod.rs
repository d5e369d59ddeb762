//! Cross-domain message model
//!
//! A [`CrossDomainMessage`] is identified by the transaction that created it
//! and its position among that transaction's messages. Everything else about
//! it, including its status, can be re-derived from chain state.

mod codec;
mod ids;

pub use codec::{MessageCodec, OutboxProof};
pub use ids::{eth_deposit_tx_hash, retryable_ticket_id};

use alloy_primitives::{Address, Bytes, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which way a message crosses the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    L1ToL2,
    L2ToL1,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::L1ToL2 => f.write_str("l1_to_l2"),
            Direction::L2ToL1 => f.write_str("l2_to_l1"),
        }
    }
}

/// Lifecycle of a retryable ticket or ETH deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetryableStatus {
    /// Funded on L1, not yet created on L2
    Submitted,
    /// Created on L2 with a redeem attempt in flight
    AwaitingL2Inclusion,
    Redeemed,
    /// Alive on L2 without a successful redeem; can be redeemed manually
    Failed,
    Expired,
}

/// Lifecycle of an L2 to L1 withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    Unconfirmed,
    Confirmed,
    Executed,
}

/// Status of a message in its direction's state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageStatus {
    L1ToL2(RetryableStatus),
    L2ToL1(WithdrawalStatus),
}

impl MessageStatus {
    pub fn direction(&self) -> Direction {
        match self {
            MessageStatus::L1ToL2(_) => Direction::L1ToL2,
            MessageStatus::L2ToL1(_) => Direction::L2ToL1,
        }
    }

    /// Position in the direction's state order. Terminal states share the last rank.
    pub fn rank(&self) -> u8 {
        match self {
            MessageStatus::L1ToL2(RetryableStatus::Submitted) => 0,
            MessageStatus::L1ToL2(RetryableStatus::AwaitingL2Inclusion) => 1,
            MessageStatus::L1ToL2(_) => 2,
            MessageStatus::L2ToL1(WithdrawalStatus::Unconfirmed) => 0,
            MessageStatus::L2ToL1(WithdrawalStatus::Confirmed) => 1,
            MessageStatus::L2ToL1(WithdrawalStatus::Executed) => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MessageStatus::L1ToL2(
                RetryableStatus::Redeemed | RetryableStatus::Failed | RetryableStatus::Expired
            ) | MessageStatus::L2ToL1(WithdrawalStatus::Executed)
        )
    }

    /// Whether a wait for `target` is over once the message is in this status
    pub fn satisfies(&self, target: &MessageStatus) -> bool {
        self.direction() == target.direction()
            && (self == target || self.is_terminal() || self.rank() > target.rank())
    }

    /// Whether a message already seen in this status may be recorded as `next`.
    ///
    /// Nothing moves backwards. Redeemed and expired tickets stay put; a failed
    /// ticket can still be redeemed by hand or run out its lifetime.
    pub fn can_advance_to(&self, next: &MessageStatus) -> bool {
        if self == next {
            return true;
        }
        match (self, next) {
            (MessageStatus::L1ToL2(RetryableStatus::Redeemed | RetryableStatus::Expired), _) => {
                false
            }
            (MessageStatus::L1ToL2(RetryableStatus::Failed), MessageStatus::L1ToL2(to)) => matches!(
                to,
                RetryableStatus::AwaitingL2Inclusion
                    | RetryableStatus::Redeemed
                    | RetryableStatus::Expired
            ),
            _ => self.direction() == next.direction() && next.rank() >= self.rank(),
        }
    }

    /// Initial status for a freshly decoded message
    pub fn initial(direction: Direction) -> Self {
        match direction {
            Direction::L1ToL2 => MessageStatus::L1ToL2(RetryableStatus::Submitted),
            Direction::L2ToL1 => MessageStatus::L2ToL1(WithdrawalStatus::Unconfirmed),
        }
    }
}

impl From<RetryableStatus> for MessageStatus {
    fn from(status: RetryableStatus) -> Self {
        MessageStatus::L1ToL2(status)
    }
}

impl From<WithdrawalStatus> for MessageStatus {
    fn from(status: WithdrawalStatus) -> Self {
        MessageStatus::L2ToL1(status)
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageStatus::L1ToL2(RetryableStatus::Submitted) => "SUBMITTED",
            MessageStatus::L1ToL2(RetryableStatus::AwaitingL2Inclusion) => {
                "AWAITING_L2_INCLUSION"
            }
            MessageStatus::L1ToL2(RetryableStatus::Redeemed) => "REDEEMED",
            MessageStatus::L1ToL2(RetryableStatus::Failed) => "FAILED",
            MessageStatus::L1ToL2(RetryableStatus::Expired) => "EXPIRED",
            MessageStatus::L2ToL1(WithdrawalStatus::Unconfirmed) => "UNCONFIRMED",
            MessageStatus::L2ToL1(WithdrawalStatus::Confirmed) => "CONFIRMED",
            MessageStatus::L2ToL1(WithdrawalStatus::Executed) => "EXECUTED",
        };
        f.write_str(name)
    }
}

/// What the message does on the destination chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessagePayload {
    pub target: Address,
    pub call_value: U256,
    pub data: Bytes,
}

/// A submit-retryable message as delivered to the inbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryableTicket {
    pub ticket_id: B256,
    pub message_number: U256,
    /// Sender as seen on L2, aliased when the L1 sender is a contract
    pub sender: Address,
    pub l1_base_fee: U256,
    pub destination: Address,
    pub l2_call_value: U256,
    pub l1_value: U256,
    pub max_submission_fee: U256,
    pub excess_fee_refund_address: Address,
    pub call_value_refund_address: Address,
    pub gas_limit: U256,
    pub max_fee_per_gas: U256,
    pub data: Bytes,
}

/// An ETH deposit; executes as its own deterministic L2 transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EthDeposit {
    pub deposit_tx_hash: B256,
    pub message_number: U256,
    pub from: Address,
    pub to: Address,
    pub value: U256,
}

/// An `L2ToL1Tx` emitted by ArbSys
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WithdrawalMessage {
    /// Leaf index in the outbox merkle accumulator
    pub position: u64,
    pub caller: Address,
    pub destination: Address,
    pub hash: U256,
    pub l2_block: u64,
    pub l1_block: u64,
    pub l2_timestamp: u64,
    pub call_value: U256,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageKind {
    Retryable(RetryableTicket),
    EthDeposit(EthDeposit),
    Withdrawal(WithdrawalMessage),
}

/// A message observed crossing the bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrossDomainMessage {
    pub direction: Direction,
    pub origin_tx_hash: B256,
    /// Position among the messages of the origin transaction, in emission order
    pub sequence_index: usize,
    pub payload: MessagePayload,
    pub kind: MessageKind,
    status: MessageStatus,
    /// Transaction that resolved the message on the destination chain, when known
    pub resolution_tx: Option<B256>,
    pub observed_at: DateTime<Utc>,
}

impl CrossDomainMessage {
    pub(crate) fn new(origin_tx_hash: B256, sequence_index: usize, kind: MessageKind) -> Self {
        let (direction, payload) = match &kind {
            MessageKind::Retryable(ticket) => (
                Direction::L1ToL2,
                MessagePayload {
                    target: ticket.destination,
                    call_value: ticket.l2_call_value,
                    data: ticket.data.clone(),
                },
            ),
            MessageKind::EthDeposit(deposit) => (
                Direction::L1ToL2,
                MessagePayload {
                    target: deposit.to,
                    call_value: deposit.value,
                    data: Bytes::new(),
                },
            ),
            MessageKind::Withdrawal(withdrawal) => (
                Direction::L2ToL1,
                MessagePayload {
                    target: withdrawal.destination,
                    call_value: withdrawal.call_value,
                    data: withdrawal.data.clone(),
                },
            ),
        };

        Self {
            direction,
            origin_tx_hash,
            sequence_index,
            payload,
            kind,
            status: MessageStatus::initial(direction),
            resolution_tx: None,
            observed_at: Utc::now(),
        }
    }

    pub fn status(&self) -> MessageStatus {
        self.status
    }

    /// Record a new observation. Only the tracker calls this.
    pub(crate) fn observe(&mut self, status: MessageStatus, resolution_tx: Option<B256>) {
        self.status = status;
        if resolution_tx.is_some() {
            self.resolution_tx = resolution_tx;
        }
        self.observed_at = Utc::now();
    }

    /// Stable identifier, e.g. `l2_to_l1:0xab..#0`
    pub fn key(&self) -> String {
        format!(
            "{}:{}#{}",
            self.direction, self.origin_tx_hash, self.sequence_index
        )
    }

    pub fn as_withdrawal(&self) -> Option<&WithdrawalMessage> {
        match &self.kind {
            MessageKind::Withdrawal(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_retryable(&self) -> Option<&RetryableTicket> {
        match &self.kind {
            MessageKind::Retryable(t) => Some(t),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn withdrawal() -> CrossDomainMessage {
        CrossDomainMessage::new(
            B256::repeat_byte(0xaa),
            2,
            MessageKind::Withdrawal(WithdrawalMessage {
                position: 7,
                caller: Address::repeat_byte(1),
                destination: Address::repeat_byte(2),
                hash: U256::from(1u64),
                l2_block: 100,
                l1_block: 50,
                l2_timestamp: 1_700_000_000,
                call_value: U256::from(10u64),
                data: Bytes::new(),
            }),
        )
    }

    #[test]
    fn test_new_message_starts_at_initial_status() {
        let msg = withdrawal();
        assert_eq!(msg.direction, Direction::L2ToL1);
        assert_eq!(msg.status(), MessageStatus::L2ToL1(WithdrawalStatus::Unconfirmed));
        assert_eq!(msg.payload.call_value, U256::from(10u64));
        assert_eq!(
            msg.key(),
            format!("l2_to_l1:0x{}#2", "aa".repeat(32))
        );
    }

    #[test]
    fn test_satisfies_follows_state_order() {
        let unconfirmed = MessageStatus::L2ToL1(WithdrawalStatus::Unconfirmed);
        let confirmed = MessageStatus::L2ToL1(WithdrawalStatus::Confirmed);
        let executed = MessageStatus::L2ToL1(WithdrawalStatus::Executed);

        assert!(!unconfirmed.satisfies(&confirmed));
        assert!(confirmed.satisfies(&confirmed));
        assert!(executed.satisfies(&confirmed));
        assert!(!confirmed.satisfies(&executed));

        let failed = MessageStatus::L1ToL2(RetryableStatus::Failed);
        let redeemed = MessageStatus::L1ToL2(RetryableStatus::Redeemed);
        // Any terminal status ends a wait
        assert!(failed.satisfies(&redeemed));
        // Never across directions
        assert!(!failed.satisfies(&confirmed));
    }

    #[test]
    fn test_terminal_tickets_never_move() {
        use RetryableStatus::*;
        let status = |s: RetryableStatus| MessageStatus::L1ToL2(s);

        assert!(!status(Expired).can_advance_to(&status(Failed)));
        assert!(!status(Expired).can_advance_to(&status(Redeemed)));
        assert!(!status(Redeemed).can_advance_to(&status(Failed)));
        assert!(!status(Redeemed).can_advance_to(&status(Submitted)));
        assert!(status(Expired).can_advance_to(&status(Expired)));

        // A failed ticket can still be redeemed or lapse
        assert!(status(Failed).can_advance_to(&status(AwaitingL2Inclusion)));
        assert!(status(Failed).can_advance_to(&status(Redeemed)));
        assert!(status(Failed).can_advance_to(&status(Expired)));
        assert!(!status(Failed).can_advance_to(&status(Submitted)));

        assert!(status(Submitted).can_advance_to(&status(Failed)));
        assert!(!status(AwaitingL2Inclusion).can_advance_to(&status(Submitted)));

        let confirmed = MessageStatus::L2ToL1(WithdrawalStatus::Confirmed);
        let unconfirmed = MessageStatus::L2ToL1(WithdrawalStatus::Unconfirmed);
        assert!(!confirmed.can_advance_to(&unconfirmed));
        assert!(unconfirmed.can_advance_to(&confirmed));
        assert!(!unconfirmed.can_advance_to(&status(Submitted)));
    }

    #[test]
    fn test_status_serialization() {
        let status = MessageStatus::L1ToL2(RetryableStatus::AwaitingL2Inclusion);
        assert_eq!(
            serde_json::to_string(&status).unwrap(),
            "\"AWAITING_L2_INCLUSION\""
        );
        assert_eq!(status.to_string(), "AWAITING_L2_INCLUSION");
        assert_eq!(
            serde_json::to_string(&Direction::L1ToL2).unwrap(),
            "\"l1_to_l2\""
        );
    }
}
