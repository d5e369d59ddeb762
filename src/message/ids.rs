//! Deterministic L2 transaction hashes for L1 to L2 messages

use super::RetryableTicket;

use alloy_primitives::{Address, B256, U256};
use ethers::utils::rlp::RlpStream;
use sha3::{Digest, Keccak256};

/// Typed transaction prefix of a submit-retryable transaction
const SUBMIT_RETRYABLE_TX_TYPE: u8 = 0x69;

/// Typed transaction prefix of a deposit transaction
const DEPOSIT_TX_TYPE: u8 = 0x64;

/// Minimal big-endian encoding; zero encodes as the empty string
fn int(value: U256) -> Vec<u8> {
    value.to_be_bytes_trimmed_vec()
}

fn padded(value: U256) -> Vec<u8> {
    value.to_be_bytes::<32>().to_vec()
}

fn addr(address: Address) -> Vec<u8> {
    address.to_vec()
}

fn typed_hash(tx_type: u8, stream: RlpStream) -> B256 {
    let mut hasher = Keccak256::new();
    hasher.update([tx_type]);
    hasher.update(stream.out());
    B256::from_slice(&hasher.finalize())
}

/// Hash of the L2 transaction that creates `ticket`, i.e. its ticket id.
///
/// The `ticket_id` field of `ticket` is ignored.
pub fn retryable_ticket_id(l2_chain_id: u64, ticket: &RetryableTicket) -> B256 {
    let destination = if ticket.destination == Address::ZERO {
        Vec::new()
    } else {
        addr(ticket.destination)
    };

    let mut stream = RlpStream::new_list(13);
    stream
        .append(&int(U256::from(l2_chain_id)))
        .append(&padded(ticket.message_number))
        .append(&addr(ticket.sender))
        .append(&int(ticket.l1_base_fee))
        .append(&int(ticket.l1_value))
        .append(&int(ticket.max_fee_per_gas))
        .append(&int(ticket.gas_limit))
        .append(&destination)
        .append(&int(ticket.l2_call_value))
        .append(&addr(ticket.call_value_refund_address))
        .append(&int(ticket.max_submission_fee))
        .append(&addr(ticket.excess_fee_refund_address))
        .append(&ticket.data.to_vec());

    typed_hash(SUBMIT_RETRYABLE_TX_TYPE, stream)
}

/// Hash of the L2 transaction that credits an ETH deposit
pub fn eth_deposit_tx_hash(
    l2_chain_id: u64,
    message_number: U256,
    from: Address,
    to: Address,
    value: U256,
) -> B256 {
    let mut stream = RlpStream::new_list(5);
    stream
        .append(&int(U256::from(l2_chain_id)))
        .append(&padded(message_number))
        .append(&addr(from))
        .append(&addr(to))
        .append(&int(value));

    typed_hash(DEPOSIT_TX_TYPE, stream)
}
