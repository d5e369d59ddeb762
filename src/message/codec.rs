//! Receipt decoding and outbox proof lookup

use super::{
    eth_deposit_tx_hash, retryable_ticket_id, CrossDomainMessage, Direction, EthDeposit,
    MessageKind, RetryableTicket, WithdrawalMessage,
};
use crate::chain::{CallRequest, ChainClient, TxReceipt};
use crate::config::NetworkConfig;
use crate::contracts::{
    IArbSys, IBridge, INodeInterface, L1_MESSAGE_TYPE_ETH_DEPOSIT,
    L1_MESSAGE_TYPE_SUBMIT_RETRYABLE, NODE_INTERFACE,
};
use crate::error::{BridgeError, BridgeResult};
use crate::events::{BridgeEvent, EventParser};

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use std::collections::HashMap;
use tracing::debug;

/// Number of fixed 32-byte words ahead of the calldata in a retryable message
const RETRYABLE_HEADER_WORDS: usize = 9;

/// Merkle proof that a withdrawal is part of a send root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxProof {
    /// Leaf hash
    pub send: B256,
    pub root: B256,
    pub proof: Vec<B256>,
}

/// Turns receipts into [`CrossDomainMessage`]s for one rollup deployment
#[derive(Debug, Clone)]
pub struct MessageCodec {
    l2_chain_id: u64,
    parser: EventParser,
}

impl MessageCodec {
    pub fn new(network: &NetworkConfig) -> Self {
        Self {
            l2_chain_id: network.l2_chain_id,
            parser: EventParser::new(network),
        }
    }

    /// Extract the messages `receipt` created, in emission order.
    ///
    /// A receipt without messages yields an empty vector.
    pub fn decode(
        &self,
        receipt: &TxReceipt,
        direction: Direction,
    ) -> BridgeResult<Vec<CrossDomainMessage>> {
        let events = self.parser.parse_logs(&receipt.logs)?;

        let kinds = match direction {
            Direction::L1ToL2 => self.decode_inbox_messages(events)?,
            Direction::L2ToL1 => events
                .into_iter()
                .filter_map(|event| match event {
                    BridgeEvent::L2ToL1Tx(ev) => Some(withdrawal_from_event(ev)),
                    _ => None,
                })
                .collect::<BridgeResult<Vec<_>>>()?,
        };

        let messages: Vec<_> = kinds
            .into_iter()
            .enumerate()
            .map(|(index, kind)| CrossDomainMessage::new(receipt.transaction_hash, index, kind))
            .collect();

        debug!(
            "Decoded {} {} message(s) from {}",
            messages.len(),
            direction,
            receipt.transaction_hash
        );
        Ok(messages)
    }

    /// Fetch the receipt of `tx_hash` and decode it
    pub async fn messages_from_tx(
        &self,
        client: &dyn ChainClient,
        tx_hash: B256,
        direction: Direction,
    ) -> BridgeResult<Vec<CrossDomainMessage>> {
        let receipt = client
            .get_transaction_receipt(tx_hash)
            .await?
            .ok_or_else(|| BridgeError::TransactionNotFound {
                tx_hash: tx_hash.to_string(),
            })?;

        self.decode(&receipt, direction)
    }

    /// Ask L2 for the merkle proof of `withdrawal` against the outbox state
    /// after `send_count` sends.
    ///
    /// Only meaningful once a send root covering the withdrawal is confirmed.
    pub async fn outbox_proof(
        &self,
        l2: &dyn ChainClient,
        withdrawal: &WithdrawalMessage,
        send_count: u64,
    ) -> BridgeResult<OutboxProof> {
        let call = INodeInterface::constructOutboxProofCall {
            size: send_count,
            leaf: withdrawal.position,
        };
        let output = l2
            .call(&CallRequest {
                to: NODE_INTERFACE,
                data: Bytes::from(call.abi_encode()),
                ..Default::default()
            })
            .await?;

        let decoded = INodeInterface::constructOutboxProofCall::abi_decode_returns(&output, true)?;
        let expected_leaf = B256::from(withdrawal.hash.to_be_bytes::<32>());
        if decoded.send != expected_leaf {
            return Err(BridgeError::Codec(format!(
                "proof leaf {} does not match withdrawal hash {}",
                decoded.send, expected_leaf
            )));
        }

        Ok(OutboxProof {
            send: decoded.send,
            root: decoded.root,
            proof: decoded.proof,
        })
    }

    fn decode_inbox_messages(&self, events: Vec<BridgeEvent>) -> BridgeResult<Vec<MessageKind>> {
        let mut delivered: Vec<IBridge::MessageDelivered> = Vec::new();
        let mut inbox_data: HashMap<U256, Bytes> = HashMap::new();

        for event in events {
            match event {
                BridgeEvent::MessageDelivered(ev) => delivered.push(ev),
                BridgeEvent::InboxMessageDelivered(ev) => {
                    inbox_data.insert(ev.message_num, ev.data);
                }
                _ => {}
            }
        }

        let mut kinds = Vec::new();
        for ev in delivered {
            if ev.kind != L1_MESSAGE_TYPE_SUBMIT_RETRYABLE && ev.kind != L1_MESSAGE_TYPE_ETH_DEPOSIT
            {
                debug!("Skipping inbox message {} of kind {}", ev.message_index, ev.kind);
                continue;
            }

            let data = inbox_data.get(&ev.message_index).ok_or_else(|| {
                BridgeError::Codec(format!(
                    "no inbox data for delivered message {}",
                    ev.message_index
                ))
            })?;

            let kind = if ev.kind == L1_MESSAGE_TYPE_SUBMIT_RETRYABLE {
                MessageKind::Retryable(self.retryable_from_parts(&ev, data)?)
            } else {
                MessageKind::EthDeposit(self.deposit_from_parts(&ev, data)?)
            };
            kinds.push(kind);
        }

        Ok(kinds)
    }

    fn retryable_from_parts(
        &self,
        ev: &IBridge::MessageDelivered,
        data: &[u8],
    ) -> BridgeResult<RetryableTicket> {
        let header_len = RETRYABLE_HEADER_WORDS * 32;
        if data.len() < header_len {
            return Err(BridgeError::Codec(format!(
                "retryable message {} is {} bytes, shorter than its header",
                ev.message_index,
                data.len()
            )));
        }

        let word = |i: usize| B256::from_slice(&data[i * 32..(i + 1) * 32]);
        let uint = |i: usize| U256::from_be_bytes(word(i).0);

        let calldata_len = usize::try_from(uint(8))
            .ok()
            .filter(|len| data.len() - header_len == *len)
            .ok_or_else(|| {
                BridgeError::Codec(format!(
                    "retryable message {} declares calldata length {} but carries {} bytes",
                    ev.message_index,
                    uint(8),
                    data.len() - header_len
                ))
            })?;

        let mut ticket = RetryableTicket {
            ticket_id: B256::ZERO,
            message_number: ev.message_index,
            sender: ev.sender,
            l1_base_fee: ev.base_fee_l1,
            destination: Address::from_word(word(0)),
            l2_call_value: uint(1),
            l1_value: uint(2),
            max_submission_fee: uint(3),
            excess_fee_refund_address: Address::from_word(word(4)),
            call_value_refund_address: Address::from_word(word(5)),
            gas_limit: uint(6),
            max_fee_per_gas: uint(7),
            data: Bytes::copy_from_slice(&data[header_len..header_len + calldata_len]),
        };
        ticket.ticket_id = retryable_ticket_id(self.l2_chain_id, &ticket);

        Ok(ticket)
    }

    fn deposit_from_parts(
        &self,
        ev: &IBridge::MessageDelivered,
        data: &[u8],
    ) -> BridgeResult<EthDeposit> {
        if data.len() != 52 {
            return Err(BridgeError::Codec(format!(
                "eth deposit message {} is {} bytes, expected 52",
                ev.message_index,
                data.len()
            )));
        }

        let to = Address::from_slice(&data[..20]);
        let value = U256::from_be_slice(&data[20..52]);

        Ok(EthDeposit {
            deposit_tx_hash: eth_deposit_tx_hash(
                self.l2_chain_id,
                ev.message_index,
                ev.sender,
                to,
                value,
            ),
            message_number: ev.message_index,
            from: ev.sender,
            to,
            value,
        })
    }
}

fn withdrawal_from_event(ev: IArbSys::L2ToL1Tx) -> BridgeResult<MessageKind> {
    let narrow = |value: U256, field: &str| {
        u64::try_from(value)
            .map_err(|_| BridgeError::Codec(format!("L2ToL1Tx {} {} overflows u64", field, value)))
    };

    Ok(MessageKind::Withdrawal(WithdrawalMessage {
        position: narrow(ev.position, "position")?,
        caller: ev.caller,
        destination: ev.destination,
        hash: ev.hash,
        l2_block: narrow(ev.arb_block_num, "arbBlockNum")?,
        l1_block: narrow(ev.eth_block_num, "ethBlockNum")?,
        l2_timestamp: narrow(ev.timestamp, "timestamp")?,
        call_value: ev.callvalue,
        data: ev.data,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageStatus, RetryableStatus, WithdrawalStatus};
    use crate::testing::{self, network, MockChain};

    #[test]
    fn test_zero_messages_is_empty() {
        let codec = MessageCodec::new(&network());
        let receipt = testing::receipt(B256::repeat_byte(0x01), 10, true, vec![]);

        assert!(codec.decode(&receipt, Direction::L1ToL2).unwrap().is_empty());
        assert!(codec.decode(&receipt, Direction::L2ToL1).unwrap().is_empty());
    }

    #[test]
    fn test_retryable_and_deposit_in_emission_order() {
        let net = network();
        let codec = MessageCodec::new(&net);
        let origin = B256::repeat_byte(0xaa);
        let calldata = vec![0xde, 0xad, 0xbe, 0xef];

        let mut logs = testing::retryable_logs(&net, 5, &testing::sample_retryable(&calldata));
        logs.extend(testing::deposit_logs(
            &net,
            6,
            Address::repeat_byte(0x44),
            U256::from(1_000u64),
        ));
        let receipt = testing::receipt(origin, 10, true, logs);

        let messages = codec.decode(&receipt, Direction::L1ToL2).unwrap();
        assert_eq!(messages.len(), 2);

        assert_eq!(messages[0].sequence_index, 0);
        assert_eq!(messages[0].status(), MessageStatus::L1ToL2(RetryableStatus::Submitted));
        let ticket = messages[0].as_retryable().unwrap();
        assert_eq!(ticket.message_number, U256::from(5u64));
        assert_eq!(ticket.data.as_ref(), calldata.as_slice());
        assert_eq!(ticket.ticket_id, retryable_ticket_id(net.l2_chain_id, ticket));
        assert_eq!(messages[0].payload.target, ticket.destination);

        assert_eq!(messages[1].sequence_index, 1);
        match &messages[1].kind {
            MessageKind::EthDeposit(deposit) => {
                assert_eq!(deposit.to, Address::repeat_byte(0x44));
                assert_eq!(deposit.value, U256::from(1_000u64));
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_missing_inbox_data_is_an_error() {
        let net = network();
        let codec = MessageCodec::new(&net);
        let mut logs = testing::retryable_logs(&net, 5, &testing::sample_retryable(&[]));
        // Drop the InboxMessageDelivered log
        logs.pop();
        let receipt = testing::receipt(B256::repeat_byte(0xaa), 10, true, logs);

        let err = codec.decode(&receipt, Direction::L1ToL2).unwrap_err();
        assert!(matches!(err, BridgeError::Codec(_)));
    }

    #[test]
    fn test_multiple_withdrawals_keep_order() {
        let codec = MessageCodec::new(&network());
        let logs = vec![
            testing::withdrawal_log(&testing::sample_withdrawal(3)),
            testing::withdrawal_log(&testing::sample_withdrawal(4)),
        ];
        let receipt = testing::receipt(B256::repeat_byte(0xbb), 100, true, logs);

        let messages = codec.decode(&receipt, Direction::L2ToL1).unwrap();
        let positions: Vec<_> = messages
            .iter()
            .map(|m| m.as_withdrawal().unwrap().position)
            .collect();
        assert_eq!(positions, vec![3, 4]);
        assert_eq!(
            messages[1].status(),
            MessageStatus::L2ToL1(WithdrawalStatus::Unconfirmed)
        );
        assert_eq!(messages[1].key(), format!("l2_to_l1:{}#1", B256::repeat_byte(0xbb)));
    }

    #[tokio::test]
    async fn test_messages_from_unknown_tx() {
        let codec = MessageCodec::new(&network());
        let chain = MockChain::new(1);

        let err = codec
            .messages_from_tx(&chain, B256::repeat_byte(0x01), Direction::L2ToL1)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::TransactionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_outbox_proof_checks_leaf() {
        let codec = MessageCodec::new(&network());
        let l2 = MockChain::new(2);
        let withdrawal = testing::sample_withdrawal(3);
        let root = B256::repeat_byte(0x77);
        testing::set_outbox_proof(&l2, &withdrawal, root);

        let proof = codec.outbox_proof(&l2, &withdrawal, 10).await.unwrap();
        assert_eq!(proof.root, root);
        assert_eq!(proof.send, B256::from(withdrawal.hash.to_be_bytes::<32>()));

        let mut other = withdrawal.clone();
        other.hash = U256::from(999u64);
        assert!(codec.outbox_proof(&l2, &other, 10).await.is_err());
    }
}
