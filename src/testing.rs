//! In-memory chain and fixtures shared by unit tests

use crate::chain::signer::MockTransactionSigner;
use crate::chain::{
    BlockHeader, BlockRef, CallRequest, ChainClient, LogEntry, LogFilter, TxReceipt,
};
use crate::config::NetworkConfig;
use crate::contracts::{
    Assertion, ExecutionState, GlobalState, IArbRetryableTx, IArbSys, IBridge, IInbox,
    INodeInterface, IOutbox, IRollup, Node, ARB_RETRYABLE_TX, ARB_SYS,
    L1_MESSAGE_TYPE_ETH_DEPOSIT, L1_MESSAGE_TYPE_SUBMIT_RETRYABLE, NODE_INTERFACE,
};
use crate::error::ChainError;
use crate::events::u256_topic;
use crate::message::{
    eth_deposit_tx_hash, retryable_ticket_id, CrossDomainMessage, EthDeposit, MessageKind,
    RetryableTicket, WithdrawalMessage,
};
use crate::tracker::ConfirmedSendRoot;

use alloy_primitives::{address, Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolEvent};
use async_trait::async_trait;
use sha3::{Digest, Keccak256};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

const GWEI: u64 = 1_000_000_000;

type SendHook = Arc<dyn Fn(&MockChain, B256, &Bytes) + Send + Sync>;

#[derive(Default)]
struct ChainState {
    block_number: u64,
    base_fee: Option<U256>,
    gas_price: U256,
    gas_estimate: Option<U256>,
    blocks: Vec<BlockHeader>,
    receipts: HashMap<B256, TxReceipt>,
    logs: Vec<LogEntry>,
    calls: HashMap<(Address, Bytes), Result<Bytes, String>>,
    selector_calls: HashMap<(Address, [u8; 4]), Result<Bytes, String>>,
    nonces: HashMap<Address, u64>,
    sent: Vec<Bytes>,
    send_errors: VecDeque<ChainError>,
    auto_mine: Option<bool>,
    fail_next: u32,
    offline: bool,
}

/// A scriptable [`ChainClient`] backed by in-memory state
pub struct MockChain {
    chain_id: u64,
    state: Mutex<ChainState>,
    queries: AtomicU32,
    on_send: Mutex<Option<SendHook>>,
}

impl MockChain {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            state: Mutex::new(ChainState {
                block_number: 100,
                base_fee: Some(U256::from(GWEI)),
                gas_price: U256::from(GWEI / 10),
                gas_estimate: Some(U256::from(100_000u64)),
                ..Default::default()
            }),
            queries: AtomicU32::new(0),
            on_send: Mutex::new(None),
        }
    }

    pub fn set_block_number(&self, number: u64) {
        self.state.lock().unwrap().block_number = number;
    }

    pub fn set_base_fee(&self, base_fee: Option<U256>) {
        self.state.lock().unwrap().base_fee = base_fee;
    }

    pub fn set_gas_price(&self, gas_price: U256) {
        self.state.lock().unwrap().gas_price = gas_price;
    }

    /// `None` makes every estimation revert
    pub fn set_gas_estimate(&self, estimate: Option<U256>) {
        self.state.lock().unwrap().gas_estimate = estimate;
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    /// Fail the next `count` queries with a transport error
    pub fn fail_next(&self, count: u32) {
        self.state.lock().unwrap().fail_next = count;
    }

    /// Mine every sent transaction at once with the given outcome
    pub fn set_auto_mine(&self, success: Option<bool>) {
        self.state.lock().unwrap().auto_mine = success;
    }

    pub fn push_send_error(&self, err: ChainError) {
        self.state.lock().unwrap().send_errors.push_back(err);
    }

    pub fn set_nonce(&self, address: Address, nonce: u64) {
        self.state.lock().unwrap().nonces.insert(address, nonce);
    }

    pub fn add_block(&self, block: BlockHeader) {
        self.state.lock().unwrap().blocks.push(block);
    }

    pub fn add_receipt(&self, receipt: TxReceipt) {
        self.state
            .lock()
            .unwrap()
            .receipts
            .insert(receipt.transaction_hash, receipt);
    }

    pub fn add_log(&self, log: LogEntry) {
        self.state.lock().unwrap().logs.push(log);
    }

    /// Respond to calls to `to` whose calldata starts with `selector`
    pub fn set_call(&self, to: Address, selector: [u8; 4], result: Result<Bytes, String>) {
        self.state
            .lock()
            .unwrap()
            .selector_calls
            .insert((to, selector), result);
    }

    /// Respond to one exact call; takes precedence over selector responses
    pub fn set_exact_call(&self, to: Address, data: Bytes, result: Result<Bytes, String>) {
        self.state.lock().unwrap().calls.insert((to, data), result);
    }

    /// Run `hook` after every accepted raw transaction
    pub fn on_send(&self, hook: impl Fn(&MockChain, B256, &Bytes) + Send + Sync + 'static) {
        *self.on_send.lock().unwrap() = Some(Arc::new(hook));
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Number of RPC queries made, failed ones included
    pub fn query_count(&self) -> u32 {
        self.queries.load(Ordering::SeqCst)
    }

    fn query(&self) -> Result<std::sync::MutexGuard<'_, ChainState>, ChainError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if state.offline {
            return Err(self.transport("connection refused"));
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(self.transport("connection reset"));
        }
        Ok(state)
    }

    fn transport(&self, message: &str) -> ChainError {
        ChainError::Transport {
            chain_id: self.chain_id,
            message: message.to_string(),
        }
    }
}

fn revert(reason: &str) -> ChainError {
    ChainError::Reverted {
        reason: reason.to_string(),
    }
}

#[async_trait]
impl ChainClient for MockChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn get_block_number(&self) -> Result<u64, ChainError> {
        Ok(self.query()?.block_number)
    }

    async fn get_base_fee(&self) -> Result<U256, ChainError> {
        self.query()?
            .base_fee
            .ok_or_else(|| ChainError::InvalidResponse("latest block has no base fee".into()))
    }

    async fn get_gas_price(&self) -> Result<U256, ChainError> {
        Ok(self.query()?.gas_price)
    }

    async fn get_block(&self, block: BlockRef) -> Result<Option<BlockHeader>, ChainError> {
        let state = self.query()?;
        let found = match block {
            BlockRef::Number(n) => state.blocks.iter().find(|b| b.number == n).cloned(),
            BlockRef::Hash(h) => state.blocks.iter().find(|b| b.hash == h).cloned(),
            BlockRef::Latest => Some(BlockHeader {
                number: state.block_number,
                hash: u256_topic(U256::from(state.block_number)),
                timestamp: 1_700_000_000 + state.block_number,
                base_fee_per_gas: state.base_fee,
                mix_hash: B256::ZERO,
            }),
        };
        Ok(found)
    }

    async fn get_transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, ChainError> {
        Ok(self.query()?.receipts.get(&hash).cloned())
    }

    async fn get_transaction_count(&self, address: Address) -> Result<u64, ChainError> {
        Ok(self.query()?.nonces.get(&address).copied().unwrap_or(0))
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, ChainError> {
        let state = self.query()?;
        Ok(state
            .logs
            .iter()
            .filter(|log| filter.matches(log))
            .cloned()
            .collect())
    }

    async fn call(&self, request: &CallRequest) -> Result<Bytes, ChainError> {
        let state = self.query()?;
        let exact = state.calls.get(&(request.to, request.data.clone()));
        let by_selector = request
            .data
            .get(..4)
            .and_then(|s| <[u8; 4]>::try_from(s).ok())
            .and_then(|selector| state.selector_calls.get(&(request.to, selector)));

        match exact.or(by_selector) {
            Some(Ok(output)) => Ok(output.clone()),
            Some(Err(reason)) => Err(revert(reason)),
            None => Err(revert("no code at address")),
        }
    }

    async fn estimate_gas(&self, _request: &CallRequest) -> Result<U256, ChainError> {
        self.query()?
            .gas_estimate
            .ok_or_else(|| revert("gas required exceeds allowance"))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, ChainError> {
        let hash = {
            let mut state = self.query()?;
            if let Some(err) = state.send_errors.pop_front() {
                return Err(err);
            }

            let hash = B256::from_slice(&Keccak256::digest(&raw));
            state.sent.push(raw.clone());
            if let Some(success) = state.auto_mine {
                state.block_number += 1;
                let receipt = receipt(hash, state.block_number, success, vec![]);
                state.receipts.insert(hash, receipt);
            }
            hash
        };

        let hook = self.on_send.lock().unwrap().clone();
        if let Some(hook) = hook {
            hook(self, hash, &raw);
        }
        Ok(hash)
    }
}

/// Signer that produces distinct raw bytes per chain and nonce
pub fn mock_signer(from: Address) -> MockTransactionSigner {
    let mut signer = MockTransactionSigner::new();
    signer.expect_address().return_const(from);
    signer.expect_sign_transaction().returning(|tx| {
        let mut raw = vec![0x02];
        raw.extend_from_slice(&tx.chain_id.to_be_bytes());
        raw.extend_from_slice(&tx.nonce.to_be_bytes());
        raw.extend_from_slice(tx.to.as_slice());
        raw.extend_from_slice(&tx.data);
        Ok(Bytes::from(raw))
    });
    signer
}

pub fn network() -> NetworkConfig {
    NetworkConfig {
        l1_chain_id: 84532,
        l2_chain_id: 48220505331,
        bridge: address!("b000000000000000000000000000000000000001"),
        inbox: address!("b000000000000000000000000000000000000002"),
        outbox: address!("b000000000000000000000000000000000000003"),
        rollup: address!("b000000000000000000000000000000000000004"),
        confirm_period_blocks: 150,
        retryable_lifetime_secs: 604_800,
    }
}

pub fn receipt(hash: B256, block: u64, success: bool, logs: Vec<LogEntry>) -> TxReceipt {
    let logs = logs
        .into_iter()
        .enumerate()
        .map(|(i, mut log)| {
            log.block_number = Some(block);
            log.transaction_hash = Some(hash);
            log.log_index = Some(i as u64);
            log
        })
        .collect();

    TxReceipt {
        transaction_hash: hash,
        block_number: block,
        success,
        logs,
    }
}

/// Header whose mix hash carries `send_count`
pub fn block(number: u64, hash: B256, timestamp: u64, send_count: u64) -> BlockHeader {
    let mut mix = [0u8; 32];
    mix[..8].copy_from_slice(&send_count.to_be_bytes());
    BlockHeader {
        number,
        hash,
        timestamp,
        base_fee_per_gas: Some(U256::from(GWEI / 10)),
        mix_hash: B256::from(mix),
    }
}

fn log(address: Address, topics: Vec<B256>, data: Vec<u8>) -> LogEntry {
    LogEntry {
        address,
        topics,
        data: Bytes::from(data),
        block_number: None,
        transaction_hash: None,
        log_index: None,
    }
}

fn delivered_log(
    net: &NetworkConfig,
    msg_num: u64,
    kind: u8,
    sender: Address,
    base_fee: U256,
    data: &[u8],
) -> Vec<LogEntry> {
    let delivered = IBridge::MessageDelivered {
        message_index: U256::from(msg_num),
        before_inbox_acc: B256::repeat_byte(0xac),
        inbox: net.inbox,
        kind,
        sender,
        message_data_hash: B256::from_slice(&Keccak256::digest(data)),
        base_fee_l1: base_fee,
        timestamp: 1_700_000_000,
    };
    let inbox = IInbox::InboxMessageDelivered {
        message_num: U256::from(msg_num),
        data: Bytes::copy_from_slice(data),
    };

    vec![
        log(
            net.bridge,
            vec![
                IBridge::MessageDelivered::SIGNATURE_HASH,
                u256_topic(U256::from(msg_num)),
                delivered.before_inbox_acc,
            ],
            delivered.encode_data(),
        ),
        log(
            net.inbox,
            vec![
                IInbox::InboxMessageDelivered::SIGNATURE_HASH,
                u256_topic(U256::from(msg_num)),
            ],
            inbox.encode_data(),
        ),
    ]
}

/// A retryable ticket as it would be decoded; `ticket_id` is left zero
pub fn sample_retryable(calldata: &[u8]) -> RetryableTicket {
    RetryableTicket {
        ticket_id: B256::ZERO,
        message_number: U256::ZERO,
        sender: Address::repeat_byte(0x11),
        l1_base_fee: U256::from(GWEI),
        destination: Address::repeat_byte(0x33),
        l2_call_value: U256::from(1_000_000_000_000_000u64),
        l1_value: U256::from(10_000_000_000_000_000u64),
        max_submission_fee: U256::from(123_456_000u64),
        excess_fee_refund_address: Address::repeat_byte(0x22),
        call_value_refund_address: Address::repeat_byte(0x22),
        gas_limit: U256::from(300_000u64),
        max_fee_per_gas: U256::from(GWEI / 10),
        data: Bytes::copy_from_slice(calldata),
    }
}

/// `MessageDelivered` and `InboxMessageDelivered` logs for `ticket`
pub fn retryable_logs(net: &NetworkConfig, msg_num: u64, ticket: &RetryableTicket) -> Vec<LogEntry> {
    let address_word = |a: Address| a.into_word().to_vec();
    let uint_word = |v: U256| v.to_be_bytes::<32>().to_vec();

    let mut data = Vec::new();
    data.extend(address_word(ticket.destination));
    data.extend(uint_word(ticket.l2_call_value));
    data.extend(uint_word(ticket.l1_value));
    data.extend(uint_word(ticket.max_submission_fee));
    data.extend(address_word(ticket.excess_fee_refund_address));
    data.extend(address_word(ticket.call_value_refund_address));
    data.extend(uint_word(ticket.gas_limit));
    data.extend(uint_word(ticket.max_fee_per_gas));
    data.extend(uint_word(U256::from(ticket.data.len())));
    data.extend_from_slice(&ticket.data);

    delivered_log(
        net,
        msg_num,
        L1_MESSAGE_TYPE_SUBMIT_RETRYABLE,
        ticket.sender,
        ticket.l1_base_fee,
        &data,
    )
}

pub fn deposit_logs(net: &NetworkConfig, msg_num: u64, to: Address, value: U256) -> Vec<LogEntry> {
    let mut data = to.to_vec();
    data.extend_from_slice(&value.to_be_bytes::<32>());
    delivered_log(
        net,
        msg_num,
        L1_MESSAGE_TYPE_ETH_DEPOSIT,
        Address::repeat_byte(0x11),
        U256::from(GWEI),
        &data,
    )
}

pub fn retryable_message(calldata: &[u8]) -> CrossDomainMessage {
    let mut ticket = sample_retryable(calldata);
    ticket.message_number = U256::from(42u64);
    ticket.ticket_id = retryable_ticket_id(network().l2_chain_id, &ticket);
    CrossDomainMessage::new(B256::repeat_byte(0xaa), 0, MessageKind::Retryable(ticket))
}

pub fn deposit_message(value: U256) -> CrossDomainMessage {
    let from = Address::repeat_byte(0x11);
    let to = Address::repeat_byte(0x33);
    let message_number = U256::from(7u64);
    let deposit = EthDeposit {
        deposit_tx_hash: eth_deposit_tx_hash(network().l2_chain_id, message_number, from, to, value),
        message_number,
        from,
        to,
        value,
    };
    CrossDomainMessage::new(B256::repeat_byte(0xab), 0, MessageKind::EthDeposit(deposit))
}

pub fn redeem_scheduled_log(ticket_id: B256, retry: B256, block: u64) -> LogEntry {
    let event = IArbRetryableTx::RedeemScheduled {
        ticket_id,
        retry_tx_hash: retry,
        sequence_num: 0,
        donated_gas: 300_000,
        gas_donor: Address::repeat_byte(0x22),
        max_refund: U256::from(GWEI),
        submission_fee_refund: U256::ZERO,
    };
    let mut entry = log(
        ARB_RETRYABLE_TX,
        vec![
            IArbRetryableTx::RedeemScheduled::SIGNATURE_HASH,
            ticket_id,
            retry,
            u256_topic(U256::ZERO),
        ],
        event.encode_data(),
    );
    entry.block_number = Some(block);
    entry
}

/// `None` makes `getTimeout` revert as it does for a deleted ticket
pub fn set_ticket_timeout(l2: &MockChain, timeout: Option<U256>) {
    let result = match timeout {
        Some(timeout) => Ok(Bytes::from(
            IArbRetryableTx::getTimeoutCall::abi_encode_returns(&(timeout,)),
        )),
        None => Err("NoTicketWithID".to_string()),
    };
    l2.set_call(ARB_RETRYABLE_TX, IArbRetryableTx::getTimeoutCall::SELECTOR, result);
}

pub fn sample_withdrawal(position: u64) -> WithdrawalMessage {
    WithdrawalMessage {
        position,
        caller: Address::repeat_byte(0x11),
        destination: Address::repeat_byte(0x44),
        hash: U256::from(0xfeed_0000u64 + position),
        l2_block: 5_000 + position,
        l1_block: 900,
        l2_timestamp: 1_700_000_000,
        call_value: U256::from(GWEI),
        data: Bytes::new(),
    }
}

pub fn withdrawal_log(w: &WithdrawalMessage) -> LogEntry {
    let event = IArbSys::L2ToL1Tx {
        caller: w.caller,
        destination: w.destination,
        hash: w.hash,
        position: U256::from(w.position),
        arb_block_num: U256::from(w.l2_block),
        eth_block_num: U256::from(w.l1_block),
        timestamp: U256::from(w.l2_timestamp),
        callvalue: w.call_value,
        data: w.data.clone(),
    };
    log(
        ARB_SYS,
        vec![
            IArbSys::L2ToL1Tx::SIGNATURE_HASH,
            w.destination.into_word(),
            u256_topic(w.hash),
            u256_topic(U256::from(w.position)),
        ],
        event.encode_data(),
    )
}

pub fn withdrawal_message(position: u64) -> CrossDomainMessage {
    CrossDomainMessage::new(
        B256::repeat_byte(0xbb),
        0,
        MessageKind::Withdrawal(sample_withdrawal(position)),
    )
}

/// Serve a three-node proof for `w` under `root`
pub fn set_outbox_proof(l2: &MockChain, w: &WithdrawalMessage, root: B256) {
    let proof = vec![
        B256::repeat_byte(0x01),
        B256::repeat_byte(0x02),
        B256::repeat_byte(0x03),
    ];
    let output = INodeInterface::constructOutboxProofCall::abi_encode_returns(&(
        u256_topic(w.hash),
        root,
        proof,
    ));
    l2.set_call(
        NODE_INTERFACE,
        INodeInterface::constructOutboxProofCall::SELECTOR,
        Ok(Bytes::from(output)),
    );
}

pub fn set_latest_confirmed(l1: &MockChain, net: &NetworkConfig, node_num: u64) {
    l1.set_call(
        net.rollup,
        IRollup::latestConfirmedCall::SELECTOR,
        Ok(Bytes::from(IRollup::latestConfirmedCall::abi_encode_returns(&(node_num,)))),
    );
}

fn execution_state(block_hash: B256, send_root: B256) -> ExecutionState {
    ExecutionState {
        global_state: GlobalState {
            bytes32_vals: [block_hash, send_root],
            u64_vals: [0, 0],
        },
        machine_status: 1,
    }
}

/// Confirm rollup node `node_num` covering `send_count` sends
pub fn confirm_sends(
    l1: &MockChain,
    l2: &MockChain,
    net: &NetworkConfig,
    node_num: u64,
    send_count: u64,
) -> ConfirmedSendRoot {
    let created_at_block = 100 + node_num;
    let mut block_hash = [0xb1u8; 32];
    block_hash[24..].copy_from_slice(&node_num.to_be_bytes());
    let l2_block_hash = B256::from(block_hash);
    let send_root = u256_topic(U256::from(send_count) | (U256::from(0x5e0du64) << 200));

    set_latest_confirmed(l1, net, node_num);

    let node = Node {
        state_hash: B256::repeat_byte(0x01),
        challenge_hash: B256::ZERO,
        confirm_data: B256::ZERO,
        prev_num: node_num.saturating_sub(1),
        deadline_block: created_at_block + net.confirm_period_blocks,
        no_child_confirmed_before_block: 0,
        staker_count: 1,
        child_staker_count: 0,
        first_child_block: 0,
        latest_child_number: 0,
        created_at_block,
        node_hash: B256::repeat_byte(0x02),
    };
    l1.set_call(
        net.rollup,
        IRollup::getNodeCall::SELECTOR,
        Ok(Bytes::from(IRollup::getNodeCall::abi_encode_returns(&(node,)))),
    );

    let created = IRollup::NodeCreated {
        node_num,
        parent_node_hash: B256::repeat_byte(0x03),
        node_hash: B256::repeat_byte(0x02),
        execution_hash: B256::repeat_byte(0x04),
        assertion: Assertion {
            before_state: execution_state(B256::ZERO, B256::ZERO),
            after_state: execution_state(l2_block_hash, send_root),
            num_blocks: 10,
        },
        after_inbox_batch_acc: B256::ZERO,
        wasm_module_root: B256::ZERO,
        inbox_max_count: U256::from(1u64),
    };
    let mut entry = log(
        net.rollup,
        vec![
            IRollup::NodeCreated::SIGNATURE_HASH,
            u256_topic(U256::from(node_num)),
            created.parent_node_hash,
            created.node_hash,
        ],
        created.encode_data(),
    );
    entry.block_number = Some(created_at_block);
    l1.add_log(entry);

    l2.add_block(block(5_000 + node_num, l2_block_hash, 1_700_000_000, send_count));

    ConfirmedSendRoot {
        node_num,
        l2_block_hash,
        send_root,
        send_count,
    }
}

pub fn set_spent(l1: &MockChain, net: &NetworkConfig, spent: bool) {
    l1.set_call(
        net.outbox,
        IOutbox::isSpentCall::SELECTOR,
        Ok(Bytes::from(IOutbox::isSpentCall::abi_encode_returns(&(spent,)))),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_chain_failure_injection() {
        let chain = MockChain::new(1);
        chain.fail_next(1);
        assert!(chain.get_block_number().await.unwrap_err().is_transient());
        assert_eq!(chain.get_block_number().await.unwrap(), 100);
        assert_eq!(chain.query_count(), 2);
    }

    #[tokio::test]
    async fn test_auto_mine_creates_receipts() {
        let chain = MockChain::new(1);
        chain.set_auto_mine(Some(true));
        let hash = chain
            .send_raw_transaction(Bytes::from(vec![0x02, 0x01]))
            .await
            .unwrap();

        let receipt = chain.get_transaction_receipt(hash).await.unwrap().unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.block_number, 101);
        assert_eq!(chain.sent().len(), 1);
    }
}
