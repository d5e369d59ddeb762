//! ABI bindings for the rollup's bridge contracts and L2 precompiles

use alloy_primitives::{address, Address};
use alloy_sol_types::sol;

/// ArbSys precompile on L2
pub const ARB_SYS: Address = address!("0000000000000000000000000000000000000064");

/// ArbRetryableTx precompile on L2
pub const ARB_RETRYABLE_TX: Address = address!("000000000000000000000000000000000000006e");

/// NodeInterface virtual contract on L2, only reachable through calls and gas estimation
pub const NODE_INTERFACE: Address = address!("00000000000000000000000000000000000000c8");

/// Inbox message kind for a submit-retryable message
pub const L1_MESSAGE_TYPE_SUBMIT_RETRYABLE: u8 = 9;

/// Inbox message kind for an ETH deposit
pub const L1_MESSAGE_TYPE_ETH_DEPOSIT: u8 = 12;

sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct GlobalState {
        bytes32[2] bytes32_vals;
        uint64[2] u64_vals;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct ExecutionState {
        GlobalState global_state;
        uint8 machine_status;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct Assertion {
        ExecutionState before_state;
        ExecutionState after_state;
        uint64 num_blocks;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct Node {
        bytes32 state_hash;
        bytes32 challenge_hash;
        bytes32 confirm_data;
        uint64 prev_num;
        uint64 deadline_block;
        uint64 no_child_confirmed_before_block;
        uint64 staker_count;
        uint64 child_staker_count;
        uint64 first_child_block;
        uint64 latest_child_number;
        uint64 created_at_block;
        bytes32 node_hash;
    }

    interface IInbox {
        #[derive(Debug, PartialEq, Eq)]
        event InboxMessageDelivered(uint256 indexed message_num, bytes data);

        function createRetryableTicket(
            address to,
            uint256 l2_call_value,
            uint256 max_submission_cost,
            address excess_fee_refund_address,
            address call_value_refund_address,
            uint256 gas_limit,
            uint256 max_fee_per_gas,
            bytes data
        ) external payable returns (uint256 message_num);

        function depositEth() external payable returns (uint256 message_num);
    }

    interface IBridge {
        #[derive(Debug, PartialEq, Eq)]
        event MessageDelivered(
            uint256 indexed message_index,
            bytes32 indexed before_inbox_acc,
            address inbox,
            uint8 kind,
            address sender,
            bytes32 message_data_hash,
            uint256 base_fee_l1,
            uint64 timestamp
        );
    }

    interface IOutbox {
        function executeTransaction(
            bytes32[] proof,
            uint256 index,
            address l2_sender,
            address to,
            uint256 l2_block,
            uint256 l1_block,
            uint256 l2_timestamp,
            uint256 value,
            bytes data
        ) external;

        function isSpent(uint256 index) external view returns (bool spent);
    }

    interface IRollup {
        #[derive(Debug, PartialEq, Eq)]
        event NodeCreated(
            uint64 indexed node_num,
            bytes32 indexed parent_node_hash,
            bytes32 indexed node_hash,
            bytes32 execution_hash,
            Assertion assertion,
            bytes32 after_inbox_batch_acc,
            bytes32 wasm_module_root,
            uint256 inbox_max_count
        );

        function latestConfirmed() external view returns (uint64 node_num);

        function getNode(uint64 node_num) external view returns (Node node);
    }

    interface IArbSys {
        #[derive(Debug, PartialEq, Eq)]
        event L2ToL1Tx(
            address caller,
            address indexed destination,
            uint256 indexed hash,
            uint256 indexed position,
            uint256 arb_block_num,
            uint256 eth_block_num,
            uint256 timestamp,
            uint256 callvalue,
            bytes data
        );

        function withdrawEth(address destination) external payable returns (uint256 position);
    }

    interface IArbRetryableTx {
        #[derive(Debug, PartialEq, Eq)]
        event RedeemScheduled(
            bytes32 indexed ticket_id,
            bytes32 indexed retry_tx_hash,
            uint64 indexed sequence_num,
            uint64 donated_gas,
            address gas_donor,
            uint256 max_refund,
            uint256 submission_fee_refund
        );

        function redeem(bytes32 ticket_id) external returns (bytes32 retry_tx_hash);

        function getTimeout(bytes32 ticket_id) external view returns (uint256 timeout);
    }

    interface INodeInterface {
        function estimateRetryableTicket(
            address sender,
            uint256 deposit,
            address to,
            uint256 l2_call_value,
            address excess_fee_refund_address,
            address call_value_refund_address,
            bytes data
        ) external;

        function constructOutboxProof(uint64 size, uint64 leaf)
            external view returns (bytes32 send, bytes32 root, bytes32[] proof);
    }
}
