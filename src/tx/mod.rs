//! Transaction submission module with nonce management and gas filling

mod gas;
mod nonce;
mod sender;

pub use gas::{GasEstimator, GasSettings};
pub use nonce::{NonceLease, NonceManager};
pub use sender::TransactionSender;
