//! Status tracking for cross-domain messages
//!
//! This module provides:
//! - Per-direction state machines derived purely from chain state
//! - The `await_status` polling protocol with capped exponential backoff
//! - An error budget separating "chain unreachable" from "not there yet"
//!
//! The tracker keeps no per-message state: every poll re-reads the chain, so a
//! cancelled or timed out wait can be resumed by simply calling again.

mod backoff;
mod retryable;
mod withdrawal;

pub use backoff::Backoff;
pub use withdrawal::ConfirmedSendRoot;

use crate::chain::{BlockRef, ChainClient};
use crate::config::NetworkConfig;
use crate::error::{BridgeError, BridgeResult, ChainError};
use crate::message::{CrossDomainMessage, MessageKind, MessageStatus};
use crate::metrics;

use alloy_primitives::B256;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Polling cadence and tolerance
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    /// Transient errors tolerated within one `await_status` call
    pub error_budget: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(30),
            error_budget: 10,
        }
    }
}

/// Result of a bounded wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The target, a later status, or a terminal status was observed
    Reached(CrossDomainMessage),
    /// The deadline passed first; the message may still get there
    TimedOut { last: Option<MessageStatus> },
}

/// L1 side record of a withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutboxEntry {
    confirmed: bool,
    executed: bool,
}

impl OutboxEntry {
    /// An unconfirmed entry is never executed, whatever `executed` says
    pub fn new(confirmed: bool, executed: bool) -> Self {
        Self {
            confirmed,
            executed: confirmed && executed,
        }
    }

    pub fn confirmed(&self) -> bool {
        self.confirmed
    }

    pub fn executed(&self) -> bool {
        self.executed
    }
}

/// A single status read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Observation {
    pub status: MessageStatus,
    pub resolution_tx: Option<B256>,
}

impl Observation {
    pub fn new(status: impl Into<MessageStatus>) -> Self {
        Self {
            status: status.into(),
            resolution_tx: None,
        }
    }

    pub fn resolved(status: impl Into<MessageStatus>, tx: B256) -> Self {
        Self {
            status: status.into(),
            resolution_tx: Some(tx),
        }
    }
}

/// Advances messages through their state machines by polling both chains
pub struct StatusTracker {
    l1: Arc<dyn ChainClient>,
    l2: Arc<dyn ChainClient>,
    network: NetworkConfig,
    poll: PollConfig,
    updates: Option<broadcast::Sender<CrossDomainMessage>>,
}

impl StatusTracker {
    pub fn new(
        l1: Arc<dyn ChainClient>,
        l2: Arc<dyn ChainClient>,
        network: NetworkConfig,
        poll: PollConfig,
    ) -> Self {
        Self {
            l1,
            l2,
            network,
            poll,
            updates: None,
        }
    }

    /// Publish every status change as a snapshot on `sender`
    pub fn with_updates(mut self, sender: broadcast::Sender<CrossDomainMessage>) -> Self {
        self.updates = Some(sender);
        self
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    pub fn l1(&self) -> &Arc<dyn ChainClient> {
        &self.l1
    }

    pub fn l2(&self) -> &Arc<dyn ChainClient> {
        &self.l2
    }

    /// Read the current status without waiting for a change.
    ///
    /// Transient RPC errors are retried within the error budget. The answer is
    /// never behind the status `msg` already records.
    pub async fn status(&self, msg: &CrossDomainMessage) -> BridgeResult<MessageStatus> {
        let observed = self.with_retry(&msg.key(), || self.observe(msg)).await?.status;
        let recorded = msg.status();
        if recorded.can_advance_to(&observed) {
            Ok(observed)
        } else {
            debug!("{} reads as {} but was already {}", msg.key(), observed, recorded);
            Ok(recorded)
        }
    }

    /// Read the current status and record it on `msg`
    pub async fn refresh(&self, msg: &mut CrossDomainMessage) -> BridgeResult<MessageStatus> {
        let current: &CrossDomainMessage = msg;
        let observation = self
            .with_retry(&current.key(), || self.observe(current))
            .await?;
        Ok(self.record(msg, observation))
    }

    /// Poll until `msg` reaches `target` (or a later or terminal status) or
    /// `timeout` elapses.
    ///
    /// Transient RPC errors are retried with the same backoff until more than
    /// `error_budget` of them have accumulated in this call. Dropping the
    /// returned future stops polling without side effects.
    pub async fn await_status(
        &self,
        msg: &CrossDomainMessage,
        target: MessageStatus,
        timeout: Duration,
    ) -> BridgeResult<WaitOutcome> {
        if target.direction() != msg.direction {
            return Err(BridgeError::DirectionMismatch {
                message: msg.key(),
                target: target.to_string(),
            });
        }

        let deadline = Instant::now() + timeout;
        let mut backoff = Backoff::new(self.poll.initial_interval, self.poll.max_interval);
        let mut snapshot = msg.clone();
        let mut last = None;
        let mut errors = 0u32;

        debug!("Waiting up to {:?} for {} to reach {}", timeout, msg.key(), target);

        loop {
            metrics::record_poll(msg.direction);

            match tokio::time::timeout_at(deadline, self.observe(&snapshot)).await {
                Err(_) => return Ok(WaitOutcome::TimedOut { last }),
                Ok(Ok(observation)) => {
                    let status = self.record(&mut snapshot, observation);
                    last = Some(status);
                    if status.satisfies(&target) {
                        return Ok(WaitOutcome::Reached(snapshot));
                    }
                }
                Ok(Err(e)) if e.is_transient() => {
                    errors += 1;
                    metrics::record_poll_error(msg.direction);
                    if errors > self.poll.error_budget {
                        return Err(BridgeError::PollingUnavailable {
                            message: msg.key(),
                            errors,
                            last_error: e.to_string(),
                        });
                    }
                    warn!(
                        "Poll {} of {} failed ({}/{}): {}",
                        target,
                        msg.key(),
                        errors,
                        self.poll.error_budget,
                        e
                    );
                }
                Ok(Err(e)) => return Err(e.into()),
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(WaitOutcome::TimedOut { last });
            }
            tokio::time::sleep(backoff.next_delay().min(deadline - now)).await;
        }
    }

    /// Outbox record of a withdrawal
    pub async fn outbox_entry(&self, msg: &CrossDomainMessage) -> BridgeResult<OutboxEntry> {
        let withdrawal = msg
            .as_withdrawal()
            .ok_or_else(|| BridgeError::DirectionMismatch {
                message: msg.key(),
                target: "outbox entry".to_string(),
            })?;

        self.with_retry(&msg.key(), || {
            withdrawal::outbox_entry(self.l1.as_ref(), self.l2.as_ref(), &self.network, withdrawal)
        })
        .await
    }

    /// Latest send root confirmed on L1, if any node past genesis is confirmed
    pub async fn confirmed_send_root(&self) -> BridgeResult<Option<ConfirmedSendRoot>> {
        self.with_retry("latest confirmed node", || {
            withdrawal::confirmed_send_root(self.l1.as_ref(), self.l2.as_ref(), &self.network)
        })
        .await
    }

    /// Whether the outbox has already paid out `position`
    pub async fn is_spent(&self, position: u64) -> BridgeResult<bool> {
        self.with_retry(&format!("outbox leaf {}", position), || {
            withdrawal::is_spent(self.l1.as_ref(), &self.network, position)
        })
        .await
    }

    /// Run a one-off chain read, retrying transient errors with the poll
    /// backoff until more than `error_budget` of them have accumulated
    pub async fn with_retry<T, E, F, Fut>(&self, what: &str, mut read: F) -> BridgeResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BridgeError>,
    {
        let mut backoff = Backoff::new(self.poll.initial_interval, self.poll.max_interval);
        let mut errors = 0u32;

        loop {
            let err = match read().await {
                Ok(value) => return Ok(value),
                Err(e) => e.into(),
            };

            let transient = matches!(&err, BridgeError::Chain(e) if e.is_transient());
            if !transient {
                return Err(err);
            }

            errors += 1;
            if errors > self.poll.error_budget {
                return Err(BridgeError::PollingUnavailable {
                    message: what.to_string(),
                    errors,
                    last_error: err.to_string(),
                });
            }
            warn!(
                "Reading {} failed ({}/{}): {}",
                what, errors, self.poll.error_budget, err
            );
            tokio::time::sleep(backoff.next_delay()).await;
        }
    }

    /// Rough L1 block after which a withdrawal can be confirmed
    pub fn estimated_confirmation_block(&self, msg: &CrossDomainMessage) -> Option<u64> {
        msg.as_withdrawal()
            .map(|w| w.l1_block + self.network.confirm_period_blocks)
    }

    /// Unix timestamp at which a retryable ticket expires.
    ///
    /// `None` for other messages and for tickets not yet created on L2.
    pub async fn ticket_expiry(&self, msg: &CrossDomainMessage) -> BridgeResult<Option<u64>> {
        let Some(ticket) = msg.as_retryable() else {
            return Ok(None);
        };

        if let Some(timeout) = retryable::ticket_timeout(self.l2.as_ref(), ticket.ticket_id).await? {
            return Ok(Some(u64::try_from(timeout).unwrap_or(u64::MAX)));
        }

        // Gone or not yet created; fall back to creation time plus lifetime
        let Some(creation) = self.l2.get_transaction_receipt(ticket.ticket_id).await? else {
            return Ok(None);
        };
        let block = self
            .l2
            .get_block(BlockRef::Number(creation.block_number))
            .await?
            .ok_or_else(|| {
                ChainError::InvalidResponse(format!("block {} not found", creation.block_number))
            })?;

        Ok(Some(block.timestamp + self.network.retryable_lifetime_secs))
    }

    async fn observe(&self, msg: &CrossDomainMessage) -> Result<Observation, ChainError> {
        match &msg.kind {
            MessageKind::Retryable(ticket) => retryable::ticket_status(self.l2.as_ref(), ticket).await,
            MessageKind::EthDeposit(deposit) => {
                retryable::deposit_status(self.l2.as_ref(), deposit).await
            }
            MessageKind::Withdrawal(w) => {
                withdrawal::withdrawal_status(self.l1.as_ref(), self.l2.as_ref(), &self.network, w)
                    .await
            }
        }
    }

    /// Apply an observation to `msg`, returning the status it now carries
    fn record(&self, msg: &mut CrossDomainMessage, observation: Observation) -> MessageStatus {
        let previous = msg.status();

        // A lagging RPC must not undo a confirmation or revive a finished ticket
        if !previous.can_advance_to(&observation.status) {
            warn!(
                "Ignoring {} regression from {} to {}",
                msg.key(),
                previous,
                observation.status
            );
            return previous;
        }

        msg.observe(observation.status, observation.resolution_tx);

        if previous != observation.status {
            info!("{}: {} -> {}", msg.key(), previous, observation.status);
            metrics::record_status_transition(&observation.status);
            if let Some(updates) = &self.updates {
                // No subscribers is fine
                let _ = updates.send(msg.clone());
            }
        }

        observation.status
    }
}
