//! Cross-domain relayer daemon
//!
//! Follows the configured origin transactions until every message they
//! created is finished, executing withdrawals and re-redeeming failed
//! tickets when asked to. Snapshots are served over HTTP while it runs.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crossdomain_relayer::api::{self, AppState, MessageBoard};
use crossdomain_relayer::chain::{ChainClient, EthersChainClient, TransactionSigner, WalletSigner};
use crossdomain_relayer::config::{Settings, WatchConfig};
use crossdomain_relayer::coordination::{OutboxCoordinator, RetryableRedeemer};
use crossdomain_relayer::fees::{FeeEstimator, GasOverridePolicy};
use crossdomain_relayer::message::{
    CrossDomainMessage, Direction, MessageCodec, MessageStatus, RetryableStatus, WithdrawalStatus,
};
use crossdomain_relayer::metrics::{self, MetricsServer};
use crossdomain_relayer::tracker::{StatusTracker, WaitOutcome};
use crossdomain_relayer::tx::{GasEstimator, NonceManager, TransactionSender};

const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Everything a watch task needs
struct Watcher {
    tracker: Arc<StatusTracker>,
    codec: MessageCodec,
    board: Arc<MessageBoard>,
    fees_policy: GasOverridePolicy,
    outbox: Option<OutboxCoordinator>,
    redeemer: Option<RetryableRedeemer>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting cross-domain relayer v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load().context("loading configuration")?;
    info!(
        "Loaded configuration for chains {} and {} with {} watch entries",
        settings.network.l1_chain_id,
        settings.network.l2_chain_id,
        settings.watch.len()
    );

    // Connect both chains
    let l1 = Arc::new(
        EthersChainClient::new(settings.chains.l1.clone())
            .await
            .context("connecting to L1")?,
    );
    let l2 = Arc::new(
        EthersChainClient::new(settings.chains.l2.clone())
            .await
            .context("connecting to L2")?,
    );
    let l1_client: Arc<dyn ChainClient> = l1.clone();
    let l2_client: Arc<dyn ChainClient> = l2.clone();

    // Tracker with a feed for the message board
    let (updates, _) = broadcast::channel(256);
    let tracker = Arc::new(
        StatusTracker::new(
            l1_client.clone(),
            l2_client.clone(),
            settings.network.clone(),
            settings.engine.poll_config(),
        )
        .with_updates(updates.clone()),
    );
    let board = Arc::new(MessageBoard::new());
    let board_handle = tokio::spawn(board.clone().follow(updates.subscribe()));

    // Submission path, only with a wallet
    let signer: Option<Arc<dyn TransactionSigner>> = match &settings.wallet.private_key_env {
        Some(var) => Some(Arc::new(
            WalletSigner::from_env(var).context("loading wallet")?,
        )),
        None => {
            info!("No wallet configured, running read-only");
            None
        }
    };

    let fees = Arc::new(FeeEstimator::new(l1_client.clone(), l2_client.clone()));
    let nonces = Arc::new(NonceManager::new());
    let inclusion_timeout = settings.engine.inclusion_timeout();
    let (outbox, redeemer) = match &signer {
        Some(signer) => {
            let l1_sender = Arc::new(TransactionSender::new(
                l1_client.clone(),
                signer.clone(),
                nonces.clone(),
                GasEstimator::from_config(&settings.engine, &settings.chains.l1),
                &settings.engine,
            ));
            let l2_sender = Arc::new(TransactionSender::new(
                l2_client.clone(),
                signer.clone(),
                nonces.clone(),
                GasEstimator::from_config(&settings.engine, &settings.chains.l2),
                &settings.engine,
            ));
            (
                Some(OutboxCoordinator::new(tracker.clone(), l1_sender, inclusion_timeout)),
                Some(RetryableRedeemer::new(
                    tracker.clone(),
                    fees.clone(),
                    l2_sender,
                    inclusion_timeout,
                )),
            )
        }
        None => (None, None),
    };

    let watcher = Arc::new(Watcher {
        tracker: tracker.clone(),
        codec: MessageCodec::new(&settings.network),
        board: board.clone(),
        fees_policy: settings.fees.clone(),
        outbox,
        redeemer,
    });

    // Start API server
    let api_handle = if settings.api.enabled {
        let state = AppState {
            board: board.clone(),
            chains: vec![l1_client.clone(), l2_client.clone()],
        };
        let config = settings.api.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = api::run_server(config, state).await {
                error!("API server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Health check loop
    let health_handle = tokio::spawn({
        let l1 = l1.clone();
        let l2 = l2.clone();
        async move {
            loop {
                tokio::time::sleep(HEALTH_CHECK_INTERVAL).await;

                for client in [&l1, &l2] {
                    let healthy = client.health_check().await;
                    if !healthy {
                        warn!("Chain {} health check failed", client.chain_id());
                        client.failover();
                    }
                    metrics::record_chain_health(client.chain_id(), healthy);
                }
            }
        }
    });

    // Follow every configured origin transaction
    let watch_handles: Vec<_> = settings
        .watch
        .iter()
        .cloned()
        .map(|entry| {
            let watcher = watcher.clone();
            tokio::spawn(async move {
                if let Err(e) = watcher.run(&entry).await {
                    error!("Watch of {} failed: {:#}", entry.tx_hash, e);
                }
            })
        })
        .collect();

    info!("Cross-domain relayer is running");
    if settings.api.enabled {
        info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    }
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    let serving = api_handle.is_some() || metrics_handle.is_some();
    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping...");
        }
        _ = futures::future::join_all(watch_handles) => {
            info!("All watched messages settled");
            if serving {
                shutdown_signal().await;
                info!("Shutdown signal received, stopping...");
            }
        }
    }

    // Abort background tasks
    board_handle.abort();
    health_handle.abort();
    if let Some(h) = api_handle {
        h.abort();
    }
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Cross-domain relayer stopped");
    Ok(())
}

impl Watcher {
    /// Decode the messages of one origin transaction and follow each one
    async fn run(&self, entry: &WatchConfig) -> Result<()> {
        let origin = match entry.direction {
            Direction::L1ToL2 => self.tracker.l1(),
            Direction::L2ToL1 => self.tracker.l2(),
        };
        let messages = self
            .codec
            .messages_from_tx(origin.as_ref(), entry.tx_hash, entry.direction)
            .await
            .with_context(|| format!("decoding {}", entry.tx_hash))?;

        if messages.is_empty() {
            warn!("Transaction {} created no {} messages", entry.tx_hash, entry.direction);
        }

        let timeout = Duration::from_secs(entry.timeout_secs);
        let results = futures::future::join_all(
            messages
                .into_iter()
                .map(|msg| self.follow(msg, entry, timeout)),
        )
        .await;

        results.into_iter().collect()
    }

    async fn follow(&self, msg: CrossDomainMessage, entry: &WatchConfig, timeout: Duration) -> Result<()> {
        let key = msg.key();
        self.board.upsert(msg.clone());

        match msg.direction {
            Direction::L2ToL1 if entry.execute => {
                let outbox = self
                    .outbox
                    .as_ref()
                    .context("executing withdrawals needs a wallet")?;
                let receipt = outbox
                    .execute(&msg, timeout)
                    .await
                    .with_context(|| format!("executing {}", key))?;
                info!("Withdrawal {} finished: {:?}", key, receipt);
                self.track(msg, WithdrawalStatus::Executed.into(), timeout)
                    .await
                    .map(|_| ())
            }
            Direction::L2ToL1 => self
                .track(msg, WithdrawalStatus::Confirmed.into(), timeout)
                .await
                .map(|_| ()),
            Direction::L1ToL2 => {
                let target = MessageStatus::from(RetryableStatus::Redeemed);
                let Some(settled) = self.track(msg, target, timeout).await? else {
                    return Ok(());
                };

                let failed = MessageStatus::from(RetryableStatus::Failed);
                if entry.redeem && settled.status() == failed && settled.as_retryable().is_some() {
                    let redeemer = self
                        .redeemer
                        .as_ref()
                        .context("redeeming tickets needs a wallet")?;
                    let receipt = redeemer
                        .redeem(&settled, &self.fees_policy)
                        .await
                        .with_context(|| format!("redeeming {}", key))?;
                    info!("Redeem of {} scheduled: {:?}", key, receipt);
                    self.track(settled, target, timeout).await?;
                }
                Ok(())
            }
        }
    }

    /// Wait for `target` and log where the message ended up
    async fn track(
        &self,
        msg: CrossDomainMessage,
        target: MessageStatus,
        timeout: Duration,
    ) -> Result<Option<CrossDomainMessage>> {
        let key = msg.key();
        match self
            .tracker
            .await_status(&msg, target, timeout)
            .await
            .with_context(|| format!("tracking {}", key))?
        {
            WaitOutcome::Reached(settled) => {
                info!("Message {} is {}", key, settled.status());
                self.board.upsert(settled.clone());
                Ok(Some(settled))
            }
            WaitOutcome::TimedOut { last } => {
                warn!(
                    "Gave up on {} after {:?}, last status {}",
                    key,
                    timeout,
                    last.map(|s| s.to_string()).unwrap_or_else(|| "unknown".to_string())
                );
                Ok(None)
            }
        }
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,crossdomain_relayer=debug,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
