//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Chain connection status
//! - Status polling and transitions
//! - Fee estimation outcomes
//! - Transaction submission and withdrawal execution

use crate::error::{BridgeError, BridgeResult};
use crate::message::{Direction, MessageStatus};

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Chain metrics
    pub static ref CHAIN_CONNECTED: GaugeVec = register_gauge_vec!(
        "crossdomain_chain_connected",
        "Chain connection status (1=connected, 0=disconnected)",
        &["chain_id"]
    ).expect("metric registers once");

    // Tracking metrics
    pub static ref STATUS_POLLS: CounterVec = register_counter_vec!(
        "crossdomain_status_polls_total",
        "Total status polls by message direction",
        &["direction"]
    ).expect("metric registers once");

    pub static ref STATUS_POLL_ERRORS: CounterVec = register_counter_vec!(
        "crossdomain_status_poll_errors_total",
        "Total transient errors absorbed while polling",
        &["direction"]
    ).expect("metric registers once");

    pub static ref STATUS_TRANSITIONS: CounterVec = register_counter_vec!(
        "crossdomain_status_transitions_total",
        "Total observed status transitions by new status",
        &["status"]
    ).expect("metric registers once");

    // Fee metrics
    pub static ref FEE_ESTIMATES: CounterVec = register_counter_vec!(
        "crossdomain_fee_estimates_total",
        "Total retryable fee estimations by outcome",
        &["outcome"]
    ).expect("metric registers once");

    // Transaction metrics
    pub static ref TX_SUBMITTED: CounterVec = register_counter_vec!(
        "crossdomain_transactions_submitted_total",
        "Total transactions submitted",
        &["chain_id"]
    ).expect("metric registers once");

    pub static ref TX_FAILED: CounterVec = register_counter_vec!(
        "crossdomain_transactions_failed_total",
        "Total transactions that could not be sent or reverted",
        &["chain_id"]
    ).expect("metric registers once");

    pub static ref TX_INCLUSION_LATENCY: HistogramVec = register_histogram_vec!(
        "crossdomain_transaction_inclusion_seconds",
        "Time from broadcast to receipt",
        &["chain_id"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).expect("metric registers once");

    // Execution metrics
    pub static ref EXECUTIONS: CounterVec = register_counter_vec!(
        "crossdomain_executions_total",
        "Total withdrawal executions and ticket redeems by outcome",
        &["kind", "outcome"]
    ).expect("metric registers once");
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> BridgeResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| BridgeError::Internal(format!("cannot bind {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| BridgeError::Internal(format!("metrics server failed: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

// Helper functions to record metrics

pub fn record_chain_health(chain_id: u64, healthy: bool) {
    CHAIN_CONNECTED
        .with_label_values(&[&chain_id.to_string()])
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_poll(direction: Direction) {
    STATUS_POLLS
        .with_label_values(&[&direction.to_string()])
        .inc();
}

pub fn record_poll_error(direction: Direction) {
    STATUS_POLL_ERRORS
        .with_label_values(&[&direction.to_string()])
        .inc();
}

pub fn record_status_transition(status: &MessageStatus) {
    STATUS_TRANSITIONS
        .with_label_values(&[&status.to_string()])
        .inc();
}

pub fn record_fee_estimate(success: bool) {
    FEE_ESTIMATES
        .with_label_values(&[if success { "ok" } else { "failed" }])
        .inc();
}

pub fn record_tx_submitted(chain_id: u64) {
    TX_SUBMITTED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_tx_failed(chain_id: u64) {
    TX_FAILED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_tx_latency(chain_id: u64, latency_secs: f64) {
    TX_INCLUSION_LATENCY
        .with_label_values(&[&chain_id.to_string()])
        .observe(latency_secs);
}

/// `kind` is `withdrawal` or `redeem`
pub fn record_execution(kind: &str, outcome: &str) {
    EXECUTIONS.with_label_values(&[kind, outcome]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::WithdrawalStatus;

    #[test]
    fn test_helpers_register_and_count() {
        record_poll(Direction::L2ToL1);
        record_status_transition(&MessageStatus::L2ToL1(WithdrawalStatus::Confirmed));
        record_execution("withdrawal", "already_executed");

        assert!(
            STATUS_POLLS
                .with_label_values(&["l2_to_l1"])
                .get()
                >= 1.0
        );
        assert!(
            STATUS_TRANSITIONS
                .with_label_values(&["CONFIRMED"])
                .get()
                >= 1.0
        );
    }

    #[tokio::test]
    async fn test_metrics_handler_renders_text() {
        record_fee_estimate(true);
        let body = metrics_handler().await.unwrap();
        assert!(body.contains("crossdomain_fee_estimates_total"));
    }
}
