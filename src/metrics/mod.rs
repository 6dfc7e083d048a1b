//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Signing and submission attempts
//! - Resubmissions by cause
//! - Terminal outcomes
//! - Gas prices offered

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::path::Path;

lazy_static! {
    pub static ref SIGN_ATTEMPTS: CounterVec = register_counter_vec!(
        "tx_resubmitter_sign_attempts_total",
        "Total transactions signed",
        &["chain_id"]
    ).unwrap();

    pub static ref SUBMISSIONS: CounterVec = register_counter_vec!(
        "tx_resubmitter_submissions_total",
        "Total submissions by result (accepted or error class)",
        &["chain_id", "result"]
    ).unwrap();

    pub static ref RESUBMISSIONS: CounterVec = register_counter_vec!(
        "tx_resubmitter_resubmissions_total",
        "Total corrective resubmissions by cause",
        &["chain_id", "reason"]
    ).unwrap();

    pub static ref OUTCOMES: CounterVec = register_counter_vec!(
        "tx_resubmitter_outcomes_total",
        "Terminal outcomes (confirmed, unconfirmed, failed)",
        &["chain_id", "outcome"]
    ).unwrap();

    pub static ref FAILURES: CounterVec = register_counter_vec!(
        "tx_resubmitter_failures_total",
        "Terminal failures by error kind",
        &["chain_id", "kind"]
    ).unwrap();

    pub static ref GAS_PRICE: GaugeVec = register_gauge_vec!(
        "tx_resubmitter_gas_price_gwei",
        "Gas price of the most recently signed transaction",
        &["chain_id"]
    ).unwrap();

    pub static ref CONFIRMATION_LATENCY: HistogramVec = register_histogram_vec!(
        "tx_resubmitter_confirmation_latency_seconds",
        "Time from first signature to receipt",
        &["chain_id"],
        vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]
    ).unwrap();
}

/// Render all registered metrics in the text exposition format
pub fn render() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Write metrics for a node-exporter textfile collector
pub fn write_textfile(path: &Path) -> anyhow::Result<()> {
    std::fs::write(path, render()?)?;
    Ok(())
}

// Helper functions to record metrics

pub fn record_signed(chain_id: u64, gas_price_gwei: f64) {
    let chain = chain_id.to_string();
    SIGN_ATTEMPTS.with_label_values(&[&chain]).inc();
    GAS_PRICE.with_label_values(&[&chain]).set(gas_price_gwei);
}

pub fn record_submission(chain_id: u64, result: &str) {
    SUBMISSIONS
        .with_label_values(&[&chain_id.to_string(), result])
        .inc();
}

pub fn record_resubmission(chain_id: u64, reason: &str) {
    RESUBMISSIONS
        .with_label_values(&[&chain_id.to_string(), reason])
        .inc();
}

pub fn record_confirmed(chain_id: u64, latency_secs: f64) {
    let chain = chain_id.to_string();
    OUTCOMES.with_label_values(&[&chain, "confirmed"]).inc();
    CONFIRMATION_LATENCY
        .with_label_values(&[&chain])
        .observe(latency_secs);
}

pub fn record_unconfirmed(chain_id: u64) {
    OUTCOMES
        .with_label_values(&[&chain_id.to_string(), "unconfirmed"])
        .inc();
}

pub fn record_failed(chain_id: u64, kind: &str) {
    let chain = chain_id.to_string();
    OUTCOMES.with_label_values(&[&chain, "failed"]).inc();
    FAILURES.with_label_values(&[&chain, kind]).inc();
}
