//! Metrics collection and exposition.
//!
//! # Metrics
//! - `checkout_sessions_created_total` (counter): sessions by mode (live, demo)
//! - `checkout_poll_checks_total` (counter): status checks by outcome (ok, missed)
//! - `checkout_quote_refreshes_total` (counter): refreshes by outcome
//! - `checkout_sessions_finished_total` (counter): terminal states reached
//! - `checkout_upgrades_total` (counter): upgrade hand-offs by outcome
//! - `checkout_upgrade_ledger_entries` (gauge): payers in the upgrade ledger

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Start the Prometheus scrape endpoint. Must be called inside a runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_session_created(mode: &'static str) {
    counter!("checkout_sessions_created_total", "mode" => mode).increment(1);
}

pub fn record_poll_check(outcome: &'static str) {
    counter!("checkout_poll_checks_total", "outcome" => outcome).increment(1);
}

pub fn record_quote_refresh(outcome: &'static str) {
    counter!("checkout_quote_refreshes_total", "outcome" => outcome).increment(1);
}

pub fn record_session_finished(state: &'static str) {
    counter!("checkout_sessions_finished_total", "state" => state).increment(1);
}

pub fn record_upgrade(outcome: &'static str) {
    counter!("checkout_upgrades_total", "outcome" => outcome).increment(1);
}

pub fn record_ledger_size(entries: usize) {
    gauge!("checkout_upgrade_ledger_entries").set(entries as f64);
}
