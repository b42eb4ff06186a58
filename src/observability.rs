use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: HTTP requests served. Labels: route, status.
pub const REQUESTS_TOTAL: &str = "slotkeeper_requests_total";

/// Histogram: HTTP request latency in seconds. Labels: route.
pub const REQUEST_DURATION_SECONDS: &str = "slotkeeper_request_duration_seconds";

/// Counter: reservation attempts. Labels: outcome.
pub const RESERVATIONS_TOTAL: &str = "slotkeeper_reservations_total";

/// Counter: week availability writes. Labels: outcome.
pub const WEEK_WRITES_TOTAL: &str = "slotkeeper_week_writes_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: time spent acquiring reservation locks, in seconds.
pub const LOCK_WAIT_SECONDS: &str = "slotkeeper_lock_wait_seconds";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotkeeper_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotkeeper_wal_flush_batch_size";

/// Counter: WAL compactions. Labels: outcome.
pub const WAL_COMPACTIONS_TOTAL: &str = "slotkeeper_wal_compactions_total";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> anyhow::Result<()> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
