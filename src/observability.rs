use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total API requests. Labels: route, status.
pub const REQUESTS_TOTAL: &str = "conflictd_requests_total";

/// Histogram: store query latency in seconds. Labels: route.
pub const QUERY_DURATION_SECONDS: &str = "conflictd_query_duration_seconds";

/// Counter: queries cut off by the server-side timeout. Labels: route.
pub const QUERY_TIMEOUTS_TOTAL: &str = "conflictd_query_timeouts_total";

/// Counter: overlaps reported by check-conflicts.
pub const CONFLICTS_REPORTED_TOTAL: &str = "conflictd_conflicts_reported_total";

// ── Orchestrator side ───────────────────────────────────────────

/// Counter: assignments that proceeded under the degraded fallback.
pub const DEGRADED_FALLBACKS_TOTAL: &str = "conflictd_degraded_fallbacks_total";

/// Counter: breaker transitions. Labels: to.
pub const BREAKER_TRANSITIONS_TOTAL: &str = "conflictd_breaker_transitions_total";

/// Gauge: 1 while degraded, 0 while available.
pub const BREAKER_DEGRADED: &str = "conflictd_breaker_degraded";

/// Counter: assignments committed despite conflicts (force override).
pub const FORCED_OVERRIDES_TOTAL: &str = "conflictd_forced_overrides_total";

// ── Store ───────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "conflictd_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (appends per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "conflictd_wal_flush_batch_size";

/// Install the env-filtered fmt subscriber unless one is already set.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init_metrics(port: Option<u16>) -> anyhow::Result<()> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
