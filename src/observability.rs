use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: scheduling operations executed. Labels: op, status.
pub const OPS_TOTAL: &str = "rota_ops_total";

/// Histogram: operation latency in seconds. Labels: op.
pub const OP_DURATION_SECONDS: &str = "rota_op_duration_seconds";

/// Counter: operations rejected with a domain conflict. Labels: op.
pub const CONFLICTS_TOTAL: &str = "rota_conflicts_total";

/// Counter: updates rejected on a stale version stamp.
pub const STALE_VERSIONS_TOTAL: &str = "rota_stale_versions_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: consultant partitions held in memory.
pub const CONSULTANTS_ACTIVE: &str = "rota_consultants_active";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "rota_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (records per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "rota_journal_flush_batch_size";

/// Install the default tracing subscriber (embedder convenience).
pub fn init_tracing() {
    tracing_subscriber::fmt::init();
}

/// Install the Prometheus metrics exporter on the given port.
/// No-op if `port` is `None`.
pub fn init_metrics(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
