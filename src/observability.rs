use std::net::SocketAddr;
use std::time::Instant;

use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: engine operations executed. Labels: op, status.
pub const OPERATIONS_TOTAL: &str = "shopfloor_operations_total";

/// Histogram: operation latency in seconds. Labels: op.
pub const OPERATION_DURATION_SECONDS: &str = "shopfloor_operation_duration_seconds";

// ── Scheduler / recovery ────────────────────────────────────────

/// Counter: searches that ran past the lookahead horizon.
pub const SCHEDULER_EXHAUSTED_TOTAL: &str = "shopfloor_scheduler_exhausted_total";

/// Counter: chosen bay was taken between search and reserve; search re-ran.
pub const SCHEDULER_RETRIES_TOTAL: &str = "shopfloor_scheduler_retries_total";

/// Counter: overdue tasks moved to a new window.
pub const TASKS_RELOCATED_TOTAL: &str = "shopfloor_tasks_relocated_total";

/// Counter: overdue tasks left for the next sweep.
pub const RELOCATIONS_DEFERRED_TOTAL: &str = "shopfloor_relocations_deferred_total";

/// Counter: relocations that hit a storage or collaborator fault.
pub const RELOCATIONS_FAILED_TOTAL: &str = "shopfloor_relocations_failed_total";

/// Counter: notification sink failures.
pub const NOTIFY_FAILURES_TOTAL: &str = "shopfloor_notify_failures_total";

// ── WAL ─────────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "shopfloor_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (entries per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "shopfloor_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Count and time one engine call.
pub fn record<T>(op: &'static str, started: Instant, result: &Result<T, EngineError>) {
    let status = match result {
        Ok(_) => "ok",
        Err(e) => e.code(),
    };
    metrics::counter!(OPERATIONS_TOTAL, "op" => op, "status" => status).increment(1);
    metrics::histogram!(OPERATION_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
}
