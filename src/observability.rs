use std::net::SocketAddr;

use crate::engine::EngineError;

// ── Request-driven metrics ──────────────────────────────────────

/// Counter: reservations committed.
pub const RESERVATIONS_CREATED_TOTAL: &str = "spacebook_reservations_created_total";

/// Counter: reservations updated.
pub const RESERVATIONS_UPDATED_TOTAL: &str = "spacebook_reservations_updated_total";

/// Counter: requests refused by validation. Labels: reason.
pub const REQUESTS_REJECTED_TOTAL: &str = "spacebook_requests_rejected_total";

/// Counter: status transitions applied. Labels: transition.
pub const TRANSITIONS_TOTAL: &str = "spacebook_transitions_total";

/// Counter: guarded transitions that found the status already moved.
pub const TRANSITIONS_NOOP_TOTAL: &str = "spacebook_transitions_noop_total";

// ── Scheduler ───────────────────────────────────────────────────

/// Histogram: reconciliation scan duration in seconds.
pub const SCAN_DURATION_SECONDS: &str = "spacebook_scan_duration_seconds";

/// Gauge: deferred tasks currently armed.
pub const ARMED_TASKS: &str = "spacebook_armed_tasks";

/// Counter: deferred transitions that failed and wait for the next scan.
pub const SCHEDULED_FAILURES_TOTAL: &str = "spacebook_scheduled_failures_total";

// ── Storage ─────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "spacebook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "spacebook_wal_flush_batch_size";

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

/// Short label for an error, used as the `reason` metric label.
pub fn error_label(err: &EngineError) -> &'static str {
    match err {
        EngineError::InvalidWindow { .. } => "invalid_window",
        EngineError::InvalidDuration(_) => "invalid_duration",
        EngineError::InvalidInput(_) => "invalid_input",
        EngineError::NotFound(_) => "not_found",
        EngineError::BuildingNotFound(_) => "building_not_found",
        EngineError::BuildingNotPublished(_) => "building_not_published",
        EngineError::Unavailable { .. } => "unavailable",
        EngineError::NoPermission { .. } => "no_permission",
        EngineError::AlreadyTerminal { .. } => "already_terminal",
        EngineError::IllegalTransition { .. } => "illegal_transition",
        EngineError::StatusChanged { .. } => "status_changed",
        EngineError::AlreadyExists(_) => "already_exists",
        EngineError::LimitExceeded(_) => "limit_exceeded",
        EngineError::StoreUnavailable(_) => "store_unavailable",
        EngineError::WalError(_) => "wal_error",
    }
}

pub fn record_rejection(err: &EngineError) {
    metrics::counter!(REQUESTS_REJECTED_TOTAL, "reason" => error_label(err)).increment(1);
}
