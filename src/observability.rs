use std::net::SocketAddr;

use metrics_exporter_prometheus::BuildError;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total statements executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "carlot_queries_total";

/// Histogram: statement latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "carlot_query_duration_seconds";

// ── Booking domain ──────────────────────────────────────────────

/// Counter: rentals created.
pub const RENTALS_TOTAL: &str = "carlot_rentals_total";

/// Counter: lifecycle transitions applied. Labels: transition.
pub const TRANSITIONS_TOTAL: &str = "carlot_transitions_total";

/// Counter: bookings refused because the car was already held.
pub const CONFLICTS_TOTAL: &str = "carlot_conflicts_total";

/// Counter: car lock waits that timed out.
pub const LOCK_TIMEOUTS_TOTAL: &str = "carlot_lock_timeouts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "carlot_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "carlot_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "carlot_connections_rejected_total";

/// Counter: connections that ended in a protocol or auth error.
pub const CONNECTION_ERRORS_TOTAL: &str = "carlot_connection_errors_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "carlot_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "carlot_wal_flush_batch_size";

/// Counter: failed WAL writes.
pub const WAL_ERRORS_TOTAL: &str = "carlot_wal_errors_total";

/// Counter: completed WAL compactions.
pub const WAL_COMPACTIONS_TOTAL: &str = "carlot_wal_compactions_total";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertAgency { .. } => "insert_agency",
        Command::InsertUser { .. } => "insert_user",
        Command::InsertCar { .. } => "insert_car",
        Command::UpdateCar { .. } => "update_car",
        Command::DeleteCar { .. } => "delete_car",
        Command::InsertRental(_) => "insert_rental",
        Command::UpdateRental { .. } => "update_rental",
        Command::DeleteRental { .. } => "delete_rental",
        Command::SelectRental { .. } => "select_rental",
        Command::SelectRentals { .. } => "select_rentals",
        Command::SelectCars { .. } => "select_cars",
        Command::SelectAgencies => "select_agencies",
        Command::SelectConflicts { .. } => "select_conflicts",
    }
}
