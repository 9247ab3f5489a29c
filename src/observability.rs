//! Metric names. The embedding application installs the recorder.

use crate::service::UnavailableReason;

// ── Booking flow ────────────────────────────────────────────────

/// Counter: holds successfully placed.
pub const HOLDS_CREATED_TOTAL: &str = "fleet_holds_created_total";

/// Counter: holds converted into bookings.
pub const HOLDS_CONVERTED_TOTAL: &str = "fleet_holds_converted_total";

/// Counter: holds released before conversion.
pub const HOLDS_RELEASED_TOTAL: &str = "fleet_holds_released_total";

/// Counter: inserts rejected by the exclusion check. Labels: operation.
pub const CONFLICTS_TOTAL: &str = "fleet_block_conflicts_total";

/// Counter: expired holds deleted by a sweep.
pub const EXPIRED_HOLDS_SWEPT_TOTAL: &str = "fleet_expired_holds_swept_total";

/// Counter: buffer inserts skipped because of an error.
pub const BUFFERS_SKIPPED_TOTAL: &str = "fleet_buffers_skipped_total";

// ── Availability queries ────────────────────────────────────────

/// Counter: availability checks answered. Labels: outcome.
pub const AVAILABILITY_CHECKS_TOTAL: &str = "fleet_availability_checks_total";

/// Histogram: availability check latency in seconds.
pub const AVAILABILITY_CHECK_DURATION_SECONDS: &str = "fleet_availability_check_duration_seconds";

// ── Ledger ──────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "fleet_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "fleet_wal_flush_batch_size";

/// Counter: WAL compactions completed.
pub const WAL_COMPACTIONS_TOTAL: &str = "fleet_wal_compactions_total";

/// Map a check outcome to a short label for metrics.
pub fn outcome_label(reason: Option<&UnavailableReason>) -> &'static str {
    match reason {
        None => "available",
        Some(UnavailableReason::OutsideOperatingHours { .. }) => "outside_hours",
        Some(UnavailableReason::PastDate) => "past_date",
        Some(UnavailableReason::Blackout { .. }) => "blackout",
        Some(UnavailableReason::AllBooked) => "all_booked",
        Some(UnavailableReason::NoCapacity { .. }) => "no_capacity",
    }
}
