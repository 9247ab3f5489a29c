//! Booking-flow entry points over an [`AvailabilityStore`] and a [`FleetCatalog`].
//!
//! The service keeps no mutable state of its own. Every "is this free?" answer
//! is advisory; the store's exclusion check on insert is what actually decides
//! who gets a window, and a lost race surfaces as [`AvailabilityError::Conflict`].

mod calendar;
mod checks;
mod holds;
mod types;

pub use types::*;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::catalog::FleetCatalog;
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, SchedulingPolicy};
use crate::error::AvailabilityError;
use crate::limits::*;
use crate::model::*;
use crate::observability;
use crate::store::AvailabilityStore;

pub struct AvailabilityService {
    store: Arc<dyn AvailabilityStore>,
    catalog: Arc<dyn FleetCatalog>,
    clock: Arc<dyn Clock>,
    policy: SchedulingPolicy,
    operating_hours: TimeRange,
}

impl AvailabilityService {
    pub fn new(
        store: Arc<dyn AvailabilityStore>,
        catalog: Arc<dyn FleetCatalog>,
        policy: SchedulingPolicy,
    ) -> Result<Self, ConfigError> {
        policy.validate()?;
        let operating_hours = policy.operating_hours().ok_or_else(|| {
            ConfigError::Invalid("operating hours must not be empty".into())
        })?;
        Ok(Self {
            store,
            catalog,
            clock: Arc::new(SystemClock),
            policy,
            operating_hours,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &SchedulingPolicy {
        &self.policy
    }

    pub fn operating_hours(&self) -> TimeRange {
        self.operating_hours
    }

    /// Holds created before this instant no longer count.
    fn hold_cutoff(&self) -> DateTime<Utc> {
        self.policy.hold_cutoff(self.clock.now())
    }

    /// Delete every hold older than the expiration window. Safe to call
    /// concurrently and repeatedly.
    pub async fn cleanup_expired_holds(&self) -> Result<u64, AvailabilityError> {
        let swept = self.store.delete_expired_holds(self.hold_cutoff()).await?;
        if swept > 0 {
            metrics::counter!(observability::EXPIRED_HOLDS_SWEPT_TOTAL).increment(swept);
            tracing::info!("swept {swept} expired holds");
        }
        Ok(swept)
    }

    /// Fire-and-forget sweep. Never fails the caller; a no-op outside a Tokio
    /// runtime.
    fn spawn_cleanup(&self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let store = self.store.clone();
        let cutoff = self.hold_cutoff();
        handle.spawn(async move {
            match store.delete_expired_holds(cutoff).await {
                Ok(0) => {}
                Ok(swept) => {
                    metrics::counter!(observability::EXPIRED_HOLDS_SWEPT_TOTAL).increment(swept);
                    tracing::debug!("background sweep removed {swept} expired holds");
                }
                Err(e) => tracing::warn!("background hold sweep failed: {e}"),
            }
        });
    }
}

// ── Input validation ─────────────────────────────────────────────

/// Whole minutes in `hours`, rounded.
fn duration_minutes(hours: f64) -> Result<u32, AvailabilityError> {
    if !hours.is_finite() || hours <= 0.0 {
        return Err(AvailabilityError::Validation(
            "Tour duration must be a positive number of hours".into(),
        ));
    }
    let minutes = (hours * 60.0).round();
    if minutes < 1.0 || minutes > f64::from(MAX_DURATION_MINUTES) {
        return Err(AvailabilityError::Validation(format!(
            "Tour duration must be between 1 minute and {} hours",
            MAX_DURATION_MINUTES / 60
        )));
    }
    Ok(minutes as u32)
}

fn validate_party_size(party_size: u32) -> Result<(), AvailabilityError> {
    if party_size == 0 || party_size > MAX_PARTY_SIZE {
        return Err(AvailabilityError::Validation(format!(
            "Party size must be between 1 and {MAX_PARTY_SIZE}"
        )));
    }
    Ok(())
}

fn validate_text(
    field: &str,
    value: Option<&str>,
    max_len: usize,
) -> Result<(), AvailabilityError> {
    if value.is_some_and(|v| v.len() > max_len) {
        return Err(AvailabilityError::Validation(format!(
            "{field} must be at most {max_len} characters"
        )));
    }
    Ok(())
}

fn validate_meta(created_by: Option<&str>, notes: Option<&str>) -> Result<(), AvailabilityError> {
    validate_text("created_by", created_by, MAX_ACTOR_LEN)?;
    validate_text("notes", notes, MAX_NOTES_LEN)
}
