use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::catalog::{Vehicle, VehicleSummary};
use crate::model::*;

/// Result of checking one vehicle for one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VehicleAvailability {
    pub available: bool,
    pub conflicts: Vec<AvailabilityBlock>,
}

impl VehicleAvailability {
    pub fn from_conflicts(conflicts: Vec<AvailabilityBlock>) -> Self {
        Self {
            available: conflicts.is_empty(),
            conflicts,
        }
    }
}

/// Which vehicles could take this party for this window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleSearch {
    pub date: NaiveDate,
    pub range: TimeRange,
    pub party_size: u32,
    pub brand_id: Option<BrandId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VehicleWithAvailability {
    pub vehicle: Vehicle,
    pub availability: VehicleAvailability,
}

/// Input to the booking-flow availability check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityRequest {
    pub date: NaiveDate,
    pub start_time: TimeOfDay,
    /// Fractional hours are rounded to the nearest minute.
    pub duration_hours: f64,
    pub party_size: u32,
    #[serde(default)]
    pub brand_id: Option<BrandId>,
}

/// Why a window cannot be offered. `Display` renders the customer-facing text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum UnavailableReason {
    OutsideOperatingHours {
        opening: TimeOfDay,
        closing: TimeOfDay,
    },
    PastDate,
    Blackout {
        reason: Option<String>,
    },
    /// Vehicles large enough exist; every one of them has a conflict.
    AllBooked,
    /// No active vehicle seats the party at all.
    NoCapacity {
        party_size: u32,
    },
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::OutsideOperatingHours { opening, closing } => {
                write!(f, "Tours must be between {opening} and {closing}")
            }
            UnavailableReason::PastDate => f.write_str("Cannot book tours in the past"),
            UnavailableReason::Blackout { reason } => {
                f.write_str(reason.as_deref().unwrap_or("Date unavailable"))
            }
            UnavailableReason::AllBooked => {
                f.write_str("All suitable vehicles are booked for this time slot")
            }
            UnavailableReason::NoCapacity { party_size } => write!(
                f,
                "No vehicles available with capacity for {party_size} guests"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityCheckResult {
    pub available: bool,
    /// Smallest free vehicle that seats the party.
    pub vehicle: Option<VehicleSummary>,
    /// Every free vehicle, smallest first. Includes `vehicle`.
    pub alternatives: Vec<VehicleSummary>,
    pub reason: Option<UnavailableReason>,
    pub start_time: TimeOfDay,
    /// `None` when the tour would run past midnight.
    pub end_time: Option<TimeOfDay>,
}

impl AvailabilityCheckResult {
    pub(super) fn unavailable(
        reason: UnavailableReason,
        start_time: TimeOfDay,
        end_time: Option<TimeOfDay>,
    ) -> Self {
        Self {
            available: false,
            vehicle: None,
            alternatives: Vec::new(),
            reason: Some(reason),
            start_time,
            end_time,
        }
    }

    pub fn vehicle_id(&self) -> Option<VehicleId> {
        self.vehicle.as_ref().map(|v| v.id)
    }

    pub fn reason_text(&self) -> Option<String> {
        self.reason.as_ref().map(ToString::to_string)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockMeta {
    pub brand_id: Option<BrandId>,
    pub created_by: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldRequest {
    pub vehicle_id: VehicleId,
    pub date: NaiveDate,
    pub range: TimeRange,
    pub meta: BlockMeta,
}

/// A placed hold. Can only be converted into a booking or released; the
/// service methods that do either consume it.
#[must_use = "a hold must be converted or released"]
#[derive(Debug, PartialEq, Eq)]
pub struct Hold {
    block: AvailabilityBlock,
}

impl Hold {
    pub(super) fn new(block: AvailabilityBlock) -> Self {
        Self { block }
    }

    /// Id to carry across requests, for `convert_hold_to_booking` or
    /// `release_hold_block`.
    pub fn id(&self) -> BlockId {
        self.block.id
    }

    pub fn block(&self) -> &AvailabilityBlock {
        &self.block
    }
}

/// Operator downtime: maintenance or blackout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DowntimeRequest {
    pub vehicle_id: VehicleId,
    pub date: NaiveDate,
    pub range: TimeRange,
    pub reason: String,
    pub created_by: Option<String>,
}

/// A booking written directly, without a hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingBlockRequest {
    pub vehicle_id: VehicleId,
    pub date: NaiveDate,
    pub range: TimeRange,
    pub booking_id: BookingId,
    pub meta: BlockMeta,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferRequest {
    pub vehicle_id: VehicleId,
    pub date: NaiveDate,
    pub booking: TimeRange,
    /// Defaults to the policy's buffer length.
    pub buffer_minutes: Option<u32>,
    pub booking_id: BookingId,
}

/// A block as shown on a calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockView {
    #[serde(flatten)]
    pub block: AvailabilityBlock,
    pub vehicle_name: Option<String>,
    pub booking_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotQuery {
    pub date: NaiveDate,
    pub duration_hours: f64,
    pub party_size: u32,
    #[serde(default)]
    pub brand_id: Option<BrandId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeSlot {
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub available: bool,
    pub vehicle: Option<VehicleSummary>,
    pub reason: Option<UnavailableReason>,
}
