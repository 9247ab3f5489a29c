use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub type BlockId = Ulid;
pub type VehicleId = Ulid;
pub type BookingId = Ulid;
pub type BrandId = Ulid;

pub const MINUTES_PER_DAY: u16 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid time of day: {0:?} (expected HH:MM between 00:00 and 24:00)")]
pub struct InvalidTime(pub String);

/// Wall-clock time within a single day, stored as minutes since midnight.
///
/// `24:00` is representable so that a block may end exactly at midnight;
/// nothing ever wraps into the next day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay(0);
    pub const END_OF_DAY: TimeOfDay = TimeOfDay(MINUTES_PER_DAY);

    pub fn from_minutes(minutes: u16) -> Option<Self> {
        (minutes <= MINUTES_PER_DAY).then_some(Self(minutes))
    }

    pub fn from_hm(hour: u16, minute: u16) -> Option<Self> {
        if minute >= 60 {
            return None;
        }
        Self::from_minutes(hour.checked_mul(60)?.checked_add(minute)?)
    }

    pub fn minutes(self) -> u16 {
        self.0
    }

    pub fn hour(self) -> u16 {
        self.0 / 60
    }

    pub fn minute(self) -> u16 {
        self.0 % 60
    }

    /// `None` when the result would pass 24:00.
    pub fn checked_add_minutes(self, minutes: u32) -> Option<Self> {
        let total = u32::from(self.0).checked_add(minutes)?;
        u16::try_from(total).ok().and_then(Self::from_minutes)
    }

    /// `None` when the result would fall before 00:00.
    pub fn checked_sub_minutes(self, minutes: u32) -> Option<Self> {
        let total = u32::from(self.0).checked_sub(minutes)?;
        u16::try_from(total).ok().and_then(Self::from_minutes)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for TimeOfDay {
    type Err = InvalidTime;

    /// Accepts `HH:MM` and `HH:MM:SS` (seconds must be zero).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidTime(s.to_string());
        let mut parts = s.trim().split(':');
        let hour: u16 = parts.next().and_then(|h| h.parse().ok()).ok_or_else(invalid)?;
        let minute: u16 = parts.next().and_then(|m| m.parse().ok()).ok_or_else(invalid)?;
        if let Some(sec) = parts.next() {
            let sec: u16 = sec.parse().map_err(|_| invalid())?;
            if sec != 0 {
                return Err(invalid());
            }
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Self::from_hm(hour, minute).ok_or_else(invalid)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = InvalidTime;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

/// Half-open interval `[start, end)` within one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl TimeRange {
    /// `None` unless `start < end`.
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration_minutes(&self) -> u32 {
        u32::from(self.end.minutes() - self.start.minutes())
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_range(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Clip to `bounds`; `None` if nothing is left.
    pub fn clamp_to(&self, bounds: &TimeRange) -> Option<TimeRange> {
        TimeRange::new(self.start.max(bounds.start), self.end.min(bounds.end))
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Flat discriminant of [`BlockKind`], as stored in the `block_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Booking,
    Maintenance,
    Hold,
    Buffer,
    Blackout,
}

impl BlockType {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockType::Booking => "booking",
            BlockType::Maintenance => "maintenance",
            BlockType::Hold => "hold",
            BlockType::Buffer => "buffer",
            BlockType::Blackout => "blackout",
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "booking" => Ok(BlockType::Booking),
            "maintenance" => Ok(BlockType::Maintenance),
            "hold" => Ok(BlockType::Hold),
            "buffer" => Ok(BlockType::Buffer),
            "blackout" => Ok(BlockType::Blackout),
            other => Err(format!("unknown block type: {other}")),
        }
    }
}

/// What a block represents. The booking reference lives on the variants that
/// can carry one, so a hold can never hold a booking id and a booking can never
/// lack one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    /// Confirmed reservation.
    Booking { booking_id: BookingId },
    /// Provisional reservation; expires unless converted.
    Hold,
    /// Operator-imposed downtime.
    Maintenance,
    /// Prep/cleanup time next to a booking. Advisory.
    Buffer { booking_id: BookingId },
    /// Operator-imposed unavailability.
    Blackout,
}

impl BlockKind {
    pub fn block_type(&self) -> BlockType {
        match self {
            BlockKind::Booking { .. } => BlockType::Booking,
            BlockKind::Hold => BlockType::Hold,
            BlockKind::Maintenance => BlockType::Maintenance,
            BlockKind::Buffer { .. } => BlockType::Buffer,
            BlockKind::Blackout => BlockType::Blackout,
        }
    }

    pub fn booking_id(&self) -> Option<BookingId> {
        match self {
            BlockKind::Booking { booking_id } | BlockKind::Buffer { booking_id } => {
                Some(*booking_id)
            }
            _ => None,
        }
    }

    /// Rebuild from the stored `(block_type, booking_id)` pair.
    pub fn from_parts(block_type: BlockType, booking_id: Option<BookingId>) -> Result<Self, String> {
        match (block_type, booking_id) {
            (BlockType::Booking, Some(booking_id)) => Ok(BlockKind::Booking { booking_id }),
            (BlockType::Buffer, Some(booking_id)) => Ok(BlockKind::Buffer { booking_id }),
            (BlockType::Hold, None) => Ok(BlockKind::Hold),
            (BlockType::Maintenance, None) => Ok(BlockKind::Maintenance),
            (BlockType::Blackout, None) => Ok(BlockKind::Blackout),
            (t, b) => Err(format!("block type {t} cannot have booking_id {b:?}")),
        }
    }
}

/// A time block on one vehicle for one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityBlock {
    pub id: BlockId,
    pub vehicle_id: VehicleId,
    pub date: NaiveDate,
    pub range: TimeRange,
    pub kind: BlockKind,
    pub brand_id: Option<BrandId>,
    pub created_by: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AvailabilityBlock {
    pub fn block_type(&self) -> BlockType {
        self.kind.block_type()
    }

    pub fn booking_id(&self) -> Option<BookingId> {
        self.kind.booking_id()
    }

    pub fn start_time(&self) -> TimeOfDay {
        self.range.start
    }

    pub fn end_time(&self) -> TimeOfDay {
        self.range.end
    }

    /// An unconverted hold created strictly before `cutoff`.
    pub fn is_expired_hold(&self, cutoff: DateTime<Utc>) -> bool {
        matches!(self.kind, BlockKind::Hold) && self.created_at < cutoff
    }
}

/// Insert request; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBlock {
    pub vehicle_id: VehicleId,
    pub date: NaiveDate,
    pub range: TimeRange,
    pub kind: BlockKind,
    pub brand_id: Option<BrandId>,
    pub created_by: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewBlock {
    pub fn into_block(self, id: BlockId) -> AvailabilityBlock {
        AvailabilityBlock {
            id,
            vehicle_id: self.vehicle_id,
            date: self.date,
            range: self.range,
            kind: self.kind,
            brand_id: self.brand_id,
            created_by: self.created_by,
            notes: self.notes,
            created_at: self.created_at,
        }
    }
}

/// Change log record for the ledger WAL and change notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockEvent {
    Created(AvailabilityBlock),
    Converted {
        id: BlockId,
        vehicle_id: VehicleId,
        date: NaiveDate,
        booking_id: BookingId,
    },
    Deleted {
        id: BlockId,
        vehicle_id: VehicleId,
        date: NaiveDate,
    },
}

impl BlockEvent {
    pub fn vehicle_id(&self) -> VehicleId {
        match self {
            BlockEvent::Created(block) => block.vehicle_id,
            BlockEvent::Converted { vehicle_id, .. } | BlockEvent::Deleted { vehicle_id, .. } => {
                *vehicle_id
            }
        }
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            BlockEvent::Created(block) => block.date,
            BlockEvent::Converted { date, .. } | BlockEvent::Deleted { date, .. } => *date,
        }
    }
}
