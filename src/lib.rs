//! Vehicle availability and double-booking prevention for tour bookings.
//!
//! Booking flows ask [`AvailabilityService::check_availability`] for a vehicle,
//! place a hold with [`AvailabilityService::create_hold_block`], and then either
//! convert it into a booking or release it. The store's atomic overlap check is
//! what keeps two bookings off the same vehicle at the same time.

pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod reaper;
pub mod service;
pub mod store;
mod wal;

pub use catalog::{FleetCatalog, StaticCatalog, Vehicle, VehicleStatus, VehicleSummary};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, LedgerSettings, SchedulingPolicy};
pub use error::AvailabilityError;
pub use model::{
    AvailabilityBlock, BlockEvent, BlockId, BlockKind, BlockType, BookingId, BrandId, TimeOfDay,
    TimeRange, VehicleId,
};
pub use service::AvailabilityService;
pub use store::{AvailabilityStore, BlockLedger, DeleteGuard, GuardedDelete, StoreError};
