//! Persistence of availability blocks.
//!
//! Every implementation must make the overlap check and the insert a single
//! atomic step per `(vehicle_id, date)`: two writers racing for overlapping
//! time on the same vehicle see exactly one success and one
//! [`StoreError::Exclusion`]. The service never locks on its own.

mod day;
mod error;
mod ledger;
#[cfg(feature = "postgres")]
mod postgres;

pub use day::DaySchedule;
pub use error::StoreError;
pub use ledger::BlockLedger;
#[cfg(feature = "postgres")]
pub use postgres::{PgBlockStore, PgFleetCatalog};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::model::*;

/// Which block types a guarded delete may remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteGuard {
    HoldOnly,
    NotBooking,
}

impl DeleteGuard {
    pub fn allows(self, block_type: BlockType) -> bool {
        match self {
            DeleteGuard::HoldOnly => block_type == BlockType::Hold,
            DeleteGuard::NotBooking => block_type != BlockType::Booking,
        }
    }
}

/// Outcome of [`AvailabilityStore::delete_block_guarded`].
#[derive(Debug, Clone, PartialEq)]
pub enum GuardedDelete {
    Deleted(AvailabilityBlock),
    /// The block exists but its type is not allowed. Nothing was removed.
    Refused(BlockType),
    Missing,
}

#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    /// Insert a block, assigning its id. Fails with `Exclusion` if it overlaps
    /// any stored block (expired holds included) on the same vehicle and date.
    async fn insert_block(&self, block: NewBlock) -> Result<AvailabilityBlock, StoreError>;

    async fn get_block(&self, id: BlockId) -> Result<Option<AvailabilityBlock>, StoreError>;

    /// Turn a hold into a booking and clear its notes. `None` if no hold with
    /// this id exists any more.
    async fn convert_hold(
        &self,
        id: BlockId,
        booking_id: BookingId,
    ) -> Result<Option<AvailabilityBlock>, StoreError>;

    /// Remove a block, returning it. `None` if it did not exist.
    async fn delete_block(&self, id: BlockId) -> Result<Option<AvailabilityBlock>, StoreError>;

    /// Remove a block only if `guard` allows its current type. The type check
    /// and the delete are one atomic step, so a concurrent conversion either
    /// lands first and is refused or lands after and finds nothing.
    async fn delete_block_guarded(
        &self,
        id: BlockId,
        guard: DeleteGuard,
    ) -> Result<GuardedDelete, StoreError>;

    /// Remove every block (booking and buffers) that references `booking_id`.
    async fn delete_booking_blocks(&self, booking_id: BookingId) -> Result<u64, StoreError>;

    /// Remove unconverted holds created before `cutoff`.
    async fn delete_expired_holds(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    /// [`delete_expired_holds`](Self::delete_expired_holds) for one vehicle and date.
    async fn delete_expired_holds_on(
        &self,
        vehicle_id: VehicleId,
        date: NaiveDate,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Blocks overlapping `range`, ignoring holds created before `hold_cutoff`.
    async fn find_overlapping(
        &self,
        vehicle_id: VehicleId,
        date: NaiveDate,
        range: TimeRange,
        hold_cutoff: DateTime<Utc>,
    ) -> Result<Vec<AvailabilityBlock>, StoreError>;

    async fn vehicle_day_blocks(
        &self,
        vehicle_id: VehicleId,
        date: NaiveDate,
    ) -> Result<Vec<AvailabilityBlock>, StoreError>;

    async fn day_blocks(&self, date: NaiveDate) -> Result<Vec<AvailabilityBlock>, StoreError>;

    /// Blocks dated within `[start, end]`, optionally for one vehicle.
    async fn blocks_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        vehicle_id: Option<VehicleId>,
    ) -> Result<Vec<AvailabilityBlock>, StoreError>;
}
