use crate::error::AvailabilityError;
use crate::model::*;
use crate::observability;
use crate::store::{DeleteGuard, GuardedDelete, StoreError};

use super::*;

pub(crate) const HOLD_CONFLICT_MESSAGE: &str =
    "Time slot is no longer available. Another booking was just made for this time.";
pub(crate) const MAINTENANCE_CONFLICT_MESSAGE: &str =
    "Cannot create maintenance block - time slot has existing bookings";
pub(crate) const BLACKOUT_CONFLICT_MESSAGE: &str =
    "Cannot create blackout block - time slot has existing bookings";
pub(crate) const BOOKING_DELETE_MESSAGE: &str =
    "Cannot delete booking blocks directly. Cancel the booking instead.";

fn not_a_hold(id: BlockId, block_type: BlockType) -> AvailabilityError {
    AvailabilityError::Validation(format!("Block {id} is a {block_type} block, not a hold"))
}

impl AvailabilityService {
    fn new_block(
        &self,
        vehicle_id: VehicleId,
        date: chrono::NaiveDate,
        range: TimeRange,
        kind: BlockKind,
        meta: BlockMeta,
    ) -> NewBlock {
        NewBlock {
            vehicle_id,
            date,
            range,
            kind,
            brand_id: meta.brand_id,
            created_by: meta.created_by,
            notes: meta.notes,
            created_at: self.clock.now(),
        }
    }

    /// Insert; on exclusion, sweep expired holds on that vehicle and date and
    /// try once more, since an expired hold nobody has swept yet still
    /// occupies its window in the store. A failed sweep is only logged.
    async fn insert_sweeping_expired(
        &self,
        block: NewBlock,
    ) -> Result<AvailabilityBlock, StoreError> {
        match self.store.insert_block(block.clone()).await {
            Err(StoreError::Exclusion { .. }) => {}
            other => return other,
        }
        match self
            .store
            .delete_expired_holds_on(block.vehicle_id, block.date, self.hold_cutoff())
            .await
        {
            Ok(0) => {}
            Ok(swept) => {
                metrics::counter!(observability::EXPIRED_HOLDS_SWEPT_TOTAL).increment(swept);
            }
            Err(e) => tracing::warn!(
                vehicle_id = %block.vehicle_id,
                date = %block.date,
                "expired hold sweep before retry failed: {e}"
            ),
        }
        self.store.insert_block(block).await
    }

    /// Insert, turning an exclusion into `Conflict(message)`.
    async fn insert_or_conflict(
        &self,
        block: NewBlock,
        operation: &'static str,
        message: &str,
    ) -> Result<AvailabilityBlock, AvailabilityError> {
        match self.insert_sweeping_expired(block).await {
            Ok(block) => Ok(block),
            Err(StoreError::Exclusion {
                vehicle_id,
                date,
                conflicting,
            }) => {
                metrics::counter!(observability::CONFLICTS_TOTAL, "operation" => operation)
                    .increment(1);
                tracing::info!(
                    %vehicle_id,
                    %date,
                    ?conflicting,
                    operation,
                    "insert lost to an overlapping block"
                );
                Err(AvailabilityError::Conflict(message.to_string()))
            }
            Err(StoreError::LimitExceeded(what)) => Err(AvailabilityError::Validation(what.into())),
            Err(e) => Err(e.into()),
        }
    }

    /// `NotFound` if the id is gone, `Validation` if it is not a hold.
    async fn require_hold(&self, id: BlockId) -> Result<AvailabilityBlock, AvailabilityError> {
        let block = self
            .store
            .get_block(id)
            .await?
            .ok_or(AvailabilityError::NotFound(id))?;
        if block.kind != BlockKind::Hold {
            return Err(not_a_hold(id, block.block_type()));
        }
        Ok(block)
    }

    // ── Holds ────────────────────────────────────────────────────

    /// Reserve a window provisionally. Losing a race for it is a `Conflict`.
    pub async fn create_hold_block(&self, request: HoldRequest) -> Result<Hold, AvailabilityError> {
        validate_meta(request.meta.created_by.as_deref(), request.meta.notes.as_deref())?;
        let block = self.new_block(
            request.vehicle_id,
            request.date,
            request.range,
            BlockKind::Hold,
            request.meta,
        );
        let block = self
            .insert_or_conflict(block, "hold", HOLD_CONFLICT_MESSAGE)
            .await?;
        metrics::counter!(observability::HOLDS_CREATED_TOTAL).increment(1);
        tracing::info!(
            hold_id = %block.id,
            vehicle_id = %block.vehicle_id,
            date = %block.date,
            range = %block.range,
            "hold placed"
        );
        Ok(Hold::new(block))
    }

    /// Turn the hold `hold_block_id` into a confirmed booking.
    ///
    /// Rejects ids that no longer name a hold: a booking cannot be converted
    /// again and other block kinds are not reservations.
    pub async fn convert_hold_to_booking(
        &self,
        hold_block_id: BlockId,
        booking_id: BookingId,
    ) -> Result<AvailabilityBlock, AvailabilityError> {
        self.require_hold(hold_block_id).await?;
        let converted = self
            .store
            .convert_hold(hold_block_id, booking_id)
            .await?
            .ok_or(AvailabilityError::NotFound(hold_block_id))?;
        metrics::counter!(observability::HOLDS_CONVERTED_TOTAL).increment(1);
        tracing::info!(hold_id = %hold_block_id, %booking_id, "hold converted to booking");
        Ok(converted)
    }

    pub async fn convert_hold(
        &self,
        hold: Hold,
        booking_id: BookingId,
    ) -> Result<AvailabilityBlock, AvailabilityError> {
        self.convert_hold_to_booking(hold.id(), booking_id).await
    }

    /// Drop a hold after the booking attempt behind it failed.
    pub async fn release_hold_block(&self, hold_block_id: BlockId) -> Result<(), AvailabilityError> {
        match self
            .store
            .delete_block_guarded(hold_block_id, DeleteGuard::HoldOnly)
            .await?
        {
            GuardedDelete::Deleted(_) => {}
            GuardedDelete::Refused(block_type) => {
                return Err(not_a_hold(hold_block_id, block_type));
            }
            GuardedDelete::Missing => return Err(AvailabilityError::NotFound(hold_block_id)),
        }
        metrics::counter!(observability::HOLDS_RELEASED_TOTAL).increment(1);
        tracing::info!(hold_id = %hold_block_id, "hold released");
        Ok(())
    }

    pub async fn release_hold(&self, hold: Hold) -> Result<(), AvailabilityError> {
        self.release_hold_block(hold.id()).await
    }

    // ── Operator blocks ──────────────────────────────────────────

    pub async fn create_maintenance_block(
        &self,
        request: DowntimeRequest,
    ) -> Result<AvailabilityBlock, AvailabilityError> {
        self.create_downtime(request, BlockKind::Maintenance, MAINTENANCE_CONFLICT_MESSAGE)
            .await
    }

    pub async fn create_blackout_block(
        &self,
        request: DowntimeRequest,
    ) -> Result<AvailabilityBlock, AvailabilityError> {
        self.create_downtime(request, BlockKind::Blackout, BLACKOUT_CONFLICT_MESSAGE)
            .await
    }

    async fn create_downtime(
        &self,
        request: DowntimeRequest,
        kind: BlockKind,
        conflict_message: &str,
    ) -> Result<AvailabilityBlock, AvailabilityError> {
        validate_meta(request.created_by.as_deref(), Some(request.reason.as_str()))?;
        let meta = BlockMeta {
            brand_id: None,
            created_by: request.created_by,
            notes: Some(request.reason),
        };
        let block = self.new_block(request.vehicle_id, request.date, request.range, kind, meta);
        let operation = kind.block_type().as_str();
        let block = self
            .insert_or_conflict(block, operation, conflict_message)
            .await?;
        tracing::info!(
            block_id = %block.id,
            vehicle_id = %block.vehicle_id,
            date = %block.date,
            range = %block.range,
            "{operation} block created"
        );
        Ok(block)
    }

    // ── Bookings ─────────────────────────────────────────────────

    /// Write a booking straight away, for flows that skip the hold step.
    pub async fn create_booking_block(
        &self,
        request: BookingBlockRequest,
    ) -> Result<AvailabilityBlock, AvailabilityError> {
        validate_meta(request.meta.created_by.as_deref(), request.meta.notes.as_deref())?;
        let block = self.new_block(
            request.vehicle_id,
            request.date,
            request.range,
            BlockKind::Booking {
                booking_id: request.booking_id,
            },
            request.meta,
        );
        let block = self
            .insert_or_conflict(block, "booking", HOLD_CONFLICT_MESSAGE)
            .await?;
        tracing::info!(
            block_id = %block.id,
            booking_id = %request.booking_id,
            vehicle_id = %block.vehicle_id,
            "booking block created"
        );
        Ok(block)
    }

    /// Prep and cleanup time around a booking, clipped to operating hours.
    ///
    /// Best effort: a buffer that would overlap anything is skipped, and no
    /// failure reaches the caller. Returns the buffers actually written.
    pub async fn create_buffer_blocks(&self, request: BufferRequest) -> Vec<AvailabilityBlock> {
        let minutes = request
            .buffer_minutes
            .unwrap_or(self.policy.default_buffer_minutes);
        if minutes == 0 {
            return Vec::new();
        }
        let before_start = request
            .booking
            .start
            .checked_sub_minutes(minutes)
            .unwrap_or(TimeOfDay::MIDNIGHT);
        let after_end = request
            .booking
            .end
            .checked_add_minutes(minutes)
            .unwrap_or(TimeOfDay::END_OF_DAY);
        let windows = [
            TimeRange::new(before_start, request.booking.start),
            TimeRange::new(request.booking.end, after_end),
        ];

        let mut created = Vec::new();
        for window in windows
            .into_iter()
            .flatten()
            .filter_map(|w| w.clamp_to(&self.operating_hours))
        {
            let block = self.new_block(
                request.vehicle_id,
                request.date,
                window,
                BlockKind::Buffer {
                    booking_id: request.booking_id,
                },
                BlockMeta::default(),
            );
            match self.store.insert_block(block).await {
                Ok(block) => created.push(block),
                Err(e) => {
                    metrics::counter!(observability::BUFFERS_SKIPPED_TOTAL).increment(1);
                    tracing::debug!(
                        booking_id = %request.booking_id,
                        %window,
                        "buffer skipped: {e}"
                    );
                }
            }
        }
        created
    }

    // ── Deletion ─────────────────────────────────────────────────

    /// Delete a non-booking block. Bookings go through
    /// [`delete_booking_blocks`](Self::delete_booking_blocks).
    pub async fn delete_block(&self, block_id: BlockId) -> Result<AvailabilityBlock, AvailabilityError> {
        let deleted = match self
            .store
            .delete_block_guarded(block_id, DeleteGuard::NotBooking)
            .await?
        {
            GuardedDelete::Deleted(block) => block,
            GuardedDelete::Refused(_) => {
                return Err(AvailabilityError::Validation(BOOKING_DELETE_MESSAGE.into()));
            }
            GuardedDelete::Missing => return Err(AvailabilityError::NotFound(block_id)),
        };
        tracing::info!(%block_id, block_type = %deleted.block_type(), "block deleted");
        Ok(deleted)
    }

    /// Free a cancelled booking's time: the booking block and its buffers.
    pub async fn delete_booking_blocks(&self, booking_id: BookingId) -> Result<u64, AvailabilityError> {
        let deleted = self.store.delete_booking_blocks(booking_id).await?;
        tracing::info!(%booking_id, deleted, "booking blocks deleted");
        Ok(deleted)
    }
}
