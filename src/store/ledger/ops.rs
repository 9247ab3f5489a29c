use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::store::{AvailabilityStore, DaySchedule, DeleteGuard, GuardedDelete, StoreError};

use super::{BlockLedger, DayKey};

impl BlockLedger {
    /// Delete every block on `day` matching `predicate`. Caller holds the write lock.
    async fn delete_where(
        &self,
        day: &mut DaySchedule,
        predicate: impl Fn(&AvailabilityBlock) -> bool,
    ) -> Result<u64, StoreError> {
        let doomed: Vec<BlockId> = day
            .blocks
            .iter()
            .filter(|b| predicate(b))
            .map(|b| b.id)
            .collect();
        for id in &doomed {
            let event = BlockEvent::Deleted {
                id: *id,
                vehicle_id: day.vehicle_id,
                date: day.date,
            };
            self.persist_and_apply(day, &event).await?;
        }
        Ok(doomed.len() as u64)
    }

    /// [`delete_where`](Self::delete_where) on one day, pruning it if emptied.
    async fn delete_where_on(
        &self,
        key: DayKey,
        predicate: impl Fn(&AvailabilityBlock) -> bool,
    ) -> Result<u64, StoreError> {
        let Some(day) = self.get_day(key.0, key.1) else {
            return Ok(0);
        };
        let deleted = {
            let mut guard = day.write().await;
            self.delete_where(&mut guard, predicate).await?
        };
        drop(day);
        if deleted > 0 {
            self.prune_day(key);
        }
        Ok(deleted)
    }

    async fn collect_blocks(&self, days: Vec<super::SharedDay>) -> Vec<AvailabilityBlock> {
        let mut blocks = Vec::new();
        for day in days {
            blocks.extend(day.read().await.blocks.iter().cloned());
        }
        blocks
    }

    /// Delete `id` if `allowed` accepts its type, deciding under the day's
    /// write lock.
    async fn delete_guarded(
        &self,
        id: BlockId,
        allowed: impl Fn(BlockType) -> bool,
    ) -> Result<GuardedDelete, StoreError> {
        let Some(mut guard) = self.resolve_block_write(&id).await else {
            return Ok(GuardedDelete::Missing);
        };
        let Some(block) = guard.get(id).cloned() else {
            return Ok(GuardedDelete::Missing);
        };
        if !allowed(block.block_type()) {
            return Ok(GuardedDelete::Refused(block.block_type()));
        }
        let key = (guard.vehicle_id, guard.date);
        let event = BlockEvent::Deleted {
            id,
            vehicle_id: key.0,
            date: key.1,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        drop(guard);
        self.prune_day(key);
        Ok(GuardedDelete::Deleted(block))
    }
}

#[async_trait]
impl AvailabilityStore for BlockLedger {
    async fn insert_block(&self, block: NewBlock) -> Result<AvailabilityBlock, StoreError> {
        if block.notes.as_ref().is_some_and(|n| n.len() > MAX_NOTES_LEN) {
            return Err(StoreError::LimitExceeded("notes too long"));
        }
        let day = self.day_entry(block.vehicle_id, block.date);
        let mut guard = day.write().await;
        if guard.blocks.len() >= MAX_BLOCKS_PER_VEHICLE_DAY {
            return Err(StoreError::LimitExceeded("too many blocks on vehicle for this date"));
        }

        // Every stored block counts here, expired holds included: the store
        // is stricter than the logical availability view until they are swept.
        if let Some(existing) = guard.overlapping(&block.range).next() {
            return Err(StoreError::Exclusion {
                vehicle_id: block.vehicle_id,
                date: block.date,
                conflicting: Some(existing.id),
            });
        }

        let block = block.into_block(Ulid::new());
        self.persist_and_apply(&mut guard, &BlockEvent::Created(block.clone()))
            .await?;
        Ok(block)
    }

    async fn get_block(&self, id: BlockId) -> Result<Option<AvailabilityBlock>, StoreError> {
        let Some((vehicle_id, date)) = self.index.blocks.get(&id).map(|e| *e.value()) else {
            return Ok(None);
        };
        let Some(day) = self.get_day(vehicle_id, date) else {
            return Ok(None);
        };
        let guard = day.read().await;
        Ok(guard.get(id).cloned())
    }

    async fn convert_hold(
        &self,
        id: BlockId,
        booking_id: BookingId,
    ) -> Result<Option<AvailabilityBlock>, StoreError> {
        let Some(mut guard) = self.resolve_block_write(&id).await else {
            return Ok(None);
        };
        if !guard.get(id).is_some_and(|b| b.kind == BlockKind::Hold) {
            return Ok(None);
        }
        let event = BlockEvent::Converted {
            id,
            vehicle_id: guard.vehicle_id,
            date: guard.date,
            booking_id,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(guard.get(id).cloned())
    }

    async fn delete_block(&self, id: BlockId) -> Result<Option<AvailabilityBlock>, StoreError> {
        match self.delete_guarded(id, |_| true).await? {
            GuardedDelete::Deleted(block) => Ok(Some(block)),
            _ => Ok(None),
        }
    }

    async fn delete_block_guarded(
        &self,
        id: BlockId,
        guard: DeleteGuard,
    ) -> Result<GuardedDelete, StoreError> {
        self.delete_guarded(id, |t| guard.allows(t)).await
    }

    async fn delete_booking_blocks(&self, booking_id: BookingId) -> Result<u64, StoreError> {
        let mut deleted = 0;
        for key in self.days_for_booking(booking_id) {
            deleted += self
                .delete_where_on(key, |b| b.booking_id() == Some(booking_id))
                .await?;
        }
        Ok(deleted)
    }

    async fn delete_expired_holds(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut deleted = 0;
        for (vehicle_id, date) in self.day_keys() {
            deleted += self.delete_expired_holds_on(vehicle_id, date, cutoff).await?;
        }
        Ok(deleted)
    }

    async fn delete_expired_holds_on(
        &self,
        vehicle_id: VehicleId,
        date: NaiveDate,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let Some(day) = self.get_day(vehicle_id, date) else {
            return Ok(0);
        };
        // Read first: most days carry nothing to sweep and need no write lock.
        if !day.read().await.blocks.iter().any(|b| b.is_expired_hold(cutoff)) {
            return Ok(0);
        }
        drop(day);
        self.delete_where_on((vehicle_id, date), |b| b.is_expired_hold(cutoff))
            .await
    }

    async fn find_overlapping(
        &self,
        vehicle_id: VehicleId,
        date: NaiveDate,
        range: TimeRange,
        hold_cutoff: DateTime<Utc>,
    ) -> Result<Vec<AvailabilityBlock>, StoreError> {
        let Some(day) = self.get_day(vehicle_id, date) else {
            return Ok(Vec::new());
        };
        let guard = day.read().await;
        Ok(guard
            .overlapping(&range)
            .filter(|b| !b.is_expired_hold(hold_cutoff))
            .cloned()
            .collect())
    }

    async fn vehicle_day_blocks(
        &self,
        vehicle_id: VehicleId,
        date: NaiveDate,
    ) -> Result<Vec<AvailabilityBlock>, StoreError> {
        let Some(day) = self.get_day(vehicle_id, date) else {
            return Ok(Vec::new());
        };
        let blocks = day.read().await.blocks.clone();
        Ok(blocks)
    }

    async fn day_blocks(&self, date: NaiveDate) -> Result<Vec<AvailabilityBlock>, StoreError> {
        let days = self.days_matching(|(_, d)| *d == date);
        Ok(self.collect_blocks(days).await)
    }

    async fn blocks_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        vehicle_id: Option<VehicleId>,
    ) -> Result<Vec<AvailabilityBlock>, StoreError> {
        let days = self.days_matching(|(v, d)| {
            *d >= start && *d <= end && vehicle_id.is_none_or(|wanted| wanted == *v)
        });
        Ok(self.collect_blocks(days).await)
    }
}
