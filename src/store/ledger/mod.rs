mod ops;
#[cfg(test)]
mod tests;
mod writer;

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{RwLock, broadcast, mpsc, oneshot};

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

use super::{DaySchedule, StoreError};
use writer::{WalCommand, wal_writer_loop};

pub type SharedDay = Arc<RwLock<DaySchedule>>;

type DayKey = (VehicleId, NaiveDate);

/// In-process block store.
///
/// One `RwLock`-guarded [`DaySchedule`] per `(vehicle, date)`. Inserts check
/// for overlap and commit under the same write guard, which is what makes the
/// write the decision point. Optionally durable through a group-committed WAL.
pub struct BlockLedger {
    days: DashMap<DayKey, SharedDay>,
    index: LedgerIndex,
    wal_tx: Option<mpsc::Sender<WalCommand>>,
    notify: NotifyHub,
}

/// Reverse lookups into `days`.
#[derive(Default)]
struct LedgerIndex {
    /// Block id → the day that holds it.
    blocks: DashMap<BlockId, DayKey>,
    /// Booking id → days carrying its booking or buffer blocks.
    bookings: DashMap<BookingId, Vec<DayKey>>,
}

impl LedgerIndex {
    fn link_booking(&self, booking_id: BookingId, key: DayKey) {
        let mut days = self.bookings.entry(booking_id).or_default();
        if !days.contains(&key) {
            days.push(key);
        }
    }

    fn unlink_booking(&self, booking_id: BookingId, key: DayKey) {
        if let Some(mut days) = self.bookings.get_mut(&booking_id) {
            days.retain(|k| *k != key);
        }
        self.bookings.remove_if(&booking_id, |_, days| days.is_empty());
    }

    fn booking_days(&self, booking_id: BookingId) -> Vec<DayKey> {
        self.bookings
            .get(&booking_id)
            .map(|days| days.value().clone())
            .unwrap_or_default()
    }
}

/// Apply an event to a day schedule. Caller holds the day's write lock.
fn apply_to_day(day: &mut DaySchedule, event: &BlockEvent, index: &LedgerIndex) {
    let key = (day.vehicle_id, day.date);
    match event {
        BlockEvent::Created(block) => {
            index.blocks.insert(block.id, key);
            if let Some(booking_id) = block.booking_id() {
                index.link_booking(booking_id, key);
            }
            day.insert(block.clone());
        }
        BlockEvent::Converted { id, booking_id, .. } => {
            if let Some(block) = day.get_mut(*id) {
                block.kind = BlockKind::Booking {
                    booking_id: *booking_id,
                };
                block.notes = None;
                index.link_booking(*booking_id, key);
            }
        }
        BlockEvent::Deleted { id, .. } => {
            index.blocks.remove(id);
            let Some(booking_id) = day.remove(*id).and_then(|b| b.booking_id()) else {
                return;
            };
            if !day.blocks.iter().any(|b| b.booking_id() == Some(booking_id)) {
                index.unlink_booking(booking_id, key);
            }
        }
    }
}

impl Default for BlockLedger {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl BlockLedger {
    /// A ledger with no durability. Needs no runtime.
    pub fn in_memory() -> Self {
        Self {
            days: DashMap::new(),
            index: LedgerIndex::default(),
            wal_tx: None,
            notify: NotifyHub::new(),
        }
    }

    /// Replay the WAL at `path` (if any) and keep appending to it.
    /// Spawns the group-commit writer, so it must run inside a Tokio runtime.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let events: Vec<BlockEvent> = Wal::replay(path)?;
        let wal = Wal::open(path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let mut ledger = Self::in_memory();
        ledger.wal_tx = Some(wal_tx);

        // Sole owner of every Arc here, so try_write never contends. Never
        // block_write: this may already run inside an async context.
        for event in &events {
            let day = ledger.day_entry(event.vehicle_id(), event.date());
            let mut guard = day
                .try_write()
                .map_err(|_| std::io::Error::other("replay: day schedule unexpectedly locked"))?;
            apply_to_day(&mut guard, event, &ledger.index);
        }
        ledger
            .days
            .retain(|_, day| !day.try_read().is_ok_and(|d| d.is_empty()));
        tracing::info!(
            "replayed {} block events from {} ({} live blocks)",
            events.len(),
            path.display(),
            ledger.block_count()
        );
        Ok(ledger)
    }

    pub fn block_count(&self) -> usize {
        self.index.blocks.len()
    }

    pub fn is_durable(&self) -> bool {
        self.wal_tx.is_some()
    }

    /// Live change feed for one vehicle.
    pub fn subscribe(&self, vehicle_id: VehicleId) -> broadcast::Receiver<BlockEvent> {
        self.notify.subscribe(vehicle_id)
    }

    pub(super) fn day_entry(&self, vehicle_id: VehicleId, date: NaiveDate) -> SharedDay {
        self.days
            .entry((vehicle_id, date))
            .or_insert_with(|| Arc::new(RwLock::new(DaySchedule::new(vehicle_id, date))))
            .value()
            .clone()
    }

    pub(super) fn get_day(&self, vehicle_id: VehicleId, date: NaiveDate) -> Option<SharedDay> {
        self.days.get(&(vehicle_id, date)).map(|e| e.value().clone())
    }

    /// Forget an emptied day. Only removes it while the map holds the sole
    /// handle; the shard lock taken by `remove_if` keeps `day_entry` from
    /// handing the same handle out mid-removal.
    pub(super) fn prune_day(&self, key: DayKey) {
        self.days.remove_if(&key, |_, day| {
            Arc::strong_count(day) == 1 && day.try_read().is_ok_and(|d| d.is_empty())
        });
    }

    pub(super) fn day_keys(&self) -> Vec<DayKey> {
        self.days.iter().map(|e| *e.key()).collect()
    }

    pub(super) fn days_for_booking(&self, booking_id: BookingId) -> Vec<DayKey> {
        self.index.booking_days(booking_id)
    }

    pub fn day_count(&self) -> usize {
        self.days.len()
    }

    /// Snapshot of the day handles matching `filter`, sorted by date then vehicle.
    pub(super) fn days_matching(&self, filter: impl Fn(&DayKey) -> bool) -> Vec<SharedDay> {
        let mut days: Vec<(DayKey, SharedDay)> = self
            .days
            .iter()
            .filter(|e| filter(e.key()))
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        days.sort_by(|a, b| a.0.1.cmp(&b.0.1).then(a.0.0.cmp(&b.0.0)));
        days.into_iter().map(|(_, day)| day).collect()
    }

    /// Block id → owning day, write-locked.
    pub(super) async fn resolve_block_write(
        &self,
        id: &BlockId,
    ) -> Option<tokio::sync::OwnedRwLockWriteGuard<DaySchedule>> {
        let (vehicle_id, date) = *self.index.blocks.get(id)?.value();
        let day = self.get_day(vehicle_id, date)?;
        Some(day.write_owned().await)
    }

    async fn wal_append(&self, event: &BlockEvent) -> Result<(), StoreError> {
        let Some(wal_tx) = &self.wal_tx else {
            return Ok(());
        };
        let (tx, rx) = oneshot::channel();
        wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Wal(e.to_string()))
    }

    /// WAL append, apply, notify. The caller holds the day's write lock.
    pub(super) async fn persist_and_apply(
        &self,
        day: &mut DaySchedule,
        event: &BlockEvent,
    ) -> Result<(), StoreError> {
        self.wal_append(event).await?;
        apply_to_day(day, event, &self.index);
        self.notify.send(event);
        Ok(())
    }

    /// Rewrite the WAL as one `Created` event per live block.
    pub async fn compact_wal(&self) -> Result<(), StoreError> {
        let Some(wal_tx) = &self.wal_tx else {
            return Ok(());
        };
        // Read guards stay held until the compacted file is swapped in, so no
        // write to a snapshotted day can land between snapshot and swap.
        let mut guards = Vec::new();
        let mut events = Vec::with_capacity(self.block_count());
        for day in self.days_matching(|_| true) {
            let guard = day.read_owned().await;
            events.extend(guard.blocks.iter().cloned().map(BlockEvent::Created));
            guards.push(guard);
        }

        let (tx, rx) = oneshot::channel();
        wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
        let result = rx
            .await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Wal(e.to_string()));
        drop(guards);
        result
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let Some(wal_tx) = &self.wal_tx else {
            return 0;
        };
        let (tx, rx) = oneshot::channel();
        if wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
